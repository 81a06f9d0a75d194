//! Waveform visualization — per-frame render loop and surfaces.
//!
//! ```text
//! AnalysisTap ──current_samples()──▶ VisualizationLoop ──polyline──▶ RenderSurface
//!                                       (VizTask)                    (WaveformView)
//! ```

pub mod renderer;
pub mod surface;

pub use renderer::{VisualizationLoop, VizTask};
pub use surface::{RenderSurface, WaveformView};
