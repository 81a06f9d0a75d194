//! Singing practice mode — live capture, waveform visualization, and
//! session recording.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                     PracticeOrchestrator                        │
//! │                                                                │
//! │  DeviceGateway ──▶ InputStreamHandle                           │
//! │        │                 │                                     │
//! │        │           SignalGraph tap ──▶ VisualizationLoop       │
//! │        │                 │                   │                 │
//! │        │           chunk channel        WaveformView (UI)      │
//! │        │                 │                                     │
//! │        │         RecordingController ──▶ RecordingArtifact     │
//! │        │                                      │                │
//! │        └── release on stop/cancel        VocalAnalyzer         │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One capture session owns one stream handle, one analysis tap, and one
//! render task; stop and cancel tear all three down in a fixed order
//! (visualization first, hardware last) so nothing reads a dead tap and the
//! microphone is released exactly once.

pub mod analysis;
pub mod app;
pub mod audio;
pub mod config;
pub mod player;
pub mod session;
pub mod viz;
