//! Practice session — recording state machine, artifacts, orchestration.
//!
//! ```text
//! user action ─▶ PracticeOrchestrator ─▶ DeviceGateway (acquire)
//!                    │                        │
//!                    │                   SignalGraph tap ─▶ VisualizationLoop
//!                    │                        │
//!                    └── chunk pump ─▶ RecordingController ─▶ RecordingArtifact
//! ```

pub mod artifact;
pub mod orchestrator;
pub mod recorder;

pub use artifact::{ArtifactEncoding, RecordingArtifact};
pub use orchestrator::{CaptureSession, ImportedFile, PracticeOrchestrator, SessionError};
pub use recorder::{RecorderError, RecorderState, RecordingController};
