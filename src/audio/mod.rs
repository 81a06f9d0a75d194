//! Audio capture — microphone acquisition and the live analysis tap.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback (capture thread) → downmix to mono
//!            → SampleWindow (analysis tap)            → visualizer
//!            → RecordedChunk (mpsc, while recording)  → recording controller
//! ```
//!
//! The `cpal::Stream` is owned by a dedicated capture thread because it is
//! not `Send`; [`InputStreamHandle`] is the thread's Send-able remote
//! control and releases it exactly once.

pub mod gateway;
pub mod signal;

pub use gateway::{
    CpalDeviceGateway, DeviceError, DeviceGateway, InputStreamHandle, RecordedChunk, StreamFormat,
};
pub use signal::{AnalysisTap, SampleBuffer, SignalGraph, DEFAULT_ANALYSIS_WINDOW};
