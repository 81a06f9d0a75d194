//! Recording state machine.
//!
//! [`RecordingController`] buffers encoded chunks from the active stream and
//! produces a finished [`RecordingArtifact`] on [`end`].  The state machine
//! transitions are:
//!
//! ```text
//! Idle ──begin──▶ Recording ──end──▶ Finalizing ──▶ Idle   (artifact emitted)
//!                 Recording ──cancel─────────────▶ Idle   (chunks discarded)
//! ```
//!
//! Chunks delivered outside `Recording` are ignored (a programming error on
//! the caller's side, logged at debug level).  If the chunk source dies
//! before `end()` is called, `end()` still finalizes with whatever arrived —
//! a partial recording is a valid recording.
//!
//! [`end`]: RecordingController::end

use thiserror::Error;

use crate::audio::gateway::{RecordedChunk, StreamFormat};
use crate::session::artifact::RecordingArtifact;

// ---------------------------------------------------------------------------
// RecorderState
// ---------------------------------------------------------------------------

/// States of the recording controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// No recording in progress; the accumulator is empty.
    Idle,
    /// Chunks are being accumulated from the active stream.
    Recording,
    /// `end()` is concatenating the accumulated chunks.
    Finalizing,
}

impl RecorderState {
    /// A short human-readable label suitable for the UI status line.
    pub fn label(&self) -> &'static str {
        match self {
            RecorderState::Idle => "Idle",
            RecorderState::Recording => "Recording",
            RecorderState::Finalizing => "Finalizing",
        }
    }
}

impl Default for RecorderState {
    fn default() -> Self {
        RecorderState::Idle
    }
}

// ---------------------------------------------------------------------------
// RecorderError
// ---------------------------------------------------------------------------

/// Invalid transitions requested on the controller.
///
/// These indicate internal misuse; the orchestrator treats them as no-ops
/// rather than surfacing them to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecorderError {
    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording is in progress")]
    NotRecording,
}

// ---------------------------------------------------------------------------
// RecordingController
// ---------------------------------------------------------------------------

/// Accumulates [`RecordedChunk`]s in arrival order and finalizes them into
/// a [`RecordingArtifact`].
pub struct RecordingController {
    state: RecorderState,
    chunks: Vec<RecordedChunk>,
    format: Option<StreamFormat>,
}

impl RecordingController {
    pub fn new() -> Self {
        Self {
            state: RecorderState::Idle,
            chunks: Vec::new(),
            format: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Returns `true` while chunks are being accumulated.
    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    /// Number of chunks accumulated so far.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Open chunk accumulation for a new recording.
    ///
    /// Clears any stale accumulator state and records the stream format so
    /// `end()` can derive the artifact duration.
    pub fn begin(&mut self, format: StreamFormat) -> Result<(), RecorderError> {
        if self.state != RecorderState::Idle {
            return Err(RecorderError::AlreadyRecording);
        }
        self.chunks.clear();
        self.format = Some(format);
        self.state = RecorderState::Recording;
        log::debug!("recorder: begin ({} Hz)", format.sample_rate);
        Ok(())
    }

    /// Append a delivered chunk, preserving arrival order.
    ///
    /// Ignored outside `Recording` — chunk delivery racing a stop/cancel is
    /// expected and harmless.
    pub fn on_chunk(&mut self, chunk: RecordedChunk) {
        if self.state != RecorderState::Recording {
            log::debug!(
                "recorder: dropping {}-byte chunk delivered in {} state",
                chunk.bytes.len(),
                self.state.label()
            );
            return;
        }
        self.chunks.push(chunk);
    }

    /// Finalize the accumulated chunks into an artifact and return to Idle.
    ///
    /// Valid with zero chunks: the result is an empty artifact of duration
    /// zero (the source may have died right after `begin`).
    pub fn end(&mut self) -> Result<RecordingArtifact, RecorderError> {
        if self.state != RecorderState::Recording {
            return Err(RecorderError::NotRecording);
        }
        let format = match self.format.take() {
            Some(format) => format,
            None => {
                self.state = RecorderState::Idle;
                return Err(RecorderError::NotRecording);
            }
        };

        self.state = RecorderState::Finalizing;
        let chunks = std::mem::take(&mut self.chunks);
        let artifact = RecordingArtifact::from_chunks(chunks, format);
        self.state = RecorderState::Idle;

        log::info!(
            "recorder: finalized {:.2}s artifact ({} bytes)",
            artifact.duration().as_secs_f32(),
            artifact.payload().len()
        );
        Ok(artifact)
    }

    /// Discard the accumulated chunks without emitting an artifact.
    ///
    /// No-op when nothing is recording.
    pub fn cancel(&mut self) {
        if self.state != RecorderState::Recording {
            return;
        }
        let discarded = self.chunks.len();
        self.chunks.clear();
        self.format = None;
        self.state = RecorderState::Idle;
        log::debug!("recorder: cancelled, {discarded} chunk(s) discarded");
    }
}

impl Default for RecordingController {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn chunk(bytes: &[u8]) -> RecordedChunk {
        RecordedChunk {
            bytes: bytes.to_vec(),
        }
    }

    // ---- State machine -----------------------------------------------------

    #[test]
    fn starts_idle() {
        let recorder = RecordingController::new();
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert!(!recorder.is_recording());
    }

    #[test]
    fn begin_enters_recording() {
        let mut recorder = RecordingController::new();
        recorder.begin(StreamFormat::mono(16_000)).unwrap();
        assert!(recorder.is_recording());
    }

    #[test]
    fn begin_while_recording_is_rejected() {
        let mut recorder = RecordingController::new();
        recorder.begin(StreamFormat::mono(16_000)).unwrap();
        assert_eq!(
            recorder.begin(StreamFormat::mono(16_000)),
            Err(RecorderError::AlreadyRecording)
        );
        // The first recording is untouched.
        assert!(recorder.is_recording());
    }

    #[test]
    fn end_without_begin_is_rejected() {
        let mut recorder = RecordingController::new();
        assert_eq!(recorder.end().unwrap_err(), RecorderError::NotRecording);
    }

    #[test]
    fn end_returns_to_idle() {
        let mut recorder = RecordingController::new();
        recorder.begin(StreamFormat::mono(16_000)).unwrap();
        recorder.end().unwrap();
        assert_eq!(recorder.state(), RecorderState::Idle);
    }

    // ---- Chunk accumulation ------------------------------------------------

    /// Chunks delivered in order `[c1, c2, c3]` concatenate to exactly
    /// `c1‖c2‖c3` in the artifact payload.
    #[test]
    fn chunks_concatenate_in_arrival_order() {
        let mut recorder = RecordingController::new();
        recorder.begin(StreamFormat::mono(16_000)).unwrap();

        recorder.on_chunk(chunk(&[1, 2]));
        recorder.on_chunk(chunk(&[3, 4]));
        recorder.on_chunk(chunk(&[5, 6]));

        let artifact = recorder.end().unwrap();
        assert_eq!(artifact.payload(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn chunk_outside_recording_is_ignored() {
        let mut recorder = RecordingController::new();
        recorder.on_chunk(chunk(&[9, 9]));
        assert_eq!(recorder.chunk_count(), 0);

        recorder.begin(StreamFormat::mono(16_000)).unwrap();
        recorder.on_chunk(chunk(&[1, 2]));
        let artifact = recorder.end().unwrap();

        // Only the in-state chunk survived.
        assert_eq!(artifact.payload(), &[1, 2]);

        // Late delivery after end is ignored too.
        recorder.on_chunk(chunk(&[7, 7]));
        assert_eq!(recorder.chunk_count(), 0);
    }

    /// `end()` with zero chunks yields an empty artifact of duration 0.
    #[test]
    fn end_with_no_chunks_yields_empty_artifact() {
        let mut recorder = RecordingController::new();
        recorder.begin(StreamFormat::mono(16_000)).unwrap();

        let artifact = recorder.end().unwrap();
        assert!(artifact.payload().is_empty());
        assert_eq!(artifact.duration(), Duration::ZERO);
    }

    /// Partial recordings finalize normally — two chunks followed by source
    /// death still produce an artifact containing exactly those two chunks.
    #[test]
    fn partial_recording_finalizes_with_what_arrived() {
        let mut recorder = RecordingController::new();
        recorder.begin(StreamFormat::mono(16_000)).unwrap();
        recorder.on_chunk(chunk(&[1, 0]));
        recorder.on_chunk(chunk(&[2, 0]));
        // Source terminates unexpectedly — no more chunks, no error.

        let artifact = recorder.end().unwrap();
        assert_eq!(artifact.payload(), &[1, 0, 2, 0]);
    }

    #[test]
    fn duration_derives_from_payload_and_format() {
        let mut recorder = RecordingController::new();
        recorder.begin(StreamFormat::mono(4)).unwrap();
        // 8 bytes of mono i16 at 4 Hz = 4 frames = 1 second.
        recorder.on_chunk(chunk(&[0; 8]));

        let artifact = recorder.end().unwrap();
        assert!((artifact.duration().as_secs_f64() - 1.0).abs() < 1e-9);
    }

    // ---- Cancel ------------------------------------------------------------

    /// `cancel()` never yields an artifact and discards everything.
    #[test]
    fn cancel_discards_chunks() {
        let mut recorder = RecordingController::new();
        recorder.begin(StreamFormat::mono(16_000)).unwrap();
        recorder.on_chunk(chunk(&[1, 2, 3, 4]));

        recorder.cancel();
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert_eq!(recorder.chunk_count(), 0);

        // A fresh recording starts clean.
        recorder.begin(StreamFormat::mono(16_000)).unwrap();
        let artifact = recorder.end().unwrap();
        assert!(artifact.payload().is_empty());
    }

    #[test]
    fn cancel_when_idle_is_a_noop() {
        let mut recorder = RecordingController::new();
        recorder.cancel();
        assert_eq!(recorder.state(), RecorderState::Idle);
    }

    #[test]
    fn controller_is_reusable_across_recordings() {
        let mut recorder = RecordingController::new();

        recorder.begin(StreamFormat::mono(16_000)).unwrap();
        recorder.on_chunk(chunk(&[1, 1]));
        let first = recorder.end().unwrap();

        recorder.begin(StreamFormat::mono(16_000)).unwrap();
        recorder.on_chunk(chunk(&[2, 2]));
        let second = recorder.end().unwrap();

        assert_eq!(first.payload(), &[1, 1]);
        assert_eq!(second.payload(), &[2, 2]);
        assert_ne!(first.id(), second.id());
    }

    // ---- Labels ------------------------------------------------------------

    #[test]
    fn state_labels() {
        assert_eq!(RecorderState::Idle.label(), "Idle");
        assert_eq!(RecorderState::Recording.label(), "Recording");
        assert_eq!(RecorderState::Finalizing.label(), "Finalizing");
    }
}
