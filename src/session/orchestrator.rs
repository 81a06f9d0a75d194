//! Practice-session orchestration.
//!
//! [`PracticeOrchestrator`] ties the capture stack together: it acquires the
//! microphone through the [`DeviceGateway`], attaches a [`SignalGraph`] tap,
//! starts the [`VisualizationLoop`], and opens chunk delivery into the
//! [`RecordingController`] — then owns every one of those resources for the
//! lifetime of a single capture session.
//!
//! # Lifecycle
//!
//! ```text
//! start_recording()           stop_recording() / cancel_recording()
//!   acquire handle              stop viz task          (no frame after)
//!   attach tap                  close chunk channel + drain pump
//!   start viz task              end() → artifact   /  cancel() → nothing
//!   begin recorder              detach tap
//!   open chunk pump             release handle         (hardware last)
//! ```
//!
//! Acquisition is transactional: if anything fails after the handle is
//! acquired, the partial stack is torn down and the handle released before
//! the error propagates.  Stop and cancel are safe without an active
//! session (no-op) and always run the full teardown when one exists.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

use crate::analysis::{AnalysisError, AnalysisFeedback, VocalAnalyzer};
use crate::audio::gateway::{DeviceError, DeviceGateway, InputStreamHandle};
use crate::audio::signal::{AnalysisTap, SignalGraph};
use crate::config::AppConfig;
use crate::session::artifact::RecordingArtifact;
use crate::session::recorder::RecordingController;
use crate::viz::{VisualizationLoop, VizTask, WaveformView};

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Errors surfaced by the session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Microphone acquisition failed (permission / no device / busy).
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// `start_recording` while a capture is already running.
    #[error("a recording is already in progress")]
    AlreadyCapturing,

    /// Imported file is not audio.
    #[error("unsupported file type `{0}` — drop an audio file")]
    UnsupportedFormat(String),

    /// Unexpected internal failure (task join, state mismatch).
    #[error("internal session error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// CaptureSession / ImportedFile
// ---------------------------------------------------------------------------

/// Identifies one practice attempt, from acquisition to release.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub id: Uuid,
    pub started_at: Instant,
}

/// A file delivered by the picker or the drag-and-drop surface.
#[derive(Debug, Clone)]
pub struct ImportedFile {
    /// Display name (usually the file name).
    pub name: String,
    /// Declared media kind, e.g. `audio/wav` or `video/mp4`.
    pub media_kind: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

/// Resources owned by one active capture, torn down together.
struct ActiveCapture {
    session: CaptureSession,
    handle: InputStreamHandle,
    tap: AnalysisTap,
    viz: VizTask,
    pump: tokio::task::JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// PracticeOrchestrator
// ---------------------------------------------------------------------------

/// Owns the capture stack and exposes the five session operations.
pub struct PracticeOrchestrator {
    gateway: Arc<dyn DeviceGateway>,
    graph: SignalGraph,
    viz: VisualizationLoop,
    recorder: Arc<Mutex<RecordingController>>,
    analyzer: Arc<dyn VocalAnalyzer>,
    view: WaveformView,
    active: Option<ActiveCapture>,
}

impl PracticeOrchestrator {
    /// Build an orchestrator from its collaborators.
    ///
    /// The [`SignalGraph`] is created here and lives for the orchestrator's
    /// lifetime — it is owned process-wide state, not a singleton reached
    /// for by the individual components.
    pub fn new(
        gateway: Arc<dyn DeviceGateway>,
        analyzer: Arc<dyn VocalAnalyzer>,
        view: WaveformView,
        config: &AppConfig,
    ) -> Self {
        Self {
            gateway,
            graph: SignalGraph::with_window(config.audio.analysis_window),
            viz: VisualizationLoop::with_frame_rate(config.audio.frame_rate),
            recorder: Arc::new(Mutex::new(RecordingController::new())),
            analyzer,
            view,
            active: None,
        }
    }

    /// Returns `true` while a capture session is running.
    pub fn is_capturing(&self) -> bool {
        self.active.is_some()
    }

    /// The running capture session, if any.
    pub fn current_session(&self) -> Option<&CaptureSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    // -----------------------------------------------------------------------
    // start
    // -----------------------------------------------------------------------

    /// Acquire the microphone and start visualizing + recording.
    ///
    /// Fails fast with [`SessionError::AlreadyCapturing`] when a session is
    /// running — the existing session is left untouched.  Device and
    /// permission failures propagate with no resources held.
    pub async fn start_recording(&mut self) -> Result<CaptureSession, SessionError> {
        if self.active.is_some() {
            return Err(SessionError::AlreadyCapturing);
        }

        // Acquisition blocks on the platform permission prompt — keep it
        // off the async workers.
        let gateway = Arc::clone(&self.gateway);
        let mut handle = tokio::task::spawn_blocking(move || gateway.acquire())
            .await
            .map_err(|e| SessionError::Internal(format!("acquisition task failed: {e}")))??;

        // Past this point the handle must be released on any failure.
        let session = CaptureSession {
            id: Uuid::new_v4(),
            started_at: Instant::now(),
        };

        let tap = self.graph.attach(&handle);
        let viz = self.viz.start(tap.clone(), self.view.clone());

        let begin = self.recorder.lock().unwrap().begin(handle.format());
        if let Err(e) = begin {
            log::error!("recorder refused to start ({e}); rolling back acquisition");
            viz.stop().await;
            self.graph.detach(tap);
            handle.release();
            return Err(SessionError::Internal(e.to_string()));
        }

        let mut chunk_rx = handle.open_chunks();
        let recorder = Arc::clone(&self.recorder);
        let pump = tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                recorder.lock().unwrap().on_chunk(chunk);
            }
        });

        log::info!("practice capture started (session {})", session.id);
        self.active = Some(ActiveCapture {
            session: session.clone(),
            handle,
            tap,
            viz,
            pump,
        });
        Ok(session)
    }

    // -----------------------------------------------------------------------
    // stop / cancel
    // -----------------------------------------------------------------------

    /// Stop the session and finalize the recording.
    ///
    /// Returns `Ok(None)` when no session is active (idempotent no-op).
    pub async fn stop_recording(&mut self) -> Result<Option<RecordingArtifact>, SessionError> {
        let Some(active) = self.active.take() else {
            log::debug!("stop requested with no active capture; ignoring");
            return Ok(None);
        };
        let ActiveCapture {
            session,
            mut handle,
            tap,
            viz,
            pump,
        } = active;

        // Visualization first, so no frame reads a torn-down tap.
        viz.stop().await;

        // Close delivery and let the pump drain everything that already
        // arrived — chunk order is preserved, nothing in flight is lost.
        handle.close_chunks();
        if pump.await.is_err() {
            log::error!("chunk pump panicked during stop");
        }

        let finalized = self.recorder.lock().unwrap().end();

        // Teardown continues regardless of the finalize outcome.
        self.graph.detach(tap);
        handle.release();
        self.view.reset();

        match finalized {
            Ok(artifact) => {
                log::info!(
                    "practice capture stopped (session {}, {:.2}s)",
                    session.id,
                    artifact.duration().as_secs_f32()
                );
                Ok(Some(artifact))
            }
            Err(e) => {
                // Internal state mismatch — treat like stop-without-session
                // rather than surfacing a user-facing error.
                log::error!("recorder refused to finalize: {e}");
                Ok(None)
            }
        }
    }

    /// Abort the session, discarding all accumulated chunks.
    ///
    /// Same teardown order as [`stop_recording`], but no artifact is
    /// produced.  No-op when nothing is active.
    ///
    /// [`stop_recording`]: Self::stop_recording
    pub async fn cancel_recording(&mut self) {
        let Some(active) = self.active.take() else {
            log::debug!("cancel requested with no active capture; ignoring");
            return;
        };
        let ActiveCapture {
            session,
            mut handle,
            tap,
            viz,
            pump,
        } = active;

        viz.stop().await;
        handle.close_chunks();
        if pump.await.is_err() {
            log::error!("chunk pump panicked during cancel");
        }

        self.recorder.lock().unwrap().cancel();
        self.graph.detach(tap);
        handle.release();
        self.view.reset();

        log::info!("practice capture cancelled (session {})", session.id);
    }

    // -----------------------------------------------------------------------
    // import / analyze
    // -----------------------------------------------------------------------

    /// Wrap an uploaded file as a playable artifact.
    ///
    /// Validates the declared media kind only — the live-capture path
    /// (gateway, graph, recorder) is never touched.
    pub fn import_file(&self, file: ImportedFile) -> Result<RecordingArtifact, SessionError> {
        let kind = file.media_kind.trim().to_ascii_lowercase();
        if !kind.starts_with("audio/") {
            let shown = if kind.is_empty() { "unknown".to_string() } else { kind };
            return Err(SessionError::UnsupportedFormat(shown));
        }

        log::info!(
            "imported `{}` ({}, {} bytes)",
            file.name,
            kind,
            file.bytes.len()
        );
        Ok(RecordingArtifact::from_import(kind, file.bytes))
    }

    /// Derive feedback for a finished artifact.
    pub async fn analyze(
        &self,
        artifact: &RecordingArtifact,
    ) -> Result<AnalysisFeedback, AnalysisError> {
        self.analyzer.analyze(artifact).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
