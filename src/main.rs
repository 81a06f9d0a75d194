//! Application entry point — Singing Practice.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Build the device gateway, analyzer, and shared waveform view.
//! 5. Create the session channels (`command`, `event`).
//! 6. Spawn the session loop on the tokio runtime.
//! 7. Open the playback players (falling back to stubs when no output
//!    device exists).
//! 8. Run [`eframe::run_native`] — blocks the main thread until the window
//!    is closed.

use std::path::PathBuf;
use std::sync::Arc;

use eframe::egui;
use tokio::sync::mpsc;

use vocal_practice::{
    analysis::PlaceholderAnalyzer,
    app::{PracticeApp, SessionCommand, SessionEvent},
    audio::CpalDeviceGateway,
    config::{AppConfig, AppPaths},
    player::{ReferencePlayer, RodioPlayer, UnavailablePlayer},
    session::PracticeOrchestrator,
    viz::WaveformView,
};

// ---------------------------------------------------------------------------
// Session loop
// ---------------------------------------------------------------------------

/// Drives the orchestrator from UI commands and reports progress back.
///
/// A finished recording is saved into `recordings_dir` and then analyzed —
/// the feedback event follows the stopped event, matching the stop → analyze
/// flow the user expects.
async fn run_session(
    mut orchestrator: PracticeOrchestrator,
    recordings_dir: PathBuf,
    mut command_rx: mpsc::Receiver<SessionCommand>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    while let Some(command) = command_rx.recv().await {
        match command {
            SessionCommand::StartRecording => match orchestrator.start_recording().await {
                Ok(_session) => {
                    let _ = event_tx.send(SessionEvent::RecordingStarted).await;
                }
                Err(e) => {
                    let _ = event_tx
                        .send(SessionEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                }
            },

            SessionCommand::StopRecording => match orchestrator.stop_recording().await {
                Ok(Some(artifact)) => {
                    let saved_to = match artifact.save_to(&recordings_dir) {
                        Ok(path) => Some(path),
                        Err(e) => {
                            log::warn!("could not save recording: {e:#}");
                            None
                        }
                    };
                    let _ = event_tx
                        .send(SessionEvent::RecordingStopped {
                            artifact: artifact.clone(),
                            saved_to,
                        })
                        .await;

                    match orchestrator.analyze(&artifact).await {
                        Ok(feedback) => {
                            let _ = event_tx.send(SessionEvent::AnalysisReady { feedback }).await;
                        }
                        Err(e) => {
                            // Feedback is best-effort; the take itself is fine.
                            log::warn!("analysis failed: {e}");
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = event_tx
                        .send(SessionEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                }
            },

            SessionCommand::CancelRecording => {
                orchestrator.cancel_recording().await;
                let _ = event_tx.send(SessionEvent::RecordingCancelled).await;
            }

            SessionCommand::ImportFile(file) => match orchestrator.import_file(file) {
                Ok(artifact) => {
                    let _ = event_tx
                        .send(SessionEvent::FileImported {
                            artifact: artifact.clone(),
                        })
                        .await;

                    match orchestrator.analyze(&artifact).await {
                        Ok(feedback) => {
                            let _ = event_tx.send(SessionEvent::AnalysisReady { feedback }).await;
                        }
                        Err(e) => log::warn!("analysis failed: {e}"),
                    }
                }
                Err(e) => {
                    let _ = event_tx
                        .send(SessionEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                }
            },
        }
    }

    log::info!("session command channel closed; shutting down");
}

// ---------------------------------------------------------------------------
// Native options builder
// ---------------------------------------------------------------------------

fn native_options(config: &AppConfig) -> eframe::NativeOptions {
    let (width, height) = config.ui.window_size;
    let mut vp = egui::ViewportBuilder::default()
        .with_inner_size([width, height])
        .with_min_inner_size([480.0, 420.0]);

    if let Some((x, y)) = config.ui.window_position {
        vp = vp.with_position(egui::pos2(x, y));
    }

    eframe::NativeOptions {
        viewport: vp,
        ..Default::default()
    }
}

fn open_player(what: &str) -> Box<dyn ReferencePlayer> {
    match RodioPlayer::new() {
        Ok(player) => Box::new(player),
        Err(e) => {
            log::warn!("no audio output for {what} ({e}); playback disabled");
            Box::new(UnavailablePlayer::new(e.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> eframe::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Singing Practice starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    let recordings_dir = config.storage.resolve_recordings_dir(&AppPaths::new());

    // 3. Tokio runtime (session loop + visualization / chunk-pump tasks)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    // 4. Collaborators
    let gateway = Arc::new(CpalDeviceGateway::with_device(
        config.audio.input_device.clone(),
    ));
    let analyzer = Arc::new(PlaceholderAnalyzer);
    let waveform = WaveformView::new();

    let orchestrator =
        PracticeOrchestrator::new(gateway, analyzer, waveform.clone(), &config);

    // 5. Channel setup
    let (command_tx, command_rx) = mpsc::channel::<SessionCommand>(16);
    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(32);

    // 6. Session loop
    rt.spawn(run_session(
        orchestrator,
        recordings_dir,
        command_rx,
        event_tx,
    ));

    // 7. Playback
    let reference_player = open_player("the reference track");
    let take_player = open_player("recorded takes");

    // 8. UI (blocks until the window is closed)
    let app = PracticeApp::new(
        command_tx,
        event_rx,
        waveform,
        reference_player,
        take_player,
    );
    let options = native_options(&config);

    eframe::run_native(
        "Singing Practice",
        options,
        Box::new(move |_cc| Ok(Box::new(app))),
    )
}
