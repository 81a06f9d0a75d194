//! Singing practice window — egui/eframe application.
//!
//! # Architecture
//!
//! [`PracticeApp`] is the top-level [`eframe::App`].  It owns the UI state
//! and two channel endpoints:
//!
//! * `command_tx` — sends [`SessionCommand`]s to the session loop.
//! * `event_rx`  — receives [`SessionEvent`]s back from it.
//!
//! The window shows four sections top to bottom: the reference-track
//! transport, the live waveform with the record/stop/cancel controls, the
//! drag-and-drop upload zone, and the performance-feedback panel.  The
//! waveform panel paints whatever polyline the render task last stored in
//! the shared [`WaveformView`].

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use eframe::egui;
use tokio::sync::mpsc;

use crate::analysis::AnalysisFeedback;
use crate::player::{ReferencePlayer, TransportEvent};
use crate::session::{ImportedFile, RecordingArtifact};
use crate::viz::WaveformView;

// ---------------------------------------------------------------------------
// Session message types (the session loop in main.rs imports them from here).
// ---------------------------------------------------------------------------

/// Commands sent from the UI thread to the session loop.
#[derive(Debug)]
pub enum SessionCommand {
    /// Acquire the microphone and start capturing.
    StartRecording,
    /// Stop capturing and finalize the recording.
    StopRecording,
    /// Abort the current capture, discarding all audio.
    CancelRecording,
    /// Wrap an uploaded file as a practice take.
    ImportFile(ImportedFile),
}

/// Results / progress events delivered from the session loop to the UI.
#[derive(Debug)]
pub enum SessionEvent {
    /// The microphone is live and chunks are accumulating.
    RecordingStarted,
    /// A recording was finalized; `saved_to` is the playback file when the
    /// write succeeded.
    RecordingStopped {
        artifact: RecordingArtifact,
        saved_to: Option<PathBuf>,
    },
    /// The capture was aborted; nothing was produced.
    RecordingCancelled,
    /// An uploaded file was wrapped as a practice take.
    FileImported { artifact: RecordingArtifact },
    /// Feedback for the latest artifact is ready.
    AnalysisReady { feedback: AnalysisFeedback },
    /// An error occurred (acquisition failure, unsupported file, …).
    Error { message: String },
}

// ---------------------------------------------------------------------------
// UiPhase
// ---------------------------------------------------------------------------

/// The UI-side view of the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UiPhase {
    /// No capture running; record button armed.
    Idle,
    /// Microphone live, waveform animating.
    Capturing,
}

// ---------------------------------------------------------------------------
// PracticeApp
// ---------------------------------------------------------------------------

/// eframe application — the practice window.
pub struct PracticeApp {
    // ── Session state ────────────────────────────────────────────────────
    phase: UiPhase,
    /// The latest finished take (recorded or imported).  Superseded, never
    /// mutated, when a new one arrives.
    artifact: Option<RecordingArtifact>,
    /// Playback file of the latest recorded take, when saving succeeded.
    saved_path: Option<PathBuf>,
    /// Feedback for the latest take; cleared whenever a new take arrives.
    feedback: Option<AnalysisFeedback>,
    error_message: Option<String>,

    // ── Timing ───────────────────────────────────────────────────────────
    recording_start: Option<Instant>,

    // ── Waveform ─────────────────────────────────────────────────────────
    /// Shared polyline bridge written by the visualization task.
    waveform: WaveformView,

    // ── Import zone ──────────────────────────────────────────────────────
    drag_active: bool,

    // ── Playback ─────────────────────────────────────────────────────────
    /// Plays the instructor-provided reference track.
    reference_player: Box<dyn ReferencePlayer>,
    reference_name: Option<String>,
    /// Mirror of the reference transport state, driven by its
    /// play/pause notifications.
    reference_playing: bool,
    /// Plays the latest finished take.
    take_player: Box<dyn ReferencePlayer>,

    // ── Channels ─────────────────────────────────────────────────────────
    command_tx: mpsc::Sender<SessionCommand>,
    event_rx: mpsc::Receiver<SessionEvent>,
}

impl PracticeApp {
    pub fn new(
        command_tx: mpsc::Sender<SessionCommand>,
        event_rx: mpsc::Receiver<SessionEvent>,
        waveform: WaveformView,
        reference_player: Box<dyn ReferencePlayer>,
        take_player: Box<dyn ReferencePlayer>,
    ) -> Self {
        Self {
            phase: UiPhase::Idle,
            artifact: None,
            saved_path: None,
            feedback: None,
            error_message: None,
            recording_start: None,
            waveform,
            drag_active: false,
            reference_player,
            reference_name: None,
            reference_playing: false,
            take_player,
            command_tx,
            event_rx,
        }
    }

    // ── Channel polling ──────────────────────────────────────────────────

    /// Drain all pending session events (non-blocking).
    fn poll_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                SessionEvent::RecordingStarted => {
                    self.phase = UiPhase::Capturing;
                    self.recording_start = Some(Instant::now());
                    self.error_message = None;
                }
                SessionEvent::RecordingStopped { artifact, saved_to } => {
                    self.phase = UiPhase::Idle;
                    self.recording_start = None;
                    self.saved_path = saved_to;
                    self.adopt_artifact(artifact);
                }
                SessionEvent::RecordingCancelled => {
                    self.phase = UiPhase::Idle;
                    self.recording_start = None;
                }
                SessionEvent::FileImported { artifact } => {
                    self.saved_path = None;
                    self.adopt_artifact(artifact);
                }
                SessionEvent::AnalysisReady { feedback } => {
                    self.feedback = Some(feedback);
                }
                SessionEvent::Error { message } => {
                    self.phase = UiPhase::Idle;
                    self.recording_start = None;
                    self.error_message = Some(message);
                }
            }
        }
    }

    /// Keep the mirrored transport state in sync with the reference
    /// player's notifications.
    fn poll_transport(&mut self) {
        while let Some(event) = self.reference_player.poll_event() {
            self.reference_playing = matches!(event, TransportEvent::Started);
        }
        // The track can run out without a pause notification.
        if self.reference_playing && !self.reference_player.is_playing() {
            self.reference_playing = false;
        }
    }

    /// Replace the current take; the previous artifact and its feedback are
    /// superseded together.
    fn adopt_artifact(&mut self, artifact: RecordingArtifact) {
        self.feedback = None;
        match artifact.playback_bytes() {
            Ok(bytes) => {
                if let Err(e) = self.take_player.load(bytes) {
                    log::warn!("could not load take for playback: {e}");
                }
            }
            Err(e) => log::warn!("could not derive playback bytes: {e:#}"),
        }
        self.artifact = Some(artifact);
    }

    // ── Drag-and-drop ────────────────────────────────────────────────────

    fn handle_file_drops(&mut self, ctx: &egui::Context) {
        self.drag_active = ctx.input(|i| !i.raw.hovered_files.is_empty());

        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        if let Some(file) = dropped.into_iter().next() {
            self.import_dropped_file(file);
        }
    }

    fn import_dropped_file(&mut self, file: egui::DroppedFile) {
        let bytes = if let Some(bytes) = &file.bytes {
            bytes.to_vec()
        } else if let Some(path) = &file.path {
            match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.error_message =
                        Some(format!("could not read {}: {e}", path.display()));
                    return;
                }
            }
        } else {
            return;
        };

        let media_kind = if !file.mime.is_empty() {
            file.mime.clone()
        } else if let Some(path) = &file.path {
            media_kind_for_path(path)
        } else {
            String::new()
        };

        let name = if !file.name.is_empty() {
            file.name.clone()
        } else {
            file.path
                .as_deref()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
                .unwrap_or("dropped file")
                .to_string()
        };

        let _ = self.command_tx.try_send(SessionCommand::ImportFile(ImportedFile {
            name,
            media_kind,
            bytes,
        }));
    }

    fn browse_for_file(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Audio", &["wav", "mp3", "m4a", "ogg", "flac"])
            .pick_file()
        else {
            return;
        };

        match std::fs::read(&path) {
            Ok(bytes) => {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("selected file")
                    .to_string();
                let media_kind = media_kind_for_path(&path);
                let _ = self.command_tx.try_send(SessionCommand::ImportFile(
                    ImportedFile {
                        name,
                        media_kind,
                        bytes,
                    },
                ));
            }
            Err(e) => {
                self.error_message = Some(format!("could not read {}: {e}", path.display()));
            }
        }
    }

    // ── Section renderers ────────────────────────────────────────────────

    fn draw_reference(&mut self, ui: &mut egui::Ui) {
        ui.heading("Reference Track");
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            if ui.button("Load reference…").clicked() {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter("Audio", &["wav", "mp3", "m4a", "ogg", "flac"])
                    .pick_file()
                {
                    match std::fs::read(&path) {
                        Ok(bytes) => {
                            if let Err(e) = self.reference_player.load(bytes) {
                                self.error_message = Some(e.to_string());
                            } else {
                                self.reference_name = path
                                    .file_name()
                                    .and_then(|n| n.to_str())
                                    .map(str::to_string);
                            }
                        }
                        Err(e) => {
                            self.error_message =
                                Some(format!("could not read {}: {e}", path.display()));
                        }
                    }
                }
            }

            if let Some(name) = self.reference_name.clone() {
                ui.label(egui::RichText::new(name).size(12.0));

                let label = if self.reference_playing { "Pause" } else { "Play" };
                if ui.button(label).clicked() {
                    if self.reference_playing {
                        self.reference_player.pause();
                    } else if let Err(e) = self.reference_player.play() {
                        self.error_message = Some(e.to_string());
                    }
                }
            } else {
                ui.label(
                    egui::RichText::new("no reference loaded")
                        .color(egui::Color32::from_rgb(120, 120, 120))
                        .size(12.0),
                );
            }
        });
    }

    fn draw_recording(&mut self, ui: &mut egui::Ui) {
        ui.heading("Your Recording");
        ui.add_space(4.0);
        self.draw_waveform(ui);
        ui.add_space(6.0);

        ui.horizontal(|ui| {
            match self.phase {
                UiPhase::Idle => {
                    if ui
                        .button(egui::RichText::new("●  Record").color(egui::Color32::from_rgb(
                            220, 80, 80,
                        )))
                        .clicked()
                    {
                        let _ = self.command_tx.try_send(SessionCommand::StartRecording);
                    }
                }
                UiPhase::Capturing => {
                    if ui.button("■  Stop").clicked() {
                        let _ = self.command_tx.try_send(SessionCommand::StopRecording);
                    }
                    if ui.button("Cancel").clicked() {
                        let _ = self.command_tx.try_send(SessionCommand::CancelRecording);
                    }

                    let elapsed = self
                        .recording_start
                        .map(|t| t.elapsed().as_secs_f32())
                        .unwrap_or(0.0);
                    ui.label(
                        egui::RichText::new(format!("{elapsed:.1}s"))
                            .color(egui::Color32::from_rgb(255, 140, 140))
                            .size(12.0),
                    );
                }
            }

            // Playback of the latest take, once one exists.
            if self.artifact.is_some() {
                ui.separator();
                let playing = self.take_player.is_playing();
                let label = if playing { "Pause take" } else { "▶  Play take" };
                if ui.button(label).clicked() {
                    if playing {
                        self.take_player.pause();
                    } else if let Err(e) = self.take_player.play() {
                        self.error_message = Some(e.to_string());
                    }
                }
            }
        });

        if let Some(artifact) = &self.artifact {
            ui.add_space(2.0);
            let mut line = format!("take: {:.1}s", artifact.duration().as_secs_f32());
            if let Some(path) = &self.saved_path {
                line.push_str(&format!("  —  saved to {}", path.display()));
            }
            ui.label(
                egui::RichText::new(line)
                    .color(egui::Color32::from_rgb(140, 140, 140))
                    .size(11.0),
            );
        }
    }

    /// Paint the waveform panel from the shared polyline.
    fn draw_waveform(&self, ui: &mut egui::Ui) {
        let (rect, _) = ui.allocate_exact_size(
            egui::vec2(ui.available_width(), 140.0),
            egui::Sense::hover(),
        );

        let painter = ui.painter();
        painter.rect_filled(
            rect,
            egui::CornerRadius::same(6),
            egui::Color32::from_rgb(20, 20, 30),
        );

        let points = self.waveform.latest();
        if points.len() >= 2 {
            let mapped: Vec<egui::Pos2> = points
                .iter()
                .map(|&(x, y)| {
                    egui::pos2(
                        rect.left() + x * rect.width(),
                        rect.top() + y * rect.height(),
                    )
                })
                .collect();
            painter.add(egui::Shape::line(
                mapped,
                egui::Stroke::new(2.0, egui::Color32::from_rgb(99, 102, 241)),
            ));
        } else {
            // Flat midline while nothing is being captured.
            painter.line_segment(
                [rect.left_center(), rect.right_center()],
                egui::Stroke::new(1.0, egui::Color32::from_rgb(60, 60, 80)),
            );
        }
    }

    fn draw_upload_zone(&mut self, ui: &mut egui::Ui) {
        let stroke_color = if self.drag_active {
            egui::Color32::from_rgb(99, 102, 241)
        } else {
            egui::Color32::from_rgb(80, 80, 90)
        };

        egui::Frame::new()
            .stroke(egui::Stroke::new(1.0, stroke_color))
            .corner_radius(egui::CornerRadius::same(6))
            .inner_margin(egui::Margin::same(12))
            .show(ui, |ui| {
                ui.set_width(ui.available_width());
                ui.vertical_centered(|ui| {
                    ui.label(
                        egui::RichText::new("Drag and drop your recording here")
                            .color(egui::Color32::from_rgb(150, 150, 150))
                            .size(12.0),
                    );
                    if ui.link("or browse for a file").clicked() {
                        self.browse_for_file();
                    }
                });
            });
    }

    fn draw_feedback(&self, ui: &mut egui::Ui) {
        let Some(feedback) = &self.feedback else {
            return;
        };

        ui.add_space(8.0);
        ui.heading("Performance Feedback");
        ui.add_space(4.0);

        ui.horizontal(|ui| {
            ui.label("Pitch Accuracy");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(
                    egui::RichText::new(&feedback.pitch)
                        .color(egui::Color32::from_rgb(80, 200, 120)),
                );
            });
        });
        ui.horizontal(|ui| {
            ui.label("Timing");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(
                    egui::RichText::new(&feedback.timing)
                        .color(egui::Color32::from_rgb(230, 180, 80)),
                );
            });
        });
        ui.add_space(4.0);
        ui.label(egui::RichText::new(&feedback.overall).size(13.0));
    }

    fn draw_error(&mut self, ui: &mut egui::Ui) {
        let Some(message) = self.error_message.clone() else {
            return;
        };

        ui.add_space(6.0);
        ui.horizontal(|ui| {
            ui.label(
                egui::RichText::new(message)
                    .color(egui::Color32::from_rgb(255, 136, 68))
                    .size(12.0),
            );
            if ui.small_button("dismiss").clicked() {
                self.error_message = None;
            }
        });
    }
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl eframe::App for PracticeApp {
    /// Called every frame by eframe.  Polls channels, then renders the
    /// window sections.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_events();
        self.poll_transport();
        self.handle_file_drops(ctx);

        // Repaint continuously while the waveform animates; otherwise just
        // often enough to pick up session events.
        match self.phase {
            UiPhase::Capturing => ctx.request_repaint_after(Duration::from_millis(16)),
            UiPhase::Idle => ctx.request_repaint_after(Duration::from_millis(100)),
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(egui::RichText::new("Singing Practice").size(20.0));
            ui.separator();

            self.draw_reference(ui);
            ui.add_space(10.0);
            self.draw_recording(ui);
            ui.add_space(10.0);
            self.draw_upload_zone(ui);
            self.draw_feedback(ui);
            self.draw_error(ui);
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        log::info!("practice window closing");
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Best-effort media kind from a file extension, for pickers and drops that
/// do not carry a MIME type.
fn media_kind_for_path(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kinds_from_extensions() {
        assert_eq!(media_kind_for_path(Path::new("take.wav")), "audio/wav");
        assert_eq!(media_kind_for_path(Path::new("take.MP3")), "audio/mpeg");
        assert_eq!(media_kind_for_path(Path::new("take.flac")), "audio/flac");
        // Non-audio extensions stay non-audio so the import check rejects them.
        assert_eq!(media_kind_for_path(Path::new("clip.mp4")), "video/mp4");
        assert_eq!(
            media_kind_for_path(Path::new("unknown.xyz")),
            "application/octet-stream"
        );
    }
}
