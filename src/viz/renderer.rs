//! Per-frame waveform render loop.
//!
//! [`VisualizationLoop::start`] spawns a repeating frame task that reads the
//! latest analysis window from an [`AnalysisTap`] and strokes a
//! midline-centered polyline onto a [`RenderSurface`].  The task is returned
//! as an explicit [`VizTask`] whose [`stop`](VizTask::stop) cancels the
//! pending frame and awaits task exit — once `stop()` resolves, no further
//! frame can fire.
//!
//! Frames are best-effort: missed ticks are skipped, and a surface with no
//! drawable area stops the loop cleanly instead of crashing the session.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::audio::signal::{AnalysisTap, SampleBuffer};
use crate::viz::surface::RenderSurface;

// ---------------------------------------------------------------------------
// VisualizationLoop
// ---------------------------------------------------------------------------

/// Factory for waveform render tasks.
pub struct VisualizationLoop {
    frame_interval: Duration,
}

impl VisualizationLoop {
    /// A loop targeting 60 frames per second.
    pub fn new() -> Self {
        Self::with_frame_rate(60)
    }

    /// A loop targeting `fps` frames per second (clamped to at least 1).
    pub fn with_frame_rate(fps: u32) -> Self {
        let fps = fps.max(1);
        Self {
            frame_interval: Duration::from_secs_f64(1.0 / fps as f64),
        }
    }

    /// Start rendering `tap` onto `surface`.
    ///
    /// The returned task runs until [`VizTask::stop`] is called, the task
    /// handle is dropped, or the surface reports no drawable area.
    pub fn start<S>(&self, tap: AnalysisTap, mut surface: S) -> VizTask
    where
        S: RenderSurface + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let frame_interval = self.frame_interval;

        let task = tokio::spawn(async move {
            let mut frames = tokio::time::interval(frame_interval);
            frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    // Breaks on an explicit stop and on VizTask drop alike.
                    _ = stop_rx.changed() => break,
                    _ = frames.tick() => {
                        let samples = tap.current_samples();
                        if !draw_frame(&mut surface, &samples) {
                            break;
                        }
                    }
                }
            }
            log::debug!("visualization loop stopped");
        });

        VizTask { stop_tx, task }
    }
}

impl Default for VisualizationLoop {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// VizTask
// ---------------------------------------------------------------------------

/// A running render task; cancellation is explicit, not a captured flag.
pub struct VizTask {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl VizTask {
    /// Cancel the pending frame and wait for the task to exit.
    ///
    /// After this resolves no further frame callback fires on the surface.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if self.task.await.is_err() {
            log::error!("visualization task panicked");
        }
    }
}

// ---------------------------------------------------------------------------
// Frame drawing
// ---------------------------------------------------------------------------

/// Draw one frame.  Returns `false` when the surface cannot be drawn to and
/// the loop should stop.
fn draw_frame(surface: &mut dyn RenderSurface, buffer: &SampleBuffer) -> bool {
    let (width, height) = surface.size();
    if !(width > 0.0 && height > 0.0) {
        log::warn!("waveform surface has no drawable area; stopping visualization");
        return false;
    }

    surface.clear();
    if buffer.is_empty() {
        // Nothing captured yet — leave the cleared surface as-is.
        return true;
    }

    let midline = height / 2.0;
    let step = width / buffer.len() as f32;

    let mut points = Vec::with_capacity(buffer.len() + 1);
    for (i, &sample) in buffer.samples.iter().enumerate() {
        let x = i as f32 * step;
        let y = midline + sample.clamp(-1.0, 1.0) * midline;
        points.push((x, y));
    }
    // Close the trace on the midline at the right edge.
    points.push((width, midline));

    surface.stroke_polyline(&points);
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::audio::gateway::InputStreamHandle;
    use crate::audio::signal::SignalGraph;

    /// Surface stub that counts frames and remembers the last polyline.
    #[derive(Clone)]
    struct CountingSurface {
        state: Arc<Mutex<CountingState>>,
        size: (f32, f32),
    }

    #[derive(Default)]
    struct CountingState {
        frames: usize,
        clears: usize,
        last_points: Vec<(f32, f32)>,
    }

    impl CountingSurface {
        fn new(width: f32, height: f32) -> Self {
            Self {
                state: Arc::new(Mutex::new(CountingState::default())),
                size: (width, height),
            }
        }

        fn frames(&self) -> usize {
            self.state.lock().unwrap().frames
        }

        fn last_points(&self) -> Vec<(f32, f32)> {
            self.state.lock().unwrap().last_points.clone()
        }
    }

    impl RenderSurface for CountingSurface {
        fn size(&self) -> (f32, f32) {
            self.size
        }

        fn clear(&mut self) {
            self.state.lock().unwrap().clears += 1;
        }

        fn stroke_polyline(&mut self, points: &[(f32, f32)]) {
            let mut state = self.state.lock().unwrap();
            state.frames += 1;
            state.last_points = points.to_vec();
        }
    }

    fn tap_with_samples(samples: &[f32]) -> AnalysisTap {
        let (handle, shared) = InputStreamHandle::detached_for_tests(16_000);
        let tap = SignalGraph::with_window(2048).attach(&handle);
        shared.dispatch(samples);
        // Dropping the handle clears the tap slot, but the window keeps the
        // samples already written — exactly what these tests need.
        tap
    }

    // ---- draw_frame geometry ----------------------------------------------

    #[test]
    fn silence_draws_along_the_midline() {
        let mut surface = CountingSurface::new(100.0, 50.0);
        let buffer = SampleBuffer {
            samples: vec![0.0; 4],
        };

        assert!(draw_frame(&mut surface, &buffer));
        let points = surface.last_points();
        assert_eq!(points.len(), 5);
        assert!(points.iter().all(|&(_, y)| (y - 25.0).abs() < 1e-6));
    }

    #[test]
    fn full_scale_samples_span_the_surface_height() {
        let mut surface = CountingSurface::new(100.0, 50.0);
        let buffer = SampleBuffer {
            samples: vec![1.0, -1.0],
        };

        assert!(draw_frame(&mut surface, &buffer));
        let points = surface.last_points();
        assert!((points[0].1 - 50.0).abs() < 1e-6);
        assert!((points[1].1 - 0.0).abs() < 1e-6);
    }

    #[test]
    fn short_window_is_drawn_without_error() {
        // Fewer samples than the configured window — iteration clamps to
        // what is available.
        let mut surface = CountingSurface::new(100.0, 50.0);
        let buffer = SampleBuffer {
            samples: vec![0.5],
        };

        assert!(draw_frame(&mut surface, &buffer));
        assert_eq!(surface.last_points().len(), 2);
    }

    #[test]
    fn out_of_range_samples_are_clamped_to_the_surface() {
        let mut surface = CountingSurface::new(100.0, 50.0);
        let buffer = SampleBuffer {
            samples: vec![3.0, -3.0],
        };

        assert!(draw_frame(&mut surface, &buffer));
        for &(_, y) in &surface.last_points() {
            assert!((0.0..=50.0).contains(&y));
        }
    }

    #[test]
    fn empty_buffer_clears_but_strokes_nothing() {
        let mut surface = CountingSurface::new(100.0, 50.0);
        let buffer = SampleBuffer { samples: vec![] };

        assert!(draw_frame(&mut surface, &buffer));
        assert_eq!(surface.frames(), 0);
        assert_eq!(surface.state.lock().unwrap().clears, 1);
    }

    #[test]
    fn degenerate_surface_stops_the_loop() {
        let mut surface = CountingSurface::new(0.0, 50.0);
        let buffer = SampleBuffer {
            samples: vec![0.5],
        };
        assert!(!draw_frame(&mut surface, &buffer));
    }

    // ---- Loop lifecycle ----------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn frames_render_while_the_loop_runs() {
        let tap = tap_with_samples(&[0.1, 0.2, 0.3]);
        let surface = CountingSurface::new(100.0, 50.0);

        let task = VisualizationLoop::with_frame_rate(60).start(tap, surface.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.stop().await;

        assert!(surface.frames() > 1, "expected multiple frames");
    }

    #[tokio::test(start_paused = true)]
    async fn no_frame_fires_after_stop_resolves() {
        let tap = tap_with_samples(&[0.1, 0.2, 0.3]);
        let surface = CountingSurface::new(100.0, 50.0);

        let task = VisualizationLoop::with_frame_rate(60).start(tap, surface.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.stop().await;

        let frames_at_stop = surface.frames();
        assert!(frames_at_stop > 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(surface.frames(), frames_at_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn degenerate_surface_ends_the_task_cleanly() {
        let tap = tap_with_samples(&[0.1]);
        let surface = CountingSurface::new(0.0, 0.0);

        let task = VisualizationLoop::with_frame_rate(60).start(tap, surface.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The task already exited on its own; stop() must still be safe.
        task.stop().await;
        assert_eq!(surface.frames(), 0);
    }
}
