//! Render-target abstraction for the waveform visualizer.
//!
//! The render loop draws through [`RenderSurface`] so it can be pointed at
//! the egui bridge in production and at a counting stub in tests.
//! [`WaveformView`] is that bridge: the loop replaces the stored polyline
//! every frame, and the egui painter reads the latest one when the UI
//! repaints.

use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// RenderSurface
// ---------------------------------------------------------------------------

/// A drawable target for one waveform frame.
pub trait RenderSurface: Send {
    /// Drawable size `(width, height)`.  A non-positive dimension means the
    /// target has no drawable area and the render loop stops cleanly.
    fn size(&self) -> (f32, f32);

    /// Clear the target before drawing a new frame.
    fn clear(&mut self);

    /// Stroke a connected polyline through `points` (top-left origin).
    fn stroke_polyline(&mut self, points: &[(f32, f32)]);
}

// ---------------------------------------------------------------------------
// WaveformView
// ---------------------------------------------------------------------------

/// Shared "latest polyline" between the render task and the egui painter.
///
/// Coordinates are normalized to `[0, 1]` on both axes; the painter scales
/// them into whatever rect the panel currently occupies.  Cheap to clone.
#[derive(Clone)]
pub struct WaveformView {
    points: Arc<Mutex<Vec<(f32, f32)>>>,
}

impl WaveformView {
    pub fn new() -> Self {
        Self {
            points: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The most recently rendered polyline (normalized coordinates).
    pub fn latest(&self) -> Vec<(f32, f32)> {
        self.points.lock().unwrap().clone()
    }

    /// Drop the stored polyline (e.g. when a session ends and the panel
    /// should go blank).
    pub fn reset(&self) {
        self.points.lock().unwrap().clear();
    }
}

impl Default for WaveformView {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSurface for WaveformView {
    fn size(&self) -> (f32, f32) {
        (1.0, 1.0)
    }

    fn clear(&mut self) {
        self.points.lock().unwrap().clear();
    }

    fn stroke_polyline(&mut self, points: &[(f32, f32)]) {
        *self.points.lock().unwrap() = points.to_vec();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stroke_replaces_the_stored_polyline() {
        let mut view = WaveformView::new();
        view.stroke_polyline(&[(0.0, 0.5), (1.0, 0.5)]);
        view.stroke_polyline(&[(0.0, 0.1)]);
        assert_eq!(view.latest(), vec![(0.0, 0.1)]);
    }

    #[test]
    fn clones_share_the_same_points() {
        let mut view = WaveformView::new();
        let reader = view.clone();
        view.stroke_polyline(&[(0.5, 0.5)]);
        assert_eq!(reader.latest(), vec![(0.5, 0.5)]);
    }

    #[test]
    fn reset_clears() {
        let mut view = WaveformView::new();
        view.stroke_polyline(&[(0.5, 0.5)]);
        view.reset();
        assert!(view.latest().is_empty());
    }
}
