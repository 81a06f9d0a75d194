//! Analysis side of the signal graph.
//!
//! [`SignalGraph`] connects a live input stream to a fixed-size analysis
//! window.  `attach` installs a [`SampleWindow`] into the stream's callback
//! path and hands back an [`AnalysisTap`]; the tap's
//! [`current_samples`](AnalysisTap::current_samples) is a non-blocking
//! snapshot of the latest window of mono amplitudes.  Only the most recent
//! window is retained — the visualizer runs in constant memory and never
//! sees waveform history.

use std::sync::{Arc, Mutex};

use crate::audio::gateway::{InputStreamHandle, StreamShared};

/// Default analysis window length in samples (one FFT-sized window).
pub const DEFAULT_ANALYSIS_WINDOW: usize = 2048;

// ---------------------------------------------------------------------------
// SampleBuffer
// ---------------------------------------------------------------------------

/// Snapshot of the most recent analysis window.
///
/// Mono `f32` amplitudes in `[-1.0, 1.0]`, oldest first.  The buffer may be
/// shorter than the configured window length until the stream has delivered
/// a full window — readers clamp to the available length.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    /// Windowed amplitude samples, oldest first.
    pub samples: Vec<f32>,
}

impl SampleBuffer {
    /// Number of samples in the snapshot.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` when no samples have been captured yet.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SampleWindow
// ---------------------------------------------------------------------------

/// Fixed-capacity ring holding only the latest window of samples.
///
/// Written by the capture callback, read by [`AnalysisTap::current_samples`].
/// When full, new samples overwrite the oldest so the window always reflects
/// the most recent audio.
pub struct SampleWindow {
    inner: Mutex<WindowInner>,
}

struct WindowInner {
    buf: Vec<f32>,
    capacity: usize,
    /// Index of the *next* write position (wraps around `capacity`).
    write_pos: usize,
    /// Number of valid samples currently stored (≤ `capacity`).
    len: usize,
}

impl SampleWindow {
    /// Create a window with the given `capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "SampleWindow capacity must be > 0");
        Self {
            inner: Mutex::new(WindowInner {
                buf: vec![0.0; capacity],
                capacity,
                write_pos: 0,
                len: 0,
            }),
        }
    }

    /// Overwrite the window with `samples` (oldest data drops out first).
    ///
    /// Called from the capture callback — must never block for long or
    /// panic, so a poisoned lock is silently skipped.
    pub(crate) fn push(&self, samples: &[f32]) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        for &sample in samples {
            let pos = inner.write_pos;
            inner.buf[pos] = sample;
            inner.write_pos = (pos + 1) % inner.capacity;
            if inner.len < inner.capacity {
                inner.len += 1;
            }
        }
    }

    /// Copy out the current window in chronological order.
    pub(crate) fn snapshot(&self) -> SampleBuffer {
        let Ok(inner) = self.inner.lock() else {
            return SampleBuffer { samples: Vec::new() };
        };
        if inner.len == 0 {
            return SampleBuffer { samples: Vec::new() };
        }

        // Before the first wrap valid data starts at 0; afterwards the oldest
        // sample sits at `write_pos`.
        let read_pos = if inner.len < inner.capacity {
            0
        } else {
            inner.write_pos
        };

        let mut samples = Vec::with_capacity(inner.len);
        for i in 0..inner.len {
            samples.push(inner.buf[(read_pos + i) % inner.capacity]);
        }
        SampleBuffer { samples }
    }
}

// ---------------------------------------------------------------------------
// AnalysisTap
// ---------------------------------------------------------------------------

/// Read-only view over the live signal; cheap to clone.
///
/// Cloning shares the same window — the at-most-one-tap-per-stream invariant
/// is about attachment, not about how many readers hold the view.  Dropping
/// a clone does **not** detach; detaching is explicit via
/// [`SignalGraph::detach`] (releasing the stream handle also clears the
/// installed window as a safety net).
#[derive(Clone)]
pub struct AnalysisTap {
    pub(crate) window: Arc<SampleWindow>,
    pub(crate) host: Arc<StreamShared>,
}

impl AnalysisTap {
    /// Non-blocking read of the latest windowed amplitude data.
    pub fn current_samples(&self) -> SampleBuffer {
        self.window.snapshot()
    }
}

// ---------------------------------------------------------------------------
// SignalGraph
// ---------------------------------------------------------------------------

/// Owns the analysis configuration and wires taps into live streams.
///
/// One instance is created at orchestrator construction and lives for the
/// application's lifetime — it is process-wide state held by an owner, not
/// an ambient singleton.
pub struct SignalGraph {
    window_len: usize,
}

impl SignalGraph {
    /// Create a graph with the default 2048-sample analysis window.
    pub fn new() -> Self {
        Self::with_window(DEFAULT_ANALYSIS_WINDOW)
    }

    /// Create a graph with an explicit analysis window length.
    pub fn with_window(window_len: usize) -> Self {
        Self { window_len }
    }

    /// Install an analysis window into `handle`'s callback path and return
    /// a tap over it.
    ///
    /// Attaching a second tap to the same handle replaces the first — the
    /// orchestrator never does this, but the callback path only carries one
    /// window slot by design.
    pub fn attach(&self, handle: &InputStreamHandle) -> AnalysisTap {
        let window = Arc::new(SampleWindow::new(self.window_len));
        handle.install_tap(Arc::clone(&window));
        AnalysisTap {
            window,
            host: handle.shared(),
        }
    }

    /// Remove the tap's window from the stream synchronously.
    ///
    /// After this returns the capture callback no longer writes into the
    /// window; existing snapshots remain valid but frozen.
    pub fn detach(&self, tap: AnalysisTap) {
        tap.host.clear_tap();
        log::debug!("analysis tap detached");
    }
}

impl Default for SignalGraph {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
