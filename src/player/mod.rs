//! Reference-track and recording playback.
//!
//! The practice core only needs transport controls and play/pause
//! notifications from a player — it never participates in playback state.
//! [`ReferencePlayer`] is that interface; [`RodioPlayer`] is the thin
//! rodio-backed implementation the app ships, and [`UnavailablePlayer`]
//! stands in when no output device exists so the app still launches.

use std::collections::VecDeque;
use std::io::Cursor;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use thiserror::Error;

// ---------------------------------------------------------------------------
// TransportEvent
// ---------------------------------------------------------------------------

/// Play/pause notifications emitted by a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Started,
    Paused,
}

// ---------------------------------------------------------------------------
// PlayerError
// ---------------------------------------------------------------------------

/// Errors from the playback wrapper.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("no audio output is available: {0}")]
    Output(String),

    #[error("could not decode the loaded track: {0}")]
    Decode(String),

    #[error("no track is loaded")]
    NothingLoaded,
}

// ---------------------------------------------------------------------------
// ReferencePlayer
// ---------------------------------------------------------------------------

/// Transport controls for a single loaded track.
pub trait ReferencePlayer {
    /// Replace the loaded track with `bytes` (any container rodio decodes).
    /// Stops playback of the previous track.
    fn load(&mut self, bytes: Vec<u8>) -> Result<(), PlayerError>;

    /// Start or resume playback of the loaded track.
    fn play(&mut self) -> Result<(), PlayerError>;

    /// Pause playback; `play` resumes from the same position.
    fn pause(&mut self);

    fn is_playing(&self) -> bool;

    /// Drain the next transport notification, if any.
    fn poll_event(&mut self) -> Option<TransportEvent>;
}

// ---------------------------------------------------------------------------
// RodioPlayer
// ---------------------------------------------------------------------------

/// rodio-backed player: one output stream, one sink, one loaded track.
pub struct RodioPlayer {
    // Must outlive the sink; dropping it kills audio output.
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sink: Option<Sink>,
    bytes: Option<Vec<u8>>,
    events: VecDeque<TransportEvent>,
}

impl RodioPlayer {
    /// Open the default output device.
    pub fn new() -> Result<Self, PlayerError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| PlayerError::Output(e.to_string()))?;
        Ok(Self {
            _stream: stream,
            handle,
            sink: None,
            bytes: None,
            events: VecDeque::new(),
        })
    }

    fn start_fresh_sink(&mut self) -> Result<(), PlayerError> {
        let bytes = self.bytes.clone().ok_or(PlayerError::NothingLoaded)?;
        let decoder =
            Decoder::new(Cursor::new(bytes)).map_err(|e| PlayerError::Decode(e.to_string()))?;
        let sink =
            Sink::try_new(&self.handle).map_err(|e| PlayerError::Output(e.to_string()))?;
        sink.append(decoder);
        sink.play();
        self.sink = Some(sink);
        Ok(())
    }
}

impl ReferencePlayer for RodioPlayer {
    fn load(&mut self, bytes: Vec<u8>) -> Result<(), PlayerError> {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.bytes = Some(bytes);
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        match &self.sink {
            // Resume a paused sink that still has audio queued.
            Some(sink) if sink.is_paused() && !sink.empty() => sink.play(),
            // Finished or never started — decode the track again.
            _ => self.start_fresh_sink()?,
        }
        self.events.push_back(TransportEvent::Started);
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            if !sink.is_paused() {
                sink.pause();
                self.events.push_back(TransportEvent::Paused);
            }
        }
    }

    fn is_playing(&self) -> bool {
        self.sink
            .as_ref()
            .is_some_and(|sink| !sink.is_paused() && !sink.empty())
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.events.pop_front()
    }
}

// ---------------------------------------------------------------------------
// UnavailablePlayer — fallback when no output device exists
// ---------------------------------------------------------------------------

/// Player stub used when the output stream cannot be opened; every `play`
/// reports the original failure so the UI shows an actionable message
/// instead of the app refusing to launch.
pub struct UnavailablePlayer {
    reason: String,
}

impl UnavailablePlayer {
    pub fn new(reason: String) -> Self {
        Self { reason }
    }
}

impl ReferencePlayer for UnavailablePlayer {
    fn load(&mut self, _bytes: Vec<u8>) -> Result<(), PlayerError> {
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        Err(PlayerError::Output(self.reason.clone()))
    }

    fn pause(&mut self) {}

    fn is_playing(&self) -> bool {
        false
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // RodioPlayer needs an output device, which CI machines may not have —
    // the unavailable fallback is what we can exercise everywhere.

    #[test]
    fn unavailable_player_reports_the_reason_on_play() {
        let mut player = UnavailablePlayer::new("no output device".into());
        player.load(vec![1, 2, 3]).unwrap();

        let err = player.play().unwrap_err();
        assert!(err.to_string().contains("no output device"));
        assert!(!player.is_playing());
        assert!(player.poll_event().is_none());
    }

    #[test]
    fn unavailable_player_pause_is_a_noop() {
        let mut player = UnavailablePlayer::new("none".into());
        player.pause();
        assert!(!player.is_playing());
    }
}
