//! Microphone acquisition via `cpal`.
//!
//! [`CpalDeviceGateway`] resolves the input device and spawns a dedicated
//! capture thread that owns the `cpal::Stream` (which is not `Send`).  The
//! returned [`InputStreamHandle`] is the only link to that thread: the
//! capture callback downmixes to mono, feeds the attached analysis window,
//! and — while a chunk channel is open — emits [`RecordedChunk`]s in
//! delivery order.  [`InputStreamHandle::release`] is idempotent and joins
//! the thread, so the hardware stream is torn down exactly once no matter
//! how a session ends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::signal::SampleWindow;

// ---------------------------------------------------------------------------
// StreamFormat
// ---------------------------------------------------------------------------

/// Format of the samples delivered by an acquired stream.
///
/// Chunks are always downmixed to mono before delivery, so `channels` is 1
/// for live captures; the type keeps the field so artifacts can describe
/// imported multi-channel audio too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Sample rate in Hz (the device's native rate — no resampling).
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

impl StreamFormat {
    /// Mono format at the given sample rate.
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }

    /// Duration of `byte_len` bytes of 16-bit PCM in this format.
    pub fn duration_of_pcm(&self, byte_len: usize) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = byte_len / 2 / self.channels as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

// ---------------------------------------------------------------------------
// RecordedChunk
// ---------------------------------------------------------------------------

/// A single fragment of encoded audio delivered while recording is active.
///
/// `bytes` is little-endian 16-bit mono PCM.  Chunks are immutable after
/// creation; the recording controller concatenates them verbatim in arrival
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedChunk {
    /// Little-endian i16 mono PCM.
    pub bytes: Vec<u8>,
}

impl RecordedChunk {
    /// Encode mono `f32` samples in `[-1.0, 1.0]` as i16-LE bytes.
    pub(crate) fn from_samples(samples: &[f32]) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        Self { bytes }
    }
}

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Errors that can occur while acquiring the microphone.
///
/// The three variants keep "no permission", "no device" and "device busy"
/// distinguishable so the UI can show an actionable message for each.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// The user (or a system policy) denied input access.
    #[error("microphone access denied — allow input access in the system settings and try again")]
    PermissionDenied,

    /// No capture device is present on the default audio host.
    #[error("no input device found on the default audio host")]
    NoDevice,

    /// A device exists but is busy or rejected the stream configuration.
    #[error("input device is busy or rejected the stream: {0}")]
    DeviceBusy(String),
}

/// cpal has no first-class permission error; backends report denied access
/// as a backend-specific message.  Classify by message text, defaulting to
/// the busy/rejected bucket.
fn classify_backend_message(description: &str) -> DeviceError {
    let lower = description.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not permitted")
    {
        DeviceError::PermissionDenied
    } else {
        DeviceError::DeviceBusy(description.to_string())
    }
}

fn classify_config_error(err: cpal::DefaultStreamConfigError) -> DeviceError {
    match err {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => DeviceError::NoDevice,
        cpal::DefaultStreamConfigError::BackendSpecific { err } => {
            classify_backend_message(&err.description)
        }
        other => DeviceError::DeviceBusy(other.to_string()),
    }
}

fn classify_build_error(err: cpal::BuildStreamError) -> DeviceError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => DeviceError::NoDevice,
        cpal::BuildStreamError::BackendSpecific { err } => {
            classify_backend_message(&err.description)
        }
        other => DeviceError::DeviceBusy(other.to_string()),
    }
}

fn classify_play_error(err: cpal::PlayStreamError) -> DeviceError {
    match err {
        cpal::PlayStreamError::DeviceNotAvailable => DeviceError::NoDevice,
        cpal::PlayStreamError::BackendSpecific { err } => {
            classify_backend_message(&err.description)
        }
    }
}

// ---------------------------------------------------------------------------
// StreamShared — callback-side state
// ---------------------------------------------------------------------------

/// State shared between the capture callback and the handle.
///
/// The callback runs on the audio thread and must never panic, so every
/// lock here is taken with `if let Ok(..)`.
pub(crate) struct StreamShared {
    /// Analysis window installed by `SignalGraph::attach`.
    tap: Mutex<Option<Arc<SampleWindow>>>,
    /// Chunk sender installed while a recording is active.
    chunks: Mutex<Option<mpsc::UnboundedSender<RecordedChunk>>>,
    /// Times the owning handle has been released (at most 1 by contract).
    releases: AtomicUsize,
}

impl StreamShared {
    pub(crate) fn new() -> Self {
        Self {
            tap: Mutex::new(None),
            chunks: Mutex::new(None),
            releases: AtomicUsize::new(0),
        }
    }

    /// Deliver one callback's worth of mono samples to the attached tap and
    /// the open chunk channel.
    pub(crate) fn dispatch(&self, mono: &[f32]) {
        if let Ok(tap) = self.tap.lock() {
            if let Some(window) = tap.as_ref() {
                window.push(mono);
            }
        }
        if let Ok(mut chunks) = self.chunks.lock() {
            let receiver_gone = match chunks.as_ref() {
                Some(tx) => tx.send(RecordedChunk::from_samples(mono)).is_err(),
                None => false,
            };
            if receiver_gone {
                *chunks = None;
            }
        }
    }

    pub(crate) fn install_tap(&self, window: Arc<SampleWindow>) {
        if let Ok(mut tap) = self.tap.lock() {
            *tap = Some(window);
        }
    }

    pub(crate) fn clear_tap(&self) {
        if let Ok(mut tap) = self.tap.lock() {
            *tap = None;
        }
    }

    fn open_chunks(&self) -> mpsc::UnboundedReceiver<RecordedChunk> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut chunks) = self.chunks.lock() {
            *chunks = Some(tx);
        }
        rx
    }

    fn close_chunks(&self) {
        if let Ok(mut chunks) = self.chunks.lock() {
            *chunks = None;
        }
    }

    /// How many times the owning handle has been released.
    #[cfg(test)]
    pub(crate) fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// InputStreamHandle
// ---------------------------------------------------------------------------

/// Opaque handle to an acquired microphone stream.
///
/// Owns the capture thread for the stream's lifetime.  [`release`] is
/// idempotent — a second call (or a `Drop` after an explicit release) does
/// nothing — so the stream is torn down exactly once per capture session.
///
/// [`release`]: InputStreamHandle::release
pub struct InputStreamHandle {
    format: StreamFormat,
    shared: Arc<StreamShared>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
    released: bool,
}

impl InputStreamHandle {
    /// Format of the delivered samples (mono at the device's native rate).
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Returns `true` once the underlying stream has been torn down.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Open chunk delivery from this stream.
    ///
    /// The capture callback starts encoding every buffer it receives into
    /// the returned channel; closing the channel (or releasing the handle)
    /// stops delivery.
    pub(crate) fn open_chunks(&self) -> mpsc::UnboundedReceiver<RecordedChunk> {
        self.shared.open_chunks()
    }

    /// Stop chunk delivery.  Chunks already sent stay queued for the
    /// receiver; the channel closes once the sender is dropped here.
    pub(crate) fn close_chunks(&self) {
        self.shared.close_chunks();
    }

    pub(crate) fn install_tap(&self, window: Arc<SampleWindow>) {
        self.shared.install_tap(window);
    }

    pub(crate) fn shared(&self) -> Arc<StreamShared> {
        Arc::clone(&self.shared)
    }

    /// Tear down the stream: stop chunk delivery, clear the tap slot, and
    /// join the capture thread.  Safe to call any number of times.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.shared.close_chunks();
        self.shared.clear_tap();

        if let Some(stop_tx) = self.stop_tx.take() {
            // The thread also exits on disconnect, so a send error is fine.
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("capture thread panicked during release");
            }
        }

        self.shared.releases.fetch_add(1, Ordering::SeqCst);
        log::debug!("input stream released");
    }

    /// A handle with no capture thread behind it, fed manually through the
    /// returned [`StreamShared`].  Lets session and graph tests run without
    /// audio hardware.
    #[cfg(test)]
    pub(crate) fn detached_for_tests(sample_rate: u32) -> (Self, Arc<StreamShared>) {
        let shared = Arc::new(StreamShared::new());
        let handle = Self {
            format: StreamFormat::mono(sample_rate),
            shared: Arc::clone(&shared),
            stop_tx: None,
            thread: None,
            released: false,
        };
        (handle, shared)
    }
}

impl Drop for InputStreamHandle {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// DeviceGateway
// ---------------------------------------------------------------------------

/// Acquires the microphone input stream.
///
/// `acquire` blocks the calling thread until the platform either delivers a
/// live stream or rejects it — on hosts with a permission prompt this is
/// where the wait happens, and a closed prompt surfaces as
/// [`DeviceError::PermissionDenied`].  No retry is performed; the user
/// re-triggers the acquisition.  Release lives on the handle itself and is
/// idempotent, so callers can drop or release in any order without leaking
/// the stream.
pub trait DeviceGateway: Send + Sync {
    fn acquire(&self) -> Result<InputStreamHandle, DeviceError>;
}

// ---------------------------------------------------------------------------
// CpalDeviceGateway
// ---------------------------------------------------------------------------

/// Production gateway backed by the cpal default host.
pub struct CpalDeviceGateway {
    /// Preferred input device name; `None` or an unknown name falls back to
    /// the system default.
    preferred_device: Option<String>,
}

impl CpalDeviceGateway {
    pub fn new() -> Self {
        Self {
            preferred_device: None,
        }
    }

    pub fn with_device(preferred_device: Option<String>) -> Self {
        Self { preferred_device }
    }

    fn resolve_device(&self, host: &cpal::Host) -> Result<cpal::Device, DeviceError> {
        let desired = self
            .preferred_device
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != "default");

        if let Some(name) = desired {
            if let Ok(devices) = host.input_devices() {
                for device in devices {
                    if device.name().is_ok_and(|n| n == name) {
                        log::info!("using selected input device: {name}");
                        return Ok(device);
                    }
                }
            }
            log::warn!("input device `{name}` not found; falling back to the system default");
        }

        host.default_input_device().ok_or(DeviceError::NoDevice)
    }
}

impl Default for CpalDeviceGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceGateway for CpalDeviceGateway {
    fn acquire(&self) -> Result<InputStreamHandle, DeviceError> {
        let host = cpal::default_host();
        let device = self.resolve_device(&host)?;

        let supported = device
            .default_input_config()
            .map_err(classify_config_error)?;
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        let shared = Arc::new(StreamShared::new());
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();

        let thread = thread::Builder::new()
            .name("practice-capture".into())
            .spawn({
                let shared = Arc::clone(&shared);
                move || run_capture_thread(device, config, channels, shared, ready_tx, stop_rx)
            })
            .map_err(|e| DeviceError::DeviceBusy(e.to_string()))?;

        // Blocks until the stream is live or rejected — the permission
        // prompt, when the platform shows one, happens behind this wait.
        match ready_rx.recv() {
            Ok(Ok(())) => {
                log::info!("audio capture acquired ({sample_rate} Hz, {channels} ch source)");
                Ok(InputStreamHandle {
                    format: StreamFormat::mono(sample_rate),
                    shared,
                    stop_tx: Some(stop_tx),
                    thread: Some(thread),
                    released: false,
                })
            }
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(DeviceError::DeviceBusy(
                    "capture thread exited before the stream was ready".into(),
                ))
            }
        }
    }
}

/// Body of the dedicated capture thread.
///
/// The `cpal::Stream` lives and dies on this thread; the handle reaches it
/// only through `stop_rx`.
fn run_capture_thread(
    device: cpal::Device,
    config: cpal::StreamConfig,
    channels: u16,
    shared: Arc<StreamShared>,
    ready_tx: std_mpsc::Sender<Result<(), DeviceError>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let callback_shared = Arc::clone(&shared);
    let stream = match device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let mono = downmix_to_mono(data, channels);
            callback_shared.dispatch(&mono);
        },
        |err: cpal::StreamError| {
            // An unexpected stream death is not fatal for the session: the
            // recording finalizes with whatever chunks arrived.
            log::error!("capture stream error: {err}");
        },
        None,
    ) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready_tx.send(Err(classify_build_error(err)));
            return;
        }
    };

    if let Err(err) = stream.play() {
        let _ = ready_tx.send(Err(classify_play_error(err)));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Park until release (or handle drop — disconnect also returns).
    let _ = stop_rx.recv();
    drop(stream);
    log::debug!("capture thread stopped");
}

/// Average interleaved frames down to a single mono channel.
fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.to_vec();
    }

    let frames = samples.len() / channels;
    let mut mono = Vec::with_capacity(frames);
    for frame in 0..frames {
        let base = frame * channels;
        let sum: f32 = samples[base..base + channels].iter().sum();
        mono.push(sum / channels as f32);
    }
    mono
}

// ---------------------------------------------------------------------------
// MockDeviceGateway  (test-only)
// ---------------------------------------------------------------------------

/// A test double that hands out detached handles and counts acquisitions
/// and releases, so session tests can run without audio hardware.
#[cfg(test)]
pub(crate) struct MockDeviceGateway {
    fail_with: Mutex<Option<DeviceError>>,
    sample_rate: u32,
    acquired: AtomicUsize,
    last_shared: Mutex<Option<Arc<StreamShared>>>,
}

#[cfg(test)]
impl MockDeviceGateway {
    /// A gateway whose `acquire` always succeeds with a 16 kHz mono handle.
    pub(crate) fn healthy() -> Self {
        Self {
            fail_with: Mutex::new(None),
            sample_rate: 16_000,
            acquired: AtomicUsize::new(0),
            last_shared: Mutex::new(None),
        }
    }

    /// A gateway whose `acquire` always fails with `err`.
    pub(crate) fn failing(err: DeviceError) -> Self {
        Self {
            fail_with: Mutex::new(Some(err)),
            sample_rate: 16_000,
            acquired: AtomicUsize::new(0),
            last_shared: Mutex::new(None),
        }
    }

    pub(crate) fn acquired_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Release count of the most recently acquired handle.
    pub(crate) fn release_count(&self) -> usize {
        self.last_shared
            .lock()
            .unwrap()
            .as_ref()
            .map(|shared| shared.release_count())
            .unwrap_or(0)
    }

    /// Simulate the capture callback delivering `samples`.
    pub(crate) fn feed(&self, samples: &[f32]) {
        if let Some(shared) = self.last_shared.lock().unwrap().as_ref() {
            shared.dispatch(samples);
        }
    }
}

#[cfg(test)]
impl DeviceGateway for MockDeviceGateway {
    fn acquire(&self) -> Result<InputStreamHandle, DeviceError> {
        if let Some(err) = self.fail_with.lock().unwrap().clone() {
            return Err(err);
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let (handle, shared) = InputStreamHandle::detached_for_tests(self.sample_rate);
        *self.last_shared.lock().unwrap() = Some(shared);
        Ok(handle)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- StreamFormat ------------------------------------------------------

    #[test]
    fn pcm_duration_mono() {
        let format = StreamFormat::mono(16_000);
        // 16 000 frames * 2 bytes = 1 second.
        let duration = format.duration_of_pcm(32_000);
        assert!((duration.as_secs_f64() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pcm_duration_of_empty_payload_is_zero() {
        assert_eq!(StreamFormat::mono(48_000).duration_of_pcm(0), Duration::ZERO);
    }

    #[test]
    fn pcm_duration_guards_against_zero_rate() {
        let format = StreamFormat {
            sample_rate: 0,
            channels: 1,
        };
        assert_eq!(format.duration_of_pcm(1_000), Duration::ZERO);
    }

    // ---- RecordedChunk -----------------------------------------------------

    #[test]
    fn chunk_encoding_is_le_i16() {
        let chunk = RecordedChunk::from_samples(&[0.0, 1.0, -1.0]);
        let zero = 0i16.to_le_bytes();
        let max = i16::MAX.to_le_bytes();
        let min = (-i16::MAX).to_le_bytes();
        assert_eq!(chunk.bytes[0..2], zero);
        assert_eq!(chunk.bytes[2..4], max);
        assert_eq!(chunk.bytes[4..6], min);
    }

    #[test]
    fn chunk_encoding_clamps_out_of_range_samples() {
        let chunk = RecordedChunk::from_samples(&[2.0, -3.0]);
        assert_eq!(chunk.bytes[0..2], i16::MAX.to_le_bytes());
        assert_eq!(chunk.bytes[2..4], (-i16::MAX).to_le_bytes());
    }

    // ---- Error classification ----------------------------------------------

    #[test]
    fn backend_message_with_denied_maps_to_permission() {
        assert!(matches!(
            classify_backend_message("Access denied by the user"),
            DeviceError::PermissionDenied
        ));
        assert!(matches!(
            classify_backend_message("Operation not permitted"),
            DeviceError::PermissionDenied
        ));
    }

    #[test]
    fn backend_message_without_permission_hint_maps_to_busy() {
        assert!(matches!(
            classify_backend_message("device is in use by another process"),
            DeviceError::DeviceBusy(_)
        ));
    }

    #[test]
    fn device_not_available_maps_to_no_device() {
        assert!(matches!(
            classify_build_error(cpal::BuildStreamError::DeviceNotAvailable),
            DeviceError::NoDevice
        ));
    }

    #[test]
    fn error_messages_are_distinguishable() {
        let permission = DeviceError::PermissionDenied.to_string();
        let no_device = DeviceError::NoDevice.to_string();
        let busy = DeviceError::DeviceBusy("taken".into()).to_string();
        assert!(permission.contains("denied"));
        assert!(no_device.contains("no input device"));
        assert!(busy.contains("busy"));
    }

    // ---- Downmix -----------------------------------------------------------

    #[test]
    fn mono_input_passes_through() {
        assert_eq!(downmix_to_mono(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    #[test]
    fn stereo_frames_are_averaged() {
        let mono = downmix_to_mono(&[1.0, 0.0, 0.5, 0.5], 2);
        assert_eq!(mono, vec![0.5, 0.5]);
    }

    // ---- Handle lifecycle --------------------------------------------------

    #[test]
    fn release_is_idempotent() {
        let (mut handle, shared) = InputStreamHandle::detached_for_tests(16_000);

        handle.release();
        handle.release();
        handle.release();

        assert!(handle.is_released());
        assert_eq!(shared.release_count(), 1);
    }

    #[test]
    fn drop_after_release_does_not_double_release() {
        let (mut handle, shared) = InputStreamHandle::detached_for_tests(16_000);
        handle.release();
        drop(handle);
        assert_eq!(shared.release_count(), 1);
    }

    #[test]
    fn drop_without_release_releases_once() {
        let (handle, shared) = InputStreamHandle::detached_for_tests(16_000);
        drop(handle);
        assert_eq!(shared.release_count(), 1);
    }

    #[test]
    fn release_stops_chunk_delivery() {
        let (mut handle, shared) = InputStreamHandle::detached_for_tests(16_000);
        let mut rx = handle.open_chunks();

        shared.dispatch(&[0.5]);
        handle.release();
        shared.dispatch(&[0.5]);

        // The chunk sent before release is still queued; the channel then
        // closes without delivering anything sent afterwards.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn chunks_arrive_in_dispatch_order() {
        let (handle, shared) = InputStreamHandle::detached_for_tests(16_000);
        let mut rx = handle.open_chunks();

        shared.dispatch(&[0.1]);
        shared.dispatch(&[0.2]);
        shared.dispatch(&[0.3]);
        handle.close_chunks();

        let mut received = Vec::new();
        while let Some(chunk) = rx.recv().await {
            received.push(chunk);
        }
        assert_eq!(
            received,
            vec![
                RecordedChunk::from_samples(&[0.1]),
                RecordedChunk::from_samples(&[0.2]),
                RecordedChunk::from_samples(&[0.3]),
            ]
        );
    }

    #[test]
    fn dispatch_without_open_channel_is_ignored() {
        let (_handle, shared) = InputStreamHandle::detached_for_tests(16_000);
        // No channel open, no tap installed — must not panic.
        shared.dispatch(&[0.1, 0.2]);
    }
}
