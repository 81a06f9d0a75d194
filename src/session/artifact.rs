//! Finalized recording artifacts.
//!
//! A [`RecordingArtifact`] is created once — by the recording controller on
//! stop, or by a file import — and never mutated.  Recording again produces
//! a new artifact that supersedes the old one; nothing is edited in place.
//!
//! The payload is kept verbatim (the exact chunk concatenation, or the
//! imported file bytes); playback bytes and the saved file are *derived*
//! from it, so the capture data is never altered by containerization.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::audio::gateway::{RecordedChunk, StreamFormat};

// ---------------------------------------------------------------------------
// ArtifactEncoding
// ---------------------------------------------------------------------------

/// How the artifact payload is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactEncoding {
    /// Raw 16-bit little-endian PCM captured live.
    PcmS16 { sample_rate: u32, channels: u16 },
    /// An already-encoded container as imported (e.g. `audio/mpeg`).
    Encoded { media_kind: String },
}

// ---------------------------------------------------------------------------
// RecordingArtifact
// ---------------------------------------------------------------------------

/// The finalized, immutable recording handed off after a session ends.
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    id: Uuid,
    payload: Vec<u8>,
    encoding: ArtifactEncoding,
    duration: Duration,
}

impl RecordingArtifact {
    /// Concatenate `chunks` verbatim in arrival order.
    pub(crate) fn from_chunks(chunks: Vec<RecordedChunk>, format: StreamFormat) -> Self {
        let total: usize = chunks.iter().map(|c| c.bytes.len()).sum();
        let mut payload = Vec::with_capacity(total);
        for chunk in &chunks {
            payload.extend_from_slice(&chunk.bytes);
        }

        let duration = format.duration_of_pcm(payload.len());
        Self {
            id: Uuid::new_v4(),
            payload,
            encoding: ArtifactEncoding::PcmS16 {
                sample_rate: format.sample_rate,
                channels: format.channels,
            },
            duration,
        }
    }

    /// Wrap an imported file as a playable artifact.
    ///
    /// Only WAV payloads are probed for duration; other containers report
    /// zero and let the player derive length at decode time.
    pub(crate) fn from_import(media_kind: String, bytes: Vec<u8>) -> Self {
        let duration = probe_wav_duration(&bytes).unwrap_or(Duration::ZERO);
        Self {
            id: Uuid::new_v4(),
            payload: bytes,
            encoding: ArtifactEncoding::Encoded { media_kind },
            duration,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The verbatim payload: the chunk concatenation for live recordings,
    /// the original file bytes for imports.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn encoding(&self) -> &ArtifactEncoding {
        &self.encoding
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Bytes a decoder can play: raw PCM is wrapped into a WAV container,
    /// imported containers pass through untouched.
    pub fn playback_bytes(&self) -> Result<Vec<u8>> {
        match &self.encoding {
            ArtifactEncoding::PcmS16 {
                sample_rate,
                channels,
            } => wrap_pcm_as_wav(&self.payload, *sample_rate, *channels),
            ArtifactEncoding::Encoded { .. } => Ok(self.payload.clone()),
        }
    }

    /// Write the playable file into `dir` and return its path — the
    /// artifact's playback reference for the surrounding application.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating recordings dir {}", dir.display()))?;

        let path = dir.join(format!("{}.{}", self.id, self.file_extension()));
        let bytes = self.playback_bytes()?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("writing recording to {}", path.display()))?;
        Ok(path)
    }

    fn file_extension(&self) -> &'static str {
        match &self.encoding {
            ArtifactEncoding::PcmS16 { .. } => "wav",
            ArtifactEncoding::Encoded { media_kind } => extension_for_media_kind(media_kind),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a media kind to a file extension for the saved artifact.
fn extension_for_media_kind(media_kind: &str) -> &'static str {
    match media_kind
        .split('/')
        .nth(1)
        .unwrap_or("")
        .to_ascii_lowercase()
        .as_str()
    {
        "wav" | "x-wav" | "wave" => "wav",
        "mpeg" | "mp3" => "mp3",
        "mp4" | "m4a" | "x-m4a" => "m4a",
        "ogg" | "vorbis" => "ogg",
        "flac" | "x-flac" => "flac",
        _ => "audio",
    }
}

fn wrap_pcm_as_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: channels.max(1),
        sample_rate: sample_rate.max(1),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("creating WAV writer")?;
        for pair in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .context("writing WAV sample")?;
        }
        writer.finalize().context("finalizing WAV header")?;
    }
    Ok(cursor.into_inner())
}

fn probe_wav_duration(bytes: &[u8]) -> Option<Duration> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    let frames = reader.duration();
    Some(Duration::from_secs_f64(
        frames as f64 / spec.sample_rate as f64,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(bytes: &[u8]) -> RecordedChunk {
        RecordedChunk {
            bytes: bytes.to_vec(),
        }
    }

    // ---- Payload / duration ------------------------------------------------

    #[test]
    fn payload_is_the_verbatim_concatenation() {
        let artifact = RecordingArtifact::from_chunks(
            vec![chunk(&[1, 2]), chunk(&[3, 4]), chunk(&[5, 6])],
            StreamFormat::mono(16_000),
        );
        assert_eq!(artifact.payload(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn empty_artifact_has_zero_duration() {
        let artifact = RecordingArtifact::from_chunks(vec![], StreamFormat::mono(16_000));
        assert!(artifact.is_empty());
        assert_eq!(artifact.duration(), Duration::ZERO);
    }

    #[test]
    fn duration_matches_the_payload_length() {
        // 32 000 bytes of mono i16 at 16 kHz = 1 second.
        let artifact =
            RecordingArtifact::from_chunks(vec![chunk(&[0; 32_000])], StreamFormat::mono(16_000));
        assert!((artifact.duration().as_secs_f64() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn each_artifact_gets_its_own_id() {
        let a = RecordingArtifact::from_chunks(vec![], StreamFormat::mono(16_000));
        let b = RecordingArtifact::from_chunks(vec![], StreamFormat::mono(16_000));
        assert_ne!(a.id(), b.id());
    }

    // ---- Playback derivation -----------------------------------------------

    #[test]
    fn playback_bytes_are_a_valid_wav_container() {
        let artifact = RecordingArtifact::from_chunks(
            vec![chunk(&[0; 3_200])],
            StreamFormat::mono(16_000),
        );

        let wav = artifact.playback_bytes().expect("wav wrap");
        assert_eq!(&wav[0..4], b"RIFF");

        let reader = hound::WavReader::new(Cursor::new(&wav)).expect("readable wav");
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().bits_per_sample, 16);
        // 3 200 bytes = 1 600 mono frames.
        assert_eq!(reader.duration(), 1_600);
    }

    #[test]
    fn wav_wrap_round_trips_the_samples() {
        // Two known samples: 0x0102 and 0x0304 (little-endian).
        let artifact = RecordingArtifact::from_chunks(
            vec![chunk(&[0x02, 0x01, 0x04, 0x03])],
            StreamFormat::mono(8_000),
        );

        let wav = artifact.playback_bytes().expect("wav wrap");
        let mut reader = hound::WavReader::new(Cursor::new(&wav)).expect("readable wav");
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0x0102, 0x0304]);
    }

    #[test]
    fn imported_payload_passes_through_untouched() {
        let bytes = vec![0xde, 0xad, 0xbe, 0xef];
        let artifact = RecordingArtifact::from_import("audio/mpeg".into(), bytes.clone());
        assert_eq!(artifact.payload(), bytes.as_slice());
        assert_eq!(artifact.playback_bytes().unwrap(), bytes);
        assert_eq!(artifact.duration(), Duration::ZERO);
    }

    #[test]
    fn imported_wav_is_probed_for_duration() {
        // Build a 1-second 8 kHz mono WAV through the same wrapper.
        let pcm = RecordingArtifact::from_chunks(
            vec![chunk(&vec![0u8; 16_000])],
            StreamFormat::mono(8_000),
        );
        let wav = pcm.playback_bytes().unwrap();

        let imported = RecordingArtifact::from_import("audio/wav".into(), wav);
        assert!((imported.duration().as_secs_f64() - 1.0).abs() < 1e-9);
    }

    // ---- Saving ------------------------------------------------------------

    #[test]
    fn save_to_writes_the_playback_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let artifact = RecordingArtifact::from_chunks(
            vec![chunk(&[0; 320])],
            StreamFormat::mono(16_000),
        );

        let path = artifact.save_to(dir.path()).expect("save");
        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("wav"));

        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(on_disk, artifact.playback_bytes().unwrap());
    }

    #[test]
    fn save_to_creates_missing_directories() {
        let dir = tempfile::tempdir().expect("temp dir");
        let nested = dir.path().join("a").join("b");
        let artifact = RecordingArtifact::from_chunks(vec![], StreamFormat::mono(16_000));

        let path = artifact.save_to(&nested).expect("save");
        assert!(path.starts_with(&nested));
        assert!(path.exists());
    }

    // ---- Extensions --------------------------------------------------------

    #[test]
    fn media_kind_extensions() {
        assert_eq!(extension_for_media_kind("audio/wav"), "wav");
        assert_eq!(extension_for_media_kind("audio/x-wav"), "wav");
        assert_eq!(extension_for_media_kind("audio/mpeg"), "mp3");
        assert_eq!(extension_for_media_kind("audio/mp4"), "m4a");
        assert_eq!(extension_for_media_kind("audio/ogg"), "ogg");
        assert_eq!(extension_for_media_kind("audio/flac"), "flac");
        assert_eq!(extension_for_media_kind("audio/whatever"), "audio");
    }
}
