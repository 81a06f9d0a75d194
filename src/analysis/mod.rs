//! Performance feedback derivation.
//!
//! [`VocalAnalyzer`] is the stable seam between the practice session and
//! whatever produces feedback.  The shipped [`PlaceholderAnalyzer`] returns
//! fixed qualitative commentary regardless of input; a real pitch/timing
//! engine (local DSP or a remote service) can be substituted behind the
//! same trait without touching the session code.

use async_trait::async_trait;
use thiserror::Error;

use crate::session::artifact::RecordingArtifact;

// ---------------------------------------------------------------------------
// AnalysisFeedback
// ---------------------------------------------------------------------------

/// Qualitative feedback for one recording.
///
/// Produced once per artifact; superseded together with the artifact when
/// the user records again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisFeedback {
    /// Pitch commentary (e.g. "Good pitch accuracy").
    pub pitch: String,
    /// Timing commentary (e.g. "Slight timing variations").
    pub timing: String,
    /// Overall encouragement shown under the per-dimension rows.
    pub overall: String,
}

// ---------------------------------------------------------------------------
// AnalysisError
// ---------------------------------------------------------------------------

/// Failures from an analysis backend.
///
/// The placeholder never fails; the variant exists so a remote backend can
/// report problems without changing the trait.
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error("analysis backend failed: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// VocalAnalyzer
// ---------------------------------------------------------------------------

/// Derives [`AnalysisFeedback`] from a finished recording.
#[async_trait]
pub trait VocalAnalyzer: Send + Sync {
    async fn analyze(&self, artifact: &RecordingArtifact)
        -> Result<AnalysisFeedback, AnalysisError>;
}

// ---------------------------------------------------------------------------
// PlaceholderAnalyzer
// ---------------------------------------------------------------------------

/// Fixed-commentary analyzer.
///
/// Returns the same three strings for every artifact.  Kept deliberately —
/// the feedback contract is stable while the real analysis engine is
/// designed separately.
pub struct PlaceholderAnalyzer;

#[async_trait]
impl VocalAnalyzer for PlaceholderAnalyzer {
    async fn analyze(
        &self,
        _artifact: &RecordingArtifact,
    ) -> Result<AnalysisFeedback, AnalysisError> {
        Ok(AnalysisFeedback {
            pitch: "Good pitch accuracy".into(),
            timing: "Slight timing variations".into(),
            overall: "Keep practicing!".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
