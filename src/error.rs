//! Error type shared by every analysis stage.

use std::path::PathBuf;

/// Errors raised by interval algebra, spectral estimation and periodicity searches.
///
/// Variants follow four families: malformed input (`InvalidInput`,
/// `LengthMismatch`, `NoSegments`), numeric degeneracy (`ZeroSourceRate`),
/// per-candidate fit failures (`FitConvergence`) and a missing optional
/// statistics backend (`DependencyUnavailable`). The remaining variants come
/// from the batch runner and the artifact persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum TimingError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("length mismatch: {what} ({left} vs {right})")]
    LengthMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },

    #[error("no usable segments of length {segment_length} inside the good time intervals")]
    NoSegments { segment_length: f64 },

    #[error("source count rate is zero; RMS normalization is undefined")]
    ZeroSourceRate,

    #[error("peak fit around {center_freq} Hz did not converge: {reason}")]
    FitConvergence { center_freq: f64, reason: String },

    #[error("statistics backend unavailable: {0}")]
    DependencyUnavailable(&'static str),

    #[error("cannot start worker pool: {0}")]
    WorkerPool(String),

    #[error("unsupported artifact in {path:?}: {reason}")]
    UnsupportedArtifact { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl TimingError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        TimingError::InvalidInput(msg.into())
    }

    /// True for errors caused by the caller's data rather than the environment.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            TimingError::InvalidInput(_)
                | TimingError::LengthMismatch { .. }
                | TimingError::NoSegments { .. }
        )
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TimingError>;
