//! Error types for the batch pipeline.

use piv_core::Size;
use thiserror::Error;

/// Result type alias using [`ProcessError`].
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

/// Errors from batch configuration and correlation.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The two frames of a pair have different dimensions.
    #[error("frame sizes do not match: {a} vs {b}")]
    FrameSizeMismatch {
        /// First frame size
        a: Size,
        /// Second frame size
        b: Size,
    },

    /// Batch parameters do not describe a runnable batch.
    #[error("invalid batch configuration: {reason}")]
    InvalidConfig {
        /// What was wrong
        reason: String,
    },

    /// A correlator worker terminated abnormally.
    #[error("a batch worker panicked")]
    WorkerPanicked,

    /// An error bubbled up from the FFT engine.
    #[error(transparent)]
    Algos(#[from] piv_algos::AlgosError),

    /// An error bubbled up from image I/O.
    #[error(transparent)]
    Io(#[from] piv_io::IoError),

    /// An error bubbled up from the core image model.
    #[error(transparent)]
    Core(#[from] piv_core::Error),
}
