//! Error types for the FFT engine.

use piv_core::Size;
use thiserror::Error;

/// Result type alias using [`AlgosError`].
pub type AlgosResult<T> = std::result::Result<T, AlgosError>;

/// Errors from FFT construction and correlation.
#[derive(Debug, Error)]
pub enum AlgosError {
    /// Engine dimensions must both be powers of two.
    #[error("dimensions must be powers of two: {size}")]
    NotPowerOfTwo {
        /// The rejected size
        size: Size,
    },

    /// The radix-2 recursion bottoms out at sub-length 4, so each
    /// dimension must be at least 4.
    #[error("dimensions must be at least 4x4: {size}")]
    TooSmall {
        /// The rejected size
        size: Size,
    },

    /// An input image does not match the engine's configured size.
    #[error("image size {got} differs from expected {expected}")]
    SizeMismatch {
        /// The engine's configured size
        expected: Size,
        /// The input image's size
        got: Size,
    },

    /// An error bubbled up from the core image model.
    #[error(transparent)]
    Core(#[from] piv_core::Error),
}
