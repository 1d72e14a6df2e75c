//! Error types for piv-core operations.
//!
//! All fallible operations in this crate return [`Result`]. The [`Error`]
//! enum covers the failure modes of the core data model:
//!
//! - **Bounds errors**: indexing or regions outside an image
//! - **Dimension errors**: mismatched or invalid image sizes
//! - **Geometry errors**: dilations that would invert a rectangle,
//!   narrowing conversions that would truncate
//! - **Grid errors**: invalid overlap or stride parameters
//!
//! Downstream crates (`piv-algos`, `piv-io`, `piv-process`) wrap this type
//! in their own error enums via `#[from]`.

use crate::rect::Rect;
use crate::size::Size;
use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core image and geometry operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Pixel coordinates are outside image bounds.
    #[error("pixel ({x}, {y}) out of bounds for image {size}")]
    OutOfBounds {
        /// X coordinate that was accessed
        x: u32,
        /// Y coordinate that was accessed
        y: u32,
        /// Image size
        size: Size,
    },

    /// A linear index is outside the pixel buffer.
    #[error("index {index} out of bounds for {len} pixels")]
    IndexOutOfBounds {
        /// Index that was accessed
        index: usize,
        /// Number of pixels available
        len: usize,
    },

    /// A region does not fit within its source image.
    ///
    /// Returned when constructing or resizing an image view, or when
    /// extracting a sub-region.
    #[error("region {region} not contained within {bounds}")]
    InvalidRegion {
        /// The offending region
        region: Rect,
        /// The containing bounds
        bounds: Rect,
    },

    /// Two images were expected to have the same dimensions.
    #[error("dimension mismatch: {a} vs {b}")]
    DimensionMismatch {
        /// First size
        a: Size,
        /// Second size
        b: Size,
    },

    /// A size is not valid for the requested operation.
    #[error("invalid dimensions {size}: {reason}")]
    InvalidDimensions {
        /// The offending size
        size: Size,
        /// Why the size is invalid
        reason: String,
    },

    /// Subtracting sizes would produce a negative component.
    #[error("size underflow: {a} - {b}")]
    SizeUnderflow {
        /// Minuend
        a: Size,
        /// Subtrahend
        b: Size,
    },

    /// A dilation would shrink a rectangle past zero area.
    #[error("unable to dilate rect {rect}: dilation is too large")]
    DilationTooLarge {
        /// The rectangle that was being dilated
        rect: Rect,
    },

    /// A checked unsigned-to-signed conversion would truncate.
    #[error("unsigned value {value} does not fit in a signed component")]
    NarrowingConversion {
        /// The value that could not be converted
        value: u32,
    },

    /// Interrogation-grid overlap outside `[0, 1)`.
    #[error("overlap {overlap} outside [0, 1)")]
    InvalidOverlap {
        /// The offending overlap fraction
        overlap: f64,
    },
}

impl Error {
    /// Creates an [`Error::OutOfBounds`] error.
    #[inline]
    pub fn out_of_bounds(x: u32, y: u32, size: Size) -> Self {
        Self::OutOfBounds { x, y, size }
    }

    /// Creates an [`Error::InvalidRegion`] error.
    #[inline]
    pub fn invalid_region(region: Rect, bounds: Rect) -> Self {
        Self::InvalidRegion { region, bounds }
    }

    /// Creates an [`Error::DimensionMismatch`] error.
    #[inline]
    pub fn dimension_mismatch(a: Size, b: Size) -> Self {
        Self::DimensionMismatch { a, b }
    }

    /// Creates an [`Error::InvalidDimensions`] error.
    #[inline]
    pub fn invalid_dimensions(size: Size, reason: impl Into<String>) -> Self {
        Self::InvalidDimensions {
            size,
            reason: reason.into(),
        }
    }

    /// Returns `true` if this is a bounds-related error.
    #[inline]
    pub fn is_bounds_error(&self) -> bool {
        matches!(
            self,
            Self::OutOfBounds { .. } | Self::IndexOutOfBounds { .. } | Self::InvalidRegion { .. }
        )
    }
}
