//! # piv-core
//!
//! Core types for particle image velocimetry (PIV) processing.
//!
//! This crate provides the data model the rest of the workspace builds on:
//!
//! - [`Size`], [`Point`], [`Vector`], [`Rect`] - geometry primitives
//! - [`Gray`], [`Rgba`], [`Complex`] - pixel families with conversions
//! - [`Image`], [`ImageView`] - owning buffers and borrowed sub-regions
//! - [`expr`] - lazy element-wise expression trees
//! - [`util`] - fills, transposes, quadrant swaps, peak analysis
//! - [`grid`] - interrogation-grid generation
//! - [`log`] - asynchronous sink-based logging
//!
//! ## Crate Structure
//!
//! `piv-core` has no internal dependencies; the other workspace crates
//! layer on top of it:
//!
//! ```text
//! piv-core (this crate)
//!    ^
//!    |
//!    +-- piv-algos (FFT engine, correlation)
//!    +-- piv-io (loaders, vector-field output)
//!    +-- piv-process (batch pipeline)
//!    +-- piv-cli (command line)
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod expr;
pub mod grid;
pub mod image;
pub mod log;
pub mod pixel;
pub mod point;
pub mod rect;
pub mod size;
pub mod util;
pub mod vector;
pub mod view;

// Re-exports for convenience
pub use error::{Error, Result};
pub use image::{
    CfImage, G8Image, G16Image, G32Image, GfImage, Image, ImageLike, ImageLikeMut, Rgba8Image,
    Rgba16Image, Rgba32Image,
};
pub use pixel::{
    C8, C16, C32, CF, Complex, Component, FromPixel, G8, G16, G32, GF, Gray, Pixel, Rgba, Rgba8,
    Rgba16, Rgba32, Yuva,
};
pub use point::{Point, Point2};
pub use rect::Rect;
pub use size::{Size, checked_signed, is_pow2};
pub use vector::{Vector, Vector2};
pub use view::{ImageView, ImageViewMut};

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```
/// use piv_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::expr::{Expr, abs, abs_sqr, conj, imag, real, splat};
    pub use crate::image::{
        CfImage, G16Image, GfImage, Image, ImageLike, ImageLikeMut, Rgba16Image,
    };
    pub use crate::pixel::{CF, Complex, Component, FromPixel, G16, GF, Gray, Pixel, Rgba};
    pub use crate::point::{Point, Point2};
    pub use crate::rect::Rect;
    pub use crate::size::{Size, is_pow2};
    pub use crate::vector::{Vector, Vector2};
    pub use crate::view::{ImageView, ImageViewMut};
}
