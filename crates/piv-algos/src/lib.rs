//! # piv-algos
//!
//! The numerical heart of the PIV workspace: a radix-2 decimate-in-time
//! 2-D FFT engine and the correlation primitives built on it.
//!
//! - [`fft::Fft`] - per-size engine with precomputed twiddle tables and
//!   lock-free per-thread scratch
//! - [`fft::Fft::transform`] - plain 2-D transform of any
//!   pixel-convertible image
//! - [`fft::Fft::transform_real`] - two real images in one complex pass
//! - [`fft::Fft::cross_correlate`] / [`fft::Fft::auto_correlate`] -
//!   correlation planes with the peak moved to the window centre
//!
//! See [`piv_core`] for the image model these operate on.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod fft;

pub use error::{AlgosError, AlgosResult};
pub use fft::{Direction, Fft};
