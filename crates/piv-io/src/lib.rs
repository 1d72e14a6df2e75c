//! # piv-io
//!
//! Image loading and result output for the PIV workspace.
//!
//! - [`loader`] - the [`ImageLoader`](loader::ImageLoader) trait and the
//!   sniff-based [`LoaderRegistry`](loader::LoaderRegistry)
//! - [`pnm`] - binary PGM/PPM read and write
//! - [`tiff`] - baseline TIFF reading (8/16-bit, grey/RGB, multi-image)
//! - [`vector`] - tab-separated vector-field files
//!
//! Loaders are registered explicitly at program start via
//! [`loader::register_default_loaders`]; nothing runs before `main`.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod loader;
pub mod pnm;
pub mod tiff;
pub mod vector;

pub use error::{IoError, IoResult};
pub use loader::{ImageLoader, LoaderRegistry, ReadSeek, register_default_loaders};
pub use pnm::PnmLoader;
pub use tiff::TiffLoader;
pub use vector::{VectorRecord, write_vector_field};
