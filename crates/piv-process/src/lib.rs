//! # piv-process
//!
//! The parallel batch pipeline: N correlator workers feeding one writer
//! thread through a bounded channel.
//!
//! - [`BatchConfig`] - window size, overlap, worker count, ordering
//! - [`Batch`] - spawn, [`stop`](Batch::stop), [`join`](Batch::join)
//! - [`correlate::process_pair`] / [`correlate::correlate_window`] - the
//!   per-pair and per-window numerics, usable without the pipeline
//!
//! Data flow per pair: load both frames →
//! [interrogation grid](piv_core::grid) →
//! [FFT cross-correlation](piv_algos::Fft) →
//! [peak + sub-pixel fit](piv_core::util) → vector records → writer.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod batch;
pub mod correlate;
pub mod error;

pub use batch::{Batch, BatchSummary, ImagePair, PairResult};
pub use correlate::{BatchConfig, correlate_window, process_pair};
pub use error::{ProcessError, ProcessResult};
pub use piv_io::VectorRecord;
