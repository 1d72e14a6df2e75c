//! Tab-separated vector-field output.
//!
//! One text file per image pair: a header line, then one record per
//! interrogation window in grid order. Coordinates are already in
//! bottom-origin convention by the time records reach this writer (the
//! correlator flips `y` and negates `v`).
//!
//! ```text
//! x\ty\tu\tv\tsnr\tvalid\tfiltered\tintensity
//! ```

use crate::error::IoResult;
use piv_core::{Point2, Vector2};
use std::io::Write;

/// One displacement vector measured in one interrogation window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorRecord {
    /// Window centre in image coordinates (y grows upward).
    pub xy: Point2<f64>,
    /// Displacement in pixels (v sign matches the y convention).
    pub v: Vector2<f64>,
    /// Primary-to-secondary peak ratio; 0 when unavailable.
    pub snr: f64,
    /// `false` for windows where no displacement could be measured.
    pub valid: bool,
    /// Correlation height of the primary peak.
    pub peak_height: f64,
}

impl VectorRecord {
    /// The record emitted for a window with no usable correlation peak.
    pub fn null(xy: Point2<f64>) -> Self {
        Self {
            xy,
            v: Vector2::new(0.0, 0.0),
            snr: 0.0,
            valid: false,
            peak_height: 0.0,
        }
    }
}

/// Writes a header line and all records, tab-separated.
///
/// `filtered` is always 0: the correlation core applies no outlier
/// filters.
pub fn write_vector_field<W: Write>(os: &mut W, records: &[VectorRecord]) -> IoResult<()> {
    writeln!(os, "x\ty\tu\tv\tsnr\tvalid\tfiltered\tintensity")?;
    for r in records {
        writeln!(
            os,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            r.xy.x(),
            r.xy.y(),
            r.v.x(),
            r.v.y(),
            r.snr,
            u8::from(r.valid),
            0,
            r.peak_height,
        )?;
    }
    os.flush()?;
    Ok(())
}
