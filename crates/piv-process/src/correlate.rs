//! Per-pair correlation: grid iteration, peak detection, sub-pixel fit.

use crate::error::{ProcessError, ProcessResult};
use piv_algos::Fft;
use piv_core::util::{extract, find_peaks, fit_simple_gaussian};
use piv_core::{GfImage, ImageLike, Point2, Rect, Vector2, grid};
use piv_io::VectorRecord;

/// Peaks requested per correlation plane: primary + secondary for SNR.
const NUM_PEAKS: usize = 2;

/// Neighbourhood radius for the 3×3 sub-pixel fit.
const PEAK_RADIUS: u32 = 1;

/// Batch parameters shared by all workers.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Interrogation window size; both dimensions power-of-two.
    pub interrogation: piv_core::Size,
    /// Fractional window overlap in `[0, 1)`.
    pub overlap: f64,
    /// Number of correlator workers.
    pub threads: usize,
    /// Release results in pair order instead of completion order.
    pub ordered: bool,
    /// Directory receiving one vector file per pair.
    pub output_dir: std::path::PathBuf,
}

impl BatchConfig {
    /// Default worker count: all cores but one, at least one.
    pub fn default_threads() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    }

    /// Output channel capacity: `min(threads, 10)`.
    pub fn channel_capacity(&self) -> usize {
        self.threads.clamp(1, 10)
    }
}

/// Correlates one interrogation window of a frame pair.
///
/// The returned record is in output coordinates: `y` is flipped to grow
/// from the image bottom and the displacement's `v` component is negated
/// to match. A window with fewer than two correlation peaks yields
/// [`VectorRecord::null`].
pub fn correlate_window(
    fft: &Fft,
    a: &GfImage,
    b: &GfImage,
    window: &Rect,
) -> ProcessResult<VectorRecord> {
    let window_a = extract(a, *window)?;
    let window_b = extract(b, *window)?;

    let correlation = fft.cross_correlate(&window_a, &window_b)?;
    let peaks = find_peaks(&correlation, NUM_PEAKS, PEAK_RADIUS);

    let mid: Point2<f64> = window.midpoint().into();
    let xy = Point2::new(mid.x(), f64::from(a.height()) - mid.y());

    if peaks.len() != NUM_PEAKS {
        return Ok(VectorRecord::null(xy));
    }

    let centre = fit_simple_gaussian(&peaks[0])?;
    let displacement = centre
        - Point2::new(
            f64::from(window.width() / 2),
            f64::from(window.height() / 2),
        );

    let primary = peaks[0][(PEAK_RADIUS, PEAK_RADIUS)].0;
    let secondary = peaks[1][(PEAK_RADIUS, PEAK_RADIUS)].0;
    let snr = if secondary > 0.0 {
        primary / secondary
    } else {
        0.0
    };

    Ok(VectorRecord {
        xy,
        v: Vector2::new(displacement.x(), -displacement.y()),
        snr,
        valid: true,
        peak_height: primary,
    })
}

/// Correlates every interrogation window of a frame pair, in grid order.
///
/// `should_stop` is polled between records; returns `Ok(None)` when the
/// batch was cancelled mid-pair (partial record sets are never emitted).
pub fn process_pair(
    fft: &Fft,
    config: &BatchConfig,
    a: &GfImage,
    b: &GfImage,
    should_stop: &dyn Fn() -> bool,
) -> ProcessResult<Option<Vec<VectorRecord>>> {
    if a.size() != b.size() {
        return Err(ProcessError::FrameSizeMismatch {
            a: a.size(),
            b: b.size(),
        });
    }

    let windows = grid::cartesian_grid(a.size(), config.interrogation, config.overlap)?;

    let mut records = Vec::with_capacity(windows.len());
    for window in &windows {
        if should_stop() {
            return Ok(None);
        }
        records.push(correlate_window(fft, a, b, window)?);
    }

    Ok(Some(records))
}
