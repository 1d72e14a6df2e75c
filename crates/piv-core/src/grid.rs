//! Interrogation-grid generation.
//!
//! Produces the list of interrogation windows a PIV pass correlates: a
//! centred cartesian grid of rectangles over the image, spaced either by a
//! fractional overlap or an explicit pixel offset.
//!
//! # Example
//!
//! ```
//! use piv_core::{Size, grid};
//!
//! // 100x50 image, 32x32 windows, 50% overlap: 5 columns x 2 rows,
//! // centred with margins (2, 1)
//! let windows = grid::cartesian_grid(Size::new(100, 50), Size::new(32, 32), 0.5).unwrap();
//! assert_eq!(windows.len(), 10);
//! assert_eq!(windows[0].bottom_left(), piv_core::Point2::new(2, 1));
//! assert_eq!(windows[9].bottom_left(), piv_core::Point2::new(66, 17));
//! ```

use crate::error::{Error, Result};
use crate::point::Point2;
use crate::rect::Rect;
use crate::size::Size;

/// Generates a centred grid of interrogation rectangles with a fractional
/// overlap in `[0, 1)`.
///
/// The stride is `round(window · (1 − overlap))` per axis. Emission is
/// row-major: the row index is the outer loop.
pub fn cartesian_grid(
    image_size: Size,
    interrogation_size: Size,
    overlap: f64,
) -> Result<Vec<Rect>> {
    if !(0.0..1.0).contains(&overlap) {
        return Err(Error::InvalidOverlap { overlap });
    }

    let sx = (interrogation_size.width() as f64 * (1.0 - overlap)).round() as u32;
    let sy = (interrogation_size.height() as f64 * (1.0 - overlap)).round() as u32;

    grid_with_offset(image_size, interrogation_size, (sx, sy))
}

/// Generates a centred grid of interrogation rectangles with an explicit
/// pixel offset between neighbouring windows.
///
/// Every returned rectangle lies wholly inside the image. Emission is
/// row-major: the row index is the outer loop.
pub fn grid_with_offset(
    image_size: Size,
    interrogation_size: Size,
    offset: (u32, u32),
) -> Result<Vec<Rect>> {
    let (iw, ih) = interrogation_size.components();
    let (image_w, image_h) = image_size.components();
    let (sx, sy) = offset;

    if iw == 0 || ih == 0 || iw > image_w || ih > image_h {
        return Err(Error::invalid_dimensions(
            interrogation_size,
            format!("interrogation window must be non-empty and fit in {image_size}"),
        ));
    }
    if sx == 0 || sy == 0 {
        return Err(Error::invalid_dimensions(
            interrogation_size,
            format!("grid offset ({sx}, {sy}) must be at least one pixel"),
        ));
    }

    let nx = 1 + (image_w - iw) / sx;
    let ny = 1 + (image_h - ih) / sy;

    let mx = (image_w - (iw + (nx - 1) * sx)) / 2;
    let my = (image_h - (ih + (ny - 1) * sy)) / 2;

    let mut result = Vec::with_capacity((nx * ny) as usize);
    for j in 0..ny {
        for i in 0..nx {
            result.push(Rect::new(
                Point2::new((mx + i * sx) as i32, (my + j * sy) as i32),
                interrogation_size,
            ));
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_layout_100x50() {
        let grid = cartesian_grid(Size::new(100, 50), Size::new(32, 32), 0.5).unwrap();

        let expected = [
            (2, 1),
            (18, 1),
            (34, 1),
            (50, 1),
            (66, 1),
            (2, 17),
            (18, 17),
            (34, 17),
            (50, 17),
            (66, 17),
        ];
        assert_eq!(grid.len(), expected.len());
        for (rect, (x, y)) in grid.iter().zip(expected) {
            assert_eq!(rect.bottom_left(), Point2::new(x, y));
            assert_eq!(rect.size(), Size::new(32, 32));
        }
    }

    #[test]
    fn test_all_windows_inside_image() {
        let image = Rect::from_size(Size::new(257, 193));
        let grid = cartesian_grid(Size::new(257, 193), Size::new(32, 32), 0.25).unwrap();
        assert!(!grid.is_empty());
        for rect in &grid {
            assert!(rect.within(&image));
        }
    }

    #[test]
    fn test_count_matches_closed_form() {
        let (image_w, image_h, win) = (256, 128, 32);
        let grid =
            cartesian_grid(Size::new(image_w, image_h), Size::new(win, win), 0.5).unwrap();
        let nx = 1 + (image_w - win) / (win / 2);
        let ny = 1 + (image_h - win) / (win / 2);
        assert_eq!(grid.len(), (nx * ny) as usize);
    }

    #[test]
    fn test_strides_are_monotone() {
        let grid = cartesian_grid(Size::new(128, 128), Size::new(32, 32), 0.5).unwrap();
        for pair in grid.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(
                b.left() > a.left() || b.bottom() > a.bottom(),
                "grid emission must be monotone row-major"
            );
        }
    }

    #[test]
    fn test_explicit_offset() {
        let grid = grid_with_offset(Size::new(64, 64), Size::new(32, 32), (32, 32)).unwrap();
        assert_eq!(grid.len(), 4);
        assert_eq!(grid[0].bottom_left(), Point2::new(0, 0));
        assert_eq!(grid[3].bottom_left(), Point2::new(32, 32));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(cartesian_grid(Size::new(64, 64), Size::new(32, 32), 1.0).is_err());
        assert!(cartesian_grid(Size::new(64, 64), Size::new(32, 32), -0.5).is_err());
        assert!(cartesian_grid(Size::new(16, 16), Size::new(32, 32), 0.5).is_err());
        assert!(grid_with_offset(Size::new(64, 64), Size::new(32, 32), (0, 16)).is_err());
    }
}
