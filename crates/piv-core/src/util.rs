//! Image utilities: fills, transforms, channel plumbing and peak analysis.
//!
//! Everything here is generic over [`ImageLike`]/[`ImageLikeMut`], so the
//! same operations work on owning images and borrowed views.

use crate::error::{Error, Result};
use crate::image::{Image, ImageLike, ImageLikeMut};
use crate::pixel::{Complex, Component, Gray, Rgba};
use crate::point::Point2;
use crate::rect::Rect;
use crate::size::Size;

/// Fills an image with a constant value.
pub fn fill<I: ImageLikeMut>(im: &mut I, v: I::Pixel) {
    for h in 0..im.height() {
        for p in im.line_mut(h) {
            *p = v;
        }
    }
}

/// Fills an image from a generator called with `(x, y)`.
///
/// # Example
///
/// ```
/// use piv_core::{GfImage, Gray, Size, util};
///
/// let mut im = GfImage::with_size(Size::new(4, 4));
/// util::fill_with(&mut im, |x, y| Gray((x + y) as f64));
/// assert_eq!(im[(3, 2)], Gray(5.0));
/// ```
pub fn fill_with<I, F>(im: &mut I, mut g: F)
where
    I: ImageLikeMut,
    F: FnMut(u32, u32) -> I::Pixel,
{
    for h in 0..im.height() {
        for (w, p) in im.line_mut(h).iter_mut().enumerate() {
            *p = g(w as u32, h);
        }
    }
}

/// Updates every pixel in place; `op` receives the linear index so fills
/// can depend on position.
pub fn apply<I, F>(im: &mut I, mut op: F)
where
    I: ImageLikeMut,
    F: FnMut(usize, I::Pixel) -> I::Pixel,
{
    let w = im.width() as usize;
    for h in 0..im.height() {
        let base = h as usize * w;
        for (i, p) in im.line_mut(h).iter_mut().enumerate() {
            *p = op(base + i, *p);
        }
    }
}

/// Sums all pixels of a greyscale image into an `f64` accumulator.
///
/// Exact for integer images whose total stays below 2^53.
pub fn pixel_sum<I, T>(im: &I) -> f64
where
    I: ImageLike<Pixel = Gray<T>>,
    T: Component,
{
    let mut sum = 0.0;
    for h in 0..im.height() {
        for p in im.line(h) {
            sum += p.0.to_f64();
        }
    }
    sum
}

/// Returns `(min, max)` over all pixels of a greyscale image, or `None`
/// for an empty image.
pub fn pixel_range<I, T>(im: &I) -> Option<(T, T)>
where
    I: ImageLike<Pixel = Gray<T>>,
    T: Component,
{
    if im.pixel_count() == 0 {
        return None;
    }
    let mut min = im.at(0, 0).0;
    let mut max = min;
    for h in 0..im.height() {
        for p in im.line(h) {
            if p.0 < min {
                min = p.0;
            }
            if p.0 > max {
                max = p.0;
            }
        }
    }
    Some((min, max))
}

/// Transposes `src` into `dst`; `dst` must already have the transposed
/// dimensions.
pub fn transpose_into<I, O>(src: &I, dst: &mut O) -> Result<()>
where
    I: ImageLike,
    O: ImageLikeMut<Pixel = I::Pixel>,
{
    if dst.size() != src.size().transpose() {
        return Err(Error::dimension_mismatch(src.size(), dst.size()));
    }

    for h in 0..src.height() {
        let line = src.line(h);
        for w in 0..src.width() {
            dst.line_mut(w)[h as usize] = line[w as usize];
        }
    }

    Ok(())
}

/// Returns a newly allocated transposed copy.
pub fn transpose<I: ImageLike>(src: &I) -> Image<I::Pixel> {
    let mut out = Image::with_size(src.size().transpose());
    // sizes match by construction
    let _ = transpose_into(src, &mut out);
    out
}

/// Swaps diagonal quadrants in place (Q1 ↔ Q3, Q2 ↔ Q4).
///
/// For even dimensions this moves the DC bin of an FFT output between the
/// corner and the centre and is its own inverse. Odd dimensions split at
/// `floor(width/2)`, `floor(height/2)`.
pub fn swap_quadrants<I: ImageLikeMut>(im: &mut I) {
    let (width, height) = im.size().components();

    for h in 0..height {
        let o = (h + height / 2) % height;
        for w in 0..width / 2 {
            im.swap_pixels((w, h), ((w + width / 2) % width, o));
        }
    }
}

/// Splits an RGBA image into `(r, g, b, a)` greyscale planes.
pub fn split_rgba<I, T>(
    im: &I,
) -> (
    Image<Gray<T>>,
    Image<Gray<T>>,
    Image<Gray<T>>,
    Image<Gray<T>>,
)
where
    I: ImageLike<Pixel = Rgba<T>>,
    T: Component,
{
    let size = im.size();
    let mut r = Image::with_size(size);
    let mut g = Image::with_size(size);
    let mut b = Image::with_size(size);
    let mut a = Image::with_size(size);

    for h in 0..im.height() {
        for (w, p) in im.line(h).iter().enumerate() {
            let w = w as u32;
            r.set(w, h, Gray(p.r));
            g.set(w, h, Gray(p.g));
            b.set(w, h, Gray(p.b));
            a.set(w, h, Gray(p.a));
        }
    }

    (r, g, b, a)
}

/// Joins four greyscale planes into an RGBA image; all planes must have
/// matching dimensions.
pub fn join_rgba<I, T>(r: &I, g: &I, b: &I, a: &I) -> Result<Image<Rgba<T>>>
where
    I: ImageLike<Pixel = Gray<T>>,
    T: Component,
{
    if r.size() != g.size() || g.size() != b.size() || b.size() != a.size() {
        return Err(Error::dimension_mismatch(r.size(), a.size()));
    }

    let mut out = Image::with_size(r.size());
    for h in 0..r.height() {
        let (rl, gl, bl, al) = (r.line(h), g.line(h), b.line(h), a.line(h));
        for (w, p) in out.line_mut(h).iter_mut().enumerate() {
            *p = Rgba::new(rl[w].0, gl[w].0, bl[w].0, al[w].0);
        }
    }

    Ok(out)
}

/// Splits a complex image into `(real, imag)` greyscale planes.
pub fn split_complex<I, T>(im: &I) -> (Image<Gray<T>>, Image<Gray<T>>)
where
    I: ImageLike<Pixel = Complex<T>>,
    T: Component,
{
    let size = im.size();
    let mut re = Image::with_size(size);
    let mut imag = Image::with_size(size);

    for h in 0..im.height() {
        for (w, p) in im.line(h).iter().enumerate() {
            re.set(w as u32, h, Gray(p.re));
            imag.set(w as u32, h, Gray(p.im));
        }
    }

    (re, imag)
}

/// Joins `(real, imag)` greyscale planes into a complex image; the planes
/// must have matching dimensions.
pub fn join_complex<I, T>(re: &I, im: &I) -> Result<Image<Complex<T>>>
where
    I: ImageLike<Pixel = Gray<T>>,
    T: Component,
{
    if re.size() != im.size() {
        return Err(Error::dimension_mismatch(re.size(), im.size()));
    }

    let mut out = Image::with_size(re.size());
    for h in 0..re.height() {
        let (rl, il) = (re.line(h), im.line(h));
        for (w, p) in out.line_mut(h).iter_mut().enumerate() {
            *p = Complex::new(rl[w].0, il[w].0);
        }
    }

    Ok(out)
}

/// Copies the sub-region `r` (given in the source's global frame) into a
/// new owning image that keeps `r` as its rectangle.
///
/// `extract(im, im.rect())` is an identity copy.
pub fn extract<I: ImageLike>(im: &I, r: Rect) -> Result<Image<I::Pixel>> {
    let bounds = im.rect();
    if !r.within(&bounds) {
        return Err(Error::invalid_region(r, bounds));
    }

    let x0 = (r.left() - bounds.left()) as usize;
    let y0 = (r.bottom() - bounds.bottom()) as u32;

    let mut data = Vec::with_capacity(r.area());
    for h in 0..r.height() {
        let line = im.line(y0 + h);
        data.extend_from_slice(&line[x0..x0 + r.width() as usize]);
    }

    let mut out = Image::from_data(r.size(), data)?;
    out.set_origin(r.bottom_left());
    Ok(out)
}

/// Finds up to `num_peaks` local maxima and returns their `(2r+1)²`
/// neighbourhoods as owning images, sorted descending by centre value.
/// Ties keep insertion (scan) order.
///
/// A pixel is a peak iff strictly greater than its four 4-connected
/// neighbours. The scan covers `[radius, width - radius)` horizontally
/// but `[radius, height - 2·radius)` vertically: the vertical range
/// stops one extra radius short of the top edge, so maxima in that band
/// are never reported.
///
/// Returns fewer than `num_peaks` images when fewer maxima exist.
pub fn find_peaks<I>(im: &I, num_peaks: usize, radius: u32) -> Vec<Image<I::Pixel>>
where
    I: ImageLike,
    I::Pixel: PartialOrd,
{
    let mut result = Vec::new();
    if radius == 0 {
        // a 1x1 neighbourhood has no interior to scan
        return result;
    }

    let bl = im.rect().bottom_left();
    let width = im.width() as i64;
    let height = im.height() as i64;
    let r = radius as i64;
    let side = 2 * radius + 1;

    let mut h = r;
    while h < height - 2 * r {
        let above = im.line(h as u32 - 1);
        let line = im.line(h as u32);
        let below = im.line(h as u32 + 1);

        let mut w = r;
        while w < width - r {
            let wu = w as usize;
            if line[wu - 1] < line[wu]
                && line[wu + 1] < line[wu]
                && above[wu] < line[wu]
                && below[wu] < line[wu]
            {
                let peak_rect = Rect::new(
                    Point2::new(bl.x() + (w - r) as i32, bl.y() + (h - r) as i32),
                    Size::new(side, side),
                );
                if let Ok(peak) = extract(im, peak_rect) {
                    result.push(peak);
                }
            }
            w += 1;
        }
        h += 1;
    }

    // stable descending sort on the centre pixel
    result.sort_by(|a, b| {
        let ca = a.at(radius, radius);
        let cb = b.at(radius, radius);
        cb.partial_cmp(&ca).unwrap_or(std::cmp::Ordering::Equal)
    });
    result.truncate(num_peaks);

    result
}

/// Refines a 3×3 peak to sub-pixel accuracy with two one-dimensional
/// three-point Gaussian fits.
///
/// For axis samples `(l, c, r)` the offset is
/// `(ln l − ln r) / (2(ln l + ln r − 2 ln c))`; a zero denominator or a
/// non-positive sample contributes no offset. The returned point is the
/// peak rectangle's midpoint plus the two offsets, in the peak's global
/// frame.
///
/// Fails if the input is not exactly 3×3.
pub fn fit_simple_gaussian<I, T>(peak: &I) -> Result<Point2<f64>>
where
    I: ImageLike<Pixel = Gray<T>>,
    T: Component,
{
    if peak.size() != Size::new(3, 3) {
        return Err(Error::invalid_dimensions(
            peak.size(),
            "sub-pixel fit requires a 3x3 peak",
        ));
    }

    fn axis_offset(l: f64, c: f64, r: f64) -> f64 {
        if l <= 0.0 || c <= 0.0 || r <= 0.0 {
            return 0.0;
        }
        let num = l.ln() - r.ln();
        let den = 2.0 * (l.ln() + r.ln() - 2.0 * c.ln());
        if den == 0.0 { 0.0 } else { num / den }
    }

    let v = |x: u32, y: u32| peak.at(x, y).0.to_f64();
    let mid: Point2<f64> = peak.rect().midpoint().into();

    Ok(Point2::new(
        mid.x() + axis_offset(v(0, 1), v(1, 1), v(2, 1)),
        mid.y() + axis_offset(v(1, 0), v(1, 1), v(1, 2)),
    ))
}
