//! Radix-2 decimate-in-time 2-D FFT and correlation primitives.
//!
//! [`Fft`] is configured for one power-of-two size and precomputes
//! "twiddle factor" tables per sub-length and direction. On top of the
//! plain transform it offers the PIV correlation primitives: a packed
//! transform of two real images at once, cross-correlation and
//! auto-correlation, all ending with the quadrant swap that moves the
//! correlation peak to the window centre.
//!
//! # Normalisation
//!
//! Transforms are unnormalised: a forward transform followed by a reverse
//! transform scales every pixel by `width * height`. Correlation callers
//! only care about peak *locations* and SNR ratios, so no scaling pass is
//! spent.
//!
//! # Thread Safety
//!
//! An engine is immutable after construction and may be shared freely
//! across threads. Intermediate buffers live in thread-local storage
//! keyed by engine id, so concurrent callers never contend on a lock or
//! share scratch.
//!
//! # Example
//!
//! ```
//! use piv_algos::fft::Fft;
//! use piv_core::{GfImage, Gray, ImageLike, Size, util};
//!
//! let size = Size::new(32, 32);
//! let fft = Fft::new(size).unwrap();
//!
//! let mut a = GfImage::with_size(size);
//! util::fill_with(&mut a, |x, y| Gray(((x as f64 * 0.7).sin() + y as f64).abs()));
//!
//! // the self-correlation peak of an image sits at the window centre
//! let corr = fft.cross_correlate(&a, &a).unwrap();
//! let peaks = util::find_peaks(&corr, 1, 1);
//! assert_eq!(peaks[0].rect().midpoint(), piv_core::Point2::new(16, 16));
//! ```

use crate::error::{AlgosError, AlgosResult};
use piv_core::expr::{Expr, abs_sqr, conj, eval_into, real};
use piv_core::util::{swap_quadrants, transpose_into};
use piv_core::{
    CF, CfImage, Complex, Component, FromPixel, GfImage, Gray, ImageLike, ImageLikeMut, Size,
    is_pow2,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};

/// Transform direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Spatial domain to frequency domain.
    Forward,
    /// Frequency domain to spatial domain (unnormalised).
    Reverse,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        })
    }
}

/// Per-thread intermediate storage for one engine.
struct Scratch {
    /// 2-D working buffer, engine-sized.
    output: CfImage,
    /// Transposed working buffer for the column pass.
    temp: CfImage,
    /// 1-D ping-pong buffer of length `max(width, height)`.
    line: Vec<CF>,
}

thread_local! {
    /// Lazily initialised `(engine id, scratch)` pairs for this thread.
    static SCRATCH: RefCell<Vec<(u64, Scratch)>> = const { RefCell::new(Vec::new()) };
}

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(0);

type TwiddleTables = HashMap<usize, Vec<CF>>;

/// A radix-2 decimate-in-time FFT engine for one power-of-two size.
///
/// Construction fails for non-power-of-two dimensions and for dimensions
/// below 4 (the recursion's smallest twiddle table).
pub struct Fft {
    id: u64,
    size: Size,
    forward: TwiddleTables,
    reverse: TwiddleTables,
}

impl Fft {
    /// Creates an engine for `size`.
    pub fn new(size: Size) -> AlgosResult<Self> {
        if !(is_pow2(size.width() as u64) && is_pow2(size.height() as u64)) {
            return Err(AlgosError::NotPowerOfTwo { size });
        }
        if size.width() < 4 || size.height() < 4 {
            return Err(AlgosError::TooSmall { size });
        }

        Ok(Self {
            id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
            size,
            forward: Self::twiddle_tables(size, Direction::Forward),
            reverse: Self::twiddle_tables(size, Direction::Reverse),
        })
    }

    /// The configured transform size.
    #[inline]
    pub fn size(&self) -> Size {
        self.size
    }

    /// Tables of `cos(θ_i) + j·sin(θ_i)` with `θ_i = s·π·i/n`, for every
    /// power-of-two sub-length `n` from `max(width, height)` down to 4.
    fn twiddle_tables(size: Size, d: Direction) -> TwiddleTables {
        let s = match d {
            Direction::Forward => -1.0,
            Direction::Reverse => 1.0,
        };

        let mut result = HashMap::new();
        let mut n = size.maximal().width() as usize;
        while n > 2 {
            let twiddle = (0..n)
                .map(|i| {
                    let theta = (s * PI * i as f64) / n as f64;
                    Complex::new(theta.cos(), theta.sin())
                })
                .collect();
            result.insert(n, twiddle);
            n /= 2;
        }

        result
    }

    /// Runs `f` with this thread's scratch for this engine, creating it
    /// on first use.
    fn with_scratch<R>(&self, f: impl FnOnce(&Fft, &mut Scratch) -> R) -> R {
        SCRATCH.with(|cell| {
            let mut store = cell.borrow_mut();
            let idx = match store
                .iter()
                .position(|(id, s)| *id == self.id && s.output.size() == self.size)
            {
                Some(idx) => idx,
                None => {
                    let n = self.size.maximal().width() as usize;
                    store.push((
                        self.id,
                        Scratch {
                            output: CfImage::with_size(self.size),
                            temp: CfImage::with_size(self.size.transpose()),
                            line: vec![CF::default(); n],
                        },
                    ));
                    store.len() - 1
                }
            };
            f(self, &mut store[idx].1)
        })
    }

    /// One decimate-in-time butterfly level. `inp` and `out` ping-pong as
    /// the recursion deepens; the final combine at `step == 1` writes the
    /// transform into `inp`.
    fn fft_inner(inp: &mut [CF], out: &mut [CF], scaling: &[CF], n: usize, step: usize) {
        if step >= n {
            return;
        }

        let double = 2 * step;
        Self::fft_inner(out, inp, scaling, n, double);
        Self::fft_inner(&mut out[step..], &mut inp[step..], scaling, n, double);

        let mut i = 0;
        while i < n {
            let e = out[i];
            let o = out[i + step] * scaling[i];
            inp[i / 2] = e + o;
            inp[(i + n) / 2] = e - o;
            i += double;
        }
    }

    /// In-place 1-D FFT over one contiguous row.
    fn fft_row(&self, row: &mut [CF], d: Direction, buf: &mut [CF]) -> AlgosResult<()> {
        let n = row.len();
        let tables = match d {
            Direction::Forward => &self.forward,
            Direction::Reverse => &self.reverse,
        };
        let scaling = tables.get(&n).ok_or(AlgosError::TooSmall {
            size: Size::new(n as u32, n as u32),
        })?;

        buf[..n].copy_from_slice(row);
        Self::fft_inner(row, &mut buf[..n], scaling, n, 1);
        Ok(())
    }

    /// Converts `input` into the complex scratch buffer and runs the 2-D
    /// transform: rows, transpose, rows again, transpose back.
    fn transform_into<I>(&self, s: &mut Scratch, input: &I, d: Direction) -> AlgosResult<()>
    where
        I: ImageLike,
        CF: FromPixel<I::Pixel>,
    {
        if input.size() != self.size {
            return Err(AlgosError::SizeMismatch {
                expected: self.size,
                got: input.size(),
            });
        }

        for h in 0..self.size.height() {
            let src = input.line(h);
            for (dst, &p) in s.output.line_mut(h).iter_mut().zip(src.iter()) {
                *dst = CF::from_pixel(p);
            }
        }

        self.transform_scratch(s, d)
    }

    /// The 2-D pass over whatever `s.output` currently holds.
    fn transform_scratch(&self, s: &mut Scratch, d: Direction) -> AlgosResult<()> {
        for h in 0..s.output.height() {
            self.fft_row(s.output.line_mut(h), d, &mut s.line)?;
        }

        transpose_into(&s.output, &mut s.temp)?;

        for h in 0..s.temp.height() {
            self.fft_row(s.temp.line_mut(h), d, &mut s.line)?;
        }

        transpose_into(&s.temp, &mut s.output)?;
        Ok(())
    }

    /// Performs a 2-D FFT of any pixel-convertible image, producing a
    /// complex double image.
    ///
    /// Fails if `input` is not the engine's size.
    pub fn transform<I>(&self, input: &I, d: Direction) -> AlgosResult<CfImage>
    where
        I: ImageLike,
        CF: FromPixel<I::Pixel>,
    {
        self.with_scratch(|fft, s| {
            fft.transform_into(s, input, d)?;
            Ok(s.output.clone())
        })
    }

    /// Transforms two real images in a single complex pass.
    ///
    /// `a` is packed into the real plane and `b` into the imaginary
    /// plane; the combined spectrum is unravelled by conjugate symmetry
    /// over `1 <= h < height/2`, `1 <= w < width`.
    pub fn transform_real<I, T>(
        &self,
        a: &I,
        b: &I,
        d: Direction,
    ) -> AlgosResult<(CfImage, CfImage)>
    where
        I: ImageLike<Pixel = Gray<T>>,
        T: Component,
    {
        if a.size() != self.size || b.size() != self.size {
            return Err(AlgosError::SizeMismatch {
                expected: self.size,
                got: if a.size() != self.size {
                    a.size()
                } else {
                    b.size()
                },
            });
        }

        self.with_scratch(|fft, s| {
            for h in 0..fft.size.height() {
                let (la, lb) = (a.line(h), b.line(h));
                for (w, dst) in s.output.line_mut(h).iter_mut().enumerate() {
                    *dst = Complex::new(la[w].0.to_f64(), lb[w].0.to_f64());
                }
            }
            fft.transform_scratch(s, d)?;

            let (width, height) = fft.size.components();
            let mut out_a = CfImage::with_size(fft.size);
            let mut out_b = CfImage::with_size(fft.size);

            for h in 1..height / 2 {
                for w in 1..width {
                    let t1 = s.output[(w, h)];
                    let t2 = s.output[(width - w, height - h)];

                    let va = (t1 + t2.conj()) * 0.5;
                    out_a[(w, h)] = va;
                    out_a[(width - w, height - h)] = va.conj();

                    let vb = (t1 - t2.conj()) * 0.5;
                    // multiply by -j to recover the imaginary plane
                    let vb = Complex::new(vb.im, -vb.re);
                    out_b[(w, h)] = vb;
                    out_b[(width - w, height - h)] = vb.conj();
                }
            }

            Ok((out_a, out_b))
        })
    }

    /// Cross-correlates `a` against `b`: `F_b · conj(F_a)`, reverse
    /// transform, real part, quadrants swapped so the peak of an
    /// unshifted pair lands at the window centre.
    pub fn cross_correlate<I>(&self, a: &I, b: &I) -> AlgosResult<GfImage>
    where
        I: ImageLike,
        CF: FromPixel<I::Pixel>,
    {
        self.with_scratch(|fft, s| {
            fft.transform_into(s, a, Direction::Forward)?;
            let a_fft = s.output.clone();

            fft.transform_into(s, b, Direction::Forward)?;
            let mut product = CfImage::new();
            eval_into(&(s.output.expr() * conj(a_fft.expr())), &mut product);

            fft.transform_into::<CfImage>(s, &product, Direction::Reverse)?;
            let mut out = real(s.output.expr()).eval();
            swap_quadrants(&mut out);
            Ok(out)
        })
    }

    /// Cross-correlation of two real images using the packed
    /// [`transform_real`](Fft::transform_real) path: one forward FFT
    /// instead of two.
    pub fn cross_correlate_real<I, T>(&self, a: &I, b: &I) -> AlgosResult<GfImage>
    where
        I: ImageLike<Pixel = Gray<T>>,
        T: Component,
    {
        let (a_fft, b_fft) = self.transform_real(a, b, Direction::Forward)?;
        let product = (b_fft.expr() * conj(a_fft.expr())).eval();

        self.with_scratch(|fft, s| {
            fft.transform_into::<CfImage>(s, &product, Direction::Reverse)?;
            let mut out = real(s.output.expr()).eval();
            swap_quadrants(&mut out);
            Ok(out)
        })
    }

    /// Auto-correlates `a`: `|F_a|²`, reverse transform, real part,
    /// quadrants swapped.
    pub fn auto_correlate<I>(&self, a: &I) -> AlgosResult<GfImage>
    where
        I: ImageLike,
        CF: FromPixel<I::Pixel>,
    {
        self.with_scratch(|fft, s| {
            fft.transform_into(s, a, Direction::Forward)?;
            let power: GfImage = abs_sqr(s.output.expr()).eval();

            fft.transform_into::<GfImage>(s, &power, Direction::Reverse)?;
            let mut out = real(s.output.expr()).eval();
            swap_quadrants(&mut out);
            Ok(out)
        })
    }
}

impl std::fmt::Debug for Fft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft").field("size", &self.size).finish()
    }
}
