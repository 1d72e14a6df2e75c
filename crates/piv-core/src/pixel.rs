//! Pixel types and conversions.
//!
//! Four parametric pixel families cover the data model:
//!
//! - [`Gray<T>`] - greyscale scalar
//! - [`Rgba<T>`] - four packed colour channels
//! - [`Yuva<T>`] - luma/chroma, kept for loader compatibility
//! - [`Complex<T>`] - real/imaginary pair used by the FFT engine
//!
//! All are `#[repr(C)]`, trivially copyable and free of padding, so an
//! image buffer can be handed to binary codecs row by row.
//!
//! # Conversions
//!
//! Cross-family conversion goes through [`FromPixel`]:
//!
//! - rgba → gray uses ITU-R BT.709 luminance; integer components take the
//!   fast path `(218·R + 732·G + 74·B) / 1024` (the same weights scaled
//!   to 1024), float components use `0.2126·R + 0.7152·G + 0.0722·B`
//! - gray → rgba broadcasts the value with alpha at maximum
//! - gray ↔ complex via `re = v, im = 0` and `v = |z|`
//!
//! # Example
//!
//! ```
//! use piv_core::pixel::{Complex, FromPixel, Gray, Rgba};
//!
//! let g: Gray<u16> = Gray::from_pixel(Rgba::<u16>::new(100, 200, 50, 65535));
//! assert_eq!(g, Gray(167)); // (100*218 + 200*732 + 50*74) >> 10
//!
//! let c: Complex<f64> = Complex::from_pixel(Gray(3.0));
//! assert_eq!(c, Complex::new(3.0, 0.0));
//! ```

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

// ============================================================================
// Rec.709 luminance constants
// ============================================================================

/// Rec.709 luminance coefficient for the red channel.
pub const REC709_LUMA_R: f64 = 0.2126;

/// Rec.709 luminance coefficient for the green channel.
pub const REC709_LUMA_G: f64 = 0.7152;

/// Rec.709 luminance coefficient for the blue channel.
pub const REC709_LUMA_B: f64 = 0.0722;

/// Rec.709 red weight scaled to 1024, for the integer fast path.
pub const REC709_LUMA_1024_R: u64 = 218;

/// Rec.709 green weight scaled to 1024.
pub const REC709_LUMA_1024_G: u64 = 732;

/// Rec.709 blue weight scaled to 1024.
pub const REC709_LUMA_1024_B: u64 = 74;

// ============================================================================
// Component
// ============================================================================

/// A scalar pixel component: the `T` in `Gray<T>`, `Rgba<T>`, `Complex<T>`.
///
/// Implemented for `u8`, `u16`, `u32`, `i8`, `i16`, `i32` and `f64`.
/// Conversions between components are value-preserving casts (saturating
/// for float-to-integer), not range renormalisations.
pub trait Component:
    Copy
    + Default
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + fmt::Debug
    + fmt::Display
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Rem<Output = Self>
    + 'static
{
    /// Largest representable value.
    const MAX: Self;
    /// Smallest representable value.
    const MIN: Self;
    /// Whether this is a floating-point component.
    const IS_FLOAT: bool;

    /// Converts the value to `f64`.
    fn to_f64(self) -> f64;

    /// Converts from `f64` with `as`-cast semantics (saturating for
    /// integer targets).
    fn from_f64(v: f64) -> Self;

    /// BT.709 luminance of an `(r, g, b)` triple in this component's
    /// domain: the 1024-scaled integer path for integers, the float
    /// coefficients otherwise.
    fn luminance(r: Self, g: Self, b: Self) -> Self;
}

macro_rules! int_component {
    ($($t:ty),*) => {$(
        impl Component for $t {
            const MAX: Self = <$t>::MAX;
            const MIN: Self = <$t>::MIN;
            const IS_FLOAT: bool = false;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn luminance(r: Self, g: Self, b: Self) -> Self {
                ((r as i64 * REC709_LUMA_1024_R as i64
                    + g as i64 * REC709_LUMA_1024_G as i64
                    + b as i64 * REC709_LUMA_1024_B as i64)
                    >> 10) as $t
            }
        }
    )*};
}

int_component!(u8, u16, u32, i8, i16, i32);

impl Component for f64 {
    const MAX: Self = f64::MAX;
    const MIN: Self = f64::MIN;
    const IS_FLOAT: bool = true;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn luminance(r: Self, g: Self, b: Self) -> Self {
        REC709_LUMA_R * r + REC709_LUMA_G * g + REC709_LUMA_B * b
    }
}

// ============================================================================
// Pixel marker
// ============================================================================

/// Marker trait for types an [`Image`](crate::image::Image) can contain.
pub trait Pixel:
    Copy + Default + PartialEq + Send + Sync + fmt::Debug + 'static
{
}

impl<T: Component> Pixel for Gray<T> {}
impl<T: Component> Pixel for Rgba<T> {}
impl<T: Component> Pixel for Yuva<T> {}
impl<T: Component> Pixel for Complex<T> {}

/// Element-wise conversion between pixel families.
///
/// This is the seam used by conversion-assignment on images and by the FFT
/// engine when copying arbitrary input into its complex scratch buffer.
pub trait FromPixel<P>: Sized {
    /// Converts `p` into this pixel type.
    fn from_pixel(p: P) -> Self;
}

// ============================================================================
// Gray
// ============================================================================

/// A greyscale pixel wrapping a single component.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Gray<T>(pub T);

impl<T: Component> Gray<T> {
    /// Creates a greyscale pixel.
    #[inline]
    pub const fn new(v: T) -> Self {
        Self(v)
    }

    /// Returns the contained value.
    #[inline]
    pub fn value(self) -> T {
        self.0
    }

    /// Largest representable greyscale value.
    #[inline]
    pub fn max() -> Self {
        Self(T::MAX)
    }

    /// Smallest representable greyscale value.
    #[inline]
    pub fn min() -> Self {
        Self(T::MIN)
    }
}

macro_rules! gray_binop {
    ($($trait:ident, $method:ident);*) => {$(
        impl<T: Component> $trait for Gray<T> {
            type Output = Gray<T>;

            #[inline]
            fn $method(self, rhs: Self) -> Self {
                Gray(self.0.$method(rhs.0))
            }
        }
    )*};
}

gray_binop!(Add, add; Sub, sub; Mul, mul; Div, div; Rem, rem);

impl<T: fmt::Display> fmt::Display for Gray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g({})", self.0)
    }
}

// ============================================================================
// Rgba
// ============================================================================

/// A packed RGBA pixel.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rgba<T> {
    /// Red channel
    pub r: T,
    /// Green channel
    pub g: T,
    /// Blue channel
    pub b: T,
    /// Alpha channel
    pub a: T,
}

impl<T: Component> Rgba<T> {
    /// Creates a pixel from four channels.
    #[inline]
    pub const fn new(r: T, g: T, b: T, a: T) -> Self {
        Self { r, g, b, a }
    }

    /// Broadcasts a greyscale value to all colour channels, alpha at
    /// maximum.
    #[inline]
    pub fn from_value(v: T) -> Self {
        Self {
            r: v,
            g: v,
            b: v,
            a: T::MAX,
        }
    }
}

macro_rules! rgba_binop {
    ($($trait:ident, $method:ident);*) => {$(
        impl<T: Component> $trait for Rgba<T> {
            type Output = Rgba<T>;

            #[inline]
            fn $method(self, rhs: Self) -> Self {
                Rgba {
                    r: self.r.$method(rhs.r),
                    g: self.g.$method(rhs.g),
                    b: self.b.$method(rhs.b),
                    a: self.a.$method(rhs.a),
                }
            }
        }
    )*};
}

rgba_binop!(Add, add; Sub, sub; Mul, mul; Div, div; Rem, rem);

impl<T: fmt::Display> fmt::Display for Rgba<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

// ============================================================================
// Yuva
// ============================================================================

/// A packed YUVA pixel. Not used by the correlation core; present so
/// loaders and conversions have a complete family set.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Yuva<T> {
    /// Luma channel
    pub y: T,
    /// U chroma channel
    pub u: T,
    /// V chroma channel
    pub v: T,
    /// Alpha channel
    pub a: T,
}

impl<T: Component> Yuva<T> {
    /// Creates a pixel from four channels.
    #[inline]
    pub const fn new(y: T, u: T, v: T, a: T) -> Self {
        Self { y, u, v, a }
    }

    /// Creates a pixel from a luma value alone, alpha at maximum.
    #[inline]
    pub fn from_value(y: T) -> Self {
        Self {
            y,
            u: T::default(),
            v: T::default(),
            a: T::MAX,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Yuva<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "yuva({}, {}, {}, {})", self.y, self.u, self.v, self.a)
    }
}

// ============================================================================
// Complex
// ============================================================================

/// A complex pixel with real and imaginary parts.
///
/// Comparison operators order by squared magnitude, which is what peak
/// sorting needs; equality remains exact component equality.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex<T> {
    /// Real part
    pub re: T,
    /// Imaginary part
    pub im: T,
}

impl<T: Component> Complex<T> {
    /// Creates a complex value.
    #[inline]
    pub const fn new(re: T, im: T) -> Self {
        Self { re, im }
    }

    /// Creates a purely real value.
    #[inline]
    pub fn from_real(re: T) -> Self {
        Self {
            re,
            im: T::default(),
        }
    }

    /// Returns the squared magnitude `re² + im²`.
    #[inline]
    pub fn abs_sqr(self) -> T {
        self.re * self.re + self.im * self.im
    }

    /// Returns the magnitude.
    #[inline]
    pub fn abs(self) -> T {
        T::from_f64(self.abs_sqr().to_f64().sqrt())
    }
}

impl<T: Component + Neg<Output = T>> Complex<T> {
    /// Returns the complex conjugate.
    #[inline]
    pub fn conj(self) -> Self {
        Self {
            re: self.re,
            im: -self.im,
        }
    }
}

impl Complex<f64> {
    /// Complex exponential `e^(re) · (cos im + j sin im)`.
    #[inline]
    pub fn exp(self) -> Self {
        let e = self.re.exp();
        Self {
            re: e * self.im.cos(),
            im: e * self.im.sin(),
        }
    }
}

impl<T: Component> Add for Complex<T> {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self {
            re: self.re + rhs.re,
            im: self.im + rhs.im,
        }
    }
}

impl<T: Component> Sub for Complex<T> {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self {
            re: self.re - rhs.re,
            im: self.im - rhs.im,
        }
    }
}

impl<T: Component> Mul for Complex<T> {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let (a, b, c, d) = (self.re, self.im, rhs.re, rhs.im);
        Self {
            re: a * c - b * d,
            im: b * c + a * d,
        }
    }
}

impl<T: Component> Div for Complex<T> {
    type Output = Self;

    #[inline]
    fn div(self, rhs: Self) -> Self {
        let (a, b, c, d) = (self.re, self.im, rhs.re, rhs.im);
        let denom = c * c + d * d;
        Self {
            re: (a * c + b * d) / denom,
            im: (b * c - a * d) / denom,
        }
    }
}

/// Scalar multiply on both parts.
impl<T: Component> Mul<T> for Complex<T> {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: T) -> Self {
        Self {
            re: self.re * rhs,
            im: self.im * rhs,
        }
    }
}

/// Scalar divide on both parts.
impl<T: Component> Div<T> for Complex<T> {
    type Output = Self;

    #[inline]
    fn div(self, rhs: T) -> Self {
        Self {
            re: self.re / rhs,
            im: self.im / rhs,
        }
    }
}

/// Ordering by squared magnitude; complex numbers have no natural order,
/// and magnitude is the ordering peak sorting wants.
impl<T: Component> PartialOrd for Complex<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.abs_sqr().partial_cmp(&other.abs_sqr())
    }
}

impl<T: Component> fmt::Display for Complex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.im.to_f64() < 0.0 { "" } else { "+" };
        write!(f, "complex({} {}{}j)", self.re, sign, self.im)
    }
}

// ============================================================================
// Conversions
// ============================================================================

#[inline]
fn cast<U: Component, T: Component>(v: U) -> T {
    T::from_f64(v.to_f64())
}

impl<T: Component, U: Component> FromPixel<Gray<U>> for Gray<T> {
    #[inline]
    fn from_pixel(p: Gray<U>) -> Self {
        Gray(cast(p.0))
    }
}

impl<T: Component, U: Component> FromPixel<Rgba<U>> for Gray<T> {
    #[inline]
    fn from_pixel(p: Rgba<U>) -> Self {
        Gray(cast(U::luminance(p.r, p.g, p.b)))
    }
}

impl<T: Component, U: Component> FromPixel<Yuva<U>> for Gray<T> {
    #[inline]
    fn from_pixel(p: Yuva<U>) -> Self {
        Gray(cast(p.y))
    }
}

impl<T: Component, U: Component> FromPixel<Complex<U>> for Gray<T> {
    #[inline]
    fn from_pixel(p: Complex<U>) -> Self {
        Gray(cast(p.abs()))
    }
}

impl<T: Component, U: Component> FromPixel<Gray<U>> for Rgba<T> {
    #[inline]
    fn from_pixel(p: Gray<U>) -> Self {
        Rgba::from_value(cast(p.0))
    }
}

impl<T: Component, U: Component> FromPixel<Rgba<U>> for Rgba<T> {
    #[inline]
    fn from_pixel(p: Rgba<U>) -> Self {
        Rgba {
            r: cast(p.r),
            g: cast(p.g),
            b: cast(p.b),
            a: cast(p.a),
        }
    }
}

impl<T: Component, U: Component> FromPixel<Gray<U>> for Complex<T> {
    #[inline]
    fn from_pixel(p: Gray<U>) -> Self {
        Complex::from_real(cast(p.0))
    }
}

impl<T: Component, U: Component> FromPixel<Complex<U>> for Complex<T> {
    #[inline]
    fn from_pixel(p: Complex<U>) -> Self {
        Complex {
            re: cast(p.re),
            im: cast(p.im),
        }
    }
}

// ============================================================================
// Aliases
// ============================================================================

/// 8-bit greyscale pixel.
pub type G8 = Gray<u8>;
/// 16-bit greyscale pixel.
pub type G16 = Gray<u16>;
/// 32-bit greyscale pixel.
pub type G32 = Gray<u32>;
/// Double-precision greyscale pixel.
pub type GF = Gray<f64>;

/// 8-bit signed complex pixel.
pub type C8 = Complex<i8>;
/// 16-bit signed complex pixel.
pub type C16 = Complex<i16>;
/// 32-bit signed complex pixel.
pub type C32 = Complex<i32>;
/// Double-precision complex pixel.
pub type CF = Complex<f64>;

/// 8-bit RGBA pixel.
pub type Rgba8 = Rgba<u8>;
/// 16-bit RGBA pixel.
pub type Rgba16 = Rgba<u16>;
/// 32-bit RGBA pixel.
pub type Rgba32 = Rgba<u32>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gray_arithmetic() {
        let a = Gray(6u16);
        let b = Gray(4u16);
        assert_eq!(a + b, Gray(10));
        assert_eq!(a - b, Gray(2));
        assert_eq!(a * b, Gray(24));
        assert_eq!(a / b, Gray(1));
        assert_eq!(a % b, Gray(2));
    }

    #[test]
    fn test_gray_limits() {
        assert_eq!(G8::max(), Gray(255));
        assert_eq!(G16::max(), Gray(65535));
        assert_eq!(G8::min(), Gray(0));
    }

    #[test]
    fn test_complex_arithmetic() {
        let a = Complex::new(1.0, 2.0);
        let b = Complex::new(3.0, -1.0);
        assert_eq!(a + b, Complex::new(4.0, 1.0));
        assert_eq!(a - b, Complex::new(-2.0, 3.0));
        // (1 + 2j)(3 - 1j) = 3 - 1j + 6j + 2 = 5 + 5j
        assert_eq!(a * b, Complex::new(5.0, 5.0));

        let q = (a * b) / b;
        assert_relative_eq!(q.re, a.re, epsilon = 1e-12);
        assert_relative_eq!(q.im, a.im, epsilon = 1e-12);
    }

    #[test]
    fn test_complex_conj_abs() {
        let c = Complex::new(3.0, 4.0);
        assert_eq!(c.conj(), Complex::new(3.0, -4.0));
        assert_eq!(c.abs_sqr(), 25.0);
        assert_eq!(c.abs(), 5.0);
    }

    #[test]
    fn test_complex_ordering_by_magnitude() {
        let small = Complex::new(1.0, 1.0);
        let large = Complex::new(-3.0, 0.0);
        assert!(small < large);
    }

    #[test]
    fn test_complex_exp() {
        // e^(j·pi) = -1
        let c = Complex::new(0.0, std::f64::consts::PI).exp();
        assert_relative_eq!(c.re, -1.0, epsilon = 1e-12);
        assert_relative_eq!(c.im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rgba_to_gray_integer_path() {
        // (100*218 + 200*732 + 50*74) >> 10 = (21800 + 146400 + 3700) >> 10
        let g: Gray<u16> = Gray::from_pixel(Rgba::<u16>::new(100, 200, 50, 65535));
        assert_eq!(g, Gray(167));
    }

    #[test]
    fn test_rgba_to_gray_float_path() {
        let g: Gray<f64> = Gray::from_pixel(Rgba::<f64>::new(1.0, 1.0, 1.0, 1.0));
        assert_relative_eq!(g.0, 1.0, epsilon = 1e-12);

        let g: Gray<f64> = Gray::from_pixel(Rgba::<f64>::new(0.5, 0.25, 0.125, 1.0));
        assert_relative_eq!(
            g.0,
            0.2126 * 0.5 + 0.7152 * 0.25 + 0.0722 * 0.125,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_gray_to_rgba_broadcast() {
        let p: Rgba<u8> = Rgba::from_pixel(Gray(7u8));
        assert_eq!(p, Rgba::new(7, 7, 7, 255));
    }

    #[test]
    fn test_gray_complex_round_trip() {
        let c: Complex<f64> = Complex::from_pixel(Gray(5.0));
        assert_eq!(c, Complex::new(5.0, 0.0));

        let g: Gray<f64> = Gray::from_pixel(Complex::new(3.0, 4.0));
        assert_eq!(g, Gray(5.0));
    }

    #[test]
    fn test_yuva_to_gray() {
        let g: Gray<u16> = Gray::from_pixel(Yuva::<u16>::new(1000, 2, 3, 4));
        assert_eq!(g, Gray(1000));
    }

    #[test]
    fn test_pixel_layout_is_packed() {
        assert_eq!(std::mem::size_of::<Rgba<u16>>(), 8);
        assert_eq!(std::mem::size_of::<Complex<f64>>(), 16);
        assert_eq!(std::mem::size_of::<Gray<u8>>(), 1);
        assert_eq!(std::mem::size_of::<Yuva<u8>>(), 4);
    }
}
