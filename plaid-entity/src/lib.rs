//! Scalar traits shared by every `plaid` kernel.
//!
//! A scalar is either real ([`RealField`]) or complex ([`ComplexField`] with a real
//! [`ComplexField::Real`] counterpart). Arithmetic goes through the standard operator
//! traits, everything else through the trait methods below.

use bytemuck::Pod;
use core::{
    fmt::Debug,
    ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign},
};
use num_complex::Complex;
use num_traits::Float;

#[allow(non_camel_case_types)]
pub type c32 = Complex<f32>;
#[allow(non_camel_case_types)]
pub type c64 = Complex<f64>;

/// Types that can be stored in a matrix.
///
/// This is blanket-implemented for every plain copyable type, which lets index vectors
/// (e.g. permutation images) live in the same containers as numerical data.
pub trait Entity: Copy + Default + Debug + PartialEq + Send + Sync + 'static {}
impl<T: Copy + Default + Debug + PartialEq + Send + Sync + 'static> Entity for T {}

/// Unit of a field, real or complex.
pub trait ComplexField:
    Entity
    + Pod
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
{
    type Real: RealField;

    /// Whether `Self` is a real type.
    const IS_REAL: bool;

    /// Converts `value` from `f64` to `Self`.
    /// The conversion may be lossy when converting to a type with less precision.
    fn from_f64(value: f64) -> Self;
    /// Returns `value` as the real part of `Self`.
    fn from_real(value: Self::Real) -> Self;
    /// Builds a value from its real and imaginary parts. The imaginary part is dropped for
    /// real types.
    fn from_parts(re: Self::Real, im: Self::Real) -> Self;

    fn zero() -> Self;
    fn one() -> Self;
    /// Returns a NaN value.
    fn nan() -> Self;

    fn real(self) -> Self::Real;
    fn imag(self) -> Self::Real;

    /// Returns `conjugate(self)`.
    fn conj(self) -> Self;
    /// Returns `1.0/self`.
    fn inv(self) -> Self;
    /// Returns the principal square root of `self`.
    fn sqrt(self) -> Self;
    /// Returns the input, scaled by `rhs`.
    fn scale_real(self, rhs: Self::Real) -> Self;

    /// Returns the absolute value of `self`, computed without undue overflow.
    fn abs(self) -> Self::Real;
    /// Returns the squared absolute value of `self`.
    fn abs2(self) -> Self::Real;

    fn is_finite(self) -> bool;
}

/// Unit of a real field.
pub trait RealField: ComplexField<Real = Self> + PartialOrd {
    /// Machine epsilon.
    fn epsilon() -> Self;
    /// Smallest positive normal number.
    fn safe_min() -> Self;

    fn max(self, rhs: Self) -> Self;
    fn min(self, rhs: Self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn powf(self, rhs: Self) -> Self;
    /// Returns `sqrt(self^2 + rhs^2)` without undue overflow or underflow.
    fn hypot(self, rhs: Self) -> Self;
}

#[inline]
fn complex_sqrt<T: Float>(re: T, im: T) -> (T, T) {
    let zero = T::zero();
    let half = T::from(0.5).unwrap_or(zero);
    let im_sign = if im >= zero { T::one() } else { -T::one() };

    let abs = re.hypot(im);
    let sum = re + abs;
    // inexact arithmetic can make the sum slightly negative
    let sum = if sum > zero { sum } else { zero };
    let a = (sum * half).sqrt();
    let b = ((abs - re) * half).sqrt() * im_sign;
    (a, b)
}

#[inline]
fn complex_inv<T: Float>(re: T, im: T) -> (T, T) {
    // scaled division, avoids overflow in re^2 + im^2
    if re.abs() >= im.abs() {
        if re == T::zero() {
            return (T::infinity(), T::zero());
        }
        let r = im / re;
        let d = re + im * r;
        (T::one() / d, -r / d)
    } else {
        let r = re / im;
        let d = re * r + im;
        (r / d, -T::one() / d)
    }
}

macro_rules! impl_real {
    ($ty: ty) => {
        impl ComplexField for $ty {
            type Real = $ty;
            const IS_REAL: bool = true;

            #[inline(always)]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }
            #[inline(always)]
            fn from_real(value: Self::Real) -> Self {
                value
            }
            #[inline(always)]
            fn from_parts(re: Self::Real, _: Self::Real) -> Self {
                re
            }
            #[inline(always)]
            fn zero() -> Self {
                0.0
            }
            #[inline(always)]
            fn one() -> Self {
                1.0
            }
            #[inline(always)]
            fn nan() -> Self {
                <$ty>::NAN
            }
            #[inline(always)]
            fn real(self) -> Self::Real {
                self
            }
            #[inline(always)]
            fn imag(self) -> Self::Real {
                0.0
            }
            #[inline(always)]
            fn conj(self) -> Self {
                self
            }
            #[inline(always)]
            fn inv(self) -> Self {
                1.0 / self
            }
            #[inline(always)]
            fn sqrt(self) -> Self {
                <$ty>::sqrt(self)
            }
            #[inline(always)]
            fn scale_real(self, rhs: Self::Real) -> Self {
                self * rhs
            }
            #[inline(always)]
            fn abs(self) -> Self::Real {
                <$ty>::abs(self)
            }
            #[inline(always)]
            fn abs2(self) -> Self::Real {
                self * self
            }
            #[inline(always)]
            fn is_finite(self) -> bool {
                <$ty>::is_finite(self)
            }
        }

        impl RealField for $ty {
            #[inline(always)]
            fn epsilon() -> Self {
                <$ty>::EPSILON
            }
            #[inline(always)]
            fn safe_min() -> Self {
                <$ty>::MIN_POSITIVE
            }
            #[inline(always)]
            fn max(self, rhs: Self) -> Self {
                <$ty>::max(self, rhs)
            }
            #[inline(always)]
            fn min(self, rhs: Self) -> Self {
                <$ty>::min(self, rhs)
            }
            #[inline(always)]
            fn exp(self) -> Self {
                <$ty>::exp(self)
            }
            #[inline(always)]
            fn ln(self) -> Self {
                <$ty>::ln(self)
            }
            #[inline(always)]
            fn powf(self, rhs: Self) -> Self {
                <$ty>::powf(self, rhs)
            }
            #[inline(always)]
            fn hypot(self, rhs: Self) -> Self {
                <$ty>::hypot(self, rhs)
            }
        }
    };
}

macro_rules! impl_complex {
    ($real: ty) => {
        impl ComplexField for Complex<$real> {
            type Real = $real;
            const IS_REAL: bool = false;

            #[inline(always)]
            fn from_f64(value: f64) -> Self {
                Complex::new(value as $real, 0.0)
            }
            #[inline(always)]
            fn from_real(value: Self::Real) -> Self {
                Complex::new(value, 0.0)
            }
            #[inline(always)]
            fn from_parts(re: Self::Real, im: Self::Real) -> Self {
                Complex::new(re, im)
            }
            #[inline(always)]
            fn zero() -> Self {
                Complex::new(0.0, 0.0)
            }
            #[inline(always)]
            fn one() -> Self {
                Complex::new(1.0, 0.0)
            }
            #[inline(always)]
            fn nan() -> Self {
                Complex::new(<$real>::NAN, <$real>::NAN)
            }
            #[inline(always)]
            fn real(self) -> Self::Real {
                self.re
            }
            #[inline(always)]
            fn imag(self) -> Self::Real {
                self.im
            }
            #[inline(always)]
            fn conj(self) -> Self {
                Complex::new(self.re, -self.im)
            }
            #[inline(always)]
            fn inv(self) -> Self {
                let (re, im) = complex_inv(self.re, self.im);
                Complex::new(re, im)
            }
            #[inline(always)]
            fn sqrt(self) -> Self {
                let (re, im) = complex_sqrt(self.re, self.im);
                Complex::new(re, im)
            }
            #[inline(always)]
            fn scale_real(self, rhs: Self::Real) -> Self {
                Complex::new(self.re * rhs, self.im * rhs)
            }
            #[inline(always)]
            fn abs(self) -> Self::Real {
                <$real>::hypot(self.re, self.im)
            }
            #[inline(always)]
            fn abs2(self) -> Self::Real {
                self.re * self.re + self.im * self.im
            }
            #[inline(always)]
            fn is_finite(self) -> bool {
                self.re.is_finite() && self.im.is_finite()
            }
        }
    };
}

impl_real!(f32);
impl_real!(f64);
impl_complex!(f32);
impl_complex!(f64);
