//! Element, value and index type traits
//!
//! Matrices are parameterized by a value type `V: Value` (real or complex
//! floating point) and an index type `I: IndexType` (`i32` or `i64`).
//! Both are `Element`s: plain-old-data types that can be staged between
//! memory spaces as raw bytes.

use bytemuck::{Pod, Zeroable};
use num_complex::Complex;
use num_traits::NumAssign;

/// 32-bit complex value type
pub type Complex32 = Complex<f32>;
/// 64-bit complex value type
pub type Complex64 = Complex<f64>;

/// Trait for types that can live in an [`Array`](crate::array::Array)
///
/// Connects Rust's type system to raw device buffers: every element is
/// `Pod`, so host↔device staging is a byte copy.
pub trait Element:
    Copy + Clone + Send + Sync + Pod + Zeroable + PartialEq + std::fmt::Debug + 'static
{
}

impl Element for f32 {}
impl Element for f64 {}
impl Element for i32 {}
impl Element for i64 {}
impl Element for Complex32 {}
impl Element for Complex64 {}

/// Trait for matrix value types
///
/// Real and complex floating-point scalars. `abs` returns the modulus as
/// `f64` so tolerance logic is written once; `conj` is the identity for
/// real types.
pub trait Value: Element + NumAssign + std::iter::Sum {
    /// The real type underlying this value type (`Self` for real types)
    type Real: Value;

    /// Machine epsilon of the underlying real type
    const EPSILON: f64;

    /// Complex conjugate (identity for real types)
    fn conj(self) -> Self;

    /// Modulus as f64
    fn abs(self) -> f64;

    /// Convert from f64 (imaginary part zero for complex types)
    fn from_f64(v: f64) -> Self;

    /// Construct the real type from f64
    fn real_from_f64(v: f64) -> Self::Real {
        <Self::Real as Value>::from_f64(v)
    }

    /// Squared modulus as f64
    #[inline]
    fn abs2(self) -> f64 {
        let a = self.abs();
        a * a
    }
}

impl Value for f32 {
    type Real = f32;
    const EPSILON: f64 = f32::EPSILON as f64;

    #[inline]
    fn conj(self) -> Self {
        self
    }

    #[inline]
    fn abs(self) -> f64 {
        f64::from(self).abs()
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl Value for f64 {
    type Real = f64;
    const EPSILON: f64 = f64::EPSILON;

    #[inline]
    fn conj(self) -> Self {
        self
    }

    #[inline]
    fn abs(self) -> f64 {
        self.abs()
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }
}

impl Value for Complex32 {
    type Real = f32;
    const EPSILON: f64 = f32::EPSILON as f64;

    #[inline]
    fn conj(self) -> Self {
        Complex::new(self.re, -self.im)
    }

    #[inline]
    fn abs(self) -> f64 {
        f64::from(self.norm())
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        Complex::new(v as f32, 0.0)
    }
}

impl Value for Complex64 {
    type Real = f64;
    const EPSILON: f64 = f64::EPSILON;

    #[inline]
    fn conj(self) -> Self {
        Complex::new(self.re, -self.im)
    }

    #[inline]
    fn abs(self) -> f64 {
        self.norm()
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        Complex::new(v, 0.0)
    }
}

/// Trait for sparse index types
///
/// `MAX` doubles as the merge sentinel: no real column index ever equals
/// it, so a source whose head reads `MAX` is exhausted.
pub trait IndexType: Element + Ord + std::hash::Hash {
    /// Largest representable index, used as the merge sentinel
    const MAX: Self;
    /// Zero index
    const ZERO: Self;

    /// Widen to usize
    fn as_usize(self) -> usize;

    /// Narrow from usize
    fn from_usize(v: usize) -> Self;
}

impl IndexType for i32 {
    const MAX: Self = i32::MAX;
    const ZERO: Self = 0;

    #[inline]
    fn as_usize(self) -> usize {
        debug_assert!(self >= 0);
        self as usize
    }

    #[inline]
    fn from_usize(v: usize) -> Self {
        debug_assert!(v <= i32::MAX as usize);
        v as i32
    }
}

impl IndexType for i64 {
    const MAX: Self = i64::MAX;
    const ZERO: Self = 0;

    #[inline]
    fn as_usize(self) -> usize {
        debug_assert!(self >= 0);
        self as usize
    }

    #[inline]
    fn from_usize(v: usize) -> Self {
        v as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_conj_is_identity() {
        assert_eq!(Value::conj(2.5f64), 2.5);
        assert_eq!(Value::conj(-1.5f32), -1.5);
    }

    #[test]
    fn test_complex_conj() {
        let z = Complex64::new(1.0, 2.0);
        assert_eq!(Value::conj(z), Complex64::new(1.0, -2.0));
    }

    #[test]
    fn test_abs() {
        assert_eq!(Value::abs(-3.0f64), 3.0);
        let z = Complex64::new(3.0, 4.0);
        assert!((Value::abs(z) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_index_roundtrip() {
        assert_eq!(<i32 as IndexType>::from_usize(42).as_usize(), 42);
        assert_eq!(<i64 as IndexType>::from_usize(42).as_usize(), 42);
    }
}
