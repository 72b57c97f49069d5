//! Serial row cores for dense kernels
//!
//! Shared by the reference client (whole-matrix loops) and the host
//! client (rayon over rows). All cores respect the row stride: entries
//! beyond the logical column count are padding and are never touched.

use crate::dtype::Value;

/// One output row of `x = alpha * a * b + beta * x`
///
/// `a` is `m x k` with row stride `a_stride`, `b` is `k x n` with row
/// stride `b_stride`; `xrow` is row `r` of the output, `n` entries.
#[allow(clippy::too_many_arguments)]
#[inline]
pub(crate) fn gemm_row<V: Value>(
    r: usize,
    a: &[V],
    a_stride: usize,
    k: usize,
    b: &[V],
    b_stride: usize,
    n: usize,
    alpha: V,
    beta: V,
    xrow: &mut [V],
) {
    use num_traits::Zero;
    for c in 0..n {
        let mut sum = V::zero();
        for kk in 0..k {
            sum += a[r * a_stride + kk] * b[kk * b_stride + c];
        }
        let out = &mut xrow[c];
        *out = if beta.is_zero() {
            alpha * sum
        } else {
            alpha * sum + beta * *out
        };
    }
}

/// Scale the logical entries of one row: `xrow[..n] *= alpha`
#[inline]
pub(crate) fn scale_row<V: Value>(alpha: V, n: usize, xrow: &mut [V]) {
    for entry in &mut xrow[..n] {
        *entry *= alpha;
    }
}

/// Scaled accumulation on one row: `xrow[..n] += alpha * brow[..n]`
#[inline]
pub(crate) fn add_scaled_row<V: Value>(alpha: V, n: usize, brow: &[V], xrow: &mut [V]) {
    for (out, &bv) in xrow[..n].iter_mut().zip(&brow[..n]) {
        *out += alpha * bv;
    }
}

/// Per-column dot products: `out[c] = sum_r conj?(a[r,c]) * b[r,c]`
#[allow(clippy::too_many_arguments)]
pub(crate) fn dot_columns<V: Value>(
    conjugate: bool,
    rows: usize,
    cols: usize,
    a: &[V],
    a_stride: usize,
    b: &[V],
    b_stride: usize,
    out: &mut [V],
) {
    use num_traits::Zero;
    for c in 0..cols {
        let mut sum = V::zero();
        for r in 0..rows {
            let left = a[r * a_stride + c];
            let left = if conjugate { left.conj() } else { left };
            sum += left * b[r * b_stride + c];
        }
        out[c] = sum;
    }
}

/// Per-column Euclidean norms: `out[c] = sqrt(sum_r |a[r,c]|^2)`
pub(crate) fn norm2_columns<V: Value>(
    rows: usize,
    cols: usize,
    a: &[V],
    a_stride: usize,
    out: &mut [V::Real],
) {
    for c in 0..cols {
        let mut sum = 0.0f64;
        for r in 0..rows {
            sum += a[r * a_stride + c].abs2();
        }
        out[c] = V::real_from_f64(sum.sqrt());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemm_row() {
        // a = [[1, 2]], b = [[3, 0], [1, 1]]
        let a = [1.0f64, 2.0];
        let b = [3.0, 0.0, 1.0, 1.0];
        let mut xrow = [0.0; 2];
        gemm_row(0, &a, 2, 2, &b, 2, 2, 1.0, 0.0, &mut xrow);
        assert_eq!(xrow, [5.0, 2.0]);
    }

    #[test]
    fn test_gemm_row_beta() {
        let a = [2.0f64];
        let b = [3.0];
        let mut xrow = [10.0];
        gemm_row(0, &a, 1, 1, &b, 1, 1, 1.0, 0.5, &mut xrow);
        assert_eq!(xrow, [11.0]);
    }

    #[test]
    fn test_dot_columns_conjugate() {
        use crate::dtype::Complex64;
        let a = [Complex64::new(0.0, 1.0)];
        let b = [Complex64::new(0.0, 1.0)];
        let mut out = [Complex64::new(0.0, 0.0)];
        dot_columns(true, 1, 1, &a, 1, &b, 1, &mut out);
        assert_eq!(out[0], Complex64::new(1.0, 0.0));
    }

    #[test]
    fn test_norm2_columns() {
        let a = [3.0f64, 0.0, 4.0, 0.0];
        let mut out = [0.0f64; 2];
        norm2_columns::<f64>(2, 2, &a, 2, &mut out);
        assert_eq!(out[0], 5.0);
        assert_eq!(out[1], 0.0);
    }
}
