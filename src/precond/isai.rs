//! Incomplete sparse approximate inverses
//!
//! Computes an approximate inverse of a triangular factor over the
//! factor's own sparsity pattern: for each row, the entries of the
//! inverse restricted to the row's pattern solve a small dense system
//! against the factor's submatrix on that pattern.

use super::solve_dense;
use crate::dim::Dim2;
use crate::dtype::{IndexType, Value};
use crate::error::{Error, Result};
use crate::executor::HostAccessible;
use crate::linop::{validate_apply_dims, LinOp};
use crate::matrix::csr::Csr;
use crate::matrix::dense::Dense;
use num_traits::Zero;
use std::collections::HashMap;

/// Which triangle the factor occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriangleSide {
    /// Lower triangular factor
    Lower,
    /// Upper triangular factor
    Upper,
}

/// Sparse approximate inverse of a triangular factor
pub struct Isai<E: HostAccessible, V: Value, I: IndexType = i64> {
    inverse: Csr<E, V, I>,
    side: TriangleSide,
}

impl<E: HostAccessible, V: Value, I: IndexType> Isai<E, V, I> {
    /// Generate over the pattern of the triangular factor `t`
    ///
    /// `M` satisfies `(M * t)[i, J_i] = e_i[J_i]` for every row `i`,
    /// where `J_i` is the sparsity pattern of row `i`.
    pub fn build(t: &Csr<E, V, I>, side: TriangleSide) -> Result<Self> {
        if !t.size().is_square() {
            return Err(Error::not_supported(
                "isai::generate",
                format!("factor is {}", t.size()),
            ));
        }
        let n = t.size().rows;
        let row_ptrs = t.row_ptrs().as_slice();
        let col_idxs = t.col_idxs().as_slice();
        let values = t.values().as_slice();

        let mut out_values = vec![V::zero(); values.len()];
        for i in 0..n {
            let begin = row_ptrs[i].as_usize();
            let end = row_ptrs[i + 1].as_usize();
            let pattern: Vec<usize> = col_idxs[begin..end].iter().map(|c| c.as_usize()).collect();
            let m = pattern.len();
            if m == 0 {
                continue;
            }
            let local_of: HashMap<usize, usize> =
                pattern.iter().enumerate().map(|(k, &c)| (c, k)).collect();

            // dense submatrix T[J, J], rows and columns in pattern order
            let mut sub = vec![V::zero(); m * m];
            for (lr, &gr) in pattern.iter().enumerate() {
                for lk in row_ptrs[gr].as_usize()..row_ptrs[gr + 1].as_usize() {
                    if let Some(&lc) = local_of.get(&col_idxs[lk].as_usize()) {
                        sub[lr * m + lc] = values[lk];
                    }
                }
            }

            // row i of the inverse solves x^T T[J, J] = e_i^T, i.e.
            // T[J, J]^T x = e_i
            let mut sub_t = vec![V::zero(); m * m];
            for r in 0..m {
                for c in 0..m {
                    sub_t[c * m + r] = sub[r * m + c];
                }
            }
            let diag_local = *local_of.get(&i).ok_or_else(|| {
                Error::value_mismatch(format!("triangular factor misses diagonal in row {}", i))
            })?;
            let mut rhs = vec![V::zero(); m];
            rhs[diag_local] = V::one();
            let x = solve_dense(&sub_t, m, &rhs)?;
            out_values[begin..end].copy_from_slice(&x);
        }

        let inverse = Csr::from_host_data(
            Dim2::square(n),
            row_ptrs,
            col_idxs,
            &out_values,
            t.device(),
        )?;
        Ok(Self { inverse, side })
    }

    /// The approximate inverse factor
    pub fn inverse(&self) -> &Csr<E, V, I> {
        &self.inverse
    }

    /// The triangle side this inverse approximates
    pub fn side(&self) -> TriangleSide {
        self.side
    }
}

impl<E: HostAccessible, V: Value, I: IndexType> LinOp<E, V> for Isai<E, V, I> {
    fn size(&self) -> Dim2 {
        self.inverse.size()
    }

    fn apply_scaled(&self, alpha: V, b: &Dense<E, V>, beta: V, x: &mut Dense<E, V>) -> Result<()> {
        validate_apply_dims("isai::apply", self.size(), b, x)?;
        self.inverse.apply_scaled(alpha, b, beta, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Executor, ReferenceExecutor};
    use crate::linop::LinOp;

    type RefCsr = Csr<ReferenceExecutor, f64, i64>;

    fn device() -> <ReferenceExecutor as Executor>::Device {
        ReferenceExecutor::default_device()
    }

    #[test]
    fn test_dense_lower_triangle_inverts_exactly() {
        // full lower-triangular pattern: the approximate inverse is exact
        let l = RefCsr::from_host_data(
            Dim2::new(3, 3),
            &[0, 1, 3, 6],
            &[0, 0, 1, 0, 1, 2],
            &[2.0, 1.0, 2.0, 1.0, 1.0, 2.0],
            &device(),
        )
        .unwrap();
        let isai = Isai::build(&l, TriangleSide::Lower).unwrap();

        // M * L should be the identity on the full pattern
        let m = isai.inverse();
        let product = m.spgemm(&l).unwrap();
        let dense = product.to_dense().unwrap().to_row_major_vec();
        for r in 0..3 {
            for c in 0..3 {
                let expected = if r == c { 1.0 } else { 0.0 };
                assert!(
                    (dense[r * 3 + c] - expected).abs() < 1e-12,
                    "entry ({}, {}) = {}",
                    r,
                    c,
                    dense[r * 3 + c]
                );
            }
        }
    }

    #[test]
    fn test_sparse_pattern_solves_on_pattern() {
        // bidiagonal lower factor
        let l = RefCsr::from_host_data(
            Dim2::new(3, 3),
            &[0, 1, 3, 5],
            &[0, 0, 1, 1, 2],
            &[4.0, 1.0, 4.0, 1.0, 4.0],
            &device(),
        )
        .unwrap();
        let isai = Isai::build(&l, TriangleSide::Lower).unwrap();
        let product = isai.inverse().spgemm(&l).unwrap();
        let dense = product.to_dense().unwrap().to_row_major_vec();
        // on each row's own pattern the product matches the identity
        let row_ptrs = l.row_ptrs().to_vec();
        let col_idxs = l.col_idxs().to_vec();
        for r in 0..3 {
            for k in row_ptrs[r]..row_ptrs[r + 1] {
                let c = col_idxs[k as usize] as usize;
                let expected = if r == c { 1.0 } else { 0.0 };
                assert!((dense[r * 3 + c] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_missing_diagonal_rejected() {
        let l = RefCsr::from_host_data(
            Dim2::new(2, 2),
            &[0, 1, 2],
            &[0, 0],
            &[1.0, 1.0],
            &device(),
        )
        .unwrap();
        assert!(matches!(
            Isai::build(&l, TriangleSide::Lower),
            Err(Error::ValueMismatch(_))
        ));
    }

    #[test]
    fn test_apply_delegates_to_inverse() {
        let l = RefCsr::from_host_data(
            Dim2::new(2, 2),
            &[0, 1, 3],
            &[0, 0, 1],
            &[2.0, 0.0, 2.0],
            &device(),
        )
        .unwrap();
        let isai = Isai::build(&l, TriangleSide::Lower).unwrap();
        let b = Dense::from_slice(Dim2::new(2, 1), &[2.0, 2.0], &device()).unwrap();
        let mut x = Dense::new(Dim2::new(2, 1), &device()).unwrap();
        isai.apply(&b, &mut x).unwrap();
        assert_eq!(x.to_row_major_vec(), vec![1.0, 1.0]);
    }
}
