//! Preconditioner cores
//!
//! Format-aware small-block algorithms: block Jacobi (natural block
//! detection, block inversion, adaptive precision), ISAI (sparse
//! approximate inverses over triangular patterns), and ILU(0) with its
//! parallel fixed-point variant. Solver drivers that consume these live
//! outside the crate; the cores only expose generate and apply.

pub mod block_jacobi;
pub mod ilu;
pub mod isai;

pub use block_jacobi::{BlockJacobi, BlockPrecision};
pub use ilu::{ilu0, parilu, IluFactors};
pub use isai::{Isai, TriangleSide};

use crate::dtype::Value;
use crate::error::{Error, Result};
use num_traits::{One, Zero};

/// Invert a small dense row-major `n x n` matrix in place
///
/// Gauss-Jordan with partial pivoting; returns the inverse and the
/// infinity norm of the input (for condition estimation). Singular
/// blocks are a data precondition violation.
pub(crate) fn invert_dense<V: Value>(block: &[V], n: usize) -> Result<(Vec<V>, f64)> {
    debug_assert_eq!(block.len(), n * n);
    let input_norm = inf_norm(block, n);

    // augmented [A | I], reduced in place
    let mut work = block.to_vec();
    let mut inv: Vec<V> = vec![V::zero(); n * n];
    for i in 0..n {
        inv[i * n + i] = V::one();
    }

    for col in 0..n {
        // partial pivot on the largest magnitude in this column
        let pivot_row = (col..n)
            .max_by(|&a, &b| {
                work[a * n + col]
                    .abs()
                    .partial_cmp(&work[b * n + col].abs())
                    .expect("magnitudes are comparable")
            })
            .expect("non-empty pivot range");
        if work[pivot_row * n + col].abs() == 0.0 {
            return Err(Error::value_mismatch("singular diagonal block"));
        }
        if pivot_row != col {
            for j in 0..n {
                work.swap(col * n + j, pivot_row * n + j);
                inv.swap(col * n + j, pivot_row * n + j);
            }
        }
        let pivot = work[col * n + col];
        for j in 0..n {
            work[col * n + j] = work[col * n + j] / pivot;
            inv[col * n + j] = inv[col * n + j] / pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = work[row * n + col];
            if factor == V::zero() {
                continue;
            }
            for j in 0..n {
                let w = work[col * n + j];
                let v = inv[col * n + j];
                work[row * n + j] = work[row * n + j] - factor * w;
                inv[row * n + j] = inv[row * n + j] - factor * v;
            }
        }
    }
    Ok((inv, input_norm))
}

/// Solve a small dense row-major system `A x = rhs`
pub(crate) fn solve_dense<V: Value>(a: &[V], n: usize, rhs: &[V]) -> Result<Vec<V>> {
    let (inv, _) = invert_dense(a, n)?;
    let mut x = vec![V::zero(); n];
    for (i, entry) in x.iter_mut().enumerate() {
        for j in 0..n {
            *entry += inv[i * n + j] * rhs[j];
        }
    }
    Ok(x)
}

/// Infinity norm of a small dense row-major matrix
pub(crate) fn inf_norm<V: Value>(a: &[V], n: usize) -> f64 {
    (0..n)
        .map(|i| (0..n).map(|j| a[i * n + j].abs()).sum::<f64>())
        .fold(0.0, f64::max)
}
