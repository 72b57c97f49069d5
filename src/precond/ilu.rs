//! Incomplete LU factorization on a fixed sparsity pattern
//!
//! [`ilu0`] runs the sequential IKJ elimination restricted to the
//! matrix's own pattern. [`parilu`] computes the same factors as the
//! fixed point of the Jacobi-style update, sweeping all entries in
//! parallel from the previous iterate.

use crate::dim::Dim2;
use crate::dtype::{IndexType, Value};
use crate::error::{Error, Result};
use crate::executor::HostAccessible;
use crate::matrix::csr::Csr;
use crate::matrix::dense::Dense;
use num_traits::{One, Zero};
use rayon::prelude::*;
use std::collections::HashMap;

/// Lower and upper incomplete factors
///
/// `l` is unit lower triangular (stored diagonal is one), `u` is upper
/// triangular including the diagonal; `l * u` approximates the input on
/// its pattern.
pub struct IluFactors<E: HostAccessible, V: Value, I: IndexType = i64> {
    /// Unit lower triangular factor
    pub l: Csr<E, V, I>,
    /// Upper triangular factor
    pub u: Csr<E, V, I>,
}

impl<E: HostAccessible, V: Value, I: IndexType> IluFactors<E, V, I> {
    /// Solve `L U x = b` by forward then backward substitution
    pub fn solve(&self, b: &Dense<E, V>, x: &mut Dense<E, V>) -> Result<()> {
        crate::linop::validate_apply_dims("ilu::solve", self.l.size(), b, x)?;
        let n = self.l.size().rows;
        let nrhs = b.size().cols;
        let b_host = b.to_row_major_vec();

        let l_rp = self.l.row_ptrs().as_slice();
        let l_ci = self.l.col_idxs().as_slice();
        let l_v = self.l.values().as_slice();
        let u_rp = self.u.row_ptrs().as_slice();
        let u_ci = self.u.col_idxs().as_slice();
        let u_v = self.u.values().as_slice();

        let mut y = vec![V::zero(); n * nrhs];
        for i in 0..n {
            for c in 0..nrhs {
                let mut sum = b_host[i * nrhs + c];
                for k in l_rp[i].as_usize()..l_rp[i + 1].as_usize() {
                    let j = l_ci[k].as_usize();
                    if j < i {
                        sum -= l_v[k] * y[j * nrhs + c];
                    }
                }
                // unit diagonal
                y[i * nrhs + c] = sum;
            }
        }

        let mut out = vec![V::zero(); n * nrhs];
        for i in (0..n).rev() {
            for c in 0..nrhs {
                let mut sum = y[i * nrhs + c];
                let mut diag = V::zero();
                for k in u_rp[i].as_usize()..u_rp[i + 1].as_usize() {
                    let j = u_ci[k].as_usize();
                    if j > i {
                        sum -= u_v[k] * out[j * nrhs + c];
                    } else if j == i {
                        diag = u_v[k];
                    }
                }
                if diag.is_zero() {
                    return Err(Error::value_mismatch(format!(
                        "zero pivot in row {} of the upper factor",
                        i
                    )));
                }
                out[i * nrhs + c] = sum / diag;
            }
        }

        let x_stride = x.stride();
        let x_vals = x.values_mut_slice();
        for i in 0..n {
            x_vals[i * x_stride..i * x_stride + nrhs]
                .copy_from_slice(&out[i * nrhs..(i + 1) * nrhs]);
        }
        Ok(())
    }
}

/// Per-row lookup from column index to value-array position
fn build_lookup<I: IndexType>(row_ptrs: &[I], col_idxs: &[I], rows: usize) -> Vec<HashMap<usize, usize>> {
    (0..rows)
        .map(|r| {
            (row_ptrs[r].as_usize()..row_ptrs[r + 1].as_usize())
                .map(|k| (col_idxs[k].as_usize(), k))
                .collect()
        })
        .collect()
}

/// Sequential ILU(0): eliminate within the fixed pattern
pub fn ilu0<E: HostAccessible, V: Value, I: IndexType>(
    a: &Csr<E, V, I>,
) -> Result<IluFactors<E, V, I>> {
    if !a.size().is_square() {
        return Err(Error::not_supported(
            "ilu::factorize",
            format!("matrix is {}", a.size()),
        ));
    }
    let n = a.size().rows;
    let row_ptrs = a.row_ptrs().as_slice();
    let col_idxs = a.col_idxs().as_slice();
    let mut values = a.values().to_vec();
    let lookup = build_lookup(row_ptrs, col_idxs, n);

    for i in 0..n {
        // eliminate columns k < i in ascending order
        let begin = row_ptrs[i].as_usize();
        let end = row_ptrs[i + 1].as_usize();
        let mut row_cols: Vec<usize> = col_idxs[begin..end].iter().map(|c| c.as_usize()).collect();
        row_cols.sort_unstable();
        for &k in row_cols.iter().filter(|&&k| k < i) {
            let ik = lookup[i][&k];
            let kk = *lookup[k].get(&k).ok_or_else(|| {
                Error::value_mismatch(format!("missing diagonal in row {}", k))
            })?;
            if values[kk].is_zero() {
                return Err(Error::value_mismatch(format!("zero pivot in row {}", k)));
            }
            let factor = values[ik] / values[kk];
            values[ik] = factor;
            for kj in row_ptrs[k].as_usize()..row_ptrs[k + 1].as_usize() {
                let j = col_idxs[kj].as_usize();
                if j > k {
                    if let Some(&ij) = lookup[i].get(&j) {
                        let update = factor * values[kj];
                        values[ij] = values[ij] - update;
                    }
                }
            }
        }
    }

    split_factors(a, &values)
}

/// ParILU: parallel fixed-point sweeps toward the ILU(0) factors
///
/// Each sweep recomputes every pattern entry from the previous
/// iterate's factors; with enough sweeps the iteration converges to
/// the sequential factorization.
pub fn parilu<E: HostAccessible, V: Value, I: IndexType>(
    a: &Csr<E, V, I>,
    sweeps: usize,
) -> Result<IluFactors<E, V, I>> {
    if !a.size().is_square() {
        return Err(Error::not_supported(
            "ilu::factorize",
            format!("matrix is {}", a.size()),
        ));
    }
    let n = a.size().rows;
    let row_ptrs = a.row_ptrs().as_slice();
    let col_idxs = a.col_idxs().as_slice();
    let a_values = a.values().as_slice();
    let lookup = build_lookup(row_ptrs, col_idxs, n);

    // the factor entries live in the pattern positions: strictly lower
    // entries hold L, the rest hold U
    let mut values: Vec<V> = a_values.to_vec();

    let owner_row: Vec<usize> = (0..n)
        .flat_map(|r| std::iter::repeat(r).take(row_ptrs[r + 1].as_usize() - row_ptrs[r].as_usize()))
        .collect();

    for _ in 0..sweeps {
        let previous = values.clone();
        let update = |k: usize| -> V {
            let i = owner_row[k];
            let j = col_idxs[k].as_usize();
            // sum of L[i, t] * U[t, j] over t < min(i, j) on the pattern
            let mut sum = V::zero();
            for it in row_ptrs[i].as_usize()..row_ptrs[i + 1].as_usize() {
                let t = col_idxs[it].as_usize();
                if t < i && t < j {
                    if let Some(&tj) = lookup[t].get(&j) {
                        sum += previous[it] * previous[tj];
                    }
                }
            }
            if i > j {
                // L entry: divide by the current U diagonal
                let jj = lookup[j].get(&j).copied();
                let diag = jj.map_or(V::one(), |jj| previous[jj]);
                if diag.is_zero() {
                    V::zero()
                } else {
                    (a_values[k] - sum) / diag
                }
            } else {
                a_values[k] - sum
            }
        };
        values = if E::PARALLEL {
            (0..values.len()).into_par_iter().map(update).collect()
        } else {
            (0..values.len()).map(update).collect()
        };
    }

    split_factors(a, &values)
}

/// Split the combined pattern values into unit-L and U factors
fn split_factors<E: HostAccessible, V: Value, I: IndexType>(
    a: &Csr<E, V, I>,
    values: &[V],
) -> Result<IluFactors<E, V, I>> {
    let n = a.size().rows;
    let row_ptrs = a.row_ptrs().as_slice();
    let col_idxs = a.col_idxs().as_slice();

    let mut l_row_ptrs = vec![I::ZERO; n + 1];
    let mut u_row_ptrs = vec![I::ZERO; n + 1];
    let mut l_cols = Vec::new();
    let mut l_vals = Vec::new();
    let mut u_cols = Vec::new();
    let mut u_vals = Vec::new();

    for i in 0..n {
        // unit diagonal of L is stored explicitly
        for k in row_ptrs[i].as_usize()..row_ptrs[i + 1].as_usize() {
            let j = col_idxs[k].as_usize();
            if j < i {
                l_cols.push(col_idxs[k]);
                l_vals.push(values[k]);
            } else {
                u_cols.push(col_idxs[k]);
                u_vals.push(values[k]);
            }
        }
        l_cols.push(I::from_usize(i));
        l_vals.push(V::one());
        l_row_ptrs[i + 1] = I::from_usize(l_cols.len());
        u_row_ptrs[i + 1] = I::from_usize(u_cols.len());
    }

    let l = Csr::from_host_data(Dim2::square(n), &l_row_ptrs, &l_cols, &l_vals, a.device())?;
    let u = Csr::from_host_data(Dim2::square(n), &u_row_ptrs, &u_cols, &u_vals, a.device())?;
    Ok(IluFactors { l, u })
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

    fn laplacian(n: usize) -> RefCsr {
        let mut row_ptrs = vec![0i64];
        let mut cols = Vec::new();
        let mut vals = Vec::new();
        for i in 0..n {
            if i > 0 {
                cols.push(i as i64 - 1);
                vals.push(-1.0);
            }
            cols.push(i as i64);
            vals.push(2.0);
            if i + 1 < n {
                cols.push(i as i64 + 1);
                vals.push(-1.0);
            }
            row_ptrs.push(cols.len() as i64);
        }
        RefCsr::from_host_data(Dim2::square(n), &row_ptrs, &cols, &vals, &device()).unwrap()
    }

    #[test]
    fn test_ilu0_tridiagonal_is_exact() {
        // the tridiagonal pattern suffers no fill-in, so L*U == A
        let a = laplacian(5);
        let factors = ilu0(&a).unwrap();
        let product = factors.l.spgemm(&factors.u).unwrap();
        let got = product.to_dense().unwrap().to_row_major_vec();
        let want = a.to_dense().unwrap().to_row_major_vec();
        for (g, w) in got.iter().zip(&want) {
            assert!((g - w).abs() < 1e-12, "got {} want {}", g, w);
        }
    }

    #[test]
    fn test_ilu_solve_recovers_rhs() {
        let a = laplacian(4);
        let factors = ilu0(&a).unwrap();
        // for the exact factorization, solve(A x0) == x0
        let x0 = Dense::from_slice(Dim2::new(4, 1), &[1.0, -2.0, 0.5, 3.0], &device()).unwrap();
        let mut b = Dense::new(Dim2::new(4, 1), &device()).unwrap();
        a.apply(&x0, &mut b).unwrap();
        let mut x = Dense::new(Dim2::new(4, 1), &device()).unwrap();
        factors.solve(&b, &mut x).unwrap();
        for (g, w) in x.to_row_major_vec().iter().zip(&x0.to_row_major_vec()) {
            assert!((g - w).abs() < 1e-10);
        }
    }

    #[test]
    fn test_parilu_converges_to_ilu0() {
        let a = laplacian(6);
        let exact = ilu0(&a).unwrap();
        let iterated = parilu(&a, 20).unwrap();
        let exact_l = exact.l.values().to_vec();
        let got_l = iterated.l.values().to_vec();
        for (g, w) in got_l.iter().zip(&exact_l) {
            assert!((g - w).abs() < 1e-8, "L entry {} vs {}", g, w);
        }
        let exact_u = exact.u.values().to_vec();
        let got_u = iterated.u.values().to_vec();
        for (g, w) in got_u.iter().zip(&exact_u) {
            assert!((g - w).abs() < 1e-8, "U entry {} vs {}", g, w);
        }
    }

    #[test]
    fn test_missing_diagonal_rejected() {
        let a = RefCsr::from_host_data(
            Dim2::new(2, 2),
            &[0, 1, 2],
            &[1, 0],
            &[1.0, 1.0],
            &device(),
        )
        .unwrap();
        assert!(ilu0(&a).is_err());
    }
}
