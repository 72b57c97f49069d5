//! Host-side kernel implementations
//!
//! Generic over [`HostAccessible`] executors: the host client runs the
//! row loops under rayon, the reference client runs them serially.
//! Both call the same serial cores, so results agree exactly.

use super::dense::{add_scaled_row, dot_columns, gemm_row, norm2_columns, scale_row};
use super::spmv::{
    coo_chunk_contribs, csr_apply_row, csr_chunk_contribs, ell_apply_row, merge_path_partition,
    sellp_apply_slice,
};
use crate::dtype::{IndexType, Value};
use crate::error::Result;
use crate::executor::{HostAccessible, Parallelism};
use crate::matrix::coo::Coo;
use crate::matrix::csr::{Csr, CsrStrategy};
use crate::matrix::dense::Dense;
use crate::matrix::ell::Ell;
use crate::matrix::sellp::Sellp;
use num_traits::Zero;
use rayon::prelude::*;

/// `x = beta * x` over the logical region, zero-filling when `beta == 0`
fn prescale<E: HostAccessible, V: Value>(beta: V, x: &mut Dense<E, V>) {
    let rows = x.size().rows;
    let cols = x.size().cols;
    let stride = x.stride();
    let values = x.values_mut_slice();
    for r in 0..rows {
        let row = &mut values[r * stride..r * stride + cols];
        if beta.is_zero() {
            row.fill(V::zero());
        } else {
            scale_row(beta, cols, row);
        }
    }
}

/// Merge per-row contribution runs into a beta-scaled output
fn merge_contribs<E: HostAccessible, V: Value>(
    contribs: Vec<Vec<(usize, Vec<V>)>>,
    x: &mut Dense<E, V>,
) {
    let stride = x.stride();
    let values = x.values_mut_slice();
    for chunk in contribs {
        for (row, sums) in chunk {
            for (c, sum) in sums.into_iter().enumerate() {
                values[row * stride + c] += sum;
            }
        }
    }
}

pub(crate) fn dense_apply_host<E: HostAccessible, V: Value>(
    alpha: V,
    a: &Dense<E, V>,
    b: &Dense<E, V>,
    beta: V,
    x: &mut Dense<E, V>,
) -> Result<()> {
    let rows = a.size().rows;
    let k = a.size().cols;
    let n = b.size().cols;
    let a_vals = a.values().as_slice();
    let a_stride = a.stride();
    let b_vals = b.values().as_slice();
    let b_stride = b.stride();
    let x_stride = x.stride();
    let x_vals = x.values_mut_slice();

    if E::PARALLEL {
        x_vals
            .par_chunks_mut(x_stride.max(1))
            .take(rows)
            .enumerate()
            .for_each(|(r, xrow)| {
                gemm_row(r, a_vals, a_stride, k, b_vals, b_stride, n, alpha, beta, xrow);
            });
    } else {
        for r in 0..rows {
            let xrow = &mut x_vals[r * x_stride..r * x_stride + n];
            gemm_row(r, a_vals, a_stride, k, b_vals, b_stride, n, alpha, beta, xrow);
        }
    }
    Ok(())
}

pub(crate) fn dense_scale_host<E: HostAccessible, V: Value>(
    alpha: V,
    x: &mut Dense<E, V>,
) -> Result<()> {
    let rows = x.size().rows;
    let cols = x.size().cols;
    let stride = x.stride();
    let values = x.values_mut_slice();
    if E::PARALLEL {
        values
            .par_chunks_mut(stride.max(1))
            .take(rows)
            .for_each(|row| scale_row(alpha, cols, row));
    } else {
        for r in 0..rows {
            scale_row(alpha, cols, &mut values[r * stride..r * stride + cols]);
        }
    }
    Ok(())
}

pub(crate) fn dense_add_scaled_host<E: HostAccessible, V: Value>(
    alpha: V,
    b: &Dense<E, V>,
    x: &mut Dense<E, V>,
) -> Result<()> {
    let rows = x.size().rows;
    let cols = x.size().cols;
    let b_vals = b.values().as_slice();
    let b_stride = b.stride();
    let x_stride = x.stride();
    let x_vals = x.values_mut_slice();
    if E::PARALLEL {
        x_vals
            .par_chunks_mut(x_stride.max(1))
            .take(rows)
            .enumerate()
            .for_each(|(r, xrow)| {
                add_scaled_row(alpha, cols, &b_vals[r * b_stride..], xrow);
            });
    } else {
        for r in 0..rows {
            add_scaled_row(
                alpha,
                cols,
                &b_vals[r * b_stride..],
                &mut x_vals[r * x_stride..r * x_stride + cols],
            );
        }
    }
    Ok(())
}

pub(crate) fn dense_dot_host<E: HostAccessible, V: Value>(
    conjugate: bool,
    a: &Dense<E, V>,
    b: &Dense<E, V>,
    out: &mut Dense<E, V>,
) -> Result<()> {
    let mut host = vec![V::zero(); a.size().cols];
    dot_columns(
        conjugate,
        a.size().rows,
        a.size().cols,
        a.values().as_slice(),
        a.stride(),
        b.values().as_slice(),
        b.stride(),
        &mut host,
    );
    out.values_mut().write_from_slice(&host)
}

pub(crate) fn dense_norm2_host<E: HostAccessible, V: Value>(
    a: &Dense<E, V>,
    out: &mut Dense<E, V::Real>,
) -> Result<()> {
    let mut host = vec![V::real_from_f64(0.0); a.size().cols];
    norm2_columns::<V>(
        a.size().rows,
        a.size().cols,
        a.values().as_slice(),
        a.stride(),
        &mut host,
    );
    out.values_mut().write_from_slice(&host)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn csr_spmv_host<E: HostAccessible, V: Value, I: IndexType>(
    parallelism: Parallelism,
    alpha: V,
    a: &Csr<E, V, I>,
    b: &Dense<E, V>,
    beta: V,
    x: &mut Dense<E, V>,
) -> Result<()> {
    let rows = a.size().rows;
    let nnz = a.nnz();
    let nrhs = b.size().cols;
    let row_ptrs = a.row_ptrs().as_slice();
    let col_idxs = a.col_idxs().as_slice();
    let values = a.values().as_slice();
    let b_vals = b.values().as_slice();
    let b_stride = b.stride();

    // the host carries no vendor sparse library; `Sparselib` runs the
    // classical loop
    let resolved = match a.strategy().resolve(row_ptrs, parallelism, false) {
        CsrStrategy::Sparselib => CsrStrategy::Classical,
        concrete => concrete,
    };

    match resolved {
        CsrStrategy::Classical | CsrStrategy::Automatical | CsrStrategy::Sparselib => {
            let x_stride = x.stride();
            let x_vals = x.values_mut_slice();
            if E::PARALLEL {
                x_vals
                    .par_chunks_mut(x_stride.max(1))
                    .take(rows)
                    .enumerate()
                    .for_each(|(r, xrow)| {
                        csr_apply_row(
                            r, row_ptrs, col_idxs, values, b_vals, b_stride, nrhs, alpha, beta,
                            xrow,
                        );
                    });
            } else {
                for r in 0..rows {
                    let xrow = &mut x_vals[r * x_stride..r * x_stride + nrhs];
                    csr_apply_row(
                        r, row_ptrs, col_idxs, values, b_vals, b_stride, nrhs, alpha, beta, xrow,
                    );
                }
            }
        }
        CsrStrategy::LoadBalance => {
            prescale(beta, x);
            let srow = a.srow().to_vec();
            let workers = srow.len().saturating_sub(1).max(1);
            let chunk = nnz.div_ceil(workers).max(1);
            let worker_range = |w: usize| (w * chunk).min(nnz)..((w + 1) * chunk).min(nnz);
            let run = |w: usize| {
                csr_chunk_contribs(
                    worker_range(w),
                    srow.get(w).map_or(0, |r| r.as_usize()),
                    row_ptrs,
                    col_idxs,
                    values,
                    b_vals,
                    b_stride,
                    nrhs,
                    alpha,
                )
            };
            let contribs: Vec<_> = if E::PARALLEL {
                (0..workers).into_par_iter().map(run).collect()
            } else {
                (0..workers).map(run).collect()
            };
            merge_contribs(contribs, x);
        }
        CsrStrategy::MergePath => {
            prescale(beta, x);
            let workers = parallelism.workers.max(1);
            let bounds = merge_path_partition(row_ptrs, rows, nnz, workers);
            let run = |w: usize| {
                csr_chunk_contribs(
                    bounds[w].1..bounds[w + 1].1,
                    bounds[w].0,
                    row_ptrs,
                    col_idxs,
                    values,
                    b_vals,
                    b_stride,
                    nrhs,
                    alpha,
                )
            };
            let contribs: Vec<_> = if E::PARALLEL {
                (0..workers).into_par_iter().map(run).collect()
            } else {
                (0..workers).map(run).collect()
            };
            merge_contribs(contribs, x);
        }
    }
    Ok(())
}

pub(crate) fn coo_spmv_host<E: HostAccessible, V: Value, I: IndexType>(
    parallelism: Parallelism,
    alpha: V,
    a: &Coo<E, V, I>,
    b: &Dense<E, V>,
    beta: V,
    x: &mut Dense<E, V>,
) -> Result<()> {
    let nnz = a.nnz();
    let nrhs = b.size().cols;
    prescale(beta, x);
    if nnz == 0 {
        return Ok(());
    }
    let row_idxs = a.row_idxs().as_slice();
    let col_idxs = a.col_idxs().as_slice();
    let values = a.values().as_slice();
    let b_vals = b.values().as_slice();
    let b_stride = b.stride();

    let workers = if E::PARALLEL {
        parallelism.workers.max(1)
    } else {
        1
    };
    let chunk = nnz.div_ceil(workers).max(1);
    let run = |w: usize| {
        coo_chunk_contribs(
            (w * chunk).min(nnz)..((w + 1) * chunk).min(nnz),
            row_idxs,
            col_idxs,
            values,
            b_vals,
            b_stride,
            nrhs,
            alpha,
        )
    };
    let contribs: Vec<_> = if E::PARALLEL {
        (0..workers).into_par_iter().map(run).collect()
    } else {
        (0..workers).map(run).collect()
    };
    merge_contribs(contribs, x);
    Ok(())
}

pub(crate) fn ell_spmv_host<E: HostAccessible, V: Value, I: IndexType>(
    alpha: V,
    a: &Ell<E, V, I>,
    b: &Dense<E, V>,
    beta: V,
    x: &mut Dense<E, V>,
) -> Result<()> {
    let rows = a.size().rows;
    let nrhs = b.size().cols;
    let stride = a.stride();
    let width = a.max_nnz_per_row();
    let col_idxs = a.col_idxs().as_slice();
    let values = a.values().as_slice();
    let b_vals = b.values().as_slice();
    let b_stride = b.stride();
    let x_stride = x.stride();
    let x_vals = x.values_mut_slice();

    if E::PARALLEL {
        x_vals
            .par_chunks_mut(x_stride.max(1))
            .take(rows)
            .enumerate()
            .for_each(|(r, xrow)| {
                ell_apply_row(
                    r, stride, width, col_idxs, values, b_vals, b_stride, nrhs, alpha, beta, xrow,
                );
            });
    } else {
        for r in 0..rows {
            let xrow = &mut x_vals[r * x_stride..r * x_stride + nrhs];
            ell_apply_row(
                r, stride, width, col_idxs, values, b_vals, b_stride, nrhs, alpha, beta, xrow,
            );
        }
    }
    Ok(())
}

pub(crate) fn sellp_spmv_host<E: HostAccessible, V: Value, I: IndexType>(
    alpha: V,
    a: &Sellp<E, V, I>,
    b: &Dense<E, V>,
    beta: V,
    x: &mut Dense<E, V>,
) -> Result<()> {
    let rows = a.size().rows;
    let nrhs = b.size().cols;
    let slice_size = a.slice_size();
    let num_slices = a.num_slices();
    let slice_sets = a.slice_sets().as_slice();
    let col_idxs = a.col_idxs().as_slice();
    let values = a.values().as_slice();
    let b_vals = b.values().as_slice();
    let b_stride = b.stride();
    let x_stride = x.stride();
    let x_vals = x.values_mut_slice();

    if E::PARALLEL {
        x_vals
            .par_chunks_mut((slice_size * x_stride).max(1))
            .take(num_slices)
            .enumerate()
            .for_each(|(s, xslice)| {
                sellp_apply_slice(
                    s, slice_size, rows, slice_sets, col_idxs, values, b_vals, b_stride, nrhs,
                    alpha, beta, xslice, x_stride,
                );
            });
    } else {
        for s in 0..num_slices {
            let begin = s * slice_size * x_stride;
            let end = (begin + slice_size * x_stride).min(x_vals.len());
            sellp_apply_slice(
                s,
                slice_size,
                rows,
                slice_sets,
                col_idxs,
                values,
                b_vals,
                b_stride,
                nrhs,
                alpha,
                beta,
                &mut x_vals[begin..end],
                x_stride,
            );
        }
    }
    Ok(())
}
