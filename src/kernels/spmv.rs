//! Serial cores for sparse matrix-vector products
//!
//! Row- and chunk-level routines shared across executors. The chunked
//! variants return per-row partial sums so thread-parallel callers can
//! merge chunk boundaries deterministically instead of contending on
//! atomics.

use crate::dtype::{IndexType, Value};
use num_traits::Zero;
use std::ops::Range;

/// One output row of CSR SpMV: `xrow = alpha * A[r,:] * b + beta * xrow`
#[allow(clippy::too_many_arguments)]
#[inline]
pub(crate) fn csr_apply_row<V: Value, I: IndexType>(
    r: usize,
    row_ptrs: &[I],
    col_idxs: &[I],
    values: &[V],
    b: &[V],
    b_stride: usize,
    nrhs: usize,
    alpha: V,
    beta: V,
    xrow: &mut [V],
) {
    let begin = row_ptrs[r].as_usize();
    let end = row_ptrs[r + 1].as_usize();
    for c in 0..nrhs {
        let mut sum = V::zero();
        for k in begin..end {
            sum += values[k] * b[col_idxs[k].as_usize() * b_stride + c];
        }
        let out = &mut xrow[c];
        *out = if beta.is_zero() {
            alpha * sum
        } else {
            alpha * sum + beta * *out
        };
    }
}

/// Partial sums of a CSR non-zero range, grouped by row
///
/// Walks the non-zeros in `nnz_range`, starting at `start_row` (the row
/// containing `nnz_range.start`), and emits `(row, sums)` runs where
/// `sums[c] = alpha * sum_k A[row,k] * b[k,c]` over the non-zeros of the
/// range. Callers merge runs into the output; a row split across two
/// chunks shows up in both and the merge adds the halves.
#[allow(clippy::too_many_arguments)]
pub(crate) fn csr_chunk_contribs<V: Value, I: IndexType>(
    nnz_range: Range<usize>,
    start_row: usize,
    row_ptrs: &[I],
    col_idxs: &[I],
    values: &[V],
    b: &[V],
    b_stride: usize,
    nrhs: usize,
    alpha: V,
) -> Vec<(usize, Vec<V>)> {
    let mut out = Vec::new();
    if nnz_range.is_empty() {
        return out;
    }
    let mut row = start_row;
    // skip rows that end before the chunk begins (empty rows included)
    while row_ptrs[row + 1].as_usize() <= nnz_range.start {
        row += 1;
    }
    let mut sums = vec![V::zero(); nrhs];
    let mut dirty = false;
    for k in nnz_range {
        while row_ptrs[row + 1].as_usize() <= k {
            if dirty {
                out.push((row, std::mem::replace(&mut sums, vec![V::zero(); nrhs])));
                dirty = false;
            }
            row += 1;
        }
        let col = col_idxs[k].as_usize();
        let val = values[k];
        for c in 0..nrhs {
            sums[c] += alpha * val * b[col * b_stride + c];
        }
        dirty = true;
    }
    if dirty {
        out.push((row, sums));
    }
    out
}

/// Partial sums of a COO non-zero range, grouped by row
///
/// The segment-scan analog on host: row indices are sorted
/// non-decreasing, so each chunk emits at most one run per row, in row
/// order, flushing on every row transition.
#[allow(clippy::too_many_arguments)]
pub(crate) fn coo_chunk_contribs<V: Value, I: IndexType>(
    nnz_range: Range<usize>,
    row_idxs: &[I],
    col_idxs: &[I],
    values: &[V],
    b: &[V],
    b_stride: usize,
    nrhs: usize,
    alpha: V,
) -> Vec<(usize, Vec<V>)> {
    let mut out = Vec::new();
    if nnz_range.is_empty() {
        return out;
    }
    let mut row = row_idxs[nnz_range.start].as_usize();
    let mut sums = vec![V::zero(); nrhs];
    for k in nnz_range {
        let r = row_idxs[k].as_usize();
        if r != row {
            out.push((row, std::mem::replace(&mut sums, vec![V::zero(); nrhs])));
            row = r;
        }
        let col = col_idxs[k].as_usize();
        let val = values[k];
        for c in 0..nrhs {
            sums[c] += alpha * val * b[col * b_stride + c];
        }
    }
    out.push((row, sums));
    out
}

/// One output row of ELL SpMV
///
/// The inner loop runs the full tile width; padding entries carry value
/// zero and a valid column index, so they contribute nothing.
#[allow(clippy::too_many_arguments)]
#[inline]
pub(crate) fn ell_apply_row<V: Value, I: IndexType>(
    r: usize,
    stride: usize,
    max_nnz_per_row: usize,
    col_idxs: &[I],
    values: &[V],
    b: &[V],
    b_stride: usize,
    nrhs: usize,
    alpha: V,
    beta: V,
    xrow: &mut [V],
) {
    for c in 0..nrhs {
        let mut sum = V::zero();
        for k in 0..max_nnz_per_row {
            let col = col_idxs[k * stride + r].as_usize();
            sum += values[k * stride + r] * b[col * b_stride + c];
        }
        let out = &mut xrow[c];
        *out = if beta.is_zero() {
            alpha * sum
        } else {
            alpha * sum + beta * *out
        };
    }
}

/// One slice of SELL-P SpMV: rows `slice * slice_size ..` within bounds
///
/// `xslice` spans the slice's rows of the output (`x_stride` apart).
#[allow(clippy::too_many_arguments)]
pub(crate) fn sellp_apply_slice<V: Value, I: IndexType>(
    slice: usize,
    slice_size: usize,
    rows: usize,
    slice_sets: &[I],
    col_idxs: &[I],
    values: &[V],
    b: &[V],
    b_stride: usize,
    nrhs: usize,
    alpha: V,
    beta: V,
    xslice: &mut [V],
    x_stride: usize,
) {
    let slice_begin = slice_sets[slice].as_usize();
    let slice_len = slice_sets[slice + 1].as_usize() - slice_begin;
    let row_base = slice * slice_size;
    for local in 0..slice_size.min(rows - row_base) {
        let xrow = &mut xslice[local * x_stride..local * x_stride + nrhs];
        for c in 0..nrhs {
            let mut sum = V::zero();
            for k in 0..slice_len {
                let idx = (slice_begin + k) * slice_size + local;
                let col = col_idxs[idx].as_usize();
                sum += values[idx] * b[col * b_stride + c];
            }
            let out = &mut xrow[c];
            *out = if beta.is_zero() {
                alpha * sum
            } else {
                alpha * sum + beta * *out
            };
        }
    }
}

/// Split `rows + nnz` merge-path work evenly across `workers`
///
/// Returns `workers + 1` boundaries `(row, nnz)`; worker `w` owns rows
/// and non-zeros between boundary `w` and `w + 1`. Each boundary is
/// found by a binary-search descent of the merge-path diagonal.
pub(crate) fn merge_path_partition<I: IndexType>(
    row_ptrs: &[I],
    rows: usize,
    nnz: usize,
    workers: usize,
) -> Vec<(usize, usize)> {
    let total = rows + nnz;
    let mut bounds = Vec::with_capacity(workers + 1);
    for w in 0..=workers {
        let diagonal = (total * w) / workers.max(1);
        // find the split (row, k) with row + k == diagonal and
        // row_ptrs[row] <= k < row_ptrs[row + 1] extended past the ends
        let mut lo = diagonal.saturating_sub(nnz);
        let mut hi = diagonal.min(rows);
        while lo < hi {
            let mid = (lo + hi) / 2;
            if row_ptrs[mid].as_usize() < diagonal - mid {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let k = diagonal - lo;
        // step back to the row containing non-zero k so chunk walkers
        // start inside the right row
        while lo > 0 && row_ptrs[lo].as_usize() > k {
            lo -= 1;
        }
        bounds.push((lo, k));
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;

    // 3x3: [[1, 0, 2], [0, 3, 0], [4, 5, 0]]
    const ROW_PTRS: [i64; 4] = [0, 2, 3, 5];
    const COL_IDXS: [i64; 5] = [0, 2, 1, 0, 1];
    const VALUES: [f64; 5] = [1.0, 2.0, 3.0, 4.0, 5.0];

    #[test]
    fn test_csr_apply_row() {
        let b = [1.0, 2.0, 3.0];
        let mut xrow = [0.0];
        csr_apply_row(0, &ROW_PTRS, &COL_IDXS, &VALUES, &b, 1, 1, 1.0, 0.0, &mut xrow);
        assert_eq!(xrow[0], 7.0);
        csr_apply_row(2, &ROW_PTRS, &COL_IDXS, &VALUES, &b, 1, 1, 1.0, 0.0, &mut xrow);
        assert_eq!(xrow[0], 14.0);
    }

    #[test]
    fn test_csr_chunk_contribs_split_row() {
        let b = [1.0, 2.0, 3.0];
        // split row 0 across two chunks
        let first = csr_chunk_contribs(0..1, 0, &ROW_PTRS, &COL_IDXS, &VALUES, &b, 1, 1, 1.0);
        let second = csr_chunk_contribs(1..5, 0, &ROW_PTRS, &COL_IDXS, &VALUES, &b, 1, 1, 1.0);
        assert_eq!(first, vec![(0, vec![1.0])]);
        assert_eq!(
            second,
            vec![(0, vec![6.0]), (1, vec![6.0]), (2, vec![14.0])]
        );
    }

    #[test]
    fn test_coo_chunk_contribs() {
        let rows = [0i64, 0, 1, 2, 2];
        let cols = [0i64, 2, 1, 0, 1];
        let vals = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [1.0, 2.0, 3.0];
        let runs = coo_chunk_contribs(0..5, &rows, &cols, &vals, &b, 1, 1, 1.0);
        assert_eq!(runs, vec![(0, vec![7.0]), (1, vec![6.0]), (2, vec![14.0])]);
    }

    #[test]
    fn test_merge_path_partition_covers_all() {
        let bounds = merge_path_partition(&ROW_PTRS, 3, 5, 2);
        assert_eq!(bounds.len(), 3);
        assert_eq!(bounds[0], (0, 0));
        assert_eq!(bounds[2], (3, 5));
        // boundaries are monotone in both coordinates
        for w in 0..2 {
            assert!(bounds[w].0 <= bounds[w + 1].0);
            assert!(bounds[w].1 <= bounds[w + 1].1);
        }
    }
}
