//! SpGEMM: sparse matrix times sparse matrix
//!
//! Two-pass execution over the row-tiered multi-way merge in [`heap`]:
//! the counting pass runs the merge with the trivial accumulator to get
//! per-row output sizes, a prefix scan turns them into row pointers,
//! and the fill pass runs the same merge again writing columns and
//! values. Both passes traverse identically, so the scanned positions
//! always match.

pub(crate) mod heap;

use crate::dtype::{IndexType, Value};
use crate::error::Result;
use crate::executor::HostAccessible;
use crate::matrix::csr::Csr;
use heap::{merge_row, CountSink, FillSink, Source};
use rayon::prelude::*;

/// Build the merge sources of one output row
///
/// Every non-zero `A[i, k]` contributes B's row `k` weighted by
/// `alpha * A[i, k]`; the optional `(beta, D)` pair contributes D's row
/// `i` weighted by `beta` for the advanced form.
#[allow(clippy::too_many_arguments)]
fn row_sources<'a, V: Value, I: IndexType>(
    row: usize,
    alpha: V,
    a_row_ptrs: &[I],
    a_col_idxs: &'a [I],
    a_values: &'a [V],
    b_row_ptrs: &[I],
    b_col_idxs: &'a [I],
    b_values: &'a [V],
    extra: Option<(V, &'a [I], &'a [I], &'a [V])>,
) -> Vec<Source<'a, V, I>> {
    let begin = a_row_ptrs[row].as_usize();
    let end = a_row_ptrs[row + 1].as_usize();
    let mut sources = Vec::with_capacity(end - begin + extra.is_some() as usize);
    for k in begin..end {
        let b_row = a_col_idxs[k].as_usize();
        let b_begin = b_row_ptrs[b_row].as_usize();
        let b_end = b_row_ptrs[b_row + 1].as_usize();
        sources.push(Source::new(
            &b_col_idxs[b_begin..b_end],
            &b_values[b_begin..b_end],
            alpha * a_values[k],
        ));
    }
    if let Some((beta, d_row_ptrs, d_col_idxs, d_values)) = extra {
        let d_begin = d_row_ptrs[row].as_usize();
        let d_end = d_row_ptrs[row + 1].as_usize();
        sources.push(Source::new(
            &d_col_idxs[d_begin..d_end],
            &d_values[d_begin..d_end],
            beta,
        ));
    }
    sources
}

/// `C = alpha * A * B (+ beta * D)` on host-addressable executors
pub(crate) fn spgemm_host<E: HostAccessible, V: Value, I: IndexType>(
    alpha: V,
    a: &Csr<E, V, I>,
    b: &Csr<E, V, I>,
    beta_d: Option<(V, &Csr<E, V, I>)>,
) -> Result<Csr<E, V, I>> {
    let rows = a.size().rows;
    let a_row_ptrs = a.row_ptrs().as_slice();
    let a_col_idxs = a.col_idxs().as_slice();
    let a_values = a.values().as_slice();
    let b_row_ptrs = b.row_ptrs().as_slice();
    let b_col_idxs = b.col_idxs().as_slice();
    let b_values = b.values().as_slice();
    let extra = beta_d.map(|(beta, d)| {
        (
            beta,
            d.row_ptrs().as_slice(),
            d.col_idxs().as_slice(),
            d.values().as_slice(),
        )
    });

    let count_row = |row: usize| -> usize {
        let mut sources = row_sources(
            row, alpha, a_row_ptrs, a_col_idxs, a_values, b_row_ptrs, b_col_idxs, b_values, extra,
        );
        let mut sink = CountSink::default();
        merge_row(&mut sources, &mut sink);
        sink.count
    };

    // counting pass
    let counts: Vec<usize> = if E::PARALLEL {
        (0..rows).into_par_iter().map(count_row).collect()
    } else {
        (0..rows).map(count_row).collect()
    };

    // prefix scan into row pointers
    let mut row_ptrs = Vec::with_capacity(rows + 1);
    row_ptrs.push(I::ZERO);
    let mut total = 0usize;
    for &count in &counts {
        total += count;
        row_ptrs.push(I::from_usize(total));
    }

    // fill pass
    let fill_row = |row: usize| -> (Vec<I>, Vec<V>) {
        let mut sources = row_sources(
            row, alpha, a_row_ptrs, a_col_idxs, a_values, b_row_ptrs, b_col_idxs, b_values, extra,
        );
        let mut cols = Vec::with_capacity(counts[row]);
        let mut vals = Vec::with_capacity(counts[row]);
        let mut sink = FillSink {
            cols: &mut cols,
            vals: &mut vals,
        };
        merge_row(&mut sources, &mut sink);
        (cols, vals)
    };

    let filled: Vec<(Vec<I>, Vec<V>)> = if E::PARALLEL {
        (0..rows).into_par_iter().map(fill_row).collect()
    } else {
        (0..rows).map(fill_row).collect()
    };

    let mut col_idxs = Vec::with_capacity(total);
    let mut values = Vec::with_capacity(total);
    for (row, (cols, vals)) in filled.into_iter().enumerate() {
        debug_assert_eq!(cols.len(), counts[row], "passes disagree on row {}", row);
        col_idxs.extend(cols);
        values.extend(vals);
    }

    let size = crate::dim::Dim2::new(rows, b.size().cols);
    Csr::from_host_data(size, &row_ptrs, &col_idxs, &values, a.device())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dim::Dim2;
    use crate::executor::{Executor, ReferenceExecutor};

    type RefCsr = Csr<ReferenceExecutor, f64, i64>;

    fn device() -> <ReferenceExecutor as Executor>::Device {
        ReferenceExecutor::default_device()
    }

    #[test]
    fn test_tier1_literal() {
        // A = [[1, 2], [0, 3]], B = [[4, 0], [0, 5]]
        let a = RefCsr::from_host_data(
            Dim2::new(2, 2),
            &[0, 2, 3],
            &[0, 1, 1],
            &[1.0, 2.0, 3.0],
            &device(),
        )
        .unwrap();
        let b = RefCsr::from_host_data(
            Dim2::new(2, 2),
            &[0, 1, 2],
            &[0, 1],
            &[4.0, 5.0],
            &device(),
        )
        .unwrap();
        let c = spgemm_host(1.0, &a, &b, None).unwrap();
        // C = [[4, 10], [0, 15]], per-row counts {2, 1}
        assert_eq!(c.row_ptrs().to_vec(), vec![0, 2, 3]);
        assert_eq!(c.col_idxs().to_vec(), vec![0, 1, 1]);
        assert_eq!(c.values().to_vec(), vec![4.0, 10.0, 15.0]);
    }

    #[test]
    fn test_two_pass_coherence() {
        let a = RefCsr::from_host_data(
            Dim2::new(3, 3),
            &[0, 2, 3, 5],
            &[0, 2, 1, 0, 1],
            &[1.0, 2.0, 3.0, 4.0, 5.0],
            &device(),
        )
        .unwrap();
        let c = spgemm_host(1.0, &a, &a, None).unwrap();
        // row pointers must equal the prefix sum of emitted row lengths
        let row_ptrs = c.row_ptrs().to_vec();
        assert_eq!(*row_ptrs.last().unwrap() as usize, c.nnz());
        for w in row_ptrs.windows(2) {
            assert!(w[0] <= w[1]);
        }
    }

    #[test]
    fn test_advanced_form_merges_d() {
        let a = RefCsr::from_host_data(
            Dim2::new(1, 1),
            &[0, 1],
            &[0],
            &[2.0],
            &device(),
        )
        .unwrap();
        let d = RefCsr::from_host_data(
            Dim2::new(1, 1),
            &[0, 1],
            &[0],
            &[10.0],
            &device(),
        )
        .unwrap();
        // C = 3 * A * A + 0.5 * D = 3*4 + 5 = 17
        let c = spgemm_host(3.0, &a, &a, Some((0.5, &d))).unwrap();
        assert_eq!(c.values().to_vec(), vec![17.0]);
    }

    #[test]
    fn test_empty_rows() {
        let a = RefCsr::empty(Dim2::new(2, 2), &device()).unwrap();
        let c = spgemm_host(1.0, &a, &a, None).unwrap();
        assert_eq!(c.nnz(), 0);
        assert_eq!(c.row_ptrs().to_vec(), vec![0, 0, 0]);
    }
}
