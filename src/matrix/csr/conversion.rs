//! Conversions in and out of CSR
//!
//! Direct converters run in two phases: a sizing pass that computes the
//! output shape and a fill pass that writes it. The two passes must
//! agree exactly on the number of non-zero positions; the fill asserts
//! it. Pairs without a direct path round-trip through
//! [`MatrixData`](crate::matrix_data::MatrixData).

use super::core::Csr;
use crate::dim::Dim2;
use crate::dtype::{IndexType, Value};
use crate::error::Result;
use crate::executor::Executor;
use crate::matrix::coo::Coo;
use crate::matrix::dense::Dense;
use crate::matrix::ell::Ell;
use crate::matrix::hybrid::{Hybrid, HybridStrategy};
use crate::matrix::sellp::Sellp;
use crate::matrix::sparsity::SparsityCsr;
use num_traits::Zero;

/// Sizing pass of dense-to-CSR: per-row non-zero counts
pub(crate) fn dense_nnz_per_row<V: Value>(rows: usize, cols: usize, host: &[V]) -> Vec<usize> {
    (0..rows)
        .map(|r| {
            host[r * cols..(r + 1) * cols]
                .iter()
                .filter(|v| !v.is_zero())
                .count()
        })
        .collect()
}

impl<E: Executor, V: Value> Dense<E, V> {
    /// Convert to CSR, dropping zero entries
    pub fn to_csr<I: IndexType>(&self) -> Result<Csr<E, V, I>> {
        let size = self.size();
        let host = self.to_row_major_vec();

        // sizing pass
        let counts = dense_nnz_per_row(size.rows, size.cols, &host);
        let mut row_ptrs = Vec::with_capacity(size.rows + 1);
        row_ptrs.push(I::ZERO);
        let mut total = 0usize;
        for &count in &counts {
            total += count;
            row_ptrs.push(I::from_usize(total));
        }

        // fill pass
        let mut col_idxs = Vec::with_capacity(total);
        let mut values = Vec::with_capacity(total);
        for r in 0..size.rows {
            for c in 0..size.cols {
                let v = host[r * size.cols + c];
                if !v.is_zero() {
                    col_idxs.push(I::from_usize(c));
                    values.push(v);
                }
            }
        }
        debug_assert_eq!(values.len(), total, "sizing and fill disagree");

        Csr::from_host_data(size, &row_ptrs, &col_idxs, &values, self.device())
    }

    /// Convert to COO, dropping zero entries
    pub fn to_coo<I: IndexType>(&self) -> Result<Coo<E, V, I>> {
        Coo::read(&self.write(), self.device())
    }

    /// Convert to ELL, dropping zero entries
    pub fn to_ell<I: IndexType>(&self) -> Result<Ell<E, V, I>> {
        Ell::read(&self.write(), self.device())
    }

    /// Convert to SELL-P with the default slice configuration
    pub fn to_sellp<I: IndexType>(&self) -> Result<Sellp<E, V, I>> {
        Sellp::read(&self.write(), self.device())
    }

    /// Convert to HYBRID with the automatic partition strategy
    pub fn to_hybrid<I: IndexType>(&self) -> Result<Hybrid<E, V, I>> {
        Hybrid::read(&self.write(), self.device())
    }
}

impl<E: Executor, V: Value, I: IndexType> Csr<E, V, I> {
    /// Convert a dense matrix to CSR
    pub fn from_dense(dense: &Dense<E, V>) -> Result<Self> {
        dense.to_csr()
    }

    /// Convert to dense
    pub fn to_dense(&self) -> Result<Dense<E, V>> {
        let size = self.size();
        let row_ptrs = self.row_ptrs().to_vec();
        let col_idxs = self.col_idxs().to_vec();
        let values = self.values().to_vec();
        let mut host = vec![V::zero(); size.count()];
        for r in 0..size.rows {
            for k in row_ptrs[r].as_usize()..row_ptrs[r + 1].as_usize() {
                host[r * size.cols + col_idxs[k].as_usize()] = values[k];
            }
        }
        Dense::from_slice(size, &host, self.device())
    }

    /// Convert to COO by expanding the row pointers
    pub fn to_coo(&self) -> Result<Coo<E, V, I>> {
        let row_ptrs = self.row_ptrs().to_vec();
        let mut row_idxs = Vec::with_capacity(self.nnz());
        for r in 0..self.size().rows {
            for _ in row_ptrs[r].as_usize()..row_ptrs[r + 1].as_usize() {
                row_idxs.push(I::from_usize(r));
            }
        }
        Coo::from_host_data(
            self.size(),
            &row_idxs,
            &self.col_idxs().to_vec(),
            &self.values().to_vec(),
            self.device(),
        )
    }

    /// Convert to ELL sized by the longest row
    pub fn to_ell(&self) -> Result<Ell<E, V, I>> {
        Ell::read(&self.write(), self.device())
    }

    /// Convert to SELL-P with the default slice configuration
    pub fn to_sellp(&self) -> Result<Sellp<E, V, I>> {
        Sellp::read(&self.write(), self.device())
    }

    /// Convert to SELL-P with an explicit slice size and stride factor
    pub fn to_sellp_with_config(
        &self,
        slice_size: usize,
        stride_factor: usize,
    ) -> Result<Sellp<E, V, I>> {
        Sellp::read_with_config(&self.write(), slice_size, stride_factor, self.device())
    }

    /// Convert to HYBRID with the automatic partition strategy
    pub fn to_hybrid(&self) -> Result<Hybrid<E, V, I>> {
        self.to_hybrid_with_strategy(HybridStrategy::Automatic)
    }

    /// Convert to HYBRID with an explicit partition strategy
    pub fn to_hybrid_with_strategy(&self, strategy: HybridStrategy) -> Result<Hybrid<E, V, I>> {
        Hybrid::read_with_strategy(&self.write(), strategy, self.device())
    }

    /// Extract the sparsity pattern
    pub fn to_sparsity(&self) -> Result<SparsityCsr<E, V, I>> {
        SparsityCsr::from_csr(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ReferenceExecutor;
    use crate::linop::LinOp;

    type RefDense = Dense<ReferenceExecutor, f64>;

    fn device() -> <ReferenceExecutor as Executor>::Device {
        ReferenceExecutor::default_device()
    }

    fn laplacian_3x3() -> RefDense {
        RefDense::from_slice(
            Dim2::new(3, 3),
            &[2.0, -1.0, 0.0, -1.0, 2.0, -1.0, 0.0, -1.0, 2.0],
            &device(),
        )
        .unwrap()
    }

    #[test]
    fn test_dense_csr_dense_roundtrip() {
        let dense = laplacian_3x3();
        let csr = dense.to_csr::<i64>().unwrap();
        assert_eq!(csr.nnz(), 7);
        let back = csr.to_dense().unwrap();
        assert_eq!(back.to_row_major_vec(), dense.to_row_major_vec());
    }

    #[test]
    fn test_dense_ell_csr_dense_roundtrip() {
        let dense = laplacian_3x3();
        let ell = dense.to_ell::<i64>().unwrap();
        assert_eq!(ell.max_nnz_per_row(), 3);
        let csr = ell.to_csr().unwrap();
        let back = csr.to_dense().unwrap();
        assert_eq!(back.to_row_major_vec(), dense.to_row_major_vec());
    }

    #[test]
    fn test_sizing_matches_fill() {
        let dense = laplacian_3x3();
        let counts = dense_nnz_per_row(3, 3, &dense.to_row_major_vec());
        assert_eq!(counts, vec![2, 3, 2]);
        let csr = dense.to_csr::<i64>().unwrap();
        let row_ptrs = csr.row_ptrs().to_vec();
        for r in 0..3 {
            assert_eq!(
                row_ptrs[r + 1] - row_ptrs[r],
                counts[r] as i64,
                "row {} sizing disagrees with fill",
                r
            );
        }
    }

    #[test]
    fn test_csr_coo_roundtrip() {
        let csr = laplacian_3x3().to_csr::<i64>().unwrap();
        let coo = csr.to_coo().unwrap();
        let back = coo.to_csr().unwrap();
        assert_eq!(back.write(), csr.write());
    }

    #[test]
    fn test_all_formats_same_spmv() {
        let dense = laplacian_3x3();
        let csr = dense.to_csr::<i64>().unwrap();
        let b = RefDense::from_slice(Dim2::new(3, 1), &[1.0, 2.0, 3.0], &device()).unwrap();
        let mut expected = RefDense::new(Dim2::new(3, 1), &device()).unwrap();
        dense.apply(&b, &mut expected).unwrap();
        let expected = expected.to_row_major_vec();

        let mut x = RefDense::new(Dim2::new(3, 1), &device()).unwrap();
        csr.apply(&b, &mut x).unwrap();
        assert_eq!(x.to_row_major_vec(), expected);

        let coo = csr.to_coo().unwrap();
        coo.apply(&b, &mut x).unwrap();
        assert_eq!(x.to_row_major_vec(), expected);

        let ell = csr.to_ell().unwrap();
        ell.apply(&b, &mut x).unwrap();
        assert_eq!(x.to_row_major_vec(), expected);

        let sellp = csr.to_sellp_with_config(2, 2).unwrap();
        sellp.apply(&b, &mut x).unwrap();
        assert_eq!(x.to_row_major_vec(), expected);

        let hybrid = csr.to_hybrid().unwrap();
        hybrid.apply(&b, &mut x).unwrap();
        assert_eq!(x.to_row_major_vec(), expected);
    }
}
