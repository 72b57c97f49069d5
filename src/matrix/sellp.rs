//! SELL-P (sliced ELL with padding) matrices
//!
//! Rows are grouped into fixed-size slices. Each slice stores a dense
//! column-major tile whose width is the slice's longest row rounded up
//! to a multiple of `stride_factor`; `slice_sets` holds the prefix sums
//! of those widths, so slice `s` occupies columns
//! `slice_sets[s]..slice_sets[s + 1]` of the packed value tile. Entry
//! slot `(local_row, k)` of slice `s` lives at
//! `values[(slice_sets[s] + k) * slice_size + local_row]`.

use crate::array::Array;
use crate::dim::Dim2;
use crate::dtype::{IndexType, Value};
use crate::error::{Error, Result};
use crate::executor::{Executor, Operation};
use crate::kernels::SparseKernels;
use crate::linop::{validate_apply_dims, LinOp};
use crate::matrix::csr::Csr;
use crate::matrix::dense::Dense;
use crate::matrix::ell::padding_col;
use crate::matrix_data::MatrixData;
use num_traits::Zero;

/// Default rows per slice
pub const DEFAULT_SLICE_SIZE: usize = 64;
/// Default slice-width rounding factor
pub const DEFAULT_STRIDE_FACTOR: usize = 1;

/// SELL-P sparse matrix
pub struct Sellp<E: Executor, V: Value, I: IndexType = i64> {
    pub(crate) size: Dim2,
    pub(crate) slice_size: usize,
    pub(crate) stride_factor: usize,
    pub(crate) total_cols: usize,
    pub(crate) slice_sets: Array<E, I>,
    pub(crate) slice_lengths: Array<E, I>,
    pub(crate) col_idxs: Array<E, I>,
    pub(crate) values: Array<E, V>,
}

impl<E: Executor, V: Value, I: IndexType> Sellp<E, V, I> {
    /// Read assembly data with the default slice configuration
    pub fn read(data: &MatrixData<V, I>, device: &E::Device) -> Result<Self> {
        Self::read_with_config(data, DEFAULT_SLICE_SIZE, DEFAULT_STRIDE_FACTOR, device)
    }

    /// Read assembly data with an explicit slice size and stride factor
    pub fn read_with_config(
        data: &MatrixData<V, I>,
        slice_size: usize,
        stride_factor: usize,
        device: &E::Device,
    ) -> Result<Self> {
        if slice_size == 0 || stride_factor == 0 {
            return Err(Error::not_supported(
                "sellp::read",
                "slice_size and stride_factor must be positive",
            ));
        }
        data.validate()?;
        let mut data = data.clone();
        data.sum_duplicates();
        data.remove_zeros();
        let size = data.size;
        let num_slices = size.rows.div_ceil(slice_size);
        let row_counts = data.row_counts();

        // sizing phase: per-slice widths rounded up to the stride factor
        let mut slice_lengths = vec![I::ZERO; num_slices];
        for s in 0..num_slices {
            let begin = s * slice_size;
            let end = (begin + slice_size).min(size.rows);
            let max_in_slice = row_counts[begin..end].iter().copied().max().unwrap_or(0);
            let padded = max_in_slice.div_ceil(stride_factor) * stride_factor;
            slice_lengths[s] = I::from_usize(padded);
        }
        let mut slice_sets = vec![I::ZERO; num_slices + 1];
        for s in 0..num_slices {
            slice_sets[s + 1] =
                I::from_usize(slice_sets[s].as_usize() + slice_lengths[s].as_usize());
        }
        let total_cols = slice_sets[num_slices].as_usize();

        // fill phase
        let slots = total_cols * slice_size;
        let mut col_idxs = vec![I::ZERO; slots];
        let mut values = vec![V::zero(); slots];
        for s in 0..num_slices {
            let begin = slice_sets[s].as_usize();
            let len = slice_lengths[s].as_usize();
            for local in 0..slice_size {
                let r = s * slice_size + local;
                for k in 0..len {
                    let idx = (begin + k) * slice_size + local;
                    col_idxs[idx] = padding_col(r.min(size.rows.saturating_sub(1)), size.cols);
                }
            }
        }
        let mut slot = vec![0usize; size.rows];
        for entry in &data.nonzeros {
            let r = entry.row.as_usize();
            let s = r / slice_size;
            let local = r % slice_size;
            let k = slot[r];
            let idx = (slice_sets[s].as_usize() + k) * slice_size + local;
            col_idxs[idx] = entry.col;
            values[idx] = entry.value;
            slot[r] = k + 1;
        }

        Ok(Self {
            size,
            slice_size,
            stride_factor,
            total_cols,
            slice_sets: Array::from_slice(&slice_sets, device)?,
            slice_lengths: Array::from_slice(&slice_lengths, device)?,
            col_idxs: Array::from_slice(&col_idxs, device)?,
            values: Array::from_slice(&values, device)?,
        })
    }

    /// Write the non-padding entries as assembly data
    pub fn write(&self) -> MatrixData<V, I> {
        let slice_sets = self.slice_sets.to_vec();
        let col_idxs = self.col_idxs.to_vec();
        let values = self.values.to_vec();
        let mut data = MatrixData::new(self.size);
        for r in 0..self.size.rows {
            let s = r / self.slice_size;
            let local = r % self.slice_size;
            let begin = slice_sets[s].as_usize();
            let len = slice_sets[s + 1].as_usize() - begin;
            for k in 0..len {
                let idx = (begin + k) * self.slice_size + local;
                if !values[idx].is_zero() {
                    data.push(I::from_usize(r), col_idxs[idx], values[idx]);
                }
            }
        }
        data.sort_row_major();
        data
    }

    /// Matrix dimension
    #[inline]
    pub fn size(&self) -> Dim2 {
        self.size
    }

    /// Rows per slice
    #[inline]
    pub fn slice_size(&self) -> usize {
        self.slice_size
    }

    /// Slice-width rounding factor
    #[inline]
    pub fn stride_factor(&self) -> usize {
        self.stride_factor
    }

    /// Total packed columns across all slices
    #[inline]
    pub fn total_cols(&self) -> usize {
        self.total_cols
    }

    /// Per-slice starting column offsets (`num_slices + 1` entries)
    #[inline]
    pub fn slice_sets(&self) -> &Array<E, I> {
        &self.slice_sets
    }

    /// Per-slice widths
    #[inline]
    pub fn slice_lengths(&self) -> &Array<E, I> {
        &self.slice_lengths
    }

    /// Column index tile
    #[inline]
    pub fn col_idxs(&self) -> &Array<E, I> {
        &self.col_idxs
    }

    /// Value tile
    #[inline]
    pub fn values(&self) -> &Array<E, V> {
        &self.values
    }

    /// Number of slices
    #[inline]
    pub fn num_slices(&self) -> usize {
        self.size.rows.div_ceil(self.slice_size)
    }

    /// The device this matrix lives on
    #[inline]
    pub fn device(&self) -> &E::Device {
        self.values.device()
    }

    /// Convert to CSR
    pub fn to_csr(&self) -> Result<Csr<E, V, I>> {
        Csr::read(&self.write(), self.device())
    }

    /// Convert to dense
    pub fn to_dense(&self) -> Result<Dense<E, V>> {
        Dense::read(&self.write(), self.device())
    }

    /// Copy this matrix to another executor
    pub fn clone_to<E2: Executor>(&self, device: &E2::Device) -> Result<Sellp<E2, V, I>> {
        Ok(Sellp {
            size: self.size,
            slice_size: self.slice_size,
            stride_factor: self.stride_factor,
            total_cols: self.total_cols,
            slice_sets: self.slice_sets.copy_to::<E2>(device)?,
            slice_lengths: self.slice_lengths.copy_to::<E2>(device)?,
            col_idxs: self.col_idxs.copy_to::<E2>(device)?,
            values: self.values.copy_to::<E2>(device)?,
        })
    }
}

impl<E: Executor, V: Value, I: IndexType> LinOp<E, V> for Sellp<E, V, I> {
    fn size(&self) -> Dim2 {
        self.size
    }

    fn apply_scaled(&self, alpha: V, b: &Dense<E, V>, beta: V, x: &mut Dense<E, V>) -> Result<()> {
        validate_apply_dims("sellp::spmv", self.size, b, x)?;
        let client = E::client(self.device());
        E::run(Operation::new("sellp::spmv").on_all(|| client.sellp_spmv(alpha, self, b, beta, x)))
    }
}

impl<E: Executor, V: Value, I: IndexType> Clone for Sellp<E, V, I> {
    fn clone(&self) -> Self {
        self.clone_to::<E>(self.device()).expect("sellp clone failed")
    }
}

impl<E: Executor, V: Value, I: IndexType> std::fmt::Debug for Sellp<E, V, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sellp")
            .field("size", &self.size)
            .field("slice_size", &self.slice_size)
            .field("total_cols", &self.total_cols)
            .field("executor", &E::name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ReferenceExecutor;

    type RefSellp = Sellp<ReferenceExecutor, f64, i64>;

    fn device() -> <ReferenceExecutor as Executor>::Device {
        ReferenceExecutor::default_device()
    }

    fn sample_data() -> MatrixData<f64, i64> {
        // [[1, 0, 2], [0, 3, 0], [4, 5, 0]]
        MatrixData::from_entries(
            Dim2::new(3, 3),
            [
                (0i64, 0i64, 1.0),
                (0, 2, 2.0),
                (1, 1, 3.0),
                (2, 0, 4.0),
                (2, 1, 5.0),
            ],
        )
    }

    #[test]
    fn test_slice_sizing_with_two_slices() {
        // slice size 2: slice 0 holds rows {0, 1} (max 2 nnz),
        // slice 1 holds row {2} (2 nnz)
        let sellp = RefSellp::read_with_config(&sample_data(), 2, 1, &device()).unwrap();
        assert_eq!(sellp.num_slices(), 2);
        assert_eq!(sellp.slice_lengths().to_vec(), vec![2, 2]);
        assert_eq!(sellp.slice_sets().to_vec(), vec![0, 2, 4]);
        assert_eq!(sellp.total_cols(), 4);
    }

    #[test]
    fn test_stride_factor_rounds_widths() {
        let sellp = RefSellp::read_with_config(&sample_data(), 2, 4, &device()).unwrap();
        // widths rounded up to multiples of 4
        assert!(sellp
            .slice_lengths()
            .to_vec()
            .iter()
            .all(|&len| len % 4 == 0));
    }

    #[test]
    fn test_spmv() {
        for slice_size in [1, 2, 64] {
            let sellp =
                RefSellp::read_with_config(&sample_data(), slice_size, 1, &device()).unwrap();
            let b = Dense::from_slice(Dim2::new(3, 1), &[1.0, 2.0, 3.0], &device()).unwrap();
            let mut x = Dense::new(Dim2::new(3, 1), &device()).unwrap();
            sellp.apply(&b, &mut x).unwrap();
            assert_eq!(x.to_row_major_vec(), vec![7.0, 6.0, 14.0]);
        }
    }

    #[test]
    fn test_write_roundtrip() {
        let sellp = RefSellp::read(&sample_data(), &device()).unwrap();
        let mut expected = sample_data();
        expected.sort_row_major();
        assert_eq!(sellp.write(), expected);
    }
}
