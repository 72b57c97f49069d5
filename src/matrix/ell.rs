//! ELL (ELLPACK) matrices
//!
//! A column-major tile of fixed width `max_nnz_per_row`: entry slot
//! `(r, k)` lives at `values[k * stride + r]`. Padding slots carry value
//! zero and the row's own index as column (clamped into the column
//! range for tall matrices), so SpMV can stream the full tile width and
//! padding contributes nothing.

use crate::array::Array;
use crate::dim::Dim2;
use crate::dtype::{IndexType, Value};
use crate::error::{Error, Result};
use crate::executor::{Executor, Operation};
use crate::kernels::SparseKernels;
use crate::linop::{validate_apply_dims, LinOp};
use crate::matrix::csr::Csr;
use crate::matrix::dense::Dense;
use crate::matrix_data::MatrixData;
use num_traits::Zero;

/// ELL sparse matrix
pub struct Ell<E: Executor, V: Value, I: IndexType = i64> {
    pub(crate) size: Dim2,
    pub(crate) stride: usize,
    pub(crate) max_nnz_per_row: usize,
    pub(crate) col_idxs: Array<E, I>,
    pub(crate) values: Array<E, V>,
}

/// Column index stored in a padding slot of row `r`
#[inline]
pub(crate) fn padding_col<I: IndexType>(r: usize, cols: usize) -> I {
    I::from_usize(r.min(cols.saturating_sub(1)))
}

impl<E: Executor, V: Value, I: IndexType> Ell<E, V, I> {
    /// Allocate an all-padding matrix with `stride == rows`
    pub fn new(size: Dim2, max_nnz_per_row: usize, device: &E::Device) -> Result<Self> {
        Self::with_stride(size, max_nnz_per_row, size.rows, device)
    }

    /// Allocate an all-padding matrix with an explicit stride
    pub fn with_stride(
        size: Dim2,
        max_nnz_per_row: usize,
        stride: usize,
        device: &E::Device,
    ) -> Result<Self> {
        if stride < size.rows {
            return Err(Error::not_supported(
                "ell::with_stride",
                format!("stride {} smaller than {} rows", stride, size.rows),
            ));
        }
        let slots = stride * max_nnz_per_row;
        let mut col_idxs = vec![I::ZERO; slots];
        for k in 0..max_nnz_per_row {
            for r in 0..size.rows {
                col_idxs[k * stride + r] = padding_col(r, size.cols);
            }
        }
        Ok(Self {
            size,
            stride,
            max_nnz_per_row,
            col_idxs: Array::from_slice(&col_idxs, device)?,
            values: Array::zeros(slots, device)?,
        })
    }

    /// Read assembly data, sizing the tile from the longest row
    pub fn read(data: &MatrixData<V, I>, device: &E::Device) -> Result<Self> {
        data.validate()?;
        let mut data = data.clone();
        data.sum_duplicates();
        data.remove_zeros();
        let max_nnz_per_row = data.max_row_nnz();
        Self::read_with_width(&data, max_nnz_per_row, device)
    }

    /// Read assembly data into a tile of the given width
    ///
    /// Rejects data with a row longer than `max_nnz_per_row`.
    pub fn read_with_width(
        data: &MatrixData<V, I>,
        max_nnz_per_row: usize,
        device: &E::Device,
    ) -> Result<Self> {
        data.validate()?;
        let mut data = data.clone();
        data.sum_duplicates();
        data.remove_zeros();
        if data.max_row_nnz() > max_nnz_per_row {
            return Err(Error::value_mismatch(format!(
                "row with {} entries exceeds tile width {}",
                data.max_row_nnz(),
                max_nnz_per_row
            )));
        }
        let size = data.size;
        let stride = size.rows;
        let slots = stride * max_nnz_per_row;
        let mut col_idxs = vec![I::ZERO; slots];
        let mut values = vec![V::zero(); slots];
        for k in 0..max_nnz_per_row {
            for r in 0..size.rows {
                col_idxs[k * stride + r] = padding_col(r, size.cols);
            }
        }
        let mut slot = vec![0usize; size.rows];
        for entry in &data.nonzeros {
            let r = entry.row.as_usize();
            let k = slot[r];
            col_idxs[k * stride + r] = entry.col;
            values[k * stride + r] = entry.value;
            slot[r] = k + 1;
        }
        Ok(Self {
            size,
            stride,
            max_nnz_per_row,
            col_idxs: Array::from_slice(&col_idxs, device)?,
            values: Array::from_slice(&values, device)?,
        })
    }

    /// Write the non-padding entries as assembly data
    pub fn write(&self) -> MatrixData<V, I> {
        let col_idxs = self.col_idxs.to_vec();
        let values = self.values.to_vec();
        let mut data = MatrixData::new(self.size);
        for r in 0..self.size.rows {
            for k in 0..self.max_nnz_per_row {
                let v = values[k * self.stride + r];
                if !v.is_zero() {
                    data.push(I::from_usize(r), col_idxs[k * self.stride + r], v);
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

    /// Tile row stride
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Tile width
    #[inline]
    pub fn max_nnz_per_row(&self) -> usize {
        self.max_nnz_per_row
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

    /// Number of stored non-padding entries
    pub fn nnz(&self) -> usize {
        self.values
            .to_vec()
            .into_iter()
            .filter(|v| !v.is_zero())
            .count()
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
    pub fn clone_to<E2: Executor>(&self, device: &E2::Device) -> Result<Ell<E2, V, I>> {
        Ok(Ell {
            size: self.size,
            stride: self.stride,
            max_nnz_per_row: self.max_nnz_per_row,
            col_idxs: self.col_idxs.copy_to::<E2>(device)?,
            values: self.values.copy_to::<E2>(device)?,
        })
    }
}

impl<E: Executor, V: Value, I: IndexType> LinOp<E, V> for Ell<E, V, I> {
    fn size(&self) -> Dim2 {
        self.size
    }

    fn apply_scaled(&self, alpha: V, b: &Dense<E, V>, beta: V, x: &mut Dense<E, V>) -> Result<()> {
        validate_apply_dims("ell::spmv", self.size, b, x)?;
        let client = E::client(self.device());
        E::run(Operation::new("ell::spmv").on_all(|| client.ell_spmv(alpha, self, b, beta, x)))
    }
}

impl<E: Executor, V: Value, I: IndexType> Clone for Ell<E, V, I> {
    fn clone(&self) -> Self {
        self.clone_to::<E>(self.device()).expect("ell clone failed")
    }
}

impl<E: Executor, V: Value, I: IndexType> std::fmt::Debug for Ell<E, V, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ell")
            .field("size", &self.size)
            .field("max_nnz_per_row", &self.max_nnz_per_row)
            .field("stride", &self.stride)
            .field("executor", &E::name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ReferenceExecutor;

    type RefEll = Ell<ReferenceExecutor, f64, i64>;

    fn device() -> <ReferenceExecutor as Executor>::Device {
        ReferenceExecutor::default_device()
    }

    // [[1, 0, 2], [0, 3, 0], [4, 5, 0]]
    fn sample_data() -> MatrixData<f64, i64> {
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
    fn test_read_sizes_tile() {
        let ell = RefEll::read(&sample_data(), &device()).unwrap();
        assert_eq!(ell.max_nnz_per_row(), 2);
        assert_eq!(ell.stride(), 3);
        assert_eq!(ell.nnz(), 5);
    }

    #[test]
    fn test_column_major_layout() {
        let ell = RefEll::read(&sample_data(), &device()).unwrap();
        let cols = ell.col_idxs().to_vec();
        let vals = ell.values().to_vec();
        // slot (r=0, k=0) -> col 0, value 1; slot (r=0, k=1) -> col 2, value 2
        assert_eq!((cols[0], vals[0]), (0, 1.0));
        assert_eq!((cols[3], vals[3]), (2, 2.0));
        // padding slot (r=1, k=1) carries the row index and value zero
        assert_eq!((cols[4], vals[4]), (1, 0.0));
    }

    #[test]
    fn test_spmv() {
        let ell = RefEll::read(&sample_data(), &device()).unwrap();
        let b = Dense::from_slice(Dim2::new(3, 1), &[1.0, 2.0, 3.0], &device()).unwrap();
        let mut x = Dense::new(Dim2::new(3, 1), &device()).unwrap();
        ell.apply(&b, &mut x).unwrap();
        assert_eq!(x.to_row_major_vec(), vec![7.0, 6.0, 14.0]);
    }

    #[test]
    fn test_write_roundtrip() {
        let data = sample_data();
        let ell = RefEll::read(&data, &device()).unwrap();
        let mut expected = data.clone();
        expected.sort_row_major();
        assert_eq!(ell.write(), expected);
    }

    #[test]
    fn test_read_with_width_rejects_overflow() {
        let result = RefEll::read_with_width(&sample_data(), 1, &device());
        assert!(matches!(result, Err(Error::ValueMismatch(_))));
    }

    #[test]
    fn test_to_csr_matches() {
        let ell = RefEll::read(&sample_data(), &device()).unwrap();
        let csr = ell.to_csr().unwrap();
        let mut expected = sample_data();
        expected.sort_row_major();
        assert_eq!(csr.write(), expected);
    }
}
