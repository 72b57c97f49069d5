//! COO (coordinate) matrices
//!
//! Parallel triples `(row_idxs[k], col_idxs[k], values[k])`. Row indices
//! are kept sorted non-decreasing; the segment-scan SpMV kernel depends
//! on it, so construction rejects unsorted data instead of trusting
//! convention.

use crate::array::Array;
use crate::dim::Dim2;
use crate::dtype::{IndexType, Value};
use crate::error::{Error, Result};
use crate::executor::{Executor, Operation};
use crate::kernels::SparseKernels;
use crate::linop::{validate_apply_dims, LinOp, Transposable};
use crate::matrix::csr::Csr;
use crate::matrix::dense::Dense;
use crate::matrix_data::MatrixData;

/// COO sparse matrix with rows sorted non-decreasing
pub struct Coo<E: Executor, V: Value, I: IndexType = i64> {
    pub(crate) size: Dim2,
    pub(crate) values: Array<E, V>,
    pub(crate) row_idxs: Array<E, I>,
    pub(crate) col_idxs: Array<E, I>,
}

impl<E: Executor, V: Value, I: IndexType> Coo<E, V, I> {
    /// Build from host triples, validating bounds and row ordering
    pub fn from_host_data(
        size: Dim2,
        row_idxs: &[I],
        col_idxs: &[I],
        values: &[V],
        device: &E::Device,
    ) -> Result<Self> {
        if row_idxs.len() != values.len() || col_idxs.len() != values.len() {
            return Err(Error::OutOfBounds {
                index: row_idxs.len().max(col_idxs.len()),
                size: values.len(),
            });
        }
        for k in 0..values.len() {
            let (row, col) = (row_idxs[k], col_idxs[k]);
            if row < I::ZERO || row.as_usize() >= size.rows {
                return Err(Error::OutOfBounds {
                    index: row.as_usize(),
                    size: size.rows,
                });
            }
            if col < I::ZERO || col.as_usize() >= size.cols {
                return Err(Error::OutOfBounds {
                    index: col.as_usize(),
                    size: size.cols,
                });
            }
            if k > 0 && row < row_idxs[k - 1] {
                return Err(Error::value_mismatch(format!(
                    "row indices decrease at entry {}",
                    k
                )));
            }
        }
        Ok(Self {
            size,
            values: Array::from_slice(values, device)?,
            row_idxs: Array::from_slice(row_idxs, device)?,
            col_idxs: Array::from_slice(col_idxs, device)?,
        })
    }

    /// An empty matrix of the given size
    pub fn empty(size: Dim2, device: &E::Device) -> Result<Self> {
        Self::from_host_data(size, &[], &[], &[], device)
    }

    /// Read assembly data (sorts row-major and sums duplicates)
    pub fn read(data: &MatrixData<V, I>, device: &E::Device) -> Result<Self> {
        data.validate()?;
        let mut data = data.clone();
        data.sum_duplicates();
        let rows: Vec<I> = data.nonzeros.iter().map(|e| e.row).collect();
        let cols: Vec<I> = data.nonzeros.iter().map(|e| e.col).collect();
        let vals: Vec<V> = data.nonzeros.iter().map(|e| e.value).collect();
        Self::from_host_data(data.size, &rows, &cols, &vals, device)
    }

    /// Write the entries as assembly data
    pub fn write(&self) -> MatrixData<V, I> {
        let rows = self.row_idxs.to_vec();
        let cols = self.col_idxs.to_vec();
        let vals = self.values.to_vec();
        let mut data = MatrixData::new(self.size);
        for k in 0..vals.len() {
            data.push(rows[k], cols[k], vals[k]);
        }
        data
    }

    /// Matrix dimension
    #[inline]
    pub fn size(&self) -> Dim2 {
        self.size
    }

    /// Number of stored entries
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Row index array
    #[inline]
    pub fn row_idxs(&self) -> &Array<E, I> {
        &self.row_idxs
    }

    /// Column index array
    #[inline]
    pub fn col_idxs(&self) -> &Array<E, I> {
        &self.col_idxs
    }

    /// Value array
    #[inline]
    pub fn values(&self) -> &Array<E, V> {
        &self.values
    }

    /// The device this matrix lives on
    #[inline]
    pub fn device(&self) -> &E::Device {
        self.values.device()
    }

    /// Convert to CSR by compressing the sorted row indices
    pub fn to_csr(&self) -> Result<Csr<E, V, I>> {
        let rows = self.row_idxs.to_vec();
        let mut row_ptrs = vec![I::ZERO; self.size.rows + 1];
        for &row in &rows {
            let r = row.as_usize();
            row_ptrs[r + 1] = I::from_usize(row_ptrs[r + 1].as_usize() + 1);
        }
        for r in 0..self.size.rows {
            row_ptrs[r + 1] = I::from_usize(row_ptrs[r + 1].as_usize() + row_ptrs[r].as_usize());
        }
        Csr::from_host_data(
            self.size,
            &row_ptrs,
            &self.col_idxs.to_vec(),
            &self.values.to_vec(),
            self.device(),
        )
    }

    /// Convert to dense
    pub fn to_dense(&self) -> Result<Dense<E, V>> {
        Dense::read(&self.write(), self.device())
    }

    /// Copy this matrix to another executor
    pub fn clone_to<E2: Executor>(&self, device: &E2::Device) -> Result<Coo<E2, V, I>> {
        Coo::from_host_data(
            self.size,
            &self.row_idxs.to_vec(),
            &self.col_idxs.to_vec(),
            &self.values.to_vec(),
            device,
        )
    }
}

impl<E: Executor, V: Value, I: IndexType> LinOp<E, V> for Coo<E, V, I> {
    fn size(&self) -> Dim2 {
        self.size
    }

    fn apply_scaled(&self, alpha: V, b: &Dense<E, V>, beta: V, x: &mut Dense<E, V>) -> Result<()> {
        validate_apply_dims("coo::spmv", self.size, b, x)?;
        let client = E::client(self.device());
        E::run(Operation::new("coo::spmv").on_all(|| client.coo_spmv(alpha, self, b, beta, x)))
    }
}

impl<E: Executor, V: Value, I: IndexType> Transposable for Coo<E, V, I> {
    type Output = Coo<E, V, I>;

    fn transpose(&self) -> Result<Self> {
        let mut entries: Vec<(I, I, V)> = Vec::with_capacity(self.nnz());
        let rows = self.row_idxs.to_vec();
        let cols = self.col_idxs.to_vec();
        let vals = self.values.to_vec();
        for k in 0..vals.len() {
            entries.push((cols[k], rows[k], vals[k]));
        }
        entries.sort_by_key(|&(r, c, _)| (r, c));
        let t_rows: Vec<I> = entries.iter().map(|e| e.0).collect();
        let t_cols: Vec<I> = entries.iter().map(|e| e.1).collect();
        let t_vals: Vec<V> = entries.iter().map(|e| e.2).collect();
        Coo::from_host_data(self.size.transposed(), &t_rows, &t_cols, &t_vals, self.device())
    }

    fn conj_transpose(&self) -> Result<Self> {
        let mut t = self.transpose()?;
        let conj: Vec<V> = t.values.to_vec().into_iter().map(|v| v.conj()).collect();
        t.values.write_from_slice(&conj)?;
        Ok(t)
    }
}

impl<E: Executor, V: Value, I: IndexType> Clone for Coo<E, V, I> {
    fn clone(&self) -> Self {
        self.clone_to::<E>(self.device()).expect("coo clone failed")
    }
}

impl<E: Executor, V: Value, I: IndexType> std::fmt::Debug for Coo<E, V, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coo")
            .field("size", &self.size)
            .field("nnz", &self.nnz())
            .field("executor", &E::name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ReferenceExecutor;

    type RefCoo = Coo<ReferenceExecutor, f64, i64>;

    fn device() -> <ReferenceExecutor as Executor>::Device {
        ReferenceExecutor::default_device()
    }

    // [[1, 0, 2], [0, 3, 0], [4, 5, 0]]
    fn sample() -> RefCoo {
        RefCoo::from_host_data(
            Dim2::new(3, 3),
            &[0, 0, 1, 2, 2],
            &[0, 2, 1, 0, 1],
            &[1.0, 2.0, 3.0, 4.0, 5.0],
            &device(),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_unsorted_rows() {
        let result = RefCoo::from_host_data(
            Dim2::new(2, 2),
            &[1, 0],
            &[0, 1],
            &[1.0, 2.0],
            &device(),
        );
        assert!(matches!(result, Err(Error::ValueMismatch(_))));
    }

    #[test]
    fn test_spmv() {
        let coo = sample();
        let b = Dense::from_slice(Dim2::new(3, 1), &[1.0, 2.0, 3.0], &device()).unwrap();
        let mut x = Dense::new(Dim2::new(3, 1), &device()).unwrap();
        coo.apply(&b, &mut x).unwrap();
        assert_eq!(x.to_row_major_vec(), vec![7.0, 6.0, 14.0]);
    }

    #[test]
    fn test_spmv_accumulates_with_beta() {
        let coo = sample();
        let b = Dense::from_slice(Dim2::new(3, 1), &[1.0, 2.0, 3.0], &device()).unwrap();
        let mut x = Dense::from_slice(Dim2::new(3, 1), &[10.0, 10.0, 10.0], &device()).unwrap();
        coo.apply_scaled(1.0, &b, 1.0, &mut x).unwrap();
        assert_eq!(x.to_row_major_vec(), vec![17.0, 16.0, 24.0]);
    }

    #[test]
    fn test_to_csr_matches() {
        let coo = sample();
        let csr = coo.to_csr().unwrap();
        assert_eq!(csr.write(), coo.write());
    }

    #[test]
    fn test_transpose_roundtrip() {
        let coo = sample();
        let t = coo.transpose().unwrap();
        let tt = t.transpose().unwrap();
        assert_eq!(tt.write(), coo.write());
    }

    #[test]
    fn test_empty() {
        let coo = RefCoo::empty(Dim2::new(2, 2), &device()).unwrap();
        assert_eq!(coo.nnz(), 0);
        let b = Dense::from_slice(Dim2::new(2, 1), &[1.0, 1.0], &device()).unwrap();
        let mut x = Dense::from_slice(Dim2::new(2, 1), &[5.0, 5.0], &device()).unwrap();
        coo.apply(&b, &mut x).unwrap();
        assert_eq!(x.to_row_major_vec(), vec![0.0, 0.0]);
    }
}
