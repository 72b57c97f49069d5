//! CSR storage: struct, creation, validation, structural operations

use super::strategy::{build_srow, CsrStrategy};
use crate::array::Array;
use crate::dim::Dim2;
use crate::dtype::{IndexType, Value};
use crate::error::{Error, Result};
use crate::executor::{Executor, ExecutorClient, Operation};
use crate::kernels::SparseKernels;
use crate::linop::{
    validate_apply_dims, DiagonalExtractable, LinOp, Permutable, Transposable,
};
use crate::matrix::dense::Dense;
use crate::matrix::permutation::Permutation;
use crate::matrix_data::MatrixData;
use num_traits::Zero;

/// CSR sparse matrix
///
/// Row `r` owns the non-zeros at `row_ptrs[r]..row_ptrs[r + 1]` in
/// `col_idxs`/`values`. `row_ptrs` is monotone non-decreasing with
/// `row_ptrs[rows] == nnz`. The strategy selects the SpMV kernel family;
/// `srow` is its auxiliary super-row table.
pub struct Csr<E: Executor, V: Value, I: IndexType = i64> {
    pub(crate) size: Dim2,
    pub(crate) values: Array<E, V>,
    pub(crate) col_idxs: Array<E, I>,
    pub(crate) row_ptrs: Array<E, I>,
    pub(crate) strategy: CsrStrategy,
    pub(crate) srow: Array<E, I>,
}

/// Check CSR invariants on host data
pub(crate) fn validate_csr_parts<V: Value, I: IndexType>(
    size: Dim2,
    row_ptrs: &[I],
    col_idxs: &[I],
    values: &[V],
) -> Result<()> {
    if row_ptrs.len() != size.rows + 1 {
        return Err(Error::OutOfBounds {
            index: row_ptrs.len(),
            size: size.rows + 1,
        });
    }
    if col_idxs.len() != values.len() {
        return Err(Error::OutOfBounds {
            index: col_idxs.len(),
            size: values.len(),
        });
    }
    if row_ptrs[0] != I::ZERO {
        return Err(Error::value_mismatch("row_ptrs must start at zero"));
    }
    for r in 0..size.rows {
        if row_ptrs[r + 1] < row_ptrs[r] {
            return Err(Error::value_mismatch(format!(
                "row_ptrs decreases at row {}",
                r
            )));
        }
    }
    if row_ptrs[size.rows].as_usize() != values.len() {
        return Err(Error::value_mismatch(format!(
            "row_ptrs ends at {}, expected nnz {}",
            row_ptrs[size.rows].as_usize(),
            values.len()
        )));
    }
    for &col in col_idxs {
        if col < I::ZERO || col.as_usize() >= size.cols {
            return Err(Error::OutOfBounds {
                index: col.as_usize(),
                size: size.cols,
            });
        }
    }
    Ok(())
}

impl<E: Executor, V: Value, I: IndexType> Csr<E, V, I> {
    /// Build from host-side parts, validating all invariants
    pub fn from_host_data(
        size: Dim2,
        row_ptrs: &[I],
        col_idxs: &[I],
        values: &[V],
        device: &E::Device,
    ) -> Result<Self> {
        validate_csr_parts(size, row_ptrs, col_idxs, values)?;
        let mut csr = Self {
            size,
            values: Array::from_slice(values, device)?,
            col_idxs: Array::from_slice(col_idxs, device)?,
            row_ptrs: Array::from_slice(row_ptrs, device)?,
            strategy: CsrStrategy::default(),
            srow: Array::empty(device),
        };
        csr.rebuild_srow()?;
        Ok(csr)
    }

    /// An empty matrix of the given size
    pub fn empty(size: Dim2, device: &E::Device) -> Result<Self> {
        let row_ptrs = vec![I::ZERO; size.rows + 1];
        Self::from_host_data(size, &row_ptrs, &[], &[], device)
    }

    /// Read assembly data (sorts row-major and sums duplicates)
    pub fn read(data: &MatrixData<V, I>, device: &E::Device) -> Result<Self> {
        data.validate()?;
        let mut data = data.clone();
        data.sum_duplicates();
        let mut row_ptrs = Vec::with_capacity(data.size.rows + 1);
        let mut col_idxs = Vec::with_capacity(data.nnz());
        let mut values = Vec::with_capacity(data.nnz());
        row_ptrs.push(I::ZERO);
        let mut entry_iter = data.nonzeros.iter().peekable();
        for r in 0..data.size.rows {
            while let Some(entry) = entry_iter.peek() {
                if entry.row.as_usize() != r {
                    break;
                }
                col_idxs.push(entry.col);
                values.push(entry.value);
                entry_iter.next();
            }
            row_ptrs.push(I::from_usize(col_idxs.len()));
        }
        Self::from_host_data(data.size, &row_ptrs, &col_idxs, &values, device)
    }

    /// Write the entries as assembly data (row-major order)
    pub fn write(&self) -> MatrixData<V, I> {
        let row_ptrs = self.row_ptrs.to_vec();
        let col_idxs = self.col_idxs.to_vec();
        let values = self.values.to_vec();
        let mut data = MatrixData::new(self.size);
        for r in 0..self.size.rows {
            for k in row_ptrs[r].as_usize()..row_ptrs[r + 1].as_usize() {
                data.push(I::from_usize(r), col_idxs[k], values[k]);
            }
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

    /// Row pointer array (`rows + 1` entries)
    #[inline]
    pub fn row_ptrs(&self) -> &Array<E, I> {
        &self.row_ptrs
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

    /// The SpMV strategy
    #[inline]
    pub fn strategy(&self) -> CsrStrategy {
        self.strategy
    }

    /// The super-row table of the load-balance family (may be empty)
    #[inline]
    pub fn srow(&self) -> &Array<E, I> {
        &self.srow
    }

    /// The device this matrix lives on
    #[inline]
    pub fn device(&self) -> &E::Device {
        self.values.device()
    }

    /// Replace the SpMV strategy, rebuilding `srow` as needed
    pub fn with_strategy(mut self, strategy: CsrStrategy) -> Result<Self> {
        self.strategy = strategy;
        self.rebuild_srow()?;
        Ok(self)
    }

    fn rebuild_srow(&mut self) -> Result<()> {
        let device = self.values.device().clone();
        if self.strategy.uses_srow() {
            let workers = E::client(&device).parallelism().workers;
            let srow = build_srow(&self.row_ptrs.to_vec(), workers);
            self.srow = Array::from_slice(&srow, &device)?;
        } else {
            self.srow = Array::empty(&device);
        }
        Ok(())
    }

    /// True when every row's column indices are strictly increasing
    pub fn is_sorted_by_column_index(&self) -> bool {
        let row_ptrs = self.row_ptrs.to_vec();
        let col_idxs = self.col_idxs.to_vec();
        (0..self.size.rows).all(|r| {
            let row = &col_idxs[row_ptrs[r].as_usize()..row_ptrs[r + 1].as_usize()];
            row.windows(2).all(|w| w[0] < w[1])
        })
    }

    /// Sort each row by column index, keeping values aligned
    pub fn sort_by_column_index(&mut self) -> Result<()> {
        let row_ptrs = self.row_ptrs.to_vec();
        let mut col_idxs = self.col_idxs.to_vec();
        let mut values = self.values.to_vec();
        for r in 0..self.size.rows {
            let begin = row_ptrs[r].as_usize();
            let end = row_ptrs[r + 1].as_usize();
            let mut entries: Vec<(I, V)> = col_idxs[begin..end]
                .iter()
                .copied()
                .zip(values[begin..end].iter().copied())
                .collect();
            entries.sort_by_key(|&(col, _)| col);
            for (k, (col, val)) in entries.into_iter().enumerate() {
                col_idxs[begin + k] = col;
                values[begin + k] = val;
            }
        }
        self.col_idxs.write_from_slice(&col_idxs)?;
        self.values.write_from_slice(&values)?;
        Ok(())
    }

    /// Copy this matrix to another executor, keeping the strategy
    ///
    /// The `srow` table is rebuilt for the target executor's worker
    /// count.
    pub fn clone_to<E2: Executor>(&self, device: &E2::Device) -> Result<Csr<E2, V, I>> {
        Csr::from_host_data(
            self.size,
            &self.row_ptrs.to_vec(),
            &self.col_idxs.to_vec(),
            &self.values.to_vec(),
            device,
        )?
        .with_strategy(self.strategy)
    }
}

impl<E: Executor, V: Value, I: IndexType> LinOp<E, V> for Csr<E, V, I> {
    fn size(&self) -> Dim2 {
        self.size
    }

    fn apply_scaled(&self, alpha: V, b: &Dense<E, V>, beta: V, x: &mut Dense<E, V>) -> Result<()> {
        validate_apply_dims("csr::spmv", self.size, b, x)?;
        let client = E::client(self.device());
        E::run(Operation::new("csr::spmv").on_all(|| client.csr_spmv(alpha, self, b, beta, x)))
    }
}

impl<E: Executor, V: Value, I: IndexType> Transposable for Csr<E, V, I> {
    type Output = Csr<E, V, I>;

    fn transpose(&self) -> Result<Self> {
        self.transpose_impl(false)
    }

    fn conj_transpose(&self) -> Result<Self> {
        self.transpose_impl(true)
    }
}

impl<E: Executor, V: Value, I: IndexType> Csr<E, V, I> {
    /// Counting transpose on host-staged data
    fn transpose_impl(&self, conjugate: bool) -> Result<Self> {
        let row_ptrs = self.row_ptrs.to_vec();
        let col_idxs = self.col_idxs.to_vec();
        let values = self.values.to_vec();
        let t_size = self.size.transposed();
        let nnz = values.len();

        let mut t_row_ptrs = vec![I::ZERO; t_size.rows + 1];
        for &col in &col_idxs {
            let c = col.as_usize();
            t_row_ptrs[c + 1] = I::from_usize(t_row_ptrs[c + 1].as_usize() + 1);
        }
        for r in 0..t_size.rows {
            t_row_ptrs[r + 1] = I::from_usize(t_row_ptrs[r + 1].as_usize() + t_row_ptrs[r].as_usize());
        }

        let mut cursor: Vec<usize> = t_row_ptrs[..t_size.rows].iter().map(|p| p.as_usize()).collect();
        let mut t_col_idxs = vec![I::ZERO; nnz];
        let mut t_values = vec![V::zero(); nnz];
        for r in 0..self.size.rows {
            for k in row_ptrs[r].as_usize()..row_ptrs[r + 1].as_usize() {
                let c = col_idxs[k].as_usize();
                let dst = cursor[c];
                cursor[c] += 1;
                t_col_idxs[dst] = I::from_usize(r);
                t_values[dst] = if conjugate { values[k].conj() } else { values[k] };
            }
        }

        Csr::from_host_data(t_size, &t_row_ptrs, &t_col_idxs, &t_values, self.device())
    }

    fn permute_rows(&self, indices: &[I]) -> Result<Self> {
        if indices.len() != self.size.rows {
            return Err(Error::OutOfBounds {
                index: indices.len(),
                size: self.size.rows,
            });
        }
        let row_ptrs = self.row_ptrs.to_vec();
        let col_idxs = self.col_idxs.to_vec();
        let values = self.values.to_vec();

        let mut out_row_ptrs = Vec::with_capacity(self.size.rows + 1);
        let mut out_col_idxs = Vec::with_capacity(values.len());
        let mut out_values = Vec::with_capacity(values.len());
        out_row_ptrs.push(I::ZERO);
        for &src in indices {
            let src = src.as_usize();
            let begin = row_ptrs[src].as_usize();
            let end = row_ptrs[src + 1].as_usize();
            out_col_idxs.extend_from_slice(&col_idxs[begin..end]);
            out_values.extend_from_slice(&values[begin..end]);
            out_row_ptrs.push(I::from_usize(out_col_idxs.len()));
        }
        Csr::from_host_data(self.size, &out_row_ptrs, &out_col_idxs, &out_values, self.device())
    }

    fn permute_cols(&self, gather: &[I]) -> Result<Self> {
        if gather.len() != self.size.cols {
            return Err(Error::OutOfBounds {
                index: gather.len(),
                size: self.size.cols,
            });
        }
        // gather convention: result(:, i) = A(:, gather[i]), so entry at
        // column j moves to column scatter[j] with scatter[gather[i]] = i
        let mut scatter = vec![I::ZERO; gather.len()];
        for (i, &g) in gather.iter().enumerate() {
            scatter[g.as_usize()] = I::from_usize(i);
        }
        let row_ptrs = self.row_ptrs.to_vec();
        let col_idxs: Vec<I> = self
            .col_idxs
            .to_vec()
            .into_iter()
            .map(|col| scatter[col.as_usize()])
            .collect();
        let values = self.values.to_vec();
        let mut out = Csr::from_host_data(self.size, &row_ptrs, &col_idxs, &values, self.device())?;
        out.sort_by_column_index()?;
        Ok(out)
    }
}

impl<E: Executor, V: Value, I: IndexType> Permutable<E, I> for Csr<E, V, I> {
    /// `result(i, :) = A(perm[i], :)`
    fn row_permute(&self, perm: &Permutation<E, I>) -> Result<Self> {
        self.permute_rows(&perm.to_host_indices())
    }

    /// `result(:, i) = A(:, perm[i])`
    fn column_permute(&self, perm: &Permutation<E, I>) -> Result<Self> {
        self.permute_cols(&perm.to_host_indices())
    }

    fn inverse_row_permute(&self, perm: &Permutation<E, I>) -> Result<Self> {
        self.permute_rows(&perm.inverse()?.to_host_indices())
    }

    fn inverse_column_permute(&self, perm: &Permutation<E, I>) -> Result<Self> {
        self.permute_cols(&perm.inverse()?.to_host_indices())
    }
}

impl<E: Executor, V: Value, I: IndexType> DiagonalExtractable<E, V> for Csr<E, V, I> {
    fn extract_diagonal(&self) -> Result<Dense<E, V>> {
        let n = self.size.rows.min(self.size.cols);
        let row_ptrs = self.row_ptrs.to_vec();
        let col_idxs = self.col_idxs.to_vec();
        let values = self.values.to_vec();
        let mut diag = vec![V::zero(); n];
        for (r, entry) in diag.iter_mut().enumerate() {
            for k in row_ptrs[r].as_usize()..row_ptrs[r + 1].as_usize() {
                if col_idxs[k].as_usize() == r {
                    *entry = values[k];
                    break;
                }
            }
        }
        Dense::from_slice(Dim2::new(n, 1), &diag, self.device())
    }
}

impl<E: Executor, V: Value, I: IndexType> Clone for Csr<E, V, I> {
    fn clone(&self) -> Self {
        self.clone_to::<E>(self.device()).expect("csr clone failed")
    }
}

impl<E: Executor, V: Value, I: IndexType> std::fmt::Debug for Csr<E, V, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Csr")
            .field("size", &self.size)
            .field("nnz", &self.nnz())
            .field("strategy", &self.strategy)
            .field("executor", &E::name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ReferenceExecutor;
    use crate::matrix::permutation::PermuteMask;

    type RefCsr = Csr<ReferenceExecutor, f64, i64>;

    fn device() -> <ReferenceExecutor as Executor>::Device {
        ReferenceExecutor::default_device()
    }

    // [[1, 0, 2], [0, 3, 0], [4, 5, 0]]
    fn sample() -> RefCsr {
        RefCsr::from_host_data(
            Dim2::new(3, 3),
            &[0, 2, 3, 5],
            &[0, 2, 1, 0, 1],
            &[1.0, 2.0, 3.0, 4.0, 5.0],
            &device(),
        )
        .unwrap()
    }

    #[test]
    fn test_creation_and_accessors() {
        let csr = sample();
        assert_eq!(csr.nnz(), 5);
        assert_eq!(csr.size(), Dim2::new(3, 3));
        assert!(csr.is_sorted_by_column_index());
    }

    #[test]
    fn test_rejects_nonmonotone_row_ptrs() {
        let result = RefCsr::from_host_data(
            Dim2::new(2, 2),
            &[0, 2, 1],
            &[0, 1],
            &[1.0, 2.0],
            &device(),
        );
        assert!(matches!(result, Err(Error::ValueMismatch(_))));
    }

    #[test]
    fn test_rejects_column_out_of_bounds() {
        let result =
            RefCsr::from_host_data(Dim2::new(1, 2), &[0, 1], &[5], &[1.0], &device());
        assert!(matches!(result, Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn test_spmv() {
        let csr = sample();
        let b = Dense::from_slice(Dim2::new(3, 1), &[1.0, 2.0, 3.0], &device()).unwrap();
        let mut x = Dense::new(Dim2::new(3, 1), &device()).unwrap();
        csr.apply(&b, &mut x).unwrap();
        assert_eq!(x.to_row_major_vec(), vec![7.0, 6.0, 14.0]);
    }

    #[test]
    fn test_spmv_scaled() {
        let csr = sample();
        let b = Dense::from_slice(Dim2::new(3, 1), &[1.0, 2.0, 3.0], &device()).unwrap();
        let mut x = Dense::from_slice(Dim2::new(3, 1), &[1.0, 1.0, 1.0], &device()).unwrap();
        csr.apply_scaled(2.0, &b, -1.0, &mut x).unwrap();
        assert_eq!(x.to_row_major_vec(), vec![13.0, 11.0, 27.0]);
    }

    #[test]
    fn test_transpose() {
        let t = sample().transpose().unwrap();
        let data = t.write();
        let expected = [(0, 0, 1.0), (0, 2, 4.0), (1, 1, 3.0), (1, 2, 5.0), (2, 0, 2.0)];
        assert_eq!(data.nnz(), expected.len());
        for (entry, &(r, c, v)) in data.nonzeros.iter().zip(&expected) {
            assert_eq!((entry.row, entry.col, entry.value), (r, c, v));
        }
    }

    #[test]
    fn test_read_write_roundtrip() {
        let csr = sample();
        let data = csr.write();
        let back = RefCsr::read(&data, &device()).unwrap();
        assert_eq!(back.write(), data);
    }

    #[test]
    fn test_row_permute_roundtrip() {
        let csr = sample();
        let p = Permutation::<ReferenceExecutor, i64>::from_indices(
            &[1, 2, 0],
            PermuteMask::Row,
            &device(),
        )
        .unwrap();
        let permuted = csr.row_permute(&p).unwrap();
        let back = permuted.inverse_row_permute(&p).unwrap();
        assert_eq!(back.write(), csr.write());
    }

    #[test]
    fn test_extract_diagonal() {
        let d = sample().extract_diagonal().unwrap();
        assert_eq!(d.to_row_major_vec(), vec![1.0, 3.0, 0.0]);
    }

    #[test]
    fn test_sort_by_column_index() {
        let mut csr = RefCsr::from_host_data(
            Dim2::new(1, 3),
            &[0, 3],
            &[2, 0, 1],
            &[3.0, 1.0, 2.0],
            &device(),
        )
        .unwrap();
        assert!(!csr.is_sorted_by_column_index());
        csr.sort_by_column_index().unwrap();
        assert!(csr.is_sorted_by_column_index());
        assert_eq!(csr.values.to_vec(), vec![1.0, 2.0, 3.0]);
    }
}
