//! Sparsity-pattern matrices
//!
//! A CSR structure without per-entry values: every stored position
//! carries the same uniform scalar (one by default). Used for pattern
//! analysis and as the structural seed of preconditioner generation.

use crate::array::Array;
use crate::dim::Dim2;
use crate::dtype::{IndexType, Value};
use crate::error::Result;
use crate::executor::Executor;
use crate::linop::{validate_apply_dims, LinOp, Transposable};
use crate::matrix::csr::Csr;
use crate::matrix::dense::Dense;
use crate::matrix_data::MatrixData;

/// Pattern-only CSR matrix with a uniform value
pub struct SparsityCsr<E: Executor, V: Value, I: IndexType = i64> {
    pub(crate) size: Dim2,
    pub(crate) row_ptrs: Array<E, I>,
    pub(crate) col_idxs: Array<E, I>,
    pub(crate) value: V,
}

impl<E: Executor, V: Value, I: IndexType> SparsityCsr<E, V, I> {
    /// Build from a host-side pattern with the uniform value one
    pub fn from_host_pattern(
        size: Dim2,
        row_ptrs: &[I],
        col_idxs: &[I],
        device: &E::Device,
    ) -> Result<Self> {
        Self::from_host_pattern_with_value(size, row_ptrs, col_idxs, V::one(), device)
    }

    /// Build from a host-side pattern with an explicit uniform value
    pub fn from_host_pattern_with_value(
        size: Dim2,
        row_ptrs: &[I],
        col_idxs: &[I],
        value: V,
        device: &E::Device,
    ) -> Result<Self> {
        // reuse the CSR invariant checks with dummy values
        let dummy = vec![V::one(); col_idxs.len()];
        crate::matrix::csr::validate_csr_parts::<V, I>(size, row_ptrs, col_idxs, &dummy)?;
        Ok(Self {
            size,
            row_ptrs: Array::from_slice(row_ptrs, device)?,
            col_idxs: Array::from_slice(col_idxs, device)?,
            value,
        })
    }

    /// Extract the pattern of a CSR matrix
    pub fn from_csr(csr: &Csr<E, V, I>) -> Result<Self> {
        Self::from_host_pattern(
            csr.size(),
            &csr.row_ptrs().to_vec(),
            &csr.col_idxs().to_vec(),
            csr.device(),
        )
    }

    /// Read assembly data, keeping positions and dropping values
    pub fn read(data: &MatrixData<V, I>, device: &E::Device) -> Result<Self> {
        let csr = Csr::<E, V, I>::read(data, device)?;
        Self::from_csr(&csr)
    }

    /// Write every stored position with the uniform value
    pub fn write(&self) -> MatrixData<V, I> {
        let row_ptrs = self.row_ptrs.to_vec();
        let col_idxs = self.col_idxs.to_vec();
        let mut data = MatrixData::new(self.size);
        for r in 0..self.size.rows {
            for k in row_ptrs[r].as_usize()..row_ptrs[r + 1].as_usize() {
                data.push(I::from_usize(r), col_idxs[k], self.value);
            }
        }
        data
    }

    /// Matrix dimension
    #[inline]
    pub fn size(&self) -> Dim2 {
        self.size
    }

    /// Number of stored positions
    #[inline]
    pub fn nnz(&self) -> usize {
        self.col_idxs.len()
    }

    /// The uniform value
    #[inline]
    pub fn value(&self) -> V {
        self.value
    }

    /// Row pointer array
    #[inline]
    pub fn row_ptrs(&self) -> &Array<E, I> {
        &self.row_ptrs
    }

    /// Column index array
    #[inline]
    pub fn col_idxs(&self) -> &Array<E, I> {
        &self.col_idxs
    }

    /// The device this matrix lives on
    #[inline]
    pub fn device(&self) -> &E::Device {
        self.col_idxs.device()
    }

    /// Materialize as a CSR matrix with the uniform value
    pub fn to_csr(&self) -> Result<Csr<E, V, I>> {
        let values = vec![self.value; self.nnz()];
        Csr::from_host_data(
            self.size,
            &self.row_ptrs.to_vec(),
            &self.col_idxs.to_vec(),
            &values,
            self.device(),
        )
    }

    /// Copy this matrix to another executor
    pub fn clone_to<E2: Executor>(&self, device: &E2::Device) -> Result<SparsityCsr<E2, V, I>> {
        SparsityCsr::from_host_pattern_with_value(
            self.size,
            &self.row_ptrs.to_vec(),
            &self.col_idxs.to_vec(),
            self.value,
            device,
        )
    }
}

impl<E: Executor, V: Value, I: IndexType> LinOp<E, V> for SparsityCsr<E, V, I> {
    fn size(&self) -> Dim2 {
        self.size
    }

    fn apply_scaled(&self, alpha: V, b: &Dense<E, V>, beta: V, x: &mut Dense<E, V>) -> Result<()> {
        validate_apply_dims("sparsity_csr::spmv", self.size, b, x)?;
        self.to_csr()?.apply_scaled(alpha, b, beta, x)
    }
}

impl<E: Executor, V: Value, I: IndexType> Transposable for SparsityCsr<E, V, I> {
    type Output = SparsityCsr<E, V, I>;

    fn transpose(&self) -> Result<Self> {
        let t = self.to_csr()?.transpose()?;
        Ok(SparsityCsr {
            size: t.size(),
            row_ptrs: t.row_ptrs().clone(),
            col_idxs: t.col_idxs().clone(),
            value: self.value,
        })
    }

    fn conj_transpose(&self) -> Result<Self> {
        let mut t = self.transpose()?;
        t.value = t.value.conj();
        Ok(t)
    }
}

impl<E: Executor, V: Value, I: IndexType> Clone for SparsityCsr<E, V, I> {
    fn clone(&self) -> Self {
        self.clone_to::<E>(self.device()).expect("sparsity clone failed")
    }
}

impl<E: Executor, V: Value, I: IndexType> std::fmt::Debug for SparsityCsr<E, V, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparsityCsr")
            .field("size", &self.size)
            .field("nnz", &self.nnz())
            .field("executor", &E::name())
            .finish()
    }
}
