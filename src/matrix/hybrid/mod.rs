//! HYBRID (ELL + COO) matrices
//!
//! The bulk of each row lives in a uniform-width ELL tile; long-tail
//! rows spill their remaining non-zeros into a COO part. The partition
//! strategy picks the split from the row-length histogram.

mod strategy;

pub use strategy::{HybridLimits, HybridStrategy};

use crate::dim::Dim2;
use crate::dtype::{IndexType, Value};
use crate::error::Result;
use crate::executor::Executor;
use crate::linop::{validate_apply_dims, LinOp};
use crate::matrix::coo::Coo;
use crate::matrix::csr::Csr;
use crate::matrix::dense::Dense;
use crate::matrix::ell::Ell;
use crate::matrix_data::MatrixData;

/// HYBRID sparse matrix: an ELL part plus a COO spill part
pub struct Hybrid<E: Executor, V: Value, I: IndexType = i64> {
    pub(crate) ell: Ell<E, V, I>,
    pub(crate) coo: Coo<E, V, I>,
    pub(crate) strategy: HybridStrategy,
}

impl<E: Executor, V: Value, I: IndexType> Hybrid<E, V, I> {
    /// Read assembly data with the automatic partition strategy
    pub fn read(data: &MatrixData<V, I>, device: &E::Device) -> Result<Self> {
        Self::read_with_strategy(data, HybridStrategy::Automatic, device)
    }

    /// Read assembly data, splitting rows by the given strategy
    pub fn read_with_strategy(
        data: &MatrixData<V, I>,
        strategy: HybridStrategy,
        device: &E::Device,
    ) -> Result<Self> {
        data.validate()?;
        let mut data = data.clone();
        data.sum_duplicates();
        data.remove_zeros();

        let limits = strategy.compute_limits(
            &data.row_counts(),
            std::mem::size_of::<V>(),
            std::mem::size_of::<I>(),
        );

        // split: the first ell_lim entries of each row stay in the ELL
        // tile, the rest spill to COO (entries are sorted row-major, so
        // the spill is row-sorted as the COO invariant requires)
        let mut ell_data = MatrixData::new(data.size);
        let mut coo_data = MatrixData::new(data.size);
        let mut current_row = None;
        let mut in_row = 0usize;
        for entry in &data.nonzeros {
            if current_row != Some(entry.row) {
                current_row = Some(entry.row);
                in_row = 0;
            }
            if in_row < limits.ell_lim {
                ell_data.push(entry.row, entry.col, entry.value);
            } else {
                coo_data.push(entry.row, entry.col, entry.value);
            }
            in_row += 1;
        }

        Ok(Self {
            ell: Ell::read_with_width(&ell_data, limits.ell_lim, device)?,
            coo: Coo::read(&coo_data, device)?,
            strategy,
        })
    }

    /// Write the combined entries as assembly data
    pub fn write(&self) -> MatrixData<V, I> {
        let mut data = self.ell.write();
        let spill = self.coo.write();
        data.nonzeros.extend(spill.nonzeros);
        data.sort_row_major();
        data
    }

    /// Matrix dimension
    #[inline]
    pub fn size(&self) -> Dim2 {
        self.ell.size()
    }

    /// The ELL part
    #[inline]
    pub fn ell(&self) -> &Ell<E, V, I> {
        &self.ell
    }

    /// The COO spill part
    #[inline]
    pub fn coo(&self) -> &Coo<E, V, I> {
        &self.coo
    }

    /// The partition strategy
    #[inline]
    pub fn strategy(&self) -> HybridStrategy {
        self.strategy
    }

    /// Number of stored entries across both parts
    pub fn nnz(&self) -> usize {
        self.ell.nnz() + self.coo.nnz()
    }

    /// The device this matrix lives on
    #[inline]
    pub fn device(&self) -> &E::Device {
        self.ell.device()
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
    pub fn clone_to<E2: Executor>(&self, device: &E2::Device) -> Result<Hybrid<E2, V, I>> {
        Ok(Hybrid {
            ell: self.ell.clone_to::<E2>(device)?,
            coo: self.coo.clone_to::<E2>(device)?,
            strategy: self.strategy,
        })
    }
}

impl<E: Executor, V: Value, I: IndexType> LinOp<E, V> for Hybrid<E, V, I> {
    fn size(&self) -> Dim2 {
        self.ell.size()
    }

    /// The product is the sum of the parts: the ELL product takes the
    /// `beta` term, then the COO spill accumulates on top
    fn apply_scaled(&self, alpha: V, b: &Dense<E, V>, beta: V, x: &mut Dense<E, V>) -> Result<()> {
        validate_apply_dims("hybrid::spmv", self.size(), b, x)?;
        self.ell.apply_scaled(alpha, b, beta, x)?;
        self.coo.apply_scaled(alpha, b, V::one(), x)
    }
}

impl<E: Executor, V: Value, I: IndexType> Clone for Hybrid<E, V, I> {
    fn clone(&self) -> Self {
        self.clone_to::<E>(self.device()).expect("hybrid clone failed")
    }
}

impl<E: Executor, V: Value, I: IndexType> std::fmt::Debug for Hybrid<E, V, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hybrid")
            .field("size", &self.size())
            .field("ell_width", &self.ell.max_nnz_per_row())
            .field("coo_nnz", &self.coo.nnz())
            .field("executor", &E::name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ReferenceExecutor;

    type RefHybrid = Hybrid<ReferenceExecutor, f64, i64>;

    fn device() -> <ReferenceExecutor as Executor>::Device {
        ReferenceExecutor::default_device()
    }

    // row 0 is the long tail
    fn skewed_data() -> MatrixData<f64, i64> {
        MatrixData::from_entries(
            Dim2::new(3, 4),
            [
                (0i64, 0i64, 1.0),
                (0, 1, 2.0),
                (0, 2, 3.0),
                (0, 3, 4.0),
                (1, 1, 5.0),
                (2, 2, 6.0),
            ],
        )
    }

    #[test]
    fn test_long_tail_spills_to_coo() {
        let hybrid = RefHybrid::read_with_strategy(
            &skewed_data(),
            HybridStrategy::ColumnLimit { columns: 1 },
            &device(),
        )
        .unwrap();
        assert_eq!(hybrid.ell().max_nnz_per_row(), 1);
        assert_eq!(hybrid.coo().nnz(), 3);
        assert_eq!(hybrid.nnz(), 6);
    }

    #[test]
    fn test_spmv_sums_both_parts() {
        for strategy in [
            HybridStrategy::Automatic,
            HybridStrategy::ColumnLimit { columns: 1 },
            HybridStrategy::ImbalanceLimit { percent: 0.5 },
        ] {
            let hybrid =
                RefHybrid::read_with_strategy(&skewed_data(), strategy, &device()).unwrap();
            let b = Dense::from_slice(Dim2::new(4, 1), &[1.0, 1.0, 1.0, 1.0], &device()).unwrap();
            let mut x = Dense::new(Dim2::new(3, 1), &device()).unwrap();
            hybrid.apply(&b, &mut x).unwrap();
            assert_eq!(x.to_row_major_vec(), vec![10.0, 5.0, 6.0]);
        }
    }

    #[test]
    fn test_write_roundtrip() {
        let hybrid = RefHybrid::read(&skewed_data(), &device()).unwrap();
        let mut expected = skewed_data();
        expected.sort_row_major();
        assert_eq!(hybrid.write(), expected);
    }

    #[test]
    fn test_to_csr() {
        let hybrid = RefHybrid::read(&skewed_data(), &device()).unwrap();
        let csr = hybrid.to_csr().unwrap();
        let mut expected = skewed_data();
        expected.sort_row_major();
        assert_eq!(csr.write(), expected);
    }
}
