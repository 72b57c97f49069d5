//! Sparse matrix-matrix multiplication entry points

use super::core::Csr;
use crate::dtype::{IndexType, Value};
use crate::error::{Error, Result};
use crate::executor::{Executor, Operation};
use crate::kernels::SpgemmKernels;

impl<E: Executor, V: Value, I: IndexType> Csr<E, V, I> {
    /// `C = self * b` in CSR form
    pub fn spgemm(&self, b: &Csr<E, V, I>) -> Result<Csr<E, V, I>> {
        if !self.size().conforms(&b.size()) {
            return Err(Error::dim_mismatch("csr::spgemm", self.size(), b.size()));
        }
        let client = E::client(self.device());
        E::run(Operation::new("csr::spgemm").on_all(|| client.spgemm(self, b)))
    }

    /// `C = alpha * self * b + beta * c`
    pub fn spgemm_advanced(
        &self,
        alpha: V,
        b: &Csr<E, V, I>,
        beta: V,
        c: &Csr<E, V, I>,
    ) -> Result<Csr<E, V, I>> {
        if !self.size().conforms(&b.size()) {
            return Err(Error::dim_mismatch("csr::spgemm", self.size(), b.size()));
        }
        let expected = crate::dim::Dim2::new(self.size().rows, b.size().cols);
        if c.size() != expected {
            return Err(Error::dim_mismatch("csr::spgemm", expected, c.size()));
        }
        let client = E::client(self.device());
        E::run(
            Operation::new("csr::spgemm_advanced")
                .on_all(|| client.spgemm_advanced(alpha, self, b, beta, c)),
        )
    }

    /// Upper bound on the merge work of `self * b`
    ///
    /// `sum_i sum_{k in row i} |B_row(col(k))|`. Bounds the temporary
    /// heap storage of the long-row merge tier and sizes its scratch.
    pub fn spgemm_work_estimate(&self, b: &Csr<E, V, I>) -> usize {
        let a_cols = self.col_idxs().to_vec();
        let b_row_ptrs = b.row_ptrs().to_vec();
        a_cols
            .iter()
            .map(|col| {
                let r = col.as_usize();
                b_row_ptrs[r + 1].as_usize() - b_row_ptrs[r].as_usize()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dim::Dim2;
    use crate::executor::ReferenceExecutor;

    type RefCsr = Csr<ReferenceExecutor, f64, i64>;

    fn device() -> <ReferenceExecutor as Executor>::Device {
        ReferenceExecutor::default_device()
    }

    #[test]
    fn test_spgemm_identity() {
        let a = RefCsr::from_host_data(
            Dim2::new(2, 2),
            &[0, 2, 3],
            &[0, 1, 1],
            &[1.0, 2.0, 3.0],
            &device(),
        )
        .unwrap();
        let eye = RefCsr::from_host_data(
            Dim2::new(2, 2),
            &[0, 1, 2],
            &[0, 1],
            &[1.0, 1.0],
            &device(),
        )
        .unwrap();
        let c = a.spgemm(&eye).unwrap();
        assert_eq!(c.write(), a.write());
    }

    #[test]
    fn test_spgemm_dim_mismatch() {
        let a = RefCsr::empty(Dim2::new(2, 3), &device()).unwrap();
        let b = RefCsr::empty(Dim2::new(2, 2), &device()).unwrap();
        assert!(matches!(
            a.spgemm(&b),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_work_estimate() {
        // A row 0 references B rows 0 and 1 (lengths 1 and 2)
        let a = RefCsr::from_host_data(
            Dim2::new(1, 2),
            &[0, 2],
            &[0, 1],
            &[1.0, 1.0],
            &device(),
        )
        .unwrap();
        let b = RefCsr::from_host_data(
            Dim2::new(2, 2),
            &[0, 1, 3],
            &[0, 0, 1],
            &[1.0, 1.0, 1.0],
            &device(),
        )
        .unwrap();
        assert_eq!(a.spgemm_work_estimate(&b), 3);
    }
}
