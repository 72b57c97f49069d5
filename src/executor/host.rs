//! The thread-parallel host executor
//!
//! Runs kernels across the rayon thread pool. This is the default
//! executor for production host runs; the single-threaded
//! [`ReferenceExecutor`](super::reference::ReferenceExecutor) is the
//! oracle it is tested against.

use super::mem::HostMemSpace;
use super::{Device, ExecKind, Executor, ExecutorClient, HostAccessible, Parallelism};
use crate::dtype::{IndexType, Value};
use crate::error::Result;
use crate::kernels::host_impl;
use crate::kernels::{DenseKernels, SparseKernels, SpgemmKernels};
use crate::matrix::coo::Coo;
use crate::matrix::csr::Csr;
use crate::matrix::dense::Dense;
use crate::matrix::ell::Ell;
use crate::matrix::sellp::Sellp;
use crate::spgemm::spgemm_host;

/// Thread-parallel host executor
#[derive(Clone, Debug, Default)]
pub struct HostExecutor;

impl HostExecutor {
    /// Create the host executor
    pub fn create() -> Self {
        Self
    }
}

/// The host device (there is exactly one)
#[derive(Clone, Debug, Default)]
pub struct HostDevice;

impl Device for HostDevice {
    fn id(&self) -> usize {
        0
    }

    fn name(&self) -> String {
        "host".to_string()
    }
}

/// Host client dispatching rayon-parallel kernels
#[derive(Clone, Debug)]
pub struct HostClient {
    device: HostDevice,
    mem: HostMemSpace,
}

impl HostClient {
    fn new(device: HostDevice) -> Self {
        Self {
            device,
            mem: HostMemSpace::new(),
        }
    }
}

impl Executor for HostExecutor {
    type Device = HostDevice;
    type MemSpace = HostMemSpace;
    type Client = HostClient;

    fn kind() -> ExecKind {
        ExecKind::Host
    }

    fn name() -> &'static str {
        "host"
    }

    fn default_device() -> HostDevice {
        HostDevice
    }

    fn mem_space(_device: &HostDevice) -> HostMemSpace {
        HostMemSpace::new()
    }

    fn client(device: &HostDevice) -> HostClient {
        HostClient::new(device.clone())
    }

    fn synchronize(_device: &HostDevice) -> Result<()> {
        // host kernels are synchronous
        Ok(())
    }
}

impl HostAccessible for HostExecutor {
    const PARALLEL: bool = true;
}

impl ExecutorClient<HostExecutor> for HostClient {
    fn device(&self) -> &HostDevice {
        &self.device
    }

    fn mem_space(&self) -> &HostMemSpace {
        &self.mem
    }

    fn synchronize(&self) -> Result<()> {
        Ok(())
    }

    fn parallelism(&self) -> Parallelism {
        Parallelism {
            workers: rayon::current_num_threads(),
            warp_size: 1,
            multiprocessors: 1,
        }
    }
}

impl DenseKernels<HostExecutor> for HostClient {
    fn dense_apply<V: Value>(
        &self,
        alpha: V,
        a: &Dense<HostExecutor, V>,
        b: &Dense<HostExecutor, V>,
        beta: V,
        x: &mut Dense<HostExecutor, V>,
    ) -> Result<()> {
        host_impl::dense_apply_host(alpha, a, b, beta, x)
    }

    fn dense_scale<V: Value>(&self, alpha: V, x: &mut Dense<HostExecutor, V>) -> Result<()> {
        host_impl::dense_scale_host(alpha, x)
    }

    fn dense_add_scaled<V: Value>(
        &self,
        alpha: V,
        b: &Dense<HostExecutor, V>,
        x: &mut Dense<HostExecutor, V>,
    ) -> Result<()> {
        host_impl::dense_add_scaled_host(alpha, b, x)
    }

    fn dense_dot<V: Value>(
        &self,
        conjugate: bool,
        a: &Dense<HostExecutor, V>,
        b: &Dense<HostExecutor, V>,
        out: &mut Dense<HostExecutor, V>,
    ) -> Result<()> {
        host_impl::dense_dot_host(conjugate, a, b, out)
    }

    fn dense_norm2<V: Value>(
        &self,
        a: &Dense<HostExecutor, V>,
        out: &mut Dense<HostExecutor, V::Real>,
    ) -> Result<()> {
        host_impl::dense_norm2_host(a, out)
    }
}

impl SparseKernels<HostExecutor> for HostClient {
    fn csr_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Csr<HostExecutor, V, I>,
        b: &Dense<HostExecutor, V>,
        beta: V,
        x: &mut Dense<HostExecutor, V>,
    ) -> Result<()> {
        host_impl::csr_spmv_host(self.parallelism(), alpha, a, b, beta, x)
    }

    fn coo_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Coo<HostExecutor, V, I>,
        b: &Dense<HostExecutor, V>,
        beta: V,
        x: &mut Dense<HostExecutor, V>,
    ) -> Result<()> {
        host_impl::coo_spmv_host(self.parallelism(), alpha, a, b, beta, x)
    }

    fn ell_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Ell<HostExecutor, V, I>,
        b: &Dense<HostExecutor, V>,
        beta: V,
        x: &mut Dense<HostExecutor, V>,
    ) -> Result<()> {
        host_impl::ell_spmv_host(alpha, a, b, beta, x)
    }

    fn sellp_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Sellp<HostExecutor, V, I>,
        b: &Dense<HostExecutor, V>,
        beta: V,
        x: &mut Dense<HostExecutor, V>,
    ) -> Result<()> {
        host_impl::sellp_spmv_host(alpha, a, b, beta, x)
    }
}

impl SpgemmKernels<HostExecutor> for HostClient {
    fn spgemm<V: Value, I: IndexType>(
        &self,
        a: &Csr<HostExecutor, V, I>,
        b: &Csr<HostExecutor, V, I>,
    ) -> Result<Csr<HostExecutor, V, I>> {
        spgemm_host(V::one(), a, b, None)
    }

    fn spgemm_advanced<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Csr<HostExecutor, V, I>,
        b: &Csr<HostExecutor, V, I>,
        beta: V,
        c: &Csr<HostExecutor, V, I>,
    ) -> Result<Csr<HostExecutor, V, I>> {
        spgemm_host(alpha, a, b, Some((beta, c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dim::Dim2;
    use crate::linop::LinOp;

    #[test]
    fn test_host_spmv_matches_serial() {
        let device = HostExecutor::default_device();
        let csr = Csr::<HostExecutor, f64, i64>::from_host_data(
            Dim2::new(3, 3),
            &[0, 2, 3, 5],
            &[0, 2, 1, 0, 1],
            &[1.0, 2.0, 3.0, 4.0, 5.0],
            &device,
        )
        .unwrap();
        let b = Dense::from_slice(Dim2::new(3, 1), &[1.0, 2.0, 3.0], &device).unwrap();
        let mut x = Dense::new(Dim2::new(3, 1), &device).unwrap();
        csr.apply(&b, &mut x).unwrap();
        assert_eq!(x.to_row_major_vec(), vec![7.0, 6.0, 14.0]);
    }

    #[test]
    fn test_parallelism_reports_threads() {
        let client = HostExecutor::client(&HostExecutor::default_device());
        assert!(client.parallelism().workers >= 1);
        assert_eq!(client.parallelism().warp_size, 1);
    }
}
