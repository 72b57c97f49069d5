//! The single-threaded reference executor
//!
//! An unoptimized host executor used as the oracle in tests: every
//! kernel is the serial core with no thread parallelism, so results are
//! deterministic and easy to reason about.

use super::host::HostDevice;
use super::mem::HostMemSpace;
use super::{ExecKind, Executor, ExecutorClient, HostAccessible, Parallelism};
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

/// Single-threaded host oracle executor
#[derive(Clone, Debug, Default)]
pub struct ReferenceExecutor;

impl ReferenceExecutor {
    /// Create the reference executor
    pub fn create() -> Self {
        Self
    }
}

/// Reference client running serial kernels
#[derive(Clone, Debug)]
pub struct ReferenceClient {
    device: HostDevice,
    mem: HostMemSpace,
}

impl Executor for ReferenceExecutor {
    type Device = HostDevice;
    type MemSpace = HostMemSpace;
    type Client = ReferenceClient;

    fn kind() -> ExecKind {
        ExecKind::Reference
    }

    fn name() -> &'static str {
        "reference"
    }

    fn default_device() -> HostDevice {
        HostDevice
    }

    fn mem_space(_device: &HostDevice) -> HostMemSpace {
        HostMemSpace::new()
    }

    fn client(device: &HostDevice) -> ReferenceClient {
        ReferenceClient {
            device: device.clone(),
            mem: HostMemSpace::new(),
        }
    }

    fn synchronize(_device: &HostDevice) -> Result<()> {
        Ok(())
    }
}

impl HostAccessible for ReferenceExecutor {
    const PARALLEL: bool = false;
}

impl ExecutorClient<ReferenceExecutor> for ReferenceClient {
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
            workers: 1,
            warp_size: 1,
            multiprocessors: 1,
        }
    }
}

impl DenseKernels<ReferenceExecutor> for ReferenceClient {
    fn dense_apply<V: Value>(
        &self,
        alpha: V,
        a: &Dense<ReferenceExecutor, V>,
        b: &Dense<ReferenceExecutor, V>,
        beta: V,
        x: &mut Dense<ReferenceExecutor, V>,
    ) -> Result<()> {
        host_impl::dense_apply_host(alpha, a, b, beta, x)
    }

    fn dense_scale<V: Value>(&self, alpha: V, x: &mut Dense<ReferenceExecutor, V>) -> Result<()> {
        host_impl::dense_scale_host(alpha, x)
    }

    fn dense_add_scaled<V: Value>(
        &self,
        alpha: V,
        b: &Dense<ReferenceExecutor, V>,
        x: &mut Dense<ReferenceExecutor, V>,
    ) -> Result<()> {
        host_impl::dense_add_scaled_host(alpha, b, x)
    }

    fn dense_dot<V: Value>(
        &self,
        conjugate: bool,
        a: &Dense<ReferenceExecutor, V>,
        b: &Dense<ReferenceExecutor, V>,
        out: &mut Dense<ReferenceExecutor, V>,
    ) -> Result<()> {
        host_impl::dense_dot_host(conjugate, a, b, out)
    }

    fn dense_norm2<V: Value>(
        &self,
        a: &Dense<ReferenceExecutor, V>,
        out: &mut Dense<ReferenceExecutor, V::Real>,
    ) -> Result<()> {
        host_impl::dense_norm2_host(a, out)
    }
}

impl SparseKernels<ReferenceExecutor> for ReferenceClient {
    fn csr_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Csr<ReferenceExecutor, V, I>,
        b: &Dense<ReferenceExecutor, V>,
        beta: V,
        x: &mut Dense<ReferenceExecutor, V>,
    ) -> Result<()> {
        host_impl::csr_spmv_host(self.parallelism(), alpha, a, b, beta, x)
    }

    fn coo_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Coo<ReferenceExecutor, V, I>,
        b: &Dense<ReferenceExecutor, V>,
        beta: V,
        x: &mut Dense<ReferenceExecutor, V>,
    ) -> Result<()> {
        host_impl::coo_spmv_host(self.parallelism(), alpha, a, b, beta, x)
    }

    fn ell_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Ell<ReferenceExecutor, V, I>,
        b: &Dense<ReferenceExecutor, V>,
        beta: V,
        x: &mut Dense<ReferenceExecutor, V>,
    ) -> Result<()> {
        host_impl::ell_spmv_host(alpha, a, b, beta, x)
    }

    fn sellp_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Sellp<ReferenceExecutor, V, I>,
        b: &Dense<ReferenceExecutor, V>,
        beta: V,
        x: &mut Dense<ReferenceExecutor, V>,
    ) -> Result<()> {
        host_impl::sellp_spmv_host(alpha, a, b, beta, x)
    }
}

impl SpgemmKernels<ReferenceExecutor> for ReferenceClient {
    fn spgemm<V: Value, I: IndexType>(
        &self,
        a: &Csr<ReferenceExecutor, V, I>,
        b: &Csr<ReferenceExecutor, V, I>,
    ) -> Result<Csr<ReferenceExecutor, V, I>> {
        spgemm_host(V::one(), a, b, None)
    }

    fn spgemm_advanced<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Csr<ReferenceExecutor, V, I>,
        b: &Csr<ReferenceExecutor, V, I>,
        beta: V,
        c: &Csr<ReferenceExecutor, V, I>,
    ) -> Result<Csr<ReferenceExecutor, V, I>> {
        spgemm_host(alpha, a, b, Some((beta, c)))
    }
}
