//! CUDA executor
//!
//! Device memory is stream-ordered; kernels are the native PTX
//! instantiations for `f32`/`f64` with 64-bit indices, launched through
//! the cached per-device client. Value/index combinations without a
//! native kernel stage through the reference executor, and the
//! `Sparselib` strategy routes through the cuSPARSE handle.

mod client;
mod cusparse;
mod device;
mod fallback;
mod kernels;

pub use client::{get_or_create_client, reset_device, CudaClient, CudaMemSpace};
pub use cusparse::CudaSparse;
pub use device::{CudaDevice, CudaError};

use crate::dtype::{IndexType, Value};
use crate::error::{Error, Result};
use crate::executor::{ExecKind, Executor, ExecutorClient, HostExecutor, Parallelism};
use crate::kernels::{DenseKernels, SparseKernels, SpgemmKernels};
use cudarc::driver::PushKernelArg;
use crate::matrix::coo::Coo;
use crate::matrix::csr::{Csr, CsrStrategy};
use crate::matrix::dense::Dense;
use crate::matrix::ell::Ell;
use crate::matrix::sellp::Sellp;
use kernels::{grid_1d, launch};
use std::any::TypeId;

/// NVIDIA GPU executor
#[derive(Clone, Debug, Default)]
pub struct CudaExecutor;

impl CudaExecutor {
    /// Create an executor bound to `device_id`, backed by `master`
    ///
    /// Fails when the device cannot be initialized.
    pub fn create(device_id: usize, _master: HostExecutor) -> Result<CudaDevice> {
        let device = CudaDevice::new(device_id);
        get_or_create_client(&device)?;
        Ok(device)
    }
}

impl Executor for CudaExecutor {
    type Device = CudaDevice;
    type MemSpace = CudaMemSpace;
    type Client = CudaClient;

    fn kind() -> ExecKind {
        ExecKind::Cuda
    }

    fn name() -> &'static str {
        "cuda"
    }

    fn default_device() -> CudaDevice {
        CudaDevice::new(0)
    }

    fn mem_space(device: &CudaDevice) -> CudaMemSpace {
        get_or_create_client(device)
            .expect("CUDA device initialization failed")
            .mem
    }

    fn client(device: &CudaDevice) -> CudaClient {
        get_or_create_client(device).expect("CUDA device initialization failed")
    }

    fn synchronize(device: &CudaDevice) -> Result<()> {
        let client = get_or_create_client(device)?;
        client.stream.synchronize().map_err(Error::from)
    }
}

impl ExecutorClient<CudaExecutor> for CudaClient {
    fn device(&self) -> &CudaDevice {
        &self.device
    }

    fn mem_space(&self) -> &CudaMemSpace {
        &self.mem
    }

    fn synchronize(&self) -> Result<()> {
        self.stream.synchronize().map_err(Error::from)
    }

    fn parallelism(&self) -> Parallelism {
        Parallelism {
            workers: self.device.multiprocessors * self.device.warp_size,
            warp_size: self.device.warp_size,
            multiprocessors: self.device.multiprocessors,
        }
    }
}

/// Native kernel availability for a value type
fn native_suffix<V: Value>() -> Option<&'static str> {
    let t = TypeId::of::<V>();
    if t == TypeId::of::<f32>() {
        Some("f32")
    } else if t == TypeId::of::<f64>() {
        Some("f64")
    } else {
        None
    }
}

fn is_i64<I: IndexType>() -> bool {
    TypeId::of::<I>() == TypeId::of::<i64>()
}

/// Static name of a suffixed kernel
fn kernel_name(base: &'static str, suffix: &'static str) -> &'static str {
    match (base, suffix) {
        ("csr_spmv", "f32") => "csr_spmv_f32",
        ("csr_spmv", "f64") => "csr_spmv_f64",
        ("csr_spmv_load_balance", "f32") => "csr_spmv_load_balance_f32",
        ("csr_spmv_load_balance", "f64") => "csr_spmv_load_balance_f64",
        ("coo_spmv", "f32") => "coo_spmv_f32",
        ("coo_spmv", "f64") => "coo_spmv_f64",
        ("ell_spmv", "f32") => "ell_spmv_f32",
        ("ell_spmv", "f64") => "ell_spmv_f64",
        ("sellp_spmv", "f32") => "sellp_spmv_f32",
        ("sellp_spmv", "f64") => "sellp_spmv_f64",
        ("dense_scale", "f32") => "dense_scale_f32",
        ("dense_scale", "f64") => "dense_scale_f64",
        _ => unreachable!("unknown kernel instantiation"),
    }
}

impl CudaClient {
    /// `x = beta * x` on device, preparing the atomic SpMV families
    fn prescale_native<V: Value>(
        &self,
        suffix: &'static str,
        beta: V,
        x: &mut Dense<CudaExecutor, V>,
    ) -> Result<()> {
        let rows = x.size().rows as i64;
        let cols = x.size().cols as i64;
        let stride = x.stride() as i64;
        let x_ptr = x.values().ptr();
        let cfg = grid_1d((rows * cols).max(1) as usize);
        match suffix {
            "f64" => {
                let beta: f64 = bytemuck::cast(beta);
                launch!(self, kernel_name("dense_scale", "f64"), cfg, [x_ptr, rows, cols, stride, beta])
            }
            _ => {
                let beta: f32 = bytemuck::cast(beta);
                launch!(self, kernel_name("dense_scale", "f32"), cfg, [x_ptr, rows, cols, stride, beta])
            }
        }
    }
}

impl DenseKernels<CudaExecutor> for CudaClient {
    fn dense_apply<V: Value>(
        &self,
        alpha: V,
        a: &Dense<CudaExecutor, V>,
        b: &Dense<CudaExecutor, V>,
        beta: V,
        x: &mut Dense<CudaExecutor, V>,
    ) -> Result<()> {
        // vendor BLAS: row-major C = A B computed as the column-major
        // transposed product
        unsafe {
            use cudarc::cublas::sys::{self, cublasOperation_t::CUBLAS_OP_N};
            let m = a.size().rows as i32;
            let k = a.size().cols as i32;
            let n = b.size().cols as i32;
            match native_suffix::<V>() {
                Some("f64") => {
                    let alpha: f64 = bytemuck::cast(alpha);
                    let beta: f64 = bytemuck::cast(beta);
                    let status = sys::cublasDgemm_v2(
                        *self.cublas.handle(),
                        CUBLAS_OP_N,
                        CUBLAS_OP_N,
                        n,
                        m,
                        k,
                        &alpha,
                        b.values().ptr() as *const f64,
                        b.stride() as i32,
                        a.values().ptr() as *const f64,
                        a.stride() as i32,
                        &beta,
                        x.values().ptr() as *mut f64,
                        x.stride() as i32,
                    );
                    check_cublas(status, self.device.ordinal)
                }
                Some(_) => {
                    let alpha: f32 = bytemuck::cast(alpha);
                    let beta: f32 = bytemuck::cast(beta);
                    let status = sys::cublasSgemm_v2(
                        *self.cublas.handle(),
                        CUBLAS_OP_N,
                        CUBLAS_OP_N,
                        n,
                        m,
                        k,
                        &alpha,
                        b.values().ptr() as *const f32,
                        b.stride() as i32,
                        a.values().ptr() as *const f32,
                        a.stride() as i32,
                        &beta,
                        x.values().ptr() as *mut f32,
                        x.stride() as i32,
                    );
                    check_cublas(status, self.device.ordinal)
                }
                None => fallback::dense_apply(alpha, a, b, beta, x),
            }
        }
    }

    fn dense_scale<V: Value>(&self, alpha: V, x: &mut Dense<CudaExecutor, V>) -> Result<()> {
        match native_suffix::<V>() {
            Some(suffix) => self.prescale_native(suffix, alpha, x),
            None => fallback::dense_scale(alpha, x),
        }
    }

    fn dense_add_scaled<V: Value>(
        &self,
        alpha: V,
        b: &Dense<CudaExecutor, V>,
        x: &mut Dense<CudaExecutor, V>,
    ) -> Result<()> {
        fallback::dense_add_scaled(alpha, b, x)
    }

    fn dense_dot<V: Value>(
        &self,
        conjugate: bool,
        a: &Dense<CudaExecutor, V>,
        b: &Dense<CudaExecutor, V>,
        out: &mut Dense<CudaExecutor, V>,
    ) -> Result<()> {
        fallback::dense_dot(conjugate, a, b, out)
    }

    fn dense_norm2<V: Value>(
        &self,
        a: &Dense<CudaExecutor, V>,
        out: &mut Dense<CudaExecutor, V::Real>,
    ) -> Result<()> {
        fallback::dense_norm2(a, out)
    }
}

impl SparseKernels<CudaExecutor> for CudaClient {
    fn csr_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Csr<CudaExecutor, V, I>,
        b: &Dense<CudaExecutor, V>,
        beta: V,
        x: &mut Dense<CudaExecutor, V>,
    ) -> Result<()> {
        let (Some(suffix), true) = (native_suffix::<V>(), is_i64::<I>()) else {
            return fallback::csr_spmv(alpha, a, b, beta, x);
        };

        let rows = a.size().rows;
        let sparselib_ok = suffix == "f64" && b.size().cols == 1 && b.stride() == 1;
        let resolved = a
            .strategy()
            .resolve(&a.row_ptrs().to_vec(), self.parallelism(), sparselib_ok);

        match resolved {
            CsrStrategy::Sparselib if sparselib_ok => unsafe {
                let alpha: f64 = bytemuck::cast(alpha);
                let beta: f64 = bytemuck::cast(beta);
                self.cusparse
                    .spmv_csr_f64(
                        rows,
                        a.size().cols,
                        a.nnz(),
                        a.row_ptrs().ptr(),
                        a.col_idxs().ptr(),
                        a.values().ptr(),
                        b.values().ptr(),
                        x.values().ptr(),
                        alpha,
                        beta,
                    )
                    .map_err(Error::from)
            },
            CsrStrategy::LoadBalance if !a.srow().is_empty() => {
                self.prescale_native(suffix, beta, x)?;
                let chunks = (a.srow().len() - 1) as i64;
                let cfg = grid_1d(chunks.max(1) as usize);
                let args = (
                    a.row_ptrs().ptr(),
                    a.col_idxs().ptr(),
                    a.values().ptr(),
                    a.srow().ptr(),
                    b.values().ptr(),
                    x.values().ptr(),
                    rows as i64,
                    a.nnz() as i64,
                    chunks,
                    b.size().cols as i64,
                    b.stride() as i64,
                    x.stride() as i64,
                );
                if suffix == "f64" {
                    let alpha: f64 = bytemuck::cast(alpha);
                    launch!(self, kernel_name("csr_spmv_load_balance", "f64"), cfg, [
                        args.0, args.1, args.2, args.3, args.4, args.5, args.6, args.7,
                        args.8, args.9, args.10, args.11, alpha
                    ])
                } else {
                    let alpha: f32 = bytemuck::cast(alpha);
                    launch!(self, kernel_name("csr_spmv_load_balance", "f32"), cfg, [
                        args.0, args.1, args.2, args.3, args.4, args.5, args.6, args.7,
                        args.8, args.9, args.10, args.11, alpha
                    ])
                }
            }
            // classical covers the remaining families; merge-path has
            // no native kernel yet and the classical loop is the
            // correct substitute
            _ => {
                let cfg = grid_1d(rows.max(1));
                let args = (
                    a.row_ptrs().ptr(),
                    a.col_idxs().ptr(),
                    a.values().ptr(),
                    b.values().ptr(),
                    x.values().ptr(),
                    rows as i64,
                    b.size().cols as i64,
                    b.stride() as i64,
                    x.stride() as i64,
                );
                if suffix == "f64" {
                    let alpha: f64 = bytemuck::cast(alpha);
                    let beta: f64 = bytemuck::cast(beta);
                    launch!(self, kernel_name("csr_spmv", "f64"), cfg, [
                        args.0, args.1, args.2, args.3, args.4, args.5, args.6, args.7,
                        args.8, alpha, beta
                    ])
                } else {
                    let alpha: f32 = bytemuck::cast(alpha);
                    let beta: f32 = bytemuck::cast(beta);
                    launch!(self, kernel_name("csr_spmv", "f32"), cfg, [
                        args.0, args.1, args.2, args.3, args.4, args.5, args.6, args.7,
                        args.8, alpha, beta
                    ])
                }
            }
        }
    }

    fn coo_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Coo<CudaExecutor, V, I>,
        b: &Dense<CudaExecutor, V>,
        beta: V,
        x: &mut Dense<CudaExecutor, V>,
    ) -> Result<()> {
        let (Some(suffix), true) = (native_suffix::<V>(), is_i64::<I>()) else {
            return fallback::coo_spmv(alpha, a, b, beta, x);
        };
        self.prescale_native(suffix, beta, x)?;
        if a.nnz() == 0 {
            return Ok(());
        }
        let cfg = grid_1d(a.nnz());
        let args = (
            a.row_idxs().ptr(),
            a.col_idxs().ptr(),
            a.values().ptr(),
            b.values().ptr(),
            x.values().ptr(),
            a.nnz() as i64,
            b.size().cols as i64,
            b.stride() as i64,
            x.stride() as i64,
        );
        if suffix == "f64" {
            let alpha: f64 = bytemuck::cast(alpha);
            launch!(self, kernel_name("coo_spmv", "f64"), cfg, [
                args.0, args.1, args.2, args.3, args.4, args.5, args.6, args.7, args.8, alpha
            ])
        } else {
            let alpha: f32 = bytemuck::cast(alpha);
            launch!(self, kernel_name("coo_spmv", "f32"), cfg, [
                args.0, args.1, args.2, args.3, args.4, args.5, args.6, args.7, args.8, alpha
            ])
        }
    }

    fn ell_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Ell<CudaExecutor, V, I>,
        b: &Dense<CudaExecutor, V>,
        beta: V,
        x: &mut Dense<CudaExecutor, V>,
    ) -> Result<()> {
        let (Some(suffix), true) = (native_suffix::<V>(), is_i64::<I>()) else {
            return fallback::ell_spmv(alpha, a, b, beta, x);
        };
        let workers = ell_workers_per_row(a.max_nnz_per_row(), self.device.warp_size);
        let cfg = grid_1d(a.size().rows * workers);
        let args = (
            a.col_idxs().ptr(),
            a.values().ptr(),
            b.values().ptr(),
            x.values().ptr(),
            a.size().rows as i64,
            a.stride() as i64,
            a.max_nnz_per_row() as i64,
            workers as i64,
            b.size().cols as i64,
            b.stride() as i64,
            x.stride() as i64,
        );
        if suffix == "f64" {
            let alpha: f64 = bytemuck::cast(alpha);
            let beta: f64 = bytemuck::cast(beta);
            launch!(self, kernel_name("ell_spmv", "f64"), cfg, [
                args.0, args.1, args.2, args.3, args.4, args.5, args.6, args.7, args.8,
                args.9, args.10, alpha, beta
            ])
        } else {
            let alpha: f32 = bytemuck::cast(alpha);
            let beta: f32 = bytemuck::cast(beta);
            launch!(self, kernel_name("ell_spmv", "f32"), cfg, [
                args.0, args.1, args.2, args.3, args.4, args.5, args.6, args.7, args.8,
                args.9, args.10, alpha, beta
            ])
        }
    }

    fn sellp_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Sellp<CudaExecutor, V, I>,
        b: &Dense<CudaExecutor, V>,
        beta: V,
        x: &mut Dense<CudaExecutor, V>,
    ) -> Result<()> {
        let (Some(suffix), true) = (native_suffix::<V>(), is_i64::<I>()) else {
            return fallback::sellp_spmv(alpha, a, b, beta, x);
        };
        // 2-D grid: (slice, block of rows within the slice)
        let row_blocks = a.slice_size().div_ceil(kernels::BLOCK_SIZE as usize).max(1) as u32;
        let cfg = cudarc::driver::safe::LaunchConfig {
            grid_dim: (a.num_slices().max(1) as u32, row_blocks, 1),
            block_dim: (kernels::BLOCK_SIZE, 1, 1),
            shared_mem_bytes: 0,
        };
        let args = (
            a.slice_sets().ptr(),
            a.col_idxs().ptr(),
            a.values().ptr(),
            b.values().ptr(),
            x.values().ptr(),
            a.size().rows as i64,
            a.slice_size() as i64,
            b.size().cols as i64,
            b.stride() as i64,
            x.stride() as i64,
        );
        if suffix == "f64" {
            let alpha: f64 = bytemuck::cast(alpha);
            let beta: f64 = bytemuck::cast(beta);
            launch!(self, kernel_name("sellp_spmv", "f64"), cfg, [
                args.0, args.1, args.2, args.3, args.4, args.5, args.6, args.7, args.8,
                args.9, alpha, beta
            ])
        } else {
            let alpha: f32 = bytemuck::cast(alpha);
            let beta: f32 = bytemuck::cast(beta);
            launch!(self, kernel_name("sellp_spmv", "f32"), cfg, [
                args.0, args.1, args.2, args.3, args.4, args.5, args.6, args.7, args.8,
                args.9, alpha, beta
            ])
        }
    }
}

impl SpgemmKernels<CudaExecutor> for CudaClient {
    fn spgemm<V: Value, I: IndexType>(
        &self,
        a: &Csr<CudaExecutor, V, I>,
        b: &Csr<CudaExecutor, V, I>,
    ) -> Result<Csr<CudaExecutor, V, I>> {
        fallback::spgemm(V::one(), a, b, None)
    }

    fn spgemm_advanced<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Csr<CudaExecutor, V, I>,
        b: &Csr<CudaExecutor, V, I>,
        beta: V,
        c: &Csr<CudaExecutor, V, I>,
    ) -> Result<Csr<CudaExecutor, V, I>> {
        fallback::spgemm(alpha, a, b, Some((beta, c)))
    }
}

/// Workers cooperating on one ELL row: the next power of two covering
/// about a quarter of the tile width, capped at the warp size
fn ell_workers_per_row(width: usize, warp_size: usize) -> usize {
    let mut workers = 1;
    while workers < warp_size && workers * 4 < width {
        workers *= 2;
    }
    workers
}

fn check_cublas(status: cudarc::cublas::sys::cublasStatus_t, device: usize) -> Result<()> {
    if status == cudarc::cublas::sys::cublasStatus_t::CUBLAS_STATUS_SUCCESS {
        Ok(())
    } else {
        Err(Error::KernelLaunch {
            kernel: "cublas_gemm",
            device,
            detail: format!("{:?}", status),
        })
    }
}
