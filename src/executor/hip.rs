//! HIP (ROCm) executor. Default: probe and stubs; enable `hip-real`
//! for the real runtime path linking `amdhip64`.
//!
//! The memory space drives the HIP runtime directly; compute stages
//! through the reference executor, so results match the host oracle
//! exactly while the device holds the data. Native device kernels are
//! a build-time concern (`hipcc`) outside the host-side contract.

use super::mem::{MemSpace, MemSpaceKind};
use super::tracker::DeviceTracker;
use super::{Device, ExecKind, Executor, ExecutorClient, HostExecutor, Parallelism};
use crate::dtype::{IndexType, Value};
use crate::error::{Error, Result};
use crate::executor::ReferenceExecutor;
use crate::kernels::{DenseKernels, SparseKernels, SpgemmKernels};
use crate::linop::LinOp;
use crate::matrix::coo::Coo;
use crate::matrix::csr::Csr;
use crate::matrix::dense::Dense;
use crate::matrix::ell::Ell;
use crate::matrix::sellp::Sellp;
use crate::spgemm::spgemm_host;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::warn;

/// Result of probing the HIP runtime
#[derive(Debug, Clone)]
pub struct HipProbe {
    /// Whether the runtime reported at least one device
    pub available: bool,
    /// Device count reported by the runtime
    pub devices: usize,
    /// Probe failure description when unavailable
    pub error: Option<String>,
}

#[cfg(feature = "hip-real")]
mod real {
    //! Raw bindings to the HIP runtime, linked via `amdhip64`

    #[allow(non_camel_case_types)]
    pub type hipError_t = i32;
    pub const HIP_SUCCESS: hipError_t = 0;

    extern "C" {
        pub fn hipGetDeviceCount(count: *mut i32) -> hipError_t;
        pub fn hipSetDevice(device: i32) -> hipError_t;
        pub fn hipMalloc(ptr: *mut u64, size: usize) -> hipError_t;
        pub fn hipFree(ptr: u64) -> hipError_t;
        pub fn hipMemset(ptr: u64, value: i32, size: usize) -> hipError_t;
        pub fn hipMemcpyHtoD(dst: u64, src: *const u8, size: usize) -> hipError_t;
        pub fn hipMemcpyDtoH(dst: *mut u8, src: u64, size: usize) -> hipError_t;
        pub fn hipMemcpyDtoD(dst: u64, src: u64, size: usize) -> hipError_t;
        pub fn hipDeviceSynchronize() -> hipError_t;
        pub fn hipDeviceReset() -> hipError_t;
    }
}

/// Probe the HIP runtime without initializing a device
pub fn probe() -> HipProbe {
    #[cfg(feature = "hip-real")]
    {
        let mut count = 0i32;
        let status = unsafe { real::hipGetDeviceCount(&mut count) };
        if status == real::HIP_SUCCESS && count > 0 {
            return HipProbe {
                available: true,
                devices: count as usize,
                error: None,
            };
        }
        return HipProbe {
            available: false,
            devices: 0,
            error: Some(format!("hipGetDeviceCount returned {}", status)),
        };
    }
    #[cfg(not(feature = "hip-real"))]
    HipProbe {
        available: false,
        devices: 0,
        error: Some("built without the hip-real feature".to_string()),
    }
}

fn runtime_slot() -> &'static Mutex<Option<Arc<HipProbe>>> {
    static RUNTIME: OnceLock<Mutex<Option<Arc<HipProbe>>>> = OnceLock::new();
    RUNTIME.get_or_init(|| Mutex::new(None))
}

fn ensure_runtime() -> Result<Arc<HipProbe>> {
    let mut slot = runtime_slot().lock().expect("hip runtime slot poisoned");
    if let Some(runtime) = slot.as_ref() {
        return Ok(runtime.clone());
    }
    let probed = probe();
    if !probed.available {
        return Err(Error::not_supported(
            "hip::create",
            probed
                .error
                .clone()
                .unwrap_or_else(|| "no HIP device".to_string()),
        ));
    }
    let runtime = Arc::new(probed);
    *slot = Some(runtime.clone());
    Ok(runtime)
}

/// AMD GPU executor
#[derive(Clone, Debug, Default)]
pub struct HipExecutor;

/// A HIP device, identified by ordinal
#[derive(Clone, Debug)]
pub struct HipDevice {
    ordinal: usize,
    /// AMD wavefront width
    warp_size: usize,
}

impl HipDevice {
    /// Describe device `ordinal`
    pub fn new(ordinal: usize) -> Self {
        Self {
            ordinal,
            warp_size: 64,
        }
    }
}

impl Default for HipDevice {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Device for HipDevice {
    fn id(&self) -> usize {
        self.ordinal
    }

    fn name(&self) -> String {
        format!("hip({})", self.ordinal)
    }
}

impl HipExecutor {
    /// Create an executor bound to `device_id`, backed by `master`
    pub fn create(device_id: usize, _master: HostExecutor) -> Result<HipDevice> {
        let runtime = ensure_runtime()?;
        if device_id >= runtime.devices {
            return Err(Error::not_supported(
                "hip::create",
                format!("device {} of {}", device_id, runtime.devices),
            ));
        }
        DeviceTracker::global().register(device_id, false);
        Ok(HipDevice::new(device_id))
    }

    /// Drop bookkeeping for a device, firing the reset hook
    pub fn destroy(device: &HipDevice) {
        DeviceTracker::global().unregister(device.ordinal, |id| {
            warn!(device = id, "resetting HIP device after last executor");
            #[cfg(feature = "hip-real")]
            unsafe {
                let _ = real::hipDeviceReset();
            }
        });
    }
}

/// HIP device memory space
#[derive(Clone, Debug)]
pub struct HipMemSpace {
    #[allow(dead_code)]
    ordinal: usize,
}

#[cfg(feature = "hip-real")]
fn check_hip(status: real::hipError_t, kernel: &'static str, device: usize) -> Result<()> {
    if status == real::HIP_SUCCESS {
        Ok(())
    } else {
        Err(Error::KernelLaunch {
            kernel,
            device,
            detail: format!("hip error {}", status),
        })
    }
}

impl MemSpace for HipMemSpace {
    fn kind(&self) -> MemSpaceKind {
        MemSpaceKind::HipDevice
    }

    fn name(&self) -> &'static str {
        "hip"
    }

    #[cfg(feature = "hip-real")]
    fn allocate(&self, bytes: usize) -> Result<u64> {
        if bytes == 0 {
            return Ok(0);
        }
        unsafe {
            check_hip(real::hipSetDevice(self.ordinal as i32), "set_device", self.ordinal)?;
            let mut ptr = 0u64;
            if real::hipMalloc(&mut ptr, bytes) != real::HIP_SUCCESS {
                return Err(Error::AllocationFailure { bytes, space: "hip" });
            }
            check_hip(real::hipMemset(ptr, 0, bytes), "memset", self.ordinal)?;
            Ok(ptr)
        }
    }

    #[cfg(not(feature = "hip-real"))]
    fn allocate(&self, bytes: usize) -> Result<u64> {
        Err(Error::AllocationFailure { bytes, space: "hip" })
    }

    fn free(&self, ptr: u64, _bytes: usize) {
        if ptr == 0 {
            return;
        }
        #[cfg(feature = "hip-real")]
        unsafe {
            let _ = real::hipFree(ptr);
        }
    }

    #[cfg(feature = "hip-real")]
    fn copy_from_host(&self, src: &[u8], dst: u64) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        unsafe {
            check_hip(
                real::hipMemcpyHtoD(dst, src.as_ptr(), src.len()),
                "memcpy_htod",
                self.ordinal,
            )
        }
    }

    #[cfg(not(feature = "hip-real"))]
    fn copy_from_host(&self, _src: &[u8], _dst: u64) -> Result<()> {
        Err(Error::not_implemented("hip::memcpy", "hip"))
    }

    #[cfg(feature = "hip-real")]
    fn copy_to_host(&self, src: u64, dst: &mut [u8]) -> Result<()> {
        if dst.is_empty() {
            return Ok(());
        }
        unsafe {
            check_hip(
                real::hipMemcpyDtoH(dst.as_mut_ptr(), src, dst.len()),
                "memcpy_dtoh",
                self.ordinal,
            )
        }
    }

    #[cfg(not(feature = "hip-real"))]
    fn copy_to_host(&self, _src: u64, _dst: &mut [u8]) -> Result<()> {
        Err(Error::not_implemented("hip::memcpy", "hip"))
    }

    #[cfg(feature = "hip-real")]
    fn copy_within(&self, src: u64, dst: u64, bytes: usize) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        unsafe { check_hip(real::hipMemcpyDtoD(dst, src, bytes), "memcpy_dtod", self.ordinal) }
    }

    #[cfg(not(feature = "hip-real"))]
    fn copy_within(&self, _src: u64, _dst: u64, _bytes: usize) -> Result<()> {
        Err(Error::not_implemented("hip::memcpy", "hip"))
    }
}

/// HIP client
#[derive(Clone, Debug)]
pub struct HipClient {
    device: HipDevice,
    mem: HipMemSpace,
}

impl Executor for HipExecutor {
    type Device = HipDevice;
    type MemSpace = HipMemSpace;
    type Client = HipClient;

    fn kind() -> ExecKind {
        ExecKind::Hip
    }

    fn name() -> &'static str {
        "hip"
    }

    fn default_device() -> HipDevice {
        HipDevice::new(0)
    }

    fn mem_space(device: &HipDevice) -> HipMemSpace {
        HipMemSpace {
            ordinal: device.ordinal,
        }
    }

    fn client(device: &HipDevice) -> HipClient {
        HipClient {
            device: device.clone(),
            mem: Self::mem_space(device),
        }
    }

    fn synchronize(_device: &HipDevice) -> Result<()> {
        #[cfg(feature = "hip-real")]
        unsafe {
            return check_hip(real::hipDeviceSynchronize(), "synchronize", 0);
        }
        #[cfg(not(feature = "hip-real"))]
        Ok(())
    }
}

impl ExecutorClient<HipExecutor> for HipClient {
    fn device(&self) -> &HipDevice {
        &self.device
    }

    fn mem_space(&self) -> &HipMemSpace {
        &self.mem
    }

    fn synchronize(&self) -> Result<()> {
        HipExecutor::synchronize(&self.device)
    }

    fn parallelism(&self) -> Parallelism {
        Parallelism {
            workers: self.device.warp_size,
            warp_size: self.device.warp_size,
            multiprocessors: 1,
        }
    }
}

fn ref_device() -> <ReferenceExecutor as Executor>::Device {
    ReferenceExecutor::default_device()
}

/// Stage an apply-shaped operation through the reference executor
fn staged_apply<V: Value, Op: LinOp<ReferenceExecutor, V>>(
    op: &Op,
    alpha: V,
    b: &Dense<HipExecutor, V>,
    beta: V,
    x: &mut Dense<HipExecutor, V>,
) -> Result<()> {
    use num_traits::Zero;
    let b_ref = b.clone_to::<ReferenceExecutor>(&ref_device())?;
    let mut x_ref = if beta.is_zero() {
        Dense::new(x.size(), &ref_device())?
    } else {
        x.clone_to::<ReferenceExecutor>(&ref_device())?
    };
    op.apply_scaled(alpha, &b_ref, beta, &mut x_ref)?;
    let mut host = x.values().to_vec();
    let stride = x.stride();
    let cols = x.size().cols;
    let logical = x_ref.to_row_major_vec();
    for r in 0..x.size().rows {
        host[r * stride..r * stride + cols].copy_from_slice(&logical[r * cols..(r + 1) * cols]);
    }
    x.values_mut().write_from_slice(&host)
}

impl DenseKernels<HipExecutor> for HipClient {
    fn dense_apply<V: Value>(
        &self,
        alpha: V,
        a: &Dense<HipExecutor, V>,
        b: &Dense<HipExecutor, V>,
        beta: V,
        x: &mut Dense<HipExecutor, V>,
    ) -> Result<()> {
        let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
        staged_apply(&a_ref, alpha, b, beta, x)
    }

    fn dense_scale<V: Value>(&self, alpha: V, x: &mut Dense<HipExecutor, V>) -> Result<()> {
        let mut x_ref = x.clone_to::<ReferenceExecutor>(&ref_device())?;
        x_ref.scale(alpha)?;
        let host = x_ref.to_row_major_vec();
        let mut device_host = x.values().to_vec();
        let stride = x.stride();
        let cols = x.size().cols;
        for r in 0..x.size().rows {
            device_host[r * stride..r * stride + cols]
                .copy_from_slice(&host[r * cols..(r + 1) * cols]);
        }
        x.values_mut().write_from_slice(&device_host)
    }

    fn dense_add_scaled<V: Value>(
        &self,
        alpha: V,
        b: &Dense<HipExecutor, V>,
        x: &mut Dense<HipExecutor, V>,
    ) -> Result<()> {
        let b_ref = b.clone_to::<ReferenceExecutor>(&ref_device())?;
        let mut x_ref = x.clone_to::<ReferenceExecutor>(&ref_device())?;
        x_ref.add_scaled(alpha, &b_ref)?;
        let host = x_ref.to_row_major_vec();
        let mut device_host = x.values().to_vec();
        let stride = x.stride();
        let cols = x.size().cols;
        for r in 0..x.size().rows {
            device_host[r * stride..r * stride + cols]
                .copy_from_slice(&host[r * cols..(r + 1) * cols]);
        }
        x.values_mut().write_from_slice(&device_host)
    }

    fn dense_dot<V: Value>(
        &self,
        conjugate: bool,
        a: &Dense<HipExecutor, V>,
        b: &Dense<HipExecutor, V>,
        out: &mut Dense<HipExecutor, V>,
    ) -> Result<()> {
        let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
        let b_ref = b.clone_to::<ReferenceExecutor>(&ref_device())?;
        let result = if conjugate {
            a_ref.compute_conj_dot(&b_ref)?
        } else {
            a_ref.compute_dot(&b_ref)?
        };
        out.values_mut().write_from_slice(&result.to_row_major_vec())
    }

    fn dense_norm2<V: Value>(
        &self,
        a: &Dense<HipExecutor, V>,
        out: &mut Dense<HipExecutor, V::Real>,
    ) -> Result<()> {
        let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
        let result = a_ref.compute_norm2()?;
        out.values_mut().write_from_slice(&result.to_row_major_vec())
    }
}

impl SparseKernels<HipExecutor> for HipClient {
    fn csr_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Csr<HipExecutor, V, I>,
        b: &Dense<HipExecutor, V>,
        beta: V,
        x: &mut Dense<HipExecutor, V>,
    ) -> Result<()> {
        let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
        staged_apply(&a_ref, alpha, b, beta, x)
    }

    fn coo_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Coo<HipExecutor, V, I>,
        b: &Dense<HipExecutor, V>,
        beta: V,
        x: &mut Dense<HipExecutor, V>,
    ) -> Result<()> {
        let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
        staged_apply(&a_ref, alpha, b, beta, x)
    }

    fn ell_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Ell<HipExecutor, V, I>,
        b: &Dense<HipExecutor, V>,
        beta: V,
        x: &mut Dense<HipExecutor, V>,
    ) -> Result<()> {
        let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
        staged_apply(&a_ref, alpha, b, beta, x)
    }

    fn sellp_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Sellp<HipExecutor, V, I>,
        b: &Dense<HipExecutor, V>,
        beta: V,
        x: &mut Dense<HipExecutor, V>,
    ) -> Result<()> {
        let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
        staged_apply(&a_ref, alpha, b, beta, x)
    }
}

impl SpgemmKernels<HipExecutor> for HipClient {
    fn spgemm<V: Value, I: IndexType>(
        &self,
        a: &Csr<HipExecutor, V, I>,
        b: &Csr<HipExecutor, V, I>,
    ) -> Result<Csr<HipExecutor, V, I>> {
        let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
        let b_ref = b.clone_to::<ReferenceExecutor>(&ref_device())?;
        spgemm_host(V::one(), &a_ref, &b_ref, None)?.clone_to::<HipExecutor>(a.device())
    }

    fn spgemm_advanced<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Csr<HipExecutor, V, I>,
        b: &Csr<HipExecutor, V, I>,
        beta: V,
        c: &Csr<HipExecutor, V, I>,
    ) -> Result<Csr<HipExecutor, V, I>> {
        let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
        let b_ref = b.clone_to::<ReferenceExecutor>(&ref_device())?;
        let c_ref = c.clone_to::<ReferenceExecutor>(&ref_device())?;
        spgemm_host(alpha, &a_ref, &b_ref, Some((beta, &c_ref)))?
            .clone_to::<HipExecutor>(a.device())
    }
}
