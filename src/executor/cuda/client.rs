//! CUDA client: context, stream, handles, per-device cache
//!
//! One client per device is created lazily and cached process-wide; the
//! cached client owns the context, the stream every kernel launches on,
//! and the cuBLAS/cuSPARSE handles. Clients register with the
//! [`DeviceTracker`](crate::executor::tracker::DeviceTracker) so a
//! device reset hook can fire after the last one is dropped.
//!
//! # Thread safety
//!
//! The handles are not thread-safe; callers serialize operations on a
//! given executor. Kernel launches are asynchronous and ordered by the
//! stream.

use super::device::{CudaDevice, CudaError};
use super::cusparse::CudaSparse;
use crate::error::{Error, Result};
use crate::executor::mem::{MemSpace, MemSpaceKind};
use crate::executor::tracker::DeviceTracker;
use cudarc::cublas::CudaBlas;
use cudarc::driver::safe::{CudaContext, CudaStream};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::warn;

/// CUDA client holding per-device resources
#[derive(Clone)]
pub struct CudaClient {
    pub(crate) device: CudaDevice,
    pub(crate) context: Arc<CudaContext>,
    pub(crate) stream: Arc<CudaStream>,
    pub(crate) cublas: Arc<CudaBlas>,
    pub(crate) cusparse: Arc<CudaSparse>,
    pub(crate) mem: CudaMemSpace,
}

impl std::fmt::Debug for CudaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CudaClient")
            .field("device", &self.device.ordinal)
            .finish_non_exhaustive()
    }
}

static CLIENT_CACHE: OnceLock<Mutex<HashMap<usize, CudaClient>>> = OnceLock::new();

/// Get or create the cached client for a device
///
/// Handle or context initialization failure at construction is fatal
/// for the operation and surfaces as [`Error::KernelLaunch`].
pub fn get_or_create_client(device: &CudaDevice) -> Result<CudaClient> {
    let cache = CLIENT_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache.lock();
    if let Some(client) = guard.get(&device.ordinal) {
        return Ok(client.clone());
    }

    let context = CudaContext::new(device.ordinal).map_err(Error::from)?;
    let stream = context.default_stream();
    let cublas = CudaBlas::new(stream.clone()).map_err(|e| Error::KernelLaunch {
        kernel: "cublas_init",
        device: device.ordinal,
        detail: format!("{:?}", e),
    })?;
    let cusparse = CudaSparse::new(stream.clone()).map_err(|e: CudaError| Error::KernelLaunch {
        kernel: "cusparse_init",
        device: device.ordinal,
        detail: e.to_string(),
    })?;

    let client = CudaClient {
        device: device.clone(),
        context,
        stream: stream.clone(),
        cublas: Arc::new(cublas),
        cusparse: Arc::new(cusparse),
        mem: CudaMemSpace {
            kind: MemSpaceKind::CudaDevice,
            stream,
        },
    };
    DeviceTracker::global().register(device.ordinal, false);
    guard.insert(device.ordinal, client.clone());
    Ok(client)
}

/// Drop the cached client of a device, firing the reset hook
pub fn reset_device(ordinal: usize) {
    if let Some(cache) = CLIENT_CACHE.get() {
        cache.lock().remove(&ordinal);
    }
    DeviceTracker::global().unregister(ordinal, |id| {
        warn!(device = id, "resetting CUDA device after last executor");
    });
}

/// CUDA memory space: stream-ordered device or managed allocations
#[derive(Clone)]
pub struct CudaMemSpace {
    pub(crate) kind: MemSpaceKind,
    pub(crate) stream: Arc<CudaStream>,
}

impl MemSpace for CudaMemSpace {
    fn kind(&self) -> MemSpaceKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        match self.kind {
            MemSpaceKind::CudaUvm => "cuda_uvm",
            _ => "cuda",
        }
    }

    fn allocate(&self, bytes: usize) -> Result<u64> {
        if bytes == 0 {
            return Ok(0);
        }
        unsafe {
            let mut ptr: u64 = 0;
            let result = match self.kind {
                MemSpaceKind::CudaUvm => cudarc::driver::sys::cuMemAllocManaged(
                    &mut ptr,
                    bytes,
                    cudarc::driver::sys::CUmemAttach_flags::CU_MEM_ATTACH_GLOBAL as u32,
                ),
                _ => cudarc::driver::sys::cuMemAllocAsync(&mut ptr, bytes, self.stream.cu_stream()),
            };
            if result != cudarc::driver::sys::CUresult::CUDA_SUCCESS {
                return Err(Error::AllocationFailure {
                    bytes,
                    space: self.name(),
                });
            }
            // zero-fill to match the host space contract
            let result =
                cudarc::driver::sys::cuMemsetD8Async(ptr, 0, bytes, self.stream.cu_stream());
            if result != cudarc::driver::sys::CUresult::CUDA_SUCCESS {
                return Err(Error::AllocationFailure {
                    bytes,
                    space: self.name(),
                });
            }
            Ok(ptr)
        }
    }

    fn free(&self, ptr: u64, _bytes: usize) {
        if ptr == 0 {
            return;
        }
        unsafe {
            let result = match self.kind {
                MemSpaceKind::CudaUvm => cudarc::driver::sys::cuMemFree_v2(ptr),
                _ => cudarc::driver::sys::cuMemFreeAsync(ptr, self.stream.cu_stream()),
            };
            if result != cudarc::driver::sys::CUresult::CUDA_SUCCESS {
                warn!(ptr = format!("0x{:x}", ptr), ?result, "cuda free failed");
            }
        }
    }

    fn copy_from_host(&self, src: &[u8], dst: u64) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        unsafe {
            let result = cudarc::driver::sys::cuMemcpyHtoDAsync_v2(
                dst,
                src.as_ptr() as *const _,
                src.len(),
                self.stream.cu_stream(),
            );
            if result != cudarc::driver::sys::CUresult::CUDA_SUCCESS {
                return Err(Error::KernelLaunch {
                    kernel: "memcpy_htod",
                    device: 0,
                    detail: format!("{:?}", result),
                });
            }
        }
        self.stream.synchronize().map_err(Error::from)
    }

    fn copy_to_host(&self, src: u64, dst: &mut [u8]) -> Result<()> {
        if dst.is_empty() {
            return Ok(());
        }
        unsafe {
            let result = cudarc::driver::sys::cuMemcpyDtoHAsync_v2(
                dst.as_mut_ptr() as *mut _,
                src,
                dst.len(),
                self.stream.cu_stream(),
            );
            if result != cudarc::driver::sys::CUresult::CUDA_SUCCESS {
                return Err(Error::KernelLaunch {
                    kernel: "memcpy_dtoh",
                    device: 0,
                    detail: format!("{:?}", result),
                });
            }
        }
        self.stream.synchronize().map_err(Error::from)
    }

    fn copy_within(&self, src: u64, dst: u64, bytes: usize) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        unsafe {
            let result = cudarc::driver::sys::cuMemcpyDtoDAsync_v2(
                dst,
                src,
                bytes,
                self.stream.cu_stream(),
            );
            if result != cudarc::driver::sys::CUresult::CUDA_SUCCESS {
                return Err(Error::KernelLaunch {
                    kernel: "memcpy_dtod",
                    device: 0,
                    detail: format!("{:?}", result),
                });
            }
        }
        Ok(())
    }
}
