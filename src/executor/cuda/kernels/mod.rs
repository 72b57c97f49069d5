//! PTX loading, caching, and launch helpers
//!
//! PTX is compiled from `sparse.cu` by `build.rs`; modules are loaded
//! on first use and cached per device.

use cudarc::driver::safe::{CudaContext, CudaFunction, CudaModule, LaunchConfig};
use cudarc::nvrtc::Ptx;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::client::CudaClient;
use crate::error::{Error, Result};

/// Directory holding the compiled PTX (emitted by build.rs)
const KERNEL_DIR: &str = env!("CUDA_KERNEL_DIR");

/// Threads per block for the 1-D kernels
pub(crate) const BLOCK_SIZE: u32 = 256;

static MODULE_CACHE: OnceLock<Mutex<HashMap<usize, Arc<CudaModule>>>> = OnceLock::new();

fn get_or_load_module(context: &Arc<CudaContext>, device: usize) -> Result<Arc<CudaModule>> {
    let cache = MODULE_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache.lock();
    if let Some(module) = guard.get(&device) {
        return Ok(module.clone());
    }
    let ptx = Ptx::from_file(format!("{}/sparse.ptx", KERNEL_DIR));
    let module = context.load_module(ptx).map_err(|e| Error::KernelLaunch {
        kernel: "sparse_module",
        device,
        detail: format!("{:?}", e),
    })?;
    guard.insert(device, module.clone());
    Ok(module)
}

/// Fetch a kernel function by name
pub(crate) fn kernel(client: &CudaClient, name: &'static str) -> Result<CudaFunction> {
    let module = get_or_load_module(&client.context, client.device.ordinal)?;
    module.load_function(name).map_err(|e| Error::KernelLaunch {
        kernel: name,
        device: client.device.ordinal,
        detail: format!("{:?}", e),
    })
}

/// 1-D grid covering `work` items
pub(crate) fn grid_1d(work: usize) -> LaunchConfig {
    let grid = work.div_ceil(BLOCK_SIZE as usize).max(1) as u32;
    LaunchConfig {
        grid_dim: (grid, 1, 1),
        block_dim: (BLOCK_SIZE, 1, 1),
        shared_mem_bytes: 0,
    }
}

/// Launch `name` with pointer and scalar arguments
///
/// All pointer arguments are raw device pointers; the i64 scalars
/// follow them, then the value-typed alpha/beta pair when present.
macro_rules! launch {
    ($client:expr, $name:expr, $cfg:expr, [$($arg:expr),* $(,)?]) => {{
        let func = $crate::executor::cuda::kernels::kernel($client, $name)?;
        let mut builder = $client.stream.launch_builder(&func);
        $(builder.arg(&$arg);)*
        unsafe { builder.launch($cfg) }.map_err(|e| $crate::error::Error::KernelLaunch {
            kernel: $name,
            device: $client.device.ordinal,
            detail: format!("{:?}", e),
        })
    }};
}

pub(crate) use launch;
