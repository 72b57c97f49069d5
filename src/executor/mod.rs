//! Executors: device identity, kernel dispatch, synchronization
//!
//! An [`Executor`] names a place where matrix data lives and kernels run.
//! It uses static dispatch via generics: matrix types are parameterized by
//! the executor and route every operation to that executor's kernel set.
//!
//! ```text
//! Executor (backend identity)
//! ├── Device    (identifies a specific CPU/GPU)
//! ├── MemSpace  (typed allocations bound to the device)
//! └── Client    (kernel entry points, synchronization, handles)
//! ```
//!
//! Kernel launches are asynchronous on accelerator executors; program
//! order is preserved per executor, and [`ExecutorClient::synchronize`]
//! is the only suspension point a caller sees.

pub mod distributed;
pub mod host;
pub mod mem;
pub mod op;
pub mod reference;
pub mod tracker;

#[cfg(feature = "cuda")]
pub mod cuda;

#[cfg(feature = "hip")]
pub mod hip;

pub use host::HostExecutor;
pub use mem::{copy_between, HostMemSpace, MemSpace, MemSpaceKind};
pub use op::Operation;
pub use reference::ReferenceExecutor;

use crate::error::Result;
use crate::kernels::{DenseKernels, SparseKernels, SpgemmKernels};

/// Executor variants, used by [`Operation`] dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecKind {
    /// Thread-parallel host executor
    Host,
    /// Single-threaded host oracle
    Reference,
    /// NVIDIA GPU executor
    Cuda,
    /// AMD GPU executor
    Hip,
    /// Communicator-backed multi-rank executor
    Distributed,
}

/// Identifies a specific compute unit
pub trait Device: Clone + Send + Sync + 'static {
    /// Unique identifier for this device
    fn id(&self) -> usize;

    /// Human-readable name
    fn name(&self) -> String {
        format!("device({})", self.id())
    }
}

/// Hardware shape a client exposes to strategy heuristics
#[derive(Debug, Clone, Copy)]
pub struct Parallelism {
    /// Number of concurrent workers (threads on host, resident warps on GPU)
    pub workers: usize,
    /// SIMT group width (1 on host executors)
    pub warp_size: usize,
    /// Multiprocessor count (1 on host executors)
    pub multiprocessors: usize,
}

/// Core trait for compute backends
///
/// Memory operations are associated functions taking a device, so that
/// buffers can release themselves without holding a client.
pub trait Executor: Clone + Send + Sync + Default + 'static {
    /// Device identifier type
    type Device: Device;

    /// Memory space type backing this executor
    type MemSpace: MemSpace;

    /// Client for kernel dispatch. The kernel-trait bounds make every
    /// executor declare one entry point per operation; a missing
    /// implementation is a compile error, not a runtime surprise.
    type Client: ExecutorClient<Self>
        + DenseKernels<Self>
        + SparseKernels<Self>
        + SpgemmKernels<Self>;

    /// Which dispatch branch this executor takes
    fn kind() -> ExecKind;

    /// Human-readable name of this executor
    fn name() -> &'static str;

    /// The default device
    fn default_device() -> Self::Device;

    /// Memory space of a device
    fn mem_space(device: &Self::Device) -> Self::MemSpace;

    /// Client for a device
    fn client(device: &Self::Device) -> Self::Client;

    /// Block until all work submitted to the device has completed
    fn synchronize(device: &Self::Device) -> Result<()>;

    /// Allocate zeroed device memory
    fn allocate(bytes: usize, device: &Self::Device) -> Result<u64> {
        Self::mem_space(device).allocate(bytes)
    }

    /// Release device memory
    fn free(ptr: u64, bytes: usize, device: &Self::Device) {
        Self::mem_space(device).free(ptr, bytes);
    }

    /// Copy host bytes to the device
    fn copy_to_device(src: &[u8], dst: u64, device: &Self::Device) -> Result<()> {
        Self::mem_space(device).copy_from_host(src, dst)
    }

    /// Copy device bytes to the host
    fn copy_from_device(src: u64, dst: &mut [u8], device: &Self::Device) -> Result<()> {
        Self::mem_space(device).copy_to_host(src, dst)
    }

    /// Copy within the device
    fn copy_within(src: u64, dst: u64, bytes: usize, device: &Self::Device) -> Result<()> {
        Self::mem_space(device).copy_within(src, dst, bytes)
    }

    /// Read a single element back to the host
    ///
    /// A suspension point on accelerator executors, like
    /// [`synchronize`](Executor::synchronize).
    fn copy_val_to_host<T: crate::dtype::Element>(ptr: u64, device: &Self::Device) -> Result<T> {
        let mut value = T::zeroed();
        Self::copy_from_device(ptr, bytemuck::bytes_of_mut(&mut value), device)?;
        Ok(value)
    }

    /// Dispatch a named [`Operation`] to this executor's branch
    ///
    /// Logs launch and completion; a missing branch surfaces as
    /// [`Error::NotImplemented`](crate::error::Error::NotImplemented).
    fn run<R>(op: Operation<'_, R>) -> Result<R> {
        op.dispatch(Self::kind(), Self::name())
    }

    /// The host executor that backs this one
    fn get_master() -> HostExecutor {
        HostExecutor
    }
}

/// Trait for executor clients that hold per-device state
pub trait ExecutorClient<E: Executor>: Clone + Send + Sync {
    /// The device this client operates on
    fn device(&self) -> &E::Device;

    /// The memory space of the device
    fn mem_space(&self) -> &E::MemSpace;

    /// Wait for all pending operations to complete
    fn synchronize(&self) -> Result<()>;

    /// Hardware shape for kernel-selection heuristics
    fn parallelism(&self) -> Parallelism;
}

/// Marker for executors whose memory space is directly addressable from
/// the host. Host kernels borrow buffer contents as slices through this.
pub trait HostAccessible: Executor<MemSpace = HostMemSpace> {
    /// Whether kernels on this executor parallelize across threads
    const PARALLEL: bool;
}
