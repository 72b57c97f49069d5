//! Memory spaces
//!
//! A memory space owns typed allocations on one device class and knows how
//! to move raw bytes in and out. Cross-space copies stage through host
//! memory unless both ends share a space.

use crate::error::{Error, Result};
use std::alloc::{alloc_zeroed, dealloc, Layout};

/// Classes of memory space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemSpaceKind {
    /// Pageable host memory
    Host,
    /// CUDA device memory
    CudaDevice,
    /// CUDA unified (managed) memory
    CudaUvm,
    /// HIP device memory
    HipDevice,
    /// Marker for rank-distributed objects
    Distributed,
}

/// Contract for a memory space
///
/// Pointers are carried as `u64` so the same plumbing serves host and
/// device allocations. `free` must be passed the original allocation size.
pub trait MemSpace: Clone + Send + Sync + 'static {
    /// The class of this space
    fn kind(&self) -> MemSpaceKind;

    /// Short name for diagnostics
    fn name(&self) -> &'static str;

    /// Allocate `bytes` of zeroed memory
    ///
    /// Refused allocations surface as [`Error::AllocationFailure`]. A
    /// zero-byte request returns the null handle without allocating.
    fn allocate(&self, bytes: usize) -> Result<u64>;

    /// Release an allocation obtained from [`allocate`](MemSpace::allocate)
    fn free(&self, ptr: u64, bytes: usize);

    /// Copy host bytes into this space
    fn copy_from_host(&self, src: &[u8], dst: u64) -> Result<()>;

    /// Copy bytes from this space to host
    fn copy_to_host(&self, src: u64, dst: &mut [u8]) -> Result<()>;

    /// Copy within this space
    fn copy_within(&self, src: u64, dst: u64, bytes: usize) -> Result<()>;
}

/// Copy between two (possibly different) memory spaces
///
/// Same-space device copies should go through
/// [`MemSpace::copy_within`]; this generic path stages through a host
/// buffer, which is always correct.
pub fn copy_between<S: MemSpace, D: MemSpace>(
    src_space: &S,
    dst_space: &D,
    bytes: usize,
    src: u64,
    dst: u64,
) -> Result<()> {
    if bytes == 0 {
        return Ok(());
    }
    if src_space.kind() == MemSpaceKind::Host && dst_space.kind() == MemSpaceKind::Host {
        // host-to-host without intermediate buffer
        let src_slice = unsafe { std::slice::from_raw_parts(src as *const u8, bytes) };
        return dst_space.copy_from_host(src_slice, dst);
    }
    let mut staging = vec![0u8; bytes];
    src_space.copy_to_host(src, &mut staging)?;
    dst_space.copy_from_host(&staging, dst)
}

/// Host memory space backed by the system allocator
///
/// Allocations are zeroed and 64-byte aligned so SIMD kernels can assume
/// full-width loads.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostMemSpace;

const HOST_ALIGN: usize = 64;

impl HostMemSpace {
    /// Create the host memory space
    pub fn new() -> Self {
        Self
    }
}

impl MemSpace for HostMemSpace {
    fn kind(&self) -> MemSpaceKind {
        MemSpaceKind::Host
    }

    fn name(&self) -> &'static str {
        "host"
    }

    fn allocate(&self, bytes: usize) -> Result<u64> {
        if bytes == 0 {
            return Ok(0);
        }
        let layout = Layout::from_size_align(bytes, HOST_ALIGN)
            .map_err(|_| Error::AllocationFailure { bytes, space: "host" })?;
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(Error::AllocationFailure { bytes, space: "host" });
        }
        Ok(ptr as u64)
    }

    fn free(&self, ptr: u64, bytes: usize) {
        if ptr == 0 || bytes == 0 {
            return;
        }
        let layout = Layout::from_size_align(bytes, HOST_ALIGN).expect("invalid layout in free");
        unsafe { dealloc(ptr as *mut u8, layout) };
    }

    fn copy_from_host(&self, src: &[u8], dst: u64) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst as *mut u8, src.len()) };
        Ok(())
    }

    fn copy_to_host(&self, src: u64, dst: &mut [u8]) -> Result<()> {
        if dst.is_empty() {
            return Ok(());
        }
        unsafe { std::ptr::copy_nonoverlapping(src as *const u8, dst.as_mut_ptr(), dst.len()) };
        Ok(())
    }

    fn copy_within(&self, src: u64, dst: u64, bytes: usize) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        unsafe { std::ptr::copy(src as *const u8, dst as *mut u8, bytes) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_alloc_roundtrip() {
        let space = HostMemSpace::new();
        let ptr = space.allocate(256).unwrap();
        assert_ne!(ptr, 0);

        let data: Vec<u8> = (0..=255).collect();
        space.copy_from_host(&data, ptr).unwrap();

        let mut back = vec![0u8; 256];
        space.copy_to_host(ptr, &mut back).unwrap();
        assert_eq!(back, data);

        space.free(ptr, 256);
    }

    #[test]
    fn test_zero_size_alloc() {
        let space = HostMemSpace::new();
        assert_eq!(space.allocate(0).unwrap(), 0);
        space.free(0, 0);
    }

    #[test]
    fn test_alloc_is_zeroed() {
        let space = HostMemSpace::new();
        let ptr = space.allocate(64).unwrap();
        let mut back = vec![0xffu8; 64];
        space.copy_to_host(ptr, &mut back).unwrap();
        assert!(back.iter().all(|&b| b == 0));
        space.free(ptr, 64);
    }

    #[test]
    fn test_copy_between_host_spaces() {
        let a = HostMemSpace::new();
        let b = HostMemSpace::new();
        let src = a.allocate(16).unwrap();
        let dst = b.allocate(16).unwrap();
        a.copy_from_host(&[7u8; 16], src).unwrap();
        copy_between(&a, &b, 16, src, dst).unwrap();
        let mut back = vec![0u8; 16];
        b.copy_to_host(dst, &mut back).unwrap();
        assert_eq!(back, [7u8; 16]);
        a.free(src, 16);
        b.free(dst, 16);
    }
}
