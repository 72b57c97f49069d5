//! CUDA device identity

use crate::executor::Device;

/// A CUDA device, identified by ordinal
///
/// Carries the hardware shape the strategy heuristics consult: warp
/// size, multiprocessor count.
#[derive(Clone, Debug)]
pub struct CudaDevice {
    pub(crate) ordinal: usize,
    pub(crate) warp_size: usize,
    pub(crate) multiprocessors: usize,
}

impl CudaDevice {
    /// Describe device `ordinal` without initializing it
    pub fn new(ordinal: usize) -> Self {
        Self {
            ordinal,
            warp_size: 32,
            multiprocessors: 1,
        }
    }

    /// The device ordinal
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// SIMT warp width
    pub fn warp_size(&self) -> usize {
        self.warp_size
    }

    /// Streaming multiprocessor count (queried at client creation)
    pub fn multiprocessors(&self) -> usize {
        self.multiprocessors
    }
}

impl Default for CudaDevice {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Device for CudaDevice {
    fn id(&self) -> usize {
        self.ordinal
    }

    fn name(&self) -> String {
        format!("cuda({})", self.ordinal)
    }
}

/// Errors from the CUDA runtime layers that are not driver errors
#[derive(Debug)]
pub enum CudaError {
    /// cuBLAS returned a failure status
    CublasError(String),
    /// cuSPARSE returned a failure status
    CusparseError(String),
}

impl std::fmt::Display for CudaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CudaError::CublasError(msg) => write!(f, "cuBLAS error: {}", msg),
            CudaError::CusparseError(msg) => write!(f, "cuSPARSE error: {}", msg),
        }
    }
}

impl From<CudaError> for crate::error::Error {
    fn from(err: CudaError) -> Self {
        crate::error::Error::KernelLaunch {
            kernel: "vendor_library",
            device: 0,
            detail: err.to_string(),
        }
    }
}
