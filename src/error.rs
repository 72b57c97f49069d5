//! Error types for sparmat

use crate::dim::Dim2;
use thiserror::Error;

/// Result type alias using sparmat's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sparmat operations
#[derive(Error, Debug)]
pub enum Error {
    /// Operation has no kernel for the executor it was dispatched to
    #[error("Operation '{op}' is not implemented for executor '{executor}'")]
    NotImplemented {
        /// The operation name
        op: &'static str,
        /// The executor name
        executor: &'static str,
    },

    /// Operation cannot be performed on this object
    #[error("Operation '{op}' is not supported: {reason}")]
    NotSupported {
        /// The operation name
        op: &'static str,
        /// Why the object rejects it
        reason: String,
    },

    /// Sizes incompatible in an operation
    #[error("Dimension mismatch in '{op}': expected {expected}, got {got}")]
    DimensionMismatch {
        /// The operation name
        op: &'static str,
        /// Expected dimension
        expected: Dim2,
        /// Actual dimension
        got: Dim2,
    },

    /// Index or size exceeds an allocation
    #[error("Index {index} out of bounds for size {size}")]
    OutOfBounds {
        /// The invalid index
        index: usize,
        /// Size of the indexed range
        size: usize,
    },

    /// The memory space refused an allocation
    #[error("Allocation of {bytes} bytes failed on memory space '{space}'")]
    AllocationFailure {
        /// Requested size in bytes
        bytes: usize,
        /// Memory space name
        space: &'static str,
    },

    /// Object lives on the wrong memory space for the requested executor
    #[error("Memory space mismatch: object on '{found}', executor requires '{required}'")]
    MemSpaceMismatch {
        /// Memory space the object lives on
        found: &'static str,
        /// Memory space the executor requires
        required: &'static str,
    },

    /// A device kernel returned an error code
    #[error("Kernel '{kernel}' failed on device {device}: {detail}")]
    KernelLaunch {
        /// Kernel name
        kernel: &'static str,
        /// Device id
        device: usize,
        /// Backend error description
        detail: String,
    },

    /// A collective communication operation failed
    #[error("Collective '{op}' failed on rank {rank}: {detail}")]
    Collective {
        /// Collective operation name
        op: &'static str,
        /// Rank that observed the failure
        rank: usize,
        /// Failure description
        detail: String,
    },

    /// Data violated a precondition (e.g. non-monotone row pointers)
    #[error("Value mismatch: {0}")]
    ValueMismatch(String),

    /// CUDA driver error
    #[cfg(feature = "cuda")]
    #[error("CUDA error: {0}")]
    Cuda(#[from] cudarc::driver::DriverError),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a dimension mismatch error
    pub fn dim_mismatch(op: &'static str, expected: Dim2, got: Dim2) -> Self {
        Self::DimensionMismatch { op, expected, got }
    }

    /// Create a not-implemented error
    pub fn not_implemented(op: &'static str, executor: &'static str) -> Self {
        Self::NotImplemented { op, executor }
    }

    /// Create a not-supported error
    pub fn not_supported(op: &'static str, reason: impl Into<String>) -> Self {
        Self::NotSupported {
            op,
            reason: reason.into(),
        }
    }

    /// Create a value mismatch error
    pub fn value_mismatch(detail: impl Into<String>) -> Self {
        Self::ValueMismatch(detail.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::dim_mismatch("apply", Dim2::new(3, 3), Dim2::new(3, 2));
        let msg = err.to_string();
        assert!(msg.contains("apply"));
        assert!(msg.contains("3 x 3"));
        assert!(msg.contains("3 x 2"));
    }

    #[test]
    fn test_out_of_bounds_display() {
        let err = Error::OutOfBounds { index: 7, size: 5 };
        assert_eq!(err.to_string(), "Index 7 out of bounds for size 5");
    }
}
