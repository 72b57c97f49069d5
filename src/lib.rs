//! # sparmat
//!
//! **Sparse linear algebra kernels for heterogeneous hardware.**
//!
//! sparmat provides sparse matrix storage formats, device-aware kernel
//! dispatch, sparse matrix products, and row-distributed matrices with
//! the same API across executors.
//!
//! ## Architecture
//!
//! ```text
//! Executor (backend identity)
//! ├── Device     (a specific CPU/GPU)
//! ├── MemSpace   (typed allocations bound to the device)
//! └── Client     (kernel entry points, synchronization, handles)
//! ```
//!
//! Matrices are generic over the executor: the same `Csr<E, f64>` code
//! runs on the parallel host executor, the single-threaded reference
//! executor, or a GPU executor, with each operation dispatched to that
//! executor's kernel.
//!
//! ## Formats
//!
//! - **Dense** - row-major with stride, the right-hand side and output
//!   carrier of every `apply`
//! - **CSR** - compressed rows with selectable SpMV strategy
//!   (classical, load-balance, merge-path, vendor library, automatic)
//! - **COO** - sorted triples with segment-scan SpMV
//! - **ELL / SELL-P** - padded tiles for uniform and sliced row widths
//! - **HYBRID** - ELL bulk plus COO long-tail spill
//! - **SparsityCsr** - pattern-only matrix with a uniform value
//!
//! ## Quick start
//!
//! ```
//! use sparmat::prelude::*;
//!
//! # fn main() -> sparmat::error::Result<()> {
//! let device = ReferenceExecutor::default_device();
//! let a = Csr::<ReferenceExecutor, f64>::from_host_data(
//!     Dim2::new(2, 2),
//!     &[0, 1, 2],
//!     &[0, 1],
//!     &[2.0, 3.0],
//!     &device,
//! )?;
//! let b = Dense::from_slice(Dim2::new(2, 1), &[1.0, 1.0], &device)?;
//! let mut x = Dense::new(Dim2::new(2, 1), &device)?;
//! a.apply(&b, &mut x)?;
//! assert_eq!(x.to_row_major_vec(), vec![2.0, 3.0]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `cuda`: NVIDIA executor via cudarc with native PTX kernels
//! - `hip`: AMD executor surface (stubs unless `hip-real` is enabled)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod array;
pub mod comm;
pub mod dim;
pub mod distributed;
pub mod dtype;
pub mod error;
pub mod executor;
pub mod kernels;
pub mod linop;
pub mod matrix;
pub mod matrix_data;
pub mod precond;

mod spgemm;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::array::Array;
    pub use crate::comm::{Communicator, LocalComm, ReduceOp};
    pub use crate::dim::Dim2;
    pub use crate::distributed::{DistributedCsr, DistributedDense, IndexSet, RowPartition};
    pub use crate::dtype::{Complex32, Complex64, IndexType, Value};
    pub use crate::error::{Error, Result};
    pub use crate::executor::distributed::DistributedExecutor;
    pub use crate::executor::{
        Device, ExecKind, Executor, ExecutorClient, HostExecutor, MemSpace, Operation,
        ReferenceExecutor,
    };
    pub use crate::linop::{DiagonalExtractable, LinOp, Permutable, Transposable};
    pub use crate::matrix::{
        Coo, Csr, CsrStrategy, Dense, Ell, Hybrid, HybridStrategy, Permutation, PermuteMask,
        Sellp, SparsityCsr,
    };
    pub use crate::matrix_data::MatrixData;

    #[cfg(feature = "cuda")]
    pub use crate::executor::cuda::CudaExecutor;

    #[cfg(feature = "hip")]
    pub use crate::executor::hip::HipExecutor;
}
