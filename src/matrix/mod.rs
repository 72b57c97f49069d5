//! Matrix storage formats
//!
//! Each format lives in its own module with its storage invariants,
//! SpMV entry points, and conversions. All formats read and write the
//! [`MatrixData`](crate::matrix_data::MatrixData) triple form, which is
//! the fallback conversion path between any pair of formats.

pub mod coo;
pub mod csr;
pub mod dense;
pub mod ell;
pub mod hybrid;
pub mod permutation;
pub mod sellp;
pub mod sparsity;

pub use coo::Coo;
pub use csr::{Csr, CsrStrategy};
pub use dense::Dense;
pub use ell::Ell;
pub use hybrid::{Hybrid, HybridStrategy};
pub use permutation::{Permutation, PermuteMask};
pub use sellp::Sellp;
pub use sparsity::SparsityCsr;
