//! Kernel contracts implemented by every executor's client
//!
//! Each trait method is one operation entry point; the bounds on
//! [`Executor::Client`](crate::executor::Executor) force every executor
//! to declare all of them, so a missing kernel is a compile error rather
//! than a runtime surprise. Host and reference clients share the serial
//! row cores in this module; the host client parallelizes them with
//! rayon, accelerator clients launch native kernels or stage through the
//! host.

pub(crate) mod dense;
pub(crate) mod host_impl;
pub(crate) mod spmv;

use crate::dtype::{IndexType, Value};
use crate::error::Result;
use crate::executor::Executor;
use crate::matrix::coo::Coo;
use crate::matrix::csr::Csr;
use crate::matrix::dense::Dense;
use crate::matrix::ell::Ell;
use crate::matrix::sellp::Sellp;

/// Dense operation kernels
///
/// All `apply`-shaped methods compute `x = alpha * op(a, b) + beta * x`;
/// when `beta` is zero the previous contents of `x` are not read.
pub trait DenseKernels<E: Executor> {
    /// Dense matrix product: `x = alpha * a * b + beta * x`
    fn dense_apply<V: Value>(
        &self,
        alpha: V,
        a: &Dense<E, V>,
        b: &Dense<E, V>,
        beta: V,
        x: &mut Dense<E, V>,
    ) -> Result<()>;

    /// Scale every entry: `x *= alpha`
    fn dense_scale<V: Value>(&self, alpha: V, x: &mut Dense<E, V>) -> Result<()>;

    /// Scaled accumulation: `x += alpha * b`
    fn dense_add_scaled<V: Value>(
        &self,
        alpha: V,
        b: &Dense<E, V>,
        x: &mut Dense<E, V>,
    ) -> Result<()>;

    /// Per-column dot product into a `1 x cols` result
    ///
    /// With `conjugate` set the left operand is conjugated entry-wise.
    fn dense_dot<V: Value>(
        &self,
        conjugate: bool,
        a: &Dense<E, V>,
        b: &Dense<E, V>,
        out: &mut Dense<E, V>,
    ) -> Result<()>;

    /// Per-column Euclidean norm into a `1 x cols` real result
    fn dense_norm2<V: Value>(&self, a: &Dense<E, V>, out: &mut Dense<E, V::Real>) -> Result<()>;
}

/// Sparse matrix-vector kernels, one per storage format
///
/// Every method computes `x = alpha * A * b + beta * x` column by column
/// for multi-column `b`. `beta == 0` must not read `x`.
pub trait SparseKernels<E: Executor> {
    /// CSR SpMV honoring the matrix's strategy
    fn csr_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Csr<E, V, I>,
        b: &Dense<E, V>,
        beta: V,
        x: &mut Dense<E, V>,
    ) -> Result<()>;

    /// COO SpMV; relies on row indices being sorted non-decreasing
    fn coo_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Coo<E, V, I>,
        b: &Dense<E, V>,
        beta: V,
        x: &mut Dense<E, V>,
    ) -> Result<()>;

    /// ELL SpMV; padding entries carry value zero and contribute nothing
    fn ell_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Ell<E, V, I>,
        b: &Dense<E, V>,
        beta: V,
        x: &mut Dense<E, V>,
    ) -> Result<()>;

    /// SELL-P SpMV with per-slice bounded inner loops
    fn sellp_spmv<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Sellp<E, V, I>,
        b: &Dense<E, V>,
        beta: V,
        x: &mut Dense<E, V>,
    ) -> Result<()>;
}

/// Sparse matrix-matrix multiplication kernels
pub trait SpgemmKernels<E: Executor> {
    /// `C = A * B` in CSR form
    fn spgemm<V: Value, I: IndexType>(
        &self,
        a: &Csr<E, V, I>,
        b: &Csr<E, V, I>,
    ) -> Result<Csr<E, V, I>>;

    /// `C = alpha * A * B + beta * C_in`
    fn spgemm_advanced<V: Value, I: IndexType>(
        &self,
        alpha: V,
        a: &Csr<E, V, I>,
        b: &Csr<E, V, I>,
        beta: V,
        c: &Csr<E, V, I>,
    ) -> Result<Csr<E, V, I>>;
}
