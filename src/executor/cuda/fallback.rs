//! Host-staged fallbacks for operations without a native CUDA path
//!
//! Inputs are copied to the reference executor, computed there with
//! the serial oracle kernels, and the result is copied back. Slower by
//! the two transfers, numerically identical to the reference results.

use super::CudaExecutor;
use crate::dtype::{IndexType, Value};
use crate::error::Result;
use crate::executor::{Executor, ReferenceExecutor};
use crate::linop::LinOp;
use crate::matrix::coo::Coo;
use crate::matrix::csr::Csr;
use crate::matrix::dense::Dense;
use crate::matrix::ell::Ell;
use crate::matrix::sellp::Sellp;
use crate::spgemm::spgemm_host;

fn ref_device() -> <ReferenceExecutor as Executor>::Device {
    ReferenceExecutor::default_device()
}

/// Copy a staged result back into the device-resident output
fn write_back<V: Value>(
    staged: &Dense<ReferenceExecutor, V>,
    x: &mut Dense<CudaExecutor, V>,
) -> Result<()> {
    let mut host = x.values().to_vec();
    let stride = x.stride();
    let cols = x.size().cols;
    let logical = staged.to_row_major_vec();
    for r in 0..x.size().rows {
        host[r * stride..r * stride + cols].copy_from_slice(&logical[r * cols..(r + 1) * cols]);
    }
    x.values_mut().write_from_slice(&host)
}

fn stage_x<V: Value>(
    beta_reads_x: bool,
    x: &Dense<CudaExecutor, V>,
) -> Result<Dense<ReferenceExecutor, V>> {
    if beta_reads_x {
        x.clone_to::<ReferenceExecutor>(&ref_device())
    } else {
        Dense::new(x.size(), &ref_device())
    }
}

pub(super) fn dense_apply<V: Value>(
    alpha: V,
    a: &Dense<CudaExecutor, V>,
    b: &Dense<CudaExecutor, V>,
    beta: V,
    x: &mut Dense<CudaExecutor, V>,
) -> Result<()> {
    use num_traits::Zero;
    let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
    let b_ref = b.clone_to::<ReferenceExecutor>(&ref_device())?;
    let mut x_ref = stage_x(!beta.is_zero(), x)?;
    a_ref.apply_scaled(alpha, &b_ref, beta, &mut x_ref)?;
    write_back(&x_ref, x)
}

pub(super) fn dense_scale<V: Value>(alpha: V, x: &mut Dense<CudaExecutor, V>) -> Result<()> {
    let mut x_ref = x.clone_to::<ReferenceExecutor>(&ref_device())?;
    x_ref.scale(alpha)?;
    write_back(&x_ref, x)
}

pub(super) fn dense_add_scaled<V: Value>(
    alpha: V,
    b: &Dense<CudaExecutor, V>,
    x: &mut Dense<CudaExecutor, V>,
) -> Result<()> {
    let b_ref = b.clone_to::<ReferenceExecutor>(&ref_device())?;
    let mut x_ref = x.clone_to::<ReferenceExecutor>(&ref_device())?;
    x_ref.add_scaled(alpha, &b_ref)?;
    write_back(&x_ref, x)
}

pub(super) fn dense_dot<V: Value>(
    conjugate: bool,
    a: &Dense<CudaExecutor, V>,
    b: &Dense<CudaExecutor, V>,
    out: &mut Dense<CudaExecutor, V>,
) -> Result<()> {
    let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
    let b_ref = b.clone_to::<ReferenceExecutor>(&ref_device())?;
    let result = if conjugate {
        a_ref.compute_conj_dot(&b_ref)?
    } else {
        a_ref.compute_dot(&b_ref)?
    };
    write_back(&result, out)
}

pub(super) fn dense_norm2<V: Value>(
    a: &Dense<CudaExecutor, V>,
    out: &mut Dense<CudaExecutor, V::Real>,
) -> Result<()> {
    let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
    let result = a_ref.compute_norm2()?;
    write_back(&result, out)
}

pub(super) fn csr_spmv<V: Value, I: IndexType>(
    alpha: V,
    a: &Csr<CudaExecutor, V, I>,
    b: &Dense<CudaExecutor, V>,
    beta: V,
    x: &mut Dense<CudaExecutor, V>,
) -> Result<()> {
    use num_traits::Zero;
    let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
    let b_ref = b.clone_to::<ReferenceExecutor>(&ref_device())?;
    let mut x_ref = stage_x(!beta.is_zero(), x)?;
    a_ref.apply_scaled(alpha, &b_ref, beta, &mut x_ref)?;
    write_back(&x_ref, x)
}

pub(super) fn coo_spmv<V: Value, I: IndexType>(
    alpha: V,
    a: &Coo<CudaExecutor, V, I>,
    b: &Dense<CudaExecutor, V>,
    beta: V,
    x: &mut Dense<CudaExecutor, V>,
) -> Result<()> {
    use num_traits::Zero;
    let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
    let b_ref = b.clone_to::<ReferenceExecutor>(&ref_device())?;
    let mut x_ref = stage_x(!beta.is_zero(), x)?;
    a_ref.apply_scaled(alpha, &b_ref, beta, &mut x_ref)?;
    write_back(&x_ref, x)
}

pub(super) fn ell_spmv<V: Value, I: IndexType>(
    alpha: V,
    a: &Ell<CudaExecutor, V, I>,
    b: &Dense<CudaExecutor, V>,
    beta: V,
    x: &mut Dense<CudaExecutor, V>,
) -> Result<()> {
    use num_traits::Zero;
    let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
    let b_ref = b.clone_to::<ReferenceExecutor>(&ref_device())?;
    let mut x_ref = stage_x(!beta.is_zero(), x)?;
    a_ref.apply_scaled(alpha, &b_ref, beta, &mut x_ref)?;
    write_back(&x_ref, x)
}

pub(super) fn sellp_spmv<V: Value, I: IndexType>(
    alpha: V,
    a: &Sellp<CudaExecutor, V, I>,
    b: &Dense<CudaExecutor, V>,
    beta: V,
    x: &mut Dense<CudaExecutor, V>,
) -> Result<()> {
    use num_traits::Zero;
    let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
    let b_ref = b.clone_to::<ReferenceExecutor>(&ref_device())?;
    let mut x_ref = stage_x(!beta.is_zero(), x)?;
    a_ref.apply_scaled(alpha, &b_ref, beta, &mut x_ref)?;
    write_back(&x_ref, x)
}

pub(super) fn spgemm<V: Value, I: IndexType>(
    alpha: V,
    a: &Csr<CudaExecutor, V, I>,
    b: &Csr<CudaExecutor, V, I>,
    beta_d: Option<(V, &Csr<CudaExecutor, V, I>)>,
) -> Result<Csr<CudaExecutor, V, I>> {
    let a_ref = a.clone_to::<ReferenceExecutor>(&ref_device())?;
    let b_ref = b.clone_to::<ReferenceExecutor>(&ref_device())?;
    let d_ref = beta_d
        .map(|(beta, d)| Ok::<_, crate::error::Error>((beta, d.clone_to::<ReferenceExecutor>(&ref_device())?)))
        .transpose()?;
    let c_ref = spgemm_host(
        alpha,
        &a_ref,
        &b_ref,
        d_ref.as_ref().map(|(beta, d)| (*beta, d)),
    )?;
    c_ref.clone_to::<CudaExecutor>(a.device())
}
