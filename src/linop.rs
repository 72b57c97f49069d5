//! The abstract linear operator contract
//!
//! Every matrix format implements [`LinOp`]; solvers and preconditioner
//! drivers program against it. `apply(b, x)` computes `x = A * b`,
//! `apply_scaled(alpha, b, beta, x)` computes `x = alpha * A * b + beta * x`.

use crate::dim::Dim2;
use crate::dtype::Value;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::matrix::dense::Dense;
use crate::matrix::permutation::Permutation;

/// Abstract linear operator
pub trait LinOp<E: Executor, V: Value> {
    /// Operator dimension `(rows, cols)`
    fn size(&self) -> Dim2;

    /// `x = A * b`
    fn apply(&self, b: &Dense<E, V>, x: &mut Dense<E, V>) -> Result<()> {
        self.apply_scaled(V::one(), b, V::zero(), x)
    }

    /// `x = alpha * A * b + beta * x`
    fn apply_scaled(&self, alpha: V, b: &Dense<E, V>, beta: V, x: &mut Dense<E, V>) -> Result<()>;
}

/// Operators that can produce their (conjugate) transpose
pub trait Transposable {
    /// The transposed operator type
    type Output;

    /// `A^T`
    fn transpose(&self) -> Result<Self::Output>;

    /// `A^H` (equal to `A^T` for real value types)
    fn conj_transpose(&self) -> Result<Self::Output>;
}

/// Operators that can be row- and column-permuted
pub trait Permutable<E: Executor, I: crate::dtype::IndexType>: Sized {
    /// `P * A` (reorder rows by `perm`)
    fn row_permute(&self, perm: &Permutation<E, I>) -> Result<Self>;

    /// `A * P` (reorder columns by `perm`)
    fn column_permute(&self, perm: &Permutation<E, I>) -> Result<Self>;

    /// `P^-1 * A`
    fn inverse_row_permute(&self, perm: &Permutation<E, I>) -> Result<Self>;

    /// `A * P^-1`
    fn inverse_column_permute(&self, perm: &Permutation<E, I>) -> Result<Self>;
}

/// Operators that expose their diagonal
pub trait DiagonalExtractable<E: Executor, V: Value> {
    /// The main diagonal as a `min(rows, cols) x 1` column
    fn extract_diagonal(&self) -> Result<Dense<E, V>>;
}

/// Validate the shapes of an `apply`: `b` is `(cols, n)`, `x` is `(rows, n)`
pub(crate) fn validate_apply_dims<E: Executor, V: Value>(
    op: &'static str,
    size: Dim2,
    b: &Dense<E, V>,
    x: &Dense<E, V>,
) -> Result<()> {
    if b.size().rows != size.cols {
        return Err(Error::dim_mismatch(
            op,
            Dim2::new(size.cols, b.size().cols),
            b.size(),
        ));
    }
    if x.size().rows != size.rows || x.size().cols != b.size().cols {
        return Err(Error::dim_mismatch(
            op,
            Dim2::new(size.rows, b.size().cols),
            x.size(),
        ));
    }
    Ok(())
}
