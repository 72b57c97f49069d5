//! Dense row-major matrices
//!
//! Entry `(r, c)` lives at `values[r * stride + c]` with `stride >= cols`.
//! Dense matrices feed the sparse routines: they are the right-hand sides
//! and outputs of every `apply`, and the reduction targets of dot and
//! norm kernels.

use crate::array::Array;
use crate::dim::Dim2;
use crate::dtype::{IndexType, Value};
use crate::error::{Error, Result};
use crate::executor::{Executor, HostAccessible, Operation};
use crate::kernels::DenseKernels;
use crate::linop::{
    validate_apply_dims, DiagonalExtractable, LinOp, Permutable, Transposable,
};
use crate::matrix::permutation::Permutation;
use crate::matrix_data::MatrixData;
use num_traits::Zero;

/// Dense row-major matrix
pub struct Dense<E: Executor, V: Value> {
    pub(crate) size: Dim2,
    pub(crate) stride: usize,
    pub(crate) values: Array<E, V>,
}

impl<E: Executor, V: Value> Dense<E, V> {
    /// Allocate a zero matrix with `stride == cols`
    pub fn new(size: Dim2, device: &E::Device) -> Result<Self> {
        Self::with_stride(size, size.cols, device)
    }

    /// Allocate a zero matrix with an explicit row stride
    pub fn with_stride(size: Dim2, stride: usize, device: &E::Device) -> Result<Self> {
        if stride < size.cols {
            return Err(Error::not_supported(
                "dense::with_stride",
                format!("stride {} smaller than {} columns", stride, size.cols),
            ));
        }
        let values = Array::zeros(size.rows * stride, device)?;
        Ok(Self {
            size,
            stride,
            values,
        })
    }

    /// Build from row-major host values (`data.len() == rows * cols`)
    pub fn from_slice(size: Dim2, data: &[V], device: &E::Device) -> Result<Self> {
        if data.len() != size.count() {
            return Err(Error::OutOfBounds {
                index: data.len(),
                size: size.count(),
            });
        }
        let values = Array::from_slice(data, device)?;
        Ok(Self {
            size,
            stride: size.cols,
            values,
        })
    }

    /// Wrap an existing array as a matrix (takes shared ownership)
    pub fn from_array(size: Dim2, stride: usize, values: Array<E, V>) -> Result<Self> {
        if stride < size.cols || values.len() < size.rows * stride {
            return Err(Error::OutOfBounds {
                index: size.rows * stride,
                size: values.len(),
            });
        }
        Ok(Self {
            size,
            stride,
            values,
        })
    }

    /// Matrix dimension
    #[inline]
    pub fn size(&self) -> Dim2 {
        self.size
    }

    /// Row stride
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The backing value array
    #[inline]
    pub fn values(&self) -> &Array<E, V> {
        &self.values
    }

    /// Mutable access to the backing value array
    #[inline]
    pub(crate) fn values_mut(&mut self) -> &mut Array<E, V> {
        &mut self.values
    }

    /// The device this matrix lives on
    #[inline]
    pub fn device(&self) -> &E::Device {
        self.values.device()
    }

    /// Read assembly data, overwriting this matrix's size and contents
    pub fn read<I: IndexType>(data: &MatrixData<V, I>, device: &E::Device) -> Result<Self> {
        data.validate()?;
        let mut host = vec![V::zero(); data.size.count()];
        for entry in &data.nonzeros {
            host[entry.row.as_usize() * data.size.cols + entry.col.as_usize()] = entry.value;
        }
        Self::from_slice(data.size, &host, device)
    }

    /// Write the non-zero entries as assembly data
    pub fn write<I: IndexType>(&self) -> MatrixData<V, I> {
        let host = self.to_row_major_vec();
        let mut data = MatrixData::new(self.size);
        for r in 0..self.size.rows {
            for c in 0..self.size.cols {
                let v = host[r * self.size.cols + c];
                if !v.is_zero() {
                    data.push(I::from_usize(r), I::from_usize(c), v);
                }
            }
        }
        data
    }

    /// Host copy of the logical entries, row-major without stride padding
    pub fn to_row_major_vec(&self) -> Vec<V> {
        let raw = self.values.to_vec();
        if self.stride == self.size.cols && raw.len() == self.size.count() {
            return raw;
        }
        let mut out = Vec::with_capacity(self.size.count());
        for r in 0..self.size.rows {
            out.extend_from_slice(&raw[r * self.stride..r * self.stride + self.size.cols]);
        }
        out
    }

    /// Copy this matrix to another executor
    pub fn clone_to<E2: Executor>(&self, device: &E2::Device) -> Result<Dense<E2, V>> {
        Dense::from_slice(self.size, &self.to_row_major_vec(), device)
    }

    /// `self *= alpha`
    pub fn scale(&mut self, alpha: V) -> Result<()> {
        let device = self.values.device().clone();
        let client = E::client(&device);
        client.dense_scale(alpha, self)
    }

    /// `self /= alpha`
    pub fn inv_scale(&mut self, alpha: V) -> Result<()> {
        self.scale(V::one() / alpha)
    }

    /// `self += alpha * b`
    pub fn add_scaled(&mut self, alpha: V, b: &Dense<E, V>) -> Result<()> {
        if b.size != self.size {
            return Err(Error::dim_mismatch("dense::add_scaled", self.size, b.size));
        }
        let device = self.values.device().clone();
        let client = E::client(&device);
        client.dense_add_scaled(alpha, b, self)
    }

    /// Per-column dot products `out[c] = self[:,c] . b[:,c]` as `1 x cols`
    pub fn compute_dot(&self, b: &Dense<E, V>) -> Result<Dense<E, V>> {
        self.dot_impl(false, b)
    }

    /// Per-column conjugated dot products `out[c] = conj(self[:,c]) . b[:,c]`
    pub fn compute_conj_dot(&self, b: &Dense<E, V>) -> Result<Dense<E, V>> {
        self.dot_impl(true, b)
    }

    fn dot_impl(&self, conjugate: bool, b: &Dense<E, V>) -> Result<Dense<E, V>> {
        if b.size != self.size {
            return Err(Error::dim_mismatch("dense::compute_dot", self.size, b.size));
        }
        let device = self.device().clone();
        let mut out = Dense::new(Dim2::new(1, self.size.cols), &device)?;
        let client = E::client(&device);
        client.dense_dot(conjugate, self, b, &mut out)?;
        Ok(out)
    }

    /// Per-column Euclidean norms as a real `1 x cols` matrix
    pub fn compute_norm2(&self) -> Result<Dense<E, V::Real>> {
        let device = self.device().clone();
        let mut out = Dense::new(Dim2::new(1, self.size.cols), &device)?;
        let client = E::client(&device);
        client.dense_norm2(self, &mut out)?;
        Ok(out)
    }
}

impl<E: HostAccessible, V: Value> Dense<E, V> {
    /// Mutable slice over the backing values (host-addressable only)
    #[inline]
    pub(crate) fn values_mut_slice(&mut self) -> &mut [V] {
        self.values.as_mut_slice()
    }

    /// Entry `(r, c)` (host-addressable executors only)
    #[inline]
    pub fn at(&self, r: usize, c: usize) -> V {
        debug_assert!(r < self.size.rows && c < self.size.cols);
        self.values.as_slice()[r * self.stride + c]
    }

    /// Overwrite entry `(r, c)`
    #[inline]
    pub fn set(&mut self, r: usize, c: usize, value: V) {
        debug_assert!(r < self.size.rows && c < self.size.cols);
        self.values.as_mut_slice()[r * self.stride + c] = value;
    }
}

impl<E: Executor, V: Value> LinOp<E, V> for Dense<E, V> {
    fn size(&self) -> Dim2 {
        self.size
    }

    fn apply_scaled(&self, alpha: V, b: &Dense<E, V>, beta: V, x: &mut Dense<E, V>) -> Result<()> {
        validate_apply_dims("dense::apply", self.size, b, x)?;
        let client = E::client(self.device());
        E::run(Operation::new("dense::apply").on_all(|| client.dense_apply(alpha, self, b, beta, x)))
    }
}

impl<E: Executor, V: Value> Transposable for Dense<E, V> {
    type Output = Dense<E, V>;

    fn transpose(&self) -> Result<Self> {
        self.transpose_impl(false)
    }

    fn conj_transpose(&self) -> Result<Self> {
        self.transpose_impl(true)
    }
}

impl<E: Executor, V: Value> Dense<E, V> {
    fn transpose_impl(&self, conjugate: bool) -> Result<Self> {
        let host = self.to_row_major_vec();
        let t_size = self.size.transposed();
        let mut out = vec![V::zero(); t_size.count()];
        for r in 0..self.size.rows {
            for c in 0..self.size.cols {
                let v = host[r * self.size.cols + c];
                out[c * t_size.cols + r] = if conjugate { v.conj() } else { v };
            }
        }
        Self::from_slice(t_size, &out, self.device())
    }

    fn permute_impl<I: IndexType>(
        &self,
        perm: &Permutation<E, I>,
        rows: bool,
        invert: bool,
    ) -> Result<Self> {
        let expected = if rows { self.size.rows } else { self.size.cols };
        if perm.len() != expected {
            return Err(Error::OutOfBounds {
                index: perm.len(),
                size: expected,
            });
        }
        let idx = if invert {
            perm.inverse()?.to_host_indices()
        } else {
            perm.to_host_indices()
        };
        let host = self.to_row_major_vec();
        let cols = self.size.cols;
        let mut out = vec![V::zero(); self.size.count()];
        if rows {
            for (dst, &src) in idx.iter().enumerate() {
                let src = src.as_usize();
                out[dst * cols..(dst + 1) * cols]
                    .copy_from_slice(&host[src * cols..(src + 1) * cols]);
            }
        } else {
            for r in 0..self.size.rows {
                for (dst, &src) in idx.iter().enumerate() {
                    out[r * cols + dst] = host[r * cols + src.as_usize()];
                }
            }
        }
        Self::from_slice(self.size, &out, self.device())
    }
}

impl<E: Executor, V: Value, I: IndexType> Permutable<E, I> for Dense<E, V> {
    fn row_permute(&self, perm: &Permutation<E, I>) -> Result<Self> {
        self.permute_impl(perm, true, false)
    }

    fn column_permute(&self, perm: &Permutation<E, I>) -> Result<Self> {
        self.permute_impl(perm, false, false)
    }

    fn inverse_row_permute(&self, perm: &Permutation<E, I>) -> Result<Self> {
        self.permute_impl(perm, true, true)
    }

    fn inverse_column_permute(&self, perm: &Permutation<E, I>) -> Result<Self> {
        self.permute_impl(perm, false, true)
    }
}

impl<E: Executor, V: Value> DiagonalExtractable<E, V> for Dense<E, V> {
    fn extract_diagonal(&self) -> Result<Dense<E, V>> {
        let n = self.size.rows.min(self.size.cols);
        let host = self.to_row_major_vec();
        let diag: Vec<V> = (0..n).map(|i| host[i * self.size.cols + i]).collect();
        Dense::from_slice(Dim2::new(n, 1), &diag, self.device())
    }
}

impl<E: Executor, V: Value> Clone for Dense<E, V> {
    fn clone(&self) -> Self {
        self.clone_to::<E>(self.device()).expect("dense clone failed")
    }
}

impl<E: Executor, V: Value> std::fmt::Debug for Dense<E, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dense")
            .field("size", &self.size)
            .field("stride", &self.stride)
            .field("executor", &E::name())
            .finish()
    }
}
