//! Block Jacobi preconditioner core
//!
//! Detects the block-diagonal structure of a CSR matrix, inverts each
//! diagonal block, and applies the inverses block-wise. Blocks are
//! packed contiguously with per-block offsets. With adaptive precision
//! enabled, well-conditioned blocks are stored rounded through single
//! precision.

use super::{inf_norm, invert_dense};
use crate::dim::Dim2;
use crate::dtype::{IndexType, Value};
use crate::error::{Error, Result};
use crate::executor::HostAccessible;
use crate::linop::{validate_apply_dims, LinOp};
use crate::matrix::csr::Csr;
use crate::matrix::dense::Dense;
use num_traits::Zero;
use smallvec::SmallVec;

/// Storage precision of one inverted block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPrecision {
    /// Full value-type precision
    Full,
    /// Rounded through single precision
    Reduced,
}

/// Condition-number bound under which a block tolerates reduced storage
const ADAPTIVE_COND_LIMIT: f64 = 1.0e3;

/// Block Jacobi preconditioner: packed inverted diagonal blocks
pub struct BlockJacobi<E: HostAccessible, V: Value, I: IndexType = i64> {
    size: Dim2,
    block_ptrs: Vec<usize>,
    block_offsets: Vec<usize>,
    blocks: Vec<V>,
    precisions: Vec<BlockPrecision>,
    max_block_size: usize,
    _marker: std::marker::PhantomData<(E, I)>,
}

impl<E: HostAccessible, V: Value, I: IndexType> BlockJacobi<E, V, I> {
    /// Generate with automatically detected natural blocks
    pub fn build(a: &Csr<E, V, I>, max_block_size: usize, adaptive: bool) -> Result<Self> {
        let block_ptrs = find_blocks(a, max_block_size)?;
        Self::build_with_blocks(a, block_ptrs, adaptive)
    }

    /// Generate with caller-supplied block boundaries
    pub fn build_with_blocks(
        a: &Csr<E, V, I>,
        block_ptrs: Vec<usize>,
        adaptive: bool,
    ) -> Result<Self> {
        if !a.size().is_square() {
            return Err(Error::not_supported(
                "block_jacobi::generate",
                format!("matrix is {}", a.size()),
            ));
        }
        validate_block_ptrs(&block_ptrs, a.size().rows)?;
        let row_ptrs = a.row_ptrs().as_slice();
        let col_idxs = a.col_idxs().as_slice();
        let values = a.values().as_slice();

        let num_blocks = block_ptrs.len() - 1;
        let mut block_offsets = Vec::with_capacity(num_blocks + 1);
        let mut blocks = Vec::new();
        let mut precisions = Vec::with_capacity(num_blocks);
        let mut max_block_size = 0;
        block_offsets.push(0);

        for b in 0..num_blocks {
            let begin = block_ptrs[b];
            let end = block_ptrs[b + 1];
            let n = end - begin;
            max_block_size = max_block_size.max(n);

            // extract the dense diagonal block
            let mut dense = vec![V::zero(); n * n];
            for (local, row) in (begin..end).enumerate() {
                for k in row_ptrs[row].as_usize()..row_ptrs[row + 1].as_usize() {
                    let col = col_idxs[k].as_usize();
                    if begin <= col && col < end {
                        dense[local * n + (col - begin)] = values[k];
                    }
                }
            }

            let (mut inv, input_norm) = invert_dense(&dense, n)?;
            let precision = if adaptive {
                let cond = input_norm * inf_norm(&inv, n);
                if cond <= ADAPTIVE_COND_LIMIT {
                    round_to_reduced(&mut inv);
                    BlockPrecision::Reduced
                } else {
                    BlockPrecision::Full
                }
            } else {
                BlockPrecision::Full
            };

            blocks.extend_from_slice(&inv);
            block_offsets.push(blocks.len());
            precisions.push(precision);
        }

        Ok(Self {
            size: a.size(),
            block_ptrs,
            block_offsets,
            blocks,
            precisions,
            max_block_size,
            _marker: std::marker::PhantomData,
        })
    }

    /// Number of blocks
    pub fn num_blocks(&self) -> usize {
        self.block_ptrs.len() - 1
    }

    /// The largest block extent
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Row boundaries of the blocks
    pub fn block_ptrs(&self) -> &[usize] {
        &self.block_ptrs
    }

    /// Storage precision chosen for each block
    pub fn precisions(&self) -> &[BlockPrecision] {
        &self.precisions
    }

    /// The inverted block `b` as a row-major slice
    pub fn block(&self, b: usize) -> &[V] {
        &self.blocks[self.block_offsets[b]..self.block_offsets[b + 1]]
    }
}

impl<E: HostAccessible, V: Value, I: IndexType> LinOp<E, V> for BlockJacobi<E, V, I> {
    fn size(&self) -> Dim2 {
        self.size
    }

    fn apply_scaled(&self, alpha: V, b: &Dense<E, V>, beta: V, x: &mut Dense<E, V>) -> Result<()> {
        validate_apply_dims("block_jacobi::apply", self.size, b, x)?;
        let nrhs = b.size().cols;
        let b_stride = b.stride();
        let b_vals = b.values().as_slice();
        let x_stride = x.stride();
        let x_vals = x.values_mut_slice();

        for block in 0..self.num_blocks() {
            let begin = self.block_ptrs[block];
            let n = self.block_ptrs[block + 1] - begin;
            let inv = &self.blocks[self.block_offsets[block]..self.block_offsets[block + 1]];
            for local in 0..n {
                for c in 0..nrhs {
                    let mut sum = V::zero();
                    for j in 0..n {
                        sum += inv[local * n + j] * b_vals[(begin + j) * b_stride + c];
                    }
                    let out = &mut x_vals[(begin + local) * x_stride + c];
                    *out = if beta.is_zero() {
                        alpha * sum
                    } else {
                        alpha * sum + beta * *out
                    };
                }
            }
        }
        Ok(())
    }
}

/// Round every entry through single precision
fn round_to_reduced<V: Value>(values: &mut [V]) {
    for v in values.iter_mut() {
        // lossy round-trip through the reduced exponent/mantissa range
        *v = reduce_precision(*v);
    }
}

fn reduce_precision<V: Value>(v: V) -> V {
    // real and imaginary parts round independently; for real types the
    // imaginary part is zero and drops out
    let abs = v.abs();
    if abs == 0.0 {
        return v;
    }
    let rounded_abs = f64::from(abs as f32);
    let scale = rounded_abs / abs;
    v * V::from_f64(scale)
}

/// Detect natural blocks: runs of consecutive rows with identical
/// sparsity pattern, agglomerated while the merged extent stays within
/// `max_block_size`
pub fn find_blocks<E: HostAccessible, V: Value, I: IndexType>(
    a: &Csr<E, V, I>,
    max_block_size: usize,
) -> Result<Vec<usize>> {
    if max_block_size == 0 {
        return Err(Error::not_supported(
            "block_jacobi::find_blocks",
            "max_block_size must be positive",
        ));
    }
    let rows = a.size().rows;
    let row_ptrs = a.row_ptrs().as_slice();
    let col_idxs = a.col_idxs().as_slice();

    let row_pattern = |r: usize| -> &[I] {
        &col_idxs[row_ptrs[r].as_usize()..row_ptrs[r + 1].as_usize()]
    };

    // natural runs of identical patterns, capped at the block limit
    let mut natural: SmallVec<[usize; 16]> = SmallVec::new();
    natural.push(0);
    let mut run_start = 0;
    for r in 1..rows {
        let same = row_pattern(r) == row_pattern(run_start);
        if !same || r - run_start >= max_block_size {
            natural.push(r);
            run_start = r;
        }
    }
    natural.push(rows);

    // agglomerate adjacent small runs
    let mut block_ptrs = Vec::with_capacity(natural.len());
    block_ptrs.push(0);
    let mut current = 0;
    for w in natural.windows(2) {
        let candidate_end = w[1];
        if candidate_end - current > max_block_size {
            block_ptrs.push(w[0]);
            current = w[0];
        }
    }
    if *block_ptrs.last().unwrap() != rows {
        block_ptrs.push(rows);
    }
    Ok(block_ptrs)
}

fn validate_block_ptrs(block_ptrs: &[usize], rows: usize) -> Result<()> {
    if block_ptrs.first() != Some(&0) || block_ptrs.last() != Some(&rows) {
        return Err(Error::value_mismatch(
            "block pointers must start at zero and end at the row count",
        ));
    }
    if block_ptrs.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Error::value_mismatch("block pointers must increase"));
    }
    Ok(())
}
