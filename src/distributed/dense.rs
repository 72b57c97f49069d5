//! Row-partitioned dense matrices and multivectors

use super::partition::RowPartition;
use crate::comm::{CommReduce, Communicator, ReduceOp};
use crate::dim::Dim2;
use crate::dtype::Value;
use crate::error::{Error, Result};
use crate::executor::distributed::DistributedExecutor;
use crate::executor::Executor;
use crate::linop::LinOp;
use crate::matrix::dense::Dense;
use num_traits::Zero;

/// Dense matrix distributed by rows over a communicator
///
/// Each rank stores the rows its index set names, in increasing global
/// order. Multivectors (right-hand sides, solutions) are the `cols > 1`
/// case of the same type.
pub struct DistributedDense<C: Communicator, E: Executor, V: Value> {
    pub(crate) exec: DistributedExecutor<C, E>,
    pub(crate) global_size: Dim2,
    pub(crate) partition: RowPartition,
    pub(crate) local: Dense<E, V>,
}

impl<C: Communicator, E: Executor, V: Value> DistributedDense<C, E, V> {
    /// Wrap this rank's local rows
    pub fn from_local(
        exec: DistributedExecutor<C, E>,
        global_size: Dim2,
        partition: RowPartition,
        local: Dense<E, V>,
    ) -> Result<Self> {
        validate_partition(&exec, global_size.rows, &partition)?;
        let owned = partition.rank_rows(exec.rank()).total();
        let expected = Dim2::new(owned, global_size.cols);
        if local.size() != expected {
            return Err(Error::dim_mismatch(
                "distributed_dense::from_local",
                expected,
                local.size(),
            ));
        }
        Ok(Self {
            exec,
            global_size,
            partition,
            local,
        })
    }

    /// Scatter a root-resident matrix across the partition
    ///
    /// `data` is read on the root rank only; other ranks pass `None`.
    pub fn distribute(
        exec: DistributedExecutor<C, E>,
        partition: RowPartition,
        data: Option<&Dense<E, V>>,
        device: &E::Device,
    ) -> Result<Self> {
        validate_partition(&exec, partition.global_rows(), &partition)?;
        let root = exec.root_rank();
        let comm = exec.communicator().clone();

        // the root announces the column count, then scatters each
        // rank's rows in index-set order
        let cols = if comm.rank() == root {
            let data = data.ok_or_else(|| {
                Error::not_supported("distributed_dense::distribute", "root rank passed no data")
            })?;
            if data.size().rows != partition.global_rows() {
                return Err(Error::dim_mismatch(
                    "distributed_dense::distribute",
                    Dim2::new(partition.global_rows(), data.size().cols),
                    data.size(),
                ));
            }
            vec![data.size().cols as i64]
        } else {
            vec![]
        };
        let cols = comm.all_gather_v(&cols)?[root][0] as usize;

        let chunks = if comm.rank() == root {
            let host = data.unwrap().to_row_major_vec();
            let mut chunks = Vec::with_capacity(comm.size());
            for rank in 0..comm.size() {
                let mut chunk = Vec::with_capacity(partition.rank_rows(rank).total() * cols);
                for row in partition.rank_rows(rank).iter() {
                    chunk.extend_from_slice(&host[row * cols..(row + 1) * cols]);
                }
                chunks.push(chunk);
            }
            Some(chunks)
        } else {
            None
        };
        let mine = comm.scatter_v(root, chunks)?;

        let owned = partition.rank_rows(comm.rank()).total();
        let local = Dense::from_slice(Dim2::new(owned, cols), &mine, device)?;
        let global_size = Dim2::new(partition.global_rows(), cols);
        Self::from_local(exec, global_size, partition, local)
    }

    /// Global dimension
    #[inline]
    pub fn global_size(&self) -> Dim2 {
        self.global_size
    }

    /// This rank's rows
    #[inline]
    pub fn local(&self) -> &Dense<E, V> {
        &self.local
    }

    /// Mutable access to this rank's rows
    #[inline]
    pub fn local_mut(&mut self) -> &mut Dense<E, V> {
        &mut self.local
    }

    /// The row partition
    #[inline]
    pub fn partition(&self) -> &RowPartition {
        &self.partition
    }

    /// The distributed executor
    #[inline]
    pub fn executor(&self) -> &DistributedExecutor<C, E> {
        &self.exec
    }

    /// Assemble the full matrix on every rank
    pub fn gather_on_all(&self) -> Result<Dense<E, V>> {
        let pieces = self
            .exec
            .communicator()
            .all_gather_v(&self.local.to_row_major_vec())?;
        self.assemble(pieces)
    }

    /// Assemble the full matrix on the root rank
    pub fn gather_on_root(&self) -> Result<Option<Dense<E, V>>> {
        let pieces = self
            .exec
            .communicator()
            .gather_v(self.exec.root_rank(), &self.local.to_row_major_vec())?;
        pieces.map(|pieces| self.assemble(pieces)).transpose()
    }

    fn assemble(&self, pieces: Vec<Vec<V>>) -> Result<Dense<E, V>> {
        let cols = self.global_size.cols;
        let mut host = vec![V::zero(); self.global_size.count()];
        for (rank, piece) in pieces.iter().enumerate() {
            for (local_row, global_row) in self.partition.rank_rows(rank).iter().enumerate() {
                host[global_row * cols..(global_row + 1) * cols]
                    .copy_from_slice(&piece[local_row * cols..(local_row + 1) * cols]);
            }
        }
        // column count and stride carry over from the local storage
        let stride = self.local.stride().max(cols);
        let mut padded = vec![V::zero(); self.global_size.rows * stride];
        for r in 0..self.global_size.rows {
            padded[r * stride..r * stride + cols].copy_from_slice(&host[r * cols..(r + 1) * cols]);
        }
        let values = crate::array::Array::from_slice(&padded, self.local.device())?;
        Dense::from_array(self.global_size, stride, values)
    }

}

impl<C: Communicator, E: Executor, V: Value + CommReduce> DistributedDense<C, E, V> {
    /// Per-column dot products reduced over all ranks
    pub fn compute_dot(&self, other: &Self) -> Result<Vec<V>> {
        self.dot_impl(false, other)
    }

    /// Per-column conjugated dot products reduced over all ranks
    pub fn compute_conj_dot(&self, other: &Self) -> Result<Vec<V>> {
        self.dot_impl(true, other)
    }

    fn dot_impl(&self, conjugate: bool, other: &Self) -> Result<Vec<V>> {
        if other.global_size != self.global_size {
            return Err(Error::dim_mismatch(
                "distributed_dense::compute_dot",
                self.global_size,
                other.global_size,
            ));
        }
        let local = if conjugate {
            self.local.compute_conj_dot(&other.local)?
        } else {
            self.local.compute_dot(&other.local)?
        };
        self.exec
            .communicator()
            .all_reduce(ReduceOp::Sum, &local.to_row_major_vec())
    }

    /// Per-column Euclidean norms reduced over all ranks
    ///
    /// Squared magnitudes are summed across ranks; the square root is
    /// taken locally after the reduction.
    pub fn compute_norm2(&self) -> Result<Vec<V::Real>> {
        let squares = self.compute_conj_dot(self)?;
        Ok(squares
            .into_iter()
            .map(|v| V::real_from_f64(v.abs().sqrt()))
            .collect())
    }
}

impl<C: Communicator, E: Executor, V: Value> DistributedDense<C, E, V> {
    /// `x = alpha * A * b + beta * x` with a dense local block
    ///
    /// When `b` is already replicated use
    /// [`apply_replicated`](Self::apply_replicated); otherwise `b` is
    /// gathered across all ranks first and `x` stays row-partitioned.
    pub fn apply_scaled(
        &self,
        alpha: V,
        b: &DistributedDense<C, E, V>,
        beta: V,
        x: &mut DistributedDense<C, E, V>,
    ) -> Result<()> {
        let full_b = b.gather_on_all()?;
        self.apply_replicated_scaled(alpha, &full_b, beta, x)
    }

    /// `x = A * b`
    pub fn apply(
        &self,
        b: &DistributedDense<C, E, V>,
        x: &mut DistributedDense<C, E, V>,
    ) -> Result<()> {
        self.apply_scaled(V::one(), b, V::zero(), x)
    }

    /// Apply with a replicated right-hand side
    pub fn apply_replicated_scaled(
        &self,
        alpha: V,
        b: &Dense<E, V>,
        beta: V,
        x: &mut DistributedDense<C, E, V>,
    ) -> Result<()> {
        if x.partition != self.partition {
            return Err(Error::not_supported(
                "distributed_dense::apply",
                "output partition differs from the operator's row partition",
            ));
        }
        self.local.apply_scaled(alpha, b, beta, &mut x.local)
    }
}

/// Shared construction-time checks for distributed objects
pub(crate) fn validate_partition<C: Communicator, E: Executor>(
    exec: &DistributedExecutor<C, E>,
    global_rows: usize,
    partition: &RowPartition,
) -> Result<()> {
    if partition.num_ranks() != exec.num_ranks() {
        return Err(Error::not_supported(
            "distributed::create",
            format!(
                "partition has {} ranks, communicator has {}",
                partition.num_ranks(),
                exec.num_ranks()
            ),
        ));
    }
    if partition.global_rows() != global_rows {
        return Err(Error::value_mismatch(format!(
            "partition covers {} rows, object has {}",
            partition.global_rows(),
            global_rows
        )));
    }
    Ok(())
}
