//! Row-partitioned CSR matrices

use super::dense::{validate_partition, DistributedDense};
use super::partition::RowPartition;
use crate::comm::Communicator;
use crate::dim::Dim2;
use crate::dtype::{IndexType, Value};
use crate::error::{Error, Result};
use crate::executor::distributed::DistributedExecutor;
use crate::executor::Executor;
use crate::linop::LinOp;
use crate::matrix::csr::Csr;
use crate::matrix::dense::Dense;
use crate::matrix_data::MatrixData;

/// CSR matrix distributed by rows over a communicator
///
/// Each rank stores the rows its index set names as a local CSR block
/// spanning all global columns.
pub struct DistributedCsr<C: Communicator, E: Executor, V: Value, I: IndexType = i64> {
    pub(crate) exec: DistributedExecutor<C, E>,
    pub(crate) global_size: Dim2,
    pub(crate) partition: RowPartition,
    pub(crate) local: Csr<E, V, I>,
}

impl<C: Communicator, E: Executor, V: Value, I: IndexType> DistributedCsr<C, E, V, I> {
    /// Wrap this rank's local rows
    pub fn from_local(
        exec: DistributedExecutor<C, E>,
        global_size: Dim2,
        partition: RowPartition,
        local: Csr<E, V, I>,
    ) -> Result<Self> {
        validate_partition(&exec, global_size.rows, &partition)?;
        let owned = partition.rank_rows(exec.rank()).total();
        let expected = Dim2::new(owned, global_size.cols);
        if local.size() != expected {
            return Err(Error::dim_mismatch(
                "distributed_csr::from_local",
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

    /// Distribute root-resident assembly data across the partition
    pub fn distribute(
        exec: DistributedExecutor<C, E>,
        partition: RowPartition,
        data: Option<&MatrixData<V, I>>,
        device: &E::Device,
    ) -> Result<Self> {
        validate_partition(&exec, partition.global_rows(), &partition)?;
        let root = exec.root_rank();
        let comm = exec.communicator().clone();

        let (cols_msg, row_chunks, col_chunks, val_chunks) = if comm.rank() == root {
            let data = data.ok_or_else(|| {
                Error::not_supported("distributed_csr::distribute", "root rank passed no data")
            })?;
            data.validate()?;
            let mut sorted = data.clone();
            sorted.sum_duplicates();
            let mut rows = vec![Vec::new(); comm.size()];
            let mut cols = vec![Vec::new(); comm.size()];
            let mut vals = vec![Vec::new(); comm.size()];
            for entry in &sorted.nonzeros {
                let global_row = entry.row.as_usize();
                let rank = partition.owner_of(global_row);
                let local_row = partition
                    .rank_rows(rank)
                    .local_position(global_row)
                    .expect("owner_of and local_position agree");
                rows[rank].push(I::from_usize(local_row));
                cols[rank].push(entry.col);
                vals[rank].push(entry.value);
            }
            (
                vec![sorted.size.cols as i64],
                Some(rows),
                Some(cols),
                Some(vals),
            )
        } else {
            (vec![], None, None, None)
        };
        let cols = comm.all_gather_v(&cols_msg)?[root][0] as usize;

        let my_rows = comm.scatter_v(root, row_chunks)?;
        let my_cols = comm.scatter_v(root, col_chunks)?;
        let my_vals = comm.scatter_v(root, val_chunks)?;

        let owned = partition.rank_rows(comm.rank()).total();
        let mut local_data = MatrixData::new(Dim2::new(owned, cols));
        for k in 0..my_vals.len() {
            local_data.push(my_rows[k], my_cols[k], my_vals[k]);
        }
        let local = Csr::read(&local_data, device)?;
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
    pub fn local(&self) -> &Csr<E, V, I> {
        &self.local
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

    /// `x = alpha * A * b + beta * x`
    ///
    /// A replicated `b` (same full copy on every rank) skips the
    /// gather; a row-partitioned `b` is all-gathered first. `x` stays
    /// row-partitioned by this matrix's partition.
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
                "distributed_csr::apply",
                "output partition differs from the operator's row partition",
            ));
        }
        self.local.apply_scaled(alpha, b, beta, x.local_mut())
    }

    /// Assemble the full matrix on every rank
    pub fn gather_on_all(&self) -> Result<Csr<E, V, I>> {
        let (rows, cols, vals) = self.local_triples();
        let all_rows = self.exec.communicator().all_gather_v(&rows)?;
        let all_cols = self.exec.communicator().all_gather_v(&cols)?;
        let all_vals = self.exec.communicator().all_gather_v(&vals)?;
        self.assemble(all_rows, all_cols, all_vals)
    }

    /// Assemble the full matrix on the root rank
    pub fn gather_on_root(&self) -> Result<Option<Csr<E, V, I>>> {
        let root = self.exec.root_rank();
        let (rows, cols, vals) = self.local_triples();
        let all_rows = self.exec.communicator().gather_v(root, &rows)?;
        let all_cols = self.exec.communicator().gather_v(root, &cols)?;
        let all_vals = self.exec.communicator().gather_v(root, &vals)?;
        match (all_rows, all_cols, all_vals) {
            (Some(rows), Some(cols), Some(vals)) => Ok(Some(self.assemble(rows, cols, vals)?)),
            _ => Ok(None),
        }
    }

    /// This rank's entries with global row indices
    fn local_triples(&self) -> (Vec<I>, Vec<I>, Vec<V>) {
        let data = self.local.write();
        let my_rows = self.partition.rank_rows(self.exec.rank());
        let mut rows = Vec::with_capacity(data.nnz());
        let mut cols = Vec::with_capacity(data.nnz());
        let mut vals = Vec::with_capacity(data.nnz());
        for entry in &data.nonzeros {
            let global = my_rows
                .global_index(entry.row.as_usize())
                .expect("local row inside the index set");
            rows.push(I::from_usize(global));
            cols.push(entry.col);
            vals.push(entry.value);
        }
        (rows, cols, vals)
    }

    fn assemble(
        &self,
        all_rows: Vec<Vec<I>>,
        all_cols: Vec<Vec<I>>,
        all_vals: Vec<Vec<V>>,
    ) -> Result<Csr<E, V, I>> {
        let mut data = MatrixData::new(self.global_size);
        for rank in 0..all_vals.len() {
            for k in 0..all_vals[rank].len() {
                data.push(all_rows[rank][k], all_cols[rank][k], all_vals[rank][k]);
            }
        }
        Csr::read(&data, self.local.device())
    }
}
