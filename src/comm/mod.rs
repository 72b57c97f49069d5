//! Collective communication
//!
//! The [`Communicator`] trait is the seam between the distributed
//! matrix layer and the transport. It exposes exactly the collective
//! set the distributed operations need: all-gather, all-reduce with
//! sum/min/max, gatherv, scatterv, point-to-point send/recv, and a
//! barrier. Every collective must be entered by all ranks in the same
//! order; collectives are barriers, so no partial results are visible.
//!
//! [`LocalComm`](local::LocalComm) is the in-process implementation
//! used for tests and single-node runs; a wire transport (e.g. MPI) is
//! a drop-in implementation of the same trait with identical
//! semantics.

pub mod local;

pub use local::LocalComm;

use crate::dtype::{Complex32, Complex64, Element};
use crate::error::Result;

/// Elementwise reduction applied by [`Communicator::all_reduce`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    /// Elementwise sum
    Sum,
    /// Elementwise minimum
    Min,
    /// Elementwise maximum
    Max,
}

/// Element types a communicator can reduce
pub trait CommReduce: Element {
    /// Combine two values, or `None` when the op is undefined for the
    /// type (min/max on complex values)
    fn reduce(op: ReduceOp, a: Self, b: Self) -> Option<Self>;
}

macro_rules! impl_comm_reduce_ordered {
    ($($t:ty),*) => {$(
        impl CommReduce for $t {
            #[inline]
            fn reduce(op: ReduceOp, a: Self, b: Self) -> Option<Self> {
                Some(match op {
                    ReduceOp::Sum => a + b,
                    ReduceOp::Min => if b < a { b } else { a },
                    ReduceOp::Max => if b > a { b } else { a },
                })
            }
        }
    )*};
}

impl_comm_reduce_ordered!(f32, f64, i32, i64);

macro_rules! impl_comm_reduce_complex {
    ($($t:ty),*) => {$(
        impl CommReduce for $t {
            #[inline]
            fn reduce(op: ReduceOp, a: Self, b: Self) -> Option<Self> {
                match op {
                    ReduceOp::Sum => Some(a + b),
                    ReduceOp::Min | ReduceOp::Max => None,
                }
            }
        }
    )*};
}

impl_comm_reduce_complex!(Complex32, Complex64);

/// A group of ranks exchanging data through collectives
pub trait Communicator: Clone + Send + Sync + 'static {
    /// This process's rank in `[0, size)`
    fn rank(&self) -> usize;

    /// Number of ranks in the group
    fn size(&self) -> usize;

    /// Block until every rank has entered the barrier
    fn barrier(&self) -> Result<()>;

    /// Gather every rank's buffer on every rank, indexed by rank
    fn all_gather_v<T: Element>(&self, send: &[T]) -> Result<Vec<Vec<T>>>;

    /// Elementwise reduction of equal-length buffers on every rank
    fn all_reduce<T: CommReduce>(&self, op: ReduceOp, send: &[T]) -> Result<Vec<T>>;

    /// Gather every rank's buffer on `root`; other ranks get `None`
    fn gather_v<T: Element>(&self, root: usize, send: &[T]) -> Result<Option<Vec<Vec<T>>>>;

    /// Scatter per-rank buffers from `root`; non-root ranks pass `None`
    fn scatter_v<T: Element>(&self, root: usize, chunks: Option<Vec<Vec<T>>>) -> Result<Vec<T>>;

    /// Point-to-point send
    fn send<T: Element>(&self, to: usize, data: &[T]) -> Result<()>;

    /// Point-to-point receive, blocking
    fn recv<T: Element>(&self, from: usize) -> Result<Vec<T>>;
}
