//! Row-partitioned matrices over a communicator
//!
//! A distributed object wraps a communicator handle, a global size, a
//! row partition, and this rank's local block. Apply gathers the
//! right-hand side when it is not replicated; reductions combine local
//! results with an all-reduce. Collectives are barriers, so no rank
//! observes partial results.

mod csr;
mod dense;
pub mod partition;

pub use csr::DistributedCsr;
pub use dense::DistributedDense;
pub use partition::{IndexSet, RowPartition};
