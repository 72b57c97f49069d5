//! CSR kernel-selection strategies
//!
//! A strategy names the SpMV kernel family used for a matrix and carries
//! the auxiliary `srow` table when the family needs one. `Automatical`
//! resolves to a concrete family at dispatch time from row-length
//! statistics and the executing device's shape.

use crate::dtype::IndexType;
use crate::executor::Parallelism;

/// Kernel family for CSR SpMV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsrStrategy {
    /// One worker per row, uniform loop
    Classical,
    /// Even non-zeros per worker via the `srow` table, with merged
    /// partial sums for rows split across workers
    LoadBalance,
    /// One merge path through `(row_ptrs, values)` balancing rows and
    /// non-zeros per worker
    MergePath,
    /// Delegate to the vendor sparse library through the executor's
    /// handle; host executors fall back to `Classical`
    Sparselib,
    /// Pick among the above from row-length statistics
    #[default]
    Automatical,
}

/// Matrices with at least this many non-zeros prefer the vendor library
/// when a handle is available
pub(crate) const SPARSELIB_NNZ_THRESHOLD: usize = 1 << 20;

/// Mean and standard deviation of the per-row non-zero counts
pub(crate) fn row_length_stats<I: IndexType>(row_ptrs: &[I]) -> (f64, f64) {
    let rows = row_ptrs.len().saturating_sub(1);
    if rows == 0 {
        return (0.0, 0.0);
    }
    let mut mean = 0.0f64;
    for r in 0..rows {
        mean += (row_ptrs[r + 1].as_usize() - row_ptrs[r].as_usize()) as f64;
    }
    mean /= rows as f64;
    let mut var = 0.0f64;
    for r in 0..rows {
        let len = (row_ptrs[r + 1].as_usize() - row_ptrs[r].as_usize()) as f64;
        var += (len - mean) * (len - mean);
    }
    (mean, (var / rows as f64).sqrt())
}

impl CsrStrategy {
    /// Whether this strategy consults the `srow` table
    pub fn uses_srow(&self) -> bool {
        matches!(self, CsrStrategy::LoadBalance | CsrStrategy::Automatical)
    }

    /// Resolve to a concrete strategy for one dispatch
    ///
    /// Tie-breaks: prefer the vendor library when a handle exists and
    /// the matrix is large; otherwise load-balance when row lengths are
    /// highly variable (stddev above mean), else classical.
    pub(crate) fn resolve<I: IndexType>(
        self,
        row_ptrs: &[I],
        parallelism: Parallelism,
        sparselib_available: bool,
    ) -> CsrStrategy {
        match self {
            CsrStrategy::Automatical => {
                let rows = row_ptrs.len().saturating_sub(1);
                let nnz = row_ptrs.last().map_or(0, |p| p.as_usize());
                if sparselib_available && nnz >= SPARSELIB_NNZ_THRESHOLD {
                    return CsrStrategy::Sparselib;
                }
                let (mean, stddev) = row_length_stats(row_ptrs);
                // highly variable rows starve per-row workers
                if stddev > mean && rows >= parallelism.workers {
                    CsrStrategy::LoadBalance
                } else {
                    CsrStrategy::Classical
                }
            }
            concrete => concrete,
        }
    }
}

/// Build the super-row table for load-balanced SpMV
///
/// Splits the non-zeros into `workers` equal chunks; `srow[w]` is the
/// row containing the first non-zero of chunk `w`, and `srow[workers]`
/// is the row count. Chunk `w` walks non-zeros
/// `[w * chunk, (w + 1) * chunk)` starting at row `srow[w]`.
pub(crate) fn build_srow<I: IndexType>(row_ptrs: &[I], workers: usize) -> Vec<I> {
    let rows = row_ptrs.len().saturating_sub(1);
    let nnz = row_ptrs.last().map_or(0, |p| p.as_usize());
    let workers = workers.max(1);
    let chunk = nnz.div_ceil(workers).max(1);
    let mut srow = Vec::with_capacity(workers + 1);
    let mut row = 0usize;
    for w in 0..workers {
        let first_nnz = (w * chunk).min(nnz);
        while row < rows && row_ptrs[row + 1].as_usize() <= first_nnz {
            row += 1;
        }
        srow.push(I::from_usize(row));
    }
    srow.push(I::from_usize(rows));
    srow
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parallelism(workers: usize) -> Parallelism {
        Parallelism {
            workers,
            warp_size: 1,
            multiprocessors: 1,
        }
    }

    #[test]
    fn test_stats_uniform_rows() {
        let row_ptrs = [0i64, 2, 4, 6];
        let (mean, stddev) = row_length_stats(&row_ptrs);
        assert_eq!(mean, 2.0);
        assert_eq!(stddev, 0.0);
    }

    #[test]
    fn test_automatical_uniform_picks_classical() {
        let row_ptrs = [0i64, 2, 4, 6];
        let resolved = CsrStrategy::Automatical.resolve(&row_ptrs, parallelism(2), false);
        assert_eq!(resolved, CsrStrategy::Classical);
    }

    #[test]
    fn test_automatical_skewed_picks_load_balance() {
        // one dense row among empties
        let row_ptrs = [0i64, 0, 0, 0, 100];
        let resolved = CsrStrategy::Automatical.resolve(&row_ptrs, parallelism(2), false);
        assert_eq!(resolved, CsrStrategy::LoadBalance);
    }

    #[test]
    fn test_concrete_strategy_passes_through() {
        let row_ptrs = [0i64, 1];
        assert_eq!(
            CsrStrategy::MergePath.resolve(&row_ptrs, parallelism(8), true),
            CsrStrategy::MergePath
        );
    }

    #[test]
    fn test_build_srow_even_split() {
        // rows of 2 nnz each, 2 workers, chunk = 3
        let row_ptrs = [0i64, 2, 4, 6];
        let srow = build_srow(&row_ptrs, 2);
        assert_eq!(srow, vec![0, 1, 3]);
    }

    #[test]
    fn test_build_srow_empty_matrix() {
        let row_ptrs = [0i64];
        let srow = build_srow(&row_ptrs, 4);
        assert_eq!(srow.len(), 5);
        assert!(srow.iter().all(|&r| r == 0));
    }
}
