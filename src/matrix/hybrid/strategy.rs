//! HYBRID partition policies
//!
//! A policy looks at the row-length histogram and picks `ell_lim`, the
//! uniform ELL width; every non-zero past `ell_lim` in its row spills
//! into the COO part (`coo_lim` non-zeros in total).

/// Policy choosing the ELL/COO split of a HYBRID matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HybridStrategy {
    /// Minimize total storage (same as [`MinimalStorage`](Self::MinimalStorage))
    Automatic,
    /// Fixed ELL width
    ColumnLimit {
        /// The ELL width
        columns: usize,
    },
    /// ELL width covering `percent` of the rows entirely
    ImbalanceLimit {
        /// Fraction of rows kept fully in the ELL part, in `[0, 1]`
        percent: f64,
    },
    /// Like `ImbalanceLimit`, but the COO part is bounded to a fraction
    /// of the total non-zeros; the width grows until the bound holds
    ImbalanceBoundedLimit {
        /// Fraction of rows kept fully in the ELL part
        percent: f64,
        /// Largest allowed `coo_lim / nnz` ratio
        ratio: f64,
    },
    /// Exact storage minimization over all candidate widths
    MinimalStorage,
}

impl Default for HybridStrategy {
    fn default() -> Self {
        HybridStrategy::Automatic
    }
}

/// The chosen split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HybridLimits {
    /// Uniform ELL width
    pub ell_lim: usize,
    /// Non-zeros spilling into the COO part
    pub coo_lim: usize,
}

/// Non-zeros spilling past width `lim`, from a sorted row-count slice
fn spilled(sorted_counts: &[usize], lim: usize) -> usize {
    sorted_counts
        .iter()
        .rev()
        .take_while(|&&count| count > lim)
        .map(|&count| count - lim)
        .sum()
}

/// The width covering `percent` of the rows entirely
fn percentile_width(sorted_counts: &[usize], percent: f64) -> usize {
    if sorted_counts.is_empty() {
        return 0;
    }
    let percent = percent.clamp(0.0, 1.0);
    let idx = ((sorted_counts.len() as f64 * percent).ceil() as usize)
        .saturating_sub(1)
        .min(sorted_counts.len() - 1);
    sorted_counts[idx]
}

impl HybridStrategy {
    /// Compute the split for the given per-row non-zero counts
    ///
    /// `value_bytes` and `index_bytes` weigh the storage cost of an ELL
    /// slot (`value + index` per row) against a COO entry
    /// (`value + 2 * index`).
    pub fn compute_limits(
        &self,
        row_counts: &[usize],
        value_bytes: usize,
        index_bytes: usize,
    ) -> HybridLimits {
        let mut sorted = row_counts.to_vec();
        sorted.sort_unstable();
        let total: usize = sorted.iter().sum();

        let ell_lim = match *self {
            HybridStrategy::ColumnLimit { columns } => columns,
            HybridStrategy::ImbalanceLimit { percent } => percentile_width(&sorted, percent),
            HybridStrategy::ImbalanceBoundedLimit { percent, ratio } => {
                let mut lim = percentile_width(&sorted, percent);
                let bound = (ratio.clamp(0.0, 1.0) * total as f64) as usize;
                while spilled(&sorted, lim) > bound {
                    lim += 1;
                }
                lim
            }
            HybridStrategy::Automatic | HybridStrategy::MinimalStorage => {
                // exact minimization: ELL slot costs (value + index) per
                // row, a spilled entry costs (value + 2 * index); ties
                // prefer the smaller width (more COO, less padding)
                let ell_slot = (value_bytes + index_bytes) * row_counts.len();
                let coo_entry = value_bytes + 2 * index_bytes;
                let max_width = sorted.last().copied().unwrap_or(0);
                let mut best = (usize::MAX, 0usize);
                for lim in 0..=max_width {
                    let storage = ell_slot * lim + coo_entry * spilled(&sorted, lim);
                    if storage < best.0 {
                        best = (storage, lim);
                    }
                }
                best.1
            }
        };

        HybridLimits {
            ell_lim,
            coo_lim: spilled(&sorted, ell_lim),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_limit() {
        let limits =
            HybridStrategy::ColumnLimit { columns: 2 }.compute_limits(&[1, 3, 2, 5], 8, 8);
        assert_eq!(limits.ell_lim, 2);
        // spill: (3-2) + (5-2) = 4
        assert_eq!(limits.coo_lim, 4);
    }

    #[test]
    fn test_imbalance_limit_covers_percentile() {
        let counts = [1usize, 1, 1, 1, 1, 1, 1, 1, 1, 100];
        let limits = HybridStrategy::ImbalanceLimit { percent: 0.9 }.compute_limits(&counts, 8, 8);
        assert_eq!(limits.ell_lim, 1);
        assert_eq!(limits.coo_lim, 99);
    }

    #[test]
    fn test_imbalance_bounded_grows_width() {
        let counts = [1usize, 1, 1, 1, 1, 1, 1, 1, 1, 100];
        let limits = HybridStrategy::ImbalanceBoundedLimit {
            percent: 0.9,
            ratio: 0.0,
        }
        .compute_limits(&counts, 8, 8);
        // zero COO budget forces the full width
        assert_eq!(limits.ell_lim, 100);
        assert_eq!(limits.coo_lim, 0);
    }

    #[test]
    fn test_minimal_storage_prefers_coo_for_long_tail() {
        // one dense row among short ones: padding every row to 100 slots
        // is far more expensive than spilling one row to COO
        let counts = [1usize, 1, 1, 1, 1, 1, 1, 1, 1, 100];
        let limits = HybridStrategy::MinimalStorage.compute_limits(&counts, 8, 8);
        assert_eq!(limits.ell_lim, 1);
    }

    #[test]
    fn test_minimal_storage_uniform_rows_use_ell() {
        let counts = [3usize, 3, 3, 3];
        let limits = HybridStrategy::MinimalStorage.compute_limits(&counts, 8, 8);
        assert_eq!(limits.ell_lim, 3);
        assert_eq!(limits.coo_lim, 0);
    }

    #[test]
    fn test_empty_matrix() {
        let limits = HybridStrategy::Automatic.compute_limits(&[], 8, 8);
        assert_eq!(limits, HybridLimits { ell_lim: 0, coo_lim: 0 });
    }
}
