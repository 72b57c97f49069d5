//! Row ownership: index sets and partitions
//!
//! An [`IndexSet`] is a union of disjoint half-open intervals over the
//! global row range; a [`RowPartition`] assigns one set per rank such
//! that the sets are disjoint and together cover `[0, global_rows)`.

use crate::error::{Error, Result};
use std::ops::Range;

/// A union of disjoint intervals over `[0, bound)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSet {
    bound: usize,
    intervals: Vec<Range<usize>>,
}

impl IndexSet {
    /// An empty set over `[0, bound)`
    pub fn new(bound: usize) -> Self {
        Self {
            bound,
            intervals: Vec::new(),
        }
    }

    /// The exclusive upper bound of the index range
    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Add `[start, end)`, merging with adjacent or overlapping intervals
    pub fn add_interval(&mut self, start: usize, end: usize) -> Result<()> {
        if end > self.bound || start > end {
            return Err(Error::OutOfBounds {
                index: end,
                size: self.bound,
            });
        }
        if start == end {
            return Ok(());
        }
        self.intervals.push(start..end);
        self.intervals.sort_by_key(|r| r.start);
        let mut merged: Vec<Range<usize>> = Vec::with_capacity(self.intervals.len());
        for interval in self.intervals.drain(..) {
            match merged.last_mut() {
                Some(last) if interval.start <= last.end => {
                    last.end = last.end.max(interval.end);
                }
                _ => merged.push(interval),
            }
        }
        self.intervals = merged;
        Ok(())
    }

    /// Total number of indices in the set
    pub fn total(&self) -> usize {
        self.intervals.iter().map(|r| r.len()).sum()
    }

    /// True when the set holds no indices
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// The intervals, sorted and disjoint
    pub fn intervals(&self) -> &[Range<usize>] {
        &self.intervals
    }

    /// Whether `index` is in the set
    pub fn contains(&self, index: usize) -> bool {
        self.intervals
            .iter()
            .any(|r| r.start <= index && index < r.end)
    }

    /// Iterate the indices in increasing order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.intervals.iter().flat_map(|r| r.clone())
    }

    /// Position of `index` within the set's increasing enumeration
    pub fn local_position(&self, index: usize) -> Option<usize> {
        let mut offset = 0;
        for interval in &self.intervals {
            if index < interval.start {
                return None;
            }
            if index < interval.end {
                return Some(offset + index - interval.start);
            }
            offset += interval.len();
        }
        None
    }

    /// The `local`-th index of the increasing enumeration
    pub fn global_index(&self, local: usize) -> Option<usize> {
        let mut remaining = local;
        for interval in &self.intervals {
            if remaining < interval.len() {
                return Some(interval.start + remaining);
            }
            remaining -= interval.len();
        }
        None
    }
}

/// Disjoint covering assignment of rows to ranks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPartition {
    global_rows: usize,
    per_rank: Vec<IndexSet>,
}

impl RowPartition {
    /// Build from per-rank index sets, validating the covering property
    pub fn new(global_rows: usize, per_rank: Vec<IndexSet>) -> Result<Self> {
        let mut owner = vec![usize::MAX; global_rows];
        for (rank, set) in per_rank.iter().enumerate() {
            if set.bound() != global_rows {
                return Err(Error::value_mismatch(format!(
                    "rank {} index set bound {} does not match {} global rows",
                    rank,
                    set.bound(),
                    global_rows
                )));
            }
            for index in set.iter() {
                if owner[index] != usize::MAX {
                    return Err(Error::value_mismatch(format!(
                        "row {} owned by ranks {} and {}",
                        index, owner[index], rank
                    )));
                }
                owner[index] = rank;
            }
        }
        if let Some(row) = owner.iter().position(|&r| r == usize::MAX) {
            return Err(Error::value_mismatch(format!("row {} owned by no rank", row)));
        }
        Ok(Self {
            global_rows,
            per_rank,
        })
    }

    /// Split `global_rows` into contiguous blocks, one per rank
    pub fn contiguous(global_rows: usize, ranks: usize) -> Result<Self> {
        let chunk = global_rows.div_ceil(ranks.max(1));
        let mut per_rank = Vec::with_capacity(ranks);
        for rank in 0..ranks {
            let mut set = IndexSet::new(global_rows);
            let start = (rank * chunk).min(global_rows);
            let end = ((rank + 1) * chunk).min(global_rows);
            set.add_interval(start, end)?;
            per_rank.push(set);
        }
        Self::new(global_rows, per_rank)
    }

    /// Number of global rows
    pub fn global_rows(&self) -> usize {
        self.global_rows
    }

    /// Number of ranks
    pub fn num_ranks(&self) -> usize {
        self.per_rank.len()
    }

    /// The index set owned by `rank`
    pub fn rank_rows(&self, rank: usize) -> &IndexSet {
        &self.per_rank[rank]
    }

    /// The rank owning `row`
    pub fn owner_of(&self, row: usize) -> usize {
        self.per_rank
            .iter()
            .position(|set| set.contains(row))
            .expect("validated partition covers all rows")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_merging() {
        let mut set = IndexSet::new(10);
        set.add_interval(0, 3).unwrap();
        set.add_interval(5, 7).unwrap();
        set.add_interval(3, 5).unwrap();
        assert_eq!(set.intervals(), &[0..7]);
        assert_eq!(set.total(), 7);
    }

    #[test]
    fn test_local_global_mapping() {
        let mut set = IndexSet::new(10);
        set.add_interval(1, 3).unwrap();
        set.add_interval(6, 9).unwrap();
        // enumeration: 1, 2, 6, 7, 8
        assert_eq!(set.local_position(2), Some(1));
        assert_eq!(set.local_position(6), Some(2));
        assert_eq!(set.local_position(5), None);
        assert_eq!(set.global_index(3), Some(7));
        assert_eq!(set.global_index(5), None);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 2, 6, 7, 8]);
    }

    #[test]
    fn test_partition_validation_rejects_overlap() {
        let mut a = IndexSet::new(4);
        a.add_interval(0, 3).unwrap();
        let mut b = IndexSet::new(4);
        b.add_interval(2, 4).unwrap();
        assert!(RowPartition::new(4, vec![a, b]).is_err());
    }

    #[test]
    fn test_partition_validation_rejects_gap() {
        let mut a = IndexSet::new(4);
        a.add_interval(0, 2).unwrap();
        let b = IndexSet::new(4);
        assert!(RowPartition::new(4, vec![a, b]).is_err());
    }

    #[test]
    fn test_contiguous_partition() {
        let part = RowPartition::contiguous(5, 2).unwrap();
        assert_eq!(part.rank_rows(0).intervals(), &[0..3]);
        assert_eq!(part.rank_rows(1).intervals(), &[3..5]);
        assert_eq!(part.owner_of(4), 1);
    }

    #[test]
    fn test_noncontiguous_ownership() {
        let mut a = IndexSet::new(5);
        a.add_interval(0, 1).unwrap();
        a.add_interval(3, 5).unwrap();
        let mut b = IndexSet::new(5);
        b.add_interval(1, 3).unwrap();
        let part = RowPartition::new(5, vec![a, b]).unwrap();
        assert_eq!(part.owner_of(0), 0);
        assert_eq!(part.owner_of(2), 1);
        assert_eq!(part.owner_of(3), 0);
    }
}
