//! Matrix assembly data: the `(row, col, value)` triple form
//!
//! [`MatrixData`] is the exchange format every matrix type can `read`
//! from and `write` to. It is also the hub for format conversions that
//! have no dedicated two-phase path: any format can round-trip through
//! it without loss.

use crate::dim::Dim2;
use crate::dtype::{IndexType, Value};
use crate::error::{Error, Result};

/// One non-zero entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry<V, I> {
    /// Row index
    pub row: I,
    /// Column index
    pub col: I,
    /// Value
    pub value: V,
}

impl<V, I> Entry<V, I> {
    /// Create an entry
    pub fn new(row: I, col: I, value: V) -> Self {
        Self { row, col, value }
    }
}

/// Matrix-market style triple list with a size
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixData<V: Value, I: IndexType = i64> {
    /// Matrix dimension
    pub size: Dim2,
    /// Non-zero entries
    pub nonzeros: Vec<Entry<V, I>>,
}

impl<V: Value, I: IndexType> MatrixData<V, I> {
    /// Empty data of the given size
    pub fn new(size: Dim2) -> Self {
        Self {
            size,
            nonzeros: Vec::new(),
        }
    }

    /// Build from `(row, col, value)` tuples
    pub fn from_entries(size: Dim2, entries: impl IntoIterator<Item = (I, I, V)>) -> Self {
        Self {
            size,
            nonzeros: entries
                .into_iter()
                .map(|(row, col, value)| Entry::new(row, col, value))
                .collect(),
        }
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.nonzeros.len()
    }

    /// Append one entry
    pub fn push(&mut self, row: I, col: I, value: V) {
        self.nonzeros.push(Entry::new(row, col, value));
    }

    /// Sort entries into row-major order (row, then column)
    pub fn sort_row_major(&mut self) {
        self.nonzeros.sort_by_key(|e| (e.row, e.col));
    }

    /// True when entries are sorted row-major with no duplicates
    pub fn is_sorted_row_major(&self) -> bool {
        self.nonzeros
            .windows(2)
            .all(|w| (w[0].row, w[0].col) < (w[1].row, w[1].col))
    }

    /// Combine duplicate positions by summation (sorts first)
    pub fn sum_duplicates(&mut self) {
        self.sort_row_major();
        let mut out: Vec<Entry<V, I>> = Vec::with_capacity(self.nonzeros.len());
        for entry in self.nonzeros.drain(..) {
            match out.last_mut() {
                Some(last) if last.row == entry.row && last.col == entry.col => {
                    last.value += entry.value;
                }
                _ => out.push(entry),
            }
        }
        self.nonzeros = out;
    }

    /// Drop entries with value exactly zero
    pub fn remove_zeros(&mut self) {
        use num_traits::Zero;
        self.nonzeros.retain(|e| !e.value.is_zero());
    }

    /// Validate that every index is in bounds
    ///
    /// Reading a format from data with out-of-range or negative indices
    /// is a data precondition violation.
    pub fn validate(&self) -> Result<()> {
        for entry in &self.nonzeros {
            if entry.row < I::ZERO || entry.row.as_usize() >= self.size.rows {
                return Err(Error::value_mismatch(format!(
                    "row index {:?} outside {} rows",
                    entry.row, self.size.rows
                )));
            }
            if entry.col < I::ZERO || entry.col.as_usize() >= self.size.cols {
                return Err(Error::value_mismatch(format!(
                    "column index {:?} outside {} columns",
                    entry.col, self.size.cols
                )));
            }
        }
        Ok(())
    }

    /// Per-row non-zero counts
    pub fn row_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.size.rows];
        for entry in &self.nonzeros {
            counts[entry.row.as_usize()] += 1;
        }
        counts
    }

    /// The largest per-row count, zero for an empty matrix
    pub fn max_row_nnz(&self) -> usize {
        self.row_counts().into_iter().max().unwrap_or(0)
    }
}
