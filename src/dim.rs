//! Two-dimensional size type

use std::fmt;

/// Size of a matrix: `(rows, cols)`.
///
/// Both extents may be zero; zero-sized matrices are legal and own no
/// allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dim2 {
    /// Number of rows
    pub rows: usize,
    /// Number of columns
    pub cols: usize,
}

impl Dim2 {
    /// Create a new dimension
    #[inline]
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Square dimension `n x n`
    #[inline]
    pub const fn square(n: usize) -> Self {
        Self { rows: n, cols: n }
    }

    /// Total number of entries
    #[inline]
    pub const fn count(&self) -> usize {
        self.rows * self.cols
    }

    /// True if either extent is zero
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// True if rows == cols
    #[inline]
    pub const fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// The transposed dimension `(cols, rows)`
    #[inline]
    pub const fn transposed(&self) -> Self {
        Self {
            rows: self.cols,
            cols: self.rows,
        }
    }

    /// Check that `self` can left-multiply `other` (`self.cols == other.rows`)
    #[inline]
    pub const fn conforms(&self, other: &Dim2) -> bool {
        self.cols == other.rows
    }
}

impl fmt::Display for Dim2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {}", self.rows, self.cols)
    }
}

impl From<(usize, usize)> for Dim2 {
    fn from((rows, cols): (usize, usize)) -> Self {
        Self { rows, cols }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dim_basics() {
        let d = Dim2::new(3, 5);
        assert_eq!(d.count(), 15);
        assert!(!d.is_empty());
        assert!(!d.is_square());
        assert_eq!(d.transposed(), Dim2::new(5, 3));
    }

    #[test]
    fn test_zero_dim() {
        let d = Dim2::new(0, 4);
        assert!(d.is_empty());
        assert_eq!(d.count(), 0);
    }

    #[test]
    fn test_conforms() {
        assert!(Dim2::new(2, 3).conforms(&Dim2::new(3, 4)));
        assert!(!Dim2::new(2, 3).conforms(&Dim2::new(2, 4)));
    }
}
