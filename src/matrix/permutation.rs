//! Permutation operators

use crate::array::Array;
use crate::dtype::IndexType;
use crate::error::{Error, Result};
use crate::executor::Executor;

/// Which sides a permutation applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermuteMask {
    /// Permute rows only
    #[default]
    Row,
    /// Permute columns only
    Column,
    /// Permute rows and columns
    RowAndColumn,
    /// Identity marker
    None,
}

/// A permutation of `n` indices with an application mask
///
/// `perm[i] = j` maps source index `j` to destination index `i` under
/// row permutation: `(P * A)[i, :] = A[perm[i], :]`.
#[derive(Debug, Clone)]
pub struct Permutation<E: Executor, I: IndexType = i64> {
    perm: Array<E, I>,
    mask: PermuteMask,
}

impl<E: Executor, I: IndexType> Permutation<E, I> {
    /// Create a permutation from an index array
    ///
    /// Rejects arrays that are not a bijection of `0..n`.
    pub fn new(perm: Array<E, I>, mask: PermuteMask) -> Result<Self> {
        let host = perm.to_vec();
        let n = host.len();
        let mut seen = vec![false; n];
        for &p in &host {
            if p < I::ZERO || p.as_usize() >= n {
                return Err(Error::OutOfBounds {
                    index: p.as_usize(),
                    size: n,
                });
            }
            if seen[p.as_usize()] {
                return Err(Error::value_mismatch(format!(
                    "duplicate permutation target {:?}",
                    p
                )));
            }
            seen[p.as_usize()] = true;
        }
        Ok(Self { perm, mask })
    }

    /// Build from host indices on the given device
    pub fn from_indices(indices: &[I], mask: PermuteMask, device: &E::Device) -> Result<Self> {
        Self::new(Array::from_slice(indices, device)?, mask)
    }

    /// The identity permutation of `n` indices
    pub fn identity(n: usize, device: &E::Device) -> Result<Self> {
        let indices: Vec<I> = (0..n).map(I::from_usize).collect();
        Ok(Self {
            perm: Array::from_slice(&indices, device)?,
            mask: PermuteMask::None,
        })
    }

    /// Number of permuted indices
    pub fn len(&self) -> usize {
        self.perm.len()
    }

    /// True for the zero-length permutation
    pub fn is_empty(&self) -> bool {
        self.perm.is_empty()
    }

    /// The application mask
    pub fn mask(&self) -> PermuteMask {
        self.mask
    }

    /// The index array
    pub fn indices(&self) -> &Array<E, I> {
        &self.perm
    }

    /// Host copy of the index array
    pub fn to_host_indices(&self) -> Vec<I> {
        self.perm.to_vec()
    }

    /// The inverse permutation: `inv[perm[i]] = i`
    pub fn inverse(&self) -> Result<Self> {
        let host = self.perm.to_vec();
        let mut inv = vec![I::ZERO; host.len()];
        for (i, &p) in host.iter().enumerate() {
            inv[p.as_usize()] = I::from_usize(i);
        }
        Ok(Self {
            perm: Array::from_slice(&inv, self.perm.device())?,
            mask: self.mask,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ReferenceExecutor;

    type RefPerm = Permutation<ReferenceExecutor, i64>;

    #[test]
    fn test_inverse_composes_to_identity() {
        let device = ReferenceExecutor::default_device();
        let p = RefPerm::from_indices(&[2, 0, 1], PermuteMask::Row, &device).unwrap();
        let inv = p.inverse().unwrap();
        let pi = p.to_host_indices();
        let ii = inv.to_host_indices();
        for i in 0..3 {
            assert_eq!(ii[pi[i as usize].as_usize()], i as i64);
        }
    }

    #[test]
    fn test_rejects_duplicates() {
        let device = ReferenceExecutor::default_device();
        assert!(RefPerm::from_indices(&[0, 0, 1], PermuteMask::Row, &device).is_err());
    }

    #[test]
    fn test_rejects_out_of_range() {
        let device = ReferenceExecutor::default_device();
        assert!(RefPerm::from_indices(&[0, 3], PermuteMask::Row, &device).is_err());
    }

    #[test]
    fn test_identity() {
        let device = ReferenceExecutor::default_device();
        let p = RefPerm::identity(4, &device).unwrap();
        assert_eq!(p.to_host_indices(), vec![0, 1, 2, 3]);
        assert_eq!(p.mask(), PermuteMask::None);
    }
}
