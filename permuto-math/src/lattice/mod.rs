// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Permutohedral lattice module
//!
//! The permutohedral lattice A*_d tiles d-space with simplices. Points are
//! embedded ("elevated") into the (d+1)-dimensional hyperplane
//! `{x ∈ R^{d+1} | Σxᵢ = 0}`, where lattice vertices have integer coordinates
//! that are all congruent modulo d+1.
//!
//! - [`PermutohedralLattice`]: elevation and simplex location
//! - [`Simplex`]: the d+1 enclosing vertices, barycentric weights and their derivatives
//! - [`KeyIndexer`]: maps a vertex key to a parameter row (dense or hashed)

pub mod index;
pub mod permutohedral;

pub use index::KeyIndexer;
pub use permutohedral::{PermutohedralLattice, Simplex};

/// Largest supported number of input dimensions.
///
/// Simplex scratch space lives on the stack, sized by this constant.
pub const MAX_DIMS: usize = 32;

/// Largest scaled coordinate magnitude [`PermutohedralLattice::locate`] accepts.
///
/// Elevated coordinates stay below `2·MAX_DIMS·MAX_SCALED_COORD = 2^24`, so
/// they are exact in f32 and every key coordinate and remainder sum fits in i32.
pub const MAX_SCALED_COORD: f32 = 262_144.0;

/// Integer key of a lattice vertex.
///
/// Stores the first `d` coordinates of the zero-sum (d+1)-vector; the last
/// coordinate is redundant because the coordinates sum to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LatticeKey {
    coords: [i32; MAX_DIMS],
    dim: u8,
}

impl LatticeKey {
    pub fn new(coords: &[i32]) -> Self {
        assert!(
            coords.len() <= MAX_DIMS,
            "Key dimension {} exceeds MAX_DIMS",
            coords.len()
        );
        let mut key = Self::origin(coords.len());
        key.coords[..coords.len()].copy_from_slice(coords);
        key
    }

    pub fn origin(dim: usize) -> Self {
        Self {
            coords: [0; MAX_DIMS],
            dim: dim as u8,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dim as usize
    }

    pub fn coords(&self) -> &[i32] {
        &self.coords[..self.dim as usize]
    }

    pub(crate) fn coords_mut(&mut self) -> &mut [i32] {
        &mut self.coords[..self.dim as usize]
    }

    /// The vertex remainder class `k ∈ [0, d]`: every coordinate is `≡ k (mod d+1)`.
    pub fn remainder(&self) -> usize {
        if self.dim == 0 {
            return 0;
        }
        self.coords[0].rem_euclid(self.dim as i32 + 1) as usize
    }

    /// The implied last coordinate, `-Σ coords`.
    pub fn last_coord(&self) -> i64 {
        -self.coords().iter().map(|&c| c as i64).sum::<i64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_origin() {
        let origin = LatticeKey::origin(3);
        assert_eq!(origin.dimension(), 3);
        assert!(origin.coords().iter().all(|&x| x == 0));
        assert_eq!(origin.remainder(), 0);
        assert_eq!(origin.last_coord(), 0);
    }

    #[test]
    fn test_key_remainder() {
        // d = 2: coordinates congruent mod 3
        let key = LatticeKey::new(&[1, -2]);
        assert_eq!(key.remainder(), 1);
        assert_eq!(key.last_coord(), 1);

        let key = LatticeKey::new(&[-1, 2]);
        assert_eq!(key.remainder(), 2);
    }

    #[test]
    fn test_key_equality_ignores_capacity() {
        let a = LatticeKey::new(&[3, 0, -3]);
        let b = LatticeKey::new(&[3, 0, -3]);
        assert_eq!(a, b);
        assert_ne!(a, LatticeKey::new(&[3, 0, -3, 0]));
    }
}
