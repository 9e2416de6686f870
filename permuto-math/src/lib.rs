// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

pub mod lattice;
pub mod rotation;

pub use lattice::{
    KeyIndexer, LatticeKey, PermutohedralLattice, Simplex, MAX_DIMS, MAX_SCALED_COORD,
};
pub use rotation::{random_rotation_in_zero_sum_subspace, zero_sum_basis};
