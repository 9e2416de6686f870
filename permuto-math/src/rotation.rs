// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Random rotations inside the zero-sum subspace
//!
//! The permutohedral lattice lives in `H_d = {y ∈ R^{d+1} | Σyᵢ = 0}`.
//! Rotating a level's lattice inside `H_d` changes its orientation relative
//! to the input axes without leaving the hyperplane. Used at initialization
//! only, to give every level a different orientation.

use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::StandardNormal;

/// Orthonormal basis of the zero-sum subspace of `R^{dim+1}`, as a
/// `(dim+1) × dim` matrix.
///
/// Taken from the QR factorization of the projector `I - 11ᵀ/(dim+1)`,
/// whose first `dim` columns are linearly independent.
pub fn zero_sum_basis(dim: usize) -> DMatrix<f64> {
    assert!(dim > 0, "Dimension must be positive");
    let n = dim + 1;
    let projector =
        DMatrix::<f64>::identity(n, n) - DMatrix::from_element(n, n, 1.0 / n as f64);
    projector.qr().q().columns(0, dim).into_owned()
}

/// Haar-distributed orthogonal `dim × dim` matrix.
///
/// QR of a Gaussian matrix, with each column sign-corrected by the sign of
/// the matching diagonal entry of R.
fn random_orthogonal<R: Rng + ?Sized>(dim: usize, rng: &mut R) -> DMatrix<f64> {
    let gaussian = DMatrix::<f64>::from_fn(dim, dim, |_, _| rng.sample::<f64, _>(StandardNormal));
    let qr = gaussian.qr();
    let r = qr.r();
    let mut q = qr.q();
    for j in 0..dim {
        if r[(j, j)] < 0.0 {
            q.column_mut(j).neg_mut();
        }
    }
    q
}

/// `count` random rotations acting within the `dim`-dimensional zero-sum
/// subspace of `R^{dim+1}`.
///
/// Each result is `Q R Qᵀ` with `Q` from [`zero_sum_basis`] and `R` a random
/// orthogonal `dim × dim` matrix, so it is `(dim+1) × (dim+1)`, maps the
/// uniform direction `1` to zero and is orthogonal on the subspace.
pub fn random_rotation_in_zero_sum_subspace<R: Rng + ?Sized>(
    dim: usize,
    count: usize,
    rng: &mut R,
) -> Vec<DMatrix<f64>> {
    let basis = zero_sum_basis(dim);
    let basis_t = basis.transpose();
    (0..count)
        .map(|_| {
            let rot = random_orthogonal(dim, rng);
            &basis * rot * &basis_t
        })
        .collect()
}
