// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Permutohedral lattice A*_d: simplex location and barycentric interpolation
//!
//! Construction (Adams, Baek & Davis 2010):
//! 1. Elevate `x ∈ R^d` into `H_d = {y ∈ R^{d+1} | Σyᵢ = 0}`.
//! 2. Round every coordinate to the nearest multiple of d+1 (the "remainder-0"
//!    vertex), then rank the fractional remainders.
//! 3. Shift ranks by the rounding excess so the vertex lies back on `H_d`.
//! 4. The enclosing simplex is walked from that vertex in d+1 canonical steps;
//!    its barycentric weights are differences of sorted remainders.
//!
//! Weights are piecewise linear in the position, so their Jacobian is constant
//! inside each simplex. Both directions of that Jacobian are exposed:
//! [`Simplex::backprop_into`] (reverse mode) and
//! [`Simplex::directional_weights`] (forward mode).
//!
//! Tie-break: a coordinate exactly halfway between two multiples of d+1
//! rounds down, and equal remainders rank the later coordinate higher.

use super::{LatticeKey, MAX_DIMS, MAX_SCALED_COORD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermutohedralLattice {
    dimension: usize,
}

impl PermutohedralLattice {
    pub fn new(dimension: usize) -> Self {
        assert!(
            (1..=MAX_DIMS).contains(&dimension),
            "Dimension must be in 1..={MAX_DIMS}"
        );
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Vertices per enclosing simplex (d+1).
    pub fn simplex_size(&self) -> usize {
        self.dimension + 1
    }

    /// A*_d has 2(d+1) nearest neighbours.
    pub fn kissing_number(&self) -> usize {
        2 * (self.dimension + 1)
    }

    /// Per-dimension scale factors for a lattice with `resolution` vertex
    /// spacings per unit of input.
    ///
    /// `1/sqrt((i+1)(i+2))` makes the elevation an isometry; neighbouring
    /// vertices are then `sqrt(d(d+1))` apart, which the resolution term
    /// rescales to `1/resolution`.
    pub fn scales_for_resolution(&self, resolution: f64) -> Vec<f32> {
        let d = self.dimension as f64;
        let spacing = (d * (d + 1.0)).sqrt();
        (0..self.dimension)
            .map(|i| {
                let norm = (((i + 1) * (i + 2)) as f64).sqrt();
                (resolution * spacing / norm) as f32
            })
            .collect()
    }

    /// Elevate scaled coordinates into the zero-sum hyperplane.
    ///
    /// `elevated` must hold at least d+1 values.
    pub fn elevate(&self, scaled: &[f32], elevated: &mut [f32]) {
        assert_eq!(scaled.len(), self.dimension);
        elevate(scaled, &mut elevated[..=self.dimension]);
    }

    /// Find the simplex enclosing a scaled coordinate.
    ///
    /// Every coordinate must be finite with magnitude at most
    /// [`MAX_SCALED_COORD`].
    pub fn locate(&self, scaled: &[f32]) -> Simplex {
        assert_eq!(
            scaled.len(),
            self.dimension,
            "Point dimension must match lattice dimension"
        );
        debug_assert!(scaled.iter().all(|v| v.abs() <= MAX_SCALED_COORD));
        let d = self.dimension;
        let dp1 = d as i32 + 1;
        let inv = 1.0 / (d + 1) as f32;

        let mut simplex = Simplex {
            dimension: d,
            elevated: [0.0; MAX_DIMS + 1],
            rem0: [0; MAX_DIMS + 1],
            rank: [0; MAX_DIMS + 1],
            barycentric: [0.0; MAX_DIMS + 2],
        };
        elevate(scaled, &mut simplex.elevated[..=d]);
        let elevated = &simplex.elevated;

        // Nearest remainder-0 point, coordinate by coordinate
        let mut sum = 0i32;
        for i in 0..=d {
            let v = elevated[i] * inv;
            let up = v.ceil() * dp1 as f32;
            let down = v.floor() * dp1 as f32;
            simplex.rem0[i] = if up - elevated[i] < elevated[i] - down {
                up as i32
            } else {
                down as i32
            };
            sum += simplex.rem0[i];
        }
        sum /= dp1;

        // Rank of each remainder in descending order
        for i in 0..d {
            let di = elevated[i] - simplex.rem0[i] as f32;
            for j in (i + 1)..=d {
                if di < elevated[j] - simplex.rem0[j] as f32 {
                    simplex.rank[i] += 1;
                } else {
                    simplex.rank[j] += 1;
                }
            }
        }

        // Bring the vertex back onto the hyperplane when the rounding overshot
        for i in 0..=d {
            simplex.rank[i] += sum;
            if simplex.rank[i] < 0 {
                simplex.rank[i] += dp1;
                simplex.rem0[i] += dp1;
            } else if simplex.rank[i] > d as i32 {
                simplex.rank[i] -= dp1;
                simplex.rem0[i] -= dp1;
            }
        }

        for i in 0..=d {
            let delta = (elevated[i] - simplex.rem0[i] as f32) * inv;
            let r = simplex.rank[i] as usize;
            simplex.barycentric[d - r] += delta;
            simplex.barycentric[d + 1 - r] -= delta;
        }
        simplex.barycentric[0] += 1.0 + simplex.barycentric[d + 1];

        simplex
    }
}

/// Elevation matrix applied to `scaled`, written into `out[..=d]`.
fn elevate(scaled: &[f32], out: &mut [f32]) {
    let d = scaled.len();
    let mut sm = 0.0f32;
    for i in (1..=d).rev() {
        let cf = scaled[i - 1];
        out[i] = sm - i as f32 * cf;
        sm += cf;
    }
    out[0] = sm;
}

/// The simplex enclosing one query point on one lattice.
#[derive(Debug, Clone)]
pub struct Simplex {
    dimension: usize,
    elevated: [f32; MAX_DIMS + 1],
    rem0: [i32; MAX_DIMS + 1],
    rank: [i32; MAX_DIMS + 1],
    barycentric: [f32; MAX_DIMS + 2],
}

impl Simplex {
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn num_vertices(&self) -> usize {
        self.dimension + 1
    }

    /// The elevated query point (d+1 coordinates).
    pub fn elevated(&self) -> &[f32] {
        &self.elevated[..=self.dimension]
    }

    /// Barycentric weight of every vertex, indexed by remainder class.
    pub fn weights(&self) -> &[f32] {
        &self.barycentric[..=self.dimension]
    }

    pub fn weight(&self, k: usize) -> f32 {
        assert!(k <= self.dimension, "Vertex index out of range");
        self.barycentric[k]
    }

    /// Key of the vertex with remainder class `k`.
    pub fn vertex_key(&self, k: usize) -> LatticeKey {
        assert!(k <= self.dimension, "Vertex index out of range");
        let d = self.dimension;
        let dp1 = d as i32 + 1;
        let mut key = LatticeKey::origin(d);
        for (i, c) in key.coords_mut().iter_mut().enumerate() {
            *c = self.rem0[i] + k as i32;
            if self.rank[i] > (d - k) as i32 {
                *c -= dp1;
            }
        }
        key
    }

    /// `(key, weight)` for all d+1 vertices.
    pub fn vertices(&self) -> impl Iterator<Item = (LatticeKey, f32)> + '_ {
        (0..=self.dimension).map(move |k| (self.vertex_key(k), self.barycentric[k]))
    }

    /// Reverse-mode product `Jᵀ u`, accumulated into `out`.
    ///
    /// `dl_dweights[k]` is the gradient w.r.t. weight `k`; `scales` are the
    /// per-dimension factors that produced the scaled coordinate. Only the
    /// first `out.len()` input dimensions are computed.
    pub fn backprop_into(&self, dl_dweights: &[f32], scales: &[f32], out: &mut [f32]) {
        let d = self.dimension;
        assert_eq!(dl_dweights.len(), d + 1);
        assert!(out.len() <= d && scales.len() >= out.len());
        if out.is_empty() {
            return;
        }
        let inv = 1.0 / (d + 1) as f32;

        // b[0] absorbs the wrapped entry b[d+1]
        let wrapped = |idx: usize| {
            if idx == d + 1 {
                dl_dweights[0]
            } else {
                dl_dweights[idx]
            }
        };

        let mut dl_delevated = [0.0f32; MAX_DIMS + 1];
        for i in 0..=d {
            let r = self.rank[i] as usize;
            dl_delevated[i] = (dl_dweights[d - r] - wrapped(d + 1 - r)) * inv;
        }

        // Transpose of the elevation: ∂e_i/∂cf_m = 1 for i ≤ m, -(m+1) for i = m+1
        let mut prefix = 0.0f32;
        for (m, o) in out.iter_mut().enumerate() {
            prefix += dl_delevated[m];
            *o += (prefix - (m + 1) as f32 * dl_delevated[m + 1]) * scales[m];
        }
    }

    /// Gradient of weight `k` w.r.t. the unscaled coordinate, written into `out`.
    pub fn weight_gradient(&self, k: usize, scales: &[f32], out: &mut [f32]) {
        assert!(k <= self.dimension, "Vertex index out of range");
        let mut one_hot = [0.0f32; MAX_DIMS + 1];
        one_hot[k] = 1.0;
        out.fill(0.0);
        self.backprop_into(&one_hot[..=self.dimension], scales, out);
    }

    /// Forward-mode product `J z`: the rate of change of every weight when the
    /// unscaled coordinate moves along `direction`. Written into `out[..=d]`.
    pub fn directional_weights(&self, direction: &[f32], scales: &[f32], out: &mut [f32]) {
        let d = self.dimension;
        assert_eq!(direction.len(), d);
        assert!(out.len() > d);
        let inv = 1.0 / (d + 1) as f32;

        let mut dscaled = [0.0f32; MAX_DIMS];
        for j in 0..d {
            dscaled[j] = direction[j] * scales[j];
        }
        let mut delevated = [0.0f32; MAX_DIMS + 1];
        elevate(&dscaled[..d], &mut delevated[..=d]);

        let mut db = [0.0f32; MAX_DIMS + 2];
        for i in 0..=d {
            let r = self.rank[i] as usize;
            let v = delevated[i] * inv;
            db[d - r] += v;
            db[d + 1 - r] -= v;
        }
        db[0] += db[d + 1];
        out[..=d].copy_from_slice(&db[..=d]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::{HashMap, HashSet};

    fn random_point(rng: &mut StdRng, dim: usize, range: f32) -> Vec<f32> {
        (0..dim).map(|_| rng.gen_range(-range..range)).collect()
    }

    #[test]
    fn test_lattice_creation() {
        let lattice = PermutohedralLattice::new(3);
        assert_eq!(lattice.dimension(), 3);
        assert_eq!(lattice.simplex_size(), 4);
        assert_eq!(lattice.kissing_number(), 8);
    }

    #[test]
    fn test_elevation_is_zero_sum() {
        let lattice = PermutohedralLattice::new(4);
        let mut out = [0.0f32; 5];
        lattice.elevate(&[0.3, -1.2, 2.5, 0.7], &mut out);
        let sum: f32 = out.iter().sum();
        assert!(sum.abs() < 1e-5, "Elevated sum {sum} should be zero");
    }

    #[test]
    fn test_elevation_is_scaled_isometry() {
        // With scales_for_resolution(1) the norm grows by sqrt(d(d+1))
        let lattice = PermutohedralLattice::new(3);
        let scales = lattice.scales_for_resolution(1.0);
        let x = [0.4f32, -0.2, 0.1];
        let scaled: Vec<f32> = x.iter().zip(&scales).map(|(a, s)| a * s).collect();
        let mut e = [0.0f32; 4];
        lattice.elevate(&scaled, &mut e);
        let norm_e: f32 = e.iter().map(|v| v * v).sum::<f32>().sqrt();
        let norm_x: f32 = x.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm_e - norm_x * 12.0f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn test_1d_weights() {
        let lattice = PermutohedralLattice::new(1);
        let simplex = lattice.locate(&[0.8]);
        let w = simplex.weights();
        assert!((w[0] - 0.2).abs() < 1e-6);
        assert!((w[1] - 0.8).abs() < 1e-6);
        assert_eq!(simplex.vertex_key(0).coords(), &[0]);
        assert_eq!(simplex.vertex_key(1).coords(), &[1]);
    }

    #[test]
    fn test_origin_is_a_vertex() {
        for dim in 1..=8 {
            let lattice = PermutohedralLattice::new(dim);
            let simplex = lattice.locate(&vec![0.0; dim]);
            assert_eq!(simplex.weight(0), 1.0);
            assert!(simplex.weights()[1..].iter().all(|&w| w == 0.0));
            assert_eq!(simplex.vertex_key(0), LatticeKey::origin(dim));
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let mut rng = StdRng::seed_from_u64(42);
        for dim in 1..=8 {
            let lattice = PermutohedralLattice::new(dim);
            for _ in 0..200 {
                let p = random_point(&mut rng, dim, 50.0);
                let simplex = lattice.locate(&p);
                let sum: f32 = simplex.weights().iter().sum();
                assert!((sum - 1.0).abs() < 1e-4, "dim {dim}: weights sum to {sum}");
                for &w in simplex.weights() {
                    assert!(w > -1e-4, "dim {dim}: negative weight {w}");
                }
            }
        }
    }

    #[test]
    fn test_vertices_reconstruct_point() {
        let mut rng = StdRng::seed_from_u64(7);
        for dim in 1..=7 {
            let lattice = PermutohedralLattice::new(dim);
            for _ in 0..100 {
                let p = random_point(&mut rng, dim, 20.0);
                let simplex = lattice.locate(&p);
                let mut recon = vec![0.0f64; dim + 1];
                for (key, w) in simplex.vertices() {
                    for (i, &c) in key.coords().iter().enumerate() {
                        recon[i] += w as f64 * c as f64;
                    }
                    recon[dim] += w as f64 * key.last_coord() as f64;
                }
                for (r, &e) in recon.iter().zip(simplex.elevated()) {
                    assert!(
                        (r - e as f64).abs() < 1e-3,
                        "dim {dim}: reconstructed {r} vs elevated {e}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_vertex_keys_are_distinct_remainder_classes() {
        let mut rng = StdRng::seed_from_u64(3);
        let lattice = PermutohedralLattice::new(4);
        for _ in 0..50 {
            let simplex = lattice.locate(&random_point(&mut rng, 4, 10.0));
            for k in 0..=4 {
                let key = simplex.vertex_key(k);
                assert_eq!(key.remainder(), k);
                let dp1 = 5;
                assert!(key.coords().iter().all(|c| c.rem_euclid(dp1) as usize == k));
            }
        }
    }

    #[test]
    fn test_boundary_tie_break_is_deterministic() {
        // [0, 0.5] elevates to (0.5, 0.5, -1): coordinates 0 and 1 share the
        // remainder 0.5, so the point lies on a face between two simplices
        let lattice = PermutohedralLattice::new(2);
        let point = [0.0f32, 0.5];
        let a = lattice.locate(&point);
        let b = lattice.locate(&point);
        assert_eq!(a.elevated(), &[0.5f32, 0.5, -1.0]);
        assert_eq!(a.weights(), b.weights());
        for k in 0..=2 {
            assert_eq!(a.vertex_key(k), b.vertex_key(k));
        }

        // The later of two equal remainders ranks higher
        assert_eq!(&a.rank[..3], &[0, 1, 2]);
        for (w, expected) in a.weights().iter().zip([0.5f32, 0.5, 0.0]) {
            assert!((w - expected).abs() < 1e-6, "{:?}", a.weights());
        }

        // Weights are continuous across the face: per key, either side agrees
        let per_key = |s: &Simplex| -> HashMap<LatticeKey, f32> { s.vertices().collect() };
        let on_face = per_key(&a);
        for offset in [1e-5f32, -1e-5] {
            let beside = per_key(&lattice.locate(&[offset, 0.5]));
            let keys: HashSet<LatticeKey> =
                on_face.keys().chain(beside.keys()).copied().collect();
            for key in keys {
                let w0 = on_face.get(&key).copied().unwrap_or(0.0);
                let w1 = beside.get(&key).copied().unwrap_or(0.0);
                assert!((w0 - w1).abs() < 1e-4, "offset {offset}: {key:?} {w0} vs {w1}");
            }
        }
    }

    #[test]
    fn test_locate_at_coordinate_bound() {
        let dim = MAX_DIMS;
        let lattice = PermutohedralLattice::new(dim);
        let uniform = vec![MAX_SCALED_COORD; dim];
        let alternating: Vec<f32> = (0..dim)
            .map(|i| if i % 2 == 0 { MAX_SCALED_COORD } else { -MAX_SCALED_COORD })
            .collect();
        for point in [uniform, alternating] {
            let simplex = lattice.locate(&point);
            let sum: f32 = simplex.weights().iter().sum();
            assert!((sum - 1.0).abs() < 1e-3, "weights sum to {sum}");
            assert!(simplex.weights().iter().all(|&w| (-1e-3..=1.0 + 1e-3).contains(&w)));
            for k in 0..=dim {
                assert_eq!(simplex.vertex_key(k).remainder(), k);
            }
        }
    }

    #[test]
    fn test_point_on_vertex_gets_full_weight() {
        // d = 1: elevated (1, -1) is the vertex (1, -1) and halfway between
        // 0 and 2 on both coordinates. Both round down, the sum correction
        // lifts coordinate 0 back to 2, so the zero-weight vertex is (2, -2).
        let lattice = PermutohedralLattice::new(1);
        let simplex = lattice.locate(&[1.0]);
        assert!(simplex.weight(0).abs() < 1e-6);
        assert!((simplex.weight(1) - 1.0).abs() < 1e-6);
        assert_eq!(simplex.vertex_key(0).coords(), &[2]);
        assert_eq!(simplex.vertex_key(1).coords(), &[1]);
    }

    #[test]
    fn test_weight_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(11);
        let dim = 3;
        let lattice = PermutohedralLattice::new(dim);
        let scales = lattice.scales_for_resolution(4.0);
        let eps = 1e-3f32;
        let mut checked = 0;
        for _ in 0..50 {
            let x = random_point(&mut rng, dim, 1.0);
            let scale =
                |p: &[f32]| -> Vec<f32> { p.iter().zip(&scales).map(|(a, s)| a * s).collect() };
            let simplex = lattice.locate(&scale(&x));
            for j in 0..dim {
                let mut xp = x.clone();
                let mut xm = x.clone();
                xp[j] += eps;
                xm[j] -= eps;
                let sp = lattice.locate(&scale(&xp));
                let sm = lattice.locate(&scale(&xm));
                let same = (0..=dim).all(|k| {
                    sp.vertex_key(k) == simplex.vertex_key(k)
                        && sm.vertex_key(k) == simplex.vertex_key(k)
                });
                if !same {
                    continue;
                }
                for k in 0..=dim {
                    let mut grad = vec![0.0f32; dim];
                    simplex.weight_gradient(k, &scales, &mut grad);
                    let fd = (sp.weight(k) - sm.weight(k)) / (2.0 * eps);
                    assert!(
                        (fd - grad[j]).abs() < 1e-2 * (1.0 + grad[j].abs()),
                        "weight {k} dim {j}: fd {fd} vs analytic {}",
                        grad[j]
                    );
                }
                checked += 1;
            }
        }
        assert!(checked > 50, "Too few interior samples: {checked}");
    }

    #[test]
    fn test_weight_gradients_sum_to_zero() {
        let mut rng = StdRng::seed_from_u64(5);
        let lattice = PermutohedralLattice::new(5);
        let scales = lattice.scales_for_resolution(8.0);
        let simplex = lattice.locate(&random_point(&mut rng, 5, 30.0));
        let mut total = vec![0.0f32; 5];
        let mut grad = vec![0.0f32; 5];
        for k in 0..=5 {
            simplex.weight_gradient(k, &scales, &mut grad);
            for (t, g) in total.iter_mut().zip(&grad) {
                *t += g;
            }
        }
        assert!(total.iter().all(|t| t.abs() < 1e-3), "Σ∇w = {total:?}");
    }

    #[test]
    fn test_forward_and_reverse_mode_are_adjoint() {
        let mut rng = StdRng::seed_from_u64(99);
        for dim in [2usize, 3, 4, 7] {
            let lattice = PermutohedralLattice::new(dim);
            let scales = lattice.scales_for_resolution(16.0);
            for _ in 0..20 {
                let simplex = lattice.locate(&random_point(&mut rng, dim, 40.0));
                let u: Vec<f32> = (0..=dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
                let z: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();

                let mut jz = vec![0.0f32; dim + 1];
                simplex.directional_weights(&z, &scales, &mut jz);
                let mut jtu = vec![0.0f32; dim];
                simplex.backprop_into(&u, &scales, &mut jtu);

                let lhs: f32 = u.iter().zip(&jz).map(|(a, b)| a * b).sum();
                let rhs: f32 = jtu.iter().zip(&z).map(|(a, b)| a * b).sum();
                assert!(
                    (lhs - rhs).abs() < 1e-3 * (1.0 + lhs.abs()),
                    "dim {dim}: <u, Jz> = {lhs} vs <Jᵀu, z> = {rhs}"
                );
            }
        }
    }

    #[test]
    fn test_backprop_prefix_only() {
        let lattice = PermutohedralLattice::new(4);
        let scales = lattice.scales_for_resolution(2.0);
        let simplex = lattice.locate(&[0.3, 1.7, -2.2, 0.9]);
        let u = [0.5f32, -1.0, 0.25, 2.0, -0.75];
        let mut full = vec![0.0f32; 4];
        simplex.backprop_into(&u, &scales, &mut full);
        let mut prefix = vec![0.0f32; 2];
        simplex.backprop_into(&u, &scales, &mut prefix);
        assert_eq!(&full[..2], &prefix[..]);
    }
}
