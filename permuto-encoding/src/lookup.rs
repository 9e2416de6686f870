// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! One query point on one level: the enclosing simplex and the parameter rows
//! of its vertices. Shared by the forward, backward and second-order kernels.

use permuto_math::{Simplex, MAX_DIMS};

use crate::batch::CallPlan;
use crate::meta::EncodingMeta;
use crate::storage::{Element, GradAccumulator};

pub(crate) struct LevelLookup {
    simplex: Simplex,
    /// Flat element offset of each vertex's parameter row
    rows: [usize; MAX_DIMS + 1],
}

impl LevelLookup {
    pub fn new(
        meta: &EncodingMeta,
        plan: &CallPlan<'_>,
        level: usize,
        position: &[f32],
        batch: usize,
    ) -> Self {
        let d = meta.n_dims_to_encode();
        let scales = meta.level_scales(level);
        let mut scaled = [0.0f32; MAX_DIMS];
        match plan.shift(level) {
            Some(shift) => {
                for i in 0..d {
                    scaled[i] = (position[i] + shift[i]) * scales[i];
                }
            }
            None => {
                for i in 0..d {
                    scaled[i] = position[i] * scales[i];
                }
            }
        }
        let simplex = meta.lattice().locate(&scaled[..d]);

        let indexer = meta.indexer(level);
        let n_feats = meta.level_n_feats()[level];
        let base = batch * meta.n_params() + meta.level_offsets()[level];
        let mut rows = [0usize; MAX_DIMS + 1];
        for (k, row) in rows.iter_mut().enumerate().take(d + 1) {
            *row = base + indexer.resolve(&simplex.vertex_key(k)) * n_feats;
        }

        Self { simplex, rows }
    }

    pub fn simplex(&self) -> &Simplex {
        &self.simplex
    }

    pub fn weights(&self) -> &[f32] {
        self.simplex.weights()
    }

    fn rows(&self) -> &[usize] {
        &self.rows[..self.simplex.num_vertices()]
    }

    /// `out[c] = Σ_k weights[k] · V[row_k + feat_offset + c]`
    pub fn gather<T: Element>(
        &self,
        weights: &[f32],
        values: &[T],
        feat_offset: usize,
        out: &mut [f32],
    ) {
        out.fill(0.0);
        let n = out.len();
        for (&row, &w) in self.rows().iter().zip(weights) {
            if w == 0.0 {
                continue;
            }
            let start = row + feat_offset;
            for (o, v) in out.iter_mut().zip(&values[start..start + n]) {
                *o += w * v.to_f32();
            }
        }
    }

    /// `acc[row_k + feat_offset + c] += weights[k] · grad[c]`
    pub fn scatter(
        &self,
        weights: &[f32],
        grad: &[f32],
        feat_offset: usize,
        acc: &GradAccumulator,
    ) {
        for (&row, &w) in self.rows().iter().zip(weights) {
            if w == 0.0 {
                continue;
            }
            let start = row + feat_offset;
            for (c, &g) in grad.iter().enumerate() {
                acc.add(start + c, w as f64 * g as f64);
            }
        }
    }

    /// `u[k] += Σ_c grad[c] · V[row_k + feat_offset + c]`
    pub fn project<T: Element>(
        &self,
        grad: &[f32],
        values: &[T],
        feat_offset: usize,
        u: &mut [f32],
    ) {
        for (&row, uk) in self.rows().iter().zip(u.iter_mut()) {
            let start = row + feat_offset;
            *uk += grad
                .iter()
                .zip(&values[start..start + grad.len()])
                .map(|(&g, v)| g * v.to_f32())
                .sum::<f32>();
        }
    }
}
