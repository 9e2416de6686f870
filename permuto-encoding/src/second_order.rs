// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Backward of the input-gradient backward pass
//!
//! The input gradient is `dL/dx = Jᵀ u` with `u_k = Σ_c dL/dy[c] · V[row_k][c]`
//! and `J` the Jacobian of the barycentric weights. The weights are piecewise
//! linear, so `J` is constant inside a simplex and its own derivative is
//! zero almost everywhere. For an incoming `z = dL/d(dL/dx)` row and
//! `w'_k = (J z)_k`:
//!
//! - `dL/d(dL/dy)[c] = Σ_k w'_k · V[row_k][c]` (the forward gather with `w'`)
//! - `dL/dV[row_k][c] += w'_k · dL/dy[c]` (the parameter scatter with `w'`)

use rayon::prelude::*;

use permuto_math::MAX_DIMS;

use crate::batch::{check_len, CallPlan, EncodeArgs};
use crate::error::Result;
use crate::lookup::LevelLookup;
use crate::meta::EncodingMeta;
use crate::storage::{Element, GradAccumulator};

/// Caller-owned destinations of a second-order call. A `None` target is skipped.
pub struct BwdBwdTargets<'a, T> {
    /// `[N, n_encoded_dims]`, overwritten
    pub dl_ddldy: Option<&'a mut [T]>,
    /// Same layout as the parameter tables, accumulated into
    pub dl_dparams: Option<&'a mut [T]>,
}

#[derive(Debug, Clone)]
pub struct BwdBwdOutput<T> {
    pub dl_ddldy: Option<Vec<T>>,
    pub dl_dparams: Option<Vec<T>>,
}

#[allow(clippy::too_many_arguments)]
pub fn encode_backward_backward_input<T: Element>(
    meta: &EncodingMeta,
    dl_ddldx: &[f32],
    dl_dy: &[T],
    positions: &[f32],
    lattice_values: &[T],
    args: &EncodeArgs<'_>,
    need_dl_ddldy: bool,
    need_dl_dparams: bool,
) -> Result<BwdBwdOutput<T>> {
    let n_points = positions.len() / meta.n_dims_to_encode();
    let mut dl_ddldy = need_dl_ddldy.then(|| vec![T::zero(); n_points * meta.n_encoded_dims()]);
    let mut dl_dparams = need_dl_dparams.then(|| vec![T::zero(); lattice_values.len()]);
    encode_backward_backward_input_into(
        meta,
        dl_ddldx,
        dl_dy,
        positions,
        lattice_values,
        args,
        BwdBwdTargets {
            dl_ddldy: dl_ddldy.as_deref_mut(),
            dl_dparams: dl_dparams.as_deref_mut(),
        },
    )?;
    Ok(BwdBwdOutput {
        dl_ddldy,
        dl_dparams,
    })
}

pub fn encode_backward_backward_input_into<T: Element>(
    meta: &EncodingMeta,
    dl_ddldx: &[f32],
    dl_dy: &[T],
    positions: &[f32],
    lattice_values: &[T],
    args: &EncodeArgs<'_>,
    targets: BwdBwdTargets<'_, T>,
) -> Result<()> {
    let plan = CallPlan::new(meta, positions, lattice_values.len(), args)?;
    let d = plan.dim();
    let n_out = meta.n_encoded_dims();
    check_len("dl_ddldx", plan.n_points * d, dl_ddldx.len())?;
    check_len("dl_dy", plan.n_points * n_out, dl_dy.len())?;
    let BwdBwdTargets {
        dl_ddldy,
        dl_dparams,
    } = targets;
    if let Some(dl_ddldy) = &dl_ddldy {
        check_len("dl_ddldy", plan.n_points * n_out, dl_ddldy.len())?;
    }
    if let Some(dl_dparams) = &dl_dparams {
        check_len("dl_dparams", lattice_values.len(), dl_dparams.len())?;
    }

    tracing::debug!(
        n_points = plan.n_points,
        active_levels = plan.active_levels,
        dl_ddldy = dl_ddldy.is_some(),
        param_grad = dl_dparams.is_some(),
        dtype = T::NAME,
        "permutohedral backward-backward"
    );

    let width = meta.n_feat_per_pseudo_lvl();
    let inactive_start = meta
        .level_out_offsets()
        .get(plan.active_levels)
        .copied()
        .unwrap_or(n_out);
    let acc = dl_dparams
        .as_ref()
        .map(|g| GradAccumulator::zeros(g.len()));

    let point = |i: usize, mut out_row: Option<&mut [T]>, scratch: &mut Scratch| {
        let z = &dl_ddldx[i * d..(i + 1) * d];
        if acc.is_some() {
            for (s, v) in scratch.dy.iter_mut().zip(&dl_dy[i * n_out..(i + 1) * n_out]) {
                *s = v.to_f32();
            }
        }
        let position = &positions[i * d..(i + 1) * d];
        let batch = plan.batch_of(i);

        for level in 0..plan.active_levels {
            let lookup = LevelLookup::new(meta, &plan, level, position, batch);
            let mut wdot = [0.0f32; MAX_DIMS + 1];
            lookup
                .simplex()
                .directional_weights(z, meta.level_scales(level), &mut wdot);
            let wdot = &wdot[..=d];

            for p in meta.pseudo_levels_of(level) {
                if let Some(row) = out_row.as_deref_mut() {
                    lookup.gather(wdot, lattice_values, p.feat_offset, &mut scratch.feat);
                    for (o, &v) in row[p.out_offset..p.out_offset + width]
                        .iter_mut()
                        .zip(&scratch.feat)
                    {
                        *o = T::from_f32(v);
                    }
                }
                if let Some(acc) = &acc {
                    let grad = &scratch.dy[p.out_offset..p.out_offset + width];
                    lookup.scatter(wdot, grad, p.feat_offset, acc);
                }
            }
        }
        if let Some(row) = out_row {
            row[inactive_start..].fill(T::zero());
        }
    };
    let scratch = || Scratch {
        dy: vec![0.0f32; n_out],
        feat: vec![0.0f32; width],
    };

    match dl_ddldy {
        Some(dl_ddldy) => dl_ddldy
            .par_chunks_mut(n_out)
            .enumerate()
            .for_each_init(scratch, |s, (i, row)| point(i, Some(row), s)),
        None if acc.is_some() => (0..plan.n_points)
            .into_par_iter()
            .for_each_init(scratch, |s, i| point(i, None, s)),
        None => {}
    }

    if let (Some(acc), Some(dl_dparams)) = (acc, dl_dparams) {
        acc.add_into(dl_dparams);
    }
    Ok(())
}

struct Scratch {
    dy: Vec<f32>,
    feat: Vec<f32>,
}
