// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Forward encoding
//!
//! For every point and every active level: locate the enclosing simplex once,
//! then for each pseudo-level of that level interpolate the d+1 vertex rows
//! into the level's output columns. Points are independent and processed in
//! parallel; inactive levels are written as zero.

use rayon::prelude::*;

use crate::batch::{check_len, CallPlan, EncodeArgs};
use crate::error::Result;
use crate::lookup::LevelLookup;
use crate::meta::EncodingMeta;
use crate::storage::Element;

/// Encode `positions` (`[N, d]`) into a new `[N, n_encoded_dims]` buffer.
pub fn encode_forward<T: Element>(
    meta: &EncodingMeta,
    positions: &[f32],
    lattice_values: &[T],
    args: &EncodeArgs<'_>,
) -> Result<Vec<T>> {
    let n_points = positions.len() / meta.n_dims_to_encode();
    let mut out = vec![T::zero(); n_points * meta.n_encoded_dims()];
    encode_forward_into(meta, positions, lattice_values, args, &mut out)?;
    Ok(out)
}

/// Encode `positions` into `out`. Nothing is written unless every argument
/// is valid.
pub fn encode_forward_into<T: Element>(
    meta: &EncodingMeta,
    positions: &[f32],
    lattice_values: &[T],
    args: &EncodeArgs<'_>,
    out: &mut [T],
) -> Result<()> {
    let plan = CallPlan::new(meta, positions, lattice_values.len(), args)?;
    let n_out = meta.n_encoded_dims();
    check_len("output", plan.n_points * n_out, out.len())?;

    tracing::debug!(
        n_points = plan.n_points,
        n_batches = plan.n_batches,
        active_levels = plan.active_levels,
        dtype = T::NAME,
        "permutohedral forward"
    );

    let d = plan.dim();
    let width = meta.n_feat_per_pseudo_lvl();
    let inactive_start = meta
        .level_out_offsets()
        .get(plan.active_levels)
        .copied()
        .unwrap_or(n_out);

    out.par_chunks_mut(n_out)
        .enumerate()
        .for_each_init(
            || vec![0.0f32; width],
            |feat, (i, row)| {
                let position = &positions[i * d..(i + 1) * d];
                let batch = plan.batch_of(i);
                for level in 0..plan.active_levels {
                    let lookup = LevelLookup::new(meta, &plan, level, position, batch);
                    for p in meta.pseudo_levels_of(level) {
                        lookup.gather(lookup.weights(), lattice_values, p.feat_offset, feat);
                        let cols = &mut row[p.out_offset..p.out_offset + width];
                        for (o, &v) in cols.iter_mut().zip(feat.iter()) {
                            *o = T::from_f32(v);
                        }
                    }
                }
                row[inactive_start..].fill(T::zero());
            },
        );

    Ok(())
}
