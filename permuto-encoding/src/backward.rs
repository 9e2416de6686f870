// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! First-order backward pass
//!
//! Given `dL/dy` for every encoded row:
//! - parameter gradient: `dL/dV[row_k][c] += w_k · dL/dy[c]`, summed in f64
//!   and added into the caller's buffer once all points are done;
//! - input gradient: `u_k = Σ_c dL/dy[c] · V[row_k][c]` pulled back through
//!   the barycentric weight Jacobian, summed over active levels.

use rayon::prelude::*;

use permuto_math::MAX_DIMS;

use crate::batch::{check_len, CallPlan, EncodeArgs};
use crate::error::{EncodingError, Result};
use crate::lookup::LevelLookup;
use crate::meta::EncodingMeta;
use crate::storage::{Element, GradAccumulator};

/// Caller-owned destinations of a backward call. A `None` target is skipped.
pub struct BackwardTargets<'a, T> {
    /// `[N, d]`, overwritten
    pub dl_dx: Option<&'a mut [f32]>,
    /// Same layout as the parameter tables, accumulated into
    pub dl_dparams: Option<&'a mut [T]>,
}

#[derive(Debug, Clone)]
pub struct BackwardOutput<T> {
    pub dl_dx: Option<Vec<f32>>,
    pub dl_dparams: Option<Vec<T>>,
}

/// Allocating backward pass. Only the requested gradients are computed.
#[allow(clippy::too_many_arguments)]
pub fn encode_backward<T: Element>(
    meta: &EncodingMeta,
    dl_dy: &[T],
    positions: &[f32],
    lattice_values: &[T],
    args: &EncodeArgs<'_>,
    max_pos_dims: usize,
    need_input_grad: bool,
    need_param_grad: bool,
) -> Result<BackwardOutput<T>> {
    let d = meta.n_dims_to_encode();
    let mut dl_dx = need_input_grad.then(|| vec![0.0f32; positions.len() / d * d]);
    let mut dl_dparams = need_param_grad.then(|| vec![T::zero(); lattice_values.len()]);
    encode_backward_into(
        meta,
        dl_dy,
        positions,
        lattice_values,
        args,
        max_pos_dims,
        BackwardTargets {
            dl_dx: dl_dx.as_deref_mut(),
            dl_dparams: dl_dparams.as_deref_mut(),
        },
    )?;
    Ok(BackwardOutput { dl_dx, dl_dparams })
}

/// Backward pass into caller buffers.
///
/// `dl_dx` is overwritten; only its first `max_pos_dims` columns are
/// computed and the rest are zeroed. `dl_dparams` is accumulated into.
/// Nothing is written unless every argument is valid.
pub fn encode_backward_into<T: Element>(
    meta: &EncodingMeta,
    dl_dy: &[T],
    positions: &[f32],
    lattice_values: &[T],
    args: &EncodeArgs<'_>,
    max_pos_dims: usize,
    targets: BackwardTargets<'_, T>,
) -> Result<()> {
    let plan = CallPlan::new(meta, positions, lattice_values.len(), args)?;
    let d = plan.dim();
    let n_out = meta.n_encoded_dims();
    check_len("dl_dy", plan.n_points * n_out, dl_dy.len())?;
    if max_pos_dims > d {
        return Err(EncodingError::InvalidMaxPosDims {
            max_pos_dims,
            n_dims: d,
        });
    }
    let BackwardTargets { dl_dx, dl_dparams } = targets;
    if let Some(dl_dx) = &dl_dx {
        check_len("dl_dx", plan.n_points * d, dl_dx.len())?;
    }
    if let Some(dl_dparams) = &dl_dparams {
        check_len("dl_dparams", lattice_values.len(), dl_dparams.len())?;
    }

    tracing::debug!(
        n_points = plan.n_points,
        active_levels = plan.active_levels,
        input_grad = dl_dx.is_some(),
        param_grad = dl_dparams.is_some(),
        max_pos_dims,
        dtype = T::NAME,
        "permutohedral backward"
    );

    let width = meta.n_feat_per_pseudo_lvl();
    let acc = dl_dparams
        .as_ref()
        .map(|g| GradAccumulator::zeros(g.len()));

    let point = |i: usize, mut dl_dx_row: Option<&mut [f32]>, dy: &mut [f32]| {
        for (s, v) in dy.iter_mut().zip(&dl_dy[i * n_out..(i + 1) * n_out]) {
            *s = v.to_f32();
        }
        if let Some(row) = dl_dx_row.as_deref_mut() {
            row.fill(0.0);
        }
        let position = &positions[i * d..(i + 1) * d];
        let batch = plan.batch_of(i);

        for level in 0..plan.active_levels {
            let lookup = LevelLookup::new(meta, &plan, level, position, batch);
            let pseudo = meta.pseudo_levels_of(level);

            if let Some(acc) = &acc {
                for p in pseudo {
                    let grad = &dy[p.out_offset..p.out_offset + width];
                    lookup.scatter(lookup.weights(), grad, p.feat_offset, acc);
                }
            }

            if let Some(row) = dl_dx_row.as_deref_mut().filter(|_| max_pos_dims > 0) {
                let mut u = [0.0f32; MAX_DIMS + 1];
                for p in pseudo {
                    let grad = &dy[p.out_offset..p.out_offset + width];
                    lookup.project(grad, lattice_values, p.feat_offset, &mut u[..=d]);
                }
                lookup.simplex().backprop_into(
                    &u[..=d],
                    meta.level_scales(level),
                    &mut row[..max_pos_dims],
                );
            }
        }
    };

    match dl_dx {
        Some(dl_dx) => dl_dx
            .par_chunks_mut(d)
            .enumerate()
            .for_each_init(
                || vec![0.0f32; n_out],
                |dy, (i, row)| point(i, Some(row), dy.as_mut_slice()),
            ),
        None if acc.is_some() => (0..plan.n_points)
            .into_par_iter()
            .for_each_init(|| vec![0.0f32; n_out], |dy, i| point(i, None, dy.as_mut_slice())),
        None => {}
    }

    if let (Some(acc), Some(dl_dparams)) = (acc, dl_dparams) {
        acc.add_into(dl_dparams);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> EncodingMeta {
        EncodingMeta::new(3, 1 << 12, &[2.0, 6.0], &[2, 4]).unwrap()
    }

    fn table(meta: &EncodingMeta) -> Vec<f32> {
        (0..meta.n_params()).map(|i| ((i * 37 % 101) as f32 / 50.0) - 1.0).collect()
    }

    #[test]
    fn test_need_flags_skip_outputs() {
        let meta = meta();
        let values = table(&meta);
        let positions = [0.1f32, 0.2, 0.3];
        let dy = vec![1.0f32; meta.n_encoded_dims()];
        let out = encode_backward(
            &meta,
            &dy,
            &positions,
            &values,
            &EncodeArgs::new(),
            3,
            false,
            false,
        )
        .unwrap();
        assert!(out.dl_dx.is_none());
        assert!(out.dl_dparams.is_none());

        let out = encode_backward(
            &meta,
            &dy,
            &positions,
            &values,
            &EncodeArgs::new(),
            3,
            true,
            true,
        )
        .unwrap();
        assert_eq!(out.dl_dx.unwrap().len(), 3);
        assert_eq!(out.dl_dparams.unwrap().len(), meta.n_params());
    }

    #[test]
    fn test_param_grad_mass_equals_upstream_sum() {
        // Weights sum to one, so each level's gradient mass equals Σ dL/dy
        let meta = meta();
        let values = table(&meta);
        let positions = [0.1f32, 0.2, 0.3, -0.5, 0.45, 0.9];
        let dy: Vec<f32> = (0..2 * meta.n_encoded_dims()).map(|i| i as f32 * 0.25).collect();
        let out = encode_backward(
            &meta,
            &dy,
            &positions,
            &values,
            &EncodeArgs::new(),
            3,
            false,
            true,
        )
        .unwrap();
        let grads = out.dl_dparams.unwrap();
        let total: f32 = grads.iter().sum();
        let expected: f32 = dy.iter().sum();
        assert!((total - expected).abs() < 1e-3, "{total} vs {expected}");
    }

    #[test]
    fn test_param_grad_accumulates_into_existing() {
        let meta = meta();
        let values = table(&meta);
        let positions = [0.3f32, -0.1, 0.2];
        let dy = vec![1.0f32; meta.n_encoded_dims()];
        let fresh = encode_backward(
            &meta,
            &dy,
            &positions,
            &values,
            &EncodeArgs::new(),
            3,
            false,
            true,
        )
        .unwrap()
        .dl_dparams
        .unwrap();

        let mut grads = vec![1.0f32; meta.n_params()];
        encode_backward_into(
            &meta,
            &dy,
            &positions,
            &values,
            &EncodeArgs::new(),
            3,
            BackwardTargets {
                dl_dx: None,
                dl_dparams: Some(&mut grads),
            },
        )
        .unwrap();
        for (g, f) in grads.iter().zip(&fresh) {
            assert!((g - 1.0 - f).abs() < 1e-6);
        }
    }

    #[test]
    fn test_max_pos_dims_zeroes_tail() {
        let meta = meta();
        let values = table(&meta);
        let positions = [0.13f32, -0.41, 0.27];
        let dy = vec![0.5f32; meta.n_encoded_dims()];
        let full = encode_backward(
            &meta,
            &dy,
            &positions,
            &values,
            &EncodeArgs::new(),
            3,
            true,
            false,
        )
        .unwrap()
        .dl_dx
        .unwrap();

        let mut dl_dx = vec![9.0f32; 3];
        encode_backward_into(
            &meta,
            &dy,
            &positions,
            &values,
            &EncodeArgs::new(),
            2,
            BackwardTargets {
                dl_dx: Some(&mut dl_dx),
                dl_dparams: None,
            },
        )
        .unwrap();
        assert_eq!(&dl_dx[..2], &full[..2]);
        assert_eq!(dl_dx[2], 0.0);
    }

    #[test]
    fn test_invalid_max_pos_dims() {
        let meta = meta();
        let values = table(&meta);
        let dy = vec![0.5f32; meta.n_encoded_dims()];
        let err = encode_backward(&meta, &dy, &[0.0; 3], &values, &EncodeArgs::new(), 4, true, true)
            .unwrap_err();
        assert_eq!(
            err,
            EncodingError::InvalidMaxPosDims {
                max_pos_dims: 4,
                n_dims: 3
            }
        );
    }
}
