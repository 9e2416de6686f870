// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Parameter-owning permutohedral encoder
//!
//! The kernels are stateless over caller-owned slices. [`PermutoEncoder`]
//! bundles a planned layout with its parameter tables and per-level random
//! shifts, and forwards each call to the kernels.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backward::{encode_backward, BackwardOutput};
use crate::batch::EncodeArgs;
use crate::config::EncodingConfig;
use crate::error::{EncodingError, Result};
use crate::forward::encode_forward;
use crate::meta::EncodingMeta;
use crate::second_order::{encode_backward_backward_input, BwdBwdOutput};
use crate::storage::Element;

/// Multi-resolution permutohedral encoder with learned vertex features.
#[derive(Debug, Clone)]
pub struct PermutoEncoder<T: Element = f32> {
    meta: EncodingMeta,
    params: Vec<T>,
    random_shifts: Option<Vec<f32>>,
}

impl<T: Element> PermutoEncoder<T> {
    /// Build with a single parameter table.
    pub fn new(config: &EncodingConfig, seed: u64) -> Result<Self> {
        Self::with_batches(config, 1, seed)
    }

    /// Build with `n_batches` parameter tables stacked back to back.
    ///
    /// Parameters are uniform in `[-init_scale, init_scale]`; shifts, when
    /// enabled, are uniform in `[-shift_scale, shift_scale]`. The same seed
    /// always produces the same encoder.
    pub fn with_batches(config: &EncodingConfig, n_batches: usize, seed: u64) -> Result<Self> {
        if n_batches == 0 {
            return Err(EncodingError::InvalidBatchLayout(
                "at least one parameter table is required".into(),
            ));
        }
        let meta = config.build()?;
        let mut rng = StdRng::seed_from_u64(seed);

        let init = config.init_scale;
        let params = (0..n_batches * meta.n_params())
            .map(|_| T::from_f32(rng.gen_range(-init..=init)))
            .collect();

        let shift = config.shift_scale;
        let random_shifts = config.random_shifts.then(|| {
            (0..meta.n_levels() * meta.n_dims_to_encode())
                .map(|_| rng.gen_range(-shift..=shift))
                .collect()
        });

        tracing::info!(
            n_batches,
            seed,
            dtype = T::NAME,
            random_shifts = config.random_shifts,
            "initialized permutohedral encoder: {}",
            meta.summary()
        );

        Ok(Self {
            meta,
            params,
            random_shifts,
        })
    }

    /// Assemble from an existing layout and tables.
    pub fn from_parts(
        meta: EncodingMeta,
        params: Vec<T>,
        random_shifts: Option<Vec<f32>>,
    ) -> Result<Self> {
        if params.is_empty() || params.len() % meta.n_params() != 0 {
            return Err(EncodingError::ShapeMismatch {
                what: "lattice_values",
                expected: params.len().next_multiple_of(meta.n_params()).max(meta.n_params()),
                actual: params.len(),
            });
        }
        if let Some(shifts) = &random_shifts {
            let expected = meta.n_levels() * meta.n_dims_to_encode();
            if shifts.len() != expected {
                return Err(EncodingError::ShapeMismatch {
                    what: "level_random_shifts",
                    expected,
                    actual: shifts.len(),
                });
            }
        }
        Ok(Self {
            meta,
            params,
            random_shifts,
        })
    }

    pub fn meta(&self) -> &EncodingMeta {
        &self.meta
    }

    pub fn params(&self) -> &[T] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut [T] {
        &mut self.params
    }

    pub fn random_shifts(&self) -> Option<&[f32]> {
        self.random_shifts.as_deref()
    }

    pub fn n_batches(&self) -> usize {
        self.params.len() / self.meta.n_params()
    }

    /// Caller arguments with the encoder's own shifts filled in.
    fn call_args<'a>(&'a self, args: &EncodeArgs<'a>) -> EncodeArgs<'a> {
        EncodeArgs {
            level_random_shifts: args.level_random_shifts.or(self.random_shifts.as_deref()),
            ..*args
        }
    }

    pub fn forward(&self, positions: &[f32], args: &EncodeArgs<'_>) -> Result<Vec<T>> {
        encode_forward(&self.meta, positions, &self.params, &self.call_args(args))
    }

    pub fn backward(
        &self,
        dl_dy: &[T],
        positions: &[f32],
        args: &EncodeArgs<'_>,
        max_pos_dims: usize,
        need_input_grad: bool,
        need_param_grad: bool,
    ) -> Result<BackwardOutput<T>> {
        encode_backward(
            &self.meta,
            dl_dy,
            positions,
            &self.params,
            &self.call_args(args),
            max_pos_dims,
            need_input_grad,
            need_param_grad,
        )
    }

    pub fn backward_backward_input(
        &self,
        dl_ddldx: &[f32],
        dl_dy: &[T],
        positions: &[f32],
        args: &EncodeArgs<'_>,
        need_dl_ddldy: bool,
        need_dl_dparams: bool,
    ) -> Result<BwdBwdOutput<T>> {
        encode_backward_backward_input(
            &self.meta,
            dl_ddldx,
            dl_dy,
            positions,
            &self.params,
            &self.call_args(args),
            need_dl_ddldy,
            need_dl_dparams,
        )
    }

    /// Plain gradient descent step: `V -= lr · grad`.
    pub fn apply_gradient(&mut self, grad: &[T], lr: f32) -> Result<()> {
        if grad.len() != self.params.len() {
            return Err(EncodingError::ShapeMismatch {
                what: "dl_dparams",
                expected: self.params.len(),
                actual: grad.len(),
            });
        }
        for (p, g) in self.params.iter_mut().zip(grad) {
            *p = T::from_f32(p.to_f32() - lr * g.to_f32());
        }
        Ok(())
    }
}
