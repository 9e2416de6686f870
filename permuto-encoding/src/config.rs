// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Encoding configuration
//!
//! Serde-loadable description of an encoding: lattice dimensionality, the
//! resolution schedule, feature widths, and how the parameter table and
//! per-level random shifts are initialized.

use serde::{Deserialize, Serialize};

use crate::error::{EncodingError, Result};
use crate::meta::EncodingMeta;

fn default_shift_scale() -> f32 {
    10.0
}

fn default_init_scale() -> f32 {
    1e-4
}

/// Full configuration of a permutohedral encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// Input dimensionality
    pub n_input_dim: usize,
    /// Row cap of each level's table; larger levels are hashed into this many rows
    pub hashmap_size: usize,
    /// Lattice resolution per level (vertex spacings per unit of input)
    pub res_list: Vec<f64>,
    /// Feature width per level
    pub n_feats_list: Vec<usize>,
    /// Offset every level by a random translation
    #[serde(default)]
    pub random_shifts: bool,
    /// Shifts are drawn uniformly from `[-shift_scale, shift_scale]`
    #[serde(default = "default_shift_scale")]
    pub shift_scale: f32,
    /// Parameters are drawn uniformly from `[-init_scale, init_scale]`
    #[serde(default = "default_init_scale")]
    pub init_scale: f32,
}

/// Geometric resolution schedule from `min_res` to `max_res` over `n_levels`.
pub fn geometric_res_list(min_res: f64, max_res: f64, n_levels: usize) -> Vec<f64> {
    match n_levels {
        0 => Vec::new(),
        1 => vec![min_res],
        _ => {
            let growth = (max_res / min_res).powf(1.0 / (n_levels - 1) as f64);
            (0..n_levels).map(|l| min_res * growth.powi(l as i32)).collect()
        }
    }
}

impl EncodingConfig {
    /// Uniform widths over a geometric resolution schedule.
    pub fn geometric(
        n_input_dim: usize,
        hashmap_size: usize,
        min_res: f64,
        max_res: f64,
        n_levels: usize,
        n_feats: usize,
    ) -> Self {
        Self {
            n_input_dim,
            hashmap_size,
            res_list: geometric_res_list(min_res, max_res, n_levels),
            n_feats_list: vec![n_feats; n_levels],
            random_shifts: false,
            shift_scale: default_shift_scale(),
            init_scale: default_init_scale(),
        }
    }

    /// Signed distance field setup: 16 levels of 2 features from
    /// resolution 4 to 256, 2^18 rows, randomly shifted levels.
    pub fn permuto_sdf(n_input_dim: usize) -> Self {
        Self {
            random_shifts: true,
            ..Self::geometric(n_input_dim, 1 << 18, 4.0, 256.0, 16, 2)
        }
    }

    /// Small setup used by the tests and the quick benchmark.
    pub fn small(n_input_dim: usize) -> Self {
        Self::geometric(n_input_dim, 1 << 14, 4.0, 64.0, 4, 2)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check initialization settings. Layout settings are checked by [`build`](Self::build).
    pub fn validate(&self) -> Result<()> {
        if !self.shift_scale.is_finite() || self.shift_scale < 0.0 {
            return Err(EncodingError::Config(format!(
                "shift_scale must be finite and non-negative, got {}",
                self.shift_scale
            )));
        }
        if !self.init_scale.is_finite() || self.init_scale < 0.0 {
            return Err(EncodingError::Config(format!(
                "init_scale must be finite and non-negative, got {}",
                self.init_scale
            )));
        }
        Ok(())
    }

    pub fn build(&self) -> Result<EncodingMeta> {
        self.validate()?;
        EncodingMeta::new(
            self.n_input_dim,
            self.hashmap_size,
            &self.res_list,
            &self.n_feats_list,
        )
    }
}
