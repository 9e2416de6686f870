// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Encoding layout planner
//!
//! [`EncodingMeta`] fixes everything about an encoding that does not depend on
//! the data: per-level lattice scales, table sizes, where each level lives in
//! the flat parameter table and in the output row, and which levels are
//! indexed densely.
//!
//! Levels may have different feature widths. Kernels work in units of
//! *pseudo-levels* of a single canonical width (the gcd of all widths), so a
//! level of width `n` is split into `n / gcd` pseudo-levels that share one
//! simplex traversal.

use serde::Serialize;

use permuto_math::{KeyIndexer, PermutohedralLattice, MAX_SCALED_COORD};

use crate::error::{EncodingError, Result};
use crate::{DOMAIN_HALF_EXTENT, MAX_LEVELS, MIN_LEVELS, SUPPORTED_N_INPUT_DIMS};

/// One fixed-width slice of a level's feature row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PseudoLevel {
    /// Real level this slice belongs to
    pub level: usize,
    /// Index of the slice within the level
    pub cnt: usize,
    /// First feature column of the slice within a parameter row
    pub feat_offset: usize,
    /// First column of the slice in the encoded output row
    pub out_offset: usize,
}

/// Immutable layout of a multi-level permutohedral encoding.
#[derive(Debug, Clone, Serialize)]
pub struct EncodingMeta {
    n_dims_to_encode: usize,
    n_levels: usize,
    n_pseudo_levels: usize,
    n_feat_per_pseudo_lvl: usize,
    hashmap_size: usize,
    res_list: Vec<f64>,
    level_scales_multidim: Vec<Vec<f32>>,
    level_scales0: Vec<f32>,
    level_n_feats: Vec<usize>,
    level_sizes: Vec<usize>,
    level_n_params: Vec<usize>,
    level_offsets: Vec<usize>,
    level_out_offsets: Vec<usize>,
    level_dense: Vec<bool>,
    map_levels: Vec<usize>,
    map_cnt: Vec<usize>,
    pseudo_levels: Vec<PseudoLevel>,
    /// First pseudo-level of each real level, plus a trailing end marker
    #[serde(skip)]
    level_pseudo_start: Vec<usize>,
    n_encoded_dims: usize,
    n_params: usize,
    #[serde(skip)]
    lattice: PermutohedralLattice,
    #[serde(skip)]
    indexers: Vec<KeyIndexer>,
}

/// Plan an encoding. Same as [`EncodingMeta::new`].
pub fn build_meta(
    n_input_dim: usize,
    hashmap_size: usize,
    res_list: &[f64],
    n_feats_list: &[usize],
) -> Result<EncodingMeta> {
    EncodingMeta::new(n_input_dim, hashmap_size, res_list, n_feats_list)
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

impl EncodingMeta {
    /// Plan an encoding of `n_input_dim`-dimensional points with one level per
    /// entry of `res_list`.
    ///
    /// Levels whose reachable vertex count fits in `hashmap_size` rows get a
    /// dense collision-free table of exactly that count; the others get
    /// `hashmap_size` hashed rows.
    pub fn new(
        n_input_dim: usize,
        hashmap_size: usize,
        res_list: &[f64],
        n_feats_list: &[usize],
    ) -> Result<Self> {
        if !SUPPORTED_N_INPUT_DIMS.contains(&n_input_dim) {
            return Err(EncodingError::UnsupportedInputDims {
                n: n_input_dim,
                min: *SUPPORTED_N_INPUT_DIMS.start(),
                max: *SUPPORTED_N_INPUT_DIMS.end(),
            });
        }
        if res_list.len() != n_feats_list.len() {
            return Err(EncodingError::LengthMismatch {
                res: res_list.len(),
                feats: n_feats_list.len(),
            });
        }
        let n_levels = res_list.len();
        if !(MIN_LEVELS..=MAX_LEVELS).contains(&n_levels) {
            return Err(EncodingError::LevelCount {
                n: n_levels,
                min: MIN_LEVELS,
                max: MAX_LEVELS,
            });
        }
        if hashmap_size == 0 {
            return Err(EncodingError::InvalidHashmapSize);
        }
        for (level, (&res, &n_feats)) in res_list.iter().zip(n_feats_list).enumerate() {
            if n_feats < 2 {
                return Err(EncodingError::FeatureWidth { level, n_feats });
            }
            if !res.is_finite() || res <= 0.0 {
                return Err(EncodingError::InvalidResolution { level, res });
            }
        }

        let lattice = PermutohedralLattice::new(n_input_dim);
        let mut level_scales_multidim = Vec::with_capacity(n_levels);
        let mut indexers = Vec::with_capacity(n_levels);
        let mut level_sizes = Vec::with_capacity(n_levels);
        let mut level_n_params = Vec::with_capacity(n_levels);
        let mut level_offsets = Vec::with_capacity(n_levels);
        let mut level_out_offsets = Vec::with_capacity(n_levels);
        let mut n_params = 0usize;
        let mut n_encoded_dims = 0usize;

        for (level, (&res, &n_feats)) in res_list.iter().zip(n_feats_list).enumerate() {
            let scales = lattice.scales_for_resolution(res);
            let reach = f64::from(MAX_SCALED_COORD) / DOMAIN_HALF_EXTENT;
            if scales.iter().any(|&v| !v.is_finite() || f64::from(v) > reach) {
                return Err(EncodingError::InvalidResolution { level, res });
            }
            let indexer = KeyIndexer::for_level(&scales, DOMAIN_HALF_EXTENT, hashmap_size);
            let size = indexer.size();
            let params = size
                .checked_mul(n_feats)
                .ok_or(EncodingError::TableTooLarge { level })?;

            level_offsets.push(n_params);
            level_out_offsets.push(n_encoded_dims);
            n_params = n_params
                .checked_add(params)
                .ok_or(EncodingError::TableTooLarge { level })?;
            n_encoded_dims += n_feats;

            level_sizes.push(size);
            level_n_params.push(params);
            level_scales_multidim.push(scales);
            indexers.push(indexer);
        }

        let n_feat_per_pseudo_lvl = n_feats_list.iter().copied().fold(0, gcd);
        let mut pseudo_levels = Vec::new();
        let mut level_pseudo_start = Vec::with_capacity(n_levels + 1);
        for (level, &n_feats) in n_feats_list.iter().enumerate() {
            level_pseudo_start.push(pseudo_levels.len());
            for cnt in 0..n_feats / n_feat_per_pseudo_lvl {
                let feat_offset = cnt * n_feat_per_pseudo_lvl;
                pseudo_levels.push(PseudoLevel {
                    level,
                    cnt,
                    feat_offset,
                    out_offset: level_out_offsets[level] + feat_offset,
                });
            }
        }
        level_pseudo_start.push(pseudo_levels.len());

        let meta = Self {
            n_dims_to_encode: n_input_dim,
            n_levels,
            n_pseudo_levels: pseudo_levels.len(),
            n_feat_per_pseudo_lvl,
            hashmap_size,
            res_list: res_list.to_vec(),
            level_scales0: level_scales_multidim.iter().map(|s| s[0]).collect(),
            level_scales_multidim,
            level_n_feats: n_feats_list.to_vec(),
            level_sizes,
            level_n_params,
            level_offsets,
            level_out_offsets,
            level_dense: indexers.iter().map(KeyIndexer::is_dense).collect(),
            map_levels: pseudo_levels.iter().map(|p| p.level).collect(),
            map_cnt: pseudo_levels.iter().map(|p| p.cnt).collect(),
            pseudo_levels,
            level_pseudo_start,
            n_encoded_dims,
            n_params,
            lattice,
            indexers,
        };

        let n_dense = meta.n_dense_levels();
        tracing::info!(
            n_dims = n_input_dim,
            n_levels,
            n_dense,
            n_hashed = n_levels - n_dense,
            n_params,
            n_encoded_dims,
            "planned permutohedral encoding"
        );
        if n_dense == 0 {
            tracing::warn!(
                hashmap_size,
                "every level exceeds the hashmap size, all levels are hashed"
            );
        }

        Ok(meta)
    }

    pub fn n_dims_to_encode(&self) -> usize {
        self.n_dims_to_encode
    }

    pub fn n_levels(&self) -> usize {
        self.n_levels
    }

    pub fn n_pseudo_levels(&self) -> usize {
        self.n_pseudo_levels
    }

    pub fn n_feat_per_pseudo_lvl(&self) -> usize {
        self.n_feat_per_pseudo_lvl
    }

    pub fn hashmap_size(&self) -> usize {
        self.hashmap_size
    }

    pub fn res_list(&self) -> &[f64] {
        &self.res_list
    }

    /// Per-dimension lattice scale of `level`.
    pub fn level_scales(&self, level: usize) -> &[f32] {
        &self.level_scales_multidim[level]
    }

    pub fn level_scales_multidim(&self) -> &[Vec<f32>] {
        &self.level_scales_multidim
    }

    pub fn level_scales0(&self) -> &[f32] {
        &self.level_scales0
    }

    pub fn level_n_feats(&self) -> &[usize] {
        &self.level_n_feats
    }

    pub fn level_sizes(&self) -> &[usize] {
        &self.level_sizes
    }

    pub fn level_n_params(&self) -> &[usize] {
        &self.level_n_params
    }

    pub fn level_offsets(&self) -> &[usize] {
        &self.level_offsets
    }

    pub fn level_out_offsets(&self) -> &[usize] {
        &self.level_out_offsets
    }

    pub fn level_dense(&self) -> &[bool] {
        &self.level_dense
    }

    pub fn n_dense_levels(&self) -> usize {
        self.level_dense.iter().filter(|&&d| d).count()
    }

    pub fn map_levels(&self) -> &[usize] {
        &self.map_levels
    }

    pub fn map_cnt(&self) -> &[usize] {
        &self.map_cnt
    }

    pub fn pseudo_levels(&self) -> &[PseudoLevel] {
        &self.pseudo_levels
    }

    /// The pseudo-levels of one real level, in column order.
    pub fn pseudo_levels_of(&self, level: usize) -> &[PseudoLevel] {
        &self.pseudo_levels[self.level_pseudo_start[level]..self.level_pseudo_start[level + 1]]
    }

    /// Width of one encoded output row.
    pub fn n_encoded_dims(&self) -> usize {
        self.n_encoded_dims
    }

    /// Elements in one parameter table.
    pub fn n_params(&self) -> usize {
        self.n_params
    }

    pub fn lattice(&self) -> &PermutohedralLattice {
        &self.lattice
    }

    pub fn indexer(&self, level: usize) -> &KeyIndexer {
        &self.indexers[level]
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        format!(
            "d={} levels={} (dense {}) pseudo_levels={}x{} params={} out_dims={}",
            self.n_dims_to_encode,
            self.n_levels,
            self.n_dense_levels(),
            self.n_pseudo_levels,
            self.n_feat_per_pseudo_lvl,
            self.n_params,
            self.n_encoded_dims
        )
    }
}
