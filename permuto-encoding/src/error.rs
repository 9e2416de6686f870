// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodingError {
    #[error("unsupported input dimensionality {n}: supported range is {min}..={max}")]
    UnsupportedInputDims { n: usize, min: usize, max: usize },

    #[error("number of levels must be in {min}..={max}, got {n}")]
    LevelCount { n: usize, min: usize, max: usize },

    #[error("res_list has {res} entries but n_feats_list has {feats}")]
    LengthMismatch { res: usize, feats: usize },

    #[error("level {level} has {n_feats} features, at least 2 are required")]
    FeatureWidth { level: usize, n_feats: usize },

    #[error("level {level} has invalid resolution {res}")]
    InvalidResolution { level: usize, res: f64 },

    #[error("hashmap size must be positive")]
    InvalidHashmapSize,

    #[error("parameter table of level {level} overflows the address space")]
    TableTooLarge { level: usize },

    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("batch index {index} of point {point} is out of range for {n_batches} tables")]
    BatchIndexOutOfRange {
        point: usize,
        index: usize,
        n_batches: usize,
    },

    #[error("invalid batch layout: {0}")]
    InvalidBatchLayout(String),

    #[error("max_level {max_level} exceeds the {n_levels} available levels")]
    InvalidMaxLevel { max_level: usize, n_levels: usize },

    #[error("coordinate {dim} of point {point} is {value}: not finite or out of range")]
    PositionOutOfRange { point: usize, dim: usize, value: f32 },

    #[error("max_pos_dims {max_pos_dims} exceeds the {n_dims} encoded dimensions")]
    InvalidMaxPosDims { max_pos_dims: usize, n_dims: usize },

    #[error("invalid config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EncodingError>;

impl From<serde_json::Error> for EncodingError {
    fn from(e: serde_json::Error) -> Self {
        EncodingError::Config(e.to_string())
    }
}

impl EncodingError {
    /// True for errors raised while planning a layout, before any data is seen.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedInputDims { .. }
                | Self::LevelCount { .. }
                | Self::LengthMismatch { .. }
                | Self::FeatureWidth { .. }
                | Self::InvalidResolution { .. }
                | Self::InvalidHashmapSize
                | Self::TableTooLarge { .. }
                | Self::Config(_)
        )
    }
}
