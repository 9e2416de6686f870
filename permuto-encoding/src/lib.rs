// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Multi-resolution permutohedral lattice feature encoding
//!
//! Maps low-dimensional coordinates to feature vectors by interpolating learned
//! per-vertex features on a stack of permutohedral lattices, one per
//! resolution level. Each level touches only d+1 vertices per query.
//!
//! - [`EncodingMeta`]: immutable layout of levels, tables and output columns
//! - [`EncodingConfig`]: serde configuration with presets, builds a meta
//! - [`encode_forward`], [`encode_backward`], [`encode_backward_backward_input`]:
//!   stateless kernels over caller-owned flat slices
//! - [`PermutoEncoder`]: owns a parameter table and random shifts

pub mod backward;
pub mod batch;
pub mod config;
pub mod encoder;
pub mod error;
pub mod forward;
mod lookup;
pub mod meta;
pub mod second_order;
pub mod storage;

use std::ops::RangeInclusive;

pub use backward::{encode_backward, encode_backward_into, BackwardOutput, BackwardTargets};
pub use batch::EncodeArgs;
pub use config::{geometric_res_list, EncodingConfig};
pub use encoder::PermutoEncoder;
pub use error::{EncodingError, Result};
pub use forward::{encode_forward, encode_forward_into};
pub use meta::{build_meta, EncodingMeta, PseudoLevel};
pub use second_order::{
    encode_backward_backward_input, encode_backward_backward_input_into, BwdBwdOutput,
    BwdBwdTargets,
};
pub use storage::{Element, GradAccumulator};

pub use permuto_math::random_rotation_in_zero_sum_subspace;

/// Input dimensionalities the encoder accepts.
pub const SUPPORTED_N_INPUT_DIMS: RangeInclusive<usize> = 2..=permuto_math::MAX_DIMS;

/// Fewest resolution levels per encoding.
pub const MIN_LEVELS: usize = 2;

/// Most resolution levels per encoding.
pub const MAX_LEVELS: usize = 20;

/// The encoded domain is `[-DOMAIN_HALF_EXTENT, DOMAIN_HALF_EXTENT]^d`.
pub const DOMAIN_HALF_EXTENT: f64 = 1.0;
