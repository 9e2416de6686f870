// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Vertex key → parameter row resolution
//!
//! A vertex key with remainder class `k` has coordinates `keyᵢ = k + (d+1)·qᵢ`.
//! Over a bounded input box every `qᵢ` lives in a bounded window, so the keys
//! reachable from the box can be numbered with a mixed radix over `(k, q)`.
//! When that analytic count fits in the table the index is bijective
//! ([`KeyIndexer::Dense`]); otherwise keys are hashed into a fixed number of
//! rows and collisions are accepted ([`KeyIndexer::Hashed`]).

use serde::{Deserialize, Serialize};

use super::LatticeKey;

/// Multiplier of the spatial hash.
const HASH_PRIME: u32 = 2_531_011;

/// Largest quotient magnitude a dense window may span; f64 is exact below it.
const QUOTIENT_LIMIT: f64 = (1u64 << 52) as f64;

/// Stateless key → row mapping for one lattice level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyIndexer {
    /// Bijective mixed-radix index over the keys reachable from the domain.
    ///
    /// Keys outside the window wrap periodically, so the index is total and
    /// stays collision-free for any translate of the domain box.
    Dense {
        dim: usize,
        q_min: Vec<i64>,
        extents: Vec<u64>,
        strides: Vec<u64>,
        size: usize,
    },
    /// Spatial hash modulo `size`.
    Hashed { size: usize },
}

impl KeyIndexer {
    /// Per-coordinate quotient windows `(q_min, extent)` of keys reachable
    /// from `[-half_extent, half_extent]^d` at the given scales, or `None` if
    /// a window does not fit in i64.
    fn quotient_windows(scales: &[f32], half_extent: f64) -> Option<Vec<(i64, u64)>> {
        let d = scales.len();
        let dp1 = (d + 1) as f64;
        // A vertex key is at most 5(d+1)/2 away from the elevated point
        let margin = 3.0 * dp1;
        let s: Vec<f64> = scales.iter().map(|&v| v.abs() as f64 * half_extent).collect();

        (0..d)
            .map(|i| {
                // Bound of elevated coordinate i: Σ_{m≥i} s_m + i·s_{i-1}
                let tail: f64 = s[i..].iter().sum();
                let bound = if i == 0 { tail } else { tail + i as f64 * s[i - 1] };
                let lo = ((-bound - margin - d as f64) / dp1).floor();
                let hi = ((bound + margin) / dp1).ceil();
                let fits = |v: f64| v.is_finite() && v.abs() <= QUOTIENT_LIMIT;
                if !(fits(lo) && fits(hi)) {
                    return None;
                }
                let (q_min, q_max) = (lo as i64, hi as i64);
                let extent = q_max.checked_sub(q_min)?.checked_add(1)?;
                Some((q_min, u64::try_from(extent).ok()?))
            })
            .collect()
    }

    /// Number of lattice vertices a query in `[-half_extent, half_extent]^d`
    /// can touch, or `None` if it overflows.
    pub fn analytic_vertex_count(scales: &[f32], half_extent: f64) -> Option<u64> {
        let dp1 = scales.len() as u64 + 1;
        Self::quotient_windows(scales, half_extent)?
            .iter()
            .try_fold(dp1, |acc, &(_, extent)| acc.checked_mul(extent))
    }

    /// Dense indexer for the domain box, or `None` if the count overflows.
    pub fn dense(scales: &[f32], half_extent: f64) -> Option<Self> {
        let windows = Self::quotient_windows(scales, half_extent)?;
        let dp1 = scales.len() as u64 + 1;

        let mut strides = Vec::with_capacity(windows.len());
        let mut stride = 1u64;
        for &(_, extent) in &windows {
            strides.push(stride);
            stride = stride.checked_mul(extent)?;
        }
        let size = usize::try_from(stride.checked_mul(dp1)?).ok()?;

        Some(Self::Dense {
            dim: scales.len(),
            q_min: windows.iter().map(|w| w.0).collect(),
            extents: windows.iter().map(|w| w.1).collect(),
            strides,
            size,
        })
    }

    pub fn hashed(size: usize) -> Self {
        assert!(size > 0, "Hash table size must be positive");
        Self::Hashed { size }
    }

    /// Dense when the analytic count fits in `capacity` rows, hashed otherwise.
    pub fn for_level(scales: &[f32], half_extent: f64, capacity: usize) -> Self {
        match Self::dense(scales, half_extent) {
            Some(dense) if dense.size() <= capacity => dense,
            _ => Self::hashed(capacity),
        }
    }

    /// Number of addressable rows.
    pub fn size(&self) -> usize {
        match self {
            Self::Dense { size, .. } | Self::Hashed { size } => *size,
        }
    }

    pub fn is_dense(&self) -> bool {
        matches!(self, Self::Dense { .. })
    }

    /// Row of `key`, always in `[0, size)`.
    pub fn resolve(&self, key: &LatticeKey) -> usize {
        match self {
            Self::Dense {
                dim,
                q_min,
                extents,
                strides,
                ..
            } => {
                debug_assert_eq!(key.dimension(), *dim);
                let dp1 = *dim as i64 + 1;
                let k = key.remainder() as i64;
                let mut linear = 0u64;
                for (i, &c) in key.coords().iter().enumerate() {
                    let q = (c as i64 - k).div_euclid(dp1);
                    let offset = (q - q_min[i]).rem_euclid(extents[i] as i64) as u64;
                    linear += offset * strides[i];
                }
                (k as u64 + dp1 as u64 * linear) as usize
            }
            Self::Hashed { size } => {
                let mut h = 0u32;
                for &c in key.coords() {
                    h = h.wrapping_add(c as u32).wrapping_mul(HASH_PRIME);
                }
                (h as u64 % *size as u64) as usize
            }
        }
    }
}
