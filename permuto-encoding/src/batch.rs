// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Per-call arguments and their validation
//!
//! Several parameter tables can be stacked back to back in one flat slice.
//! Each query point picks its table through at most one addressing mode:
//! explicit per-point indices, ragged start offsets, or a uniform batch size.

use permuto_math::MAX_SCALED_COORD;

use crate::error::{EncodingError, Result};
use crate::meta::EncodingMeta;

/// Optional arguments shared by every kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeArgs<'a> {
    /// `[n_levels, d]` translation added to the position before scaling
    pub level_random_shifts: Option<&'a [f32]>,
    /// `[N]` table index of each point
    pub batch_inds: Option<&'a [u32]>,
    /// `[B]` first point of each table's run; the last run ends at N
    pub batch_offsets: Option<&'a [u32]>,
    /// Points per table, N must be a multiple
    pub batch_data_size: Option<usize>,
    /// Only levels below this one contribute
    pub max_level: Option<usize>,
}

impl<'a> EncodeArgs<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_random_shifts(mut self, shifts: &'a [f32]) -> Self {
        self.level_random_shifts = Some(shifts);
        self
    }

    pub fn with_batch_inds(mut self, inds: &'a [u32]) -> Self {
        self.batch_inds = Some(inds);
        self
    }

    pub fn with_batch_offsets(mut self, offsets: &'a [u32]) -> Self {
        self.batch_offsets = Some(offsets);
        self
    }

    pub fn with_batch_data_size(mut self, size: usize) -> Self {
        self.batch_data_size = Some(size);
        self
    }

    pub fn with_max_level(mut self, max_level: usize) -> Self {
        self.max_level = Some(max_level);
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum BatchMap<'a> {
    Single,
    Indices(&'a [u32]),
    Offsets(&'a [u32]),
    Uniform(usize),
}

/// A fully validated call: every index a kernel will compute is in range.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallPlan<'a> {
    pub n_points: usize,
    pub n_batches: usize,
    pub active_levels: usize,
    shifts: Option<&'a [f32]>,
    batches: BatchMap<'a>,
    dim: usize,
}

pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(EncodingError::ShapeMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

impl<'a> CallPlan<'a> {
    /// Validate positions, the parameter tables and `args` against `meta`.
    pub fn new(
        meta: &EncodingMeta,
        positions: &[f32],
        n_table_elems: usize,
        args: &EncodeArgs<'a>,
    ) -> Result<Self> {
        let dim = meta.n_dims_to_encode();
        if positions.len() % dim != 0 {
            return Err(EncodingError::ShapeMismatch {
                what: "positions",
                expected: positions.len().next_multiple_of(dim),
                actual: positions.len(),
            });
        }
        let n_points = positions.len() / dim;

        let n_params = meta.n_params();
        if n_table_elems == 0 || n_table_elems % n_params != 0 {
            return Err(EncodingError::ShapeMismatch {
                what: "lattice_values",
                expected: n_table_elems.next_multiple_of(n_params).max(n_params),
                actual: n_table_elems,
            });
        }
        let n_batches = n_table_elems / n_params;

        if let Some(shifts) = args.level_random_shifts {
            check_len("level_random_shifts", meta.n_levels() * dim, shifts.len())?;
        }

        let active_levels = match args.max_level {
            Some(k) if k > meta.n_levels() => {
                return Err(EncodingError::InvalidMaxLevel {
                    max_level: k,
                    n_levels: meta.n_levels(),
                })
            }
            Some(k) => k,
            None => meta.n_levels(),
        };

        Self::check_positions(meta, positions, args.level_random_shifts, active_levels)?;
        let batches = Self::batch_map(args, n_points, n_batches)?;

        Ok(Self {
            n_points,
            n_batches,
            active_levels,
            shifts: args.level_random_shifts,
            batches,
            dim,
        })
    }

    /// Every coordinate must be finite and stay within [`MAX_SCALED_COORD`]
    /// once shifted and scaled on each active level.
    fn check_positions(
        meta: &EncodingMeta,
        positions: &[f32],
        shifts: Option<&[f32]>,
        active_levels: usize,
    ) -> Result<()> {
        let dim = meta.n_dims_to_encode();
        for (point, position) in positions.chunks_exact(dim).enumerate() {
            for (i, &x) in position.iter().enumerate() {
                let in_range = x.is_finite()
                    && (0..active_levels).all(|level| {
                        let shift = shifts.map_or(0.0, |s| s[level * dim + i]);
                        let scaled = (x + shift) * meta.level_scales(level)[i];
                        scaled.is_finite() && scaled.abs() <= MAX_SCALED_COORD
                    });
                if !in_range {
                    return Err(EncodingError::PositionOutOfRange {
                        point,
                        dim: i,
                        value: x,
                    });
                }
            }
        }
        Ok(())
    }

    fn batch_map(
        args: &EncodeArgs<'a>,
        n_points: usize,
        n_batches: usize,
    ) -> Result<BatchMap<'a>> {
        let n_modes = [
            args.batch_inds.is_some(),
            args.batch_offsets.is_some(),
            args.batch_data_size.is_some(),
        ]
        .iter()
        .filter(|&&set| set)
        .count();
        if n_modes > 1 {
            return Err(EncodingError::InvalidBatchLayout(
                "at most one of batch_inds, batch_offsets and batch_data_size may be given".into(),
            ));
        }

        if let Some(inds) = args.batch_inds {
            check_len("batch_inds", n_points, inds.len())?;
            if let Some(point) = inds.iter().position(|&b| b as usize >= n_batches) {
                return Err(EncodingError::BatchIndexOutOfRange {
                    point,
                    index: inds[point] as usize,
                    n_batches,
                });
            }
            return Ok(BatchMap::Indices(inds));
        }

        if let Some(offsets) = args.batch_offsets {
            check_len("batch_offsets", n_batches, offsets.len())?;
            if offsets[0] != 0 {
                return Err(EncodingError::InvalidBatchLayout(format!(
                    "batch_offsets must start at 0, got {}",
                    offsets[0]
                )));
            }
            if offsets.windows(2).any(|w| w[1] < w[0]) {
                return Err(EncodingError::InvalidBatchLayout(
                    "batch_offsets must be non-decreasing".into(),
                ));
            }
            if let Some(&last) = offsets.last() {
                if last as usize > n_points {
                    return Err(EncodingError::InvalidBatchLayout(format!(
                        "batch offset {last} is past the {n_points} points"
                    )));
                }
            }
            return Ok(BatchMap::Offsets(offsets));
        }

        if let Some(size) = args.batch_data_size {
            if size == 0 || n_points % size != 0 {
                return Err(EncodingError::InvalidBatchLayout(format!(
                    "{n_points} points do not split into batches of {size}"
                )));
            }
            let needed = n_points / size;
            if needed > n_batches {
                return Err(EncodingError::BatchIndexOutOfRange {
                    point: n_batches * size,
                    index: n_batches,
                    n_batches,
                });
            }
            return Ok(BatchMap::Uniform(size));
        }

        if n_batches != 1 {
            return Err(EncodingError::InvalidBatchLayout(format!(
                "{n_batches} parameter tables given without batch addressing"
            )));
        }
        Ok(BatchMap::Single)
    }

    /// Parameter table used by `point`.
    #[inline]
    pub fn batch_of(&self, point: usize) -> usize {
        match self.batches {
            BatchMap::Single => 0,
            BatchMap::Indices(inds) => inds[point] as usize,
            BatchMap::Offsets(offsets) => {
                offsets.partition_point(|&start| start as usize <= point) - 1
            }
            BatchMap::Uniform(size) => point / size,
        }
    }

    /// Random shift of `level`, if any.
    #[inline]
    pub fn shift(&self, level: usize) -> Option<&'a [f32]> {
        self.shifts
            .map(|s| &s[level * self.dim..(level + 1) * self.dim])
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}
