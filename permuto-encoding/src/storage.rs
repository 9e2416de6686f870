// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Parameter storage dtypes and gradient accumulation
//!
//! Lattice parameters may be stored as `f32` or IEEE 754 half precision
//! (`half::f16`, 50% memory savings). All interpolation arithmetic is done in
//! f32 regardless of storage. Parameter gradients are summed in f64 through
//! [`GradAccumulator`] and converted to the storage dtype once at the end.

use half::f16;
use std::sync::atomic::{AtomicU64, Ordering};

/// A storage element of the lattice parameter table and of encoded features.
pub trait Element: Copy + Default + Send + Sync + PartialEq + std::fmt::Debug + 'static {
    /// Short dtype name, used in logs.
    const NAME: &'static str;

    fn to_f32(self) -> f32;
    fn from_f32(v: f32) -> Self;

    fn zero() -> Self {
        Self::from_f32(0.0)
    }
}

impl Element for f32 {
    const NAME: &'static str = "f32";

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

impl Element for f16 {
    const NAME: &'static str = "f16";

    #[inline]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        f16::from_f32(v)
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

/// Convert an f32 slice to any storage dtype.
pub fn from_f32_slice<T: Element>(data: &[f32]) -> Vec<T> {
    data.iter().map(|&v| T::from_f32(v)).collect()
}

/// Convert storage values to f32.
pub fn to_f32_vec<T: Element>(data: &[T]) -> Vec<f32> {
    data.iter().map(|v| v.to_f32()).collect()
}

// ---------------------------------------------------------------------------
// Gradient accumulation
// ---------------------------------------------------------------------------

/// Shared f64 accumulation buffer with lock-free atomic adds.
///
/// Many workers may add into the same slot concurrently (several queries, or
/// several hashed vertices, resolving to one parameter row). Addition is the
/// only write, so the final sum does not depend on scheduling beyond f64
/// rounding.
pub struct GradAccumulator {
    slots: Vec<AtomicU64>,
}

impl GradAccumulator {
    pub fn zeros(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || AtomicU64::new(0f64.to_bits()));
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Atomically add `value` to slot `idx`.
    #[inline]
    pub fn add(&self, idx: usize, value: f64) {
        if value == 0.0 {
            return;
        }
        let slot = &self.slots[idx];
        let mut current = slot.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match slot.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                // Retry on contention
                Err(actual) => current = actual,
            }
        }
    }

    pub fn get(&self, idx: usize) -> f64 {
        f64::from_bits(self.slots[idx].load(Ordering::Relaxed))
    }

    /// Add the accumulated sums into `out`, converting to the storage dtype.
    pub fn add_into<T: Element>(self, out: &mut [T]) {
        assert_eq!(out.len(), self.slots.len());
        for (o, slot) in out.iter_mut().zip(self.slots) {
            let sum = f64::from_bits(slot.into_inner());
            if sum != 0.0 {
                *o = T::from_f32((o.to_f32() as f64 + sum) as f32);
            }
        }
    }
}
