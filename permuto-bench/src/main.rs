// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Permutohedral Encoding Benchmarks and Validation
//!
//! Measures:
//! 1. Forward, backward and backward-of-backward throughput (f32 and f16 tables)
//! 2. Input gradient vs central finite differences
//! 3. Bilinear identity between the backward and second-order passes
//! 4. Zero-sum subspace rotations
//!
//! Usage: `permuto-bench [config.json]`. Without a config the 3D signed
//! distance field preset is used. Set `RUST_LOG=debug` for per-call logs.

use std::time::Instant;

use anyhow::{Context, Result};
use half::f16;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use permuto_encoding::storage::from_f32_slice;
use permuto_encoding::{
    encode_backward, encode_backward_backward_input, encode_forward, Element, EncodeArgs,
    EncodingConfig, EncodingMeta, PermutoEncoder,
};
use permuto_math::random_rotation_in_zero_sum_subspace;

const N_POINTS: usize = 1 << 16;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("permuto_encoding=info".parse()?),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {path}"))?;
            EncodingConfig::from_json(&json).with_context(|| format!("parsing config {path}"))?
        }
        None => EncodingConfig::permuto_sdf(3),
    };

    println!("=== Permutohedral Encoding Benchmarks ===\n");
    let encoder = PermutoEncoder::<f32>::new(&config, 42).context("building encoder")?;
    let meta = encoder.meta();
    println!("{}", serde_json::to_string_pretty(meta)?);
    println!("{}\n", meta.summary());

    let mut rng = StdRng::seed_from_u64(7);
    let d = meta.n_dims_to_encode();
    let positions: Vec<f32> = (0..N_POINTS * d).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let shifts = encoder.random_shifts().map(<[f32]>::to_vec);
    let args = match &shifts {
        Some(s) => EncodeArgs::new().with_random_shifts(s),
        None => EncodeArgs::new(),
    };

    bench_kernels::<f32>(meta, &positions, encoder.params(), &args, &mut rng)?;
    let scaled: Vec<f32> = encoder.params().iter().map(|&v| v * 1e3).collect();
    let params16: Vec<f16> = from_f32_slice(&scaled);
    bench_kernels::<f16>(meta, &positions, &params16, &args, &mut rng)?;

    println!("=== Validation ===\n");
    validate_input_gradient(&config)?;
    validate_bilinear_identity(&config)?;
    validate_rotations(d, meta.n_levels());

    println!("=== All benchmarks complete ===");
    Ok(())
}

// ─── Benchmarks ──────────────────────────────────

fn report(label: &str, dtype: &str, elapsed: std::time::Duration) {
    let ns_per_point = elapsed.as_nanos() as f64 / N_POINTS as f64;
    println!(
        "[{dtype}] {label}: {N_POINTS} points in {:.2}ms ({:.1}ns/point)",
        elapsed.as_secs_f64() * 1000.0,
        ns_per_point,
    );
}

fn bench_kernels<T: Element>(
    meta: &EncodingMeta,
    positions: &[f32],
    params: &[T],
    args: &EncodeArgs<'_>,
    rng: &mut StdRng,
) -> Result<()> {
    let d = meta.n_dims_to_encode();
    let n_out = meta.n_encoded_dims();
    let dy: Vec<T> = (0..N_POINTS * n_out)
        .map(|_| T::from_f32(rng.gen_range(-1.0..1.0)))
        .collect();
    let z: Vec<f32> = (0..N_POINTS * d).map(|_| rng.gen_range(-1.0..1.0)).collect();

    // Warmup
    encode_forward(meta, positions, params, args)?;

    let start = Instant::now();
    let features = encode_forward(meta, positions, params, args)?;
    report("forward", T::NAME, start.elapsed());

    let start = Instant::now();
    let grads = encode_backward(meta, &dy, positions, params, args, d, true, true)?;
    report("backward (input + params)", T::NAME, start.elapsed());

    let start = Instant::now();
    encode_backward(meta, &dy, positions, params, args, d, false, true)?;
    report("backward (params only)", T::NAME, start.elapsed());

    let start = Instant::now();
    let second =
        encode_backward_backward_input(meta, &z, &dy, positions, params, args, true, true)?;
    report("backward-backward", T::NAME, start.elapsed());

    let norm = |v: &[T]| v.iter().map(|x| (x.to_f32() as f64).powi(2)).sum::<f64>().sqrt();
    println!(
        "    |y| = {:.3e}, |dL/dx| = {:.3e}, |dL/dV| = {:.3e}, |dL/d(dL/dy)| = {:.3e}\n",
        norm(&features),
        grads
            .dl_dx
            .as_deref()
            .map(|g| g.iter().map(|&x| (x as f64).powi(2)).sum::<f64>().sqrt())
            .unwrap_or(0.0),
        grads.dl_dparams.as_deref().map(norm).unwrap_or(0.0),
        second.dl_ddldy.as_deref().map(norm).unwrap_or(0.0),
    );
    Ok(())
}

// ─── Validation ──────────────────────────────────

/// Small, well-conditioned copy of the config with non-trivial parameters.
fn validation_encoder(config: &EncodingConfig) -> Result<PermutoEncoder<f32>> {
    let mut small = config.clone();
    small.init_scale = 1.0;
    Ok(PermutoEncoder::new(&small, 11)?)
}

fn validate_input_gradient(config: &EncodingConfig) -> Result<()> {
    let encoder = validation_encoder(config)?;
    let meta = encoder.meta();
    let d = meta.n_dims_to_encode();
    let n_out = meta.n_encoded_dims();
    let args = EncodeArgs::new();
    let mut rng = StdRng::seed_from_u64(3);
    let eps = 1e-4f32;

    let mut max_rel = 0.0f64;
    let mut agree = 0usize;
    let mut total = 0usize;
    for _ in 0..64 {
        let x: Vec<f32> = (0..d).map(|_| rng.gen_range(-0.9..0.9)).collect();
        let dy: Vec<f32> = (0..n_out).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let grad = encoder
            .backward(&dy, &x, &args, d, true, false)?
            .dl_dx
            .context("input gradient was requested")?;
        for j in 0..d {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[j] += eps;
            xm[j] -= eps;
            let yp = encoder.forward(&xp, &args)?;
            let ym = encoder.forward(&xm, &args)?;
            let fd: f64 = dy
                .iter()
                .zip(yp.iter().zip(&ym))
                .map(|(&g, (&a, &b))| g as f64 * (a - b) as f64)
                .sum::<f64>()
                / (2.0 * eps as f64);
            let rel = (fd - grad[j] as f64).abs() / (1.0 + grad[j].abs() as f64);
            total += 1;
            // Samples that straddle a simplex face legitimately disagree
            if rel < 5e-2 {
                agree += 1;
                max_rel = max_rel.max(rel);
            }
        }
    }
    println!("Input gradient vs finite differences: {agree}/{total} agree");
    println!("    max relative error {max_rel:.2e}");
    if agree * 4 < total * 3 {
        tracing::warn!(agree, total, "unexpectedly many finite-difference mismatches");
    }
    Ok(())
}

fn validate_bilinear_identity(config: &EncodingConfig) -> Result<()> {
    let encoder = validation_encoder(config)?;
    let meta = encoder.meta();
    let d = meta.n_dims_to_encode();
    let n = 256;
    let mut rng = StdRng::seed_from_u64(5);
    let x: Vec<f32> = (0..n * d).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let z: Vec<f32> = (0..n * d).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let dy: Vec<f32> = (0..n * meta.n_encoded_dims())
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect();
    let args = EncodeArgs::new();

    let dl_dx = encoder
        .backward(&dy, &x, &args, d, true, false)?
        .dl_dx
        .context("input gradient was requested")?;
    let dl_ddldy = encoder
        .backward_backward_input(&z, &dy, &x, &args, true, false)?
        .dl_ddldy
        .context("dL/d(dL/dy) was requested")?;

    let dot = |a: &[f32], b: &[f32]| {
        a.iter()
            .zip(b)
            .map(|(&p, &q)| p as f64 * q as f64)
            .sum::<f64>()
    };
    let lhs = dot(&z, &dl_dx);
    let rhs = dot(&dy, &dl_ddldy);
    println!(
        "Bilinear identity: <z, dL/dx> = {lhs:.6}, <dy, dL/d(dL/dy)> = {rhs:.6}, diff {:.2e}",
        (lhs - rhs).abs()
    );
    Ok(())
}

fn validate_rotations(dim: usize, count: usize) {
    let mut rng = StdRng::seed_from_u64(13);
    let start = Instant::now();
    let rotations = random_rotation_in_zero_sum_subspace(dim, count, &mut rng);
    let elapsed = start.elapsed();

    let mut max_trace_err = 0.0f64;
    let mut max_row_sum = 0.0f64;
    for m in &rotations {
        let mmt = m * m.transpose();
        // M Mᵀ is the zero-sum projector, whose trace is dim
        max_trace_err = max_trace_err.max((mmt.trace() - dim as f64).abs());
        for row in m.row_iter() {
            max_row_sum = max_row_sum.max(row.sum().abs());
        }
    }
    println!(
        "Zero-sum rotations: {count} of size {}x{} in {:.1}us",
        dim + 1,
        dim + 1,
        elapsed.as_secs_f64() * 1e6,
    );
    println!("    max |tr(MMᵀ) - d| = {max_trace_err:.2e}, max |M·1| = {max_row_sum:.2e}\n");
}
