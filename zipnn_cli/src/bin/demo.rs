//! ZipNN demo
//!
//! Generates synthetic model weights (normally distributed, like a trained
//! linear layer), compresses them under several codec configurations and
//! compares each against a gzip baseline. Run with `--json` for a
//! machine-readable summary.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::Result;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzCompression;
use half::bf16;
use serde_json::json;

use zipnn_codecs::{CodecConfig, ZipNn};
use zipnn_core::{BitOrder, ByteMode, DType, Method, Payload, Tensor};

// ── constants ──────────────────────────────────────────────────────────────

const ROWS: u64 = 2048;
const COLS: u64 = 2048;
/// Standard deviation of the synthetic weights.
const WEIGHT_STD: f32 = 0.02;

// ── data generator ──────────────────────────────────────────────────────────

/// Deterministic normal-ish samples: the sum of four LCG uniforms.
fn synthetic_weights(count: usize, seed: u64) -> Vec<f32> {
    let mut rng = seed;
    let mut uniform = move || {
        rng = rng
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (rng >> 40) as f32 / (1u64 << 24) as f32
    };
    (0..count)
        .map(|_| {
            let s: f32 = (0..4).map(|_| uniform()).sum();
            // Sum of 4 U(0,1) has mean 2 and variance 1/3.
            (s - 2.0) * WEIGHT_STD * 3f32.sqrt()
        })
        .collect()
}

// ── timing ──────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const U: &[&str] = &["B", "KB", "MB", "GB"];
    let mut v = n as f64;
    let mut u = 0;
    while v >= 1024.0 && u < U.len() - 1 { v /= 1024.0; u += 1; }
    if u == 0 { format!("{n} B") } else { format!("{v:.2} {}", U[u]) }
}

fn fmt_duration(d: Duration) -> String {
    let ms = d.as_secs_f64() * 1000.0;
    if ms < 1.0 {
        format!("{:.1} µs", ms * 1000.0)
    } else if ms < 1000.0 {
        format!("{ms:.1} ms")
    } else {
        format!("{:.2} s", d.as_secs_f64())
    }
}

fn throughput(bytes: usize, d: Duration) -> String {
    format!("{}/s", human_bytes((bytes as f64 / d.as_secs_f64().max(1e-9)) as u64))
}

// ── runs ────────────────────────────────────────────────────────────────────

struct Row {
    label: String,
    dtype: DType,
    compressed: usize,
    raw: usize,
    compress: Duration,
    decompress: Duration,
    exact: bool,
}

fn run_zipnn(label: &str, config: CodecConfig, tensor: &Tensor) -> Result<Row> {
    let zn = ZipNn::new(config)?;
    let payload = Payload::Tensor(tensor.clone());

    let t0 = Instant::now();
    let stream = zn.compress(&payload)?;
    let compress = t0.elapsed();

    let t0 = Instant::now();
    let restored = zn.decompress(&stream)?;
    let decompress = t0.elapsed();

    Ok(Row {
        label: label.to_string(),
        dtype: tensor.dtype,
        compressed: stream.len(),
        raw: tensor.data.len(),
        compress,
        decompress,
        exact: restored == payload,
    })
}

fn run_gzip(tensor: &Tensor) -> Result<Row> {
    let t0 = Instant::now();
    let mut enc = GzEncoder::new(Vec::new(), GzCompression::default());
    enc.write_all(&tensor.data)?;
    let packed = enc.finish()?;
    let compress = t0.elapsed();

    let t0 = Instant::now();
    let mut restored = Vec::with_capacity(tensor.data.len());
    GzDecoder::new(packed.as_slice()).read_to_end(&mut restored)?;
    let decompress = t0.elapsed();

    Ok(Row {
        label: "gzip (baseline)".to_string(),
        dtype: tensor.dtype,
        compressed: packed.len(),
        raw: tensor.data.len(),
        compress,
        decompress,
        exact: restored == tensor.data,
    })
}

fn configurations(dtype: DType) -> Vec<(&'static str, CodecConfig)> {
    let base = CodecConfig::tensor(dtype);
    let order = if dtype == DType::Float32 { BitOrder::Float32 } else { BitOrder::BFloat16 };
    let mut configs = vec![
        ("zstd, no grouping", base.clone().with_byte_grouping(1)),
        ("zstd, byte grouping", base.clone()),
        ("zstd, grouping + bit reorder", base.clone().with_bit_order(order)),
        ("lz4, grouping + bit reorder", base.clone().with_bit_order(order).with_method(Method::Lz4)),
        ("snappy, grouping + bit reorder", base.clone().with_bit_order(order).with_method(Method::Snappy)),
    ];
    if dtype == DType::Float32 {
        configs.push((
            "zstd, dtype32 exp/mantissa",
            base.clone()
                .with_byte_mode(ByteMode::ExponentMantissa)
                .with_bit_order(BitOrder::Float32),
        ));
        configs.push((
            "zstd, truncate to bf16 (lossy)",
            base.clone().with_byte_mode(ByteMode::TruncateLow16),
        ));
    }
    configs.push((
        "zstd, integer lossy 2^-15",
        base.with_bit_order(order).with_integer_lossy(15),
    ));
    configs
}

fn print_table(rows: &[Row]) {
    println!(
        "  {:<34} {:>8} {:>12} {:>8} {:>12} {:>12}  {}",
        "configuration", "dtype", "compressed", "ratio", "compress", "decompress", "exact"
    );
    println!("  {}", "─".repeat(100));
    for r in rows {
        println!(
            "  {:<34} {:>8} {:>12} {:>7.2}x {:>12} {:>12}  {}",
            r.label,
            r.dtype.name(),
            human_bytes(r.compressed as u64),
            r.raw as f64 / r.compressed.max(1) as f64,
            fmt_duration(r.compress),
            fmt_duration(r.decompress),
            if r.exact { "yes" } else { "no" }
        );
    }
}

fn print_json(rows: &[Row]) -> Result<()> {
    let entries: Vec<_> = rows
        .iter()
        .map(|r| {
            json!({
                "configuration": r.label,
                "dtype": r.dtype.name(),
                "raw_bytes": r.raw,
                "compressed_bytes": r.compressed,
                "ratio": r.raw as f64 / r.compressed.max(1) as f64,
                "compress_ms": r.compress.as_secs_f64() * 1000.0,
                "decompress_ms": r.decompress.as_secs_f64() * 1000.0,
                "exact": r.exact,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn run() -> Result<()> {
    let as_json = std::env::args().any(|a| a == "--json");
    let count = (ROWS * COLS) as usize;
    let values = synthetic_weights(count, 42);

    let f32_tensor = Tensor::from_f32(vec![ROWS, COLS], &values)?;
    let bf16_data: Vec<u8> = values
        .iter()
        .flat_map(|v| bf16::from_f32(*v).to_le_bytes())
        .collect();
    let bf16_tensor = Tensor::new(DType::BFloat16, vec![ROWS, COLS], bf16_data)?;

    let mut rows = Vec::new();
    for tensor in [&f32_tensor, &bf16_tensor] {
        if !as_json {
            eprintln!(
                "compressing {} {}x{} tensor ({})...",
                tensor.dtype,
                ROWS,
                COLS,
                human_bytes(tensor.data.len() as u64)
            );
        }
        for (label, config) in configurations(tensor.dtype) {
            rows.push(run_zipnn(label, config, tensor)?);
        }
        rows.push(run_gzip(tensor)?);
    }

    if as_json {
        return print_json(&rows);
    }

    println!();
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║          ZipNN · synthetic weight compression demo              ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();
    println!("  {} weights per tensor, N(0, {:.2}^2)", count, WEIGHT_STD);
    println!();
    print_table(&rows);
    println!();

    let best = rows
        .iter()
        .filter(|r| r.exact && r.dtype == DType::Float32 && !r.label.starts_with("gzip"))
        .min_by_key(|r| r.compressed);
    let gzip = rows.iter().find(|r| r.dtype == DType::Float32 && r.label.starts_with("gzip"));
    if let (Some(best), Some(gzip)) = (best, gzip) {
        println!(
            "  best lossless float32: {} at {} vs gzip {} ({} vs {} compress)",
            best.label,
            human_bytes(best.compressed as u64),
            human_bytes(gzip.compressed as u64),
            throughput(best.raw, best.compress),
            throughput(gzip.raw, gzip.compress)
        );
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("\nError: {e:#}");
        std::process::exit(1);
    }
}
