use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;
use xxhash_rust::xxh3::xxh3_64;

use zipnn_codecs::{inspect, CodecConfig, InputFormat, ZipNn};
use zipnn_core::{BitOrder, ByteMode, DType, LossyType, Method, Payload, Tensor};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "zipnn",
    about = "Lossless and near-lossless compression of ML model tensors into ZN streams",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a ZN stream
    Compress {
        /// Source file (raw little-endian tensor bytes)
        input: PathBuf,
        /// Destination ZN file
        output: PathBuf,
        /// Backend: zstd | lz4 | snappy
        #[arg(short, long)]
        method: Option<Method>,
        /// Zstd compression level (only used with --method zstd)
        #[arg(long)]
        level: Option<i32>,
        /// Byte-grouping factor: 0 (auto from dtype), 1, 2 or 4
        #[arg(short = 'g', long)]
        byte_grouping: Option<u8>,
        /// Dtype-aware 32-bit plane mode: 1, 2, 3, 4, 9, 10 or 11
        #[arg(long)]
        byte_mode: Option<u8>,
        /// Exponent-first bit reorder: none | float32 | bfloat16
        #[arg(long)]
        bit_order: Option<BitOrder>,
        /// Element dtype of the input
        #[arg(short, long)]
        dtype: Option<DType>,
        /// Treat the input as a tensor with this shape, e.g. 4096,4096
        #[arg(long, value_delimiter = ',')]
        shape: Option<Vec<u64>>,
        /// Scale factor exponent for --integer-lossy
        #[arg(long)]
        lossy_factor: Option<u8>,
        /// Quantize float tensors to integers (needs --shape)
        #[arg(long)]
        integer_lossy: bool,
        /// Compressed/raw ratio at or above which a plane is stored raw
        #[arg(long)]
        threshold: Option<f64>,
        /// Worker threads (0 = all cores)
        #[arg(short, long)]
        threads: Option<usize>,
        /// JSON file with a full codec configuration; flags override it
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Decompress the result and compare digests
        #[arg(long)]
        verify: bool,
    },
    /// Decompress a ZN stream back to raw bytes
    Decompress {
        /// Source ZN file
        input: PathBuf,
        /// Destination file
        output: PathBuf,
    },
    /// Print header fields and the plane table of a ZN stream
    Inspect {
        /// ZN file to inspect
        file: PathBuf,
    },
}

/// Flag values for `compress` that override the loaded configuration.
struct CompressArgs {
    method: Option<Method>,
    level: Option<i32>,
    byte_grouping: Option<u8>,
    byte_mode: Option<u8>,
    bit_order: Option<BitOrder>,
    dtype: Option<DType>,
    shape: Option<Vec<u64>>,
    lossy_factor: Option<u8>,
    integer_lossy: bool,
    threshold: Option<f64>,
    threads: Option<usize>,
    config: Option<PathBuf>,
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn init_logging(log_level: &str) -> anyhow::Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("installing tracing subscriber")
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {:?}", path))
}

fn build_config(args: &CompressArgs) -> anyhow::Result<CodecConfig> {
    let mut config = match &args.config {
        Some(path) => CodecConfig::from_json_file(path)
            .with_context(|| format!("loading config {:?}", path))?,
        None => CodecConfig::default(),
    };
    if let Some(method) = args.method {
        config.method = method;
    }
    if let Some(level) = args.level {
        config.level = level;
    }
    if let Some(k) = args.byte_grouping {
        config.byte_grouping = k;
    }
    if let Some(code) = args.byte_mode {
        config.byte_mode = Some(ByteMode::from_code(code)?);
    }
    if let Some(order) = args.bit_order {
        config.bit_order = order;
    }
    if let Some(dtype) = args.dtype {
        config.dtype = dtype;
    }
    if args.shape.is_some() {
        config.input_format = InputFormat::Tensor;
    }
    if args.integer_lossy {
        config.lossy_type = LossyType::Integer;
    }
    if let Some(factor) = args.lossy_factor {
        config.lossy_factor = factor;
    }
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    Ok(config)
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(input: PathBuf, output: PathBuf, args: CompressArgs, verify: bool) -> anyhow::Result<()> {
    let config = build_config(&args)?;
    debug!(?config, "effective configuration");
    let zn = ZipNn::new(config.clone()).context("invalid codec configuration")?;

    let raw = read_file(&input)?;
    let raw_len = raw.len() as u64;
    let digest = xxh3_64(&raw);
    let payload = match args.shape {
        Some(shape) => Payload::Tensor(
            Tensor::new(config.dtype, shape, raw)
                .with_context(|| format!("{:?} does not match the given shape", input))?,
        ),
        None => Payload::Bytes(raw),
    };

    let t0 = Instant::now();
    let stream = zn.compress(&payload)?;
    let elapsed = t0.elapsed();
    std::fs::write(&output, &stream).with_context(|| format!("writing output file {:?}", output))?;

    let ratio = raw_len as f64 / stream.len().max(1) as f64;
    eprintln!("  method      : {}", config.method);
    eprintln!("  layout      : {:?}", inspect(&stream)?.header.layout);
    eprintln!("  raw size    : {}", human_bytes(raw_len));
    eprintln!("  compressed  : {}", human_bytes(stream.len() as u64));
    eprintln!("  ratio       : {:.2}x", ratio);
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((raw_len as f64 / elapsed.as_secs_f64().max(1e-9)) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());

    if verify {
        let lossy = config.lossy_type != LossyType::None
            || config.byte_mode.is_some_and(ByteMode::is_lossy);
        let restored = zn.decompress_bytes(&stream)?;
        let restored_digest = xxh3_64(&restored);
        if restored_digest == digest {
            eprintln!("  verify      : ok (xxh3 {:016x})", digest);
        } else if lossy {
            eprintln!(
                "  verify      : lossy settings, digests differ ({:016x} vs {:016x})",
                digest, restored_digest
            );
        } else {
            anyhow::bail!(
                "verification failed: xxh3 {:016x} before, {:016x} after",
                digest,
                restored_digest
            );
        }
    }
    Ok(())
}

fn run_decompress(input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let stream = read_file(&input)?;
    // Decoding is driven by the stream header; the instance settings only
    // size the thread pool.
    let zn = ZipNn::new(CodecConfig::default())?;

    let t0 = Instant::now();
    let raw = zn
        .decompress_bytes(&stream)
        .with_context(|| format!("decompressing {:?}", input))?;
    let elapsed = t0.elapsed();
    std::fs::write(&output, &raw).with_context(|| format!("creating output file {:?}", output))?;

    eprintln!("  raw size    : {}", human_bytes(raw.len() as u64));
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((raw.len() as f64 / elapsed.as_secs_f64().max(1e-9)) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_inspect(file: PathBuf) -> anyhow::Result<()> {
    let stream = read_file(&file)?;
    let info = inspect(&stream).with_context(|| format!("parsing {:?}", file))?;
    let h = &info.header;

    println!("=== ZN stream: {:?} ===", file);
    println!();
    println!("  format version : {}.{}.{}", h.version.0, h.version.1, h.version.2);
    println!("  method         : {} (id={})", h.method, h.method.id());
    println!("  layout         : {:?} (byte 7 = 0x{:02x})", h.layout, h.layout.code());
    println!("  bit order      : {}", h.bit_order);
    match (&h.dtype, &info.shape) {
        (Some(dtype), Some(shape)) => println!("  tensor         : {} {:?}", dtype, shape),
        _ => println!("  tensor         : no (raw bytes)"),
    }
    println!(
        "  lossy          : {} (factor {}, is_int {})",
        h.lossy_type, h.lossy_factor, h.is_int
    );
    println!("  delta          : {}", h.delta);
    println!("  streaming      : {} ({} KB chunks)", h.streaming, h.streaming_chunk_kb);
    println!("  stream size    : {}", human_bytes(stream.len() as u64));

    if let Some(table) = &info.table {
        println!();
        println!(
            "  {:>6}  {:>10}  {:>12}  {:>16}",
            "plane", "stored", "size", "xxh3"
        );
        println!("  {}", "-".repeat(50));
        for (i, (entry, range)) in table.entries.iter().zip(info.plane_ranges()).enumerate() {
            println!(
                "  {:>6}  {:>10}  {:>12}  {:016x}",
                i,
                if entry.compressed { "compressed" } else { "raw" },
                human_bytes(entry.len),
                xxh3_64(&stream[range])
            );
        }
    } else {
        let body = &stream[info.payload_offset..];
        println!("  payload        : {} (xxh3 {:016x})", human_bytes(body.len() as u64), xxh3_64(body));
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;
    match cli.command {
        Commands::Compress {
            input,
            output,
            method,
            level,
            byte_grouping,
            byte_mode,
            bit_order,
            dtype,
            shape,
            lossy_factor,
            integer_lossy,
            threshold,
            threads,
            config,
            verify,
        } => {
            let args = CompressArgs {
                method,
                level,
                byte_grouping,
                byte_mode,
                bit_order,
                dtype,
                shape,
                lossy_factor,
                integer_lossy,
                threshold,
                threads,
                config,
            };
            run_compress(input, output, args, verify)
        }
        Commands::Decompress { input, output } => run_decompress(input, output),
        Commands::Inspect { file } => run_inspect(file),
    }
}
