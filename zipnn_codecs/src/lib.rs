mod config;
mod lz4_codec;
mod pipeline;
mod snappy_codec;
mod zstd_codec;

pub use config::{CodecConfig, InputFormat};
pub use lz4_codec::Lz4Backend;
pub use pipeline::{inspect, LossyOverride, StreamInfo, ThreadBudget, ZipNn};
pub use snappy_codec::SnappyBackend;
pub use zstd_codec::{ZstdBackend, DEFAULT_ZSTD_LEVEL};

use zipnn_core::backend::{Backend, Method};
use zipnn_core::error::Result;

/// The closed set of backends a ZN stream can name.
///
/// Dispatch is a plain `match`; a new backend is a new variant here plus a
/// new id in [`Method`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compressor {
    Zstd(ZstdBackend),
    Lz4(Lz4Backend),
    Snappy(SnappyBackend),
}

impl Compressor {
    /// Build the backend for `method`. `level` only applies to zstd.
    pub fn new(method: Method, level: i32) -> Result<Self> {
        Ok(match method {
            Method::Zstd => Compressor::Zstd(ZstdBackend::new(level)?),
            Method::Lz4 => Compressor::Lz4(Lz4Backend),
            Method::Snappy => Compressor::Snappy(SnappyBackend),
        })
    }

    /// Backend for `method` with its default settings.
    pub fn for_method(method: Method) -> Self {
        match method {
            Method::Zstd => Compressor::Zstd(ZstdBackend::default()),
            Method::Lz4 => Compressor::Lz4(Lz4Backend),
            Method::Snappy => Compressor::Snappy(SnappyBackend),
        }
    }

    /// Same backend with a different internal worker count. Only zstd has
    /// internal workers; the others are returned unchanged.
    pub fn with_workers(self, workers: u32) -> Self {
        match self {
            Compressor::Zstd(z) => Compressor::Zstd(z.with_workers(workers)),
            other => other,
        }
    }
}

impl Backend for Compressor {
    fn method(&self) -> Method {
        match self {
            Compressor::Zstd(b) => b.method(),
            Compressor::Lz4(b) => b.method(),
            Compressor::Snappy(b) => b.method(),
        }
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compressor::Zstd(b) => b.compress(raw),
            Compressor::Lz4(b) => b.compress(raw),
            Compressor::Snappy(b) => b.compress(raw),
        }
    }

    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compressor::Zstd(b) => b.decompress(compressed),
            Compressor::Lz4(b) => b.decompress(compressed),
            Compressor::Snappy(b) => b.decompress(compressed),
        }
    }
}

/// Resolve a backend from the method id stored in a ZN header.
///
/// Used when decoding an existing stream, so the decoder follows whatever
/// method the stream was written with.
pub fn backend_by_id(id: u8) -> Result<Compressor> {
    Ok(Compressor::for_method(Method::from_id(id)?))
}
