use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZipNnError};

/// Generic byte-stream compressor identified by a stable `Method` id.
///
/// Backends are dtype-agnostic black boxes. Every call compresses or
/// decompresses one independent buffer: no state may leak from one plane to
/// the next, which is what lets the plane engines run them in parallel.
pub trait Backend: Send + Sync {
    /// Stable id stored in byte 5 of the ZN header.
    fn method(&self) -> Method;

    /// Human-readable name for logs and CLI display.
    fn name(&self) -> &'static str {
        self.method().name()
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>>;

    /// Decompress a buffer produced by `compress`. The output length is
    /// recovered from the backend's own framing.
    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>>;
}

/// Closed set of backend algorithms and their header ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// High-ratio block compressor.
    #[default]
    Zstd,
    /// High-speed frame compressor.
    Lz4,
    /// Very-low-latency compressor.
    Snappy,
}

pub const METHOD_ZSTD: u8 = 1;
pub const METHOD_LZ4: u8 = 2;
pub const METHOD_SNAPPY: u8 = 3;

impl Method {
    pub const ALL: [Method; 3] = [Method::Zstd, Method::Lz4, Method::Snappy];

    pub fn id(self) -> u8 {
        match self {
            Method::Zstd => METHOD_ZSTD,
            Method::Lz4 => METHOD_LZ4,
            Method::Snappy => METHOD_SNAPPY,
        }
    }

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            METHOD_ZSTD => Ok(Method::Zstd),
            METHOD_LZ4 => Ok(Method::Lz4),
            METHOD_SNAPPY => Ok(Method::Snappy),
            other => Err(ZipNnError::config(format!(
                "unsupported compression method id {}; expected 1 (zstd), 2 (lz4) or 3 (snappy)",
                other
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Method::Zstd => "zstd",
            Method::Lz4 => "lz4",
            Method::Snappy => "snappy",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = ZipNnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "zstd" | "z" => Ok(Method::Zstd),
            "lz4" | "l" => Ok(Method::Lz4),
            "snappy" | "s" => Ok(Method::Snappy),
            other => Err(ZipNnError::config(format!(
                "unknown compression method '{}'. Valid options: zstd, lz4, snappy",
                other
            ))),
        }
    }
}
