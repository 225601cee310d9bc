use zipnn_core::backend::{Backend, Method};
use zipnn_core::error::{Result, ZipNnError};

pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Zstandard backend: the high-ratio default.
///
/// Every frame carries a content checksum, so a corrupted plane fails to
/// decode instead of producing wrong bytes. `workers > 1` turns on zstd's
/// internal multithreading; the pipeline only does that when it is not
/// already compressing planes in parallel on the same budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZstdBackend {
    /// Compression level (1 = fast / larger, 22 = slow / smallest).
    pub level: i32,
    pub workers: u32,
}

impl Default for ZstdBackend {
    fn default() -> Self {
        Self {
            level: DEFAULT_ZSTD_LEVEL,
            workers: 1,
        }
    }
}

impl ZstdBackend {
    pub fn new(level: i32) -> Result<Self> {
        let range = zstd::compression_level_range();
        if !range.contains(&level) {
            return Err(ZipNnError::config(format!(
                "zstd level {} outside supported range {}..={}",
                level,
                range.start(),
                range.end()
            )));
        }
        Ok(Self { level, workers: 1 })
    }

    pub fn with_workers(self, workers: u32) -> Self {
        Self {
            workers: workers.max(1),
            ..self
        }
    }
}

impl Backend for ZstdBackend {
    fn method(&self) -> Method {
        Method::Zstd
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let err = |e: std::io::Error| ZipNnError::backend("zstd", e);
        let mut compressor = zstd::bulk::Compressor::new(self.level).map_err(err)?;
        compressor.include_checksum(true).map_err(err)?;
        if self.workers > 1 {
            compressor.multithread(self.workers).map_err(err)?;
        }
        compressor.compress(raw).map_err(err)
    }

    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>> {
        // The frame carries its own content size; decode_all grows the
        // output as needed.
        zstd::decode_all(compressed).map_err(|e| ZipNnError::backend("zstd", e))
    }
}
