use zipnn_core::backend::{Backend, Method};
use zipnn_core::error::{Result, ZipNnError};

/// Snappy backend (raw format).
///
/// Lowest latency and lowest ratio of the bundled backends. The raw format
/// prefixes the decompressed length, which is all the plane engine needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnappyBackend;

impl Backend for SnappyBackend {
    fn method(&self) -> Method {
        Method::Snappy
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        snap::raw::Encoder::new()
            .compress_vec(raw)
            .map_err(|e| ZipNnError::backend("snappy", e))
    }

    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>> {
        snap::raw::Decoder::new()
            .decompress_vec(compressed)
            .map_err(|e| ZipNnError::backend("snappy", e))
    }
}
