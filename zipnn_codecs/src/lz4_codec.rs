use std::io::{Read, Write};

use lz4_flex::frame::{FrameDecoder, FrameEncoder, FrameInfo};
use zipnn_core::backend::{Backend, Method};
use zipnn_core::error::{Result, ZipNnError};

/// LZ4 frame backend.
///
/// Fastest decompression of the bundled backends. Uses the LZ4 frame format
/// (not raw blocks) so the output is self-delimiting and checksummed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lz4Backend;

impl Backend for Lz4Backend {
    fn method(&self) -> Method {
        Method::Lz4
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let info = FrameInfo::new().content_checksum(true);
        let mut encoder = FrameEncoder::with_frame_info(info, Vec::with_capacity(raw.len() / 2));
        encoder
            .write_all(raw)
            .map_err(|e| ZipNnError::backend("lz4", e))?;
        encoder.finish().map_err(|e| ZipNnError::backend("lz4", e))
    }

    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(compressed.len() * 2);
        FrameDecoder::new(compressed)
            .read_to_end(&mut raw)
            .map_err(|e| ZipNnError::backend("lz4", e))?;
        Ok(raw)
    }
}
