use tracing::trace;

use crate::backend::Method;
use crate::bitorder::BitOrder;
use crate::bytegroup;
use crate::dtype::DType;
use crate::dtype32::{ByteMode, LAYOUT_DTYPE32_FLAG};
use crate::error::{Result, ZipNnError};
use crate::quantize::LossyType;

/// Magic bytes opening every ZN stream.
pub const MAGIC: &[u8; 2] = b"ZN";

pub const VERSION_MAJOR: u8 = 0;
pub const VERSION_MINOR: u8 = 1;
pub const VERSION_TINY: u8 = 1;

/// Fixed size of the ZN header in bytes.
///   magic[2] + version[3] + method + delta + layout + bit_order + dtype
///   + lossy_type + lossy_factor + is_int + streaming + streaming_chunk_kb:u16
///   = 2 + 3 + 1 + 1 + 1 + 1 + 1 + 1 + 1 + 1 + 1 + 2 = 16
pub const HEADER_SIZE: usize = 16;

/// Bytes of the `ndim` prefix of the shape block.
pub const SHAPE_NDIM_SIZE: usize = 4;

/// Default (reserved) streaming chunk size recorded in the header, in KB.
pub const DEFAULT_STREAMING_CHUNK_KB: u16 = 64;

// ── Layout ─────────────────────────────────────────────────────────────────

/// How the payload after the header is cut into planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Stride-K byte grouping; K = 1 means a single backend payload and no
    /// plane table.
    ByteGroup(u8),
    /// Dtype-aware 32-bit plane engine.
    Dtype32(ByteMode),
}

impl Layout {
    /// Value stored in header byte 7.
    pub fn code(self) -> u8 {
        match self {
            Layout::ByteGroup(k) => k.trailing_zeros() as u8,
            Layout::Dtype32(mode) => LAYOUT_DTYPE32_FLAG | mode.code(),
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        if code & LAYOUT_DTYPE32_FLAG != 0 {
            return Ok(Layout::Dtype32(ByteMode::from_code(code & !LAYOUT_DTYPE32_FLAG)?));
        }
        if code > 2 {
            return Err(ZipNnError::config(format!(
                "unsupported byte-grouping exponent {}",
                code
            )));
        }
        Ok(Layout::ByteGroup(1 << code))
    }

    /// Number of planes in the descriptor table; 0 means no table.
    pub fn plane_count(self) -> usize {
        match self {
            Layout::ByteGroup(1) => 0,
            Layout::ByteGroup(k) => k as usize,
            Layout::Dtype32(mode) => mode.plane_count(),
        }
    }
}

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of the 16-byte ZN header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: (u8, u8, u8),
    pub method: Method,
    pub delta: bool,
    pub layout: Layout,
    pub bit_order: BitOrder,
    /// `None` for raw byte payloads; a tensor payload carries a shape block.
    pub dtype: Option<DType>,
    pub lossy_type: LossyType,
    pub lossy_factor: u8,
    pub is_int: bool,
    pub streaming: bool,
    pub streaming_chunk_kb: u16,
}

impl Header {
    /// Header for the current format version with every optional field off.
    pub fn new(method: Method, layout: Layout) -> Self {
        Self {
            version: (VERSION_MAJOR, VERSION_MINOR, VERSION_TINY),
            method,
            delta: false,
            layout,
            bit_order: BitOrder::None,
            dtype: None,
            lossy_type: LossyType::None,
            lossy_factor: 0,
            is_int: false,
            streaming: false,
            streaming_chunk_kb: DEFAULT_STREAMING_CHUNK_KB,
        }
    }

    pub fn is_tensor(&self) -> bool {
        self.dtype.is_some()
    }

    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..2].copy_from_slice(MAGIC);
        buf[2] = self.version.0;
        buf[3] = self.version.1;
        buf[4] = self.version.2;
        buf[5] = self.method.id();
        buf[6] = self.delta as u8;
        buf[7] = self.layout.code();
        buf[8] = self.bit_order.code();
        buf[9] = self.dtype.map_or(0, DType::code);
        buf[10] = self.lossy_type.code();
        buf[11] = self.lossy_factor;
        buf[12] = self.is_int as u8;
        buf[13] = self.streaming as u8;
        buf[14..16].copy_from_slice(&self.streaming_chunk_kb.to_le_bytes());
        trace!(header = ?buf, "rendered header");
        buf
    }

    /// Deserialize from the first `HEADER_SIZE` bytes of `buf`, checking the
    /// magic and every positional field.
    ///
    /// Unknown codes are reported as format errors: there is no checksum over
    /// the header, so a corrupted byte must not be allowed to route decoding
    /// down a different path.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ZipNnError::format(format!(
                "stream of {} bytes is shorter than the {}-byte header",
                buf.len(),
                HEADER_SIZE
            )));
        }
        if &buf[..2] != MAGIC {
            return Err(ZipNnError::format(
                "invalid magic bytes, not a ZN stream (expected \"ZN\")",
            ));
        }
        if buf[2] != VERSION_MAJOR {
            return Err(ZipNnError::format(format!(
                "unsupported ZN major version {} (only {} is supported)",
                buf[2], VERSION_MAJOR
            )));
        }
        let flag = |i: usize, name: &str| -> Result<bool> {
            match buf[i] {
                0 => Ok(false),
                1 => Ok(true),
                other => Err(ZipNnError::format(format!(
                    "header {} flag must be 0 or 1, got {}",
                    name, other
                ))),
            }
        };
        let dtype = match buf[9] {
            0 => None,
            code => Some(DType::from_code(code).map_err(into_format)?),
        };
        let header = Self {
            version: (buf[2], buf[3], buf[4]),
            method: Method::from_id(buf[5]).map_err(into_format)?,
            delta: flag(6, "delta")?,
            layout: Layout::from_code(buf[7]).map_err(into_format)?,
            bit_order: BitOrder::from_code(buf[8]).map_err(into_format)?,
            dtype,
            lossy_type: LossyType::from_code(buf[10]).map_err(into_format)?,
            lossy_factor: buf[11],
            is_int: flag(12, "is_int")?,
            streaming: flag(13, "streaming")?,
            streaming_chunk_kb: u16::from_le_bytes([buf[14], buf[15]]),
        };
        trace!(?header, "parsed header");
        Ok(header)
    }

    /// Parse the header and, for tensor payloads, the shape block right
    /// after it. Returns the shape and the total bytes consumed, i.e. where
    /// the payload starts.
    pub fn parse(buf: &[u8]) -> Result<(Self, Option<Vec<u64>>, usize)> {
        let header = Self::from_bytes(buf)?;
        if !header.is_tensor() {
            return Ok((header, None, HEADER_SIZE));
        }
        let (shape, shape_len) = decode_shape(&buf[HEADER_SIZE..])?;
        Ok((header, Some(shape), HEADER_SIZE + shape_len))
    }

    pub fn has_plane_table(&self) -> bool {
        self.layout.plane_count() > 0
    }

    /// Grouping factor when the layout is plain byte grouping.
    pub fn byte_group(&self) -> Option<usize> {
        match self.layout {
            Layout::ByteGroup(k) => Some(k as usize),
            Layout::Dtype32(_) => None,
        }
    }
}

/// Header decode failures are stream corruption, not caller misconfiguration.
fn into_format(err: ZipNnError) -> ZipNnError {
    match err {
        ZipNnError::Config(msg) => ZipNnError::Format(format!("corrupt header: {}", msg)),
        other => other,
    }
}

/// Validate a byte-grouping factor and build the layout for it.
pub fn byte_group_layout(k: usize) -> Result<Layout> {
    bytegroup::check_factor(k)?;
    Ok(Layout::ByteGroup(k as u8))
}

// ── Shape block ────────────────────────────────────────────────────────────

/// `ndim: u32 LE` followed by `ndim` dimensions as `u64 LE`.
pub fn encode_shape(shape: &[u64], out: &mut Vec<u8>) {
    out.extend_from_slice(&(shape.len() as u32).to_le_bytes());
    for &dim in shape {
        out.extend_from_slice(&dim.to_le_bytes());
    }
}

pub fn shape_len(shape: &[u64]) -> usize {
    SHAPE_NDIM_SIZE + shape.len() * 8
}

/// Decode a shape block from the front of `buf`, returning the shape and
/// the number of bytes consumed.
pub fn decode_shape(buf: &[u8]) -> Result<(Vec<u64>, usize)> {
    if buf.len() < SHAPE_NDIM_SIZE {
        return Err(ZipNnError::format("shape block truncated before ndim"));
    }
    let ndim = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let total = ndim
        .checked_mul(8)
        .and_then(|n| n.checked_add(SHAPE_NDIM_SIZE))
        .ok_or_else(|| ZipNnError::format(format!("shape block ndim {} overflows", ndim)))?;
    if buf.len() < total {
        return Err(ZipNnError::format(format!(
            "shape block truncated: {} dimensions need {} bytes, have {}",
            ndim,
            total,
            buf.len()
        )));
    }
    let shape = buf[SHAPE_NDIM_SIZE..total]
        .chunks_exact(8)
        .map(|c| {
            let mut b = [0u8; 8];
            b.copy_from_slice(c);
            u64::from_le_bytes(b)
        })
        .collect();
    Ok((shape, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_field_positions() {
        let mut header = Header::new(Method::Lz4, Layout::ByteGroup(4));
        header.bit_order = BitOrder::Float32;
        header.dtype = Some(DType::BFloat16);
        header.lossy_type = LossyType::Integer;
        header.lossy_factor = 27;
        header.is_int = true;
        let b = header.to_bytes();
        assert_eq!(&b[..2], b"ZN");
        assert_eq!(&b[2..5], &[0, 1, 1]);
        assert_eq!(b[5], 2);
        assert_eq!(b[7], 2);
        assert_eq!(b[8], 32);
        assert_eq!(b[9], 2);
        assert_eq!(&b[10..13], &[1, 27, 1]);
        assert_eq!(u16::from_le_bytes([b[14], b[15]]), DEFAULT_STREAMING_CHUNK_KB);
        assert_eq!(Header::from_bytes(&b).unwrap(), header);
    }

    #[test]
    fn layout_codes() {
        assert_eq!(Layout::ByteGroup(1).code(), 0);
        assert_eq!(Layout::ByteGroup(2).code(), 1);
        assert_eq!(Layout::Dtype32(ByteMode::TruncateHigh16).code(), 0x89);
        assert_eq!(Layout::from_code(0x89).unwrap(), Layout::Dtype32(ByteMode::TruncateHigh16));
        assert_eq!(Layout::from_code(0x8B).unwrap(), Layout::Dtype32(ByteMode::TruncateLow16));
        assert!(Layout::from_code(3).is_err());
        assert!(Layout::from_code(0x85).is_err());
    }

    #[test]
    fn shape_block_roundtrip() {
        let mut buf = Vec::new();
        encode_shape(&[3, 1024, 7], &mut buf);
        assert_eq!(buf.len(), shape_len(&[3, 1024, 7]));
        let (shape, used) = decode_shape(&buf).unwrap();
        assert_eq!(shape, vec![3, 1024, 7]);
        assert_eq!(used, buf.len());
        assert!(decode_shape(&buf[..10]).unwrap_err().is_format());
    }

    #[test]
    fn corrupt_codes_are_format_errors() {
        let good = Header::new(Method::Zstd, Layout::ByteGroup(1)).to_bytes();
        for (pos, bad) in [(5usize, 0u8), (7, 7), (8, 9), (9, 200), (10, 5), (12, 2)] {
            let mut b = good;
            b[pos] = bad;
            assert!(Header::from_bytes(&b).unwrap_err().is_format(), "byte {}", pos);
        }
    }
}
