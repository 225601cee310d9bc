//! The ZN compress / decompress pipeline.
//!
//! Compression: optional integer quantization, then either the exponent-first
//! bit reorder plus stride-K byte grouping, or the dtype-aware 32-bit plane
//! engine; each plane is compressed independently and stored compressed or
//! raw by the threshold rule. Decompression reads every choice back from the
//! header and undoes the steps in reverse.

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};
use zipnn_core::backend::Backend;
use zipnn_core::bitorder::{self, BitOrder};
use zipnn_core::bytegroup;
use zipnn_core::dtype::DType;
use zipnn_core::dtype32::{self, BitMode};
use zipnn_core::error::{Result, ZipNnError};
use zipnn_core::format::{self, Header, Layout, HEADER_SIZE};
use zipnn_core::planes::{self, PlaneTable};
use zipnn_core::quantize::{self, LossyType};
use zipnn_core::tensor::{Payload, Tensor};

use crate::config::{CodecConfig, InputFormat};
use crate::Compressor;

/// Per-call replacement of the configured lossy settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LossyOverride {
    pub lossy_type: Option<LossyType>,
    pub lossy_factor: Option<u8>,
}

impl LossyOverride {
    pub fn integer(factor: u8) -> Self {
        Self {
            lossy_type: Some(LossyType::Integer),
            lossy_factor: Some(factor),
        }
    }

    pub fn lossless() -> Self {
        Self {
            lossy_type: Some(LossyType::None),
            lossy_factor: None,
        }
    }
}

/// How the configured worker count is shared between plane-level
/// parallelism and a backend's own internal threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadBudget {
    pub total: usize,
}

impl ThreadBudget {
    /// `0` resolves to the machine's available parallelism.
    pub fn resolve(requested: usize) -> Self {
        let total = if requested == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            requested
        };
        Self { total }
    }

    /// Backend workers when the whole input is one backend call.
    pub fn single(&self) -> u32 {
        self.total as u32
    }

    /// Backend workers per plane when `planes` planes run at once on the
    /// pool. At most `min(total, planes)` planes are in flight, so the
    /// product stays within the budget.
    pub fn backend_workers(&self, planes: usize) -> u32 {
        let in_flight = self.total.min(planes).max(1);
        (self.total / in_flight).max(1) as u32
    }
}

/// Decoded layout of a ZN stream, without decompressing any payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub header: Header,
    pub shape: Option<Vec<u64>>,
    /// `None` for single-payload streams.
    pub table: Option<PlaneTable>,
    /// Offset of the first payload byte (after header, shape and table).
    pub payload_offset: usize,
}

impl StreamInfo {
    /// Byte ranges of each stored plane within the stream.
    pub fn plane_ranges(&self) -> Vec<std::ops::Range<usize>> {
        let Some(table) = &self.table else {
            return Vec::new();
        };
        let mut offset = self.payload_offset;
        table
            .entries
            .iter()
            .map(|e| {
                let start = offset;
                offset += e.len as usize;
                start..offset
            })
            .collect()
    }
}

/// Parse header, shape block and plane table of `stream`.
pub fn inspect(stream: &[u8]) -> Result<StreamInfo> {
    let (header, shape, offset) = Header::parse(stream)?;
    let count = header.layout.plane_count();
    if count == 0 {
        return Ok(StreamInfo {
            header,
            shape,
            table: None,
            payload_offset: offset,
        });
    }
    let (table, table_len) = PlaneTable::parse(&stream[offset..], count)?;
    Ok(StreamInfo {
        header,
        shape,
        table: Some(table),
        payload_offset: offset + table_len,
    })
}

/// A configured ZN codec.
///
/// Immutable after construction and safe to share across threads; every
/// call keeps its header, planes and tables in locals.
pub struct ZipNn {
    config: CodecConfig,
    backend: Compressor,
    budget: ThreadBudget,
    pool: Option<ThreadPool>,
}

impl std::fmt::Debug for ZipNn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipNn")
            .field("config", &self.config)
            .field("backend", &self.backend)
            .field("budget", &self.budget)
            .finish()
    }
}

impl ZipNn {
    pub fn new(config: CodecConfig) -> Result<Self> {
        config.validate()?;
        let backend = Compressor::new(config.method, config.level)?;
        let budget = ThreadBudget::resolve(config.threads);
        let pool = if budget.total > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(budget.total)
                .thread_name(|i| format!("zipnn-{}", i))
                .build()
                .map_err(|e| ZipNnError::config(format!("failed to build thread pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };
        info!(
            method = %config.method,
            input = %config.input_format,
            threads = budget.total,
            "zipnn codec ready"
        );
        Ok(Self {
            config,
            backend,
            budget,
            pool,
        })
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn compress(&self, payload: &Payload) -> Result<Vec<u8>> {
        self.compress_with(payload, LossyOverride::default())
    }

    pub fn compress_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.compress_parts(data, None, LossyOverride::default())
    }

    pub fn compress_tensor(&self, tensor: &Tensor) -> Result<Vec<u8>> {
        tensor.validate()?;
        self.compress_parts(&tensor.data, Some(tensor), LossyOverride::default())
    }

    /// Compress with per-call lossy settings in place of the configured ones.
    pub fn compress_with(&self, payload: &Payload, lossy: LossyOverride) -> Result<Vec<u8>> {
        match payload {
            Payload::Bytes(data) => self.compress_parts(data, None, lossy),
            Payload::Tensor(tensor) => {
                tensor.validate()?;
                self.compress_parts(&tensor.data, Some(tensor), lossy)
            }
            Payload::File(_) => Err(ZipNnError::NotSupported("file payloads")),
        }
    }

    /// Pick the plane layout for elements of `dtype`.
    fn layout_for(&self, dtype: DType) -> Result<Layout> {
        if let Some(mode) = self.config.byte_mode {
            if dtype.size() != dtype32::ELEMENT_SIZE {
                return Err(ZipNnError::config(format!(
                    "byte mode {} needs 32-bit elements, got {}",
                    mode, dtype
                )));
            }
            return Ok(Layout::Dtype32(mode));
        }
        let k = match self.config.byte_grouping {
            0 => dtype.size().min(4),
            k => k as usize,
        };
        format::byte_group_layout(k)
    }

    fn compress_parts(&self, data: &[u8], tensor: Option<&Tensor>, lossy: LossyOverride) -> Result<Vec<u8>> {
        if self.config.input_format == InputFormat::File {
            return Err(ZipNnError::NotSupported("file-based compression"));
        }
        if self.config.delta {
            return Err(ZipNnError::NotSupported("delta compression"));
        }
        if self.config.streaming {
            return Err(ZipNnError::NotSupported("streaming compression"));
        }

        // ── Operation-start checks: nothing below touches `data` until
        //    every configuration error has had its chance to fire.
        let lossy_type = lossy.lossy_type.unwrap_or(self.config.lossy_type);
        let lossy_factor = lossy.lossy_factor.unwrap_or(self.config.lossy_factor);
        lossy_type.ensure_supported()?;
        let dtype = tensor.map_or(self.config.dtype, |t| t.dtype);
        if lossy_type != LossyType::None {
            if tensor.is_none() {
                return Err(ZipNnError::config("lossy compression requires tensor input"));
            }
            quantize::check_quantizable(dtype)?;
        }
        let layout = self.layout_for(dtype)?;
        let bit_order = self.config.bit_order;
        let element = match layout {
            Layout::Dtype32(_) => Some(dtype32::ELEMENT_SIZE),
            Layout::ByteGroup(_) => bit_order.width(),
        };
        if let Some(width) = bit_order.width() {
            if tensor.is_some() && width != dtype.size() {
                return Err(ZipNnError::config(format!(
                    "{} bit order does not match {} tensor elements",
                    bit_order, dtype
                )));
            }
        }
        if let Some(width) = element {
            if data.len() % width != 0 {
                return Err(ZipNnError::config(format!(
                    "{} bytes is not a whole number of {}-byte elements",
                    data.len(),
                    width
                )));
            }
        }

        let mut header = Header::new(self.config.method, layout);
        header.bit_order = bit_order;
        header.dtype = tensor.map(|t| t.dtype);
        header.streaming_chunk_kb = self.config.streaming_chunk_kb;

        let mut work = if lossy_type == LossyType::Integer {
            let q = quantize::quantize(data, dtype, lossy_factor)?;
            header.lossy_type = LossyType::Integer;
            header.lossy_factor = lossy_factor;
            header.is_int = q.is_int;
            q.data
        } else {
            data.to_vec()
        };

        let mut out = Vec::with_capacity(HEADER_SIZE + work.len() / 2);
        out.extend_from_slice(&header.to_bytes());
        if let Some(t) = tensor {
            format::encode_shape(&t.shape, &mut out);
        }

        let planes = match layout {
            Layout::ByteGroup(1) => {
                bitorder::reorder(&mut work, bit_order)?;
                let backend = self.backend.with_workers(self.budget.single());
                let packed = backend.compress(&work)?;
                debug!(raw = work.len(), stored = packed.len(), "single payload");
                out.extend_from_slice(&packed);
                return Ok(self.finish(out, data.len()));
            }
            Layout::ByteGroup(k) => {
                bitorder::reorder(&mut work, bit_order)?;
                bytegroup::split(&work, k as usize)?
            }
            Layout::Dtype32(mode) => dtype32::split_dtype32(&work, bit_mode(bit_order)?, mode)?,
        };

        let backend = self.backend.with_workers(self.budget.backend_workers(planes.len()));
        let encoded = planes::encode_planes(&planes, &backend, self.config.threshold, self.pool.as_ref())?;
        out.reserve(encoded.encoded_len());
        encoded.write_to(&mut out);
        Ok(self.finish(out, data.len()))
    }

    fn finish(&self, out: Vec<u8>, raw_len: usize) -> Vec<u8> {
        debug!(
            method = %self.config.method,
            raw = raw_len,
            compressed = out.len(),
            "compressed"
        );
        out
    }

    /// Decompress a ZN stream. Every decoding choice comes from the stream's
    /// own header, not from this instance's configuration.
    pub fn decompress(&self, stream: &[u8]) -> Result<Payload> {
        let info = inspect(stream)?;
        let header = info.header;
        if header.delta {
            return Err(ZipNnError::NotSupported("delta decompression"));
        }
        if header.streaming {
            return Err(ZipNnError::NotSupported("streaming decompression"));
        }
        if header.lossy_type == LossyType::Unsigned {
            return Err(ZipNnError::format("stream declares the unimplemented unsigned lossy type"));
        }
        if header.lossy_type == LossyType::Integer && header.dtype.is_none() {
            return Err(ZipNnError::format("lossy stream carries no tensor dtype"));
        }

        let backend = if header.method == self.backend.method() {
            self.backend
        } else {
            Compressor::for_method(header.method)
        };
        let body = &stream[info.payload_offset..];

        let mut data = match (header.layout, &info.table) {
            (Layout::Dtype32(mode), Some(table)) => {
                let bits = bit_mode(header.bit_order).map_err(corrupt)?;
                let planes = self.decode(table, body, backend)?;
                dtype32::combine_dtype32(&planes, bits, mode)?
            }
            (Layout::ByteGroup(_), Some(table)) => {
                let planes = self.decode(table, body, backend)?;
                let mut data = bytegroup::combine(&planes)?;
                restore_bits(&mut data, header.bit_order)?;
                data
            }
            (_, None) => {
                let mut data = backend.with_workers(self.budget.single()).decompress(body)?;
                restore_bits(&mut data, header.bit_order)?;
                data
            }
        };

        if header.lossy_type == LossyType::Integer {
            if let Some(dtype) = header.dtype {
                data = quantize::dequantize(&data, dtype, header.lossy_factor, header.is_int)
                    .map_err(corrupt)?;
            }
        }
        debug!(method = %header.method, compressed = stream.len(), raw = data.len(), "decompressed");

        match (header.dtype, info.shape) {
            (Some(dtype), Some(shape)) => Ok(Payload::Tensor(Tensor::new(dtype, shape, data).map_err(corrupt)?)),
            _ => Ok(Payload::Bytes(data)),
        }
    }

    /// Decompress to the flat byte buffer (a tensor's raw storage for tensor
    /// streams).
    pub fn decompress_bytes(&self, stream: &[u8]) -> Result<Vec<u8>> {
        self.decompress(stream)?
            .into_bytes()
            .ok_or(ZipNnError::NotSupported("file payloads"))
    }

    fn decode(&self, table: &PlaneTable, body: &[u8], backend: Compressor) -> Result<Vec<Vec<u8>>> {
        let backend = backend.with_workers(self.budget.backend_workers(table.entries.len()));
        planes::decode_planes(table, body, &backend, self.pool.as_ref())
    }
}

/// The dtype32 engine only knows the float32 permutation.
fn bit_mode(order: BitOrder) -> Result<BitMode> {
    match order {
        BitOrder::None => Ok(BitMode::None),
        BitOrder::Float32 => Ok(BitMode::Reorder),
        BitOrder::BFloat16 => Err(ZipNnError::config(
            "the dtype32 engine has no bfloat16 bit order",
        )),
    }
}

/// Undo the bit reorder; a misaligned buffer here means a corrupt stream.
fn restore_bits(data: &mut [u8], order: BitOrder) -> Result<()> {
    bitorder::restore(data, order).map_err(corrupt)
}

/// A configuration-shaped failure while decoding is stream corruption.
fn corrupt(err: ZipNnError) -> ZipNnError {
    match err {
        ZipNnError::Config(msg) => ZipNnError::Format(msg),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_never_oversubscribes() {
        let b = ThreadBudget { total: 8 };
        assert_eq!(b.backend_workers(4), 2);
        assert_eq!(b.backend_workers(2), 4);
        assert_eq!(b.backend_workers(16), 1);
        assert_eq!(b.backend_workers(0), 8);
        assert_eq!(ThreadBudget { total: 3 }.backend_workers(2), 1);
        assert_eq!(ThreadBudget { total: 1 }.backend_workers(4), 1);
        assert!(ThreadBudget::resolve(0).total >= 1);
    }

    #[test]
    fn dtype32_bit_modes() {
        assert_eq!(bit_mode(BitOrder::None).unwrap(), BitMode::None);
        assert_eq!(bit_mode(BitOrder::Float32).unwrap(), BitMode::Reorder);
        assert!(bit_mode(BitOrder::BFloat16).unwrap_err().is_config());
    }

    #[test]
    fn zipnn_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ZipNn>();
    }
}
