use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zipnn_core::backend::Method;
use zipnn_core::bitorder::BitOrder;
use zipnn_core::bytegroup;
use zipnn_core::dtype::DType;
use zipnn_core::dtype32::{self, ByteMode};
use zipnn_core::error::{Result, ZipNnError};
use zipnn_core::format::DEFAULT_STREAMING_CHUNK_KB;
use zipnn_core::planes::DEFAULT_THRESHOLD;
use zipnn_core::quantize::{LossyType, DEFAULT_LOSSY_FACTOR};

use crate::zstd_codec::DEFAULT_ZSTD_LEVEL;

/// What kind of payload an instance expects to compress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    #[default]
    Bytes,
    Tensor,
    File,
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputFormat::Bytes => "bytes",
            InputFormat::Tensor => "tensor",
            InputFormat::File => "file",
        })
    }
}

impl FromStr for InputFormat {
    type Err = ZipNnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bytes" | "byte" => Ok(InputFormat::Bytes),
            "tensor" | "torch" => Ok(InputFormat::Tensor),
            "file" => Ok(InputFormat::File),
            other => Err(ZipNnError::config(format!(
                "unknown input format '{}'. Valid options: bytes, tensor, file",
                other
            ))),
        }
    }
}

/// Settings fixed for the lifetime of a [`crate::ZipNn`] instance.
///
/// Missing fields in a JSON config take their defaults, so a file holding
/// only `{"method": "lz4"}` is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    pub method: Method,
    pub input_format: InputFormat,
    /// Element dtype of raw byte input; drives automatic byte grouping.
    pub dtype: DType,
    /// 0 = pick from the dtype size, otherwise 1, 2 or 4.
    pub byte_grouping: u8,
    /// Selects the dtype-aware 32-bit engine instead of plain grouping.
    pub byte_mode: Option<ByteMode>,
    pub bit_order: BitOrder,
    /// Compressed/raw ratio at or above which a plane is stored raw.
    pub threshold: f64,
    pub lossy_type: LossyType,
    pub lossy_factor: u8,
    /// Backend level; only zstd reads it.
    pub level: i32,
    /// 0 = available parallelism, 1 = sequential.
    pub threads: usize,
    pub delta: bool,
    pub streaming: bool,
    pub streaming_chunk_kb: u16,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            method: Method::Zstd,
            input_format: InputFormat::Bytes,
            dtype: DType::Float32,
            byte_grouping: 0,
            byte_mode: None,
            bit_order: BitOrder::None,
            threshold: DEFAULT_THRESHOLD,
            lossy_type: LossyType::None,
            lossy_factor: DEFAULT_LOSSY_FACTOR,
            level: DEFAULT_ZSTD_LEVEL,
            threads: 0,
            delta: false,
            streaming: false,
            streaming_chunk_kb: DEFAULT_STREAMING_CHUNK_KB,
        }
    }
}

impl CodecConfig {
    /// Tensor input with the given element dtype.
    #[must_use]
    pub fn tensor(dtype: DType) -> Self {
        Self {
            input_format: InputFormat::Tensor,
            dtype,
            ..Self::default()
        }
    }

    /// Lowest-latency settings: lz4, sequential.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            method: Method::Lz4,
            threads: 1,
            ..Self::default()
        }
    }

    /// Highest-ratio lossless settings for float32: exponent-first bit
    /// reorder, 4-way grouping, zstd level 19.
    #[must_use]
    pub fn best() -> Self {
        Self {
            byte_grouping: 4,
            bit_order: BitOrder::Float32,
            level: 19,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_method(self, method: Method) -> Self {
        Self { method, ..self }
    }

    #[must_use]
    pub fn with_level(self, level: i32) -> Self {
        Self { level, ..self }
    }

    #[must_use]
    pub fn with_byte_grouping(self, byte_grouping: u8) -> Self {
        Self {
            byte_grouping,
            ..self
        }
    }

    #[must_use]
    pub fn with_byte_mode(self, byte_mode: ByteMode) -> Self {
        Self {
            byte_mode: Some(byte_mode),
            ..self
        }
    }

    #[must_use]
    pub fn with_bit_order(self, bit_order: BitOrder) -> Self {
        Self { bit_order, ..self }
    }

    #[must_use]
    pub fn with_integer_lossy(self, lossy_factor: u8) -> Self {
        Self {
            lossy_type: LossyType::Integer,
            lossy_factor,
            ..self
        }
    }

    #[must_use]
    pub fn with_threads(self, threads: usize) -> Self {
        Self { threads, ..self }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ZipNnError::config(format!("invalid config: {}", e)))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ZipNnError::config(e.to_string()))
    }

    /// Check everything that can be checked without a payload. Per-call
    /// checks (tensor dtype vs. engine width, buffer alignment) happen at
    /// operation start.
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(ZipNnError::config(format!(
                "threshold must be a positive finite ratio, got {}",
                self.threshold
            )));
        }
        if self.byte_grouping != 0 {
            bytegroup::check_factor(self.byte_grouping as usize)?;
        }

        self.lossy_type.ensure_supported()?;
        if self.lossy_type != LossyType::None {
            if self.input_format != InputFormat::Tensor {
                return Err(ZipNnError::config(format!(
                    "lossy compression requires tensor input, configured for {}",
                    self.input_format
                )));
            }
            zipnn_core::quantize::check_quantizable(self.dtype)?;
        }

        if self.byte_mode.is_some() {
            if self.byte_grouping != 0 {
                return Err(ZipNnError::config(
                    "byte_grouping and byte_mode select different engines; set only one",
                ));
            }
            if self.bit_order == BitOrder::BFloat16 {
                return Err(ZipNnError::config(
                    "the dtype32 engine only supports the float32 bit order",
                ));
            }
            if self.dtype.size() != dtype32::ELEMENT_SIZE {
                return Err(ZipNnError::config(format!(
                    "byte_mode needs a 32-bit dtype, configured for {}",
                    self.dtype
                )));
            }
        }

        if let Some(width) = self.bit_order.width() {
            if width != self.dtype.size() {
                return Err(ZipNnError::config(format!(
                    "{} bit order does not match {}-byte {} elements",
                    self.bit_order,
                    self.dtype.size(),
                    self.dtype
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = CodecConfig::default();
        assert_eq!(c.method, Method::Zstd);
        assert_eq!(c.threshold, 0.95);
        assert_eq!(c.lossy_factor, 27);
        assert_eq!(c.streaming_chunk_kb, 64);
        c.validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c = CodecConfig::from_json(r#"{"method": "lz4", "byte_mode": 11, "threads": 2}"#).unwrap();
        assert_eq!(c.method, Method::Lz4);
        assert_eq!(c.byte_mode, Some(ByteMode::TruncateLow16));
        assert_eq!(c.threads, 2);
        assert_eq!(c.dtype, DType::Float32);
    }

    #[test]
    fn json_roundtrip() {
        let c = CodecConfig::best().with_method(Method::Snappy);
        let back = CodecConfig::from_json(&c.to_json().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn bad_json_is_config_error() {
        assert!(CodecConfig::from_json(r#"{"method": "brotli"}"#).unwrap_err().is_config());
        assert!(CodecConfig::from_json(r#"{"byte_mode": 5}"#).unwrap_err().is_config());
        assert!(CodecConfig::from_json(r#"{"colour": 1}"#).unwrap_err().is_config());
    }

    #[test]
    fn rejects_bad_combinations() {
        let lossy_bytes = CodecConfig::default().with_integer_lossy(10);
        assert!(lossy_bytes.validate().unwrap_err().is_config());

        let unsigned = CodecConfig {
            lossy_type: LossyType::Unsigned,
            ..CodecConfig::tensor(DType::Float32)
        };
        assert!(unsigned.validate().unwrap_err().is_config());

        let both = CodecConfig::default()
            .with_byte_grouping(4)
            .with_byte_mode(ByteMode::Bytes4);
        assert!(both.validate().unwrap_err().is_config());

        let wide = CodecConfig::tensor(DType::BFloat16).with_bit_order(BitOrder::Float32);
        assert!(wide.validate().unwrap_err().is_config());

        let int_dtype = CodecConfig::tensor(DType::Int16).with_integer_lossy(4);
        assert!(int_dtype.validate().unwrap_err().is_config());

        assert!(CodecConfig::default().with_byte_grouping(3).validate().is_err());
        let nan = CodecConfig {
            threshold: f64::NAN,
            ..CodecConfig::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn wide_lossy_factor_on_half_width_dtype_is_valid() {
        CodecConfig::tensor(DType::BFloat16).with_integer_lossy(27).validate().unwrap();
        CodecConfig::tensor(DType::Float16).with_integer_lossy(u8::MAX).validate().unwrap();
    }
}
