use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZipNnError};

/// Element encoding of a tensor's underlying storage.
///
/// The numeric code is what the ZN header stores in byte 9; code 0 is
/// reserved for raw byte payloads and never maps to a `DType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    #[default]
    Float32,
    BFloat16,
    Float16,
    Float64,
    UInt8,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt16,
    UInt32,
}

impl DType {
    pub const ALL: [DType; 11] = [
        DType::Float32,
        DType::BFloat16,
        DType::Float16,
        DType::Float64,
        DType::UInt8,
        DType::Int8,
        DType::Int16,
        DType::Int32,
        DType::Int64,
        DType::UInt16,
        DType::UInt32,
    ];

    pub fn code(self) -> u8 {
        match self {
            DType::Float32 => 1,
            DType::BFloat16 => 2,
            DType::Float16 => 3,
            DType::Float64 => 4,
            DType::UInt8 => 5,
            DType::Int8 => 6,
            DType::Int16 => 7,
            DType::Int32 => 8,
            DType::Int64 => 9,
            DType::UInt16 => 10,
            DType::UInt32 => 11,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        DType::ALL
            .into_iter()
            .find(|d| d.code() == code)
            .ok_or_else(|| ZipNnError::config(format!("unsupported dtype code {}", code)))
    }

    /// Bytes per element.
    pub fn size(self) -> usize {
        match self {
            DType::UInt8 | DType::Int8 => 1,
            DType::BFloat16 | DType::Float16 | DType::Int16 | DType::UInt16 => 2,
            DType::Float32 | DType::Int32 | DType::UInt32 => 4,
            DType::Float64 | DType::Int64 => 8,
        }
    }

    pub fn bits(self) -> u32 {
        self.size() as u32 * 8
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            DType::Float32 | DType::BFloat16 | DType::Float16 | DType::Float64
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::Float32 => "float32",
            DType::BFloat16 => "bfloat16",
            DType::Float16 => "float16",
            DType::Float64 => "float64",
            DType::UInt8 => "uint8",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::UInt16 => "uint16",
            DType::UInt32 => "uint32",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = ZipNnError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "f32" | "fp32" => return Ok(DType::Float32),
            "bf16" => return Ok(DType::BFloat16),
            "f16" | "fp16" | "half" => return Ok(DType::Float16),
            "f64" | "fp64" | "double" => return Ok(DType::Float64),
            _ => {}
        }
        DType::ALL
            .into_iter()
            .find(|d| d.name() == lower)
            .ok_or_else(|| ZipNnError::config(format!("unsupported dtype '{}'", s)))
    }
}
