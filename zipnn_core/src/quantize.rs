//! Integer quantization of floating tensors.
//!
//! Every element is multiplied by `2^factor` and truncated into the
//! same-width signed integer (`f32 -> i32`, `bf16 / f16 -> i16`,
//! `f64 -> i64`). Small-magnitude weights then share long runs of identical
//! high bytes. The scaling is all-or-nothing: if a single element would not
//! fit the integer view, the whole tensor is left untouched and `is_int` is
//! false, so decompression always knows which path was taken.

use std::fmt;
use std::str::FromStr;

use half::{bf16, f16};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dtype::DType;
use crate::error::{Result, ZipNnError};

pub const DEFAULT_LOSSY_FACTOR: u8 = 27;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LossyType {
    #[default]
    None,
    Integer,
    /// Reserved in the header table; rejected at configuration time.
    Unsigned,
}

impl LossyType {
    pub fn code(self) -> u8 {
        match self {
            LossyType::None => 0,
            LossyType::Integer => 1,
            LossyType::Unsigned => 2,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(LossyType::None),
            1 => Ok(LossyType::Integer),
            2 => Ok(LossyType::Unsigned),
            other => Err(ZipNnError::config(format!(
                "unsupported lossy type {}",
                other
            ))),
        }
    }

    /// Fail unless this selector has an implementation.
    pub fn ensure_supported(self) -> Result<()> {
        match self {
            LossyType::None | LossyType::Integer => Ok(()),
            LossyType::Unsigned => Err(ZipNnError::config(
                "lossy type 'unsigned' is not implemented",
            )),
        }
    }
}

impl fmt::Display for LossyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LossyType::None => "none",
            LossyType::Integer => "integer",
            LossyType::Unsigned => "unsigned",
        })
    }
}

impl FromStr for LossyType {
    type Err = ZipNnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(LossyType::None),
            "integer" | "int" => Ok(LossyType::Integer),
            "unsigned" | "unsign" => Ok(LossyType::Unsigned),
            other => Err(ZipNnError::config(format!("unknown lossy type '{}'", other))),
        }
    }
}

/// Output of [`quantize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Quantized {
    pub data: Vec<u8>,
    /// True when the tensor was scaled into its integer view.
    pub is_int: bool,
}

/// Check that `dtype` can be integer-quantized. Any factor is accepted; a
/// factor too large for the values present only turns into an unscaled
/// tensor (`is_int = false`).
pub fn check_quantizable(dtype: DType) -> Result<()> {
    if !dtype.is_float() {
        return Err(ZipNnError::config(format!(
            "integer quantization needs a floating dtype, got {}",
            dtype
        )));
    }
    Ok(())
}

fn decode_floats(data: &[u8], dtype: DType) -> Vec<f64> {
    match dtype {
        DType::Float32 => data
            .chunks_exact(4)
            .map(|c| f64::from(f32::from_le_bytes([c[0], c[1], c[2], c[3]])))
            .collect(),
        DType::BFloat16 => data
            .chunks_exact(2)
            .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f64())
            .collect(),
        DType::Float16 => data
            .chunks_exact(2)
            .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f64())
            .collect(),
        DType::Float64 => data
            .chunks_exact(8)
            .map(|c| {
                let mut b = [0u8; 8];
                b.copy_from_slice(c);
                f64::from_le_bytes(b)
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Scale every element by `2^factor` into the dtype's integer view, or
/// return the bytes unchanged if any element would overflow it.
pub fn quantize(data: &[u8], dtype: DType, factor: u8) -> Result<Quantized> {
    check_quantizable(dtype)?;
    if data.len() % dtype.size() != 0 {
        return Err(ZipNnError::config(format!(
            "{} bytes is not a whole number of {} elements",
            data.len(),
            dtype
        )));
    }

    let values = decode_floats(data, dtype);
    let multiplier = (factor as f64).exp2();
    // |x| * 2^factor < 2^(bits-1) for every element, checked before any
    // element is written.
    let limit = f64::from(dtype.bits() - 1).exp2();
    if let Some(pos) = values
        .iter()
        .position(|v| !v.is_finite() || (v * multiplier).abs() >= limit)
    {
        warn!(
            element = pos,
            value = values[pos],
            factor,
            %dtype,
            "integer quantization would overflow, tensor kept unscaled"
        );
        return Ok(Quantized {
            data: data.to_vec(),
            is_int: false,
        });
    }

    let mut out = Vec::with_capacity(data.len());
    for v in values {
        let q = (v * multiplier).trunc();
        match dtype.size() {
            2 => out.extend_from_slice(&(q as i16).to_le_bytes()),
            4 => out.extend_from_slice(&(q as i32).to_le_bytes()),
            _ => out.extend_from_slice(&(q as i64).to_le_bytes()),
        }
    }
    Ok(Quantized {
        data: out,
        is_int: true,
    })
}

/// Undo [`quantize`]: divide the integer view by `2^factor` and convert back
/// to `dtype`. When `is_int` is false the bytes already are `dtype`.
pub fn dequantize(data: &[u8], dtype: DType, factor: u8, is_int: bool) -> Result<Vec<u8>> {
    if !is_int {
        return Ok(data.to_vec());
    }
    check_quantizable(dtype)?;
    let width = dtype.size();
    if data.len() % width != 0 {
        return Err(ZipNnError::format(format!(
            "quantized payload of {} bytes is not a whole number of {}-byte integers",
            data.len(),
            width
        )));
    }

    let divisor = (factor as f64).exp2();
    let mut out = Vec::with_capacity(data.len());
    for c in data.chunks_exact(width) {
        let q = match width {
            2 => f64::from(i16::from_le_bytes([c[0], c[1]])),
            4 => f64::from(i32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            _ => {
                let mut b = [0u8; 8];
                b.copy_from_slice(c);
                i64::from_le_bytes(b) as f64
            }
        };
        let v = q / divisor;
        match dtype {
            DType::Float32 => out.extend_from_slice(&(v as f32).to_le_bytes()),
            DType::BFloat16 => out.extend_from_slice(&bf16::from_f64(v).to_le_bytes()),
            DType::Float16 => out.extend_from_slice(&f16::from_f64(v).to_le_bytes()),
            _ => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
    Ok(out)
}
