//! Exponent-first bit reordering for floating-point byte streams.
//!
//! IEEE-754 puts the sign bit between nothing and the exponent, so the most
//! significant byte of every element mixes one high-entropy sign bit with
//! seven low-entropy exponent bits. Moving the sign bit below the exponent
//! makes the top byte pure exponent, which a generic compressor handles much
//! better once the bytes are grouped into planes.
//!
//! ```text
//! float32   [s | e7..e0 | m22..m0]  ->  [e7..e0 | s | m22..m0]
//! 16-bit    [s | e7..e0 | m6..m0 ]  ->  [e7..e0 | s | m6..m0 ]
//! ```
//!
//! The transform is a bit permutation, so it is defined for every bit
//! pattern (NaN payloads and subnormals included). It is not an involution:
//! [`restore`] is the distinct inverse of [`reorder`].
//!
//! Both functions mutate the buffer they are given. Callers that must not
//! touch their input pass an owned working copy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZipNnError};

/// Which bit permutation to apply, and so which element width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BitOrder {
    #[default]
    None,
    /// 32-bit elements.
    Float32,
    /// 16-bit elements, laid out as bfloat16.
    BFloat16,
}

impl BitOrder {
    /// Value stored in header byte 8.
    pub fn code(self) -> u8 {
        match self {
            BitOrder::None => 0,
            BitOrder::Float32 => 32,
            BitOrder::BFloat16 => 16,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(BitOrder::None),
            32 => Ok(BitOrder::Float32),
            16 => Ok(BitOrder::BFloat16),
            other => Err(ZipNnError::config(format!(
                "unsupported bit-reorder width {}; expected 0, 16 or 32",
                other
            ))),
        }
    }

    /// Element width in bytes, `None` when no reordering is applied.
    pub fn width(self) -> Option<usize> {
        match self {
            BitOrder::None => None,
            BitOrder::Float32 => Some(4),
            BitOrder::BFloat16 => Some(2),
        }
    }
}

impl fmt::Display for BitOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BitOrder::None => "none",
            BitOrder::Float32 => "float32",
            BitOrder::BFloat16 => "bfloat16",
        })
    }
}

impl FromStr for BitOrder {
    type Err = ZipNnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "0" => Ok(BitOrder::None),
            "float32" | "f32" | "32" => Ok(BitOrder::Float32),
            "bfloat16" | "bf16" | "16" => Ok(BitOrder::BFloat16),
            other => Err(ZipNnError::config(format!(
                "unknown bit order '{}'. Valid options: none, float32, bfloat16",
                other
            ))),
        }
    }
}

// ── Element permutations ───────────────────────────────────────────────────

#[inline]
pub fn reorder_f32_bits(x: u32) -> u32 {
    let sign = x >> 31;
    let exponent = (x >> 23) & 0xFF;
    let mantissa = x & 0x007F_FFFF;
    (exponent << 24) | (sign << 23) | mantissa
}

#[inline]
pub fn restore_f32_bits(y: u32) -> u32 {
    let exponent = y >> 24;
    let sign = (y >> 23) & 1;
    let mantissa = y & 0x007F_FFFF;
    (sign << 31) | (exponent << 23) | mantissa
}

#[inline]
pub fn reorder_16_bits(x: u16) -> u16 {
    let sign = x >> 15;
    let exponent = (x >> 7) & 0xFF;
    let mantissa = x & 0x7F;
    (exponent << 8) | (sign << 7) | mantissa
}

#[inline]
pub fn restore_16_bits(y: u16) -> u16 {
    let exponent = y >> 8;
    let sign = (y >> 7) & 1;
    let mantissa = y & 0x7F;
    (sign << 15) | (exponent << 7) | mantissa
}

// ── Buffer transforms ──────────────────────────────────────────────────────

/// Apply the forward permutation to every element of `buf` in place.
pub fn reorder(buf: &mut [u8], order: BitOrder) -> Result<()> {
    apply(buf, order, reorder_f32_bits, reorder_16_bits)
}

/// Undo [`reorder`] in place.
pub fn restore(buf: &mut [u8], order: BitOrder) -> Result<()> {
    apply(buf, order, restore_f32_bits, restore_16_bits)
}

fn apply(
    buf: &mut [u8],
    order: BitOrder,
    f32_fn: fn(u32) -> u32,
    f16_fn: fn(u16) -> u16,
) -> Result<()> {
    let Some(width) = order.width() else {
        return Ok(());
    };
    if buf.len() % width != 0 {
        return Err(ZipNnError::config(format!(
            "{} bit reorder needs a multiple of {} bytes, got {}",
            order,
            width,
            buf.len()
        )));
    }
    match width {
        4 => {
            for chunk in buf.chunks_exact_mut(4) {
                let x = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                chunk.copy_from_slice(&f32_fn(x).to_le_bytes());
            }
        }
        _ => {
            for chunk in buf.chunks_exact_mut(2) {
                let x = u16::from_le_bytes([chunk[0], chunk[1]]);
                chunk.copy_from_slice(&f16_fn(x).to_le_bytes());
            }
        }
    }
    Ok(())
}
