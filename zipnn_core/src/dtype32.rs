//! Dtype-aware plane split/combine for 32-bit elements.
//!
//! A [`ByteMode`] says which bytes of each little-endian element go to which
//! output plane, and which bytes are dropped altogether. Dropping is the
//! declared-lossy truncation: combine writes zeros where the dropped bytes
//! were. A [`BitMode`] optionally applies the exponent-first bit reorder to
//! every element before the split (and undoes it after the combine).
//!
//! The byte-mode table is closed. Codes that are not listed are rejected
//! rather than guessed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bitorder::{reorder_f32_bits, restore_f32_bits};
use crate::error::{Result, ZipNnError};

/// Element width this engine is built for.
pub const ELEMENT_SIZE: usize = 4;

/// Marks header byte 7 as a byte-mode code rather than a grouping factor.
pub const LAYOUT_DTYPE32_FLAG: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ByteMode {
    /// `[b0] [b1] [b2] [b3]`
    Bytes4,
    /// `[b0 b1] [b2 b3]`
    Halves,
    /// `[b0 b1 b2] [b3]`
    ExponentMantissa,
    /// `[b0 b1 b2 b3]`: a single plane, useful with the bit reorder alone.
    Whole,
    /// `[b0 b1]`, b2 and b3 discarded. Exact for buffers whose high
    /// halves are already zero.
    TruncateHigh16,
    /// `[b1] [b2] [b3]`, b0 discarded.
    TruncateLow8,
    /// `[b2] [b3]`, b0 and b1 discarded (float32 -> bfloat16 precision).
    TruncateLow16,
}

const BYTES4: &[&[usize]] = &[&[0], &[1], &[2], &[3]];
const HALVES: &[&[usize]] = &[&[0, 1], &[2, 3]];
const EXPONENT_MANTISSA: &[&[usize]] = &[&[0, 1, 2], &[3]];
const WHOLE: &[&[usize]] = &[&[0, 1, 2, 3]];
const TRUNCATE_HIGH16: &[&[usize]] = &[&[0, 1]];
const TRUNCATE_LOW8: &[&[usize]] = &[&[1], &[2], &[3]];
const TRUNCATE_LOW16: &[&[usize]] = &[&[2], &[3]];

impl ByteMode {
    pub const ALL: [ByteMode; 7] = [
        ByteMode::Bytes4,
        ByteMode::Halves,
        ByteMode::ExponentMantissa,
        ByteMode::Whole,
        ByteMode::TruncateHigh16,
        ByteMode::TruncateLow8,
        ByteMode::TruncateLow16,
    ];

    pub fn code(self) -> u8 {
        match self {
            ByteMode::Bytes4 => 1,
            ByteMode::Halves => 2,
            ByteMode::ExponentMantissa => 3,
            ByteMode::Whole => 4,
            ByteMode::TruncateHigh16 => 9,
            ByteMode::TruncateLow8 => 10,
            ByteMode::TruncateLow16 => 11,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        ByteMode::ALL
            .into_iter()
            .find(|m| m.code() == code)
            .ok_or_else(|| {
                ZipNnError::config(format!(
                    "unsupported byte mode {}; expected one of 1, 2, 3, 4, 9, 10, 11",
                    code
                ))
            })
    }

    /// Element byte indices feeding each plane, in plane order.
    pub fn groups(self) -> &'static [&'static [usize]] {
        match self {
            ByteMode::Bytes4 => BYTES4,
            ByteMode::Halves => HALVES,
            ByteMode::ExponentMantissa => EXPONENT_MANTISSA,
            ByteMode::Whole => WHOLE,
            ByteMode::TruncateHigh16 => TRUNCATE_HIGH16,
            ByteMode::TruncateLow8 => TRUNCATE_LOW8,
            ByteMode::TruncateLow16 => TRUNCATE_LOW16,
        }
    }

    pub fn plane_count(self) -> usize {
        self.groups().len()
    }

    /// Bytes of each element kept across all planes.
    pub fn kept_bytes(self) -> usize {
        self.groups().iter().map(|g| g.len()).sum()
    }

    pub fn is_lossy(self) -> bool {
        self.kept_bytes() < ELEMENT_SIZE
    }

    /// Mask of the element bits that survive a split/combine round trip.
    pub fn kept_mask(self) -> u32 {
        self.groups()
            .iter()
            .flat_map(|g| g.iter())
            .fold(0u32, |mask, &b| mask | (0xFFu32 << (8 * b)))
    }
}

impl TryFrom<u8> for ByteMode {
    type Error = ZipNnError;

    fn try_from(code: u8) -> Result<Self> {
        ByteMode::from_code(code)
    }
}

impl From<ByteMode> for u8 {
    fn from(mode: ByteMode) -> u8 {
        mode.code()
    }
}

impl fmt::Display for ByteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ByteMode::Bytes4 => "bytes4",
            ByteMode::Halves => "halves",
            ByteMode::ExponentMantissa => "exponent-mantissa",
            ByteMode::Whole => "whole",
            ByteMode::TruncateHigh16 => "truncate-high16",
            ByteMode::TruncateLow8 => "truncate-low8",
            ByteMode::TruncateLow16 => "truncate-low16",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BitMode {
    #[default]
    None,
    /// Exponent-first reorder of each element before splitting.
    Reorder,
}

impl BitMode {
    pub fn code(self) -> u8 {
        match self {
            BitMode::None => 0,
            BitMode::Reorder => 1,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(BitMode::None),
            1 => Ok(BitMode::Reorder),
            other => Err(ZipNnError::config(format!(
                "unsupported bit mode {}; expected 0 or 1",
                other
            ))),
        }
    }
}

fn check_aligned(len: usize) -> Result<()> {
    if len % ELEMENT_SIZE != 0 {
        return Err(ZipNnError::config(format!(
            "dtype32 planes need {}-byte elements, buffer holds {} bytes",
            ELEMENT_SIZE, len
        )));
    }
    Ok(())
}

/// Split `buf` (a whole number of 32-bit elements) into the planes selected
/// by `byte_mode`. Truncating modes drop the discarded bytes here.
pub fn split_dtype32(buf: &[u8], bit_mode: BitMode, byte_mode: ByteMode) -> Result<Vec<Vec<u8>>> {
    check_aligned(buf.len())?;
    let count = buf.len() / ELEMENT_SIZE;
    let groups = byte_mode.groups();
    let mut planes: Vec<Vec<u8>> = groups
        .iter()
        .map(|g| Vec::with_capacity(count * g.len()))
        .collect();

    for chunk in buf.chunks_exact(ELEMENT_SIZE) {
        let mut element = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if bit_mode == BitMode::Reorder {
            element = reorder_f32_bits(element);
        }
        let bytes = element.to_le_bytes();
        for (plane, group) in planes.iter_mut().zip(groups) {
            plane.extend(group.iter().map(|&b| bytes[b]));
        }
    }
    Ok(planes)
}

/// Rebuild the element buffer from the planes of [`split_dtype32`]. Must be
/// called with the same `bit_mode` and `byte_mode`; a wrong plane count is
/// rejected, a wrong mode with a matching plane count is undetectable.
pub fn combine_dtype32<P: AsRef<[u8]>>(
    planes: &[P],
    bit_mode: BitMode,
    byte_mode: ByteMode,
) -> Result<Vec<u8>> {
    let groups = byte_mode.groups();
    if planes.len() != groups.len() {
        return Err(ZipNnError::config(format!(
            "byte mode {} produces {} planes, got {}",
            byte_mode,
            groups.len(),
            planes.len()
        )));
    }
    let count = planes[0].as_ref().len() / groups[0].len();
    for (i, (plane, group)) in planes.iter().zip(groups).enumerate() {
        if plane.as_ref().len() != count * group.len() {
            return Err(ZipNnError::format(format!(
                "plane {} holds {} bytes, expected {} for {} elements",
                i,
                plane.as_ref().len(),
                count * group.len(),
                count
            )));
        }
    }

    let mut out = Vec::with_capacity(count * ELEMENT_SIZE);
    for e in 0..count {
        let mut bytes = [0u8; ELEMENT_SIZE];
        for (plane, group) in planes.iter().zip(groups) {
            let src = &plane.as_ref()[e * group.len()..(e + 1) * group.len()];
            for (&b, &v) in group.iter().zip(src) {
                bytes[b] = v;
            }
        }
        let mut element = u32::from_le_bytes(bytes);
        if bit_mode == BitMode::Reorder {
            element = restore_f32_bits(element);
        }
        out.extend_from_slice(&element.to_le_bytes());
    }
    Ok(out)
}
