//! Per-plane compress-or-store decisions and the plane descriptor table.
//!
//! # Wire layout
//! ```text
//! [flag: u8] x P        1 = stored compressed, 0 = stored raw
//! [len:  u64 LE] x P    stored length of each plane
//! [plane 0] [plane 1] ... [plane P-1]
//! ```
//!
//! A plane whose compressed form is not meaningfully smaller than the raw
//! bytes (typically the high-entropy low mantissa bytes) is stored raw, so no
//! plane ever costs much more than its raw size.

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::debug;

use crate::backend::Backend;
use crate::error::{Result, ZipNnError};

/// Compressed/raw ratio at or above which a plane is stored raw.
pub const DEFAULT_THRESHOLD: f64 = 0.95;

pub const FLAG_RAW: u8 = 0;
pub const FLAG_COMPRESSED: u8 = 1;

/// Bytes taken by one plane in the descriptor table.
pub const PLANE_ENTRY_SIZE: usize = 1 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneEntry {
    pub compressed: bool,
    /// Stored length in bytes (compressed length when `compressed`).
    pub len: u64,
}

/// Descriptor table: one entry per plane, in split order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaneTable {
    pub entries: Vec<PlaneEntry>,
}

impl PlaneTable {
    pub fn encoded_len(&self) -> usize {
        self.entries.len() * PLANE_ENTRY_SIZE
    }

    /// Sum of all stored plane lengths.
    pub fn payload_len(&self) -> u64 {
        self.entries.iter().map(|e| e.len).sum()
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        for entry in &self.entries {
            out.push(if entry.compressed {
                FLAG_COMPRESSED
            } else {
                FLAG_RAW
            });
        }
        for entry in &self.entries {
            out.extend_from_slice(&entry.len.to_le_bytes());
        }
    }

    /// Parse a table of `count` planes from the front of `buf`.
    ///
    /// The remainder of `buf` after the table must be exactly the plane
    /// payloads: a stream with trailing or missing bytes is rejected here,
    /// before any plane is decoded.
    pub fn parse(buf: &[u8], count: usize) -> Result<(Self, usize)> {
        let table_len = count * PLANE_ENTRY_SIZE;
        if buf.len() < table_len {
            return Err(ZipNnError::format(format!(
                "plane table truncated: need {} bytes for {} planes, have {}",
                table_len,
                count,
                buf.len()
            )));
        }
        let (flags, rest) = buf.split_at(count);
        let mut entries = Vec::with_capacity(count);
        for (i, &flag) in flags.iter().enumerate() {
            let compressed = match flag {
                FLAG_COMPRESSED => true,
                FLAG_RAW => false,
                other => {
                    return Err(ZipNnError::format(format!(
                        "plane {} has invalid storage flag {}",
                        i, other
                    )))
                }
            };
            let mut len_bytes = [0u8; 8];
            len_bytes.copy_from_slice(&rest[i * 8..(i + 1) * 8]);
            entries.push(PlaneEntry {
                compressed,
                len: u64::from_le_bytes(len_bytes),
            });
        }
        let table = Self { entries };

        let available = (buf.len() - table_len) as u64;
        let expected = table
            .entries
            .iter()
            .try_fold(0u64, |acc, e| acc.checked_add(e.len))
            .ok_or_else(|| ZipNnError::format("plane lengths overflow"))?;
        if expected != available {
            return Err(ZipNnError::format(format!(
                "plane table declares {} payload bytes but the stream holds {}",
                expected, available
            )));
        }
        Ok((table, table_len))
    }
}

/// Planes after the compress-or-store decision, ready to be written.
#[derive(Debug, Clone, Default)]
pub struct EncodedPlanes {
    pub table: PlaneTable,
    pub payloads: Vec<Vec<u8>>,
}

impl EncodedPlanes {
    pub fn encoded_len(&self) -> usize {
        self.table.encoded_len() + self.payloads.iter().map(Vec::len).sum::<usize>()
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        self.table.write_to(out);
        for payload in &self.payloads {
            out.extend_from_slice(payload);
        }
    }
}

/// Decide how one plane is stored.
fn encode_plane<B: Backend + ?Sized>(
    index: usize,
    plane: &[u8],
    backend: &B,
    threshold: f64,
) -> Result<(PlaneEntry, Vec<u8>)> {
    if plane.is_empty() {
        return Ok((
            PlaneEntry {
                compressed: false,
                len: 0,
            },
            Vec::new(),
        ));
    }
    let compressed = backend.compress(plane)?;
    let ratio = compressed.len() as f64 / plane.len() as f64;
    if ratio < threshold {
        debug!(plane = index, ratio, raw = plane.len(), stored = compressed.len(), "plane stored compressed");
        Ok((
            PlaneEntry {
                compressed: true,
                len: compressed.len() as u64,
            },
            compressed,
        ))
    } else {
        debug!(plane = index, ratio, raw = plane.len(), "plane stored raw");
        Ok((
            PlaneEntry {
                compressed: false,
                len: plane.len() as u64,
            },
            plane.to_vec(),
        ))
    }
}

/// Compress every plane independently and keep, per plane, whichever of the
/// compressed or raw form the threshold selects.
///
/// With a pool the planes are compressed in parallel; results are collected
/// in plane order either way. The first backend failure aborts the call.
pub fn encode_planes<B: Backend + ?Sized>(
    planes: &[Vec<u8>],
    backend: &B,
    threshold: f64,
    pool: Option<&ThreadPool>,
) -> Result<EncodedPlanes> {
    let encoded: Vec<(PlaneEntry, Vec<u8>)> = match pool {
        Some(pool) => pool.install(|| {
            planes
                .par_iter()
                .enumerate()
                .map(|(i, plane)| encode_plane(i, plane, backend, threshold))
                .collect::<Result<Vec<_>>>()
        })?,
        None => planes
            .iter()
            .enumerate()
            .map(|(i, plane)| encode_plane(i, plane, backend, threshold))
            .collect::<Result<Vec<_>>>()?,
    };

    let (entries, payloads) = encoded.into_iter().unzip();
    Ok(EncodedPlanes {
        table: PlaneTable { entries },
        payloads,
    })
}

/// Recover the raw planes described by `table` from `payload` (the bytes
/// following the table).
pub fn decode_planes<B: Backend + ?Sized>(
    table: &PlaneTable,
    payload: &[u8],
    backend: &B,
    pool: Option<&ThreadPool>,
) -> Result<Vec<Vec<u8>>> {
    if table.payload_len() != payload.len() as u64 {
        return Err(ZipNnError::format(format!(
            "plane table declares {} payload bytes but {} were supplied",
            table.payload_len(),
            payload.len()
        )));
    }
    let mut slices = Vec::with_capacity(table.entries.len());
    let mut offset = 0usize;
    for entry in &table.entries {
        let end = offset + entry.len as usize;
        slices.push((entry.compressed, &payload[offset..end]));
        offset = end;
    }

    let decode = |(compressed, bytes): &(bool, &[u8])| -> Result<Vec<u8>> {
        if *compressed {
            backend.decompress(bytes)
        } else {
            Ok(bytes.to_vec())
        }
    };
    match pool {
        Some(pool) => pool.install(|| slices.par_iter().map(decode).collect()),
        None => slices.iter().map(decode).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_roundtrip() {
        let table = PlaneTable {
            entries: vec![
                PlaneEntry { compressed: true, len: 3 },
                PlaneEntry { compressed: false, len: 2 },
            ],
        };
        let mut buf = Vec::new();
        table.write_to(&mut buf);
        assert_eq!(buf.len(), 18);
        assert_eq!(&buf[..2], &[1, 0]);
        buf.extend_from_slice(&[9, 9, 9, 8, 8]);
        let (parsed, consumed) = PlaneTable::parse(&buf, 2).unwrap();
        assert_eq!(parsed, table);
        assert_eq!(consumed, 18);
    }

    #[test]
    fn short_payload_rejected() {
        let table = PlaneTable {
            entries: vec![PlaneEntry { compressed: false, len: 10 }],
        };
        let mut buf = Vec::new();
        table.write_to(&mut buf);
        buf.extend_from_slice(&[0u8; 4]);
        assert!(PlaneTable::parse(&buf, 1).unwrap_err().is_format());
        assert!(PlaneTable::parse(&buf[..5], 1).unwrap_err().is_format());
    }

    #[test]
    fn bad_flag_rejected() {
        let mut buf = vec![7u8];
        buf.extend_from_slice(&0u64.to_le_bytes());
        assert!(PlaneTable::parse(&buf, 1).unwrap_err().is_format());
    }
}
