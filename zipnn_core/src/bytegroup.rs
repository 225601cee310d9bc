//! Stride-K byte grouping.
//!
//! `[a0 b0 c0 d0 a1 b1 c1 d1 ...]` with K = 4 becomes four planes
//! `[a0 a1 ..] [b0 b1 ..] [c0 c1 ..] [d0 d1 ..]`, so same-significance bytes
//! of adjacent elements sit next to each other. Each plane is then compressed
//! on its own (see [`crate::planes`]).

use crate::error::{Result, ZipNnError};

/// Grouping factors the wire format can express (stored as log2 K).
pub const SUPPORTED_FACTORS: [usize; 3] = [1, 2, 4];

pub fn check_factor(k: usize) -> Result<()> {
    if SUPPORTED_FACTORS.contains(&k) {
        Ok(())
    } else {
        Err(ZipNnError::config(format!(
            "unsupported byte-grouping factor {}; expected 1, 2 or 4",
            k
        )))
    }
}

/// Length of plane `p` when `total` bytes are split with stride `k`.
#[inline]
pub fn plane_len(total: usize, k: usize, p: usize) -> usize {
    if p >= total {
        0
    } else {
        (total - p).div_ceil(k)
    }
}

/// Split `buf` into exactly `k` interleaved planes: plane `i` receives bytes
/// `i, i+k, i+2k, ...`. Any length is accepted; trailing planes may be one
/// byte shorter than the leading ones.
pub fn split(buf: &[u8], k: usize) -> Result<Vec<Vec<u8>>> {
    check_factor(k)?;
    if k == 1 {
        return Ok(vec![buf.to_vec()]);
    }
    let mut planes: Vec<Vec<u8>> = (0..k)
        .map(|p| Vec::with_capacity(plane_len(buf.len(), k, p)))
        .collect();

    let mut chunks = buf.chunks_exact(k);
    for chunk in &mut chunks {
        for (plane, &byte) in planes.iter_mut().zip(chunk) {
            plane.push(byte);
        }
    }
    for (plane, &byte) in planes.iter_mut().zip(chunks.remainder()) {
        plane.push(byte);
    }
    Ok(planes)
}

/// Interleave planes back into element order: byte `j*k + p` comes from
/// plane `p` at offset `j`, with `k = planes.len()`.
///
/// Plane lengths must be exactly what [`split`] would have produced for the
/// combined length; anything else is a corrupt stream.
pub fn combine<P: AsRef<[u8]>>(planes: &[P]) -> Result<Vec<u8>> {
    let k = planes.len();
    check_factor(k)?;
    let total: usize = planes.iter().map(|p| p.as_ref().len()).sum();
    for (p, plane) in planes.iter().enumerate() {
        let expected = plane_len(total, k, p);
        if plane.as_ref().len() != expected {
            return Err(ZipNnError::format(format!(
                "byte group {} holds {} bytes but {} were expected for a {}-byte buffer split {} ways",
                p,
                plane.as_ref().len(),
                expected,
                total,
                k
            )));
        }
    }
    if k == 1 {
        return Ok(planes[0].as_ref().to_vec());
    }

    let mut out = vec![0u8; total];
    for (p, plane) in planes.iter().enumerate() {
        for (dst, &src) in out[p..].iter_mut().step_by(k).zip(plane.as_ref()) {
            *dst = src;
        }
    }
    Ok(out)
}
