//! Property-based tests for the reshaping transforms.
//!
//! Every transform must be a bijection on arbitrary bytes (or, for the
//! truncating byte modes, lose exactly the declared bits).

use proptest::prelude::*;

use zipnn_core::bitorder::{self, restore_16_bits, reorder_16_bits, BitOrder};
use zipnn_core::bytegroup;
use zipnn_core::dtype32::{combine_dtype32, split_dtype32, BitMode, ByteMode};
use zipnn_core::format::{Header, Layout};
use zipnn_core::{DType, Method};

fn byte_mode_strategy() -> impl Strategy<Value = ByteMode> {
    prop::sample::select(ByteMode::ALL.to_vec())
}

fn bit_mode_strategy() -> impl Strategy<Value = BitMode> {
    prop_oneof![Just(BitMode::None), Just(BitMode::Reorder)]
}

/// Buffers that are a whole number of 32-bit elements.
fn f32_buffer_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u32>(), 0..256)
        .prop_map(|v| v.iter().flat_map(|x| x.to_le_bytes()).collect())
}

#[test]
fn every_16_bit_pattern_survives_reorder() {
    for x in 0..=u16::MAX {
        assert_eq!(restore_16_bits(reorder_16_bits(x)), x);
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 100,
        ..ProptestConfig::default()
    })]

    #[test]
    fn prop_f32_reorder_is_bijective(x in any::<u32>()) {
        let y = bitorder::reorder_f32_bits(x);
        prop_assert_eq!(bitorder::restore_f32_bits(y), x);
    }

    #[test]
    fn prop_buffer_reorder_roundtrip(buf in f32_buffer_strategy(), wide in any::<bool>()) {
        let order = if wide { BitOrder::Float32 } else { BitOrder::BFloat16 };
        let mut work = buf.clone();
        bitorder::reorder(&mut work, order).unwrap();
        bitorder::restore(&mut work, order).unwrap();
        prop_assert_eq!(work, buf);
    }

    #[test]
    fn prop_bytegroup_roundtrip(
        buf in prop::collection::vec(any::<u8>(), 0..2048),
        k in prop_oneof![Just(1usize), Just(2), Just(4)],
    ) {
        let planes = bytegroup::split(&buf, k).unwrap();
        prop_assert_eq!(planes.len(), k);
        prop_assert_eq!(bytegroup::combine(&planes).unwrap(), buf);
    }

    #[test]
    fn prop_dtype32_keeps_exactly_the_mask(
        buf in f32_buffer_strategy(),
        mode in byte_mode_strategy(),
        bit_mode in bit_mode_strategy(),
    ) {
        let planes = split_dtype32(&buf, bit_mode, mode).unwrap();
        prop_assert_eq!(planes.len(), mode.plane_count());
        let back = combine_dtype32(&planes, bit_mode, mode).unwrap();
        let mask = mode.kept_mask();
        for (orig, got) in buf.chunks_exact(4).zip(back.chunks_exact(4)) {
            let o = u32::from_le_bytes([orig[0], orig[1], orig[2], orig[3]]);
            let g = u32::from_le_bytes([got[0], got[1], got[2], got[3]]);
            prop_assert_eq!(g, o & mask);
        }
    }

    #[test]
    fn prop_header_roundtrip(
        method in prop::sample::select(Method::ALL.to_vec()),
        dtype in prop::option::of(prop::sample::select(DType::ALL.to_vec())),
        k in prop_oneof![Just(1u8), Just(2), Just(4)],
        factor in 0u8..64,
        chunk in any::<u16>(),
    ) {
        let mut header = Header::new(method, Layout::ByteGroup(k));
        header.dtype = dtype;
        header.lossy_factor = factor;
        header.streaming_chunk_kb = chunk;
        prop_assert_eq!(Header::from_bytes(&header.to_bytes()).unwrap(), header);
    }

    #[test]
    fn prop_magic_corruption_rejected(pos in 0usize..2, byte in any::<u8>()) {
        let mut raw = Header::new(Method::Zstd, Layout::ByteGroup(4)).to_bytes();
        prop_assume!(raw[pos] != byte);
        raw[pos] = byte;
        prop_assert!(Header::from_bytes(&raw).unwrap_err().is_format());
    }
}
