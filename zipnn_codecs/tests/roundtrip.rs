/// End-to-end tests for `ZipNn`: every stream produced here is decoded back
/// through the public API, and the wire layout is checked with `inspect`.
use half::bf16;
use zipnn_codecs::{inspect, CodecConfig, InputFormat, LossyOverride, ZipNn};
use zipnn_core::format::HEADER_SIZE;
use zipnn_core::{BitOrder, ByteMode, DType, Layout, LossyType, Method, Payload, Tensor, ZipNnError};

/// Generate `len` deterministic bytes using a simple LCG.
fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

/// `count` float32 values in roughly [-0.1, 0.1].
fn weights(count: usize, seed: u64) -> Vec<f32> {
    pseudo_random_bytes(count * 2, seed)
        .chunks_exact(2)
        .map(|c| (u16::from_le_bytes([c[0], c[1]]) as f32 / u16::MAX as f32 - 0.5) * 0.2)
        .collect()
}

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn codec(config: CodecConfig) -> ZipNn {
    ZipNn::new(config.with_threads(1)).unwrap()
}

// ── lossless round trips ──────────────────────────────────────────────────

#[test]
fn test_reference_vector_k4() {
    let data = [0x00, 0x3F, 0x80, 0x00, 0x00, 0x40, 0x00, 0x00];
    let zn = codec(CodecConfig::default().with_byte_grouping(4));
    let stream = zn.compress_bytes(&data).unwrap();
    assert_eq!(&stream[..2], b"ZN");
    assert_eq!(stream[7], 2, "log2 of the grouping factor");
    assert_eq!(zn.decompress_bytes(&stream).unwrap(), data);
}

#[test]
fn test_every_method_every_grouping() {
    let data = f32_bytes(&weights(16 * 1024, 1));
    for method in Method::ALL {
        for k in [1u8, 2, 4] {
            let zn = codec(CodecConfig::default().with_method(method).with_byte_grouping(k));
            let stream = zn.compress_bytes(&data).unwrap();
            let info = inspect(&stream).unwrap();
            assert_eq!(info.header.method, method);
            assert_eq!(info.table.is_some(), k > 1);
            assert_eq!(zn.decompress_bytes(&stream).unwrap(), data, "{} k={}", method, k);
        }
    }
}

#[test]
fn test_bit_reorder_roundtrip_f32_and_bf16() {
    let values = weights(8 * 1024, 2);
    let f32_data = f32_bytes(&values);
    let zn = codec(CodecConfig::best().with_threads(1));
    let stream = zn.compress_bytes(&f32_data).unwrap();
    assert_eq!(inspect(&stream).unwrap().header.bit_order, BitOrder::Float32);
    assert_eq!(zn.decompress_bytes(&stream).unwrap(), f32_data);

    let bf16_data: Vec<u8> = values
        .iter()
        .flat_map(|v| bf16::from_f32(*v).to_le_bytes())
        .collect();
    let tensor = Tensor::new(DType::BFloat16, vec![64, 128], bf16_data).unwrap();
    let zn = codec(CodecConfig::tensor(DType::BFloat16).with_bit_order(BitOrder::BFloat16));
    let stream = zn.compress_tensor(&tensor).unwrap();
    assert_eq!(inspect(&stream).unwrap().header.layout, Layout::ByteGroup(2));
    assert_eq!(zn.decompress(&stream).unwrap(), Payload::Tensor(tensor));
}

#[test]
fn test_empty_input() {
    for k in [1u8, 2, 4] {
        let zn = codec(CodecConfig::default().with_byte_grouping(k));
        let stream = zn.compress_bytes(&[]).unwrap();
        assert!(zn.decompress_bytes(&stream).unwrap().is_empty());
    }
}

#[test]
fn test_tensor_shape_block() {
    let tensor = Tensor::from_f32(vec![2, 3, 4], &weights(24, 3)).unwrap();
    let zn = codec(CodecConfig::tensor(DType::Float32));
    let stream = zn.compress(&Payload::Tensor(tensor.clone())).unwrap();
    let info = inspect(&stream).unwrap();
    assert_eq!(info.header.dtype, Some(DType::Float32));
    assert_eq!(info.shape, Some(vec![2, 3, 4]));
    assert_eq!(&stream[HEADER_SIZE..HEADER_SIZE + 4], &3u32.to_le_bytes());
    assert_eq!(zn.decompress(&stream).unwrap(), Payload::Tensor(tensor));
}

#[test]
fn test_parallel_matches_sequential() {
    let data = f32_bytes(&weights(64 * 1024, 4));
    let config = CodecConfig::default().with_byte_grouping(4);
    let seq = ZipNn::new(config.clone().with_threads(1)).unwrap();
    let par = ZipNn::new(config.with_threads(4)).unwrap();
    let stream = par.compress_bytes(&data).unwrap();
    assert_eq!(seq.decompress_bytes(&stream).unwrap(), data);
    assert_eq!(par.decompress_bytes(&seq.compress_bytes(&data).unwrap()).unwrap(), data);
}

#[test]
fn test_shared_instance_across_threads() {
    let zn = ZipNn::new(CodecConfig::best().with_threads(4)).unwrap();
    let inputs: Vec<Vec<u8>> = (0..6usize)
        .map(|i| f32_bytes(&weights(8 * 1024 + i * 256, 40 + i as u64)))
        .collect();
    let shared: Vec<Vec<u8>> = inputs.iter().map(|d| zn.compress_bytes(d).unwrap()).collect();

    std::thread::scope(|scope| {
        for (i, data) in inputs.iter().enumerate() {
            let zn = &zn;
            let shared = &shared;
            let inputs = &inputs;
            scope.spawn(move || {
                for _ in 0..4 {
                    let stream = zn.compress_bytes(data).unwrap();
                    assert_eq!(stream, shared[i]);
                    assert_eq!(zn.decompress_bytes(&stream).unwrap(), *data);
                    let other = (i + 1) % inputs.len();
                    assert_eq!(zn.decompress_bytes(&shared[other]).unwrap(), inputs[other]);
                }
            });
        }
    });
}

#[test]
fn test_decompress_follows_stream_method() {
    let data = f32_bytes(&weights(4096, 5));
    let lz4 = codec(CodecConfig::default().with_method(Method::Lz4));
    let zstd = codec(CodecConfig::default());
    let stream = lz4.compress_bytes(&data).unwrap();
    assert_eq!(zstd.decompress_bytes(&stream).unwrap(), data);
}

// ── per-plane store decision ──────────────────────────────────────────────

#[test]
fn test_plane_flags_follow_threshold() {
    // Random bytes are incompressible; zeros are not.
    let mut data = Vec::with_capacity(64 * 1024);
    for chunk in pseudo_random_bytes(32 * 1024, 6).chunks_exact(2) {
        data.extend_from_slice(&[chunk[0], 0, chunk[1], 0]);
    }
    let zn = codec(CodecConfig::default().with_byte_grouping(2));
    let stream = zn.compress_bytes(&data).unwrap();
    let table = inspect(&stream).unwrap().table.unwrap();
    assert!(!table.entries[0].compressed);
    assert!(table.entries[1].compressed);
    assert_eq!(zn.decompress_bytes(&stream).unwrap(), data);
}

// ── dtype32 engine ────────────────────────────────────────────────────────

#[test]
fn test_lossless_byte_modes() {
    let data = f32_bytes(&weights(8 * 1024, 7));
    for mode in [ByteMode::Bytes4, ByteMode::Halves, ByteMode::ExponentMantissa, ByteMode::Whole] {
        for order in [BitOrder::None, BitOrder::Float32] {
            let zn = codec(CodecConfig::default().with_byte_mode(mode).with_bit_order(order));
            let stream = zn.compress_bytes(&data).unwrap();
            let info = inspect(&stream).unwrap();
            assert_eq!(info.header.layout, Layout::Dtype32(mode));
            assert_eq!(info.table.unwrap().entries.len(), mode.plane_count());
            assert_eq!(zn.decompress_bytes(&stream).unwrap(), data, "{} / {}", mode, order);
        }
    }
}

#[test]
fn test_truncate_low16_gives_bf16_precision() {
    let values = weights(4096, 8);
    let data = f32_bytes(&values);
    let zn = codec(CodecConfig::default().with_byte_mode(ByteMode::TruncateLow16));
    let stream = zn.compress_bytes(&data).unwrap();
    assert_eq!(stream[7], 0x8B);
    let back = zn.decompress_bytes(&stream).unwrap();
    assert_ne!(back, data);
    for (orig, got) in values.iter().zip(back.chunks_exact(4)) {
        let expected = orig.to_bits() & 0xFFFF_0000;
        assert_eq!(u32::from_le_bytes([got[0], got[1], got[2], got[3]]), expected);
    }
}

#[test]
fn test_truncate_high16_stream_is_exact_on_zero_high_halves() {
    let mut data = pseudo_random_bytes(16 * 1024, 14);
    for element in data.chunks_exact_mut(4) {
        element[2] = 0;
        element[3] = 0;
    }
    let zn = codec(CodecConfig::from_json(r#"{"byte_mode": 9}"#).unwrap());
    let stream = zn.compress_bytes(&data).unwrap();
    let info = inspect(&stream).unwrap();
    assert_eq!(stream[7], 0x89);
    assert_eq!(info.header.layout, Layout::Dtype32(ByteMode::TruncateHigh16));
    assert_eq!(info.table.unwrap().entries.len(), 1);
    assert_eq!(zn.decompress_bytes(&stream).unwrap(), data);
}

#[test]
fn test_byte_mode_rejects_16_bit_tensor() {
    let tensor = Tensor::new(DType::BFloat16, vec![4], vec![0u8; 8]).unwrap();
    let zn = codec(CodecConfig::default().with_byte_mode(ByteMode::Bytes4));
    assert!(zn.compress_tensor(&tensor).unwrap_err().is_config());
}

// ── lossy ─────────────────────────────────────────────────────────────────

#[test]
fn test_integer_lossy_in_range() {
    let values = weights(4096, 9);
    let tensor = Tensor::from_f32(vec![4096], &values).unwrap();
    let zn = codec(CodecConfig::tensor(DType::Float32).with_integer_lossy(20));
    let stream = zn.compress_tensor(&tensor).unwrap();
    let header = inspect(&stream).unwrap().header;
    assert_eq!(header.lossy_type, LossyType::Integer);
    assert_eq!(header.lossy_factor, 20);
    assert!(header.is_int);

    let Payload::Tensor(back) = zn.decompress(&stream).unwrap() else {
        panic!("expected a tensor payload");
    };
    let tolerance = 2f32.powi(-20);
    for (a, b) in values.iter().zip(back.to_f32()) {
        assert!((a - b).abs() <= tolerance, "{} vs {}", a, b);
    }
}

#[test]
fn test_one_out_of_range_element_keeps_tensor_unscaled() {
    let mut values = weights(1024, 10);
    values[500] = 16.0; // |16| * 2^27 = 2^31 overflows i32
    let tensor = Tensor::from_f32(vec![1024], &values).unwrap();
    let zn = codec(CodecConfig::tensor(DType::Float32).with_integer_lossy(27));
    let stream = zn.compress_tensor(&tensor).unwrap();
    assert!(!inspect(&stream).unwrap().header.is_int);
    assert_eq!(zn.decompress(&stream).unwrap(), Payload::Tensor(tensor));
}

#[test]
fn test_per_call_lossy_override() {
    let tensor = Tensor::from_f32(vec![3], &[0.5, -1.25, 3.0]).unwrap();
    let zn = codec(CodecConfig::tensor(DType::Float32));
    let payload = Payload::Tensor(tensor.clone());

    let stream = zn.compress_with(&payload, LossyOverride::integer(8)).unwrap();
    assert!(inspect(&stream).unwrap().header.is_int);
    // Exactly representable at factor 8.
    assert_eq!(zn.decompress(&stream).unwrap(), payload);

    let bytes = Payload::Bytes(tensor.data);
    let err = zn.compress_with(&bytes, LossyOverride::integer(8)).unwrap_err();
    assert!(err.is_config());

    let lossy = codec(CodecConfig::tensor(DType::Float32).with_integer_lossy(8));
    let stream = lossy.compress_with(&payload, LossyOverride::lossless()).unwrap();
    assert_eq!(inspect(&stream).unwrap().header.lossy_type, LossyType::None);
}

#[test]
fn test_lossy_bf16_tensor() {
    let data: Vec<u8> = [0.5f32, -0.25, 0.125, 1.0]
        .iter()
        .flat_map(|v| bf16::from_f32(*v).to_le_bytes())
        .collect();
    let tensor = Tensor::new(DType::BFloat16, vec![2, 2], data).unwrap();
    let zn = codec(CodecConfig::tensor(DType::BFloat16).with_integer_lossy(10));
    let stream = zn.compress_tensor(&tensor).unwrap();
    assert!(inspect(&stream).unwrap().header.is_int);
    assert_eq!(zn.decompress(&stream).unwrap(), Payload::Tensor(tensor));
}

#[test]
fn test_small_bf16_tensor_scales_at_wide_factors() {
    let values = [1e-5f32, -2e-5, 0.0, 3e-6];
    let data: Vec<u8> = values.iter().flat_map(|v| bf16::from_f32(*v).to_le_bytes()).collect();
    let tensor = Tensor::new(DType::BFloat16, vec![4], data).unwrap();
    let payload = Payload::Tensor(tensor.clone());

    let zn = codec(CodecConfig::tensor(DType::BFloat16));
    let stream = zn.compress_with(&payload, LossyOverride::integer(20)).unwrap();
    let header = inspect(&stream).unwrap().header;
    assert_eq!(header.lossy_factor, 20);
    assert!(header.is_int);
    let Payload::Tensor(back) = zn.decompress(&stream).unwrap() else {
        panic!("expected a tensor payload");
    };
    let tolerance = 2f32.powi(-19);
    for (a, got) in values.iter().zip(back.data.chunks_exact(2)) {
        let a = bf16::from_f32(*a).to_f32();
        let b = bf16::from_le_bytes([got[0], got[1]]).to_f32();
        assert!((a - b).abs() <= tolerance, "{} vs {}", a, b);
    }

    // The default factor 27 on a codec configured for float32.
    let wide = codec(CodecConfig::tensor(DType::Float32).with_integer_lossy(27));
    let stream = wide.compress_tensor(&tensor).unwrap();
    assert!(inspect(&stream).unwrap().header.is_int);
    assert_eq!(wide.decompress(&stream).unwrap(), payload);
}

// ── errors ────────────────────────────────────────────────────────────────

#[test]
fn test_header_corruption_rejected() {
    let zn = codec(CodecConfig::default());
    let stream = zn.compress_bytes(&f32_bytes(&weights(256, 11))).unwrap();
    for pos in 0..2 {
        let mut bad = stream.clone();
        bad[pos] ^= 0x20;
        assert!(zn.decompress(&bad).unwrap_err().is_format(), "byte {}", pos);
    }
    assert!(zn.decompress(&stream[..10]).unwrap_err().is_format());
}

#[test]
fn test_dtype32_stream_with_bf16_bit_order_rejected() {
    let zn = codec(CodecConfig::default().with_byte_mode(ByteMode::Halves).with_bit_order(BitOrder::Float32));
    let mut stream = zn.compress_bytes(&f32_bytes(&weights(256, 15))).unwrap();
    assert_eq!(stream[8], 32);
    stream[8] = 16;
    assert!(zn.decompress(&stream).unwrap_err().is_format());
}

#[test]
fn test_truncated_plane_table_rejected() {
    let zn = codec(CodecConfig::default().with_byte_grouping(4));
    let stream = zn.compress_bytes(&f32_bytes(&weights(256, 12))).unwrap();
    assert!(zn.decompress(&stream[..HEADER_SIZE + 20]).unwrap_err().is_format());
    assert!(zn.decompress(&stream[..stream.len() - 1]).unwrap_err().is_format());
}

#[test]
fn test_not_supported_paths() {
    let zn = codec(CodecConfig::default());
    let err = zn.compress(&Payload::File("weights.bin".into())).unwrap_err();
    assert!(matches!(err, ZipNnError::NotSupported(_)));

    let file = codec(CodecConfig {
        input_format: InputFormat::File,
        ..CodecConfig::default()
    });
    assert!(matches!(file.compress_bytes(&[0; 4]), Err(ZipNnError::NotSupported(_))));

    for (delta, streaming) in [(true, false), (false, true)] {
        let zn = codec(CodecConfig {
            delta,
            streaming,
            ..CodecConfig::default()
        });
        assert!(matches!(zn.compress_bytes(&[0; 4]), Err(ZipNnError::NotSupported(_))));
    }

    let mut stream = zn.compress_bytes(&[0; 4]).unwrap();
    stream[13] = 1;
    assert!(matches!(zn.decompress(&stream), Err(ZipNnError::NotSupported(_))));
}

#[test]
fn test_configuration_errors_at_construction() {
    let bad = [
        CodecConfig::default().with_integer_lossy(10),
        CodecConfig::default().with_level(50),
        CodecConfig::tensor(DType::Int8).with_integer_lossy(2),
        CodecConfig {
            lossy_type: LossyType::Unsigned,
            ..CodecConfig::tensor(DType::Float32)
        },
    ];
    for config in bad {
        assert!(ZipNn::new(config.clone()).unwrap_err().is_config(), "{:?}", config);
    }
}

#[test]
fn test_misaligned_input_rejected_before_work() {
    let zn = codec(CodecConfig::best().with_threads(1));
    assert!(zn.compress_bytes(&[1, 2, 3, 4, 5]).unwrap_err().is_config());
    let zn = codec(CodecConfig::default().with_byte_mode(ByteMode::Halves));
    assert!(zn.compress_bytes(&[1, 2, 3]).unwrap_err().is_config());
}

#[test]
fn test_float_weights_compress_better_than_plain() {
    let data = f32_bytes(&weights(64 * 1024, 13));
    let plain = codec(CodecConfig::default().with_byte_grouping(1));
    let grouped = codec(CodecConfig::default().with_byte_grouping(4));
    let plain_len = plain.compress_bytes(&data).unwrap().len();
    let grouped_len = grouped.compress_bytes(&data).unwrap().len();
    assert!(grouped_len < plain_len, "{} >= {}", grouped_len, plain_len);
    assert!(grouped_len < data.len());
}
