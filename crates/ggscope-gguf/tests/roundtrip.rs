use std::io::Write;

use ggscope_core::prelude::*;
use ggscope_gguf::{
    write_file, GgmlType, GgufBuilder, GgufDecoder, GgufFile, MetadataArray, MetadataValue,
    MetadataValueType, TensorData,
};
use half::f16;

fn sample_builder() -> GgufBuilder {
    let mut builder = GgufBuilder::with_model("llama", "tiny");
    builder
        .add_u32("llama.context_length", 2048)
        .add_u64("llama.vocab_size", 32_000)
        .add_f32("llama.rope.freq_base", 10_000.0)
        .add_bool("tokenizer.ggml.add_bos_token", true)
        .add_array(
            "tokenizer.ggml.tokens",
            MetadataArray::from_strings(["<unk>", "<s>", "</s>"]),
        )
        .add_array(
            "tokenizer.ggml.scores",
            MetadataArray::from_f32s([0.0, -1.5, -2.25]),
        )
        .add_f32_tensor("token_embd.weight", vec![4, 3], (0..12).map(|i| i as f32).collect())
        .add_f16_tensor(
            "output_norm.weight",
            vec![4],
            [1.0f32, -0.5, 0.25, 65504.0].map(f16::from_f32).to_vec(),
        )
        .add_raw_tensor("blk.0.attn_q.weight", vec![4, 4], GgmlType::Q4_0, (0..9).collect())
        .add_raw_tensor("blk.0.ffn_up.weight", vec![32, 2], GgmlType::Q8_0, vec![7; 68]);
    builder
}

#[test]
fn test_decode_builder_output() {
    let bytes = sample_builder().build_to_bytes().unwrap();
    let file = GgufFile::from_bytes(&bytes).unwrap();
    let header = file.header();

    assert_eq!(header.metadata.len() as u64, header.metadata_count);
    assert_eq!(file.tensor_infos().len() as u64, header.tensor_count);
    assert_eq!(header.architecture(), Some("llama"));
    assert_eq!(header.name(), Some("tiny"));
    assert_eq!(
        header.get_metadata("llama.vocab_size").and_then(|v| v.as_u64()),
        Some(32_000)
    );

    let (info, data) = file.get_tensor("token_embd.weight").unwrap();
    assert_eq!(info.dimensions, vec![4, 3]);
    assert_eq!(data.as_f32().unwrap()[11], 11.0);

    let (_, data) = file.get_tensor("blk.0.attn_q.weight").unwrap();
    assert_eq!(data.as_bytes().unwrap(), &(0..9).collect::<Vec<u8>>()[..]);

    for info in file.tensor_infos() {
        assert_eq!(info.offset % 32, 0, "{} is not aligned", info.name);
    }
}

#[test]
fn test_reencode_is_byte_identical() {
    let bytes = sample_builder().build_to_bytes().unwrap();
    let file = GgufFile::from_bytes(&bytes).unwrap();

    let mut out = Vec::new();
    let written = write_file(&file, &mut out).unwrap();
    assert_eq!(written, bytes.len() as u64);
    assert_eq!(out, bytes);
}

#[test]
fn test_single_file_type_entry() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"GGUF");
    bytes.extend_from_slice(&3u32.to_le_bytes());
    bytes.extend_from_slice(&0u64.to_le_bytes());
    bytes.extend_from_slice(&1u64.to_le_bytes());
    bytes.extend_from_slice(&17u64.to_le_bytes());
    bytes.extend_from_slice(b"general.file_type");
    bytes.extend_from_slice(&4u32.to_le_bytes());
    bytes.extend_from_slice(&42u32.to_le_bytes());

    let file = GgufFile::from_bytes(&bytes).unwrap();
    assert_eq!(file.header().metadata.len(), 1);
    let entry = &file.header().metadata[0];
    assert_eq!(entry.key, "general.file_type");
    assert_eq!(entry.value_type(), MetadataValueType::Uint32);
    assert_eq!(entry.value, MetadataValue::Uint32(42));

    assert_eq!(file.to_bytes().unwrap(), bytes);
}

#[test]
fn test_nonzero_bool_byte_is_canonicalized() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"GGUF");
    bytes.extend_from_slice(&3u32.to_le_bytes());
    bytes.extend_from_slice(&0u64.to_le_bytes());
    bytes.extend_from_slice(&1u64.to_le_bytes());
    bytes.extend_from_slice(&4u64.to_le_bytes());
    bytes.extend_from_slice(b"flag");
    bytes.extend_from_slice(&7u32.to_le_bytes());
    bytes.push(2);

    let file = GgufFile::from_bytes(&bytes).unwrap();
    assert_eq!(file.header().get_metadata("flag"), Some(&MetadataValue::Bool(true)));

    let reencoded = file.to_bytes().unwrap();
    assert_eq!(reencoded.len(), bytes.len());
    assert_eq!(reencoded.last(), Some(&1));
    assert_eq!(reencoded[..bytes.len() - 1], bytes[..bytes.len() - 1]);
}

#[test]
fn test_f16_bits_preserved() {
    let bits = [0x3C00u16, 0x8001, 0x7C00, 0x7E55];
    let values: Vec<f16> = bits.iter().copied().map(f16::from_bits).collect();
    let mut builder = GgufBuilder::new();
    builder.add_f16_tensor("h", vec![4], values);

    let bytes = builder.build_to_bytes().unwrap();
    let file = GgufFile::from_bytes(&bytes).unwrap();
    let decoded: Vec<u16> = file.data[0]
        .as_f16()
        .unwrap()
        .iter()
        .map(|v| v.to_bits())
        .collect();
    assert_eq!(decoded, bits);
    assert_eq!(file.to_bytes().unwrap(), bytes);
}

#[test]
fn test_every_truncation_is_reported() {
    let bytes = sample_builder().build_to_bytes().unwrap();
    for len in 0..bytes.len() {
        let err = GgufFile::from_bytes(&bytes[..len]).unwrap_err();
        assert_eq!(
            err.kind(),
            ErrorKind::TruncatedData,
            "prefix of {} bytes: {}",
            len,
            err
        );
    }
}

#[test]
fn test_bad_magic_and_version_are_structural() {
    let mut bytes = sample_builder().build_to_bytes().unwrap();
    bytes[3] = b'X';
    let err = GgufFile::from_bytes(&bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Structural);
    assert!(err.to_string().contains("GGUX"));

    let mut bytes = sample_builder().build_to_bytes().unwrap();
    bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
    let err = GgufFile::from_bytes(&bytes).unwrap_err();
    assert!(matches!(err, GgufError::UnsupportedVersion(2)));
}

#[test]
fn test_alignment_key_of_wrong_type_falls_back() {
    let mut builder = GgufBuilder::new();
    builder
        .add_string("general.alignment", "sixty-four")
        .add_f32_tensor("w", vec![1], vec![3.0]);
    let bytes = builder.build_to_bytes().unwrap();

    let file = GgufFile::from_bytes(&bytes).unwrap();
    assert_eq!(file.index.alignment, 32);
    assert_eq!(file.data[0], TensorData::F32(vec![3.0]));
}

#[test]
fn test_index_only_decode_matches_full_decode() {
    let bytes = sample_builder().build_to_bytes().unwrap();
    let index = GgufDecoder::new(&bytes[..]).decode_index().unwrap();
    let file = GgufFile::from_bytes(&bytes).unwrap();
    assert_eq!(index, file.index);
}

#[test]
fn test_from_file() {
    let bytes = sample_builder().build_to_bytes().unwrap();
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&bytes).unwrap();
    tmp.flush().unwrap();

    let file = GgufFile::from_file(tmp.path()).unwrap();
    assert_eq!(file.tensor_infos().len(), 4);

    let config = DecodeConfig::default().with_max_array_depth(1);
    let file = GgufFile::from_file_with_config(tmp.path(), config).unwrap();
    assert_eq!(file.header().architecture(), Some("llama"));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = GgufFile::from_file(dir.path().join("absent.gguf")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn test_string_limit_from_config() {
    let bytes = sample_builder().build_to_bytes().unwrap();
    let config = DecodeConfig {
        max_string_length: 4,
        ..DecodeConfig::default()
    };
    let err = GgufDecoder::with_config(&bytes[..], config)
        .unwrap()
        .decode()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LimitExceeded);
}
