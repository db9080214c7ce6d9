//! Metadata value decoding.
//!
//! Arrays are decoded recursively with an explicit depth counter so a file
//! declaring thousands of nested arrays fails with
//! [`GgufError::NestingTooDeep`] instead of exhausting the stack.

use std::io::Read;

use ggscope_core::{DecodeConfig, GgufError, Result};

use crate::codec;
use crate::cursor::ByteCursor;
use crate::types::{MetadataArray, MetadataEntry, MetadataValue, MetadataValueType};

/// Caps the up-front reservation for a declared array length.
const ARRAY_PREALLOC_LIMIT: u64 = 4096;

/// Read a value of the given type.
pub fn read_value<R: Read>(
    cursor: &mut ByteCursor<R>,
    value_type: MetadataValueType,
    config: &DecodeConfig,
) -> Result<MetadataValue> {
    read_value_at_depth(cursor, value_type, config, 0)
}

/// Read one key, type tag and value.
pub fn read_entry<R: Read>(
    cursor: &mut ByteCursor<R>,
    config: &DecodeConfig,
) -> Result<MetadataEntry> {
    let key = codec::read_string(cursor, config.max_string_length, "metadata key")?;
    let value_type = MetadataValueType::try_from(codec::read_u32(cursor)?)?;
    let value = read_value(cursor, value_type, config)?;
    Ok(MetadataEntry { key, value })
}

/// `depth` is the number of arrays enclosing the value being read.
fn read_value_at_depth<R: Read>(
    cursor: &mut ByteCursor<R>,
    value_type: MetadataValueType,
    config: &DecodeConfig,
    depth: usize,
) -> Result<MetadataValue> {
    let value = match value_type {
        MetadataValueType::Uint8 => MetadataValue::Uint8(codec::read_u8(cursor)?),
        MetadataValueType::Int8 => MetadataValue::Int8(codec::read_i8(cursor)?),
        MetadataValueType::Uint16 => MetadataValue::Uint16(codec::read_u16(cursor)?),
        MetadataValueType::Int16 => MetadataValue::Int16(codec::read_i16(cursor)?),
        MetadataValueType::Uint32 => MetadataValue::Uint32(codec::read_u32(cursor)?),
        MetadataValueType::Int32 => MetadataValue::Int32(codec::read_i32(cursor)?),
        MetadataValueType::Float32 => MetadataValue::Float32(codec::read_f32(cursor)?),
        MetadataValueType::Bool => MetadataValue::Bool(codec::read_bool(cursor)?),
        MetadataValueType::String => MetadataValue::String(codec::read_string(
            cursor,
            config.max_string_length,
            "metadata string",
        )?),
        MetadataValueType::Uint64 => MetadataValue::Uint64(codec::read_u64(cursor)?),
        MetadataValueType::Int64 => MetadataValue::Int64(codec::read_i64(cursor)?),
        MetadataValueType::Float64 => MetadataValue::Float64(codec::read_f64(cursor)?),
        MetadataValueType::Array => {
            if depth >= config.max_array_depth {
                return Err(GgufError::NestingTooDeep {
                    max: config.max_array_depth,
                });
            }
            let element_type = MetadataValueType::try_from(codec::read_u32(cursor)?)?;
            let len = codec::read_u64(cursor)?;
            if len > config.max_array_length {
                return Err(GgufError::ArrayTooLarge {
                    len,
                    max: config.max_array_length,
                });
            }

            let mut array =
                MetadataArray::with_capacity(element_type, len.min(ARRAY_PREALLOC_LIMIT) as usize);
            for _ in 0..len {
                array.push_decoded(read_value_at_depth(cursor, element_type, config, depth + 1)?);
            }
            MetadataValue::Array(array)
        }
    };
    Ok(value)
}
