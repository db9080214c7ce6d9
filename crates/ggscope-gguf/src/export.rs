//! JSON export of the metadata table.

use std::io::Write;

use serde_json::{Map, Number, Value};

use ggscope_core::Result;

use crate::types::{MetadataEntry, MetadataValue};

/// Convert metadata entries to a JSON object keyed by metadata key.
///
/// Keys keep file order. Non-finite floats become `null`. If a key repeats,
/// the first entry wins, matching [`GgufHeader::get_metadata`].
///
/// [`GgufHeader::get_metadata`]: crate::GgufHeader::get_metadata
pub fn metadata_to_json(entries: &[MetadataEntry]) -> Value {
    let mut map = Map::with_capacity(entries.len());
    for entry in entries {
        if !map.contains_key(&entry.key) {
            map.insert(entry.key.clone(), value_to_json(&entry.value));
        }
    }
    Value::Object(map)
}

/// Pretty-print metadata entries as JSON.
pub fn write_metadata_json<W: Write>(entries: &[MetadataEntry], mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, &metadata_to_json(entries))?;
    writeln!(writer)?;
    Ok(())
}

fn value_to_json(value: &MetadataValue) -> Value {
    match value {
        MetadataValue::Uint8(v) => Value::from(*v),
        MetadataValue::Int8(v) => Value::from(*v),
        MetadataValue::Uint16(v) => Value::from(*v),
        MetadataValue::Int16(v) => Value::from(*v),
        MetadataValue::Uint32(v) => Value::from(*v),
        MetadataValue::Int32(v) => Value::from(*v),
        MetadataValue::Uint64(v) => Value::from(*v),
        MetadataValue::Int64(v) => Value::from(*v),
        MetadataValue::Float32(v) => float_to_json(f64::from(*v)),
        MetadataValue::Float64(v) => float_to_json(*v),
        MetadataValue::Bool(v) => Value::Bool(*v),
        MetadataValue::String(s) => Value::String(s.clone()),
        MetadataValue::Array(arr) => Value::Array(arr.values().iter().map(value_to_json).collect()),
    }
}

fn float_to_json(v: f64) -> Value {
    Number::from_f64(v).map_or(Value::Null, Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetadataArray;
    use serde_json::json;

    #[test]
    fn test_scalars_and_strings() {
        let entries = vec![
            MetadataEntry::new("general.architecture", MetadataValue::String("llama".into())),
            MetadataEntry::new("general.file_type", MetadataValue::Uint32(42)),
            MetadataEntry::new("llama.rope.freq_base", MetadataValue::Float32(0.5)),
            MetadataEntry::new("offset", MetadataValue::Int64(-3)),
            MetadataEntry::new("flag", MetadataValue::Bool(true)),
        ];
        assert_eq!(
            metadata_to_json(&entries),
            json!({
                "general.architecture": "llama",
                "general.file_type": 42,
                "llama.rope.freq_base": 0.5,
                "offset": -3,
                "flag": true,
            })
        );
    }

    #[test]
    fn test_key_order_follows_file_order() {
        let entries = vec![
            MetadataEntry::new("z", MetadataValue::Uint8(1)),
            MetadataEntry::new("a", MetadataValue::Uint8(2)),
            MetadataEntry::new("m", MetadataValue::Uint8(3)),
        ];
        let json = metadata_to_json(&entries);
        let keys: Vec<&str> = json
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn test_nested_arrays() {
        let inner = vec![
            MetadataArray::from_i32s([1, 2, 3]),
            MetadataArray::from_i32s([4, 5, 6]),
        ];
        let entries = vec![MetadataEntry::new(
            "grid",
            MetadataValue::Array(MetadataArray::from_arrays(inner).unwrap()),
        )];
        assert_eq!(
            metadata_to_json(&entries),
            json!({ "grid": [[1, 2, 3], [4, 5, 6]] })
        );
    }

    #[test]
    fn test_non_finite_floats_are_null() {
        let entries = vec![
            MetadataEntry::new("nan", MetadataValue::Float32(f32::NAN)),
            MetadataEntry::new("inf", MetadataValue::Float64(f64::INFINITY)),
        ];
        assert_eq!(
            metadata_to_json(&entries),
            json!({ "nan": null, "inf": null })
        );
    }

    #[test]
    fn test_write_pretty() {
        let entries = vec![MetadataEntry::new("k", MetadataValue::Uint16(7))];
        let mut out = Vec::new();
        write_metadata_json(&entries, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "{\n  \"k\": 7\n}\n");
    }
}
