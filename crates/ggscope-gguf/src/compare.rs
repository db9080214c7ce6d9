//! Structural comparison of two decoded indexes.

use std::fmt;

use serde::Serialize;

use crate::reader::GgufIndex;
use crate::types::GgmlType;

/// A metadata key present on both sides with different values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataChange {
    /// Metadata key.
    pub key: String,
    /// Rendered value on the left side.
    pub left: String,
    /// Rendered value on the right side.
    pub right: String,
}

/// A tensor present on both sides whose descriptor differs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorChange {
    /// Tensor name.
    pub name: String,
    /// Dimensions on each side, if they differ.
    pub dimensions: Option<(Vec<u64>, Vec<u64>)>,
    /// Quantization type on each side, if it differs.
    pub dtype: Option<(GgmlType, GgmlType)>,
    /// Offset relative to the tensor-data region on each side, if it differs.
    pub relative_offset: Option<(u64, u64)>,
}

/// Differences between two GGUF indexes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Comparison {
    /// Metadata keys only in the left file.
    pub metadata_only_left: Vec<String>,
    /// Metadata keys only in the right file.
    pub metadata_only_right: Vec<String>,
    /// Metadata keys whose values differ.
    pub metadata_changed: Vec<MetadataChange>,
    /// Tensors only in the left file.
    pub tensors_only_left: Vec<String>,
    /// Tensors only in the right file.
    pub tensors_only_right: Vec<String>,
    /// Tensors whose descriptors differ.
    pub tensors_changed: Vec<TensorChange>,
}

impl Comparison {
    /// True when no difference was found.
    pub fn is_identical(&self) -> bool {
        self.metadata_only_left.is_empty()
            && self.metadata_only_right.is_empty()
            && self.metadata_changed.is_empty()
            && self.tensors_only_left.is_empty()
            && self.tensors_only_right.is_empty()
            && self.tensors_changed.is_empty()
    }
}

/// Compare the metadata tables and descriptor tables of two files.
///
/// Results are listed in left-file order, then right-file order for keys or
/// tensors only present on the right.
pub fn compare(left: &GgufIndex, right: &GgufIndex) -> Comparison {
    let mut cmp = Comparison::default();

    for entry in &left.header.metadata {
        match right.header.get_metadata(&entry.key) {
            None => cmp.metadata_only_left.push(entry.key.clone()),
            Some(other) if !other.same_as(&entry.value) => {
                cmp.metadata_changed.push(MetadataChange {
                    key: entry.key.clone(),
                    left: entry.value.to_string(),
                    right: other.to_string(),
                })
            }
            Some(_) => {}
        }
    }
    cmp.metadata_only_right = right
        .header
        .metadata
        .iter()
        .filter(|entry| left.header.get_metadata(&entry.key).is_none())
        .map(|entry| entry.key.clone())
        .collect();

    for info in &left.tensor_infos {
        let Some(other) = right.get_tensor_info(&info.name) else {
            cmp.tensors_only_left.push(info.name.clone());
            continue;
        };
        let left_offset = left.relative_offset(info);
        let right_offset = right.relative_offset(other);
        let change = TensorChange {
            name: info.name.clone(),
            dimensions: (info.dimensions != other.dimensions)
                .then(|| (info.dimensions.clone(), other.dimensions.clone())),
            dtype: (info.dtype != other.dtype).then_some((info.dtype, other.dtype)),
            relative_offset: (left_offset != right_offset).then_some((left_offset, right_offset)),
        };
        if change.dimensions.is_some() || change.dtype.is_some() || change.relative_offset.is_some()
        {
            cmp.tensors_changed.push(change);
        }
    }
    cmp.tensors_only_right = right
        .tensor_infos
        .iter()
        .filter(|info| left.get_tensor_info(&info.name).is_none())
        .map(|info| info.name.clone())
        .collect();

    cmp
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_identical() {
            return writeln!(f, "files are identical");
        }
        for key in &self.metadata_only_left {
            writeln!(f, "- metadata {}", key)?;
        }
        for key in &self.metadata_only_right {
            writeln!(f, "+ metadata {}", key)?;
        }
        for change in &self.metadata_changed {
            writeln!(f, "~ metadata {}: {} -> {}", change.key, change.left, change.right)?;
        }
        for name in &self.tensors_only_left {
            writeln!(f, "- tensor {}", name)?;
        }
        for name in &self.tensors_only_right {
            writeln!(f, "+ tensor {}", name)?;
        }
        for change in &self.tensors_changed {
            write!(f, "~ tensor {}:", change.name)?;
            if let Some((a, b)) = &change.dimensions {
                write!(f, " dims {:?} -> {:?}", a, b)?;
            }
            if let Some((a, b)) = &change.dtype {
                write!(f, " type {} -> {}", a, b)?;
            }
            if let Some((a, b)) = &change.relative_offset {
                write!(f, " offset {} -> {}", a, b)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::GgufDecoder;
    use crate::types::MetadataArray;
    use crate::writer::GgufBuilder;

    fn index(builder: &GgufBuilder) -> GgufIndex {
        let bytes = builder.build_to_bytes().unwrap();
        GgufDecoder::new(&bytes[..]).decode_index().unwrap()
    }

    fn base() -> GgufBuilder {
        let mut builder = GgufBuilder::with_model("llama", "base");
        builder
            .add_u32("llama.context_length", 2048)
            .add_f32_tensor("a", vec![2], vec![1.0, 2.0])
            .add_raw_tensor("b", vec![32], GgmlType::Q8_0, vec![0; 34]);
        builder
    }

    #[test]
    fn test_identical() {
        let cmp = compare(&index(&base()), &index(&base()));
        assert!(cmp.is_identical());
        assert_eq!(cmp.to_string(), "files are identical\n");
    }

    #[test]
    fn test_nan_metadata_is_identical() {
        let mut builder = base();
        builder
            .add_f32("llama.rope.scale", f32::NAN)
            .add_array("scores", MetadataArray::from_f32s([f32::NAN, 1.0]));

        let cmp = compare(&index(&builder), &index(&builder));
        assert!(cmp.metadata_changed.is_empty());
        assert!(cmp.is_identical());
    }

    #[test]
    fn test_metadata_differences() {
        let mut right = base();
        right
            .add_u32("llama.context_length", 4096)
            .add_string("extra", "x");

        let cmp = compare(&index(&base()), &index(&right));
        assert!(!cmp.is_identical());
        assert!(cmp.metadata_only_left.is_empty());
        assert_eq!(cmp.metadata_only_right, ["extra"]);
        assert_eq!(
            cmp.metadata_changed,
            [MetadataChange {
                key: "llama.context_length".into(),
                left: "2048".into(),
                right: "4096".into(),
            }]
        );
    }

    #[test]
    fn test_tensor_differences() {
        let mut right = GgufBuilder::with_model("llama", "base");
        right
            .add_u32("llama.context_length", 2048)
            .add_f32_tensor("a", vec![1, 2], vec![1.0, 2.0])
            .add_f32_tensor("c", vec![1], vec![0.0]);

        let cmp = compare(&index(&base()), &index(&right));
        assert_eq!(cmp.tensors_only_left, ["b"]);
        assert_eq!(cmp.tensors_only_right, ["c"]);
        assert_eq!(cmp.tensors_changed.len(), 1);
        let change = &cmp.tensors_changed[0];
        assert_eq!(change.name, "a");
        assert_eq!(change.dimensions, Some((vec![2], vec![1, 2])));
        assert_eq!(change.dtype, None);
        assert!(cmp.to_string().contains("~ tensor a: dims [2] -> [1, 2]"));
    }

    #[test]
    fn test_dtype_and_offset_change() {
        let mut left = GgufBuilder::new();
        left.add_f32_tensor("x", vec![16], vec![0.0; 16])
            .add_f16_tensor("y", vec![4], vec![half::f16::ZERO; 4]);
        let mut right = GgufBuilder::new();
        right
            .add_f16_tensor("x", vec![16], vec![half::f16::ZERO; 16])
            .add_f16_tensor("y", vec![4], vec![half::f16::ZERO; 4]);

        let cmp = compare(&index(&left), &index(&right));
        assert_eq!(cmp.tensors_changed.len(), 2);
        let x = &cmp.tensors_changed[0];
        assert_eq!(x.dtype, Some((GgmlType::F32, GgmlType::F16)));
        assert_eq!(x.relative_offset, None);
        let y = &cmp.tensors_changed[1];
        assert_eq!(y.dtype, None);
        assert_eq!(y.relative_offset, Some((64, 32)));
    }
}
