//! GGUF format types and constants.

use std::fmt;

use ggscope_core::{GgufError, Result};
use serde::Serialize;

/// GGUF magic bytes.
pub const GGUF_MAGIC: [u8; 4] = *b"GGUF";

/// The only GGUF version this crate reads and writes.
pub const GGUF_VERSION: u32 = 3;

/// Default alignment for tensor data.
pub const GGUF_DEFAULT_ALIGNMENT: u64 = ggscope_core::DEFAULT_ALIGNMENT;

/// Elements per super-block for the K-quant and most IQ types.
const QK_K: u64 = 256;

/// GGML tensor data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum GgmlType {
    /// 32-bit float
    F32 = 0,
    /// 16-bit float
    F16 = 1,
    /// 4-bit quantization (type 0)
    Q4_0 = 2,
    /// 4-bit quantization (type 1)
    Q4_1 = 3,
    /// 5-bit quantization (type 0)
    Q5_0 = 6,
    /// 5-bit quantization (type 1)
    Q5_1 = 7,
    /// 8-bit quantization (type 0)
    Q8_0 = 8,
    /// 8-bit quantization (type 1)
    Q8_1 = 9,
    /// K-quant 2-bit
    Q2K = 10,
    /// K-quant 3-bit
    Q3K = 11,
    /// K-quant 4-bit
    Q4K = 12,
    /// K-quant 5-bit
    Q5K = 13,
    /// K-quant 6-bit
    Q6K = 14,
    /// K-quant 8-bit
    Q8K = 15,
    /// IQ2 extra-extra-small
    Iq2Xxs = 16,
    /// IQ2 extra-small
    Iq2Xs = 17,
    /// IQ3 extra-extra-small
    Iq3Xxs = 18,
    /// IQ1 small
    Iq1S = 19,
    /// IQ4 non-linear
    Iq4Nl = 20,
    /// IQ3 small
    Iq3S = 21,
    /// IQ2 small
    Iq2S = 22,
    /// IQ4 extra-small
    Iq4Xs = 23,
    /// 8-bit integer
    I8 = 24,
    /// 16-bit integer
    I16 = 25,
    /// 32-bit integer
    I32 = 26,
    /// 64-bit integer
    I64 = 27,
    /// 64-bit float
    F64 = 28,
    /// IQ1 medium
    Iq1M = 29,
    /// BFloat16
    Bf16 = 30,
    /// Ternary quantization, 1.69 bits
    Tq1_0 = 34,
    /// Ternary quantization, 2 bits
    Tq2_0 = 35,
}

impl GgmlType {
    /// Number of elements per block. Unquantized and integer types use 1.
    pub const fn block_size(self) -> u64 {
        match self {
            Self::F32 | Self::F16 | Self::Bf16 | Self::F64 => 1,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 => 1,
            Self::Q4_0 | Self::Q4_1 | Self::Q5_0 | Self::Q5_1 | Self::Q8_0 | Self::Q8_1 => 32,
            Self::Iq4Nl => 32,
            Self::Q2K | Self::Q3K | Self::Q4K | Self::Q5K | Self::Q6K | Self::Q8K => QK_K,
            Self::Iq1S
            | Self::Iq1M
            | Self::Iq2Xxs
            | Self::Iq2Xs
            | Self::Iq2S
            | Self::Iq3Xxs
            | Self::Iq3S
            | Self::Iq4Xs => QK_K,
            Self::Tq1_0 | Self::Tq2_0 => QK_K,
        }
    }

    /// Size in bytes of one block.
    pub const fn type_size(self) -> u64 {
        match self {
            Self::F32 => 4,
            Self::F16 | Self::Bf16 => 2,
            Self::Q4_0 => 2 + 16,
            Self::Q4_1 => 2 + 2 + 16,
            Self::Q5_0 => 2 + 4 + 16,
            Self::Q5_1 => 2 + 2 + 4 + 16,
            Self::Q8_0 => 2 + 32,
            Self::Q8_1 => 4 + 32,
            Self::Q2K => 2 + 2 + QK_K / 16 + QK_K / 4,
            Self::Q3K => 2 + QK_K / 4 + QK_K / 8 + 12,
            Self::Q4K => 2 + 2 + QK_K / 2 + 12,
            Self::Q5K => 2 + 2 + QK_K / 2 + QK_K / 8 + 12,
            Self::Q6K => 2 + QK_K / 2 + QK_K / 4 + QK_K / 16,
            Self::Q8K => 4 + QK_K + QK_K / 8,
            Self::Iq1S => 50,
            Self::Iq1M => 56,
            Self::Iq2Xxs => 66,
            Self::Iq2Xs => 74,
            Self::Iq2S => 82,
            Self::Iq3Xxs => 98,
            Self::Iq3S => 110,
            Self::Iq4Nl => 18,
            Self::Iq4Xs => 136,
            Self::Tq1_0 => 54,
            Self::Tq2_0 => 66,
            Self::I8 => 1,
            Self::I16 => 2,
            Self::I32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    /// `(block_size, type_size)` pair.
    pub const fn block_layout(self) -> (u64, u64) {
        (self.block_size(), self.type_size())
    }

    /// Canonical GGML name, e.g. `Q4_K`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::F32 => "F32",
            Self::F16 => "F16",
            Self::Q4_0 => "Q4_0",
            Self::Q4_1 => "Q4_1",
            Self::Q5_0 => "Q5_0",
            Self::Q5_1 => "Q5_1",
            Self::Q8_0 => "Q8_0",
            Self::Q8_1 => "Q8_1",
            Self::Q2K => "Q2_K",
            Self::Q3K => "Q3_K",
            Self::Q4K => "Q4_K",
            Self::Q5K => "Q5_K",
            Self::Q6K => "Q6_K",
            Self::Q8K => "Q8_K",
            Self::Iq2Xxs => "IQ2_XXS",
            Self::Iq2Xs => "IQ2_XS",
            Self::Iq3Xxs => "IQ3_XXS",
            Self::Iq1S => "IQ1_S",
            Self::Iq4Nl => "IQ4_NL",
            Self::Iq3S => "IQ3_S",
            Self::Iq2S => "IQ2_S",
            Self::Iq4Xs => "IQ4_XS",
            Self::I8 => "I8",
            Self::I16 => "I16",
            Self::I32 => "I32",
            Self::I64 => "I64",
            Self::F64 => "F64",
            Self::Iq1M => "IQ1_M",
            Self::Bf16 => "BF16",
            Self::Tq1_0 => "TQ1_0",
            Self::Tq2_0 => "TQ2_0",
        }
    }

    /// Whether payloads of this type are decoded to floats rather than kept as bytes.
    pub const fn is_decoded_float(self) -> bool {
        matches!(self, Self::F32 | Self::F16)
    }

    /// Look up a type by its wire code.
    pub const fn from_code(code: u32) -> Option<Self> {
        let dtype = match code {
            0 => Self::F32,
            1 => Self::F16,
            2 => Self::Q4_0,
            3 => Self::Q4_1,
            6 => Self::Q5_0,
            7 => Self::Q5_1,
            8 => Self::Q8_0,
            9 => Self::Q8_1,
            10 => Self::Q2K,
            11 => Self::Q3K,
            12 => Self::Q4K,
            13 => Self::Q5K,
            14 => Self::Q6K,
            15 => Self::Q8K,
            16 => Self::Iq2Xxs,
            17 => Self::Iq2Xs,
            18 => Self::Iq3Xxs,
            19 => Self::Iq1S,
            20 => Self::Iq4Nl,
            21 => Self::Iq3S,
            22 => Self::Iq2S,
            23 => Self::Iq4Xs,
            24 => Self::I8,
            25 => Self::I16,
            26 => Self::I32,
            27 => Self::I64,
            28 => Self::F64,
            29 => Self::Iq1M,
            30 => Self::Bf16,
            34 => Self::Tq1_0,
            35 => Self::Tq2_0,
            _ => return None,
        };
        Some(dtype)
    }
}

impl fmt::Display for GgmlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// GGUF metadata value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum MetadataValueType {
    /// 8-bit unsigned integer
    Uint8 = 0,
    /// 8-bit signed integer
    Int8 = 1,
    /// 16-bit unsigned integer
    Uint16 = 2,
    /// 16-bit signed integer
    Int16 = 3,
    /// 32-bit unsigned integer
    Uint32 = 4,
    /// 32-bit signed integer
    Int32 = 5,
    /// 32-bit float
    Float32 = 6,
    /// Boolean (1 byte)
    Bool = 7,
    /// UTF-8 string with length prefix
    String = 8,
    /// Array of values
    Array = 9,
    /// 64-bit unsigned integer
    Uint64 = 10,
    /// 64-bit signed integer
    Int64 = 11,
    /// 64-bit float
    Float64 = 12,
}

impl MetadataValueType {
    /// Lower-case wire name, e.g. `uint32`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uint8 => "uint8",
            Self::Int8 => "int8",
            Self::Uint16 => "uint16",
            Self::Int16 => "int16",
            Self::Uint32 => "uint32",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Array => "array",
            Self::Uint64 => "uint64",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
        }
    }
}

impl TryFrom<u32> for MetadataValueType {
    type Error = GgufError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::Uint8),
            1 => Ok(Self::Int8),
            2 => Ok(Self::Uint16),
            3 => Ok(Self::Int16),
            4 => Ok(Self::Uint32),
            5 => Ok(Self::Int32),
            6 => Ok(Self::Float32),
            7 => Ok(Self::Bool),
            8 => Ok(Self::String),
            9 => Ok(Self::Array),
            10 => Ok(Self::Uint64),
            11 => Ok(Self::Int64),
            12 => Ok(Self::Float64),
            t => Err(GgufError::InvalidValueType(t)),
        }
    }
}

impl fmt::Display for MetadataValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A metadata value in GGUF format.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    /// 8-bit unsigned integer
    Uint8(u8),
    /// 8-bit signed integer
    Int8(i8),
    /// 16-bit unsigned integer
    Uint16(u16),
    /// 16-bit signed integer
    Int16(i16),
    /// 32-bit unsigned integer
    Uint32(u32),
    /// 32-bit signed integer
    Int32(i32),
    /// 32-bit float
    Float32(f32),
    /// Boolean
    Bool(bool),
    /// UTF-8 string
    String(String),
    /// Array of values (all same type)
    Array(MetadataArray),
    /// 64-bit unsigned integer
    Uint64(u64),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit float
    Float64(f64),
}

impl MetadataValue {
    /// Get the type of this value.
    pub fn value_type(&self) -> MetadataValueType {
        match self {
            Self::Uint8(_) => MetadataValueType::Uint8,
            Self::Int8(_) => MetadataValueType::Int8,
            Self::Uint16(_) => MetadataValueType::Uint16,
            Self::Int16(_) => MetadataValueType::Int16,
            Self::Uint32(_) => MetadataValueType::Uint32,
            Self::Int32(_) => MetadataValueType::Int32,
            Self::Float32(_) => MetadataValueType::Float32,
            Self::Bool(_) => MetadataValueType::Bool,
            Self::String(_) => MetadataValueType::String,
            Self::Array(_) => MetadataValueType::Array,
            Self::Uint64(_) => MetadataValueType::Uint64,
            Self::Int64(_) => MetadataValueType::Int64,
            Self::Float64(_) => MetadataValueType::Float64,
        }
    }

    /// String contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any unsigned integer, widened to u64.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Uint8(v) => Some(u64::from(*v)),
            Self::Uint16(v) => Some(u64::from(*v)),
            Self::Uint32(v) => Some(u64::from(*v)),
            Self::Uint64(v) => Some(*v),
            _ => None,
        }
    }

    /// Array contents, if this is an array.
    pub fn as_array(&self) -> Option<&MetadataArray> {
        match self {
            Self::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Whether two values would encode to the same bytes.
    ///
    /// Unlike `==`, floats are compared by bit pattern, so a NaN matches
    /// itself and `0.0` differs from `-0.0`.
    pub fn same_as(&self, other: &MetadataValue) -> bool {
        match (self, other) {
            (Self::Float32(a), Self::Float32(b)) => a.to_bits() == b.to_bits(),
            (Self::Float64(a), Self::Float64(b)) => a.to_bits() == b.to_bits(),
            (Self::Array(a), Self::Array(b)) => {
                a.element_type == b.element_type
                    && a.values.len() == b.values.len()
                    && a.values.iter().zip(&b.values).all(|(x, y)| x.same_as(y))
            }
            _ => self == other,
        }
    }
}

/// Arrays with more elements than this are abbreviated by `Display`.
const DISPLAY_ARRAY_LIMIT: usize = 8;

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint8(v) => write!(f, "{v}"),
            Self::Int8(v) => write!(f, "{v}"),
            Self::Uint16(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Uint32(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Uint64(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Array(arr) => {
                f.write_str("[")?;
                for (i, value) in arr.values().iter().take(DISPLAY_ARRAY_LIMIT).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                if arr.len() > DISPLAY_ARRAY_LIMIT {
                    write!(f, ", ... ({} items)", arr.len())?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A homogeneous metadata array.
///
/// The element type is stored alongside the values so that empty arrays keep
/// their declared type through a decode/encode cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataArray {
    element_type: MetadataValueType,
    values: Vec<MetadataValue>,
}

impl MetadataArray {
    /// Create an array, checking that every value has `element_type`.
    pub fn new(element_type: MetadataValueType, values: Vec<MetadataValue>) -> Result<Self> {
        if let Some(bad) = values.iter().find(|v| v.value_type() != element_type) {
            return Err(GgufError::ArrayTypeMismatch {
                expected: element_type.to_string(),
                found: bad.value_type().to_string(),
            });
        }
        Ok(Self {
            element_type,
            values,
        })
    }

    /// Create an empty array of the given element type.
    pub fn empty(element_type: MetadataValueType) -> Self {
        Self {
            element_type,
            values: Vec::new(),
        }
    }

    /// Array of strings.
    pub fn from_strings<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::homogeneous(
            MetadataValueType::String,
            values.into_iter().map(|s| MetadataValue::String(s.into())),
        )
    }

    /// Array of u32.
    pub fn from_u32s(values: impl IntoIterator<Item = u32>) -> Self {
        Self::homogeneous(
            MetadataValueType::Uint32,
            values.into_iter().map(MetadataValue::Uint32),
        )
    }

    /// Array of i32.
    pub fn from_i32s(values: impl IntoIterator<Item = i32>) -> Self {
        Self::homogeneous(
            MetadataValueType::Int32,
            values.into_iter().map(MetadataValue::Int32),
        )
    }

    /// Array of f32.
    pub fn from_f32s(values: impl IntoIterator<Item = f32>) -> Self {
        Self::homogeneous(
            MetadataValueType::Float32,
            values.into_iter().map(MetadataValue::Float32),
        )
    }

    /// Array of arrays. All inner arrays must share one element type.
    pub fn from_arrays(values: Vec<MetadataArray>) -> Result<Self> {
        let values = values.into_iter().map(MetadataValue::Array).collect();
        Self::new(MetadataValueType::Array, values)
    }

    fn homogeneous(
        element_type: MetadataValueType,
        values: impl Iterator<Item = MetadataValue>,
    ) -> Self {
        Self {
            element_type,
            values: values.collect(),
        }
    }

    /// Declared element type.
    pub fn element_type(&self) -> MetadataValueType {
        self.element_type
    }

    /// Elements in order.
    pub fn values(&self) -> &[MetadataValue] {
        &self.values
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append a value read from the wire. The caller guarantees the type.
    pub(crate) fn push_decoded(&mut self, value: MetadataValue) {
        debug_assert_eq!(value.value_type(), self.element_type);
        self.values.push(value);
    }

    pub(crate) fn with_capacity(element_type: MetadataValueType, capacity: usize) -> Self {
        Self {
            element_type,
            values: Vec::with_capacity(capacity),
        }
    }
}

/// One key/value pair of the metadata table.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataEntry {
    /// Metadata key, e.g. `general.architecture`.
    pub key: String,
    /// Value; its variant determines the entry's type tag.
    pub value: MetadataValue,
}

impl MetadataEntry {
    /// Create an entry.
    pub fn new(key: impl Into<String>, value: MetadataValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Type tag written before the value.
    pub fn value_type(&self) -> MetadataValueType {
        self.value.value_type()
    }
}

/// Information about a tensor in the GGUF file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorInfo {
    /// Name of the tensor.
    pub name: String,
    /// Number of dimensions.
    pub n_dimensions: u32,
    /// Dimensions of the tensor, in file order.
    pub dimensions: Vec<u64>,
    /// Data type of the tensor.
    pub dtype: GgmlType,
    /// Offset of tensor data. Relative to the tensor-data region as stored on
    /// disk; absolute within the file once decoded.
    pub offset: u64,
}

impl TensorInfo {
    /// Create a new tensor info.
    pub fn new(name: impl Into<String>, dimensions: Vec<u64>, dtype: GgmlType) -> Self {
        let name = name.into();
        let n_dimensions = dimensions.len() as u32;
        Self {
            name,
            n_dimensions,
            dimensions,
            dtype,
            offset: 0, // Set by writer
        }
    }

    /// Get the number of elements in the tensor with checked arithmetic.
    pub fn n_elements_checked(&self) -> Result<u64> {
        self.dimensions
            .iter()
            .try_fold(1u64, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| GgufError::overflow(format!("element count of '{}'", self.name)))
    }

    /// Get the byte size of the tensor data: `n_elements * type_size / block_size`.
    ///
    /// Fails when the product overflows or the division is not exact.
    pub fn byte_size_checked(&self) -> Result<u64> {
        let n_elements = self.n_elements_checked()?;
        let (block_size, type_size) = self.dtype.block_layout();
        let total = n_elements
            .checked_mul(type_size)
            .ok_or_else(|| GgufError::overflow(format!("byte size of '{}'", self.name)))?;
        if total % block_size != 0 {
            return Err(GgufError::FractionalByteLength {
                tensor: self.name.clone(),
                dtype: self.dtype.to_string(),
                n_elements,
                block_size,
                type_size,
            });
        }
        Ok(total / block_size)
    }
}

/// Decoded payload of one tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    /// F32 tensor values.
    F32(Vec<f32>),
    /// F16 tensor values, kept at half precision.
    F16(Vec<half::f16>),
    /// Opaque bytes for every other type, including quantized blocks.
    Raw(Vec<u8>),
}

impl TensorData {
    /// Encoded size in bytes.
    pub fn byte_len(&self) -> u64 {
        match self {
            Self::F32(v) => v.len() as u64 * 4,
            Self::F16(v) => v.len() as u64 * 2,
            Self::Raw(b) => b.len() as u64,
        }
    }

    /// F32 values, if this is an F32 payload.
    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Self::F32(v) => Some(v),
            _ => None,
        }
    }

    /// F16 values, if this is an F16 payload.
    pub fn as_f16(&self) -> Option<&[half::f16]> {
        match self {
            Self::F16(v) => Some(v),
            _ => None,
        }
    }

    /// Raw bytes, if this is an opaque payload.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Raw(b) => Some(b),
            _ => None,
        }
    }
}

/// Standard metadata keys for GGUF files.
pub mod keys {
    /// Model architecture name
    pub const GENERAL_ARCHITECTURE: &str = "general.architecture";
    /// Quantization format version
    pub const GENERAL_QUANTIZATION_VERSION: &str = "general.quantization_version";
    /// Data alignment
    pub const GENERAL_ALIGNMENT: &str = "general.alignment";
    /// Model name
    pub const GENERAL_NAME: &str = "general.name";
}
