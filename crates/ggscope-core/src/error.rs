//! Error types for ggscope.

use thiserror::Error;

/// Result type alias for ggscope operations.
pub type Result<T> = std::result::Result<T, GgufError>;

/// Coarse classification of a [`GgufError`].
///
/// Every error is terminal for the decode attempt that produced it; the kind
/// only tells the caller which part of the file was at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad magic, unsupported version, or an unusable alignment.
    Structural,
    /// A value-kind or quantization-type code outside the known set.
    UnknownEnum,
    /// The input ended before a field's declared size.
    TruncatedData,
    /// Payload sizing that does not come out to a whole number of bytes, or overflows.
    ArithmeticConsistency,
    /// A text field that is not valid UTF-8.
    Encoding,
    /// Tensor offsets that go backwards or overlap.
    Corruption,
    /// A field exceeds one of the configured safety limits.
    LimitExceeded,
    /// Underlying I/O failure other than end of input.
    Io,
    /// Invalid or unreadable configuration.
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Structural => "structural",
            Self::UnknownEnum => "unknown-enum",
            Self::TruncatedData => "truncated-data",
            Self::ArithmeticConsistency => "arithmetic-consistency",
            Self::Encoding => "encoding",
            Self::Corruption => "corruption",
            Self::LimitExceeded => "limit-exceeded",
            Self::Io => "io",
            Self::Config => "config",
        };
        f.write_str(name)
    }
}

/// Main error type for GGUF decoding and encoding.
#[derive(Error, Debug)]
pub enum GgufError {
    /// The file does not start with `GGUF`.
    #[error("Invalid GGUF magic: expected \"GGUF\", got {}", String::from_utf8_lossy(.0).escape_debug())]
    InvalidMagic([u8; 4]),

    /// Version other than 3.
    #[error("Unsupported GGUF version: {0} (only version 3 is supported)")]
    UnsupportedVersion(u32),

    /// Alignment of zero.
    #[error("Invalid alignment: {0} (must be greater than zero)")]
    InvalidAlignment(u64),

    /// Unknown metadata value type code.
    #[error("Invalid metadata value type: {0}")]
    InvalidValueType(u32),

    /// An array element whose type differs from the array's element type.
    #[error("Array element type mismatch: array holds {expected}, element is {found}")]
    ArrayTypeMismatch {
        /// Declared element type.
        expected: String,
        /// Type of the offending element.
        found: String,
    },

    /// Unknown tensor quantization type code.
    #[error("Invalid tensor dtype {code} for tensor '{tensor}'")]
    InvalidDtype {
        /// Tensor name.
        tensor: String,
        /// Raw type code.
        code: u32,
    },

    /// Not enough bytes left for a field.
    #[error("Truncated data: needed {needed} bytes for {what} at offset {offset}")]
    Truncated {
        /// Field being read.
        what: &'static str,
        /// Cursor position where the read started.
        offset: u64,
        /// Bytes the field required.
        needed: u64,
    },

    /// `element_count * type_size` is not a multiple of `block_size`.
    #[error(
        "Tensor '{tensor}' ({dtype}) has {n_elements} elements, which is not a whole number \
         of {block_size}-element blocks of {type_size} bytes"
    )]
    FractionalByteLength {
        /// Tensor name.
        tensor: String,
        /// Quantization type name.
        dtype: String,
        /// Product of the dimensions.
        n_elements: u64,
        /// Elements per block.
        block_size: u64,
        /// Bytes per block.
        type_size: u64,
    },

    /// Integer overflow in a size or offset computation.
    #[error("Integer overflow computing {0}")]
    IntegerOverflow(String),

    /// Data supplied for a tensor does not match its declared size.
    #[error("Tensor '{tensor}' data is {actual} bytes, expected {expected}")]
    TensorSizeMismatch {
        /// Tensor name.
        tensor: String,
        /// Size implied by shape and dtype.
        expected: u64,
        /// Size supplied.
        actual: u64,
    },

    /// Invalid UTF-8 in a string field.
    #[error("Invalid UTF-8 in {what} at offset {offset}")]
    InvalidUtf8 {
        /// Field being read.
        what: &'static str,
        /// Offset of the first string byte.
        offset: u64,
    },

    /// A tensor's payload starts before the end of the previous one.
    #[error(
        "Tensor '{tensor}' starts at offset {offset}, behind the current position {position}"
    )]
    OverlappingTensor {
        /// Tensor name.
        tensor: String,
        /// Absolute offset declared for the tensor.
        offset: u64,
        /// Position already reached by the cursor.
        position: u64,
    },

    /// String too large.
    #[error("String too large: {size} bytes exceeds maximum of {max} bytes")]
    StringTooLarge {
        /// Declared size in bytes.
        size: u64,
        /// Maximum allowed size.
        max: u64,
    },

    /// Array too large.
    #[error("Array too large: {len} elements exceeds maximum of {max} elements")]
    ArrayTooLarge {
        /// Declared length.
        len: u64,
        /// Maximum allowed length.
        max: u64,
    },

    /// Arrays nested deeper than allowed.
    #[error("Array nesting exceeds maximum depth of {max}")]
    NestingTooDeep {
        /// Maximum allowed depth.
        max: usize,
    },

    /// Too many tensors.
    #[error("Too many tensors: {count} exceeds maximum of {max}")]
    TooManyTensors {
        /// Declared count.
        count: u64,
        /// Maximum allowed.
        max: u64,
    },

    /// Too many metadata entries.
    #[error("Too many metadata entries: {count} exceeds maximum of {max}")]
    TooManyMetadata {
        /// Declared count.
        count: u64,
        /// Maximum allowed.
        max: u64,
    },

    /// Tensor rank above the configured limit.
    #[error("Tensor '{tensor}' has {n_dims} dimensions, maximum is {max}")]
    TooManyDimensions {
        /// Tensor name.
        tensor: String,
        /// Declared rank.
        n_dims: u32,
        /// Maximum allowed.
        max: u32,
    },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GgufError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMagic(_)
            | Self::UnsupportedVersion(_)
            | Self::InvalidAlignment(_)
            | Self::ArrayTypeMismatch { .. } => ErrorKind::Structural,
            Self::InvalidValueType(_) | Self::InvalidDtype { .. } => ErrorKind::UnknownEnum,
            Self::Truncated { .. } => ErrorKind::TruncatedData,
            Self::FractionalByteLength { .. }
            | Self::IntegerOverflow(_)
            | Self::TensorSizeMismatch { .. } => ErrorKind::ArithmeticConsistency,
            Self::InvalidUtf8 { .. } => ErrorKind::Encoding,
            Self::OverlappingTensor { .. } => ErrorKind::Corruption,
            Self::StringTooLarge { .. }
            | Self::ArrayTooLarge { .. }
            | Self::NestingTooDeep { .. }
            | Self::TooManyTensors { .. }
            | Self::TooManyMetadata { .. }
            | Self::TooManyDimensions { .. } => ErrorKind::LimitExceeded,
            Self::Io(_) | Self::Json(_) => ErrorKind::Io,
            Self::Config(_) | Self::Yaml(_) => ErrorKind::Config,
        }
    }

    /// Build an overflow error for the named computation.
    pub fn overflow(what: impl Into<String>) -> Self {
        Self::IntegerOverflow(what.into())
    }
}
