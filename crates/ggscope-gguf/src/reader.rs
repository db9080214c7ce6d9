//! GGUF file reader.
//!
//! Decoding is a single forward pass over the input:
//!
//! 1. header (magic, version, counts) and the metadata table
//! 2. the tensor descriptor table
//! 3. alignment: padding is computed once and every descriptor's relative
//!    offset is rebased onto the start of the tensor-data region
//! 4. tensor payloads, in descriptor order
//!
//! The input is never seeked, so any [`Read`] works, including byte slices.
//!
//! # Example
//!
//! ```ignore
//! use ggscope_gguf::GgufFile;
//!
//! let file = GgufFile::from_file("model.gguf")?;
//! if let Some(arch) = file.header().architecture() {
//!     println!("Architecture: {}", arch);
//! }
//! for (info, data) in file.tensors() {
//!     println!("{} {:?} {} bytes", info.name, info.dimensions, data.byte_len());
//! }
//! ```

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::{debug, trace, warn};

use ggscope_core::{DecodeConfig, GgufError, Result};

use crate::codec;
use crate::cursor::ByteCursor;
use crate::metadata;
use crate::types::{
    keys, GgmlType, MetadataEntry, MetadataValue, TensorData, TensorInfo, GGUF_MAGIC,
    GGUF_VERSION,
};

/// Caps the up-front reservation for declared metadata and tensor counts.
const TABLE_PREALLOC_LIMIT: u64 = 1024;

/// Bytes needed to reach the next multiple of `alignment` from `position`.
///
/// The result is always `< alignment`, and `position + padding` is a multiple
/// of `alignment`. An alignment of zero is rejected.
pub fn compute_padding(position: u64, alignment: u64) -> Result<u64> {
    if alignment == 0 {
        return Err(GgufError::InvalidAlignment(0));
    }
    Ok((alignment - position % alignment) % alignment)
}

/// Header of a GGUF file, including the full metadata table.
#[derive(Debug, Clone, PartialEq)]
pub struct GgufHeader {
    /// Magic bytes, always `GGUF` once decoded.
    pub magic: [u8; 4],
    /// Format version, always 3 once decoded.
    pub version: u32,
    /// Declared number of tensors.
    pub tensor_count: u64,
    /// Declared number of metadata entries.
    pub metadata_count: u64,
    /// Metadata entries in file order.
    pub metadata: Vec<MetadataEntry>,
}

impl GgufHeader {
    /// Get a metadata value by key. The first entry wins if a key repeats.
    pub fn get_metadata(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.value)
    }

    /// Get the model architecture from metadata.
    pub fn architecture(&self) -> Option<&str> {
        self.get_metadata(keys::GENERAL_ARCHITECTURE)?.as_str()
    }

    /// Get the model name from metadata.
    pub fn name(&self) -> Option<&str> {
        self.get_metadata(keys::GENERAL_NAME)?.as_str()
    }
}

/// Everything before the tensor payloads: header, descriptors and layout.
#[derive(Debug, Clone, PartialEq)]
pub struct GgufIndex {
    /// Header and metadata.
    pub header: GgufHeader,
    /// Tensor descriptors in file order, with absolute offsets.
    pub tensor_infos: Vec<TensorInfo>,
    /// Alignment unit used for the tensor-data region.
    pub alignment: u64,
    /// Padding bytes between the descriptor table and the tensor-data region.
    pub padding: u64,
    /// Absolute offset of the tensor-data region.
    pub data_offset: u64,
}

impl GgufIndex {
    /// Get tensor info by name.
    pub fn get_tensor_info(&self, name: &str) -> Option<&TensorInfo> {
        self.tensor_infos.iter().find(|info| info.name == name)
    }

    /// Get all tensor names, in file order.
    pub fn tensor_names(&self) -> impl Iterator<Item = &str> {
        self.tensor_infos.iter().map(|info| info.name.as_str())
    }

    /// Get the total number of tensors.
    pub fn num_tensors(&self) -> usize {
        self.tensor_infos.len()
    }

    /// Offset of a tensor relative to the tensor-data region, as stored on disk.
    pub fn relative_offset(&self, info: &TensorInfo) -> u64 {
        info.offset.saturating_sub(self.data_offset)
    }
}

/// A fully decoded GGUF file.
#[derive(Debug, Clone, PartialEq)]
pub struct GgufFile {
    /// Header, descriptors and layout.
    pub index: GgufIndex,
    /// Payloads, index-aligned with `index.tensor_infos`.
    pub data: Vec<TensorData>,
}

impl GgufFile {
    /// Read and decode a GGUF file from disk with the default configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_with_config(path, DecodeConfig::default())
    }

    /// Read and decode a GGUF file from disk.
    ///
    /// The file handle is closed before this returns, on success or error.
    pub fn from_file_with_config(path: impl AsRef<Path>, config: DecodeConfig) -> Result<Self> {
        let file = File::open(path)?;
        GgufDecoder::with_config(BufReader::new(file), config)?.decode()
    }

    /// Decode a GGUF file from any reader with the default configuration.
    pub fn read<R: Read>(reader: R) -> Result<Self> {
        GgufDecoder::new(reader).decode()
    }

    /// Decode a GGUF file held in memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read(bytes)
    }

    /// Header and metadata.
    pub fn header(&self) -> &GgufHeader {
        &self.index.header
    }

    /// Tensor descriptors in file order.
    pub fn tensor_infos(&self) -> &[TensorInfo] {
        &self.index.tensor_infos
    }

    /// Padding bytes before the tensor-data region.
    pub fn padding(&self) -> u64 {
        self.index.padding
    }

    /// Descriptors paired with their payloads, in file order.
    pub fn tensors(&self) -> impl Iterator<Item = (&TensorInfo, &TensorData)> {
        self.index.tensor_infos.iter().zip(self.data.iter())
    }

    /// Look up a tensor and its payload by name.
    pub fn get_tensor(&self, name: &str) -> Option<(&TensorInfo, &TensorData)> {
        self.tensors().find(|(info, _)| info.name == name)
    }
}

/// Single-use GGUF decoder.
///
/// The decoder owns its input and is consumed by [`decode`](Self::decode) or
/// [`decode_index`](Self::decode_index), so a partially decoded state can
/// never be observed or resumed.
#[derive(Debug)]
pub struct GgufDecoder<R> {
    cursor: ByteCursor<R>,
    config: DecodeConfig,
}

impl<R: Read> GgufDecoder<R> {
    /// Create a decoder with the default configuration.
    pub fn new(reader: R) -> Self {
        Self {
            cursor: ByteCursor::new(reader),
            config: DecodeConfig::default(),
        }
    }

    /// Create a decoder with a custom configuration.
    pub fn with_config(reader: R, config: DecodeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cursor: ByteCursor::new(reader),
            config,
        })
    }

    /// Decode the header and descriptor table without reading payloads.
    pub fn decode_index(mut self) -> Result<GgufIndex> {
        self.read_index()
    }

    /// Decode the whole file.
    pub fn decode(mut self) -> Result<GgufFile> {
        let index = self.read_index()?;

        if !index.tensor_infos.is_empty() {
            self.cursor.skip(index.padding, "alignment padding")?;
        }

        let mut data = Vec::with_capacity(index.tensor_infos.len());
        for info in &index.tensor_infos {
            data.push(self.read_tensor_data(info)?);
        }
        debug!(
            tensors = data.len(),
            end = self.cursor.position(),
            "read tensor data"
        );

        Ok(GgufFile { index, data })
    }

    fn read_index(&mut self) -> Result<GgufIndex> {
        let header = self.read_header()?;
        let mut tensor_infos = self.read_tensor_infos(header.tensor_count)?;

        let alignment = self.resolve_alignment(&header)?;
        let position = self.cursor.position();
        let padding = compute_padding(position, alignment)?;
        let data_offset = position
            .checked_add(padding)
            .ok_or_else(|| GgufError::overflow("tensor data offset"))?;

        for info in &mut tensor_infos {
            info.offset = data_offset.checked_add(info.offset).ok_or_else(|| {
                GgufError::overflow(format!("absolute offset of '{}'", info.name))
            })?;
        }
        debug!(alignment, padding, data_offset, "aligned tensor data region");

        Ok(GgufIndex {
            header,
            tensor_infos,
            alignment,
            padding,
            data_offset,
        })
    }

    fn read_header(&mut self) -> Result<GgufHeader> {
        let magic: [u8; 4] = self.cursor.read_with("magic", 4, |r| {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            Ok(buf)
        })?;
        if magic != GGUF_MAGIC {
            return Err(GgufError::InvalidMagic(magic));
        }

        let version = codec::read_u32(&mut self.cursor)?;
        if version != GGUF_VERSION {
            return Err(GgufError::UnsupportedVersion(version));
        }

        let tensor_count = codec::read_u64(&mut self.cursor)?;
        if tensor_count > self.config.max_tensor_count {
            return Err(GgufError::TooManyTensors {
                count: tensor_count,
                max: self.config.max_tensor_count,
            });
        }
        let metadata_count = codec::read_u64(&mut self.cursor)?;
        if metadata_count > self.config.max_metadata_count {
            return Err(GgufError::TooManyMetadata {
                count: metadata_count,
                max: self.config.max_metadata_count,
            });
        }

        let mut metadata = Vec::with_capacity(metadata_count.min(TABLE_PREALLOC_LIMIT) as usize);
        for _ in 0..metadata_count {
            metadata.push(metadata::read_entry(&mut self.cursor, &self.config)?);
        }
        debug!(version, tensor_count, metadata_count, "read GGUF header");

        Ok(GgufHeader {
            magic,
            version,
            tensor_count,
            metadata_count,
            metadata,
        })
    }

    fn read_tensor_infos(&mut self, count: u64) -> Result<Vec<TensorInfo>> {
        let mut infos = Vec::with_capacity(count.min(TABLE_PREALLOC_LIMIT) as usize);
        for _ in 0..count {
            infos.push(self.read_tensor_info()?);
        }
        Ok(infos)
    }

    fn read_tensor_info(&mut self) -> Result<TensorInfo> {
        let name = codec::read_string(
            &mut self.cursor,
            self.config.max_string_length,
            "tensor name",
        )?;

        let n_dimensions = codec::read_u32(&mut self.cursor)?;
        if n_dimensions > self.config.max_dimensions {
            return Err(GgufError::TooManyDimensions {
                tensor: name,
                n_dims: n_dimensions,
                max: self.config.max_dimensions,
            });
        }
        let dimensions = (0..n_dimensions)
            .map(|_| codec::read_u64(&mut self.cursor))
            .collect::<Result<Vec<_>>>()?;

        let code = codec::read_u32(&mut self.cursor)?;
        let dtype =
            GgmlType::from_code(code).ok_or_else(|| GgufError::InvalidDtype {
                tensor: name.clone(),
                code,
            })?;

        let offset = codec::read_u64(&mut self.cursor)?;
        trace!(name = %name, ?dimensions, %dtype, offset, "read tensor info");

        Ok(TensorInfo {
            name,
            n_dimensions,
            dimensions,
            dtype,
            offset,
        })
    }

    fn resolve_alignment(&self, header: &GgufHeader) -> Result<u64> {
        if self.config.honor_alignment_key {
            if let Some(value) = header.get_metadata(keys::GENERAL_ALIGNMENT) {
                match value {
                    MetadataValue::Uint32(_) | MetadataValue::Uint64(_) => {
                        let alignment = value.as_u64().unwrap_or_default();
                        if alignment == 0 {
                            return Err(GgufError::InvalidAlignment(0));
                        }
                        return Ok(alignment);
                    }
                    other => warn!(
                        value_type = %other.value_type(),
                        "ignoring {} with unexpected type",
                        keys::GENERAL_ALIGNMENT
                    ),
                }
            }
        }
        Ok(self.config.alignment)
    }

    fn read_tensor_data(&mut self, info: &TensorInfo) -> Result<TensorData> {
        let position = self.cursor.position();
        if info.offset < position {
            return Err(GgufError::OverlappingTensor {
                tensor: info.name.clone(),
                offset: info.offset,
                position,
            });
        }
        self.cursor.skip(info.offset - position, "tensor data gap")?;

        let byte_size = info.byte_size_checked()?;
        let bytes = self.cursor.read_bytes(byte_size, "tensor data")?;
        trace!(name = %info.name, offset = info.offset, byte_size, "read tensor data");

        if !info.dtype.is_decoded_float() {
            return Ok(TensorData::Raw(bytes));
        }
        Ok(match info.dtype {
            GgmlType::F16 => TensorData::F16(codec::decode_f16_slice(&bytes)),
            _ => TensorData::F32(codec::decode_f32_slice(&bytes)),
        })
    }
}
