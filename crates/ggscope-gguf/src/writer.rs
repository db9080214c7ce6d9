//! GGUF file writer.
//!
//! [`write_file`] re-encodes a decoded [`GgufFile`] with its original layout.
//! [`GgufBuilder`] assembles a new file from metadata and tensors.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use ggscope_core::{GgufError, Result};

use crate::codec;
use crate::reader::{compute_padding, GgufFile};
use crate::types::{
    keys, GgmlType, MetadataArray, MetadataEntry, MetadataValue, TensorData, TensorInfo,
    GGUF_DEFAULT_ALIGNMENT, GGUF_MAGIC, GGUF_VERSION,
};

/// Counting writer for the GGUF wire format.
struct Encoder<W> {
    inner: W,
    position: u64,
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Encoder<W> {
    fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    fn write_header(&mut self, tensor_count: u64, metadata_count: u64) -> Result<()> {
        self.write_all(&GGUF_MAGIC)?;
        self.write_u32::<LittleEndian>(GGUF_VERSION)?;
        self.write_u64::<LittleEndian>(tensor_count)?;
        self.write_u64::<LittleEndian>(metadata_count)?;
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_u64::<LittleEndian>(s.len() as u64)?;
        self.write_all(s.as_bytes())?;
        Ok(())
    }

    fn write_entry(&mut self, entry: &MetadataEntry) -> Result<()> {
        self.write_string(&entry.key)?;
        self.write_u32::<LittleEndian>(entry.value.value_type() as u32)?;
        self.write_metadata_value_data(&entry.value)
    }

    /// Write a value without its type tag. Arrays carry their element type.
    fn write_metadata_value_data(&mut self, value: &MetadataValue) -> Result<()> {
        match value {
            MetadataValue::Uint8(v) => self.write_u8(*v)?,
            MetadataValue::Int8(v) => self.write_i8(*v)?,
            MetadataValue::Uint16(v) => self.write_u16::<LittleEndian>(*v)?,
            MetadataValue::Int16(v) => self.write_i16::<LittleEndian>(*v)?,
            MetadataValue::Uint32(v) => self.write_u32::<LittleEndian>(*v)?,
            MetadataValue::Int32(v) => self.write_i32::<LittleEndian>(*v)?,
            MetadataValue::Float32(v) => self.write_f32::<LittleEndian>(*v)?,
            MetadataValue::Bool(v) => self.write_u8(u8::from(*v))?,
            MetadataValue::String(s) => self.write_string(s)?,
            MetadataValue::Uint64(v) => self.write_u64::<LittleEndian>(*v)?,
            MetadataValue::Int64(v) => self.write_i64::<LittleEndian>(*v)?,
            MetadataValue::Float64(v) => self.write_f64::<LittleEndian>(*v)?,
            MetadataValue::Array(arr) => {
                self.write_u32::<LittleEndian>(arr.element_type() as u32)?;
                self.write_u64::<LittleEndian>(arr.len() as u64)?;
                for elem in arr.values() {
                    self.write_metadata_value_data(elem)?;
                }
            }
        }
        Ok(())
    }

    fn write_tensor_info(&mut self, info: &TensorInfo, relative_offset: u64) -> Result<()> {
        self.write_string(&info.name)?;
        self.write_u32::<LittleEndian>(info.dimensions.len() as u32)?;
        for dim in &info.dimensions {
            self.write_u64::<LittleEndian>(*dim)?;
        }
        self.write_u32::<LittleEndian>(info.dtype as u32)?;
        self.write_u64::<LittleEndian>(relative_offset)?;
        Ok(())
    }

    fn write_zeros(&mut self, count: u64) -> Result<()> {
        io::copy(&mut io::repeat(0).take(count), self)?;
        Ok(())
    }

    fn write_tensor_data(&mut self, info: &TensorInfo, data: &TensorData) -> Result<()> {
        let expected = info.byte_size_checked()?;
        if data.byte_len() != expected {
            return Err(GgufError::TensorSizeMismatch {
                tensor: info.name.clone(),
                expected,
                actual: data.byte_len(),
            });
        }
        match data {
            TensorData::F32(values) => self.write_all(&codec::encode_f32_slice(values))?,
            TensorData::F16(values) => self.write_all(&codec::encode_f16_slice(values))?,
            TensorData::Raw(bytes) => self.write_all(bytes)?,
        }
        Ok(())
    }
}

/// Shared layout: header, metadata, descriptors, padding, then payloads
/// placed at `data_start + relative_offset`.
fn encode<'a, W: Write>(
    writer: W,
    metadata: &[MetadataEntry],
    tensors: &[(&'a TensorInfo, u64, &'a TensorData)],
    alignment: u64,
) -> Result<u64> {
    let mut enc = Encoder::new(writer);
    enc.write_header(tensors.len() as u64, metadata.len() as u64)?;
    for entry in metadata {
        enc.write_entry(entry)?;
    }
    for (info, relative, _) in tensors {
        enc.write_tensor_info(info, *relative)?;
    }

    if !tensors.is_empty() {
        let padding = compute_padding(enc.position, alignment)?;
        enc.write_zeros(padding)?;
        let data_start = enc.position;

        for (info, relative, data) in tensors {
            let target = data_start
                .checked_add(*relative)
                .ok_or_else(|| GgufError::overflow(format!("offset of '{}'", info.name)))?;
            if target < enc.position {
                return Err(GgufError::OverlappingTensor {
                    tensor: info.name.clone(),
                    offset: target,
                    position: enc.position,
                });
            }
            enc.write_zeros(target - enc.position)?;
            enc.write_tensor_data(info, data)?;
        }
    }

    enc.flush()?;
    debug!(bytes = enc.position, tensors = tensors.len(), "wrote GGUF file");
    Ok(enc.position)
}

/// Re-encode a decoded file, preserving metadata order, descriptor order,
/// alignment and tensor offsets. Returns the number of bytes written.
///
/// Bytes that trailed the last payload in the source are not reproduced.
pub fn write_file<W: Write>(file: &GgufFile, writer: W) -> Result<u64> {
    let tensors: Vec<_> = file
        .tensors()
        .map(|(info, data)| (info, file.index.relative_offset(info), data))
        .collect();
    encode(writer, &file.header().metadata, &tensors, file.index.alignment)
}

impl GgufFile {
    /// Encode this file to a byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        write_file(self, &mut buffer)?;
        Ok(buffer)
    }
}

/// Builder for creating GGUF files.
///
/// Metadata keeps insertion order. Tensor payloads are packed in insertion
/// order, each starting on an alignment boundary.
#[derive(Debug, Default)]
pub struct GgufBuilder {
    metadata: Vec<MetadataEntry>,
    tensors: Vec<(TensorInfo, TensorData)>,
}

impl GgufBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with basic model info.
    pub fn with_model(architecture: &str, name: &str) -> Self {
        let mut builder = Self::new();
        builder
            .add_string(keys::GENERAL_ARCHITECTURE, architecture)
            .add_string(keys::GENERAL_NAME, name)
            .add_u32(keys::GENERAL_QUANTIZATION_VERSION, 2);
        builder
    }

    /// Set the alignment for tensor data by recording `general.alignment`.
    pub fn alignment(mut self, alignment: u32) -> Self {
        self.add_u32(keys::GENERAL_ALIGNMENT, alignment);
        self
    }

    /// Add a metadata key-value pair. An existing key is replaced in place.
    pub fn add_metadata(&mut self, key: impl Into<String>, value: MetadataValue) -> &mut Self {
        let key = key.into();
        match self.metadata.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => entry.value = value,
            None => self.metadata.push(MetadataEntry::new(key, value)),
        }
        self
    }

    /// Add a string metadata value.
    pub fn add_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.add_metadata(key, MetadataValue::String(value.into()))
    }

    /// Add a u32 metadata value.
    pub fn add_u32(&mut self, key: impl Into<String>, value: u32) -> &mut Self {
        self.add_metadata(key, MetadataValue::Uint32(value))
    }

    /// Add a u64 metadata value.
    pub fn add_u64(&mut self, key: impl Into<String>, value: u64) -> &mut Self {
        self.add_metadata(key, MetadataValue::Uint64(value))
    }

    /// Add a f32 metadata value.
    pub fn add_f32(&mut self, key: impl Into<String>, value: f32) -> &mut Self {
        self.add_metadata(key, MetadataValue::Float32(value))
    }

    /// Add a bool metadata value.
    pub fn add_bool(&mut self, key: impl Into<String>, value: bool) -> &mut Self {
        self.add_metadata(key, MetadataValue::Bool(value))
    }

    /// Add an array metadata value.
    pub fn add_array(&mut self, key: impl Into<String>, array: MetadataArray) -> &mut Self {
        self.add_metadata(key, MetadataValue::Array(array))
    }

    /// Add a tensor with f32 data.
    pub fn add_f32_tensor(
        &mut self,
        name: impl Into<String>,
        dimensions: Vec<u64>,
        data: Vec<f32>,
    ) -> &mut Self {
        let info = TensorInfo::new(name, dimensions, GgmlType::F32);
        self.tensors.push((info, TensorData::F32(data)));
        self
    }

    /// Add a tensor with f16 data.
    pub fn add_f16_tensor(
        &mut self,
        name: impl Into<String>,
        dimensions: Vec<u64>,
        data: Vec<half::f16>,
    ) -> &mut Self {
        let info = TensorInfo::new(name, dimensions, GgmlType::F16);
        self.tensors.push((info, TensorData::F16(data)));
        self
    }

    /// Add a tensor with raw bytes (pre-quantized or custom format).
    pub fn add_raw_tensor(
        &mut self,
        name: impl Into<String>,
        dimensions: Vec<u64>,
        dtype: GgmlType,
        data: Vec<u8>,
    ) -> &mut Self {
        let info = TensorInfo::new(name, dimensions, dtype);
        self.tensors.push((info, TensorData::Raw(data)));
        self
    }

    /// `general.alignment` if set as an unsigned integer, the default otherwise.
    fn effective_alignment(&self) -> u64 {
        self.metadata
            .iter()
            .find(|entry| entry.key == keys::GENERAL_ALIGNMENT)
            .and_then(|entry| match entry.value {
                MetadataValue::Uint32(_) | MetadataValue::Uint64(_) => entry.value.as_u64(),
                _ => None,
            })
            .unwrap_or(GGUF_DEFAULT_ALIGNMENT)
    }

    /// Relative offset of every tensor, each rounded up to the alignment.
    fn calculate_tensor_offsets(&self) -> Result<Vec<u64>> {
        let alignment = self.effective_alignment();
        let mut offsets = Vec::with_capacity(self.tensors.len());
        let mut offset: u64 = 0;

        for (info, data) in &self.tensors {
            offsets.push(offset);
            offset = offset
                .checked_add(data.byte_len())
                .and_then(|end| end.checked_add(compute_padding(end, alignment).ok()?))
                .ok_or_else(|| GgufError::overflow(format!("offset after '{}'", info.name)))?;
        }
        Ok(offsets)
    }

    /// Build and write the GGUF file. Returns the number of bytes written.
    pub fn write<W: Write>(&self, writer: W) -> Result<u64> {
        let alignment = self.effective_alignment();
        if alignment == 0 {
            return Err(GgufError::InvalidAlignment(0));
        }
        let offsets = self.calculate_tensor_offsets()?;
        let tensors: Vec<_> = self
            .tensors
            .iter()
            .zip(offsets)
            .map(|((info, data), offset)| (info, offset, data))
            .collect();
        encode(writer, &self.metadata, &tensors, alignment)
    }

    /// Build to a byte vector.
    pub fn build_to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write(&mut buffer)?;
        Ok(buffer)
    }
}
