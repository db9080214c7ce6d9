//! GGUF container decoding.
//!
//! GGUF (GGML Universal Format) stores model metadata and tensors for
//! GGML-based executors like llama.cpp and Ollama. This crate provides:
//! - Types representing the GGUF format
//! - A bounded, forward-only decoder for GGUF v3 files
//! - A writer that reproduces a decoded file's layout, and a builder for new files
//! - JSON export of metadata and comparison of two files
//!
//! # Example
//!
//! ```ignore
//! use ggscope_gguf::{GgufDecoder, GgufFile};
//!
//! // Full decode
//! let file = GgufFile::from_file("model.gguf")?;
//! if let Some(arch) = file.header().architecture() {
//!     println!("Model architecture: {}", arch);
//! }
//!
//! // Header and descriptors only
//! let reader = std::io::BufReader::new(std::fs::File::open("model.gguf")?);
//! let index = GgufDecoder::new(reader).decode_index()?;
//! for info in &index.tensor_infos {
//!     println!("{} {} {:?}", info.name, info.dtype, info.dimensions);
//! }
//! ```

#![warn(missing_docs)]

pub mod codec;
mod compare;
pub mod cursor;
mod export;
pub mod metadata;
mod reader;
mod types;
mod writer;

pub use compare::{compare, Comparison, MetadataChange, TensorChange};
pub use export::{metadata_to_json, write_metadata_json};
pub use reader::{compute_padding, GgufDecoder, GgufFile, GgufHeader, GgufIndex};
pub use types::*;
pub use writer::{write_file, GgufBuilder};
