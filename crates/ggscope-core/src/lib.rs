//! Core types for ggscope.
//!
//! This crate provides the pieces shared by the GGUF decoder, encoder and CLI:
//!
//! - The error taxonomy ([`GgufError`], classified by [`ErrorKind`])
//! - Decoder configuration ([`DecodeConfig`]), loadable from YAML

#![warn(missing_docs)]

mod config;
mod error;

pub use config::*;
pub use error::*;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{DecodeConfig, DEFAULT_ALIGNMENT};
    pub use crate::error::{ErrorKind, GgufError, Result};
}
