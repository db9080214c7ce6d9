//! Configuration types for ggscope.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{GgufError, Result};

/// Default alignment of the tensor-data region, in bytes.
pub const DEFAULT_ALIGNMENT: u64 = 32;

/// Decoder configuration.
///
/// The limits guard against hostile files that declare huge strings, arrays
/// or counts; none of them change how a well-formed file decodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Alignment unit for the tensor-data region.
    #[serde(default = "default_alignment")]
    pub alignment: u64,

    /// Use `general.alignment` from the metadata table when present.
    #[serde(default = "default_true")]
    pub honor_alignment_key: bool,

    /// Maximum nesting depth of array metadata values.
    #[serde(default = "default_max_array_depth")]
    pub max_array_depth: usize,

    /// Maximum string length in bytes (10 MB).
    #[serde(default = "default_max_string_length")]
    pub max_string_length: u64,

    /// Maximum number of elements in one metadata array.
    #[serde(default = "default_max_array_length")]
    pub max_array_length: u64,

    /// Maximum tensor count. Modern LLMs typically have < 10,000 tensors.
    #[serde(default = "default_max_count")]
    pub max_tensor_count: u64,

    /// Maximum metadata entry count.
    #[serde(default = "default_max_count")]
    pub max_metadata_count: u64,

    /// Maximum tensor rank.
    #[serde(default = "default_max_dimensions")]
    pub max_dimensions: u32,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            alignment: default_alignment(),
            honor_alignment_key: true,
            max_array_depth: default_max_array_depth(),
            max_string_length: default_max_string_length(),
            max_array_length: default_max_array_length(),
            max_tensor_count: default_max_count(),
            max_metadata_count: default_max_count(),
            max_dimensions: default_max_dimensions(),
        }
    }
}

impl DecodeConfig {
    /// Override the alignment unit.
    pub fn with_alignment(mut self, alignment: u64) -> Self {
        self.alignment = alignment;
        self
    }

    /// Set whether `general.alignment` overrides the configured alignment.
    pub fn honor_alignment_key(mut self, honor: bool) -> Self {
        self.honor_alignment_key = honor;
        self
    }

    /// Override the array nesting bound.
    pub fn with_max_array_depth(mut self, depth: usize) -> Self {
        self.max_array_depth = depth;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.alignment == 0 {
            return Err(GgufError::Config(
                "alignment must be greater than zero".to_string(),
            ));
        }
        if self.max_array_depth == 0 {
            return Err(GgufError::Config(
                "max_array_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a configuration from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }
}

fn default_alignment() -> u64 {
    DEFAULT_ALIGNMENT
}

fn default_true() -> bool {
    true
}

fn default_max_array_depth() -> usize {
    64
}

fn default_max_string_length() -> u64 {
    10 * 1024 * 1024
}

fn default_max_array_length() -> u64 {
    1_000_000
}

fn default_max_count() -> u64 {
    100_000
}

fn default_max_dimensions() -> u32 {
    8
}
