//! Codec tuning knobs

use serde::{Deserialize, Serialize};

use crate::codec::MAX_LOOKUP_BITS;
use crate::error::{CodecError, Result};

/// Deepest density window a tile may declare
pub const MAX_DENSITY_WINDOW: u32 = 64;

/// Highest tile format major this build understands
pub const CURRENT_FORMAT_MAJOR: u64 = 2;

/// Encoder and decoder settings
///
/// Only `density_window` changes the produced bytes; it is recorded in each
/// tile so decoding never depends on the reader's setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Width of the Huffman decode table (0-16)
    #[serde(default = "default_lookup_bits")]
    pub huffman_lookup_bits: u32,
    /// Number of preceding values averaged for link/point/restriction counts
    #[serde(default = "default_density_window")]
    pub density_window: u32,
    /// Check the CRC-64 footer on decode
    #[serde(default = "default_true")]
    pub verify_crc: bool,
    /// Reject tiles with a newer format major
    #[serde(default = "default_max_major")]
    pub max_format_major: u64,
}

fn default_lookup_bits() -> u32 {
    8
}

fn default_density_window() -> u32 {
    4
}

fn default_true() -> bool {
    true
}

fn default_max_major() -> u64 {
    CURRENT_FORMAT_MAJOR
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            huffman_lookup_bits: default_lookup_bits(),
            density_window: default_density_window(),
            verify_crc: default_true(),
            max_format_major: default_max_major(),
        }
    }
}

impl CodecConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CodecConfig = serde_json::from_str(json)
            .map_err(|e| CodecError::contract(format!("invalid codec config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.huffman_lookup_bits > MAX_LOOKUP_BITS {
            return Err(CodecError::contract(format!(
                "huffman_lookup_bits {} exceeds {MAX_LOOKUP_BITS}",
                self.huffman_lookup_bits
            )));
        }
        if self.density_window == 0 || self.density_window > MAX_DENSITY_WINDOW {
            return Err(CodecError::contract(format!(
                "density_window {} outside 1..={MAX_DENSITY_WINDOW}",
                self.density_window
            )));
        }
        if self.max_format_major == 0 {
            return Err(CodecError::contract("max_format_major must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CodecConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.huffman_lookup_bits, 8);
        assert_eq!(config.max_format_major, CURRENT_FORMAT_MAJOR);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = CodecConfig::from_json_str(r#"{"density_window": 8}"#).unwrap();
        assert_eq!(config.density_window, 8);
        assert_eq!(config.huffman_lookup_bits, 8);
        assert!(config.verify_crc);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(CodecConfig::from_json_str(r#"{"huffman_lookup_bits": 17}"#).is_err());
        assert!(CodecConfig::from_json_str(r#"{"density_window": 0}"#).is_err());
        assert!(CodecConfig::from_json_str("not json").is_err());
    }
}
