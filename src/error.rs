//! Error types for butterfly-tile
//!
//! Every failure of the codec falls in one of three groups: framing
//! corruption of the persisted bytes, contract violations by the caller, and
//! I/O errors of the underlying sink. None of them is recovered internally.

use thiserror::Error;

/// Main error type for tile and codec operations
#[derive(Debug, Error)]
pub enum CodecError {
    /// Stream content does not follow the expected layout
    #[error("framing corruption at bit {position}: {reason}")]
    Framing { position: u64, reason: String },

    /// Read beyond the end of the data plus the phantom-bit allowance
    #[error("unexpected end of stream at bit {position}")]
    EndOfStream { position: u64 },

    /// Format major version newer than this reader understands
    #[error("unsupported format version {major}.{minor} (max major {max_major})")]
    UnsupportedVersion { major: u64, minor: u64, max_major: u64 },

    /// Leading magic number is not a tile magic
    #[error("invalid magic number: expected 0x{expected:08x}, got 0x{found:08x}")]
    BadMagic { expected: u32, found: u32 },

    /// CRC footer does not match the section content
    #[error("checksum mismatch: stored 0x{stored:016x}, computed 0x{computed:016x}")]
    ChecksumMismatch { stored: u64, computed: u64 },

    /// Caller broke a precondition of the codec
    #[error("contract violation: {0}")]
    Contract(String),

    /// Global id outside the coordinate range declared by a tile
    #[error("id 0x{id:016x} is outside the tile coordinate range")]
    OutOfRange { id: u64 },

    /// Underlying sink or file error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    pub(crate) fn framing(position: u64, reason: impl Into<String>) -> Self {
        CodecError::Framing {
            position,
            reason: reason.into(),
        }
    }

    pub(crate) fn contract(msg: impl Into<String>) -> Self {
        CodecError::Contract(msg.into())
    }

    /// True for errors caused by corrupt or truncated input
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            CodecError::Framing { .. }
                | CodecError::EndOfStream { .. }
                | CodecError::UnsupportedVersion { .. }
                | CodecError::BadMagic { .. }
                | CodecError::ChecksumMismatch { .. }
        )
    }
}

/// Result type alias for butterfly-tile operations
pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_message_carries_position() {
        let err = CodecError::framing(42, "non-zero padding");
        assert_eq!(
            err.to_string(),
            "framing corruption at bit 42: non-zero padding"
        );
        assert!(err.is_corruption());
    }

    #[test]
    fn test_io_error_is_not_corruption() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: CodecError = io.into();
        assert!(!err.is_corruption());
        assert!(matches!(err, CodecError::Io(_)));
    }
}
