//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },
}

impl CodecError {
    /// Creates an encoding error.
    pub fn encoding(message: impl ToString) -> Self {
        Self::EncodingFailed {
            message: message.to_string(),
        }
    }

    /// Creates a decoding error.
    pub fn decoding(message: impl ToString) -> Self {
        Self::DecodingFailed {
            message: message.to_string(),
        }
    }
}
