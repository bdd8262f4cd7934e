//! Error types for the Slidegate engine.

use thiserror::Error;

use crate::ratelimit::CodecError;
use crate::storage::StoreError;

/// Main error type for Slidegate operations.
///
/// Exceeding a quota is not an error; see [`crate::ratelimit::Decision`].
#[derive(Error, Debug)]
pub enum SlidegateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller could not be identified
    #[error("Identity extraction failed: {0}")]
    Identity(String),

    /// The counter store failed
    #[error("Storage {op} failed for key {key}: {source}")]
    Storage {
        op: &'static str,
        key: String,
        #[source]
        source: StoreError,
    },

    /// A stored counter record could not be decoded
    #[error("Corrupt counter record for key {key}: {source}")]
    Codec {
        key: String,
        #[source]
        source: CodecError,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SlidegateError {
    /// True when the caller could not be identified (a client-trust failure).
    pub fn is_identity(&self) -> bool {
        matches!(self, SlidegateError::Identity(_))
    }

    /// True when the failure should look like "service unavailable" to the caller.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            SlidegateError::Storage { .. } | SlidegateError::Codec { .. }
        )
    }
}

/// Result type alias for Slidegate operations.
pub type Result<T> = std::result::Result<T, SlidegateError>;
