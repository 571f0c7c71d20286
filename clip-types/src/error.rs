//! Error types for the clipsync wire format.

use thiserror::Error;

/// Errors that can occur while encoding, decoding or parsing wire values.
#[derive(Debug, Error)]
pub enum WireError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Device identifier is empty, too long or contains forbidden characters
    #[error("invalid device id: {0:?}")]
    InvalidDeviceId(String),

    /// User identifier is empty
    #[error("empty user id")]
    EmptyUserId,
}
