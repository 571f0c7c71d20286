//! Error types for clipsync-relay.

use clip_types::WireError;

/// WebSocket close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// WebSocket close code for a protocol error.
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
/// WebSocket close code for a policy violation.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Main error type for clipsync-relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Blob storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Authentication error.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end a session before or during the handshake.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The first message was not a hello.
    #[error("session not authenticated: HELLO required first")]
    HelloRequired,

    /// No HELLO arrived within the configured timeout.
    #[error("HELLO timeout")]
    HelloTimeout,

    /// The frame could not be decoded as an envelope.
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] WireError),

    /// The hello carried an unusable device id.
    #[error("invalid device id: {0:?}")]
    InvalidDeviceId(String),

    /// The transport failed.
    #[error("connection error: {0}")]
    Connection(String),
}

impl ProtocolError {
    /// Close code sent to the peer when this error ends the session.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::InvalidDeviceId(_) => CLOSE_POLICY_VIOLATION,
            _ => CLOSE_PROTOCOL_ERROR,
        }
    }

    /// Short close reason sent to the peer.
    pub fn close_reason(&self) -> &'static str {
        match self {
            Self::HelloRequired | Self::HelloTimeout => "need hello",
            Self::InvalidFrame(_) => "invalid frame",
            Self::InvalidDeviceId(_) => "need device_id",
            Self::Connection(_) => "connection error",
        }
    }
}

/// Credential rejections. Every variant closes the session with 1008.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No token was presented.
    #[error("empty token")]
    EmptyToken,

    /// Signed token does not have the `user:expiry:mac` shape.
    #[error("malformed token")]
    MalformedToken,

    /// Expiry field is not a unix timestamp.
    #[error("invalid token expiry")]
    InvalidExpiry,

    /// Token expiry is in the past.
    #[error("token expired at {expiry}")]
    Expired {
        /// Expiry in unix seconds.
        expiry: i64,
    },

    /// MAC does not match the payload.
    #[error("invalid token signature")]
    BadSignature,

    /// Hello claimed a different user than the token proved.
    #[error("user id mismatch: claimed {claimed:?}")]
    IdentityMismatch {
        /// The user id sent in the hello.
        claimed: String,
    },
}

/// Why a clip was structurally rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Inline payload length differs from the declared size.
    #[error("declared size {declared} does not match {actual} inline bytes")]
    SizeMismatch {
        /// Declared size.
        declared: i64,
        /// Actual inline byte count.
        actual: usize,
    },

    /// Inline payload exceeds the inline limit.
    #[error("inline payload of {size} bytes exceeds {limit}")]
    InlineTooLarge {
        /// Inline byte count.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Neither inline data nor an upload reference.
    #[error("clip carries neither data nor upload_url")]
    MissingPayload,

    /// Upload reference with a non-positive size.
    #[error("upload_url clip declares non-positive size {0}")]
    NonPositiveSize(i64),
}

/// Why an authenticated session's clip was dropped. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DropReason {
    /// The clip failed structural validation.
    #[error("invalid clip: {0}")]
    Invalid(#[from] ValidationError),

    /// The msg_id was seen recently for this user.
    #[error("duplicate msg_id {0:?}")]
    Duplicate(String),

    /// The device's token bucket is empty.
    #[error("rate limited")]
    RateLimited,
}

/// A single target write that failed during fan-out.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The write did not complete within the per-write timeout.
    #[error("write timed out")]
    Timeout,

    /// The target connection is gone.
    #[error("connection closed: {0}")]
    Closed(String),

    /// The frame could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(#[from] WireError),
}

/// Blob store errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blob not found.
    #[error("blob not found: {id}")]
    NotFound {
        /// The blob id that was not found.
        id: String,
    },

    /// Blob id is not 32 lowercase hex characters.
    #[error("invalid blob id: {id:?}")]
    InvalidId {
        /// The rejected id.
        id: String,
    },

    /// Upload content type is not in the allow list.
    #[error("unsupported media type: {mime}")]
    UnsupportedMediaType {
        /// The rejected content type.
        mime: String,
    },
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
