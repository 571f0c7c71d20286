//! Envelope - the wire format wrapper for all clipsync messages.

use serde::{Deserialize, Serialize};

use crate::messages::null_as_default;
use crate::{Clip, Hello, WireError};

/// Message type discriminator carried in the envelope's `type` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Session handshake
    Hello,
    /// Clipboard change
    Clip,
    /// Any other or missing discriminator; decoded so it can be ignored, never sent
    #[default]
    #[serde(other)]
    Unknown,
}

/// The envelope wraps every message exchanged over a session.
///
/// Exactly one of `hello` / `clip` is meaningful for a given `kind`; the
/// other is tolerated and ignored. Missing or `null` fields decode as empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type discriminator
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: MessageType,
    /// Sender device id, assigned by the relay on broadcast
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Handshake payload (type = hello)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hello: Option<Hello>,
    /// Clip payload (type = clip)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip: Option<Clip>,
}

impl Envelope {
    /// Wrap a handshake.
    pub fn hello(hello: Hello) -> Self {
        Self {
            kind: MessageType::Hello,
            from: None,
            hello: Some(hello),
            clip: None,
        }
    }

    /// Wrap a clip.
    pub fn clip(clip: Clip) -> Self {
        Self {
            kind: MessageType::Clip,
            from: None,
            hello: None,
            clip: Some(clip),
        }
    }

    /// Stamp the sender device id.
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }

    /// Deserialize from a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(WireError::Deserialization)
    }

    /// Deserialize from raw JSON bytes (binary frames).
    pub fn from_slice(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(WireError::Deserialization)
    }

    /// The handshake payload if this is a well-formed hello.
    pub fn as_hello(&self) -> Option<&Hello> {
        match self.kind {
            MessageType::Hello => self.hello.as_ref(),
            _ => None,
        }
    }

    /// The clip payload if this is a well-formed clip, taking ownership.
    pub fn into_clip(self) -> Option<Clip> {
        match self.kind {
            MessageType::Clip => self.clip,
            _ => None,
        }
    }
}
