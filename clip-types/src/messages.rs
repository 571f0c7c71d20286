//! Protocol payloads for clipsync.
//!
//! These are carried inside an [`Envelope`](crate::Envelope): a [`Hello`]
//! opens a session, every later message is a [`Clip`].

use serde::{Deserialize, Deserializer, Serialize};

/// MIME type assumed when a clip does not declare one.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Default limit for clip bytes carried inline in a WebSocket frame (64 KiB).
///
/// Larger payloads go through the blob store and travel as an `upload_url`.
pub const MAX_INLINE_BYTES: usize = 64 << 10;

/// Handshake sent by a client as the first message of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Opaque credential, interpreted by the relay's authenticator
    #[serde(default, deserialize_with = "null_as_default")]
    pub token: String,
    /// Claimed identity (may be empty when the token carries it)
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_id: String,
    /// Identifier of the connecting device, unique per user
    #[serde(default, deserialize_with = "null_as_default")]
    pub device_id: String,
}

impl Hello {
    /// Create a hello for the given credential and device.
    pub fn new(
        token: impl Into<String>,
        user_id: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
            device_id: device_id.into(),
        }
    }
}

/// One clipboard change, either inline or by reference to an uploaded blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clip {
    /// Idempotency key (empty disables duplicate suppression for this clip)
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub msg_id: String,
    /// MIME type of the content
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub mime: String,
    /// Declared length of the content in bytes
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: i64,
    /// Inline content, base64 on the wire
    #[serde(
        default,
        with = "base64_bytes",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub data: Vec<u8>,
    /// Reference to content held by the blob store
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub upload_url: String,
}

impl Clip {
    /// Create an inline clip whose declared size matches the payload.
    pub fn inline(msg_id: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            msg_id: msg_id.into(),
            mime: mime.into(),
            size: data.len() as i64,
            data,
            upload_url: String::new(),
        }
    }

    /// Create a clip that points at an uploaded blob.
    pub fn upload(
        msg_id: impl Into<String>,
        mime: impl Into<String>,
        upload_url: impl Into<String>,
        size: i64,
    ) -> Self {
        Self {
            msg_id: msg_id.into(),
            mime: mime.into(),
            size,
            data: Vec::new(),
            upload_url: upload_url.into(),
        }
    }

    /// Whether the clip carries its content inline.
    pub fn is_inline(&self) -> bool {
        !self.data.is_empty()
    }

    /// Whether the declared MIME type is textual.
    pub fn is_text(&self) -> bool {
        self.mime.starts_with("text/")
    }
}

/// Decode an explicit `null` as the field's default value.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Standard (padded) base64 for byte payloads, tolerating `null`.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}
