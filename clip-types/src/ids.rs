//! Identity types for clipsync.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::WireError;

/// Default upper bound on the length of a device identifier.
pub const MAX_DEVICE_ID_LEN: usize = 64;

/// The identity a session authenticated as.
///
/// Produced by the relay's authenticator, never trusted from the wire alone.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a UserId, rejecting the empty string.
    pub fn new(value: impl Into<String>) -> Result<Self, WireError> {
        let value = value.into();
        if value.is_empty() {
            return Err(WireError::EmptyUserId);
        }
        Ok(Self(value))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

/// Identifier of one device belonging to a user.
///
/// Restricted to ASCII letters, digits, `-`, `_` and `.` so that it can be
/// embedded in metric keys and log fields without escaping.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Parse a device identifier, enforcing the character set and `max_len`.
    pub fn parse(value: &str, max_len: usize) -> Result<Self, WireError> {
        let valid = !value.is_empty()
            && value.len() <= max_len
            && value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
        if !valid {
            return Err(WireError::InvalidDeviceId(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_accepts_simple_names() {
        for name in ["A", "laptop-01", "phone_2", "desk.top"] {
            let id = DeviceId::parse(name, MAX_DEVICE_ID_LEN).unwrap();
            assert_eq!(id.as_str(), name);
        }
    }

    #[test]
    fn device_id_rejects_bad_names() {
        let too_long = "a".repeat(MAX_DEVICE_ID_LEN + 1);
        for name in ["", " ", "A!", "a b", "dev/1", too_long.as_str()] {
            assert!(
                DeviceId::parse(name, MAX_DEVICE_ID_LEN).is_err(),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn device_id_length_boundary() {
        let exact = "a".repeat(MAX_DEVICE_ID_LEN);
        assert!(DeviceId::parse(&exact, MAX_DEVICE_ID_LEN).is_ok());
        assert!(DeviceId::parse("abcd", 3).is_err());
    }

    #[test]
    fn user_id_rejects_empty() {
        assert!(matches!(UserId::new(""), Err(WireError::EmptyUserId)));
        assert_eq!(UserId::new("u1").unwrap().to_string(), "u1");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = DeviceId::parse("B", MAX_DEVICE_ID_LEN).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"B\"");
        assert_eq!(format!("{:?}", id), "DeviceId(B)");
    }
}
