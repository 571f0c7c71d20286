//! Hello authentication.
//!
//! Two modes are supported:
//!
//! - **Static**: any non-empty token is accepted and the token itself is the
//!   user id. There is no real credential check in this mode.
//! - **Signed**: the token is `userID:expiryUnixSeconds:hexMAC` where
//!   `hexMAC = hex(HMAC-SHA256(secret, userID + "|" + expiryUnixSeconds))`.
//!
//! In both modes a hello that names a `user_id` different from the one the
//! token proves is rejected.

use crate::config::{AuthConfig, AuthMode};
use crate::error::AuthError;
use clip_types::{Hello, UserId};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Validates hello credentials and yields the authenticated user.
#[derive(Clone)]
pub enum Authenticator {
    /// Token is the identity.
    Static,
    /// HMAC-signed, expiring tokens.
    Signed {
        /// HMAC key.
        secret: Vec<u8>,
    },
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => f.write_str("Authenticator::Static"),
            Self::Signed { .. } => f
                .debug_struct("Authenticator::Signed")
                .field("secret", &"[REDACTED]")
                .finish(),
        }
    }
}

impl Authenticator {
    /// Build the authenticator selected by configuration.
    pub fn from_config(config: &AuthConfig) -> Self {
        match config.mode {
            AuthMode::Static => Self::Static,
            AuthMode::Signed => Self::Signed {
                secret: config.secret.as_bytes().to_vec(),
            },
        }
    }

    /// Authenticate a hello against the current wall clock.
    pub fn authenticate(&self, hello: &Hello) -> Result<UserId, AuthError> {
        self.authenticate_at(hello, unix_now())
    }

    /// Authenticate a hello as of `now` (unix seconds).
    pub fn authenticate_at(&self, hello: &Hello, now: i64) -> Result<UserId, AuthError> {
        let user = match self {
            Self::Static => static_identity(&hello.token)?,
            Self::Signed { secret } => verify_token(&hello.token, secret, now)?,
        };

        if !hello.user_id.is_empty() && hello.user_id != user.as_str() {
            return Err(AuthError::IdentityMismatch {
                claimed: hello.user_id.clone(),
            });
        }

        Ok(user)
    }
}

fn static_identity(token: &str) -> Result<UserId, AuthError> {
    UserId::new(token).map_err(|_| AuthError::EmptyToken)
}

/// Verify a signed token and return the user it names.
pub fn verify_token(token: &str, secret: &[u8], now: i64) -> Result<UserId, AuthError> {
    if token.is_empty() {
        return Err(AuthError::EmptyToken);
    }

    let parts: Vec<&str> = token.split(':').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(AuthError::MalformedToken);
    }
    let (user, expiry_str, mac_hex) = (parts[0], parts[1], parts[2]);

    let expiry: i64 = expiry_str.parse().map_err(|_| AuthError::InvalidExpiry)?;
    if now > expiry {
        return Err(AuthError::Expired { expiry });
    }

    let signature = hex::decode(mac_hex).map_err(|_| AuthError::BadSignature)?;
    let mut mac = new_mac(secret);
    mac.update(signing_input(user, expiry_str).as_bytes());
    // Constant-time comparison via hmac crate's verify_slice
    mac.verify_slice(&signature)
        .map_err(|_| AuthError::BadSignature)?;

    UserId::new(user).map_err(|_| AuthError::MalformedToken)
}

/// Issue a signed token for `user` valid until `expiry` (unix seconds).
pub fn sign_token(user: &str, expiry: i64, secret: &[u8]) -> String {
    let expiry_str = expiry.to_string();
    let mut mac = new_mac(secret);
    mac.update(signing_input(user, &expiry_str).as_bytes());
    let sum = mac.finalize().into_bytes();
    format!("{}:{}:{}", user, expiry_str, hex::encode(sum))
}

fn signing_input(user: &str, expiry: &str) -> String {
    format!("{}|{}", user, expiry)
}

fn new_mac(secret: &[u8]) -> HmacSha256 {
    <HmacSha256 as Mac>::new_from_slice(secret).expect("HMAC accepts any key length")
}

/// Current wall clock in unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"s3cr3t";
    const NOW: i64 = 1_700_000_000;

    fn signed() -> Authenticator {
        Authenticator::Signed {
            secret: SECRET.to_vec(),
        }
    }

    fn hello(token: &str, user: &str) -> Hello {
        Hello::new(token, user, "A")
    }

    #[test]
    fn static_mode_uses_token_as_identity() {
        let user = Authenticator::Static
            .authenticate_at(&hello("u1", "u1"), NOW)
            .unwrap();
        assert_eq!(user.as_str(), "u1");

        let user = Authenticator::Static
            .authenticate_at(&hello("u2", ""), NOW)
            .unwrap();
        assert_eq!(user.as_str(), "u2");
    }

    #[test]
    fn static_mode_rejects_empty_token() {
        assert_eq!(
            Authenticator::Static.authenticate_at(&hello("", ""), NOW),
            Err(AuthError::EmptyToken)
        );
    }

    #[test]
    fn identity_mismatch_is_rejected() {
        assert!(matches!(
            Authenticator::Static.authenticate_at(&hello("u1", "u2"), NOW),
            Err(AuthError::IdentityMismatch { .. })
        ));
        let token = sign_token("u1", NOW + 60, SECRET);
        assert!(matches!(
            signed().authenticate_at(&hello(&token, "mallory"), NOW),
            Err(AuthError::IdentityMismatch { .. })
        ));
    }

    #[test]
    fn valid_signed_token_is_accepted() {
        let token = sign_token("u1", NOW + 60, SECRET);
        let user = signed().authenticate_at(&hello(&token, "u1"), NOW).unwrap();
        assert_eq!(user.as_str(), "u1");
        // user_id may be omitted when the token carries it
        let user = signed().authenticate_at(&hello(&token, ""), NOW).unwrap();
        assert_eq!(user.as_str(), "u1");
    }

    #[test]
    fn token_is_valid_through_its_expiry_second() {
        let token = sign_token("u1", NOW, SECRET);
        assert!(verify_token(&token, SECRET, NOW).is_ok());
        assert_eq!(
            verify_token(&token, SECRET, NOW + 1),
            Err(AuthError::Expired { expiry: NOW })
        );
    }

    #[test]
    fn forged_mac_is_rejected() {
        let token = sign_token("u1", NOW + 60, b"other");
        assert_eq!(verify_token(&token, SECRET, NOW), Err(AuthError::BadSignature));

        let mut tampered = sign_token("u1", NOW + 60, SECRET);
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        assert_eq!(verify_token(&tampered, SECRET, NOW), Err(AuthError::BadSignature));

        let not_hex = format!("u1:{}:zz", NOW + 60);
        assert_eq!(verify_token(&not_hex, SECRET, NOW), Err(AuthError::BadSignature));
    }

    #[test]
    fn changing_user_invalidates_mac() {
        let token = sign_token("u1", NOW + 60, SECRET);
        let forged = token.replacen("u1", "u2", 1);
        assert_eq!(verify_token(&forged, SECRET, NOW), Err(AuthError::BadSignature));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for token in ["u1", "u1:123", "u1::abcd", ":123:abcd", "a:b:c:d", "u1:123:"] {
            assert_eq!(
                verify_token(token, SECRET, NOW),
                Err(AuthError::MalformedToken),
                "{token:?}"
            );
        }
        assert_eq!(verify_token("", SECRET, NOW), Err(AuthError::EmptyToken));
        assert_eq!(
            verify_token("u1:soon:abcd", SECRET, NOW),
            Err(AuthError::InvalidExpiry)
        );
    }

    #[test]
    fn token_format_matches_wire_contract() {
        let token = sign_token("u1", 42, SECRET);
        let parts: Vec<&str> = token.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "u1");
        assert_eq!(parts[1], "42");
        assert_eq!(parts[2].len(), 64);
    }

    #[test]
    fn debug_redacts_secret() {
        let debug = format!("{:?}", signed());
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("s3cr3t"));
    }
}
