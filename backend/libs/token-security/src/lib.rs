//! Token signing and verification with rotating Ed25519 key sets.
//!
//! The signing side (auth authority) owns a [`SigningKeySet`]: exactly one
//! ACTIVE key used for new signatures, plus RETIRING keys that stay valid for
//! verification during a grace window after rotation. The verifying side
//! (gateway) holds a [`VerifyingKeySet`] built from the published public
//! halves and never sees private key material.
//!
//! Tokens are standard three-segment JWS: the header carries the algorithm
//! and `kid`, the payload carries subject, roles, issued-at, expiry and a
//! unique token id.

mod keys;
mod verify;

pub use keys::{KeyState, PublicKeyEntry, SigningKeySet};
pub use verify::VerifyingKeySet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claim set embedded in every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Roles/scopes granted to the subject
    pub roles: Vec<String>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token identifier
    pub jti: String,
}

impl Claims {
    /// Build a claim set expiring `ttl_secs` from now. Negative TTLs produce
    /// an already-expired token (used by expiry tests).
    pub fn new(sub: impl Into<String>, roles: Vec<String>, ttl_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: sub.into(),
            roles,
            iat: now,
            exp: now + ttl_secs,
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("No bearer token supplied")]
    Missing,
    #[error("Token signature is invalid")]
    InvalidSignature,
    #[error("Token has expired")]
    Expired,
    #[error("Token references unknown signing key {0}")]
    UnknownKey(String),
    #[error("Token is malformed")]
    Malformed,
    #[error("Key operation failed: {0}")]
    Internal(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) => {
                TokenError::Malformed
            }
            _ => TokenError::InvalidSignature,
        }
    }
}
