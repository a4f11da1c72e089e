//! Credential and refresh-token records over the key-value storage seam.
//!
//! The auth authority never talks to a concrete database; everything goes
//! through [`KeyValueStore`], so the backing store is swappable.

use crate::error::{AuthError, Result};
use chrono::{DateTime, Utc};
use kv_store::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const NS_CREDENTIALS: &str = "credentials";
const NS_REFRESH_TOKENS: &str = "refresh_tokens";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Creator,
    Admin,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Creator => "creator",
            Role::Admin => "admin",
            Role::Guest => "guest",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    /// Argon2id PHC string; embeds the hash parameters
    pub password_hash: String,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Server-side state of one refresh token, keyed by its opaque token id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub token_id: String,
    pub subject: String,
    pub roles: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

#[derive(Clone)]
pub struct AuthStore {
    inner: Arc<dyn KeyValueStore>,
}

impl AuthStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        let raw = self.inner.get(NS_CREDENTIALS, user_id).await?;
        raw.map(|bytes| decode(&bytes)).transpose()
    }

    pub async fn put_user(&self, user: &UserRecord) -> Result<()> {
        self.inner
            .put(NS_CREDENTIALS, &user.user_id, encode(user)?)
            .await?;
        Ok(())
    }

    pub async fn get_refresh_token(&self, token_id: &str) -> Result<Option<RefreshTokenRecord>> {
        let raw = self.inner.get(NS_REFRESH_TOKENS, token_id).await?;
        raw.map(|bytes| decode(&bytes)).transpose()
    }

    pub async fn put_refresh_token(&self, record: &RefreshTokenRecord) -> Result<()> {
        self.inner
            .put(NS_REFRESH_TOKENS, &record.token_id, encode(record)?)
            .await?;
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| AuthError::Internal(format!("serialization failed: {e}")))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| AuthError::Internal(format!("stored record is corrupt: {e}")))
}
