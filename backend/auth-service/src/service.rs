//! Core authentication flows: login, refresh, revoke, key rotation.

use crate::error::{AuthError, Result};
use crate::security::password::{hash_password, verify_password};
use crate::store::{AuthStore, RefreshTokenRecord, Role, UserRecord};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use token_security::{Claims, PublicKeyEntry, SigningKeySet};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TokenPolicy {
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub guest_ttl_secs: i64,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            access_ttl_secs: 900,
            refresh_ttl_secs: 14 * 24 * 3600,
            guest_ttl_secs: 900,
        }
    }
}

/// Tokens returned to a successfully authenticated caller.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

pub struct AuthService {
    store: AuthStore,
    keys: Arc<SigningKeySet>,
    policy: TokenPolicy,
    /// Hash of a random throwaway password, verified against when the user
    /// is unknown so both failure paths cost the same.
    dummy_hash: String,
}

impl AuthService {
    pub fn new(store: AuthStore, keys: Arc<SigningKeySet>, policy: TokenPolicy) -> Result<Self> {
        let dummy_hash = hash_password(&Uuid::new_v4().to_string())?;
        Ok(Self {
            store,
            keys,
            policy,
            dummy_hash,
        })
    }

    /// Create a credential and return an initial token pair.
    pub async fn register(&self, user_id: &str, password: &str, role: Role) -> Result<TokenPair> {
        if self.store.get_user(user_id).await?.is_some() {
            return Err(AuthError::UserAlreadyExists);
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("hash task failed: {e}")))??;

        let user = UserRecord {
            user_id: user_id.to_string(),
            password_hash,
            role,
            active: true,
            created_at: Utc::now(),
            last_login: None,
        };
        self.store.put_user(&user).await?;
        info!(user_id, role = role.as_str(), "User registered");

        self.mint_pair(&user).await
    }

    /// Verify credentials and mint a token pair. Unknown user, inactive user
    /// and wrong password all take the same code path, including a dummy
    /// hash verification, and return the same error.
    pub async fn login(&self, user_id: &str, password: &str) -> Result<TokenPair> {
        let user = self.store.get_user(user_id).await?;
        let candidate_hash = match &user {
            Some(u) if u.active => u.password_hash.clone(),
            _ => self.dummy_hash.clone(),
        };

        let password = password.to_string();
        let matched =
            tokio::task::spawn_blocking(move || verify_password(&password, &candidate_hash))
                .await
                .map_err(|e| AuthError::Internal(format!("verify task failed: {e}")))??;

        let mut user = match user {
            Some(u) if u.active && matched => u,
            _ => {
                warn!(user_id, "Login rejected");
                return Err(AuthError::InvalidCredentials);
            }
        };

        user.last_login = Some(Utc::now());
        self.store.put_user(&user).await?;
        info!(user_id, "Login succeeded");

        self.mint_pair(&user).await
    }

    /// Exchange a live refresh token for a new access token. The refresh
    /// token itself is not rotated.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let record = self
            .store
            .get_refresh_token(refresh_token)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        if record.revoked {
            warn!(subject = %record.subject, "Refresh attempted with revoked token");
            return Err(AuthError::RefreshTokenRevoked);
        }
        if record.expires_at <= Utc::now() {
            return Err(AuthError::RefreshTokenExpired);
        }

        let claims = Claims::new(
            record.subject.clone(),
            record.roles.clone(),
            self.policy.access_ttl_secs,
        );
        Ok(TokenPair {
            access_token: self.keys.sign(&claims)?,
            refresh_token: None,
            token_type: "Bearer",
            expires_in: self.policy.access_ttl_secs,
        })
    }

    /// Mark a refresh token revoked. Idempotent; unknown tokens are ignored.
    pub async fn revoke(&self, refresh_token: &str) -> Result<()> {
        if let Some(mut record) = self.store.get_refresh_token(refresh_token).await? {
            if !record.revoked {
                record.revoked = true;
                self.store.put_refresh_token(&record).await?;
                info!(subject = %record.subject, "Refresh token revoked");
            }
        }
        Ok(())
    }

    /// Short-lived anonymous access token; no refresh token.
    pub fn guest_token(&self) -> Result<TokenPair> {
        let claims = Claims::new(
            format!("guest-{}", Uuid::new_v4()),
            vec![Role::Guest.as_str().to_string()],
            self.policy.guest_ttl_secs,
        );
        Ok(TokenPair {
            access_token: self.keys.sign(&claims)?,
            refresh_token: None,
            token_type: "Bearer",
            expires_in: self.policy.guest_ttl_secs,
        })
    }

    pub fn rotate_signing_key(&self) -> Result<String> {
        Ok(self.keys.rotate()?)
    }

    pub fn public_keys(&self) -> Vec<PublicKeyEntry> {
        self.keys.public_keys()
    }

    async fn mint_pair(&self, user: &UserRecord) -> Result<TokenPair> {
        let roles = vec![user.role.as_str().to_string()];
        let claims = Claims::new(user.user_id.clone(), roles.clone(), self.policy.access_ttl_secs);
        let access_token = self.keys.sign(&claims)?;

        let record = RefreshTokenRecord {
            token_id: Uuid::new_v4().to_string(),
            subject: user.user_id.clone(),
            roles,
            issued_at: Utc::now(),
            expires_at: Utc::now() + ChronoDuration::seconds(self.policy.refresh_ttl_secs),
            revoked: false,
        };
        self.store.put_refresh_token(&record).await?;

        Ok(TokenPair {
            access_token,
            refresh_token: Some(record.token_id),
            token_type: "Bearer",
            expires_in: self.policy.access_ttl_secs,
        })
    }
}
