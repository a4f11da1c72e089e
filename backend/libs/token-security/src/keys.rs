//! Signing key set with ACTIVE → RETIRING → RETIRED rotation.
//!
//! Exactly one key is ACTIVE and signs new tokens. Rotation demotes it to
//! RETIRING; a RETIRING key keeps verifying signatures until its grace
//! window elapses, after which it is purged. The whole set is swapped behind
//! an `Arc` so in-flight verifications keep the set they started with.

use crate::{Claims, TokenError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::RwLock;
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyState {
    Active,
    Retiring,
    Retired,
}

/// Public half of a signing key, as published to verifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyEntry {
    pub key_id: String,
    /// Raw Ed25519 public key, base64-encoded
    pub public_key: String,
    pub state: KeyState,
}

#[derive(Clone)]
struct KeyEntry {
    key_id: String,
    state: KeyState,
    public_raw: Vec<u8>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    retiring_since: Option<DateTime<Utc>>,
}

impl KeyEntry {
    fn generate() -> Result<Self, TokenError> {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|e| TokenError::Internal(format!("key generation failed: {e}")))?;
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
            .map_err(|e| TokenError::Internal(format!("generated key unusable: {e}")))?;

        let public_raw = pair.public_key().as_ref().to_vec();
        Ok(Self {
            key_id: Uuid::new_v4().to_string(),
            state: KeyState::Active,
            encoding: EncodingKey::from_ed_der(pkcs8.as_ref()),
            decoding: DecodingKey::from_ed_der(&public_raw),
            public_raw,
            retiring_since: None,
        })
    }

    fn within_grace(&self, grace: Duration, now: DateTime<Utc>) -> bool {
        match (self.state, self.retiring_since) {
            (KeyState::Active, _) => true,
            (KeyState::Retiring, Some(since)) => {
                let elapsed = (now - since)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                elapsed < grace
            }
            _ => false,
        }
    }
}

/// Ordered key set; the ACTIVE key is always first.
pub struct SigningKeySet {
    keys: RwLock<Arc<Vec<KeyEntry>>>,
    grace: Duration,
}

impl SigningKeySet {
    /// Create a set with a freshly generated ACTIVE key.
    pub fn generate(grace: Duration) -> Result<Self, TokenError> {
        let entry = KeyEntry::generate()?;
        info!(key_id = %entry.key_id, "Generated initial signing key");
        Ok(Self {
            keys: RwLock::new(Arc::new(vec![entry])),
            grace,
        })
    }

    /// Generate a new ACTIVE key, demote the previous one to RETIRING, and
    /// purge RETIRING keys whose grace window has elapsed. Tokens signed
    /// before rotation stay verifiable until that window closes.
    pub fn rotate(&self) -> Result<String, TokenError> {
        let fresh = KeyEntry::generate()?;
        let new_kid = fresh.key_id.clone();
        let now = Utc::now();

        let mut guard = self.keys.write();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.push(fresh);

        for entry in guard.iter() {
            let mut entry = entry.clone();
            match entry.state {
                KeyState::Active => {
                    entry.state = KeyState::Retiring;
                    entry.retiring_since = Some(now);
                    next.push(entry);
                }
                KeyState::Retiring => {
                    if entry.within_grace(self.grace, now) {
                        next.push(entry);
                    } else {
                        info!(key_id = %entry.key_id, "Purging retired signing key");
                    }
                }
                KeyState::Retired => {}
            }
        }

        *guard = Arc::new(next);
        info!(key_id = %new_kid, "Signing key rotated");
        Ok(new_kid)
    }

    /// Sign a claim set with the ACTIVE key; the token header carries its id.
    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let keys = self.keys.read().clone();
        let active = keys
            .first()
            .ok_or_else(|| TokenError::Internal("key set is empty".into()))?;

        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(active.key_id.clone());
        encode(&header, claims, &active.encoding)
            .map_err(|e| TokenError::Internal(format!("token encoding failed: {e}")))
    }

    /// Verify signature and expiry, resolving the key by `kid`. A key past
    /// its grace window behaves exactly like an unknown key.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let header = decode_header(token).map_err(TokenError::from)?;
        let kid = header.kid.ok_or(TokenError::Malformed)?;

        let keys = self.keys.read().clone();
        let now = Utc::now();
        let entry = keys
            .iter()
            .find(|k| k.key_id == kid && k.within_grace(self.grace, now))
            .ok_or_else(|| TokenError::UnknownKey(kid.clone()))?;

        let validation = Validation::new(Algorithm::EdDSA);
        let data = decode::<Claims>(token, &entry.decoding, &validation)?;
        Ok(data.claims)
    }

    pub fn active_key_id(&self) -> String {
        self.keys
            .read()
            .first()
            .map(|k| k.key_id.clone())
            .unwrap_or_default()
    }

    /// Publishable key set: the ACTIVE key and any RETIRING keys still in
    /// their grace window.
    pub fn public_keys(&self) -> Vec<PublicKeyEntry> {
        let now = Utc::now();
        self.keys
            .read()
            .iter()
            .filter(|k| k.within_grace(self.grace, now))
            .map(|k| PublicKeyEntry {
                key_id: k.key_id.clone(),
                public_key: BASE64.encode(&k.public_raw),
                state: k.state,
            })
            .collect()
    }
}
