//! Verification-only key set for services that never sign.
//!
//! Built from the [`PublicKeyEntry`] list the auth authority publishes;
//! replaced wholesale on each key refresh so request-path verification never
//! takes a write lock.

use crate::keys::{KeyState, PublicKeyEntry};
use crate::{Claims, TokenError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use std::sync::Arc;

struct VerifyEntry {
    key_id: String,
    decoding: DecodingKey,
}

#[derive(Default)]
pub struct VerifyingKeySet {
    keys: RwLock<Arc<Vec<VerifyEntry>>>,
}

impl VerifyingKeySet {
    /// An empty set; every verification fails until keys are loaded.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[PublicKeyEntry]) -> Result<Self, TokenError> {
        let set = Self::empty();
        set.replace(entries)?;
        Ok(set)
    }

    /// Atomically swap in a freshly published key list. ACTIVE keys sort
    /// first; RETIRED entries are ignored.
    pub fn replace(&self, entries: &[PublicKeyEntry]) -> Result<(), TokenError> {
        let mut ordered: Vec<&PublicKeyEntry> = entries
            .iter()
            .filter(|e| e.state != KeyState::Retired)
            .collect();
        ordered.sort_by_key(|e| match e.state {
            KeyState::Active => 0,
            KeyState::Retiring => 1,
            KeyState::Retired => 2,
        });

        let mut next = Vec::with_capacity(ordered.len());
        for entry in ordered {
            let raw = BASE64
                .decode(&entry.public_key)
                .map_err(|e| TokenError::Internal(format!("bad public key encoding: {e}")))?;
            next.push(VerifyEntry {
                key_id: entry.key_id.clone(),
                decoding: DecodingKey::from_ed_der(&raw),
            });
        }

        *self.keys.write() = Arc::new(next);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    /// Verify signature and expiry against the cached keys, resolved by the
    /// token's `kid` header.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let header = decode_header(token).map_err(TokenError::from)?;
        let kid = header.kid.ok_or(TokenError::Malformed)?;

        let keys = self.keys.read().clone();
        let entry = keys
            .iter()
            .find(|k| k.key_id == kid)
            .ok_or_else(|| TokenError::UnknownKey(kid.clone()))?;

        let validation = Validation::new(Algorithm::EdDSA);
        let data = decode::<Claims>(token, &entry.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SigningKeySet;
    use std::time::Duration;

    #[test]
    fn test_gateway_verifies_published_keys() {
        let signer = SigningKeySet::generate(Duration::from_secs(60)).unwrap();
        let verifier = VerifyingKeySet::from_entries(&signer.public_keys()).unwrap();

        let token = signer
            .sign(&Claims::new("user-9", vec!["creator".into()], 900))
            .unwrap();
        let claims = verifier.verify(&token).unwrap();
        assert_eq!(claims.sub, "user-9");
    }

    #[test]
    fn test_stale_verifier_rejects_post_rotation_tokens() {
        let signer = SigningKeySet::generate(Duration::from_secs(60)).unwrap();
        let verifier = VerifyingKeySet::from_entries(&signer.public_keys()).unwrap();

        signer.rotate().unwrap();
        let token = signer.sign(&Claims::new("user-9", vec![], 900)).unwrap();

        // Signed by a key the verifier has not fetched yet.
        assert!(matches!(
            verifier.verify(&token),
            Err(TokenError::UnknownKey(_))
        ));

        // After a key refresh both the new and the retiring key verify.
        verifier.replace(&signer.public_keys()).unwrap();
        assert!(verifier.verify(&token).is_ok());
    }

    #[test]
    fn test_empty_set_rejects_everything() {
        let signer = SigningKeySet::generate(Duration::from_secs(60)).unwrap();
        let token = signer.sign(&Claims::new("u", vec![], 900)).unwrap();

        let verifier = VerifyingKeySet::empty();
        assert!(verifier.is_empty());
        assert!(verifier.verify(&token).is_err());
    }
}
