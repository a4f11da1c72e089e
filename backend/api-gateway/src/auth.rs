//! Bearer-token enforcement for protected routes.
//!
//! Verification is local against a cached set of the auth service's public
//! keys. The cache is refreshed on a bounded interval, so a freshly rotated
//! key becomes verifiable within one refresh; the retiring key keeps
//! verifying through its grace window on the auth side.

use crate::config::{AuthConfig, RouteConfig};
use crate::error::{GatewayError, Result};
use std::sync::Arc;
use std::time::Duration;
use token_security::{Claims, PublicKeyEntry, VerifyingKeySet};
use tracing::{debug, warn};

pub struct KeyCache {
    keys: VerifyingKeySet,
    keys_url: Option<String>,
    http: reqwest::Client,
}

impl KeyCache {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let keys = match &config.static_keys {
            Some(raw) => {
                let entries: Vec<PublicKeyEntry> = serde_json::from_str(raw)
                    .map_err(|e| GatewayError::Internal(format!("bad static key config: {e}")))?;
                VerifyingKeySet::from_entries(&entries)
                    .map_err(|e| GatewayError::Internal(e.to_string()))?
            }
            None => VerifyingKeySet::empty(),
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        Ok(Self {
            keys,
            keys_url: config.keys_url.clone(),
            http,
        })
    }

    /// Pull the published key list and swap it in. A failed poll keeps the
    /// cached keys; tokens stay verifiable with what we have.
    pub async fn refresh(&self) {
        let Some(url) = &self.keys_url else { return };

        let fetched = async {
            let entries: Vec<PublicKeyEntry> =
                self.http.get(url).send().await?.error_for_status()?.json().await?;
            Ok::<_, reqwest::Error>(entries)
        }
        .await;

        match fetched {
            Ok(entries) => match self.keys.replace(&entries) {
                Ok(()) => debug!(keys = entries.len(), "Verifying keys refreshed"),
                Err(e) => warn!(error = %e, "Published key list was unusable"),
            },
            Err(e) => warn!(error = %e, "Key poll failed, keeping cached keys"),
        }
    }

    pub fn spawn_refresh(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        })
    }

    /// Enforce the route's protection policy. Public routes pass through
    /// with no claims; protected routes need a verifiable bearer token
    /// carrying every required scope.
    pub fn authorize(
        &self,
        authorization: Option<&str>,
        route: &RouteConfig,
    ) -> Result<Option<Claims>> {
        if !route.protected {
            return Ok(None);
        }

        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .filter(|t| !t.is_empty())
            .ok_or(GatewayError::MissingToken)?;

        let claims = self.keys.verify(token)?;

        for scope in &route.required_scopes {
            if !claims.has_role(scope) {
                return Err(GatewayError::InsufficientScope);
            }
        }

        Ok(Some(claims))
    }

    #[cfg(test)]
    pub fn with_entries(entries: &[PublicKeyEntry]) -> Self {
        Self {
            keys: VerifyingKeySet::from_entries(entries).unwrap(),
            keys_url: None,
            http: reqwest::Client::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use token_security::SigningKeySet;

    fn protected_route(scopes: &[&str]) -> RouteConfig {
        RouteConfig {
            prefix: "/api/v1/content".to_string(),
            service: "content-service".to_string(),
            protected: true,
            required_scopes: scopes.iter().map(|s| s.to_string()).collect(),
            strip_prefix: false,
        }
    }

    fn signer() -> SigningKeySet {
        SigningKeySet::generate(Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn test_public_route_passes_without_token() {
        let cache = KeyCache::with_entries(&[]);
        let route = RouteConfig {
            protected: false,
            ..protected_route(&[])
        };
        assert!(cache.authorize(None, &route).unwrap().is_none());
    }

    #[test]
    fn test_missing_token_on_protected_route() {
        let cache = KeyCache::with_entries(&[]);
        assert!(matches!(
            cache.authorize(None, &protected_route(&[])),
            Err(GatewayError::MissingToken)
        ));
        assert!(matches!(
            cache.authorize(Some("Basic abc"), &protected_route(&[])),
            Err(GatewayError::MissingToken)
        ));
    }

    #[test]
    fn test_valid_token_yields_claims() {
        let signer = signer();
        let cache = KeyCache::with_entries(&signer.public_keys());
        let token = signer
            .sign(&Claims::new("user-1", vec!["user".into()], 900))
            .unwrap();

        let claims = cache
            .authorize(Some(&format!("Bearer {token}")), &protected_route(&[]))
            .unwrap()
            .unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn test_expired_token_is_unauthorized() {
        let signer = signer();
        let cache = KeyCache::with_entries(&signer.public_keys());
        let token = signer
            .sign(&Claims::new("user-1", vec!["user".into()], -60))
            .unwrap();

        assert!(matches!(
            cache.authorize(Some(&format!("Bearer {token}")), &protected_route(&[])),
            Err(GatewayError::Token(token_security::TokenError::Expired))
        ));
    }

    #[test]
    fn test_missing_scope_is_forbidden() {
        let signer = signer();
        let cache = KeyCache::with_entries(&signer.public_keys());
        let token = signer
            .sign(&Claims::new("user-1", vec!["user".into()], 900))
            .unwrap();

        assert!(matches!(
            cache.authorize(
                Some(&format!("Bearer {token}")),
                &protected_route(&["creator"])
            ),
            Err(GatewayError::InsufficientScope)
        ));
    }
}
