/// Configuration for the auth service, loaded from environment variables.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub tokens: TokenConfig,
    pub registry: Option<RegistryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Access token lifetime in seconds
    pub access_ttl_secs: i64,
    /// Refresh token lifetime in seconds
    pub refresh_ttl_secs: i64,
    /// Guest access token lifetime in seconds
    pub guest_ttl_secs: i64,
    /// How long a retiring key still verifies tokens, in seconds
    pub key_grace_secs: u64,
    /// When set, rotate the signing key automatically on this cadence
    pub key_rotation_interval_secs: Option<u64>,
}

/// Present only when the service should announce itself to the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub url: String,
    /// Address other services should reach us at, host:port
    pub advertised_address: String,
    pub lease_duration_secs: u64,
    pub renew_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let registry = match std::env::var("AUTH_REGISTRY_URL") {
            Ok(url) => Some(RegistryConfig {
                url,
                advertised_address: std::env::var("AUTH_ADVERTISED_ADDRESS")
                    .map_err(|_| "AUTH_ADVERTISED_ADDRESS required with AUTH_REGISTRY_URL".to_string())?,
                lease_duration_secs: env_parse("AUTH_LEASE_DURATION_SECS", 30)?,
                renew_interval_secs: env_parse("AUTH_RENEW_INTERVAL_SECS", 10)?,
            }),
            Err(_) => None,
        };

        Ok(Config {
            app: AppConfig {
                host: std::env::var("AUTH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_parse("AUTH_PORT", 8090)?,
            },
            tokens: TokenConfig {
                access_ttl_secs: env_parse("AUTH_ACCESS_TTL_SECS", 900)?,
                refresh_ttl_secs: env_parse("AUTH_REFRESH_TTL_SECS", 14 * 24 * 3600)?,
                guest_ttl_secs: env_parse("AUTH_GUEST_TTL_SECS", 900)?,
                key_grace_secs: env_parse("AUTH_KEY_GRACE_SECS", 1800)?,
                key_rotation_interval_secs: match std::env::var("AUTH_KEY_ROTATION_INTERVAL_SECS") {
                    Ok(raw) => Some(raw.parse().map_err(|_| {
                        format!("invalid value for AUTH_KEY_ROTATION_INTERVAL_SECS: {raw}")
                    })?),
                    Err(_) => None,
                },
            },
            registry,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| format!("invalid value for {name}: {raw}")),
        Err(_) => Ok(default),
    }
}
