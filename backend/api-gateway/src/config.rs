/// Configuration for the gateway, loaded from environment variables.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub registry: RegistryConfig,
    pub auth: AuthConfig,
    pub forward: ForwardPolicy,
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub url: String,
    /// Snapshot poll cadence, in seconds. Bounds staleness of the routing view.
    pub refresh_interval_secs: u64,
    /// Set to announce this gateway to the registry; host:port
    pub advertised_address: Option<String>,
    pub lease_duration_secs: u64,
    pub renew_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Full URL of the auth service's published key list,
    /// e.g. `http://auth-host:8090/keys`
    pub keys_url: Option<String>,
    pub key_refresh_interval_secs: u64,
    /// Static key seed, same JSON shape as the auth service's GET /keys.
    /// Lets the gateway verify tokens before the first successful poll.
    pub static_keys: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardPolicy {
    /// Per-attempt deadline for a downstream call, in seconds
    pub attempt_timeout_secs: u64,
    /// Distinct instances tried before giving up
    pub max_attempts: usize,
}

/// One row of the route table. Order matters: it breaks ties between
/// prefixes of equal length.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    pub prefix: String,
    pub service: String,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub required_scopes: Vec<String>,
    /// Remove the matched prefix before forwarding, for services that mount
    /// their endpoints at the root rather than the public path
    #[serde(default)]
    pub strip_prefix: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let routes = match std::env::var("GATEWAY_ROUTES") {
            Ok(raw) => {
                serde_json::from_str(&raw).map_err(|e| format!("invalid GATEWAY_ROUTES: {e}"))?
            }
            Err(_) => default_routes(),
        };
        if routes.is_empty() {
            return Err("GATEWAY_ROUTES must declare at least one route".to_string());
        }

        Ok(Config {
            app: AppConfig {
                host: std::env::var("GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_parse("GATEWAY_PORT", 8080)?,
            },
            registry: RegistryConfig {
                url: std::env::var("GATEWAY_REGISTRY_URL")
                    .unwrap_or_else(|_| "http://localhost:8761".to_string()),
                refresh_interval_secs: env_parse("GATEWAY_SNAPSHOT_REFRESH_SECS", 10)?,
                advertised_address: std::env::var("GATEWAY_ADVERTISED_ADDRESS").ok(),
                lease_duration_secs: env_parse("GATEWAY_LEASE_DURATION_SECS", 30)?,
                renew_interval_secs: env_parse("GATEWAY_RENEW_INTERVAL_SECS", 10)?,
            },
            auth: AuthConfig {
                keys_url: std::env::var("GATEWAY_AUTH_KEYS_URL").ok(),
                key_refresh_interval_secs: env_parse("GATEWAY_KEY_REFRESH_SECS", 60)?,
                static_keys: std::env::var("GATEWAY_JWT_PUBLIC_KEYS").ok(),
            },
            forward: ForwardPolicy {
                attempt_timeout_secs: env_parse("GATEWAY_ATTEMPT_TIMEOUT_SECS", 5)?,
                max_attempts: env_parse("GATEWAY_MAX_FORWARD_ATTEMPTS", 3)?,
            },
            routes,
        })
    }
}

fn default_routes() -> Vec<RouteConfig> {
    vec![
        // The auth service mounts /login, /refresh etc. at its root.
        RouteConfig {
            prefix: "/api/v1/auth".to_string(),
            service: "auth-service".to_string(),
            protected: false,
            required_scopes: vec![],
            strip_prefix: true,
        },
        RouteConfig {
            prefix: "/api/v1/content".to_string(),
            service: "content-service".to_string(),
            protected: true,
            required_scopes: vec![],
            strip_prefix: false,
        },
        RouteConfig {
            prefix: "/api/v1/playback".to_string(),
            service: "playback-service".to_string(),
            protected: true,
            required_scopes: vec![],
            strip_prefix: false,
        },
    ]
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| format!("invalid value for {name}: {raw}")),
        Err(_) => Ok(default),
    }
}
