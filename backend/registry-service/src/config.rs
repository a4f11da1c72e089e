/// Configuration for the registry service, loaded from environment variables.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub registry: RegistryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

/// Policy knobs for lease handling and eviction. None of these are
/// hard-coded; the defaults below apply when the environment is silent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryPolicy {
    /// Expected renewal cadence of well-behaved instances, in seconds.
    /// Used only for self-preservation accounting.
    pub renewal_interval_secs: u64,
    /// How often the eviction sweep runs, in seconds
    pub sweep_interval_secs: u64,
    /// Fraction of expected renewals below which the sweep skips eviction
    pub self_preservation_threshold: f64,
    /// Register instances directly as UP instead of STARTING
    pub start_in_up_state: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Config {
            app: AppConfig {
                host: std::env::var("REGISTRY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_parse("REGISTRY_PORT", 8761)?,
            },
            registry: RegistryPolicy {
                renewal_interval_secs: env_parse("REGISTRY_RENEWAL_INTERVAL_SECS", 10)?,
                sweep_interval_secs: env_parse("REGISTRY_SWEEP_INTERVAL_SECS", 5)?,
                self_preservation_threshold: env_parse(
                    "REGISTRY_SELF_PRESERVATION_THRESHOLD",
                    0.85,
                )?,
                start_in_up_state: env_parse("REGISTRY_START_IN_UP_STATE", false)?,
            },
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
