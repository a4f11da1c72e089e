use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use auth_service::config::Config;
use auth_service::handlers;
use auth_service::service::{AuthService, TokenPolicy};
use auth_service::store::AuthStore;
use kv_store::MemoryStore;
use registry_client::{HeartbeatTask, RegisterRequest, RegistryClient};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use token_security::SigningKeySet;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(anyhow::Error::msg)?;

    let store = AuthStore::new(Arc::new(MemoryStore::new()));
    let keys = Arc::new(
        SigningKeySet::generate(Duration::from_secs(config.tokens.key_grace_secs))
            .context("failed to generate signing key")?,
    );
    let policy = TokenPolicy {
        access_ttl_secs: config.tokens.access_ttl_secs,
        refresh_ttl_secs: config.tokens.refresh_ttl_secs,
        guest_ttl_secs: config.tokens.guest_ttl_secs,
    };
    let auth = Arc::new(AuthService::new(store, keys.clone(), policy).context("auth init")?);

    if let Some(interval_secs) = config.tokens.key_rotation_interval_secs {
        let rotation_keys = keys.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match rotation_keys.rotate() {
                    Ok(key_id) => info!(%key_id, "Scheduled signing key rotation"),
                    Err(e) => warn!(error = %e, "Scheduled key rotation failed"),
                }
            }
        });
    }

    if let Some(registry) = &config.registry {
        let client = RegistryClient::new(&registry.url, Duration::from_secs(5))
            .context("registry client init")?;
        let registration = RegisterRequest {
            service_name: "auth-service".to_string(),
            instance_id: format!("auth-{}", uuid::Uuid::new_v4()),
            address: registry.advertised_address.clone(),
            metadata: HashMap::new(),
            lease_duration: registry.lease_duration_secs,
        };
        HeartbeatTask::new(
            client,
            registration,
            Duration::from_secs(registry.renew_interval_secs),
        )
        .spawn();
    }

    let bind = (config.app.host.clone(), config.app.port);
    info!(host = %config.app.host, port = config.app.port, "Starting auth service");

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(auth.clone()))
            .configure(handlers::configure)
    })
    .bind(bind)
    .context("failed to bind auth listener")?
    .run()
    .await
    .context("auth server terminated")
}
