use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use api_gateway::auth::KeyCache;
use api_gateway::balancer::Balancer;
use api_gateway::config::Config;
use api_gateway::handlers::{self, GatewayState};
use api_gateway::proxy::ForwardEngine;
use api_gateway::routing::RouteTable;
use api_gateway::snapshot::SnapshotCache;
use registry_client::{HeartbeatTask, RegisterRequest, RegistryClient};
use resilience::CircuitBreakerConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(anyhow::Error::msg)?;

    let registry_client = RegistryClient::new(&config.registry.url, Duration::from_secs(5))
        .context("registry client init")?;

    let mut service_names: Vec<String> =
        config.routes.iter().map(|r| r.service.clone()).collect();
    service_names.sort();
    service_names.dedup();

    let snapshot = Arc::new(SnapshotCache::new(registry_client.clone(), service_names));
    let balancer = Arc::new(Balancer::new(CircuitBreakerConfig::default()));

    // Each poll also prunes balancer state for instances that left the
    // registry, so restarted downstreams do not leave entries behind.
    {
        let snapshot = snapshot.clone();
        let balancer = balancer.clone();
        let interval = Duration::from_secs(config.registry.refresh_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                snapshot.refresh().await;
                balancer.prune(&snapshot.view().services);
            }
        });
    }

    let keys = Arc::new(KeyCache::new(&config.auth).map_err(|e| anyhow::anyhow!("{e}"))?);
    keys.clone()
        .spawn_refresh(Duration::from_secs(config.auth.key_refresh_interval_secs));

    if let Some(address) = &config.registry.advertised_address {
        let registration = RegisterRequest {
            service_name: "api-gateway".to_string(),
            instance_id: format!("gateway-{}", uuid::Uuid::new_v4()),
            address: address.clone(),
            metadata: HashMap::new(),
            lease_duration: config.registry.lease_duration_secs,
        };
        HeartbeatTask::new(
            registry_client,
            registration,
            Duration::from_secs(config.registry.renew_interval_secs),
        )
        .spawn();
    }

    // One state shared by every worker: the round-robin counters and
    // breakers must see all traffic, not a per-worker slice.
    let state = web::Data::new(GatewayState {
        routes: RouteTable::new(config.routes.clone()),
        snapshot,
        keys,
        balancer,
        engine: ForwardEngine::new(config.forward.clone())
            .map_err(|e| anyhow::anyhow!("{e}"))?,
    });

    let bind = (config.app.host.clone(), config.app.port);
    info!(host = %config.app.host, port = config.app.port, routes = config.routes.len(), "Starting gateway");

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind(bind)
    .context("failed to bind gateway listener")?
    .run()
    .await
    .context("gateway server terminated")
}
