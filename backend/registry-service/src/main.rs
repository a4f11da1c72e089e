use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use registry_service::config::Config;
use registry_service::directory::InstanceDirectory;
use registry_service::handlers;
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
    let directory = Arc::new(InstanceDirectory::new(config.registry.clone()));

    // Eviction sweep: its own task, publishing snapshots atomically so
    // queries never observe a partially evicted directory.
    let sweep_directory = directory.clone();
    let sweep_interval = Duration::from_secs(config.registry.sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let outcome = sweep_directory.evict_expired();
            if !outcome.evicted.is_empty() {
                info!(count = outcome.evicted.len(), "Eviction sweep removed expired leases");
            }
        }
    });

    let bind = (config.app.host.clone(), config.app.port);
    info!(host = %config.app.host, port = config.app.port, "Starting registry service");

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(directory.clone()))
            .configure(handlers::configure)
    })
    .bind(bind)
    .context("failed to bind registry listener")?
    .run()
    .await
    .context("registry server terminated")
}
