//! Local cache of the registry's healthy-instance view.
//!
//! A background task polls the registry for every service the route table
//! can resolve to and atomically swaps the assembled view. The request path
//! only ever clones the current `Arc`, so a poll never blocks routing, and
//! a failed poll degrades to the last known-good entries instead of failing
//! traffic.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use registry_client::{InstanceSummary, RegistryClient};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct ServiceSnapshot {
    pub services: HashMap<String, Vec<InstanceSummary>>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

pub struct SnapshotCache {
    client: RegistryClient,
    service_names: Vec<String>,
    view: RwLock<Arc<ServiceSnapshot>>,
}

impl SnapshotCache {
    pub fn new(client: RegistryClient, service_names: Vec<String>) -> Self {
        Self {
            client,
            service_names,
            view: RwLock::new(Arc::new(ServiceSnapshot::default())),
        }
    }

    /// Current view; cheap clone of the snapshot pointer.
    pub fn view(&self) -> Arc<ServiceSnapshot> {
        self.view.read().clone()
    }

    pub fn instances(&self, service: &str) -> Vec<InstanceSummary> {
        self.view()
            .services
            .get(service)
            .cloned()
            .unwrap_or_default()
    }

    /// Poll the registry once and swap in the assembled view. Services whose
    /// poll fails keep their previous entries.
    pub async fn refresh(&self) {
        let previous = self.view();
        let mut services = HashMap::with_capacity(self.service_names.len());
        let mut failures = 0usize;

        for name in &self.service_names {
            match self.client.fetch_instances(name).await {
                Ok(instances) => {
                    services.insert(name.clone(), instances);
                }
                Err(e) => {
                    failures += 1;
                    warn!(service = %name, error = %e, "Registry poll failed, keeping stale entries");
                    if let Some(stale) = previous.services.get(name) {
                        services.insert(name.clone(), stale.clone());
                    }
                }
            }
        }

        if failures == self.service_names.len() {
            warn!("Registry unreachable, serving last known-good snapshot");
            return;
        }

        let refreshed_at = Some(Utc::now());
        *self.view.write() = Arc::new(ServiceSnapshot {
            services,
            refreshed_at,
        });
        debug!(services = self.service_names.len(), failures, "Registry snapshot refreshed");
    }

    #[cfg(test)]
    pub fn inject(&self, services: HashMap<String, Vec<InstanceSummary>>) {
        *self.view.write() = Arc::new(ServiceSnapshot {
            services,
            refreshed_at: Some(Utc::now()),
        });
    }
}
