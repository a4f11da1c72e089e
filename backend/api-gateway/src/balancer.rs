//! Instance selection: round-robin rotation plus per-instance circuit
//! breakers.
//!
//! Selection is two-phase. `order` rotates the healthy list by a per-service
//! counter so consecutive requests start at consecutive instances; the
//! forwarding loop then walks that order and asks `try_permit` before each
//! attempt, so instances with an open breaker are skipped without consuming
//! their position.

use dashmap::DashMap;
use registry_client::InstanceSummary;
use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct Balancer {
    counters: DashMap<String, AtomicUsize>,
    breakers: DashMap<(String, String), CircuitBreaker>,
    breaker_config: CircuitBreakerConfig,
}

impl Balancer {
    pub fn new(breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            counters: DashMap::new(),
            breakers: DashMap::new(),
            breaker_config,
        }
    }

    /// Candidate order for one request: the instance list rotated by the
    /// service's round-robin counter. With N stable instances, N consecutive
    /// requests each lead with a different instance.
    pub fn order(&self, service: &str, instances: &[InstanceSummary]) -> Vec<InstanceSummary> {
        if instances.is_empty() {
            return Vec::new();
        }
        let counter = self
            .counters
            .entry(service.to_string())
            .or_insert_with(|| AtomicUsize::new(0));
        let offset = counter.fetch_add(1, Ordering::Relaxed) % instances.len();

        let mut ordered = Vec::with_capacity(instances.len());
        ordered.extend_from_slice(&instances[offset..]);
        ordered.extend_from_slice(&instances[..offset]);
        ordered
    }

    /// Whether the instance's breaker admits a call right now. Consumes the
    /// half-open probe slot when it grants one, so the caller must follow a
    /// `true` with an attempt and a recorded outcome.
    pub fn try_permit(&self, service: &str, instance_id: &str) -> bool {
        self.breaker(service, instance_id).try_permit()
    }

    pub fn record_success(&self, service: &str, instance_id: &str) {
        self.breaker(service, instance_id).record_success();
    }

    pub fn record_failure(&self, service: &str, instance_id: &str) {
        self.breaker(service, instance_id).record_failure();
    }

    pub fn breaker_state(&self, service: &str, instance_id: &str) -> CircuitState {
        self.breaker(service, instance_id).state()
    }

    /// Drop state for services and instances no longer in the live view.
    /// Instance ids are fresh per process start, so without this the maps
    /// accumulate an entry for every restart a downstream ever made.
    pub fn prune(&self, live: &HashMap<String, Vec<InstanceSummary>>) {
        self.breakers.retain(|(service, instance_id), _| {
            live.get(service)
                .map(|instances| instances.iter().any(|i| &i.instance_id == instance_id))
                .unwrap_or(false)
        });
        self.counters.retain(|service, _| live.contains_key(service));
    }

    fn breaker(&self, service: &str, instance_id: &str) -> CircuitBreaker {
        self.breakers
            .entry((service.to_string(), instance_id.to_string()))
            .or_insert_with(|| CircuitBreaker::new(self.breaker_config.clone()))
            .clone()
    }
}
