//! The instance directory: sharded lease table plus an atomically published
//! read-only snapshot.
//!
//! Mutations (register/renew/status/deregister) touch only the shard for
//! their service name. Queries read the last published [`RegistryView`] and
//! never contend with the eviction sweep.

use crate::config::RegistryPolicy;
use crate::error::{RegistryError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use registry_client::model::{InstanceStatus, InstanceSummary, RegisterRequest};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Longest accepted lease. An instance that cannot renew within a day is
/// not participating in the lease protocol.
const MAX_LEASE_SECS: u64 = 86_400;

/// Immutable snapshot of the healthy instance set, replaced wholesale on
/// every change. Consumers hold the `Arc` and never observe partial state.
#[derive(Debug, Clone)]
pub struct RegistryView {
    pub services: HashMap<String, Vec<InstanceSummary>>,
    pub refreshed_at: DateTime<Utc>,
}

impl RegistryView {
    fn empty() -> Self {
        Self {
            services: HashMap::new(),
            refreshed_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
struct RegisteredInstance {
    lease_id: String,
    address: String,
    status: InstanceStatus,
    metadata: HashMap<String, String>,
    lease_duration: ChronoDuration,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// New instance created
    Created { lease_id: String },
    /// Idempotent re-registration of an existing instance at the same address
    Renewed { lease_id: String },
}

#[derive(Debug)]
pub struct SweepOutcome {
    pub evicted: Vec<(String, String)>,
    pub self_preservation: bool,
    pub renewal_fraction: f64,
}

pub struct InstanceDirectory {
    services: DashMap<String, DashMap<String, RegisteredInstance>>,
    snapshot: RwLock<Arc<RegistryView>>,
    /// Renewals received since the last sweep
    renewals: AtomicU64,
    self_preservation: AtomicBool,
    policy: RegistryPolicy,
}

impl InstanceDirectory {
    pub fn new(policy: RegistryPolicy) -> Self {
        Self {
            services: DashMap::new(),
            snapshot: RwLock::new(Arc::new(RegistryView::empty())),
            renewals: AtomicU64::new(0),
            self_preservation: AtomicBool::new(false),
            policy,
        }
    }

    /// Register an instance. Re-registration with an identical address is
    /// idempotent and behaves like a renewal; a different address for the
    /// same `(service, instanceId)` is a conflict.
    pub fn register(&self, request: &RegisterRequest) -> Result<RegisterOutcome> {
        // Zero would expire instantly; values past the cap are junk (and
        // would overflow the chrono duration).
        if request.lease_duration == 0 || request.lease_duration > MAX_LEASE_SECS {
            return Err(RegistryError::InvalidLeaseDuration);
        }
        let lease = ChronoDuration::seconds(request.lease_duration as i64);
        let shard = self
            .services
            .entry(request.service_name.clone())
            .or_default();

        let outcome = if let Some(mut existing) = shard.get_mut(&request.instance_id) {
            if existing.address != request.address {
                return Err(RegistryError::RegistrationConflict);
            }
            existing.lease_duration = lease;
            existing.expires_at = Utc::now() + lease;
            RegisterOutcome::Renewed {
                lease_id: existing.lease_id.clone(),
            }
        } else {
            let lease_id = Uuid::new_v4().to_string();
            let status = if self.policy.start_in_up_state {
                InstanceStatus::Up
            } else {
                InstanceStatus::Starting
            };
            shard.insert(
                request.instance_id.clone(),
                RegisteredInstance {
                    lease_id: lease_id.clone(),
                    address: request.address.clone(),
                    status,
                    metadata: request.metadata.clone(),
                    lease_duration: lease,
                    expires_at: Utc::now() + lease,
                },
            );
            info!(
                service = %request.service_name,
                instance = %request.instance_id,
                address = %request.address,
                "Instance registered"
            );
            RegisterOutcome::Created { lease_id }
        };

        drop(shard);
        self.publish();
        Ok(outcome)
    }

    /// Extend the lease to `now + leaseDuration`. The first successful
    /// renewal moves a STARTING instance to UP.
    pub fn renew(&self, service: &str, instance_id: &str) -> Result<()> {
        let shard = self
            .services
            .get(service)
            .ok_or(RegistryError::InstanceNotFound)?;
        let mut became_up = false;
        {
            let mut instance = shard
                .get_mut(instance_id)
                .ok_or(RegistryError::InstanceNotFound)?;
            instance.expires_at = Utc::now() + instance.lease_duration;
            if instance.status == InstanceStatus::Starting {
                instance.status = InstanceStatus::Up;
                became_up = true;
            }
        }
        drop(shard);

        self.renewals.fetch_add(1, Ordering::Relaxed);
        if became_up {
            info!(service, instance_id, "Instance is UP after first renewal");
            self.publish();
        }
        Ok(())
    }

    pub fn set_status(&self, service: &str, instance_id: &str, status: InstanceStatus) -> Result<()> {
        {
            let shard = self
                .services
                .get(service)
                .ok_or(RegistryError::InstanceNotFound)?;
            let mut instance = shard
                .get_mut(instance_id)
                .ok_or(RegistryError::InstanceNotFound)?;
            instance.status = status;
        }
        info!(service, instance_id, ?status, "Instance status updated");
        self.publish();
        Ok(())
    }

    /// Remove immediately, no grace period. Idempotent.
    pub fn deregister(&self, service: &str, instance_id: &str) {
        if let Some(shard) = self.services.get(service) {
            if shard.remove(instance_id).is_some() {
                info!(service, instance_id, "Instance deregistered");
            }
        }
        self.publish();
    }

    /// Healthy (UP) instances of a service, from the published snapshot.
    pub fn query(&self, service: &str) -> Vec<InstanceSummary> {
        self.view()
            .services
            .get(service)
            .cloned()
            .unwrap_or_default()
    }

    /// Current snapshot; cheap to clone, safe to hold across awaits.
    pub fn view(&self) -> Arc<RegistryView> {
        self.snapshot.read().clone()
    }

    pub fn in_self_preservation(&self) -> bool {
        self.self_preservation.load(Ordering::Relaxed)
    }

    /// One eviction pass. Compares renewal volume in the elapsed window
    /// against the expected volume; a sharp drop means a partition or
    /// monitoring outage is more likely than mass instance death, so the
    /// sweep skips eviction entirely for this cycle.
    pub fn evict_expired(&self) -> SweepOutcome {
        let live: usize = self.services.iter().map(|s| s.value().len()).sum();
        let received = self.renewals.swap(0, Ordering::Relaxed);
        let expected = live as f64
            * (self.policy.sweep_interval_secs as f64 / self.policy.renewal_interval_secs as f64);
        let fraction = if expected > 0.0 {
            received as f64 / expected
        } else {
            1.0
        };

        let preserve = live > 0 && fraction < self.policy.self_preservation_threshold;
        let was_preserving = self.self_preservation.swap(preserve, Ordering::Relaxed);

        if preserve {
            if !was_preserving {
                warn!(
                    renewal_fraction = fraction,
                    threshold = self.policy.self_preservation_threshold,
                    "Renewal volume collapsed; entering self-preservation, eviction suspended"
                );
            }
            return SweepOutcome {
                evicted: Vec::new(),
                self_preservation: true,
                renewal_fraction: fraction,
            };
        }
        if was_preserving {
            info!(renewal_fraction = fraction, "Renewal volume recovered; self-preservation lifted");
        }

        let now = Utc::now();
        let mut evicted = Vec::new();
        for shard in self.services.iter() {
            let expired: Vec<String> = shard
                .value()
                .iter()
                .filter(|e| e.value().expires_at <= now)
                .map(|e| e.key().clone())
                .collect();
            for instance_id in expired {
                shard.value().remove(&instance_id);
                warn!(service = %shard.key(), instance = %instance_id, "Lease expired, instance evicted");
                evicted.push((shard.key().clone(), instance_id));
            }
        }

        if !evicted.is_empty() {
            self.publish();
        }

        SweepOutcome {
            evicted,
            self_preservation: false,
            renewal_fraction: fraction,
        }
    }

    /// Rebuild the snapshot from the directory and swap it in atomically.
    fn publish(&self) {
        let mut services = HashMap::new();
        for shard in self.services.iter() {
            let mut instances: Vec<InstanceSummary> = shard
                .value()
                .iter()
                .filter(|e| e.value().status == InstanceStatus::Up)
                .map(|e| InstanceSummary {
                    instance_id: e.key().clone(),
                    address: e.value().address.clone(),
                    status: e.value().status,
                    metadata: e.value().metadata.clone(),
                })
                .collect();
            instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
            if !instances.is_empty() {
                services.insert(shard.key().clone(), instances);
            }
        }

        *self.snapshot.write() = Arc::new(RegistryView {
            services,
            refreshed_at: Utc::now(),
        });
    }

    #[cfg(test)]
    fn expire_now(&self, service: &str, instance_id: &str) {
        let shard = self.services.get(service).expect("service exists");
        let mut instance = shard.get_mut(instance_id).expect("instance exists");
        instance.expires_at = Utc::now() - ChronoDuration::seconds(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RegistryPolicy {
        RegistryPolicy {
            renewal_interval_secs: 5,
            sweep_interval_secs: 5,
            self_preservation_threshold: 0.85,
            start_in_up_state: false,
        }
    }

    fn register_request(service: &str, id: &str, address: &str) -> RegisterRequest {
        RegisterRequest {
            service_name: service.into(),
            instance_id: id.into(),
            address: address.into(),
            metadata: HashMap::new(),
            lease_duration: 60,
        }
    }

    #[test]
    fn test_register_starts_in_starting_state() {
        let dir = InstanceDirectory::new(policy());
        let outcome = dir
            .register(&register_request("content", "c1", "http://10.0.0.1:1"))
            .unwrap();
        assert!(matches!(outcome, RegisterOutcome::Created { .. }));

        // STARTING instances are not visible to queries
        assert!(dir.query("content").is_empty());
    }

    #[test]
    fn test_first_renewal_transitions_to_up() {
        let dir = InstanceDirectory::new(policy());
        dir.register(&register_request("content", "c1", "http://10.0.0.1:1"))
            .unwrap();
        dir.renew("content", "c1").unwrap();

        let instances = dir.query("content");
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].status, InstanceStatus::Up);
    }

    #[test]
    fn test_start_in_up_state_is_immediately_visible() {
        let mut p = policy();
        p.start_in_up_state = true;
        let dir = InstanceDirectory::new(p);
        dir.register(&register_request("content", "c1", "http://10.0.0.1:1"))
            .unwrap();
        assert_eq!(dir.query("content").len(), 1);
    }

    #[test]
    fn test_reregistration_same_address_is_idempotent() {
        let dir = InstanceDirectory::new(policy());
        let req = register_request("content", "c1", "http://10.0.0.1:1");
        let first = dir.register(&req).unwrap();
        let second = dir.register(&req).unwrap();

        let first_lease = match first {
            RegisterOutcome::Created { lease_id } => lease_id,
            _ => panic!("expected Created"),
        };
        match second {
            RegisterOutcome::Renewed { lease_id } => assert_eq!(lease_id, first_lease),
            _ => panic!("expected Renewed"),
        }
    }

    #[test]
    fn test_lease_duration_out_of_bounds_is_rejected() {
        let dir = InstanceDirectory::new(policy());

        let mut req = register_request("content", "c1", "http://10.0.0.1:1");
        req.lease_duration = 10_000_000_000_000_000;
        assert!(matches!(
            dir.register(&req),
            Err(RegistryError::InvalidLeaseDuration)
        ));

        req.lease_duration = 0;
        assert!(matches!(
            dir.register(&req),
            Err(RegistryError::InvalidLeaseDuration)
        ));

        // The bound itself is fine.
        req.lease_duration = 86_400;
        assert!(dir.register(&req).is_ok());
    }

    #[test]
    fn test_reregistration_different_address_conflicts() {
        let dir = InstanceDirectory::new(policy());
        dir.register(&register_request("content", "c1", "http://10.0.0.1:1"))
            .unwrap();
        let result = dir.register(&register_request("content", "c1", "http://10.0.0.2:1"));
        assert!(matches!(result, Err(RegistryError::RegistrationConflict)));
    }

    #[test]
    fn test_out_of_service_hides_instance() {
        let dir = InstanceDirectory::new(policy());
        dir.register(&register_request("content", "c1", "http://10.0.0.1:1"))
            .unwrap();
        dir.renew("content", "c1").unwrap();
        assert_eq!(dir.query("content").len(), 1);

        dir.set_status("content", "c1", InstanceStatus::OutOfService)
            .unwrap();
        assert!(dir.query("content").is_empty());

        dir.set_status("content", "c1", InstanceStatus::Up).unwrap();
        assert_eq!(dir.query("content").len(), 1);
    }

    #[test]
    fn test_deregister_removes_immediately_and_is_idempotent() {
        let dir = InstanceDirectory::new(policy());
        dir.register(&register_request("content", "c1", "http://10.0.0.1:1"))
            .unwrap();
        dir.renew("content", "c1").unwrap();

        dir.deregister("content", "c1");
        assert!(dir.query("content").is_empty());
        dir.deregister("content", "c1"); // no-op

        assert!(matches!(
            dir.renew("content", "c1"),
            Err(RegistryError::InstanceNotFound)
        ));
    }

    #[test]
    fn test_renewing_instances_are_never_evicted() {
        let dir = InstanceDirectory::new(policy());
        for i in 0..3 {
            dir.register(&register_request("content", &format!("c{i}"), "http://x:1"))
                .unwrap();
        }

        for _ in 0..4 {
            for i in 0..3 {
                dir.renew("content", &format!("c{i}")).unwrap();
            }
            let outcome = dir.evict_expired();
            assert!(outcome.evicted.is_empty());
            assert!(!outcome.self_preservation);
        }
        assert_eq!(dir.query("content").len(), 3);
    }

    #[test]
    fn test_expired_lease_is_evicted_when_renewal_volume_is_healthy() {
        let dir = InstanceDirectory::new(policy());
        for i in 0..10 {
            dir.register(&register_request("content", &format!("c{i}"), "http://x:1"))
                .unwrap();
        }
        // 9 of 10 renew; the tenth has let its lease lapse.
        for i in 0..9 {
            dir.renew("content", &format!("c{i}")).unwrap();
        }
        dir.expire_now("content", "c9");

        let outcome = dir.evict_expired();
        assert!(!outcome.self_preservation);
        assert_eq!(outcome.evicted, vec![("content".to_string(), "c9".to_string())]);
    }

    #[test]
    fn test_mass_renewal_failure_triggers_self_preservation() {
        let dir = InstanceDirectory::new(policy());
        for i in 0..10 {
            dir.register(&register_request("content", &format!("c{i}"), "http://x:1"))
                .unwrap();
            dir.renew("content", &format!("c{i}")).unwrap();
        }
        let _ = dir.evict_expired(); // drain the registration-burst renewals

        // 80% of instances stop renewing and their leases lapse.
        for i in 2..10 {
            dir.expire_now("content", &format!("c{i}"));
        }
        dir.renew("content", "c0").unwrap();
        dir.renew("content", "c1").unwrap();

        let outcome = dir.evict_expired();
        assert!(outcome.self_preservation);
        assert!(outcome.evicted.is_empty(), "eviction must be suspended");
        assert!(dir.in_self_preservation());

        // Renewal volume recovers: self-preservation lifts the same cycle
        // and expired leases are finally collected.
        for i in 0..10 {
            let _ = dir.renew("content", &format!("c{i}"));
        }
        dir.expire_now("content", "c5");
        let outcome = dir.evict_expired();
        assert!(!outcome.self_preservation);
        assert!(!dir.in_self_preservation());
        assert_eq!(outcome.evicted, vec![("content".to_string(), "c5".to_string())]);
    }

    #[test]
    fn test_snapshot_is_stable_across_mutations() {
        let dir = InstanceDirectory::new(policy());
        dir.register(&register_request("content", "c1", "http://x:1"))
            .unwrap();
        dir.renew("content", "c1").unwrap();

        let view = dir.view();
        dir.deregister("content", "c1");

        // The held snapshot is immutable; only a re-read sees the change.
        assert_eq!(view.services.get("content").map(Vec::len), Some(1));
        assert!(dir.view().services.get("content").is_none());
    }
}
