//! Lease heartbeat: register at startup, renew periodically, re-register
//! after lease loss.

use crate::client::{RegistryClient, RegistryClientError};
use crate::model::RegisterRequest;
use resilience::{with_retry, RetryConfig};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct HeartbeatTask {
    client: RegistryClient,
    registration: RegisterRequest,
    renew_interval: Duration,
}

impl HeartbeatTask {
    pub fn new(
        client: RegistryClient,
        registration: RegisterRequest,
        renew_interval: Duration,
    ) -> Self {
        Self {
            client,
            registration,
            renew_interval,
        }
    }

    /// Run the heartbeat loop until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        let service = self.registration.service_name.clone();
        let instance = self.registration.instance_id.clone();

        self.register_with_retry().await;

        let mut ticker = tokio::time::interval(self.renew_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately; skip it so the fresh lease is not
        // renewed at age zero.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self.client.renew(&service, &instance).await {
                Ok(()) => {}
                Err(RegistryClientError::LeaseLost) => {
                    warn!(service, instance, "Lease lost, re-registering");
                    self.register_with_retry().await;
                }
                Err(e) => {
                    // Transient registry outage: keep heartbeating; the
                    // registry's self-preservation covers mass failures.
                    warn!(service, instance, error = %e, "Lease renewal failed");
                }
            }
        }
    }

    async fn register_with_retry(&self) {
        let config = RetryConfig {
            max_retries: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            jitter: true,
        };

        let result = with_retry(config, || self.client.register(&self.registration)).await;
        match result {
            Ok(resp) => info!(
                service = %self.registration.service_name,
                instance = %self.registration.instance_id,
                lease_id = %resp.lease_id,
                "Registered with service registry"
            ),
            Err(e) => warn!(
                service = %self.registration.service_name,
                error = %e,
                "Registration failed; will retry on next lease loss"
            ),
        }
    }
}
