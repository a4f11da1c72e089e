//! Downstream forwarding with bounded retries.
//!
//! A request is tried against the balancer's candidate order, one instance
//! at a time, each attempt under its own deadline. Connection failures and
//! timeouts feed that instance's breaker and move on to the next candidate;
//! any HTTP response, whatever its status, counts as the instance being
//! alive and is propagated to the client.

use crate::balancer::Balancer;
use crate::config::ForwardPolicy;
use crate::error::{GatewayError, Result};
use registry_client::InstanceSummary;
use resilience::{with_timeout, TimeoutError};
use std::time::Duration;
use tracing::{debug, warn};

/// Inbound request reduced to what forwarding needs. Header names and
/// values travel as raw strings/bytes so the engine is independent of the
/// server framework's header types.
pub struct ProxiedRequest {
    pub method: String,
    pub path_and_query: String,
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Vec<u8>,
}

pub struct ProxiedResponse {
    pub status: u16,
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Vec<u8>,
}

enum AttemptError {
    TimedOut,
    Transport(reqwest::Error),
}

pub struct ForwardEngine {
    http: reqwest::Client,
    policy: ForwardPolicy,
}

impl ForwardEngine {
    pub fn new(policy: ForwardPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(policy.attempt_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        Ok(Self { http, policy })
    }

    /// Walk the candidate order until an instance answers or the attempt
    /// budget is spent. Instances whose breaker denies a permit are skipped
    /// without consuming an attempt.
    pub async fn forward(
        &self,
        balancer: &Balancer,
        service: &str,
        candidates: &[InstanceSummary],
        request: &ProxiedRequest,
    ) -> Result<ProxiedResponse> {
        let mut attempts = 0usize;
        let mut last_was_timeout = false;

        for instance in candidates {
            if attempts >= self.policy.max_attempts {
                break;
            }
            if !balancer.try_permit(service, &instance.instance_id) {
                debug!(service, instance = %instance.instance_id, "Breaker open, skipping instance");
                continue;
            }
            attempts += 1;

            match self.attempt(instance, request).await {
                Ok(response) => {
                    balancer.record_success(service, &instance.instance_id);
                    return Ok(response);
                }
                Err(AttemptError::TimedOut) => {
                    last_was_timeout = true;
                    balancer.record_failure(service, &instance.instance_id);
                    warn!(service, instance = %instance.instance_id, "Forward attempt timed out");
                }
                Err(AttemptError::Transport(e)) => {
                    last_was_timeout = false;
                    balancer.record_failure(service, &instance.instance_id);
                    warn!(service, instance = %instance.instance_id, error = %e, "Forward attempt failed");
                }
            }
        }

        if attempts > 0 && last_was_timeout {
            Err(GatewayError::DownstreamTimeout)
        } else {
            Err(GatewayError::DownstreamUnavailable)
        }
    }

    async fn attempt(
        &self,
        instance: &InstanceSummary,
        request: &ProxiedRequest,
    ) -> std::result::Result<ProxiedResponse, AttemptError> {
        let url = format!("{}{}", instance.address, request.path_and_query);
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let mut builder = self.http.request(method, &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_slice());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let deadline = Duration::from_secs(self.policy.attempt_timeout_secs);
        let exchange = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
                .collect();
            let body = response.bytes().await?.to_vec();
            Ok::<_, reqwest::Error>(ProxiedResponse {
                status,
                headers,
                body,
            })
        };

        match with_timeout(deadline, exchange).await {
            Ok(response) => Ok(response),
            Err(TimeoutError::Elapsed(_)) => Err(AttemptError::TimedOut),
            Err(TimeoutError::Inner(e)) if e.is_timeout() => Err(AttemptError::TimedOut),
            Err(TimeoutError::Inner(e)) => Err(AttemptError::Transport(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_client::InstanceStatus;
    use resilience::{CircuitBreakerConfig, CircuitState};
    use std::collections::HashMap;

    fn instance(id: &str, address: &str) -> InstanceSummary {
        InstanceSummary {
            instance_id: id.to_string(),
            address: address.to_string(),
            status: InstanceStatus::Up,
            metadata: HashMap::new(),
        }
    }

    fn get_request() -> ProxiedRequest {
        ProxiedRequest {
            method: "GET".to_string(),
            path_and_query: "/api/v1/content".to_string(),
            headers: vec![],
            body: vec![],
        }
    }

    fn engine(timeout_secs: u64, max_attempts: usize) -> ForwardEngine {
        ForwardEngine::new(ForwardPolicy {
            attempt_timeout_secs: timeout_secs,
            max_attempts,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_no_candidates_is_unavailable() {
        let balancer = Balancer::new(CircuitBreakerConfig::default());
        let result = engine(1, 3)
            .forward(&balancer, "content", &[], &get_request())
            .await;
        assert!(matches!(result, Err(GatewayError::DownstreamUnavailable)));
    }

    #[tokio::test]
    async fn test_connect_failures_exhaust_candidates_and_feed_breakers() {
        let balancer = Balancer::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        // Nothing listens on these ports; both attempts are refused.
        let candidates = vec![
            instance("a", "http://127.0.0.1:1"),
            instance("b", "http://127.0.0.1:1"),
        ];

        let result = engine(1, 3)
            .forward(&balancer, "content", &candidates, &get_request())
            .await;
        assert!(matches!(result, Err(GatewayError::DownstreamUnavailable)));
        assert_eq!(balancer.breaker_state("content", "a"), CircuitState::Open);
        assert_eq!(balancer.breaker_state("content", "b"), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_instance_without_an_attempt() {
        let balancer = Balancer::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        balancer.record_failure("content", "a");
        assert_eq!(balancer.breaker_state("content", "a"), CircuitState::Open);

        let result = engine(1, 3)
            .forward(
                &balancer,
                "content",
                &[instance("a", "http://127.0.0.1:1")],
                &get_request(),
            )
            .await;
        // Skipped, not attempted: zero attempts reads as no candidates.
        assert!(matches!(result, Err(GatewayError::DownstreamUnavailable)));
    }

    #[tokio::test]
    async fn test_silent_listener_surfaces_timeout() {
        // Accepts connections but never responds.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                if let Ok((socket, _)) = listener.accept().await {
                    held.push(socket);
                }
            }
        });

        let balancer = Balancer::new(CircuitBreakerConfig::default());
        let result = engine(1, 1)
            .forward(
                &balancer,
                "content",
                &[instance("a", &address)],
                &get_request(),
            )
            .await;
        assert!(matches!(result, Err(GatewayError::DownstreamTimeout)));
    }
}
