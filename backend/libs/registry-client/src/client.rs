//! HTTP client for the registry surface.

use crate::model::{
    InstanceSummary, RegisterRequest, RegisterResponse, StatusUpdateRequest, InstanceStatus,
};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum RegistryClientError {
    #[error("Registry request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Lease not found; instance must re-register")]
    LeaseLost,
    #[error("Registration conflict: instance id already bound to another address")]
    Conflict,
    #[error("Unexpected registry response: {0}")]
    Unexpected(u16),
}

pub type Result<T> = std::result::Result<T, RegistryClientError>;

#[derive(Clone)]
pub struct RegistryClient {
    base_url: String,
    http: reqwest::Client,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse> {
        let url = format!("{}/instances", self.base_url);
        let resp = self.http.post(&url).json(request).send().await?;

        match resp.status().as_u16() {
            200 | 201 => Ok(resp.json().await?),
            409 => Err(RegistryClientError::Conflict),
            code => Err(RegistryClientError::Unexpected(code)),
        }
    }

    pub async fn renew(&self, service: &str, instance_id: &str) -> Result<()> {
        let url = format!(
            "{}/instances/{}/{}/renew",
            self.base_url, service, instance_id
        );
        let resp = self.http.put(&url).send().await?;

        match resp.status().as_u16() {
            200 => Ok(()),
            404 => Err(RegistryClientError::LeaseLost),
            code => Err(RegistryClientError::Unexpected(code)),
        }
    }

    pub async fn set_status(
        &self,
        service: &str,
        instance_id: &str,
        status: InstanceStatus,
    ) -> Result<()> {
        let url = format!(
            "{}/instances/{}/{}/status",
            self.base_url, service, instance_id
        );
        let resp = self
            .http
            .put(&url)
            .json(&StatusUpdateRequest { status })
            .send()
            .await?;

        match resp.status().as_u16() {
            200 => Ok(()),
            404 => Err(RegistryClientError::LeaseLost),
            code => Err(RegistryClientError::Unexpected(code)),
        }
    }

    pub async fn deregister(&self, service: &str, instance_id: &str) -> Result<()> {
        let url = format!("{}/instances/{}/{}", self.base_url, service, instance_id);
        let resp = self.http.delete(&url).send().await?;

        match resp.status().as_u16() {
            204 => Ok(()),
            code => Err(RegistryClientError::Unexpected(code)),
        }
    }

    /// Healthy instances of a logical service.
    pub async fn fetch_instances(&self, service: &str) -> Result<Vec<InstanceSummary>> {
        let url = format!("{}/instances/{}", self.base_url, service);
        let resp = self.http.get(&url).send().await?;

        match resp.status().as_u16() {
            200 => {
                let instances: Vec<InstanceSummary> = resp.json().await?;
                debug!(service, count = instances.len(), "Fetched registry instances");
                Ok(instances)
            }
            code => Err(RegistryClientError::Unexpected(code)),
        }
    }
}
