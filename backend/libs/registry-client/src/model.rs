//! Wire types for the registry HTTP surface.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declared status of a service instance. Only `UP` instances are returned
/// by discovery queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Starting,
    Up,
    Down,
    OutOfService,
}

/// Body of `POST /instances`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub service_name: String,
    pub instance_id: String,
    /// Network address, e.g. `http://10.0.0.5:8081`
    pub address: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Lease duration in seconds
    pub lease_duration: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub lease_id: String,
}

/// One instance as returned by `GET /instances/{service}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    pub instance_id: String,
    pub address: String,
    pub status: InstanceStatus,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Body of `PUT /instances/{service}/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: InstanceStatus,
}
