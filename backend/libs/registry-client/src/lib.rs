//! Client side of the service registry.
//!
//! Shared by every service that registers itself (heartbeat) and by the
//! gateway (instance discovery). The wire model here is the single source of
//! truth for the registry's HTTP surface.

pub mod client;
pub mod heartbeat;
pub mod model;

pub use client::{RegistryClient, RegistryClientError};
pub use heartbeat::HeartbeatTask;
pub use model::{
    InstanceStatus, InstanceSummary, RegisterRequest, RegisterResponse, StatusUpdateRequest,
};
