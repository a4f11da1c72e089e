//! Edge router: matches inbound requests to logical services, enforces
//! bearer tokens on protected routes, and forwards to healthy instances
//! discovered through the registry.
//!
//! The request path is an explicit pipeline with one stage per concern:
//! route, then authorize, then select, then forward. Shared state on that
//! path (registry snapshot, verifying keys) is read through atomically
//! swapped references; background tasks refresh them.

pub mod auth;
pub mod balancer;
pub mod config;
pub mod error;
pub mod handlers;
pub mod proxy;
pub mod routing;
pub mod snapshot;
