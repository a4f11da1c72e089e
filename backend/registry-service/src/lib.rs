//! Service registry: the directory of live service instances.
//!
//! Instances register at startup, renew their lease periodically, and are
//! evicted once the lease expires, unless the eviction sweep detects a
//! collapse in aggregate renewal volume and enters self-preservation.

pub mod config;
pub mod directory;
pub mod error;
pub mod handlers;
