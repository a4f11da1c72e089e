//! Authentication authority: verifies credentials, mints and refreshes
//! signed access tokens, tracks refresh-token revocation, and rotates the
//! signing key set.

pub mod config;
pub mod error;
pub mod handlers;
pub mod security;
pub mod service;
pub mod store;
