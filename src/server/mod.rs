//! Managed server registry, lifecycle and runtime backends.
//!
//! This module follows hexagonal architecture:
//!
//! - [`domain`]: identity, configuration document, layout and power actions
//! - [`ports`]: environment, store and install hook contracts
//! - [`adapters`]: Docker, filesystem and in-memory implementations
//! - [`services`]: registry, lifecycle records, action runner and the
//!   request boundary

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
