//! Nodewarden: a single-host agent managing containerized servers.
//!
//! The agent keeps a registry of servers persisted as JSON documents, drives
//! each server through its lifecycle on a pluggable runtime backend, gates
//! every control request behind a permission check, and confines file
//! operations to the server's data directory.
//!
//! # Architecture
//!
//! Nodewarden follows hexagonal architecture principles:
//!
//! - **Domain**: server identity, configuration and layout, free of I/O
//! - **Ports**: trait contracts for runtime backends and persistence
//! - **Adapters**: Docker, filesystem and in-memory implementations
//! - **Services**: registry, lifecycle records, background actions and the
//!   request boundary
//!
//! # Modules
//!
//! - [`server`]: registry, lifecycle and runtime backends
//! - [`auth`]: permission gate and bearer credentials
//! - [`sandbox`]: path containment and sandboxed file operations
//! - [`config`]: environment-driven agent configuration

pub mod auth;
pub mod config;
pub mod sandbox;
pub mod server;
