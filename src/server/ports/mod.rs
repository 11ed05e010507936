//! Port contracts for server lifecycle and persistence.

mod environment;
mod install;
mod store;

pub use environment::{
    Environment, EnvironmentBackends, EnvironmentError, EnvironmentFactory, EnvironmentResult,
};
pub use install::InstallHook;
pub use store::{ServerStore, ServerStoreError, ServerStoreResult};
