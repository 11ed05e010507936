//! Adapter implementations for server ports.

mod docker;
mod filesystem;
mod install;
pub mod memory;

pub use docker::{CONTAINER_DATA_PATH, DockerEnvironment, DockerEnvironmentFactory};
pub use filesystem::FsServerStore;
pub use install::LoggingInstallHook;
