//! Domain model for managed servers.
//!
//! The server domain models identity, the persisted configuration document,
//! host directory layout, service definitions and power actions.
//! Infrastructure concerns remain outside this boundary.

mod configuration;
mod error;
mod ids;
mod layout;
mod power;
mod service;

pub use configuration::{
    Allocations, ContainerInfo, SERVER_WILDCARD_PERMISSION, ServerConfiguration, Settings,
};
pub use error::{ConfigurationPatchError, ParsePowerActionError, ServerDomainError};
pub use ids::ServerId;
pub use layout::{DEFAULT_CONFIG_FILE_NAME, DirectoryLayout};
pub use power::{PowerAction, PowerActionRequest};
pub use service::{DEFAULT_ENVIRONMENT, ServiceCatalog, ServiceDefinition};
