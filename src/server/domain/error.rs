//! Error types for server domain validation and parsing.

use std::sync::Arc;
use thiserror::Error;

/// Errors returned while constructing server domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServerDomainError {
    /// The server identifier is empty after trimming.
    #[error("server identifier must not be empty")]
    EmptyServerId,

    /// The server identifier has no `-` separator, so no short ID exists.
    #[error("server identifier '{0}' must contain a '-' separator")]
    MissingIdSeparator(String),

    /// The server identifier could address a directory other than its own.
    #[error("server identifier '{0}' contains path separators or whitespace")]
    InvalidServerId(String),

    /// The management and data roots resolve to the same directory.
    #[error("management root and data root must differ (both are '{0}')")]
    SharedRoots(String),

    /// The configuration file name is empty or contains a path separator.
    #[error("configuration file name '{0}' must be a plain file name")]
    InvalidConfigFileName(String),
}

/// Error returned while parsing a power action from a request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown power action: {0}")]
pub struct ParsePowerActionError(pub String);

/// Errors returned while applying a partial update to a configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationPatchError {
    /// The update document is not a JSON object.
    #[error("configuration update must be a JSON object")]
    NotAnObject,

    /// The update would move the configuration to another server.
    #[error("configuration update may not change the server identifier to '{0}'")]
    IdentifierChanged(String),

    /// The update touches a field owned by the agent.
    #[error("configuration field '{0}' cannot be updated directly")]
    ReadOnlyField(&'static str),

    /// The merged document no longer describes a valid configuration.
    #[error("updated configuration is invalid: {0}")]
    Invalid(Arc<serde_json::Error>),
}
