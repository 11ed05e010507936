//! Service-level errors for server lifecycle and registry operations.

use crate::server::{
    domain::{ConfigurationPatchError, ServerDomainError, ServerId},
    ports::{EnvironmentError, ServerStoreError},
};
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by the registry, records and action runner.
#[derive(Debug, Clone, Error)]
pub enum ServerError {
    /// A server with the same identifier is already registered.
    #[error("server {0} already exists")]
    AlreadyExists(ServerId),

    /// No server is registered under the identifier.
    #[error("server {0} not found")]
    NotFound(ServerId),

    /// The server is suspended and cannot be started.
    #[error("server {0} is suspended")]
    Suspended(ServerId),

    /// Another dispatched action is still running for the server.
    #[error("an operation is already in progress for server {0}")]
    OperationInProgress(ServerId),

    /// The server is being deleted.
    #[error("server {0} is being deleted")]
    Deleting(ServerId),

    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] ServerDomainError),

    /// The environment backend failed.
    #[error(transparent)]
    Backend(#[from] EnvironmentError),

    /// Reading or writing configuration failed.
    #[error(transparent)]
    Store(#[from] ServerStoreError),

    /// A configuration update was rejected.
    #[error("invalid configuration update for server {server_id}: {source}")]
    InvalidUpdate {
        /// Server being updated.
        server_id: ServerId,
        /// Reason the update was rejected.
        source: ConfigurationPatchError,
    },

    /// The install hook failed.
    #[error("installation failed for server {server_id}: {source}")]
    Install {
        /// Server being installed.
        server_id: ServerId,
        /// Failure reported by the hook.
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// A dispatched action task ended without reporting a result.
    #[error("background action for server {0} was aborted")]
    Aborted(ServerId),
}

impl ServerError {
    /// Returns whether the error reports an unrecognized environment backend.
    #[must_use]
    pub const fn is_invalid_environment(&self) -> bool {
        matches!(
            self,
            Self::Backend(EnvironmentError::InvalidEnvironment { .. })
        )
    }
}

/// Result type for server service operations.
pub type ServerResult<T> = Result<T, ServerError>;
