//! Runtime environment port for server lifecycle operations.

use crate::server::domain::{ContainerInfo, ServerConfiguration, ServerId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for environment operations.
pub type EnvironmentResult<T> = Result<T, EnvironmentError>;

/// Lifecycle contract a runtime backend implements for one server.
///
/// Every call receives the server's current configuration so the backend can
/// translate the abstract verb into concrete runtime calls. Errors are
/// surfaced to callers unchanged; timeouts belong to the backend.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Reports whether the backing runtime object exists.
    async fn exists(&self, server: &ServerConfiguration) -> EnvironmentResult<bool>;

    /// Creates the backing runtime object.
    async fn create(&self, server: &ServerConfiguration) -> EnvironmentResult<ContainerInfo>;

    /// Starts the backing runtime object.
    async fn start(&self, server: &ServerConfiguration) -> EnvironmentResult<()>;

    /// Gracefully stops the backing runtime object.
    async fn stop(&self, server: &ServerConfiguration) -> EnvironmentResult<()>;

    /// Forcibly terminates the backing runtime object.
    async fn kill(&self, server: &ServerConfiguration) -> EnvironmentResult<()>;

    /// Delivers a console command to the running server process.
    async fn exec(&self, server: &ServerConfiguration, command: &str) -> EnvironmentResult<()>;

    /// Destroys and rebuilds the runtime object from current configuration.
    async fn recreate(&self, server: &ServerConfiguration) -> EnvironmentResult<ContainerInfo>;

    /// Removes the runtime object entirely.
    async fn destroy(&self, server: &ServerConfiguration) -> EnvironmentResult<()>;
}

/// Constructs environments for one backend kind.
pub trait EnvironmentFactory: Send + Sync {
    /// Builds the environment handle for a server.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError`] when the backend cannot serve the server.
    fn build(&self, server: &ServerConfiguration) -> EnvironmentResult<Arc<dyn Environment>>;
}

/// Environment factories keyed by environment name.
#[derive(Clone, Default)]
pub struct EnvironmentBackends {
    factories: HashMap<String, Arc<dyn EnvironmentFactory>>,
}

impl EnvironmentBackends {
    /// Creates an empty backend set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `environment_name`, replacing any previous one.
    #[must_use]
    pub fn with_backend(
        mut self,
        environment_name: impl Into<String>,
        factory: Arc<dyn EnvironmentFactory>,
    ) -> Self {
        self.factories.insert(environment_name.into(), factory);
        self
    }

    /// Builds an environment for `server` using the named backend.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::InvalidEnvironment`] when no backend is
    /// registered under `environment_name`, or the factory's own error.
    pub fn build(
        &self,
        environment_name: &str,
        server: &ServerConfiguration,
    ) -> EnvironmentResult<Arc<dyn Environment>> {
        let factory = self.factories.get(environment_name).ok_or_else(|| {
            EnvironmentError::InvalidEnvironment {
                server_id: server.id.clone(),
                environment: environment_name.to_owned(),
            }
        })?;
        factory.build(server)
    }
}

impl fmt::Debug for EnvironmentBackends {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        formatter
            .debug_struct("EnvironmentBackends")
            .field("backends", &names)
            .finish()
    }
}

/// Errors returned by environment backends.
#[derive(Debug, Clone, Error)]
pub enum EnvironmentError {
    /// No backend is registered under the declared environment name.
    #[error("invalid environment '{environment}' for server {server_id}")]
    InvalidEnvironment {
        /// Server identifier.
        server_id: ServerId,
        /// Environment name that failed to resolve.
        environment: String,
    },

    /// The operation needs a runtime object that does not exist.
    #[error("no runtime object exists for server {0}")]
    Missing(ServerId),

    /// The operation needs a running runtime object.
    #[error("server {0} is not running")]
    NotRunning(ServerId),

    /// The backend rejected the server configuration.
    #[error("invalid configuration for server {server_id}: {reason}")]
    InvalidConfiguration {
        /// Server identifier.
        server_id: ServerId,
        /// Reason string.
        reason: String,
    },

    /// Generic backend failure.
    #[error("environment runtime error: {0}")]
    Runtime(Arc<dyn std::error::Error + Send + Sync>),
}

impl EnvironmentError {
    /// Wraps a runtime error from a backend.
    pub fn runtime(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Runtime(Arc::new(err))
    }
}
