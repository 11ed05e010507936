//! Runs the node agent.
//!
//! Usage:
//!
//! ```text
//! NODEWARDEN_MANAGEMENT_ROOT=/var/lib/nodewarden \
//! NODEWARDEN_DATA_ROOT=/srv/nodewarden \
//! NODEWARDEN_AUTH_KEYS=secret \
//! nodewarden
//! ```
//!
//! The agent loads every persisted server, connects the Docker backend and
//! keeps the registry alive until interrupted, persisting all servers on
//! shutdown. Log verbosity follows `RUST_LOG` and defaults to `info`.

use nodewarden::auth::AuthorizationGate;
use nodewarden::config::{AgentConfig, ConfigError};
use nodewarden::server::adapters::{DockerEnvironmentFactory, FsServerStore, LoggingInstallHook};
use nodewarden::server::domain::DEFAULT_ENVIRONMENT;
use nodewarden::server::ports::{EnvironmentBackends, EnvironmentError};
use nodewarden::server::services::{
    ActionRunner, ServerControlService, ServerError, ServerRegistry,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Builder;
use tracing_subscriber::EnvFilter;

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that stop the agent.
#[derive(Debug, Error)]
enum AgentError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to connect to the container runtime: {0}")]
    Runtime(#[from] EnvironmentError),
    #[error("failed to build async runtime: {0}")]
    AsyncRuntime(#[source] std::io::Error),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("failed to wait for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

fn main() -> Result<(), BoxError> {
    init_tracing();
    let config = AgentConfig::from_env().map_err(AgentError::from)?;
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(AgentError::AsyncRuntime)?;
    runtime.block_on(run(config)).map_err(Into::into)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: AgentConfig) -> Result<(), AgentError> {
    let layout = config.layout()?;
    let catalog = config.service_catalog()?;
    let docker = DockerEnvironmentFactory::connect(
        config.docker_socket.as_deref(),
        layout.clone(),
        catalog.clone(),
        i64::from(config.stop_timeout_secs),
    )?;
    let backends = EnvironmentBackends::new().with_backend(DEFAULT_ENVIRONMENT, Arc::new(docker));

    let store = Arc::new(FsServerStore::new(layout.clone()));
    let registry = Arc::new(ServerRegistry::new(store, backends, catalog, layout));
    let loaded = registry.load_all().await?;

    let runner = ActionRunner::new(config.max_concurrent_actions, Arc::new(LoggingInstallHook));
    let control = ServerControlService::new(
        AuthorizationGate::new(config.global_keys()),
        Arc::clone(&registry),
        runner,
    );
    tracing::info!(
        servers = loaded,
        management_root = %control.registry().layout().management_root(),
        data_root = %control.registry().layout().data_root(),
        "node agent ready"
    );

    tokio::signal::ctrl_c().await.map_err(AgentError::Signal)?;
    tracing::info!("shutting down; persisting server configurations");
    registry.persist_all().await?;
    Ok(())
}
