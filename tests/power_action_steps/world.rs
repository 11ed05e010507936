//! Shared world state for power action BDD scenarios.

use nodewarden::auth::AuthorizationGate;
use nodewarden::server::{
    adapters::{
        LoggingInstallHook,
        memory::{InMemoryEnvironmentHost, InMemoryServerStore},
    },
    domain::{DEFAULT_ENVIRONMENT, DirectoryLayout, ServerId, ServiceCatalog},
    ports::EnvironmentBackends,
    services::{ActionRunner, ControlError, ServerControlService, ServerError, ServerRegistry},
};
use rstest::fixture;
use std::sync::Arc;

/// Global key accepted by the world's gate.
pub const GLOBAL_KEY: &str = "node-secret";

/// Server key used by the operator in scenarios.
pub const OPERATOR_KEY: &str = "operator";

/// Scenario world for power action behaviour tests.
pub struct PowerWorld {
    /// Control service under test.
    pub control: ServerControlService,
    /// Backend recording lifecycle calls.
    pub host: InMemoryEnvironmentHost,
    /// Server targeted by the scenario.
    pub server_id: Option<ServerId>,
    /// Rejection returned when dispatching, if any.
    pub rejection: Option<ControlError>,
    /// Result of the dispatched action, if one ran.
    pub outcome: Option<Result<(), ServerError>>,
}

impl PowerWorld {
    /// Creates a world over empty in-memory adapters.
    ///
    /// # Panics
    ///
    /// Panics if the fixed directory layout is rejected.
    #[must_use]
    pub fn new() -> Self {
        let host = InMemoryEnvironmentHost::new();
        let backends =
            EnvironmentBackends::new().with_backend(DEFAULT_ENVIRONMENT, Arc::new(host.clone()));
        let layout = DirectoryLayout::new("/var/lib/nodewarden", "/srv/nodewarden", "server.json")
            .expect("distinct roots");
        let registry = ServerRegistry::new(
            Arc::new(InMemoryServerStore::new()),
            backends,
            ServiceCatalog::new(),
            layout,
        );
        let control = ServerControlService::new(
            AuthorizationGate::new([GLOBAL_KEY]),
            Arc::new(registry),
            ActionRunner::new(2, Arc::new(LoggingInstallHook)),
        );
        Self {
            control,
            host,
            server_id: None,
            rejection: None,
            outcome: None,
        }
    }

    /// Returns the scenario's server identifier.
    ///
    /// # Errors
    ///
    /// Returns an error when no server was registered by a previous step.
    pub fn server_id(&self) -> Result<ServerId, eyre::Report> {
        self.server_id
            .clone()
            .ok_or_else(|| eyre::eyre!("no server registered in scenario world"))
    }
}

impl Default for PowerWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> PowerWorld {
    PowerWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
