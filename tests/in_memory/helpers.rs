//! Shared fixtures for in-memory integration tests.

use nodewarden::auth::{AuthorizationGate, permissions};
use nodewarden::server::{
    adapters::{
        LoggingInstallHook,
        memory::{InMemoryEnvironmentHost, InMemoryServerStore},
    },
    domain::{DEFAULT_ENVIRONMENT, DirectoryLayout, ServerConfiguration, ServerId, ServiceCatalog},
    ports::EnvironmentBackends,
    services::{ActionRunner, ServerControlService, ServerRegistry},
};
use rstest::fixture;
use std::sync::Arc;

/// Global key accepted by [`Harness::control`].
pub const GLOBAL_KEY: &str = "node-secret";

/// Server key granted power and console permissions only.
pub const OPERATOR_KEY: &str = "operator";

/// Registry wired to in-memory adapters, with handles for inspection.
pub struct Harness {
    /// Registry under test.
    pub registry: Arc<ServerRegistry>,
    /// Store behind the registry.
    pub store: InMemoryServerStore,
    /// Environment backend behind the registry.
    pub host: InMemoryEnvironmentHost,
}

impl Harness {
    /// Builds a control service over this harness's registry.
    #[must_use]
    pub fn control(&self) -> ServerControlService {
        ServerControlService::new(
            AuthorizationGate::new([GLOBAL_KEY]),
            Arc::clone(&self.registry),
            runner(),
        )
    }
}

/// Returns the layout shared by every harness.
///
/// # Panics
///
/// Panics if the fixed roots are rejected.
#[must_use]
pub fn layout() -> DirectoryLayout {
    DirectoryLayout::new("/var/lib/nodewarden", "/srv/nodewarden", "server.json")
        .expect("distinct roots")
}

/// Provides a registry over empty in-memory adapters.
#[fixture]
pub fn harness() -> Harness {
    let store = InMemoryServerStore::new();
    let host = InMemoryEnvironmentHost::new();
    let backends =
        EnvironmentBackends::new().with_backend(DEFAULT_ENVIRONMENT, Arc::new(host.clone()));
    let registry = ServerRegistry::new(
        Arc::new(store.clone()),
        backends,
        ServiceCatalog::new(),
        layout(),
    );
    Harness {
        registry: Arc::new(registry),
        store,
        host,
    }
}

/// Provides a runner that logs installs and allows four concurrent actions.
#[fixture]
pub fn runner() -> ActionRunner {
    ActionRunner::new(4, Arc::new(LoggingInstallHook))
}

/// Builds a server configuration with an operator key.
///
/// # Panics
///
/// Panics if `id` is not a valid server identifier.
#[must_use]
pub fn server(id: &str) -> ServerConfiguration {
    ServerConfiguration::new(ServerId::new(id).expect("valid server id"), "minecraft")
        .with_startup_command("java -jar server.jar")
        .with_key(
            OPERATOR_KEY,
            [permissions::POWER, permissions::SEND_COMMAND, permissions::GET_SERVER],
        )
}

/// Parses a server identifier.
///
/// # Panics
///
/// Panics if `id` is not a valid server identifier.
#[must_use]
pub fn id(id: &str) -> ServerId {
    ServerId::new(id).expect("valid server id")
}
