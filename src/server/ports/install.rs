//! Installation hook port.

use crate::server::domain::ServerConfiguration;
use async_trait::async_trait;
use std::sync::Arc;

/// Runs the installation process for a server.
///
/// How install scripts are fetched and executed is up to the implementation;
/// the lifecycle layer only decides when the hook runs.
#[async_trait]
pub trait InstallHook: Send + Sync {
    /// Installs the server described by `server`.
    ///
    /// # Errors
    ///
    /// Returns the implementation's failure, which is surfaced unchanged.
    async fn install(
        &self,
        server: &ServerConfiguration,
    ) -> Result<(), Arc<dyn std::error::Error + Send + Sync>>;
}
