//! Install hook used when no installer is configured.

use crate::server::{domain::ServerConfiguration, ports::InstallHook};
use async_trait::async_trait;
use std::sync::Arc;

/// Install hook that records the request and succeeds.
///
/// Fetching and running install scripts is delegated to an external
/// installer; this hook keeps the lifecycle flow intact without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInstallHook;

#[async_trait]
impl InstallHook for LoggingInstallHook {
    async fn install(
        &self,
        server: &ServerConfiguration,
    ) -> Result<(), Arc<dyn std::error::Error + Send + Sync>> {
        tracing::info!(
            server_id = %server.id,
            service = %server.service_name,
            "no installer configured; skipping installation"
        );
        Ok(())
    }
}
