//! Lifecycle state machine for a single registered server.

use super::{ServerError, ServerResult};
use crate::sandbox::FileSandbox;
use crate::server::{
    domain::{ContainerInfo, DirectoryLayout, ServerConfiguration, ServerId, ServiceCatalog},
    ports::{Environment, EnvironmentBackends, InstallHook, ServerStore},
};
use camino::Utf8PathBuf;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Mutex, MutexGuard, OnceCell};

/// Collaborators shared by every record of one registry.
pub(crate) struct RecordContext {
    pub(crate) store: Arc<dyn ServerStore>,
    pub(crate) backends: EnvironmentBackends,
    pub(crate) catalog: ServiceCatalog,
    pub(crate) layout: DirectoryLayout,
}

/// One managed server: its configuration plus the lazily resolved
/// environment that runs it.
///
/// Lifecycle calls on the same record are serialized; calls on different
/// records run independently. Configuration changes and document writes are
/// serialized separately, so the stored document always matches the last
/// change made in memory.
pub struct ServerRecord {
    id: ServerId,
    configuration: RwLock<ServerConfiguration>,
    environment: OnceCell<Arc<dyn Environment>>,
    lifecycle: Mutex<()>,
    persistence: Mutex<()>,
    deleting: AtomicBool,
    context: Arc<RecordContext>,
}

impl fmt::Debug for ServerRecord {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ServerRecord")
            .field("id", &self.id)
            .field("environment_resolved", &self.environment.initialized())
            .field("deleting", &self.deleting.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl ServerRecord {
    pub(crate) fn new(configuration: ServerConfiguration, context: Arc<RecordContext>) -> Self {
        Self {
            id: configuration.id.clone(),
            configuration: RwLock::new(configuration),
            environment: OnceCell::new(),
            lifecycle: Mutex::new(()),
            persistence: Mutex::new(()),
            deleting: AtomicBool::new(false),
            context,
        }
    }

    /// Returns the server identifier.
    #[must_use]
    pub const fn id(&self) -> &ServerId {
        &self.id
    }

    /// Returns an independent copy of the current configuration.
    #[must_use]
    pub fn configuration(&self) -> ServerConfiguration {
        self.configuration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns whether start-type operations are blocked.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.configuration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .suspended
    }

    /// Returns the host-side management directory of the server.
    ///
    /// This directory holds the configuration document and is never mounted
    /// into the runtime.
    #[must_use]
    pub fn path(&self) -> Utf8PathBuf {
        self.context.layout.server_directory(&self.id)
    }

    /// Returns the runtime-visible data directory of the server.
    #[must_use]
    pub fn data_root(&self) -> Utf8PathBuf {
        self.context.layout.data_directory(&self.id)
    }

    /// Resolves `relative` inside the server's data directory.
    ///
    /// Paths escaping the data directory resolve to the directory itself.
    #[must_use]
    pub fn data_path(&self, relative: &str) -> Utf8PathBuf {
        FileSandbox::new(self.data_root()).resolve(relative)
    }

    /// Returns the environment for this server, constructing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Backend`] wrapping `InvalidEnvironment` when the
    /// service declares an unknown backend. The failure is not cached.
    pub async fn environment(&self) -> ServerResult<Arc<dyn Environment>> {
        let environment = self
            .environment
            .get_or_try_init(|| async {
                let configuration = self.configuration();
                let definition = self.context.catalog.resolve(&configuration.service_name);
                tracing::debug!(
                    server_id = %self.id,
                    environment = %definition.environment_name,
                    "resolving server environment"
                );
                self.context
                    .backends
                    .build(&definition.environment_name, &configuration)
            })
            .await?;
        Ok(Arc::clone(environment))
    }

    /// Starts the server, creating its runtime object first when missing.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Suspended`] for suspended servers, or the
    /// backend or persistence failure that stopped the transition.
    pub async fn start(&self) -> ServerResult<()> {
        let _guard = self.lock().await?;
        self.start_locked().await
    }

    /// Stops the server gracefully.
    ///
    /// # Errors
    ///
    /// Returns the backend failure unchanged.
    pub async fn stop(&self) -> ServerResult<()> {
        let _guard = self.lock().await?;
        self.stop_locked().await
    }

    /// Stops and then starts the server. Start is skipped when stop fails.
    ///
    /// # Errors
    ///
    /// Returns the stop failure, or any failure from [`Self::start`].
    pub async fn restart(&self) -> ServerResult<()> {
        let _guard = self.lock().await?;
        self.ensure_not_suspended()?;
        self.stop_locked().await?;
        self.start_locked().await
    }

    /// Forcibly terminates the server.
    ///
    /// # Errors
    ///
    /// Returns the backend failure unchanged.
    pub async fn kill(&self) -> ServerResult<()> {
        let _guard = self.lock().await?;
        let environment = self.environment().await?;
        environment.kill(&self.configuration()).await?;
        tracing::info!(server_id = %self.id, "killed server");
        Ok(())
    }

    /// Sends `command` to the running server's console.
    ///
    /// # Errors
    ///
    /// Returns the backend failure unchanged.
    pub async fn exec(&self, command: &str) -> ServerResult<()> {
        let _guard = self.lock().await?;
        let environment = self.environment().await?;
        environment.exec(&self.configuration(), command).await?;
        Ok(())
    }

    /// Rebuilds the runtime object from the current configuration.
    ///
    /// # Errors
    ///
    /// Returns the backend failure, or the persistence failure when the new
    /// container identity cannot be saved.
    pub async fn rebuild(&self) -> ServerResult<()> {
        let _guard = self.lock().await?;
        let environment = self.environment().await?;
        let container = environment.recreate(&self.configuration()).await?;
        self.record_container(container).await?;
        tracing::info!(server_id = %self.id, "rebuilt server environment");
        Ok(())
    }

    /// Removes the runtime object entirely.
    ///
    /// # Errors
    ///
    /// Returns the backend failure unchanged.
    pub async fn destroy(&self) -> ServerResult<()> {
        let _guard = self.lock().await?;
        self.destroy_locked().await
    }

    /// Claims the record for deletion and tears down its runtime object.
    ///
    /// Lifecycle calls queued behind this one fail with
    /// [`ServerError::Deleting`]. A teardown failure releases the claim.
    pub(crate) async fn retire(&self) -> ServerResult<()> {
        let _guard = self.lock().await?;
        if !self.claim_deletion() {
            return Err(ServerError::Deleting(self.id.clone()));
        }
        self.destroy_locked().await.inspect_err(|_| {
            self.deleting.store(false, Ordering::Release);
        })
    }

    /// Runs the install hook for the server and saves its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Install`] when the hook fails, or a persistence
    /// failure.
    pub async fn install(&self, hook: &dyn InstallHook) -> ServerResult<()> {
        let _guard = self.lock().await?;
        hook.install(&self.configuration())
            .await
            .map_err(|source| ServerError::Install {
                server_id: self.id.clone(),
                source,
            })?;
        self.save().await?;
        tracing::info!(server_id = %self.id, "installed server");
        Ok(())
    }

    /// Sets the suspension flag and persists it.
    ///
    /// In-flight operations are not cancelled.
    ///
    /// # Errors
    ///
    /// Returns a persistence failure.
    pub async fn set_suspended(&self, suspended: bool) -> ServerResult<()> {
        self.persist_change(|current| Ok(current.clone().with_suspended(suspended)))
            .await?;
        tracing::info!(server_id = %self.id, suspended, "updated suspension");
        Ok(())
    }

    /// Merges `patch` into the configuration and persists the result.
    ///
    /// The patch is a JSON merge patch over the stored document. Changes
    /// that affect the runtime object take effect on the next rebuild.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidUpdate`] when the patch is rejected, or
    /// a persistence failure, in which case the configuration is unchanged.
    pub async fn update_configuration(
        &self,
        patch: &serde_json::Value,
    ) -> ServerResult<ServerConfiguration> {
        let updated = self
            .persist_change(|current| {
                current
                    .merged(patch)
                    .map_err(|source| ServerError::InvalidUpdate {
                        server_id: self.id.clone(),
                        source,
                    })
            })
            .await?;
        tracing::info!(server_id = %self.id, "updated server configuration");
        Ok(updated)
    }

    /// Writes the current configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Store`] when the write fails.
    pub async fn save(&self) -> ServerResult<()> {
        let _guard = self.persistence().await?;
        self.write_document(&self.configuration()).await
    }

    /// Marks the record as being deleted. Only the first caller wins.
    pub(crate) fn claim_deletion(&self) -> bool {
        !self.deleting.swap(true, Ordering::AcqRel)
    }

    /// Holds off configuration writes while the record's files are removed.
    pub(crate) async fn block_persistence(&self) -> MutexGuard<'_, ()> {
        self.persistence.lock().await
    }

    async fn persistence(&self) -> ServerResult<MutexGuard<'_, ()>> {
        let guard = self.persistence.lock().await;
        if self.deleting.load(Ordering::Acquire) {
            return Err(ServerError::Deleting(self.id.clone()));
        }
        Ok(guard)
    }

    async fn lock(&self) -> ServerResult<MutexGuard<'_, ()>> {
        let guard = self.lifecycle.lock().await;
        if self.deleting.load(Ordering::Acquire) {
            return Err(ServerError::Deleting(self.id.clone()));
        }
        Ok(guard)
    }

    fn ensure_not_suspended(&self) -> ServerResult<()> {
        if self.is_suspended() {
            return Err(ServerError::Suspended(self.id.clone()));
        }
        Ok(())
    }

    fn replace(&self, configuration: ServerConfiguration) {
        *self
            .configuration
            .write()
            .unwrap_or_else(PoisonError::into_inner) = configuration;
    }

    async fn write_document(&self, configuration: &ServerConfiguration) -> ServerResult<()> {
        self.context
            .store
            .save(configuration)
            .await
            .inspect_err(|err| {
                tracing::error!(server_id = %self.id, error = %err, "failed to save server configuration");
            })?;
        Ok(())
    }

    /// Applies `change` under the persistence lock.
    ///
    /// The new configuration becomes visible only once it has been written,
    /// so a failed write leaves the record unchanged.
    async fn persist_change<F>(&self, change: F) -> ServerResult<ServerConfiguration>
    where
        F: FnOnce(&ServerConfiguration) -> ServerResult<ServerConfiguration>,
    {
        let _guard = self.persistence().await?;
        let next = change(&self.configuration())?;
        self.write_document(&next).await?;
        self.replace(next.clone());
        Ok(next)
    }

    async fn record_container(&self, container: ContainerInfo) -> ServerResult<()> {
        self.persist_change(|current| {
            Ok(ServerConfiguration {
                container,
                ..current.clone()
            })
        })
        .await?;
        Ok(())
    }

    async fn start_locked(&self) -> ServerResult<()> {
        self.ensure_not_suspended()?;
        let environment = self.environment().await?;

        if !environment.exists(&self.configuration()).await? {
            let container = environment.create(&self.configuration()).await?;
            self.record_container(container).await?;
            tracing::debug!(server_id = %self.id, "created missing runtime object");
        }

        environment.start(&self.configuration()).await?;
        tracing::info!(server_id = %self.id, "started server");
        Ok(())
    }

    async fn destroy_locked(&self) -> ServerResult<()> {
        let environment = self.environment().await?;
        environment.destroy(&self.configuration()).await?;
        tracing::info!(server_id = %self.id, "destroyed server environment");
        Ok(())
    }

    async fn stop_locked(&self) -> ServerResult<()> {
        let environment = self.environment().await?;
        environment.stop(&self.configuration()).await?;
        tracing::info!(server_id = %self.id, "stopped server");
        Ok(())
    }
}
