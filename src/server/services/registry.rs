//! Process-wide catalog of managed servers.

use super::record::{RecordContext, ServerRecord};
use super::{ServerError, ServerResult};
use crate::server::{
    domain::{DirectoryLayout, ServerConfiguration, ServerId, ServiceCatalog},
    ports::{EnvironmentBackends, ServerStore, ServerStoreError},
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// This call removed the server.
    Removed,
    /// The server was unknown or another call is already removing it.
    Absent,
}

#[derive(Debug, Default)]
struct Catalog {
    records: HashMap<ServerId, Arc<ServerRecord>>,
    pending: HashSet<ServerId>,
}

/// Owns every [`ServerRecord`] on this host.
///
/// Lookups hand out shared handles; the catalog itself is never exposed.
/// Creation reserves the identifier before persisting so two concurrent
/// creates of the same ID cannot both succeed.
pub struct ServerRegistry {
    context: Arc<RecordContext>,
    catalog: RwLock<Catalog>,
}

impl std::fmt::Debug for ServerRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ServerRegistry")
            .field("layout", &self.context.layout)
            .field("backends", &self.context.backends)
            .field("servers", &self.len())
            .finish_non_exhaustive()
    }
}

impl ServerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(
        store: Arc<dyn ServerStore>,
        backends: EnvironmentBackends,
        catalog: ServiceCatalog,
        layout: DirectoryLayout,
    ) -> Self {
        Self {
            context: Arc::new(RecordContext {
                store,
                backends,
                catalog,
                layout,
            }),
            catalog: RwLock::new(Catalog::default()),
        }
    }

    /// Returns the directory layout records resolve paths against.
    #[must_use]
    pub fn layout(&self) -> &DirectoryLayout {
        &self.context.layout
    }

    /// Replaces the catalog with every persisted server.
    ///
    /// Returns the number of servers loaded.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Store`] for the first unreadable, malformed or
    /// duplicated document. The current catalog is left untouched.
    pub async fn load_all(&self) -> ServerResult<usize> {
        let configurations = self.context.store.load_all().await.inspect_err(|err| {
            tracing::error!(error = %err, "failed to load server configurations");
        })?;

        let mut records = HashMap::with_capacity(configurations.len());
        for configuration in configurations {
            let id = configuration.id.clone();
            if records.contains_key(&id) {
                tracing::error!(server_id = %id, "duplicate server configuration");
                return Err(ServerStoreError::DuplicateId(id).into());
            }
            let record = ServerRecord::new(configuration, Arc::clone(&self.context));
            records.insert(id, Arc::new(record));
        }

        let loaded = records.len();
        self.write().records = records;
        tracing::info!(servers = loaded, "loaded server configurations");
        Ok(loaded)
    }

    /// Registers and persists a new server.
    ///
    /// The server becomes visible only after its configuration document and
    /// data directory exist.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AlreadyExists`] when the identifier is taken
    /// (the existing server is untouched), or [`ServerError::Store`] when
    /// persistence fails, in which case nothing was registered.
    pub async fn create(&self, configuration: ServerConfiguration) -> ServerResult<Arc<ServerRecord>> {
        let id = configuration.id.clone();
        {
            let mut catalog = self.write();
            if catalog.records.contains_key(&id) || !catalog.pending.insert(id.clone()) {
                return Err(ServerError::AlreadyExists(id));
            }
        }

        let persisted = self.persist_new(&configuration).await;
        let mut catalog = self.write();
        catalog.pending.remove(&id);
        persisted.inspect_err(|err| {
            tracing::error!(server_id = %id, error = %err, "failed to create server");
        })?;

        let record = Arc::new(ServerRecord::new(configuration, Arc::clone(&self.context)));
        catalog.records.insert(id.clone(), Arc::clone(&record));
        tracing::info!(server_id = %id, "created server");
        Ok(record)
    }

    /// Returns the server registered under `id`.
    #[must_use]
    pub fn get(&self, id: &ServerId) -> Option<Arc<ServerRecord>> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .get(id)
            .cloned()
    }

    /// Returns the server registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotFound`] when no server has the identifier.
    pub fn require(&self, id: &ServerId) -> ServerResult<Arc<ServerRecord>> {
        self.get(id).ok_or_else(|| ServerError::NotFound(id.clone()))
    }

    /// Returns a snapshot of every registered server.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<ServerRecord>> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .values()
            .cloned()
            .collect()
    }

    /// Returns the number of registered servers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    /// Returns whether no servers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes a server's data, configuration and catalog entry.
    ///
    /// Filesystem failures are logged and do not stop the remaining steps;
    /// the server always leaves the catalog. Of several concurrent deletes of
    /// the same server, exactly one returns [`DeleteOutcome::Removed`].
    pub async fn delete(&self, id: &ServerId) -> DeleteOutcome {
        let Some(record) = self.get(id) else {
            return DeleteOutcome::Absent;
        };
        if !record.claim_deletion() {
            return DeleteOutcome::Absent;
        }
        self.remove_claimed(&record).await;
        DeleteOutcome::Removed
    }

    /// Removes the files and catalog entry of a record whose deletion has
    /// already been claimed.
    pub(crate) async fn remove_claimed(&self, record: &Arc<ServerRecord>) {
        let id = record.id();
        let _writes = record.block_persistence().await;
        if let Err(err) = self.context.store.remove_data(id).await {
            tracing::warn!(
                server_id = %id,
                path = %self.context.layout.data_directory(id),
                error = %err,
                "failed to remove server data directory"
            );
        }
        if let Err(err) = self.context.store.remove_configuration(id).await {
            tracing::warn!(
                server_id = %id,
                path = %self.context.layout.server_directory(id),
                error = %err,
                "failed to remove server configuration directory"
            );
        }

        let mut catalog = self.write();
        if catalog
            .records
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, record))
        {
            catalog.records.remove(id);
        }
        tracing::info!(server_id = %id, "deleted server");
    }

    /// Writes every server's configuration document.
    ///
    /// # Errors
    ///
    /// Returns the first write failure; later servers are not written.
    /// Servers being deleted are skipped.
    pub async fn persist_all(&self) -> ServerResult<()> {
        for record in self.all() {
            match record.save().await {
                Ok(()) | Err(ServerError::Deleting(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn persist_new(&self, configuration: &ServerConfiguration) -> ServerResult<()> {
        let store = &self.context.store;
        store.save(configuration).await?;
        if let Err(err) = store.create_data(&configuration.id).await {
            if let Err(cleanup) = store.remove_configuration(&configuration.id).await {
                tracing::warn!(
                    server_id = %configuration.id,
                    error = %cleanup,
                    "failed to roll back configuration of unfinished server"
                );
            }
            return Err(err.into());
        }
        Ok(())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(PoisonError::into_inner)
    }
}
