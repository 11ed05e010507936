//! In-memory server store with failure injection.

use crate::server::{
    domain::{ServerConfiguration, ServerId},
    ports::{ServerStore, ServerStoreError, ServerStoreResult},
};
use async_trait::async_trait;
use camino::Utf8PathBuf;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

/// Store operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StoreFault {
    /// Loading the catalog.
    Load,
    /// Writing a configuration document.
    Save,
    /// Creating a data directory.
    CreateData,
    /// Removing a data directory.
    RemoveData,
    /// Removing a configuration directory.
    RemoveConfiguration,
}

/// Thread-safe in-memory server store.
///
/// Documents are held in their serialized JSON form so loads exercise the
/// same decoding path as the filesystem store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryServerStore {
    state: Arc<RwLock<StoreState>>,
}

#[derive(Debug, Default)]
struct StoreState {
    documents: BTreeMap<String, String>,
    data_directories: BTreeSet<String>,
    faults: BTreeSet<StoreFault>,
}

impl InMemoryServerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `fault` operation fail.
    ///
    /// # Errors
    ///
    /// Returns a storage error when lock acquisition fails.
    pub fn inject(&self, fault: StoreFault) -> ServerStoreResult<()> {
        self.write()?.faults.insert(fault);
        Ok(())
    }

    /// Clears an injected fault.
    ///
    /// # Errors
    ///
    /// Returns a storage error when lock acquisition fails.
    pub fn clear(&self, fault: StoreFault) -> ServerStoreResult<()> {
        self.write()?.faults.remove(&fault);
        Ok(())
    }

    /// Stores a raw document under `directory`, bypassing serialization.
    ///
    /// # Errors
    ///
    /// Returns a storage error when lock acquisition fails.
    pub fn insert_raw(
        &self,
        directory: impl Into<String>,
        document: impl Into<String>,
    ) -> ServerStoreResult<()> {
        self.write()?
            .documents
            .insert(directory.into(), document.into());
        Ok(())
    }

    /// Returns the stored document for `server_id`, decoded.
    ///
    /// # Errors
    ///
    /// Returns a storage error when lock acquisition fails or the document
    /// is malformed.
    pub fn document(&self, server_id: &ServerId) -> ServerStoreResult<Option<ServerConfiguration>> {
        let state = self.read()?;
        state
            .documents
            .get(server_id.as_str())
            .map(|raw| decode(server_id.as_str(), raw))
            .transpose()
    }

    /// Returns whether a data directory exists for `server_id`.
    ///
    /// # Errors
    ///
    /// Returns a storage error when lock acquisition fails.
    pub fn has_data(&self, server_id: &ServerId) -> ServerStoreResult<bool> {
        Ok(self.read()?.data_directories.contains(server_id.as_str()))
    }

    fn read(&self) -> ServerStoreResult<std::sync::RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|err| ServerStoreError::io("memory", std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> ServerStoreResult<std::sync::RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|err| ServerStoreError::io("memory", std::io::Error::other(err.to_string())))
    }

    fn check(state: &StoreState, fault: StoreFault, path: &str) -> ServerStoreResult<()> {
        if state.faults.contains(&fault) {
            return Err(ServerStoreError::io(
                path,
                std::io::Error::other(format!("injected {fault:?} failure")),
            ));
        }
        Ok(())
    }
}

fn decode(directory: &str, raw: &str) -> ServerStoreResult<ServerConfiguration> {
    let path = Utf8PathBuf::from(directory);
    let configuration: ServerConfiguration =
        serde_json::from_str(raw).map_err(|err| ServerStoreError::malformed(path.clone(), err))?;
    if configuration.id.as_str() != directory {
        return Err(ServerStoreError::MismatchedId {
            path,
            declared: configuration.id,
        });
    }
    Ok(configuration)
}

#[async_trait]
impl ServerStore for InMemoryServerStore {
    async fn load_all(&self) -> ServerStoreResult<Vec<ServerConfiguration>> {
        let state = self.read()?;
        Self::check(&state, StoreFault::Load, "memory")?;
        state
            .documents
            .iter()
            .map(|(directory, raw)| decode(directory, raw))
            .collect()
    }

    async fn save(&self, server: &ServerConfiguration) -> ServerStoreResult<()> {
        let mut state = self.write()?;
        Self::check(&state, StoreFault::Save, server.id.as_str())?;
        let document = serde_json::to_string_pretty(server)
            .map_err(|err| ServerStoreError::io(server.id.as_str(), err))?;
        state
            .documents
            .insert(server.id.as_str().to_owned(), document);
        Ok(())
    }

    async fn create_data(&self, server_id: &ServerId) -> ServerStoreResult<()> {
        let mut state = self.write()?;
        Self::check(&state, StoreFault::CreateData, server_id.as_str())?;
        state
            .data_directories
            .insert(server_id.as_str().to_owned());
        Ok(())
    }

    async fn remove_data(&self, server_id: &ServerId) -> ServerStoreResult<()> {
        let mut state = self.write()?;
        Self::check(&state, StoreFault::RemoveData, server_id.as_str())?;
        state.data_directories.remove(server_id.as_str());
        Ok(())
    }

    async fn remove_configuration(&self, server_id: &ServerId) -> ServerStoreResult<()> {
        let mut state = self.write()?;
        Self::check(&state, StoreFault::RemoveConfiguration, server_id.as_str())?;
        state.documents.remove(server_id.as_str());
        Ok(())
    }
}
