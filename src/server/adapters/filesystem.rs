//! Filesystem-backed server store.
//!
//! Configuration documents are JSON files at
//! `<management root>/<server id>/<config file name>`; data directories live
//! at `<data root>/<server id>`. All access goes through capability
//! directory handles opened on the two roots.

use crate::server::{
    domain::{DirectoryLayout, ServerConfiguration, ServerId},
    ports::{ServerStore, ServerStoreError, ServerStoreResult},
};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use std::io;
use uuid::Uuid;

/// Server store persisting JSON documents below the management root.
#[derive(Debug, Clone)]
pub struct FsServerStore {
    layout: DirectoryLayout,
}

impl FsServerStore {
    /// Creates a store over the given layout.
    #[must_use]
    pub const fn new(layout: DirectoryLayout) -> Self {
        Self { layout }
    }

    async fn blocking<T, F>(&self, operation: F) -> ServerStoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(DirectoryLayout) -> ServerStoreResult<T> + Send + 'static,
    {
        let layout = self.layout.clone();
        let root = layout.management_root().to_owned();
        tokio::task::spawn_blocking(move || operation(layout))
            .await
            .map_err(|err| ServerStoreError::io(root, err))?
    }
}

fn open_or_create(root: &Utf8Path) -> ServerStoreResult<Dir> {
    Dir::create_ambient_dir_all(root, ambient_authority())
        .and_then(|()| Dir::open_ambient_dir(root, ambient_authority()))
        .map_err(|err| ServerStoreError::io(root, err))
}

fn read_documents(layout: &DirectoryLayout) -> ServerStoreResult<Vec<ServerConfiguration>> {
    let root = layout.management_root();
    let management = open_or_create(root)?;
    let entries = management
        .entries()
        .map_err(|err| ServerStoreError::io(root, err))?;

    let mut servers = Vec::new();
    for entry_result in entries {
        let entry = entry_result.map_err(|err| ServerStoreError::io(root, err))?;
        let is_directory = entry
            .file_type()
            .map_err(|err| ServerStoreError::io(root, err))?
            .is_dir();
        if !is_directory {
            continue;
        }

        let directory_name = entry
            .file_name()
            .map_err(|err| ServerStoreError::io(root, err))?;
        let relative = Utf8PathBuf::from(&directory_name).join(layout.config_file_name());
        let path = root.join(&relative);
        let raw = management
            .read_to_string(&relative)
            .map_err(|err| ServerStoreError::io(path.clone(), err))?;
        let configuration: ServerConfiguration = serde_json::from_str(&raw)
            .map_err(|err| ServerStoreError::malformed(path.clone(), err))?;

        if configuration.id.as_str() != directory_name {
            return Err(ServerStoreError::MismatchedId {
                path,
                declared: configuration.id,
            });
        }
        servers.push(configuration);
    }

    Ok(servers)
}

fn write_document(layout: &DirectoryLayout, server: &ServerConfiguration) -> ServerStoreResult<()> {
    let management = open_or_create(layout.management_root())?;
    let path = layout.config_path(&server.id);
    let directory = Utf8Path::new(server.id.as_str());
    let target = directory.join(layout.config_file_name());
    let staging = directory.join(format!(
        ".{}.{}.tmp",
        layout.config_file_name(),
        Uuid::new_v4().simple()
    ));

    let document =
        serde_json::to_vec_pretty(server).map_err(|err| ServerStoreError::io(path.clone(), err))?;
    management
        .create_dir_all(directory)
        .and_then(|()| management.write(&staging, &document))
        .and_then(|()| management.rename(&staging, &management, &target))
        .inspect_err(|_| discard_staging(&management, &staging))
        .map_err(|err| ServerStoreError::io(path, err))
}

fn discard_staging(management: &Dir, staging: &Utf8Path) {
    if let Err(err) = management.remove_file(staging) {
        tracing::debug!(path = %staging, error = %err, "left staging document behind");
    }
}

fn remove_tree(root: &Utf8Path, name: &str) -> ServerStoreResult<()> {
    let path = root.join(name);
    let parent = match Dir::open_ambient_dir(root, ambient_authority()) {
        Ok(dir) => dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(ServerStoreError::io(path, err)),
    };
    match parent.remove_dir_all(name) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ServerStoreError::io(path, err)),
    }
}

#[async_trait]
impl ServerStore for FsServerStore {
    async fn load_all(&self) -> ServerStoreResult<Vec<ServerConfiguration>> {
        self.blocking(|layout| read_documents(&layout)).await
    }

    async fn save(&self, server: &ServerConfiguration) -> ServerStoreResult<()> {
        let snapshot = server.clone();
        self.blocking(move |layout| write_document(&layout, &snapshot))
            .await
    }

    async fn create_data(&self, server_id: &ServerId) -> ServerStoreResult<()> {
        let name = server_id.as_str().to_owned();
        self.blocking(move |layout| {
            let data = open_or_create(layout.data_root())?;
            data.create_dir_all(&name)
                .map_err(|err| ServerStoreError::io(layout.data_root().join(&name), err))
        })
        .await
    }

    async fn remove_data(&self, server_id: &ServerId) -> ServerStoreResult<()> {
        let name = server_id.as_str().to_owned();
        self.blocking(move |layout| remove_tree(layout.data_root(), &name))
            .await
    }

    async fn remove_configuration(&self, server_id: &ServerId) -> ServerStoreResult<()> {
        let name = server_id.as_str().to_owned();
        self.blocking(move |layout| remove_tree(layout.management_root(), &name))
            .await
    }
}
