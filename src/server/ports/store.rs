//! Persistence port for server configuration documents and data directories.

use crate::server::domain::{ServerConfiguration, ServerId};
use async_trait::async_trait;
use camino::Utf8PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type for server store operations.
pub type ServerStoreResult<T> = Result<T, ServerStoreError>;

/// Storage contract backing the server registry.
#[async_trait]
pub trait ServerStore: Send + Sync {
    /// Reads every persisted configuration document.
    ///
    /// # Errors
    ///
    /// Fails on the first unreadable or malformed document; no partial result
    /// is returned.
    async fn load_all(&self) -> ServerStoreResult<Vec<ServerConfiguration>>;

    /// Writes the configuration document for a server.
    ///
    /// # Errors
    ///
    /// Returns [`ServerStoreError::Io`] when the document cannot be written.
    async fn save(&self, server: &ServerConfiguration) -> ServerStoreResult<()>;

    /// Creates the runtime-visible data directory of a server if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ServerStoreError::Io`] when the directory cannot be created.
    async fn create_data(&self, server_id: &ServerId) -> ServerStoreResult<()>;

    /// Removes the runtime-visible data directory of a server.
    ///
    /// # Errors
    ///
    /// Returns [`ServerStoreError::Io`] when removal fails.
    async fn remove_data(&self, server_id: &ServerId) -> ServerStoreResult<()>;

    /// Removes the management directory holding a server's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerStoreError::Io`] when removal fails.
    async fn remove_configuration(&self, server_id: &ServerId) -> ServerStoreResult<()>;
}

/// Errors returned by server store implementations.
#[derive(Debug, Clone, Error)]
pub enum ServerStoreError {
    /// A configuration document could not be decoded.
    #[error("malformed server configuration at {path}: {source}")]
    Malformed {
        /// Location of the offending document.
        path: Utf8PathBuf,
        /// Decoding failure.
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// A document declares an identifier that does not match its location.
    #[error("configuration at {path} declares server {declared}")]
    MismatchedId {
        /// Location of the offending document.
        path: Utf8PathBuf,
        /// Identifier found inside the document.
        declared: ServerId,
    },

    /// Two documents declare the same identifier.
    #[error("server {0} is configured more than once")]
    DuplicateId(ServerId),

    /// Reading or writing storage failed.
    #[error("server storage error at {path}: {source}")]
    Io {
        /// Location being accessed.
        path: Utf8PathBuf,
        /// Underlying failure.
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}

impl ServerStoreError {
    /// Wraps a decoding failure for the document at `path`.
    pub fn malformed(
        path: impl Into<Utf8PathBuf>,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Malformed {
            path: path.into(),
            source: Arc::new(err),
        }
    }

    /// Wraps a storage failure at `path`.
    pub fn io(
        path: impl Into<Utf8PathBuf>,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(err),
        }
    }

    /// Returns whether the failure came from decoding a document.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Malformed { .. } | Self::MismatchedId { .. } | Self::DuplicateId(_)
        )
    }
}
