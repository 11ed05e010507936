//! Host directory layout for server management and data files.

use super::{ServerDomainError, ServerId};
use crate::sandbox::normalize;
use camino::{Utf8Path, Utf8PathBuf};

/// Default name of the per-server configuration document.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "server.json";

/// Where server configuration and server data live on the host.
///
/// The management root holds one directory per server containing its
/// configuration document and is never mounted into a runtime. The data root
/// holds one directory per server that the runtime sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    management_root: Utf8PathBuf,
    data_root: Utf8PathBuf,
    config_file_name: String,
}

impl DirectoryLayout {
    /// Creates a validated layout.
    ///
    /// # Errors
    ///
    /// Returns [`ServerDomainError::SharedRoots`] when both roots are the same
    /// path and [`ServerDomainError::InvalidConfigFileName`] when the file name
    /// is empty or contains a separator.
    pub fn new(
        management_root: impl Into<Utf8PathBuf>,
        data_root: impl Into<Utf8PathBuf>,
        config_file_name: impl Into<String>,
    ) -> Result<Self, ServerDomainError> {
        let management_input: Utf8PathBuf = management_root.into();
        let data_input: Utf8PathBuf = data_root.into();
        let management = normalize(&management_input);
        let data = normalize(&data_input);
        let file_name = config_file_name.into();

        if management == data {
            return Err(ServerDomainError::SharedRoots(management.into_string()));
        }

        let plain_name = !file_name.is_empty()
            && file_name != "."
            && file_name != ".."
            && !file_name.contains(['/', '\\']);
        if !plain_name {
            return Err(ServerDomainError::InvalidConfigFileName(file_name));
        }

        Ok(Self {
            management_root: management,
            data_root: data,
            config_file_name: file_name,
        })
    }

    /// Returns the root holding per-server configuration directories.
    #[must_use]
    pub fn management_root(&self) -> &Utf8Path {
        &self.management_root
    }

    /// Returns the root holding per-server data directories.
    #[must_use]
    pub fn data_root(&self) -> &Utf8Path {
        &self.data_root
    }

    /// Returns the configuration document file name.
    #[must_use]
    pub fn config_file_name(&self) -> &str {
        &self.config_file_name
    }

    /// Returns the management directory for a server.
    #[must_use]
    pub fn server_directory(&self, id: &ServerId) -> Utf8PathBuf {
        self.management_root.join(id.as_str())
    }

    /// Returns the configuration document path for a server.
    #[must_use]
    pub fn config_path(&self, id: &ServerId) -> Utf8PathBuf {
        self.server_directory(id).join(&self.config_file_name)
    }

    /// Returns the runtime-visible data directory for a server.
    #[must_use]
    pub fn data_directory(&self, id: &ServerId) -> Utf8PathBuf {
        self.data_root.join(id.as_str())
    }
}
