//! Agent configuration loaded from `NODEWARDEN_*` environment variables.
//!
//! | variable | default |
//! |---|---|
//! | `NODEWARDEN_MANAGEMENT_ROOT` | required |
//! | `NODEWARDEN_DATA_ROOT` | required |
//! | `NODEWARDEN_CONFIG_FILE_NAME` | `server.json` |
//! | `NODEWARDEN_AUTH_KEYS` | required, comma separated |
//! | `NODEWARDEN_DOCKER_SOCKET` | local Docker defaults |
//! | `NODEWARDEN_STOP_TIMEOUT_SECS` | `30` |
//! | `NODEWARDEN_MAX_CONCURRENT_ACTIONS` | `8` |
//! | `NODEWARDEN_SERVICES_FILE` | built-in catalog |

use crate::server::domain::{
    DEFAULT_CONFIG_FILE_NAME, DirectoryLayout, ServerDomainError, ServiceCatalog,
};
use camino::Utf8PathBuf;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Prefix shared by every configuration variable.
pub const ENV_PREFIX: &str = "NODEWARDEN_";

/// Errors raised while loading configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A variable is missing or cannot be parsed.
    #[error("invalid environment configuration: {0}")]
    Environment(Arc<envy::Error>),

    /// The directory layout is invalid.
    #[error(transparent)]
    Layout(#[from] ServerDomainError),

    /// No global authorization keys are configured.
    #[error("at least one authorization key must be configured")]
    NoAuthKeys,

    /// The services file cannot be read.
    #[error("failed to read services file {path}: {source}")]
    ServicesRead {
        /// File location.
        path: Utf8PathBuf,
        /// Underlying failure.
        source: Arc<std::io::Error>,
    },

    /// The services file is not a valid catalog.
    #[error("failed to parse services file {path}: {source}")]
    ServicesParse {
        /// File location.
        path: Utf8PathBuf,
        /// Decoding failure.
        source: Arc<serde_json::Error>,
    },
}

/// Node agent configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Root holding per-server configuration directories.
    pub management_root: Utf8PathBuf,
    /// Root holding per-server data directories.
    pub data_root: Utf8PathBuf,
    /// Name of the per-server configuration document.
    #[serde(default = "default_config_file_name")]
    pub config_file_name: String,
    /// Comma-separated global authorization keys.
    pub auth_keys: String,
    /// Docker daemon socket path.
    #[serde(default)]
    pub docker_socket: Option<String>,
    /// Seconds a graceful stop may take before the runtime kills the server.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u32,
    /// Upper bound on concurrently executing background actions.
    #[serde(default = "default_max_concurrent_actions")]
    pub max_concurrent_actions: usize,
    /// JSON service catalog file.
    #[serde(default)]
    pub services_file: Option<Utf8PathBuf>,
}

fn default_config_file_name() -> String {
    DEFAULT_CONFIG_FILE_NAME.to_owned()
}

const fn default_stop_timeout_secs() -> u32 {
    30
}

const fn default_max_concurrent_actions() -> usize {
    8
}

impl AgentConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::validated(envy::prefixed(ENV_PREFIX).from_env::<Self>())
    }

    /// Loads configuration from explicit `(name, value)` pairs.
    ///
    /// Names carry the [`ENV_PREFIX`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is missing or invalid.
    pub fn from_vars<I>(variables: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self::validated(envy::prefixed(ENV_PREFIX).from_iter::<_, Self>(variables))
    }

    fn validated(loaded: Result<Self, envy::Error>) -> Result<Self, ConfigError> {
        let config = loaded.map_err(|err| ConfigError::Environment(Arc::new(err)))?;
        config.layout()?;
        if config.global_keys().is_empty() {
            return Err(ConfigError::NoAuthKeys);
        }
        Ok(config)
    }

    /// Returns the validated directory layout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Layout`] when both roots are the same
    /// directory or the file name is not a plain name.
    pub fn layout(&self) -> Result<DirectoryLayout, ConfigError> {
        Ok(DirectoryLayout::new(
            self.management_root.clone(),
            self.data_root.clone(),
            self.config_file_name.clone(),
        )?)
    }

    /// Returns the configured global keys, trimmed and without blanks.
    #[must_use]
    pub fn global_keys(&self) -> Vec<String> {
        self.auth_keys
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Loads the service catalog, or the built-in default when no file is
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ServicesRead`] or [`ConfigError::ServicesParse`]
    /// when the file cannot be used.
    pub fn service_catalog(&self) -> Result<ServiceCatalog, ConfigError> {
        let Some(path) = &self.services_file else {
            return Ok(ServiceCatalog::new());
        };
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::ServicesRead {
            path: path.clone(),
            source: Arc::new(err),
        })?;
        serde_json::from_str(&raw).map_err(|err| ConfigError::ServicesParse {
            path: path.clone(),
            source: Arc::new(err),
        })
    }
}
