//! Persisted server configuration document.

use super::{ConfigurationPatchError, ServerId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Permission granting every server-scoped action.
pub const SERVER_WILDCARD_PERMISSION: &str = "s:*";

/// Top-level document keys only the agent may change.
const READ_ONLY_FIELDS: [&str; 2] = ["dockerContainer", "suspended"];

/// Last-known identity of the runtime object backing a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Backend-assigned container identifier.
    #[serde(default)]
    pub id: String,
    /// Image the container was created from.
    #[serde(default)]
    pub image: String,
}

impl ContainerInfo {
    /// Creates container info from a backend identifier and image.
    #[must_use]
    pub fn new(id: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image: image.into(),
        }
    }
}

/// Network bindings assigned to a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocations {
    /// Every port bound for the server.
    #[serde(default)]
    pub ports: BTreeSet<u16>,
    /// Primary IP address the ports are bound on.
    #[serde(default, rename = "ip")]
    pub primary_ip: String,
    /// Primary port announced to clients.
    #[serde(default, rename = "port")]
    pub primary_port: u16,
}

/// Resource limits and run-as identity.
///
/// Memory, swap and disk are expressed in MiB, `io` is a block-IO weight and
/// `cpu` is a percentage of one core. Zero means "no limit".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Memory limit in MiB.
    #[serde(default)]
    pub memory: u64,
    /// Additional swap in MiB.
    #[serde(default)]
    pub swap: u64,
    /// Block-IO weight.
    #[serde(default)]
    pub io: u64,
    /// CPU limit as a percentage of a single core.
    #[serde(default)]
    pub cpu: u64,
    /// Disk quota in MiB.
    #[serde(default)]
    pub disk: u64,
    /// Image to run; falls back to the service definition when empty.
    #[serde(default)]
    pub image: String,
    /// User name processes run as inside the runtime.
    #[serde(default)]
    pub user: String,
    /// Numeric user ID processes run as inside the runtime.
    #[serde(default, rename = "userID")]
    pub user_id: u32,
}

/// Full persisted configuration for one managed server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfiguration {
    /// Unique server identifier.
    #[serde(rename = "uuid")]
    pub id: ServerId,
    /// Service selecting the environment backend.
    #[serde(default)]
    pub service_name: String,
    /// Command executed inside the environment on start.
    #[serde(default)]
    pub startup_command: String,
    /// Last-known backend container identity.
    #[serde(default, rename = "dockerContainer")]
    pub container: ContainerInfo,
    /// Variables injected into the runtime.
    #[serde(default, rename = "env")]
    pub environment_variables: BTreeMap<String, String>,
    /// Network bindings.
    #[serde(default, rename = "allocation")]
    pub allocations: Allocations,
    /// Resource limits and run-as identity.
    #[serde(default)]
    pub settings: Settings,
    /// Per-server tokens mapped to the permissions they grant.
    #[serde(default)]
    pub keys: BTreeMap<String, BTreeSet<String>>,
    /// Whether start-type operations are blocked.
    #[serde(default)]
    pub suspended: bool,
}

impl ServerConfiguration {
    /// Creates a configuration with empty settings for the given server.
    #[must_use]
    pub fn new(id: ServerId, service_name: impl Into<String>) -> Self {
        Self {
            id,
            service_name: service_name.into(),
            startup_command: String::new(),
            container: ContainerInfo::default(),
            environment_variables: BTreeMap::new(),
            allocations: Allocations::default(),
            settings: Settings::default(),
            keys: BTreeMap::new(),
            suspended: false,
        }
    }

    /// Sets the startup command.
    #[must_use]
    pub fn with_startup_command(mut self, command: impl Into<String>) -> Self {
        self.startup_command = command.into();
        self
    }

    /// Sets the resource settings.
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the network allocations.
    #[must_use]
    pub fn with_allocations(mut self, allocations: Allocations) -> Self {
        self.allocations = allocations;
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment_variables.insert(name.into(), value.into());
        self
    }

    /// Grants `permissions` to `token` on this server.
    #[must_use]
    pub fn with_key<I, P>(mut self, token: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.keys
            .entry(token.into())
            .or_default()
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Sets the suspension flag.
    #[must_use]
    pub const fn with_suspended(mut self, suspended: bool) -> Self {
        self.suspended = suspended;
        self
    }

    /// Returns whether `token` is granted `permission` by this server's keys.
    ///
    /// A grant is either an exact match or the server wildcard `s:*`.
    #[must_use]
    pub fn grants(&self, token: &str, permission: &str) -> bool {
        self.keys.get(token).is_some_and(|granted| {
            granted.contains(permission) || granted.contains(SERVER_WILDCARD_PERMISSION)
        })
    }

    /// Returns a copy with `patch` merged in as a JSON merge patch.
    ///
    /// Objects merge key by key, `null` removes a key and any other value
    /// replaces the existing one. Removed keys fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Rejects patches that are not objects, change the identifier, touch
    /// the container identity or suspension flag, or leave an invalid
    /// document behind.
    pub fn merged(&self, patch: &Value) -> Result<Self, ConfigurationPatchError> {
        let Value::Object(fields) = patch else {
            return Err(ConfigurationPatchError::NotAnObject);
        };
        if let Some(field) = READ_ONLY_FIELDS
            .into_iter()
            .find(|field| fields.contains_key(*field))
        {
            return Err(ConfigurationPatchError::ReadOnlyField(field));
        }

        let mut document = serde_json::to_value(self)
            .map_err(|err| ConfigurationPatchError::Invalid(Arc::new(err)))?;
        merge_patch(&mut document, patch);
        let updated: Self = serde_json::from_value(document)
            .map_err(|err| ConfigurationPatchError::Invalid(Arc::new(err)))?;

        if updated.id != self.id {
            return Err(ConfigurationPatchError::IdentifierChanged(
                updated.id.as_str().to_owned(),
            ));
        }
        Ok(updated)
    }
}

fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(entries) = patch else {
        target.clone_from(patch);
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(fields) = target {
        for (key, value) in entries {
            if value.is_null() {
                fields.remove(key);
            } else {
                merge_patch(fields.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
