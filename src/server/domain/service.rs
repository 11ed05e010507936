//! Service definitions mapping a server's service to an environment backend.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Environment name used when a service declares none.
pub const DEFAULT_ENVIRONMENT: &str = "docker";

/// How servers of a given service are run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    /// Name of the environment backend that runs the service.
    #[serde(default = "default_environment")]
    pub environment_name: String,
    /// Image used when a server does not set its own.
    #[serde(default)]
    pub docker_image: Option<String>,
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_owned()
}

impl Default for ServiceDefinition {
    fn default() -> Self {
        Self {
            environment_name: default_environment(),
            docker_image: None,
        }
    }
}

impl ServiceDefinition {
    /// Creates a definition for the given environment backend.
    #[must_use]
    pub fn new(environment_name: impl Into<String>) -> Self {
        Self {
            environment_name: environment_name.into(),
            docker_image: None,
        }
    }

    /// Sets the default image for the service.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.docker_image = Some(image.into());
        self
    }
}

/// Known service definitions keyed by service name.
///
/// Services absent from the catalog resolve to the fallback definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCatalog {
    #[serde(default)]
    services: HashMap<String, ServiceDefinition>,
    #[serde(default)]
    fallback: ServiceDefinition,
}

impl ServiceCatalog {
    /// Creates an empty catalog using the default fallback definition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a service definition.
    #[must_use]
    pub fn with_service(
        mut self,
        service_name: impl Into<String>,
        definition: ServiceDefinition,
    ) -> Self {
        self.services.insert(service_name.into(), definition);
        self
    }

    /// Replaces the fallback definition.
    #[must_use]
    pub fn with_fallback(mut self, definition: ServiceDefinition) -> Self {
        self.fallback = definition;
        self
    }

    /// Returns the definition for `service_name`, or the fallback.
    #[must_use]
    pub fn resolve(&self, service_name: &str) -> &ServiceDefinition {
        self.services.get(service_name).unwrap_or(&self.fallback)
    }
}
