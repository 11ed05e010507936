//! Identifier type for managed servers.

use super::ServerDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Separator between the short ID and the rest of a server identifier.
const SHORT_ID_SEPARATOR: char = '-';

/// Unique identifier for a managed server.
///
/// Identifiers are UUID-shaped strings issued by the orchestrator. They are
/// used verbatim as directory names below the management and data roots, so
/// construction rejects anything that could address a different directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerId(String);

impl ServerId {
    /// Creates a validated server identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ServerDomainError`] when the value is empty, lacks a `-`
    /// separator, contains a path separator, or names a relative directory.
    pub fn new(value: impl Into<String>) -> Result<Self, ServerDomainError> {
        let candidate = value.into().trim().to_owned();

        if candidate.is_empty() {
            return Err(ServerDomainError::EmptyServerId);
        }

        if !candidate.contains(SHORT_ID_SEPARATOR) {
            return Err(ServerDomainError::MissingIdSeparator(candidate));
        }

        let addresses_other_directory = candidate == "."
            || candidate == ".."
            || candidate.contains(['/', '\\', '\0'])
            || candidate.chars().any(char::is_whitespace);
        if addresses_other_directory {
            return Err(ServerDomainError::InvalidServerId(candidate));
        }

        Ok(Self(candidate))
    }

    /// Creates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the portion of the identifier before its first `-`.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0
            .split_once(SHORT_ID_SEPARATOR)
            .map_or(self.0.as_str(), |(head, _)| head)
    }
}

impl TryFrom<String> for ServerId {
    type Error = ServerDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServerId> for String {
    fn from(value: ServerId) -> Self {
        value.0
    }
}

impl AsRef<str> for ServerId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
