//! Permission evaluation for control requests.

use super::permissions::PermissionScope;
use crate::server::domain::ServerConfiguration;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Error returned when a required permission is not held.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    /// The credential does not carry the permission.
    #[error("permission '{permission}' denied")]
    PermissionDenied {
        /// Permission that was required.
        permission: String,
    },
}

/// Evaluates permission strings against a presented token.
///
/// The gate holds only the configured global keys. Each evaluation is pure:
/// it takes the token, the permission and the server resolved from the
/// request, if any, and never mutates anything.
#[derive(Clone, Default)]
pub struct AuthorizationGate {
    global_keys: HashSet<String>,
}

impl fmt::Debug for AuthorizationGate {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthorizationGate")
            .field("global_keys", &self.global_keys.len())
            .finish()
    }
}

impl AuthorizationGate {
    /// Creates a gate accepting `global_keys`. Empty keys are ignored.
    #[must_use]
    pub fn new<I, K>(global_keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            global_keys: global_keys
                .into_iter()
                .map(Into::into)
                .filter(|key| !key.is_empty())
                .collect(),
        }
    }

    /// Returns whether `token` is a configured global key.
    #[must_use]
    pub fn is_global_key(&self, token: &str) -> bool {
        !token.is_empty() && self.global_keys.contains(token)
    }

    /// Returns whether `token` holds `permission`.
    ///
    /// Global-key and server-scoped permissions fail closed when `server`
    /// is `None`.
    #[must_use]
    pub fn has_permission(
        &self,
        token: &str,
        permission: &str,
        server: Option<&ServerConfiguration>,
    ) -> bool {
        let scope = PermissionScope::of(permission);
        if scope.needs_server() && server.is_none() {
            tracing::warn!(permission, "permission requires a server but none was resolved");
            return false;
        }
        match scope {
            PermissionScope::Unrestricted => true,
            PermissionScope::Controller | PermissionScope::Global => self.is_global_key(token),
            PermissionScope::Server => {
                self.is_global_key(token)
                    || server.is_some_and(|configuration| {
                        !token.is_empty() && configuration.grants(token, permission)
                    })
            }
            PermissionScope::Unknown => {
                tracing::debug!(permission, "unknown permission scope");
                false
            }
        }
    }

    /// Fails unless `token` holds `permission`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizationError::PermissionDenied`] when
    /// [`Self::has_permission`] is false.
    pub fn require(
        &self,
        token: &str,
        permission: &str,
        server: Option<&ServerConfiguration>,
    ) -> Result<(), AuthorizationError> {
        if self.has_permission(token, permission, server) {
            return Ok(());
        }
        tracing::debug!(
            permission,
            server_id = server.map(|configuration| configuration.id.as_str()),
            "permission denied"
        );
        Err(AuthorizationError::PermissionDenied {
            permission: permission.to_owned(),
        })
    }
}

/// Extracts the credential from an `Authorization: Bearer <token>` value.
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, credential) = header.trim().split_once(' ')?;
    let token = credential.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
