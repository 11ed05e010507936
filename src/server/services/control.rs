//! Transport-agnostic request boundary for server control.
//!
//! Every operation authorizes the presented token against one permission,
//! resolves the target server, then either runs the operation inline or
//! dispatches it to the [`ActionRunner`] and returns immediately.

use super::{
    ActionHandle, ActionRunner, DeleteOutcome, ServerAction, ServerError, ServerRecord,
    ServerRegistry,
};
use crate::auth::{AuthorizationError, AuthorizationGate, permissions};
use crate::sandbox::{FileError, FileStat, ServerFilesystem};
use crate::server::domain::{
    ParsePowerActionError, PowerAction, PowerActionRequest, ServerConfiguration, ServerId,
};
use camino::Utf8PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned at the request boundary.
#[derive(Debug, Clone, Error)]
pub enum ControlError {
    /// The token lacks the required permission.
    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),
    /// The requested power action is not recognized.
    #[error(transparent)]
    InvalidAction(#[from] ParsePowerActionError),
    /// A registry or lifecycle operation failed.
    #[error(transparent)]
    Server(#[from] ServerError),
    /// A file operation failed.
    #[error(transparent)]
    Files(#[from] FileError),
}

impl ControlError {
    /// Returns whether the request was rejected by the gate.
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// Result type for request boundary operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Entry point for orchestrator requests.
#[derive(Debug, Clone)]
pub struct ServerControlService {
    gate: AuthorizationGate,
    registry: Arc<ServerRegistry>,
    runner: ActionRunner,
}

impl ServerControlService {
    /// Creates a control service.
    #[must_use]
    pub const fn new(
        gate: AuthorizationGate,
        registry: Arc<ServerRegistry>,
        runner: ActionRunner,
    ) -> Self {
        Self {
            gate,
            registry,
            runner,
        }
    }

    /// Returns the registry this service controls.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// Lists every server's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without `c:list`.
    pub fn list_servers(&self, token: &str) -> ControlResult<Vec<ServerConfiguration>> {
        self.gate.require(token, permissions::LIST_SERVERS, None)?;
        Ok(self
            .registry
            .all()
            .iter()
            .map(|record| record.configuration())
            .collect())
    }

    /// Registers a server and dispatches its installation.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without `c:create`, or the
    /// registry failure.
    pub async fn create_server(
        &self,
        token: &str,
        configuration: ServerConfiguration,
    ) -> ControlResult<ActionHandle> {
        self.gate.require(token, permissions::CREATE_SERVER, None)?;
        let record = self.registry.create(configuration).await?;
        Ok(self.runner.dispatch(record, ServerAction::Install)?)
    }

    /// Returns a server's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without `s:get`.
    pub fn get_server(&self, token: &str, id: &ServerId) -> ControlResult<ServerConfiguration> {
        let record = self.authorize(token, permissions::GET_SERVER, id)?;
        Ok(record.configuration())
    }

    /// Dispatches a power action.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidAction`] for unknown actions,
    /// [`ServerError::Suspended`] when starting a suspended server, and
    /// [`ServerError::OperationInProgress`] when another action is running.
    pub fn power(
        &self,
        token: &str,
        id: &ServerId,
        request: &PowerActionRequest,
    ) -> ControlResult<ActionHandle> {
        let record = self.authorize(token, permissions::POWER, id)?;
        let action = request.parse()?;
        if action == PowerAction::Start && record.is_suspended() {
            return Err(ServerError::Suspended(id.clone()).into());
        }
        Ok(self.runner.dispatch(record, ServerAction::Power(action))?)
    }

    /// Sends a command to the running server.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without `s:command`, or the
    /// backend failure.
    pub async fn send_command(
        &self,
        token: &str,
        id: &ServerId,
        command: &str,
    ) -> ControlResult<()> {
        let record = self.authorize(token, permissions::SEND_COMMAND, id)?;
        record.exec(command).await?;
        Ok(())
    }

    /// Dispatches a rebuild of the server's runtime object.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without a global key.
    pub fn rebuild(&self, token: &str, id: &ServerId) -> ControlResult<ActionHandle> {
        let record = self.authorize(token, permissions::REBUILD_SERVER, id)?;
        Ok(self.runner.dispatch(record, ServerAction::Rebuild)?)
    }

    /// Dispatches a reinstall of the server.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without `s:install-server`.
    pub fn reinstall(&self, token: &str, id: &ServerId) -> ControlResult<ActionHandle> {
        let record = self.authorize(token, permissions::INSTALL_SERVER, id)?;
        Ok(self.runner.dispatch(record, ServerAction::Install)?)
    }

    /// Suspends or unsuspends a server.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without a global key, or a
    /// persistence failure.
    pub async fn set_suspended(
        &self,
        token: &str,
        id: &ServerId,
        suspended: bool,
    ) -> ControlResult<()> {
        let record = self.authorize(token, permissions::SUSPEND_SERVER, id)?;
        record.set_suspended(suspended).await?;
        Ok(())
    }

    /// Merges a partial configuration document into a server's
    /// configuration and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without `s:config`,
    /// [`ServerError::InvalidUpdate`] for rejected patches, or a persistence
    /// failure.
    pub async fn update_server(
        &self,
        token: &str,
        id: &ServerId,
        patch: &serde_json::Value,
    ) -> ControlResult<ServerConfiguration> {
        let record = self.authorize(token, permissions::UPDATE_SERVER, id)?;
        Ok(record.update_configuration(patch).await?)
    }

    /// Tears down a server's runtime object, then deletes the server.
    ///
    /// The server is claimed before teardown, so actions queued behind it
    /// fail instead of recreating the runtime object. A backend failure
    /// while tearing down releases the claim and aborts the deletion. A
    /// server already being deleted by another request reports
    /// [`DeleteOutcome::Absent`].
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without a global key, or the
    /// backend failure.
    pub async fn delete_server(&self, token: &str, id: &ServerId) -> ControlResult<DeleteOutcome> {
        let record = self.authorize(token, permissions::DELETE_SERVER, id)?;
        match record.retire().await {
            Ok(()) => {}
            Err(ServerError::Deleting(_)) => return Ok(DeleteOutcome::Absent),
            Err(err) => {
                tracing::error!(server_id = %id, error = %err, "failed to destroy server environment");
                return Err(err.into());
            }
        }
        self.registry.remove_claimed(&record).await;
        Ok(DeleteOutcome::Removed)
    }

    /// Reads a file from the server's data directory.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without `s:files:read`, or the
    /// file failure.
    pub async fn read_file(&self, token: &str, id: &ServerId, path: &str) -> ControlResult<String> {
        let files = self.files(token, permissions::FILES_READ, id)?;
        Ok(files.read_to_string(path).await?)
    }

    /// Returns metadata for a path in the server's data directory.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without `s:files:get`, or the
    /// file failure.
    pub async fn stat_file(&self, token: &str, id: &ServerId, path: &str) -> ControlResult<FileStat> {
        let files = self.files(token, permissions::FILES_GET, id)?;
        Ok(files.stat(path).await?)
    }

    /// Lists a directory in the server's data directory.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without `s:files:get`, or the
    /// file failure.
    pub async fn list_directory(
        &self,
        token: &str,
        id: &ServerId,
        path: &str,
    ) -> ControlResult<Vec<FileStat>> {
        let files = self.files(token, permissions::FILES_GET, id)?;
        Ok(files.list(path).await?)
    }

    /// Writes a file in the server's data directory.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without `s:files:post`, or the
    /// file failure.
    pub async fn write_file(
        &self,
        token: &str,
        id: &ServerId,
        path: &str,
        contents: Vec<u8>,
    ) -> ControlResult<()> {
        let files = self.files(token, permissions::FILES_WRITE, id)?;
        Ok(files.write(path, contents).await?)
    }

    /// Creates a directory in the server's data directory.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without `s:files:create`, or
    /// the file failure.
    pub async fn create_directory(
        &self,
        token: &str,
        id: &ServerId,
        parent: &str,
        name: &str,
    ) -> ControlResult<()> {
        let files = self.files(token, permissions::FILES_CREATE, id)?;
        Ok(files.create_dir(parent, name).await?)
    }

    /// Renames a path in the server's data directory.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without `s:files:move`, or the
    /// file failure.
    pub async fn rename_file(
        &self,
        token: &str,
        id: &ServerId,
        from: &str,
        to: &str,
    ) -> ControlResult<()> {
        let files = self.files(token, permissions::FILES_MOVE, id)?;
        Ok(files.rename(from, to).await?)
    }

    /// Copies a file next to itself.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without `s:files:copy`, or the
    /// file failure.
    pub async fn copy_file(
        &self,
        token: &str,
        id: &ServerId,
        path: &str,
    ) -> ControlResult<Utf8PathBuf> {
        let files = self.files(token, permissions::FILES_COPY, id)?;
        Ok(files.copy(path).await?)
    }

    /// Deletes a path in the server's data directory.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unauthorized`] without `s:files:delete`, or
    /// the file failure.
    pub async fn delete_file(&self, token: &str, id: &ServerId, path: &str) -> ControlResult<()> {
        let files = self.files(token, permissions::FILES_DELETE, id)?;
        Ok(files.delete(path).await?)
    }

    fn authorize(
        &self,
        token: &str,
        permission: &str,
        id: &ServerId,
    ) -> ControlResult<Arc<ServerRecord>> {
        let record = self.registry.get(id);
        if record.is_none() {
            tracing::warn!(server_id = %id, permission, "requested server not found");
        }
        let configuration = record.as_ref().map(|found| found.configuration());
        self.gate.require(token, permission, configuration.as_ref())?;
        record.ok_or_else(|| ServerError::NotFound(id.clone()).into())
    }

    fn files(
        &self,
        token: &str,
        permission: &str,
        id: &ServerId,
    ) -> ControlResult<ServerFilesystem> {
        let record = self.authorize(token, permission, id)?;
        Ok(ServerFilesystem::new(record.data_root()))
    }
}
