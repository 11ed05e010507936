//! Supervised background dispatch of long-running lifecycle actions.

use super::{ServerError, ServerRecord, ServerResult};
use crate::server::{
    domain::{PowerAction, ServerId},
    ports::InstallHook,
};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Lifecycle action run in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerAction {
    /// A power transition.
    Power(PowerAction),
    /// Recreate the runtime object from current configuration.
    Rebuild,
    /// Run the install hook.
    Install,
}

impl fmt::Display for ServerAction {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Power(action) => write!(formatter, "power:{action}"),
            Self::Rebuild => formatter.write_str("rebuild"),
            Self::Install => formatter.write_str("install"),
        }
    }
}

/// Handle to a dispatched action.
///
/// Dropping the handle does not cancel the action.
#[derive(Debug)]
pub struct ActionHandle {
    server_id: ServerId,
    action: ServerAction,
    task: JoinHandle<ServerResult<()>>,
}

impl ActionHandle {
    /// Returns the server the action targets.
    #[must_use]
    pub const fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    /// Returns the dispatched action.
    #[must_use]
    pub const fn action(&self) -> ServerAction {
        self.action
    }

    /// Waits for the action to finish and returns its outcome.
    ///
    /// # Errors
    ///
    /// Returns the action's own failure, or [`ServerError::Aborted`] when the
    /// task ended without a result.
    pub async fn wait(self) -> ServerResult<()> {
        self.task
            .await
            .map_err(|_| ServerError::Aborted(self.server_id.clone()))?
    }
}

/// Runs lifecycle actions on background tasks.
///
/// At most one dispatched action per server is in flight; a second dispatch
/// for the same server is rejected rather than queued. A semaphore bounds how
/// many actions execute at once across all servers.
#[derive(Clone)]
pub struct ActionRunner {
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<ServerId>>>,
    install_hook: Arc<dyn InstallHook>,
}

impl fmt::Debug for ActionRunner {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ActionRunner")
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

/// Releases a server's in-flight slot when the action task ends.
struct InFlightSlot {
    in_flight: Arc<Mutex<HashSet<ServerId>>>,
    server_id: ServerId,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.server_id);
    }
}

impl ActionRunner {
    /// Creates a runner executing at most `max_concurrent` actions at once.
    #[must_use]
    pub fn new(max_concurrent: usize, install_hook: Arc<dyn InstallHook>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            install_hook,
        }
    }

    /// Returns whether an action is in flight for `server_id`.
    #[must_use]
    pub fn is_busy(&self, server_id: &ServerId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(server_id)
    }

    /// Dispatches `action` for `record` and returns without waiting.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::OperationInProgress`] when another dispatched
    /// action for the same server has not finished.
    pub fn dispatch(
        &self,
        record: Arc<ServerRecord>,
        action: ServerAction,
    ) -> ServerResult<ActionHandle> {
        let server_id = record.id().clone();
        if !self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(server_id.clone())
        {
            tracing::debug!(server_id = %server_id, %action, "rejected overlapping action");
            return Err(ServerError::OperationInProgress(server_id));
        }

        let slot = InFlightSlot {
            in_flight: Arc::clone(&self.in_flight),
            server_id: server_id.clone(),
        };
        let permits = Arc::clone(&self.permits);
        let install_hook = Arc::clone(&self.install_hook);
        let task_server_id = server_id.clone();

        let task = tokio::spawn(async move {
            let _slot = slot;
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| ServerError::Aborted(task_server_id.clone()))?;
            let outcome = run(&record, action, install_hook.as_ref()).await;
            match &outcome {
                Ok(()) => tracing::info!(server_id = %task_server_id, %action, "action completed"),
                Err(err) => tracing::error!(
                    server_id = %task_server_id,
                    %action,
                    error = %err,
                    "action failed"
                ),
            }
            outcome
        });

        tracing::debug!(server_id = %server_id, %action, "dispatched action");
        Ok(ActionHandle {
            server_id,
            action,
            task,
        })
    }
}

async fn run(
    record: &ServerRecord,
    action: ServerAction,
    install_hook: &dyn InstallHook,
) -> ServerResult<()> {
    match action {
        ServerAction::Power(PowerAction::Start) => record.start().await,
        ServerAction::Power(PowerAction::Stop) => record.stop().await,
        ServerAction::Power(PowerAction::Restart) => record.restart().await,
        ServerAction::Power(PowerAction::Kill) => record.kill().await,
        ServerAction::Rebuild => record.rebuild().await,
        ServerAction::Install => record.install(install_hook).await,
    }
}
