//! In-memory environment backend for lifecycle tests.

use crate::server::{
    domain::{ContainerInfo, ServerConfiguration, ServerId},
    ports::{Environment, EnvironmentError, EnvironmentFactory, EnvironmentResult},
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Lifecycle verb observed by the in-memory backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentVerb {
    /// Existence check.
    Exists,
    /// Runtime object creation.
    Create,
    /// Start.
    Start,
    /// Graceful stop.
    Stop,
    /// Forced termination.
    Kill,
    /// Command execution.
    Exec,
    /// Destroy and rebuild.
    Recreate,
    /// Removal.
    Destroy,
}

impl EnvironmentVerb {
    /// Returns the verb name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::Create => "create",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Kill => "kill",
            Self::Exec => "exec",
            Self::Recreate => "recreate",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for EnvironmentVerb {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One call received by the in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Server the call targeted.
    pub server_id: ServerId,
    /// Lifecycle verb.
    pub verb: EnvironmentVerb,
    /// Command passed to `exec`, if any.
    pub command: Option<String>,
}

/// In-memory environment host.
///
/// Acts as an [`EnvironmentFactory`] whose environments share one state, so
/// tests can inspect the call log, count constructions and inject failures
/// without a container runtime.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEnvironmentHost {
    state: Arc<RwLock<HostState>>,
}

#[derive(Debug, Default)]
struct HostState {
    existing: HashSet<ServerId>,
    running: HashSet<ServerId>,
    calls: Vec<RecordedCall>,
    failures: HashMap<EnvironmentVerb, String>,
    constructions: HashMap<ServerId, usize>,
    delay: Option<Duration>,
    next_container: u64,
}

impl InMemoryEnvironmentHost {
    /// Creates an empty host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call of `verb` fail with `message`.
    ///
    /// # Errors
    ///
    /// Returns a runtime error when lock acquisition fails.
    pub fn fail_on(&self, verb: EnvironmentVerb, message: impl Into<String>) -> EnvironmentResult<()> {
        self.write()?.failures.insert(verb, message.into());
        Ok(())
    }

    /// Removes an injected failure for `verb`.
    ///
    /// # Errors
    ///
    /// Returns a runtime error when lock acquisition fails.
    pub fn clear_failure(&self, verb: EnvironmentVerb) -> EnvironmentResult<()> {
        self.write()?.failures.remove(&verb);
        Ok(())
    }

    /// Delays every call by `delay`, to widen race windows in tests.
    ///
    /// # Errors
    ///
    /// Returns a runtime error when lock acquisition fails.
    pub fn set_delay(&self, delay: Duration) -> EnvironmentResult<()> {
        self.write()?.delay = Some(delay);
        Ok(())
    }

    /// Marks a runtime object as already existing for `server_id`.
    ///
    /// # Errors
    ///
    /// Returns a runtime error when lock acquisition fails.
    pub fn mark_existing(&self, server_id: ServerId) -> EnvironmentResult<()> {
        self.write()?.existing.insert(server_id);
        Ok(())
    }

    /// Returns every recorded call in arrival order.
    ///
    /// # Errors
    ///
    /// Returns a runtime error when lock acquisition fails.
    pub fn calls(&self) -> EnvironmentResult<Vec<RecordedCall>> {
        Ok(self.read()?.calls.clone())
    }

    /// Returns the verbs recorded for `server_id` in arrival order.
    ///
    /// # Errors
    ///
    /// Returns a runtime error when lock acquisition fails.
    pub fn verbs_for(&self, server_id: &ServerId) -> EnvironmentResult<Vec<EnvironmentVerb>> {
        Ok(self
            .read()?
            .calls
            .iter()
            .filter(|call| &call.server_id == server_id)
            .map(|call| call.verb)
            .collect())
    }

    /// Returns how many environments were built for `server_id`.
    ///
    /// # Errors
    ///
    /// Returns a runtime error when lock acquisition fails.
    pub fn constructions(&self, server_id: &ServerId) -> EnvironmentResult<usize> {
        Ok(self
            .read()?
            .constructions
            .get(server_id)
            .copied()
            .unwrap_or_default())
    }

    /// Returns whether the runtime object for `server_id` is running.
    ///
    /// # Errors
    ///
    /// Returns a runtime error when lock acquisition fails.
    pub fn is_running(&self, server_id: &ServerId) -> EnvironmentResult<bool> {
        Ok(self.read()?.running.contains(server_id))
    }

    /// Returns whether a runtime object exists for `server_id`.
    ///
    /// # Errors
    ///
    /// Returns a runtime error when lock acquisition fails.
    pub fn exists_for(&self, server_id: &ServerId) -> EnvironmentResult<bool> {
        Ok(self.read()?.existing.contains(server_id))
    }

    fn read(&self) -> EnvironmentResult<std::sync::RwLockReadGuard<'_, HostState>> {
        self.state
            .read()
            .map_err(|err| EnvironmentError::runtime(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> EnvironmentResult<std::sync::RwLockWriteGuard<'_, HostState>> {
        self.state
            .write()
            .map_err(|err| EnvironmentError::runtime(std::io::Error::other(err.to_string())))
    }

    /// Records a call and applies any injected delay or failure.
    async fn record(
        &self,
        server: &ServerConfiguration,
        verb: EnvironmentVerb,
        command: Option<&str>,
    ) -> EnvironmentResult<()> {
        let delay = {
            let mut state = self.write()?;
            state.calls.push(RecordedCall {
                server_id: server.id.clone(),
                verb,
                command: command.map(str::to_owned),
            });
            state.delay
        };

        if let Some(duration) = delay {
            tokio::time::sleep(duration).await;
        }

        let state = self.read()?;
        match state.failures.get(&verb) {
            Some(message) => Err(EnvironmentError::runtime(std::io::Error::other(
                message.clone(),
            ))),
            None => Ok(()),
        }
    }

    fn allocate_container(&self, server: &ServerConfiguration) -> EnvironmentResult<ContainerInfo> {
        let mut state = self.write()?;
        state.next_container += 1;
        state.existing.insert(server.id.clone());
        state.running.remove(&server.id);
        Ok(ContainerInfo::new(
            format!("mem-{}-{}", server.id.short(), state.next_container),
            server.settings.image.clone(),
        ))
    }
}

impl EnvironmentFactory for InMemoryEnvironmentHost {
    fn build(&self, server: &ServerConfiguration) -> EnvironmentResult<Arc<dyn Environment>> {
        *self
            .write()?
            .constructions
            .entry(server.id.clone())
            .or_default() += 1;
        Ok(Arc::new(InMemoryEnvironment { host: self.clone() }))
    }
}

/// Environment handle produced by [`InMemoryEnvironmentHost`].
#[derive(Debug, Clone)]
pub struct InMemoryEnvironment {
    host: InMemoryEnvironmentHost,
}

#[async_trait]
impl Environment for InMemoryEnvironment {
    async fn exists(&self, server: &ServerConfiguration) -> EnvironmentResult<bool> {
        self.host.record(server, EnvironmentVerb::Exists, None).await?;
        self.host.exists_for(&server.id)
    }

    async fn create(&self, server: &ServerConfiguration) -> EnvironmentResult<ContainerInfo> {
        self.host.record(server, EnvironmentVerb::Create, None).await?;
        self.host.allocate_container(server)
    }

    async fn start(&self, server: &ServerConfiguration) -> EnvironmentResult<()> {
        self.host.record(server, EnvironmentVerb::Start, None).await?;
        let mut state = self.host.write()?;
        if !state.existing.contains(&server.id) {
            return Err(EnvironmentError::Missing(server.id.clone()));
        }
        state.running.insert(server.id.clone());
        Ok(())
    }

    async fn stop(&self, server: &ServerConfiguration) -> EnvironmentResult<()> {
        self.host.record(server, EnvironmentVerb::Stop, None).await?;
        self.host.write()?.running.remove(&server.id);
        Ok(())
    }

    async fn kill(&self, server: &ServerConfiguration) -> EnvironmentResult<()> {
        self.host.record(server, EnvironmentVerb::Kill, None).await?;
        self.host.write()?.running.remove(&server.id);
        Ok(())
    }

    async fn exec(&self, server: &ServerConfiguration, command: &str) -> EnvironmentResult<()> {
        self.host
            .record(server, EnvironmentVerb::Exec, Some(command))
            .await?;
        if !self.host.is_running(&server.id)? {
            return Err(EnvironmentError::NotRunning(server.id.clone()));
        }
        Ok(())
    }

    async fn recreate(&self, server: &ServerConfiguration) -> EnvironmentResult<ContainerInfo> {
        self.host
            .record(server, EnvironmentVerb::Recreate, None)
            .await?;
        self.host.allocate_container(server)
    }

    async fn destroy(&self, server: &ServerConfiguration) -> EnvironmentResult<()> {
        self.host
            .record(server, EnvironmentVerb::Destroy, None)
            .await?;
        let mut state = self.host.write()?;
        state.running.remove(&server.id);
        state.existing.remove(&server.id);
        Ok(())
    }
}
