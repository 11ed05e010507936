//! Docker environment backend.
//!
//! Each server maps to one container named after the server identifier. The
//! container is created from the server's image, limits, variables and port
//! allocations, with the server data directory bind-mounted at
//! [`CONTAINER_DATA_PATH`].

use crate::server::{
    domain::{ContainerInfo, DirectoryLayout, ServerConfiguration, ServiceCatalog},
    ports::{Environment, EnvironmentError, EnvironmentFactory, EnvironmentResult},
};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    InspectContainerOptions, KillContainerOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::models::{HostConfig, PortBinding};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Mount point of the server data directory inside the container.
pub const CONTAINER_DATA_PATH: &str = "/home/container";

const BYTES_PER_MIB: i64 = 1024 * 1024;
const CPU_PERIOD_MICROS: i64 = 100_000;
const CPU_QUOTA_PER_PERCENT: i64 = 1_000;
const CLIENT_TIMEOUT_SECS: u64 = 120;
const HTTP_NOT_MODIFIED: u16 = 304;
const HTTP_NOT_FOUND: u16 = 404;

/// Builds [`DockerEnvironment`] handles sharing one Docker client.
#[derive(Debug, Clone)]
pub struct DockerEnvironmentFactory {
    docker: Docker,
    layout: DirectoryLayout,
    catalog: ServiceCatalog,
    stop_timeout_secs: i64,
}

impl DockerEnvironmentFactory {
    /// Creates a factory over an established Docker client.
    #[must_use]
    pub const fn new(
        docker: Docker,
        layout: DirectoryLayout,
        catalog: ServiceCatalog,
        stop_timeout_secs: i64,
    ) -> Self {
        Self {
            docker,
            layout,
            catalog,
            stop_timeout_secs,
        }
    }

    /// Connects to the Docker daemon at `socket`, or the local default.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::Runtime`] when the client cannot be built.
    pub fn connect(
        socket: Option<&str>,
        layout: DirectoryLayout,
        catalog: ServiceCatalog,
        stop_timeout_secs: i64,
    ) -> EnvironmentResult<Self> {
        let docker = socket
            .map_or_else(Docker::connect_with_local_defaults, |path| {
                Docker::connect_with_unix(path, CLIENT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            })
            .map_err(EnvironmentError::runtime)?;
        Ok(Self::new(docker, layout, catalog, stop_timeout_secs))
    }
}

impl EnvironmentFactory for DockerEnvironmentFactory {
    fn build(&self, server: &ServerConfiguration) -> EnvironmentResult<Arc<dyn Environment>> {
        let data_directory = self.layout.data_directory(&server.id);
        let fallback_image = self
            .catalog
            .resolve(&server.service_name)
            .docker_image
            .clone();
        Ok(Arc::new(DockerEnvironment {
            docker: self.docker.clone(),
            data_directory: data_directory.into_string(),
            fallback_image,
            stop_timeout_secs: self.stop_timeout_secs,
        }))
    }
}

/// Environment running a server inside a Docker container.
#[derive(Debug, Clone)]
pub struct DockerEnvironment {
    docker: Docker,
    data_directory: String,
    fallback_image: Option<String>,
    stop_timeout_secs: i64,
}

const fn status_code(err: &DockerError) -> Option<u16> {
    match err {
        DockerError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

/// Treats the listed HTTP statuses as success.
fn tolerate(result: Result<(), DockerError>, statuses: &[u16]) -> EnvironmentResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if status_code(&err).is_some_and(|code| statuses.contains(&code)) => Ok(()),
        Err(err) => Err(EnvironmentError::runtime(err)),
    }
}

/// Frames `command` as a single line of console input.
fn console_line(command: &str) -> Vec<u8> {
    let mut line = command.trim_end_matches(['\r', '\n']).as_bytes().to_vec();
    line.push(b'\n');
    line
}

fn mebibytes(value: u64) -> Option<i64> {
    if value == 0 {
        return None;
    }
    i64::try_from(value)
        .ok()
        .and_then(|mib| mib.checked_mul(BYTES_PER_MIB))
}

impl DockerEnvironment {
    fn container_name(server: &ServerConfiguration) -> &str {
        server.id.as_str()
    }

    fn image(&self, server: &ServerConfiguration) -> EnvironmentResult<String> {
        Some(server.settings.image.clone())
            .filter(|image| !image.is_empty())
            .or_else(|| self.fallback_image.clone())
            .ok_or_else(|| EnvironmentError::InvalidConfiguration {
                server_id: server.id.clone(),
                reason: "no image configured".to_owned(),
            })
    }

    fn host_config(&self, server: &ServerConfiguration) -> HostConfig {
        let settings = &server.settings;
        let memory = mebibytes(settings.memory);
        let memory_swap = memory.and_then(|limit| {
            mebibytes(settings.swap).map_or(Some(limit), |swap| limit.checked_add(swap))
        });
        let cpu_quota = match settings.cpu {
            0 => None,
            percent => i64::try_from(percent)
                .ok()
                .and_then(|value| value.checked_mul(CPU_QUOTA_PER_PERCENT)),
        };
        let blkio_weight = match settings.io {
            0 => None,
            weight => u16::try_from(weight.clamp(10, 1000)).ok(),
        };

        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        for port in &server.allocations.ports {
            let binding = PortBinding {
                host_ip: Some(server.allocations.primary_ip.clone()).filter(|ip| !ip.is_empty()),
                host_port: Some(port.to_string()),
            };
            for protocol in ["tcp", "udp"] {
                port_bindings.insert(format!("{port}/{protocol}"), Some(vec![binding.clone()]));
            }
        }

        HostConfig {
            memory,
            memory_swap,
            cpu_quota,
            cpu_period: cpu_quota.map(|_| CPU_PERIOD_MICROS),
            blkio_weight,
            port_bindings: Some(port_bindings),
            binds: Some(vec![format!(
                "{}:{CONTAINER_DATA_PATH}",
                self.data_directory
            )]),
            ..Default::default()
        }
    }

    fn container_config(&self, server: &ServerConfiguration, image: &str) -> Config<String> {
        let env = server
            .environment_variables
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .chain(std::iter::once(format!(
                "STARTUP={}",
                server.startup_command
            )))
            .collect();
        let exposed_ports = server
            .allocations
            .ports
            .iter()
            .flat_map(|port| {
                ["tcp", "udp"].map(|protocol| (format!("{port}/{protocol}"), HashMap::new()))
            })
            .collect();
        let user = match (server.settings.user_id, server.settings.user.as_str()) {
            (0, "") => None,
            (0, name) => Some(name.to_owned()),
            (uid, _) => Some(uid.to_string()),
        };

        Config {
            image: Some(image.to_owned()),
            env: Some(env),
            user,
            exposed_ports: Some(exposed_ports),
            working_dir: Some(CONTAINER_DATA_PATH.to_owned()),
            open_stdin: Some(true),
            attach_stdin: Some(true),
            tty: Some(true),
            host_config: Some(self.host_config(server)),
            ..Default::default()
        }
    }

    async fn create_container(
        &self,
        server: &ServerConfiguration,
    ) -> EnvironmentResult<ContainerInfo> {
        let image = self.image(server)?;
        let options = CreateContainerOptions {
            name: Self::container_name(server).to_owned(),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), self.container_config(server, &image))
            .await
            .map_err(EnvironmentError::runtime)?;
        tracing::debug!(server_id = %server.id, container_id = %response.id, "created container");
        Ok(ContainerInfo::new(response.id, image))
    }
}

#[async_trait]
impl Environment for DockerEnvironment {
    async fn exists(&self, server: &ServerConfiguration) -> EnvironmentResult<bool> {
        match self
            .docker
            .inspect_container(
                Self::container_name(server),
                None::<InspectContainerOptions>,
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if status_code(&err) == Some(HTTP_NOT_FOUND) => Ok(false),
            Err(err) => Err(EnvironmentError::runtime(err)),
        }
    }

    async fn create(&self, server: &ServerConfiguration) -> EnvironmentResult<ContainerInfo> {
        self.create_container(server).await
    }

    async fn start(&self, server: &ServerConfiguration) -> EnvironmentResult<()> {
        let result = self
            .docker
            .start_container(
                Self::container_name(server),
                None::<StartContainerOptions<String>>,
            )
            .await;
        match result {
            Err(err) if status_code(&err) == Some(HTTP_NOT_FOUND) => {
                Err(EnvironmentError::Missing(server.id.clone()))
            }
            other => tolerate(other, &[HTTP_NOT_MODIFIED]),
        }
    }

    async fn stop(&self, server: &ServerConfiguration) -> EnvironmentResult<()> {
        let options = StopContainerOptions {
            t: self.stop_timeout_secs,
        };
        let result = self
            .docker
            .stop_container(Self::container_name(server), Some(options))
            .await;
        tolerate(result, &[HTTP_NOT_MODIFIED, HTTP_NOT_FOUND])
    }

    async fn kill(&self, server: &ServerConfiguration) -> EnvironmentResult<()> {
        let options = KillContainerOptions { signal: "SIGKILL" };
        let result = self
            .docker
            .kill_container(Self::container_name(server), Some(options))
            .await;
        tolerate(result, &[HTTP_NOT_FOUND])
    }

    async fn exec(&self, server: &ServerConfiguration, command: &str) -> EnvironmentResult<()> {
        let name = Self::container_name(server);
        let details = match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => details,
            Err(err) if status_code(&err) == Some(HTTP_NOT_FOUND) => {
                return Err(EnvironmentError::Missing(server.id.clone()));
            }
            Err(err) => return Err(EnvironmentError::runtime(err)),
        };
        if details.state.and_then(|state| state.running) != Some(true) {
            return Err(EnvironmentError::NotRunning(server.id.clone()));
        }

        let options = AttachContainerOptions::<String> {
            stdin: Some(true),
            stream: Some(true),
            ..Default::default()
        };
        let AttachContainerResults { mut input, .. } = self
            .docker
            .attach_container(name, Some(options))
            .await
            .map_err(EnvironmentError::runtime)?;
        input
            .write_all(&console_line(command))
            .await
            .map_err(EnvironmentError::runtime)?;
        input.flush().await.map_err(EnvironmentError::runtime)?;
        tracing::debug!(server_id = %server.id, "sent console command");
        Ok(())
    }

    async fn recreate(&self, server: &ServerConfiguration) -> EnvironmentResult<ContainerInfo> {
        self.destroy(server).await?;
        self.create_container(server).await
    }

    async fn destroy(&self, server: &ServerConfiguration) -> EnvironmentResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        let result = self
            .docker
            .remove_container(Self::container_name(server), Some(options))
            .await;
        tolerate(result, &[HTTP_NOT_FOUND])
    }
}
