//! Container runtime access.
//!
//! The fixture only needs a handful of Docker Engine operations. They sit
//! behind [`ContainerRuntime`] so the lifecycle logic can be exercised
//! without a daemon; [`DockerRuntime`] is the `bollard` implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures_util::stream::StreamExt;
use tracing::debug;

use crate::errors::{Error, Result};

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;

/// Result of a raw runtime call, before it is given fixture context.
pub type RuntimeResult<T> = std::result::Result<T, bollard::errors::Error>;

/// Host IP the published port is bound to.
pub const BIND_ALL_INTERFACES: &str = "0.0.0.0";

/// Everything needed to create the emulator container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Image reference including tag
    pub image: String,
    /// Unique container name
    pub name: String,
    /// Hostname inside the container
    pub hostname: String,
    /// `KEY=VALUE` environment entries
    pub env: Vec<String>,
    /// Port the service listens on inside the container
    pub container_port: u16,
    /// Host port the container port is published on
    pub host_port: u16,
    /// Host IP the port is published on
    pub host_ip: String,
    /// Let the runtime delete the container once it stops
    pub auto_remove: bool,
}

impl ContainerSpec {
    /// Docker port key, e.g. `4566/tcp`.
    pub fn port_key(&self) -> String {
        format!("{}/tcp", self.container_port)
    }

    /// Translate into the Docker Engine create request.
    pub fn to_docker_config(&self) -> Config<String> {
        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            self.port_key(),
            Some(vec![PortBinding {
                host_ip: Some(self.host_ip.clone()),
                host_port: Some(self.host_port.to_string()),
            }]),
        );

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(self.port_key(), HashMap::new());

        let host_config = HostConfig {
            auto_remove: Some(self.auto_remove),
            port_bindings: Some(port_bindings),
            ..Default::default()
        };

        Config {
            image: Some(self.image.clone()),
            hostname: Some(self.hostname.clone()),
            env: Some(self.env.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}

/// A container as reported by the runtime's list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Container identifier
    pub id: String,
    /// Container name without Docker's leading `/`
    pub name: String,
    /// Creation time, when the runtime reports it
    pub created: Option<DateTime<Utc>>,
}

/// The container operations the fixture consumes.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether the image is already present locally.
    async fn image_exists(&self, image: &str) -> RuntimeResult<bool>;

    /// Pull the image, waiting for the pull to finish.
    async fn pull_image(&self, image: &str) -> RuntimeResult<()>;

    /// Create a container and return its identifier.
    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String>;

    /// Start a created container.
    async fn start_container(&self, id: &str) -> RuntimeResult<()>;

    /// Stop a running container, killing it after `timeout`.
    async fn stop_container(&self, id: &str, timeout: Duration) -> RuntimeResult<()>;

    /// Force-remove a container whatever its state.
    async fn remove_container(&self, id: &str) -> RuntimeResult<()>;

    /// List all containers (running or not) whose name starts with `name_prefix`.
    async fn list_containers(&self, name_prefix: &str) -> RuntimeResult<Vec<ContainerInfo>>;
}

/// [`ContainerRuntime`] backed by the local Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the platform defaults (`DOCKER_HOST`, the unix socket or
    /// the Windows named pipe).
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(Error::Connect)?;
        Ok(Self { docker })
    }

    /// Wrap an existing client.
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Underlying client, for callers that need more than the fixture does.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn image_exists(&self, image: &str) -> RuntimeResult<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let info = progress?;
            if let Some(status) = info.status {
                debug!(image = image, status = %status, "Pull progress");
            }
        }

        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.as_str(),
                    ..Default::default()
                }),
                spec.to_docker_config(),
            )
            .await?;

        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, warning = %warning, "Runtime warning on create");
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> RuntimeResult<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
    }

    async fn stop_container(&self, id: &str, timeout: Duration) -> RuntimeResult<()> {
        let t = i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX);
        self.docker
            .stop_container(id, Some(StopContainerOptions { t }))
            .await
    }

    async fn remove_container(&self, id: &str) -> RuntimeResult<()> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
    }

    async fn list_containers(&self, name_prefix: &str) -> RuntimeResult<Vec<ContainerInfo>> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name_prefix.to_string()]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        // The name filter is a substring match; narrow it to a real prefix.
        let matching = containers
            .into_iter()
            .filter_map(|container| {
                let id = container.id?;
                let name = container
                    .names?
                    .into_iter()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .find(|n| n.starts_with(name_prefix))?;
                let created = container
                    .created
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
                Some(ContainerInfo { id, name, created })
            })
            .collect();

        Ok(matching)
    }
}
