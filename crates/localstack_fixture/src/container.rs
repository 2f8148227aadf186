//! LocalStack container lifecycle.
//!
//! [`LocalStackContainer::start`] provisions a single emulator container and
//! returns the handle that owns it. [`LocalStackContainer::stop`] consumes
//! that handle, so a container can only be stopped once per start.

use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{LocalStackConfig, SERVICE_HOST};
use crate::credentials::Credentials;
use crate::errors::{Error, Result};
use crate::port::free_tcp_port;
use crate::readiness::wait_until_ready;
use crate::runtime::{ContainerRuntime, ContainerSpec, DockerRuntime, BIND_ALL_INTERFACES};

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;

/// Read-only view of a running container, handed to tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalStackEndpoint {
    /// Container identifier assigned by the runtime
    pub container_id: String,
    /// Host port the emulator is published on
    pub host_port: u16,
    /// Base URL for SDK clients, `http://localhost:<port>`
    pub service_url: String,
    /// Placeholder credentials for SDK clients
    pub credentials: Credentials,
}

/// Handle to a running LocalStack container.
///
/// The handle owns the runtime client it was started with. It is not
/// `Clone`; whoever holds it is responsible for calling [`stop`](Self::stop).
pub struct LocalStackContainer {
    runtime: Box<dyn ContainerRuntime>,
    id: String,
    name: String,
    host_port: u16,
    service_url: String,
    stop_timeout: std::time::Duration,
}

impl fmt::Debug for LocalStackContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStackContainer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("host_port", &self.host_port)
            .field("service_url", &self.service_url)
            .finish_non_exhaustive()
    }
}

impl LocalStackContainer {
    /// Start a container against the local Docker daemon.
    pub async fn start_with_docker(
        config: &LocalStackConfig,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let runtime = DockerRuntime::connect()?;
        Self::start(config, Box::new(runtime), cancel).await
    }

    /// Start a LocalStack container.
    ///
    /// Selects a free host port, makes sure the image is present, creates and
    /// starts the container, and (unless disabled) waits for the health
    /// endpoint. Runtime failures are returned as-is with no retry.
    ///
    /// If anything fails, or `cancel` fires, after the container was created,
    /// the container is force-removed before the error is returned. The
    /// create request itself is never interrupted by `cancel`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use localstack_fixture::{DockerRuntime, LocalStackConfig, LocalStackContainer};
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # async fn example() -> Result<(), localstack_fixture::Error> {
    /// let config = LocalStackConfig::default();
    /// let runtime = DockerRuntime::connect()?;
    /// let container =
    ///     LocalStackContainer::start(&config, Box::new(runtime), &CancellationToken::new()).await?;
    ///
    /// println!("LocalStack listening on {}", container.service_url());
    /// container.stop().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn start(
        config: &LocalStackConfig,
        runtime: Box<dyn ContainerRuntime>,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        config.validate()?;

        let host_port = free_tcp_port()?;
        let spec = ContainerSpec {
            image: config.image.clone(),
            name: generate_container_name(&config.name_prefix),
            hostname: config.hostname.clone(),
            env: config.environment(),
            container_port: config.container_port,
            host_port,
            host_ip: BIND_ALL_INTERFACES.to_string(),
            auto_remove: true,
        };
        let service_url = format!("http://{}:{}", SERVICE_HOST, host_port);

        info!(
            image = %spec.image,
            container = %spec.name,
            port = host_port,
            "Starting LocalStack container"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            result = ensure_image(runtime.as_ref(), &spec.image) => result?,
        }

        // Not raced against `cancel`: once the request is sent the daemon may
        // create the container, and the id is needed to remove it again.
        let id = runtime
            .create_container(&spec)
            .await
            .map_err(|source| Error::ContainerCreate {
                name: spec.name.clone(),
                source,
            })?;

        let outcome = if cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(Error::Cancelled),
                result = launch(runtime.as_ref(), &id, config, &service_url) => result,
            }
        };

        if let Err(err) = outcome {
            discard(runtime.as_ref(), &id).await;
            return Err(err);
        }

        info!(container_id = %id, url = %service_url, "LocalStack container running");

        Ok(Self {
            runtime,
            id,
            name: spec.name,
            host_port,
            service_url,
            stop_timeout: config.stop_timeout,
        })
    }

    /// Stop the container and release the runtime client.
    ///
    /// The container was created with auto-remove, so the runtime deletes it
    /// once stopped. A failed stop is returned and not retried.
    pub async fn stop(self) -> Result<()> {
        info!(container_id = %self.id, "Stopping LocalStack container");

        self.runtime
            .stop_container(&self.id, self.stop_timeout)
            .await
            .map_err(|source| Error::ContainerStop {
                id: self.id.clone(),
                source,
            })?;

        info!(container_id = %self.id, "LocalStack container stopped");
        Ok(())
    }

    pub(crate) fn stop_timeout(&self) -> std::time::Duration {
        self.stop_timeout
    }

    /// Container identifier assigned by the runtime.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Generated container name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host port the emulator is published on.
    pub fn host_port(&self) -> u16 {
        self.host_port
    }

    /// Base URL for SDK clients.
    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    /// Placeholder credentials for SDK clients.
    pub fn credentials(&self) -> Credentials {
        Credentials::localstack()
    }

    /// Cloneable projection of this handle.
    pub fn endpoint(&self) -> LocalStackEndpoint {
        LocalStackEndpoint {
            container_id: self.id.clone(),
            host_port: self.host_port,
            service_url: self.service_url.clone(),
            credentials: self.credentials(),
        }
    }
}

/// `<prefix>-<uuid without dashes>`, unique per call.
pub fn generate_container_name(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

/// Pull the image unless the runtime already has it.
async fn ensure_image(runtime: &dyn ContainerRuntime, image: &str) -> Result<()> {
    let image_error = |source| Error::ImagePull {
        image: image.to_string(),
        source,
    };

    if runtime.image_exists(image).await.map_err(image_error)? {
        tracing::debug!(image = %image, "Image already present");
    } else {
        info!(image = %image, "Pulling image");
        runtime.pull_image(image).await.map_err(image_error)?;
    }
    Ok(())
}

/// Start a created container and, if configured, wait for it to be ready.
async fn launch(
    runtime: &dyn ContainerRuntime,
    id: &str,
    config: &LocalStackConfig,
    service_url: &str,
) -> Result<()> {
    runtime
        .start_container(id)
        .await
        .map_err(|source| Error::ContainerStart {
            id: id.to_string(),
            source,
        })?;

    if let Some(probe) = &config.readiness {
        wait_until_ready(service_url, &config.services, probe).await?;
    }
    Ok(())
}

/// Best-effort removal of a container whose start did not complete.
async fn discard(runtime: &dyn ContainerRuntime, id: &str) {
    match runtime.remove_container(id).await {
        Ok(()) => info!(container_id = %id, "Removed container after failed start"),
        Err(e) => warn!(
            container_id = %id,
            error = %e,
            "Failed to remove container after failed start"
        ),
    }
}
