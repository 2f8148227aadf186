use std::time::Duration;

use thiserror::Error;

use crate::fixture::FixtureState;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Error types that can occur while managing a LocalStack container.
///
/// Image pull, container creation and container start failures are fatal for
/// the collection being set up and are returned as-is; nothing is retried.
#[derive(Error, Debug)]
pub enum Error {
    /// The Docker daemon could not be reached.
    #[error("Failed to connect to the container runtime")]
    Connect(#[source] bollard::errors::Error),

    /// No free TCP port could be reserved on the loopback interface.
    #[error("Failed to select a free host port")]
    PortSelection(#[source] std::io::Error),

    /// The fixture configuration was rejected by `LocalStackConfig::validate`.
    #[error("Invalid LocalStack configuration: {0}")]
    InvalidConfig(String),

    /// The emulator image could not be inspected or pulled.
    #[error("Failed to pull image '{image}'")]
    ImagePull {
        /// Image reference including tag
        image: String,
        #[source]
        source: bollard::errors::Error,
    },

    /// The runtime refused to create the container.
    #[error("Failed to create container '{name}'")]
    ContainerCreate {
        /// Generated container name
        name: String,
        #[source]
        source: bollard::errors::Error,
    },

    /// The container was created but could not be started.
    #[error("Failed to start container {id}")]
    ContainerStart {
        /// Container identifier assigned by the runtime
        id: String,
        #[source]
        source: bollard::errors::Error,
    },

    /// The stop request for a running container failed.
    ///
    /// The container may be left behind; auto-remove only applies once the
    /// runtime actually stops it.
    #[error("Failed to stop container {id}")]
    ContainerStop {
        /// Container identifier assigned by the runtime
        id: String,
        #[source]
        source: bollard::errors::Error,
    },

    /// Force removal of a container failed.
    #[error("Failed to remove container {id}")]
    ContainerRemove {
        /// Container identifier assigned by the runtime
        id: String,
        #[source]
        source: bollard::errors::Error,
    },

    /// Listing containers failed.
    #[error("Failed to list containers")]
    ContainerList(#[source] bollard::errors::Error),

    /// Start was aborted through its cancellation token.
    #[error("LocalStack start was cancelled")]
    Cancelled,

    /// The emulator never answered its health endpoint in time.
    #[error("LocalStack at {url} did not become ready within {timeout:?}")]
    NotReady {
        /// Health endpoint that was polled
        url: String,
        /// Probe deadline
        timeout: Duration,
    },

    /// The HTTP client used by the readiness probe could not be built.
    #[error("Failed to build the readiness probe HTTP client")]
    ProbeClient(#[source] reqwest::Error),

    /// `initialize` was called on a fixture that already left `Uninitialized`.
    #[error("Fixture cannot be initialized from state {0:?}")]
    AlreadyInitialized(FixtureState),

    /// Blocking teardown was requested from inside a current-thread runtime.
    #[error("Blocking teardown is not supported inside a current-thread tokio runtime; use teardown().await")]
    BlockingTeardownUnsupported,

    /// A temporary runtime for blocking teardown could not be built.
    #[error("Failed to build a tokio runtime for teardown")]
    Runtime(#[source] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
