//! Disposable LocalStack containers for integration tests.
//!
//! This crate starts a single `localstack/localstack` container per test
//! group, publishes its edge port on a free host port, and guarantees the
//! container is stopped afterwards whatever the tests did. Tests get the
//! service URL and the placeholder credentials and build their own AWS SDK
//! clients from them.
//!
//! ```no_run
//! use localstack_fixture::{run_collection, LocalStackConfig, LocalStackFixture};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = LocalStackConfig::default().with_services(["sns", "sqs"]);
//! run_collection(LocalStackFixture::new(config), |endpoint| async move {
//!     // build an SDK client against endpoint.service_url here
//!     Ok(())
//! })
//! .await
//! # }
//! ```

pub mod cleanup;
pub mod config;
pub mod container;
pub mod credentials;
pub mod errors;
pub mod fixture;
pub mod port;
pub mod readiness;
pub mod runtime;

#[cfg(test)]
mod mock_runtime;

pub use cleanup::remove_orphaned_containers;
pub use config::{LocalStackConfig, ReadinessProbe};
pub use container::{LocalStackContainer, LocalStackEndpoint};
pub use credentials::Credentials;
pub use errors::{Error, Result};
pub use fixture::{run_collection, AsyncLifetime, FixtureState, LocalStackFixture};
pub use runtime::{ContainerRuntime, ContainerSpec, DockerRuntime};

/// Install a `tracing` subscriber driven by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}
