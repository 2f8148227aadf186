//! Collection-level fixture around a single LocalStack container.
//!
//! A [`LocalStackFixture`] is created once per group of tests, initialized
//! before the first test runs and torn down after the last one, whatever the
//! outcome of the tests. [`run_collection`] wires those hooks together.
//!
//! ```text
//! Uninitialized -> Starting -> Running -> Stopping -> Stopped
//!                      \
//!                       -> Failed   (teardown is a no-op)
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::LocalStackConfig;
use crate::container::{LocalStackContainer, LocalStackEndpoint};
use crate::errors::{Error, Result};
use crate::runtime::{ContainerRuntime, DockerRuntime};

#[cfg(test)]
#[path = "fixture_tests.rs"]
mod tests;

/// Allowance on top of the stop timeout when a dropped fixture is stopped.
const DROP_STOP_MARGIN: Duration = Duration::from_secs(5);

/// Lifecycle state of a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureState {
    /// Created, nothing started yet
    Uninitialized,
    /// Start in progress
    Starting,
    /// Container running, endpoint available
    Running,
    /// Teardown in progress
    Stopping,
    /// Teardown finished (or there was nothing to tear down)
    Stopped,
    /// Start failed; no container is held
    Failed,
}

/// Setup and teardown hooks run once around a group of tests.
#[async_trait]
pub trait AsyncLifetime: Send {
    /// What the tests in the group get to see.
    type Resource: Clone + Send + 'static;

    /// Runs once, before the first test in the group.
    async fn initialize(&mut self) -> Result<Self::Resource>;

    /// Runs once, after the last test in the group.
    async fn dispose(&mut self) -> Result<()>;
}

/// Owns one LocalStack container for the lifetime of a test group.
pub struct LocalStackFixture {
    config: LocalStackConfig,
    runtime: Option<Box<dyn ContainerRuntime>>,
    cancel: CancellationToken,
    state: FixtureState,
    container: Option<LocalStackContainer>,
}

impl LocalStackFixture {
    /// Fixture that connects to the local Docker daemon on initialize.
    pub fn new(config: LocalStackConfig) -> Self {
        Self {
            config,
            runtime: None,
            cancel: CancellationToken::new(),
            state: FixtureState::Uninitialized,
            container: None,
        }
    }

    /// Fixture that uses the given runtime instead of connecting to Docker.
    pub fn with_runtime(config: LocalStackConfig, runtime: Box<dyn ContainerRuntime>) -> Self {
        Self {
            config,
            runtime: Some(runtime),
            cancel: CancellationToken::new(),
            state: FixtureState::Uninitialized,
            container: None,
        }
    }

    /// Use an externally owned cancellation token for start.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FixtureState {
        self.state
    }

    /// The running container, if any.
    pub fn container(&self) -> Option<&LocalStackContainer> {
        self.container.as_ref()
    }

    /// Endpoint of the running container, if any.
    pub fn endpoint(&self) -> Option<LocalStackEndpoint> {
        self.container.as_ref().map(LocalStackContainer::endpoint)
    }

    /// Start the container.
    ///
    /// Only valid from `Uninitialized`. On failure the fixture moves to
    /// `Failed`, holds no container, and teardown becomes a no-op.
    pub async fn start(&mut self) -> Result<LocalStackEndpoint> {
        if self.state != FixtureState::Uninitialized {
            return Err(Error::AlreadyInitialized(self.state));
        }
        self.state = FixtureState::Starting;

        let runtime = match self.runtime.take() {
            Some(runtime) => runtime,
            None => match DockerRuntime::connect() {
                Ok(docker) => Box::new(docker),
                Err(e) => {
                    self.state = FixtureState::Failed;
                    return Err(e);
                }
            },
        };

        match LocalStackContainer::start(&self.config, runtime, &self.cancel).await {
            Ok(container) => {
                let endpoint = container.endpoint();
                self.container = Some(container);
                self.state = FixtureState::Running;
                Ok(endpoint)
            }
            Err(e) => {
                warn!(error = %e, "LocalStack fixture failed to start");
                self.state = FixtureState::Failed;
                Err(e)
            }
        }
    }

    /// Stop the container, asynchronously.
    ///
    /// Stops at most once. Calling it again, or calling it on a fixture that
    /// never reached `Running`, does nothing.
    pub async fn teardown(&mut self) -> Result<()> {
        let Some(container) = self.begin_teardown() else {
            return Ok(());
        };
        let result = container.stop().await;
        self.finish_teardown(&result);
        result
    }

    /// Stop the container, blocking the calling thread.
    ///
    /// Same semantics as [`teardown`](Self::teardown). Outside a tokio
    /// runtime a temporary current-thread runtime drives the stop; inside a
    /// multi-threaded runtime the call blocks in place. Inside a
    /// current-thread runtime it returns
    /// [`Error::BlockingTeardownUnsupported`] and leaves the fixture running.
    pub fn teardown_blocking(&mut self) -> Result<()> {
        if self.state != FixtureState::Running {
            self.begin_teardown();
            return Ok(());
        }

        let executor = BlockingExecutor::detect()?;
        let Some(container) = self.begin_teardown() else {
            return Ok(());
        };
        let result = executor.block_on(container.stop());
        self.finish_teardown(&result);
        result
    }

    /// One-shot guard shared by both teardown paths: hands out the container
    /// exactly once, on the `Running -> Stopping` transition.
    fn begin_teardown(&mut self) -> Option<LocalStackContainer> {
        match self.state {
            FixtureState::Running => {
                self.state = FixtureState::Stopping;
                self.container.take()
            }
            FixtureState::Uninitialized => {
                self.state = FixtureState::Stopped;
                None
            }
            state => {
                debug!(state = ?state, "Teardown skipped");
                None
            }
        }
    }

    fn finish_teardown(&mut self, result: &Result<()>) {
        self.state = FixtureState::Stopped;
        match result {
            Ok(()) => info!("LocalStack fixture torn down"),
            Err(e) => warn!(error = %e, "LocalStack fixture teardown failed"),
        }
    }
}

#[async_trait]
impl AsyncLifetime for LocalStackFixture {
    type Resource = LocalStackEndpoint;

    async fn initialize(&mut self) -> Result<LocalStackEndpoint> {
        self.start().await
    }

    async fn dispose(&mut self) -> Result<()> {
        self.teardown().await
    }
}

impl Drop for LocalStackFixture {
    fn drop(&mut self) {
        let Some(container) = self.container.take() else {
            return;
        };

        warn!(
            container_id = %container.id(),
            "LocalStack fixture dropped while running; stopping container"
        );

        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                handle.spawn(async move {
                    if let Err(e) = container.stop().await {
                        warn!(error = %e, "Background stop of dropped fixture failed");
                    }
                });
            }
            // A task spawned here would not be polled if the runtime shuts
            // down right after this drop, so stop on a separate thread.
            Ok(_) => {
                let stopper = std::thread::spawn(move || stop_dropped(container));
                if stopper.join().is_err() {
                    warn!("Stop of dropped fixture panicked");
                }
            }
            Err(_) => stop_dropped(container),
        }
    }
}

/// Stop a dropped fixture's container on a temporary runtime, giving up after
/// the stop timeout plus [`DROP_STOP_MARGIN`].
fn stop_dropped(container: LocalStackContainer) {
    let limit = container.stop_timeout() + DROP_STOP_MARGIN;
    let executor = match BlockingExecutor::standalone() {
        Ok(executor) => executor,
        Err(e) => {
            warn!(error = %e, "Could not stop dropped fixture");
            return;
        }
    };

    match executor.block_on(async move { tokio::time::timeout(limit, container.stop()).await }) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Stop of dropped fixture failed"),
        Err(_) => warn!(limit = ?limit, "Stop of dropped fixture timed out"),
    }
}

/// Drives a future to completion from synchronous code.
enum BlockingExecutor {
    InPlace(Handle),
    Standalone(Runtime),
}

impl BlockingExecutor {
    fn detect() -> Result<Self> {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                Ok(Self::InPlace(handle))
            }
            Ok(_) => Err(Error::BlockingTeardownUnsupported),
            Err(_) => Self::standalone(),
        }
    }

    fn standalone() -> Result<Self> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map(Self::Standalone)
            .map_err(Error::Runtime)
    }

    fn block_on<F: Future>(self, future: F) -> F::Output {
        match self {
            Self::InPlace(handle) => tokio::task::block_in_place(|| handle.block_on(future)),
            Self::Standalone(runtime) => runtime.block_on(future),
        }
    }
}

/// Run a group of tests between a fixture's setup and teardown hooks.
///
/// `body` receives the fixture's resource. Teardown runs whether the body
/// returns an error, succeeds, or panics; a panic is resumed after teardown.
/// A body error takes precedence over a teardown error.
///
/// # Example
///
/// ```no_run
/// use localstack_fixture::{run_collection, LocalStackConfig, LocalStackFixture};
///
/// # async fn example() -> anyhow::Result<()> {
/// let fixture = LocalStackFixture::new(LocalStackConfig::default());
/// run_collection(fixture, |endpoint| async move {
///     assert!(endpoint.service_url.starts_with("http://localhost:"));
///     Ok(())
/// })
/// .await
/// # }
/// ```
pub async fn run_collection<L, F, Fut, T>(mut fixture: L, body: F) -> anyhow::Result<T>
where
    L: AsyncLifetime,
    F: FnOnce(L::Resource) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let resource = match fixture.initialize().await {
        Ok(resource) => resource,
        Err(e) => {
            // Nothing was started; dispose is a no-op but still runs once.
            let _ = fixture.dispose().await;
            return Err(e.into());
        }
    };

    let outcome = AssertUnwindSafe(body(resource)).catch_unwind().await;
    let disposed = fixture.dispose().await;

    match outcome {
        Err(panic) => std::panic::resume_unwind(panic),
        Ok(Err(e)) => {
            if let Err(dispose_err) = disposed {
                warn!(error = %dispose_err, "Teardown failed after collection error");
            }
            Err(e)
        }
        Ok(Ok(value)) => {
            disposed?;
            Ok(value)
        }
    }
}
