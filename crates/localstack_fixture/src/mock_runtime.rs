//! In-memory [`ContainerRuntime`] for unit tests.
//!
//! Records every call and can be told to fail individual operations, to
//! hang on start, or to answer a create request late.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::runtime::{ContainerInfo, ContainerRuntime, ContainerSpec, RuntimeResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RuntimeCall {
    ImageExists(String),
    PullImage(String),
    Create(String),
    Start(String),
    Stop(String),
    Remove(String),
    List(String),
}

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub calls: Vec<RuntimeCall>,
    pub specs: Vec<ContainerSpec>,
    pub image_present: bool,
    pub fail_pull: bool,
    pub fail_create: bool,
    pub fail_start: bool,
    pub fail_stop: bool,
    pub fail_remove: bool,
    pub hang_on_start: bool,
    pub create_delay: Option<Duration>,
    pub listed: Vec<ContainerInfo>,
    next_id: usize,
}

/// Cheap to clone; clones share the same recorded state.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockRuntime {
    state: Arc<Mutex<MockState>>,
}

pub(crate) fn runtime_error(message: &str) -> bollard::errors::Error {
    bollard::errors::Error::DockerResponseServerError {
        status_code: 500,
        message: message.to_string(),
    }
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image_present(self) -> Self {
        self.state().image_present = true;
        self
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock poisoned")
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state().calls.clone()
    }

    pub fn specs(&self) -> Vec<ContainerSpec> {
        self.state().specs.clone()
    }

    pub fn count(&self, matches: impl Fn(&RuntimeCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| matches(c)).count()
    }

    pub fn boxed(&self) -> Box<dyn ContainerRuntime> {
        Box::new(self.clone())
    }

    pub fn list_result(&self, containers: Vec<(&str, &str, Option<DateTime<Utc>>)>) {
        self.state().listed = containers
            .into_iter()
            .map(|(id, name, created)| ContainerInfo {
                id: id.to_string(),
                name: name.to_string(),
                created,
            })
            .collect();
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn image_exists(&self, image: &str) -> RuntimeResult<bool> {
        let mut state = self.state();
        state.calls.push(RuntimeCall::ImageExists(image.to_string()));
        Ok(state.image_present)
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        let mut state = self.state();
        state.calls.push(RuntimeCall::PullImage(image.to_string()));
        if state.fail_pull {
            return Err(runtime_error("pull access denied"));
        }
        state.image_present = true;
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        let delay = {
            let mut state = self.state();
            state.calls.push(RuntimeCall::Create(spec.name.clone()));
            state.create_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.fail_create {
            return Err(runtime_error("conflict"));
        }
        state.next_id += 1;
        state.specs.push(spec.clone());
        Ok(format!("container-{}", state.next_id))
    }

    async fn start_container(&self, id: &str) -> RuntimeResult<()> {
        let (fail, hang) = {
            let mut state = self.state();
            state.calls.push(RuntimeCall::Start(id.to_string()));
            (state.fail_start, state.hang_on_start)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(runtime_error("port is already allocated"));
        }
        Ok(())
    }

    async fn stop_container(&self, id: &str, _timeout: Duration) -> RuntimeResult<()> {
        let mut state = self.state();
        state.calls.push(RuntimeCall::Stop(id.to_string()));
        if state.fail_stop {
            return Err(runtime_error("no such container"));
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> RuntimeResult<()> {
        let mut state = self.state();
        state.calls.push(RuntimeCall::Remove(id.to_string()));
        if state.fail_remove {
            return Err(runtime_error("removal in progress"));
        }
        Ok(())
    }

    async fn list_containers(&self, name_prefix: &str) -> RuntimeResult<Vec<ContainerInfo>> {
        let mut state = self.state();
        state.calls.push(RuntimeCall::List(name_prefix.to_string()));
        Ok(state
            .listed
            .iter()
            .filter(|c| c.name.starts_with(name_prefix))
            .cloned()
            .collect())
    }
}
