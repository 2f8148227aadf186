//! Configuration for the LocalStack container.
//!
//! Everything here is plain code-level configuration: the fixture reads no
//! files and no environment variables of its own. The defaults reproduce the
//! classic setup of a `localstack/localstack:0.13` container serving SNS and
//! SQS on its edge port.

use std::time::Duration;

use crate::errors::{Error, Result};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Default emulator image.
pub const DEFAULT_IMAGE: &str = "localstack/localstack:0.13";

/// Edge port LocalStack listens on inside the container.
pub const DEFAULT_CONTAINER_PORT: u16 = 4566;

/// Hostname given to the container.
pub const DEFAULT_HOSTNAME: &str = "localhost";

/// Host part of the service URL; the port is always published on loopback.
pub const SERVICE_HOST: &str = "localhost";

/// Prefix for generated container names.
pub const DEFAULT_NAME_PREFIX: &str = "local-stack";

/// Services enabled when none are configured explicitly.
pub const DEFAULT_SERVICES: [&str; 2] = ["sns", "sqs"];

/// Readiness probe settings.
///
/// After the runtime reports the container as started, the fixture polls
/// `GET {service_url}{path}` until it answers successfully or `timeout`
/// elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessProbe {
    /// Health endpoint path, `/health` for LocalStack 0.x
    pub path: String,
    /// Overall deadline for the probe
    pub timeout: Duration,
    /// Delay between attempts
    pub interval: Duration,
    /// Limit for a single health request
    pub request_timeout: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            timeout: Duration::from_secs(60),
            interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Settings for a single LocalStack container.
///
/// # Example
///
/// ```
/// use localstack_fixture::LocalStackConfig;
///
/// let config = LocalStackConfig::default()
///     .with_services(["sns"])
///     .with_env("DEBUG", "1");
/// assert_eq!(config.services_env(), "SERVICES=sns");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalStackConfig {
    /// Image reference including tag
    pub image: String,
    /// Emulated services, joined into the `SERVICES` variable
    pub services: Vec<String>,
    /// Hostname inside the container; the service URL always uses [`SERVICE_HOST`]
    pub hostname: String,
    /// Port the emulator listens on inside the container
    pub container_port: u16,
    /// Prefix for generated container names
    pub name_prefix: String,
    /// Extra `KEY=VALUE` variables passed after `SERVICES`
    pub extra_env: Vec<(String, String)>,
    /// Grace period handed to the runtime's stop call
    pub stop_timeout: Duration,
    /// Readiness probe, `None` to return as soon as the container is started
    pub readiness: Option<ReadinessProbe>,
}

impl Default for LocalStackConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            services: DEFAULT_SERVICES.iter().map(|s| s.to_string()).collect(),
            hostname: DEFAULT_HOSTNAME.to_string(),
            container_port: DEFAULT_CONTAINER_PORT,
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            extra_env: Vec::new(),
            stop_timeout: Duration::from_secs(10),
            readiness: Some(ReadinessProbe::default()),
        }
    }
}

impl LocalStackConfig {
    /// Replace the emulator image.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Replace the list of emulated services.
    pub fn with_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = services.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment variable to the container.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.push((key.into(), value.into()));
        self
    }

    /// Replace the container name prefix.
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Replace the stop grace period.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Replace the readiness probe settings.
    pub fn with_readiness_probe(mut self, probe: ReadinessProbe) -> Self {
        self.readiness = Some(probe);
        self
    }

    /// Return from start as soon as the runtime reports the container started.
    pub fn without_readiness_probe(mut self) -> Self {
        self.readiness = None;
        self
    }

    /// The `SERVICES=...` variable that enables the emulated services.
    pub fn services_env(&self) -> String {
        format!("SERVICES={}", self.services.join(","))
    }

    /// Full container environment, `SERVICES` first.
    pub fn environment(&self) -> Vec<String> {
        std::iter::once(self.services_env())
            .chain(self.extra_env.iter().map(|(k, v)| format!("{k}={v}")))
            .collect()
    }

    /// Check the configuration before any runtime call is made.
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(Error::InvalidConfig("image must not be empty".to_string()));
        }
        if self.services.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one service is required".to_string(),
            ));
        }
        if self.services.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "service names must not be blank".to_string(),
            ));
        }
        if self.container_port == 0 {
            return Err(Error::InvalidConfig(
                "container port must not be zero".to_string(),
            ));
        }
        Ok(())
    }
}
