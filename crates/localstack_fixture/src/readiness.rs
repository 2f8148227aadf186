//! Waiting for the emulator to accept requests.
//!
//! The Docker start call returns as soon as the process is launched, well
//! before LocalStack has brought its services up. The probe polls the health
//! endpoint until the requested services report in.

use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::config::ReadinessProbe;
use crate::errors::{Error, Result};

#[cfg(test)]
#[path = "readiness_tests.rs"]
mod tests;

/// Service states LocalStack reports for a usable service.
const READY_STATES: [&str; 2] = ["running", "available"];

/// Poll `{base_url}{probe.path}` until it reports the services as ready.
pub async fn wait_until_ready(
    base_url: &str,
    services: &[String],
    probe: &ReadinessProbe,
) -> Result<()> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), probe.path);
    let client = reqwest::Client::builder()
        .timeout(probe.request_timeout)
        .build()
        .map_err(Error::ProbeClient)?;

    info!(url = %url, "Waiting for LocalStack to become ready");

    let deadline = Instant::now() + probe.timeout;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) if services_ready(&body, services) => {
                    info!(url = %url, attempt = attempt, "LocalStack is ready");
                    return Ok(());
                }
                Ok(_) => debug!(attempt = attempt, "Services not ready yet"),
                Err(e) => debug!(attempt = attempt, error = %e, "Failed to read health response"),
            },
            Ok(response) => {
                debug!(attempt = attempt, status = %response.status(), "Health check returned non-success");
            }
            Err(e) => {
                debug!(attempt = attempt, error = %e, "Health check failed");
            }
        }

        if Instant::now() + probe.interval > deadline {
            return Err(Error::NotReady {
                url,
                timeout: probe.timeout,
            });
        }
        sleep(probe.interval).await;
    }
}

/// Whether a health response body shows every requested service as usable.
///
/// Bodies that are not LocalStack health documents count as ready: the
/// endpoint answered successfully and there is nothing more to check.
pub fn services_ready(body: &str, services: &[String]) -> bool {
    let Ok(document) = serde_json::from_str::<Value>(body) else {
        return true;
    };
    let Some(states) = document.get("services").and_then(Value::as_object) else {
        return true;
    };

    services.iter().all(|service| {
        states
            .get(service.as_str())
            .and_then(Value::as_str)
            .is_some_and(|state| READY_STATES.contains(&state))
    })
}
