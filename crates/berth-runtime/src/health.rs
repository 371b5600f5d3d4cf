//! HTTP readiness probing.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::error::{Result, RuntimeError};

/// Per-request timeout for a single probe.
pub const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Polls HTTP endpoints until they answer `200 OK`.
#[derive(Debug, Clone)]
pub struct HealthProber {
    client: reqwest::Client,
    interval: Duration,
}

impl HealthProber {
    /// Create a prober waiting `interval` between attempts.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(interval: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RuntimeError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, interval })
    }

    /// Poll `url` up to `attempts` times.
    ///
    /// Returns `true` on the first `200 OK`. Connection errors and any other
    /// status count as "not ready yet".
    pub async fn wait_healthy(&self, url: &str, attempts: u32) -> bool {
        info!(url = %url, attempts, "Waiting for service");
        for attempt in 1..=attempts {
            match self.client.get(url).send().await {
                Ok(resp) if resp.status() == StatusCode::OK => {
                    info!(url = %url, attempt, "Service is up");
                    return true;
                }
                Ok(resp) => {
                    debug!(url = %url, attempt, status = %resp.status(), "Service not ready");
                }
                Err(e) => {
                    debug!(url = %url, attempt, error = %e, "Service unreachable");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.interval).await;
            }
        }
        warn!(url = %url, attempts, "Service did not become healthy");
        false
    }
}
