//! Request, outcome and record types for deployment control.

use std::fmt;

use berth_core::{DeploymentId, TenantName};
use berth_runtime::render::API_PREFIX;
use berth_store::TenantConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// A two-phase deployment request as received over HTTP.
///
/// Every field is optional at this stage so that all missing fields can be
/// reported together by [`DeployRequest::validate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Tenant to deploy.
    #[serde(default)]
    pub tenant: Option<String>,
    /// Git URL of the backend repository.
    #[serde(default)]
    pub backend_repo_url: Option<String>,
    /// Branch of the backend repository.
    #[serde(default)]
    pub backend_branch: Option<String>,
    /// Git URL of the frontend repository.
    #[serde(default)]
    pub frontend_repo_url: Option<String>,
    /// Branch of the frontend repository.
    #[serde(default)]
    pub frontend_branch: Option<String>,
}

impl DeployRequest {
    /// Check that every field is present and non-empty, then validate the tenant name.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::MissingParameters` listing absent or empty
    /// fields in declaration order, or `ControlError::Core` if the tenant
    /// name is invalid.
    pub fn validate(&self) -> Result<DeploySpec> {
        let fields = [
            ("tenant", &self.tenant),
            ("backend_repo_url", &self.backend_repo_url),
            ("backend_branch", &self.backend_branch),
            ("frontend_repo_url", &self.frontend_repo_url),
            ("frontend_branch", &self.frontend_branch),
        ];
        let missing: Vec<&'static str> = fields
            .iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(ControlError::MissingParameters(missing));
        }

        let field = |value: &Option<String>| value.as_deref().unwrap_or_default().trim().to_string();
        Ok(DeploySpec {
            tenant: TenantName::new(field(&self.tenant))?,
            backend: RepoRef::new(field(&self.backend_repo_url), field(&self.backend_branch)),
            frontend: RepoRef::new(field(&self.frontend_repo_url), field(&self.frontend_branch)),
        })
    }
}

/// A repository and the branch to check out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    /// Git URL.
    pub url: String,
    /// Branch name.
    pub branch: String,
}

impl RepoRef {
    /// Create a reference to `branch` of `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: branch.into(),
        }
    }
}

/// A validated two-phase deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySpec {
    /// Tenant to deploy.
    pub tenant: TenantName,
    /// Backend repository.
    pub backend: RepoRef,
    /// Frontend repository.
    pub frontend: RepoRef,
}

/// Every URL a deployed tenant can be reached at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessUrls {
    /// Frontend through nginx, by tenant hostname.
    pub frontend: String,
    /// Frontend through nginx, by local host.
    pub frontend_local: String,
    /// API through nginx, by tenant hostname.
    pub api: String,
    /// API through nginx, by local host.
    pub api_local: String,
    /// Backend API on its published port, bypassing nginx.
    pub backend_direct: String,
}

impl AccessUrls {
    /// URLs for `tenant` under `domain`, with `local_host` standing in for the
    /// machine the ports are published on.
    #[must_use]
    pub fn new(tenant: &TenantName, config: &TenantConfig, domain: &str, local_host: &str) -> Self {
        let nginx = config.nginx_port;
        Self {
            frontend: format!("http://{tenant}.{domain}:{nginx}/"),
            frontend_local: format!("http://{local_host}:{nginx}/"),
            api: format!("http://{tenant}.{domain}:{nginx}{API_PREFIX}"),
            api_local: format!("http://{local_host}:{nginx}{API_PREFIX}"),
            backend_direct: format!("http://{local_host}:{}{API_PREFIX}", config.backend_port),
        }
    }
}

impl fmt::Display for AccessUrls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Frontend via domain: {}", self.frontend)?;
        writeln!(f, "Frontend via localhost: {}", self.frontend_local)?;
        writeln!(f, "API via domain: {}", self.api)?;
        writeln!(f, "API via localhost: {}", self.api_local)?;
        write!(f, "Direct backend API: {}", self.backend_direct)
    }
}

/// Result of a backend phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendOutcome {
    /// Tenant that was deployed.
    pub tenant: TenantName,
    /// Public backend URL (`http://<tenant>.<domain>`).
    pub backend_url: String,
    /// URL the readiness probe polled.
    pub health_url: String,
    /// Whether the backend answered 200 before the probe gave up.
    pub healthy: bool,
}

/// Result of a frontend phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrontendOutcome {
    /// Tenant that was deployed.
    pub tenant: TenantName,
    /// Where the deployment can be reached.
    pub urls: AccessUrls,
    /// Direct backend probe result.
    pub backend_healthy: bool,
    /// Frontend-through-nginx probe result.
    pub frontend_healthy: bool,
    /// API-through-nginx probe result.
    pub api_healthy: bool,
}

impl FrontendOutcome {
    /// Whether every probe succeeded.
    #[must_use]
    pub const fn all_healthy(&self) -> bool {
        self.backend_healthy && self.frontend_healthy && self.api_healthy
    }
}

/// Status of a queued deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Accepted and waiting for the worker.
    Pending,
    /// Picked up by the worker.
    Running,
    /// Both phases succeeded.
    Completed,
    /// A phase failed.
    Failed,
}

impl DeploymentStatus {
    /// Lowercase name, as serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about one deployment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentRecord {
    /// Deployment identifier.
    pub id: DeploymentId,
    /// Tenant being deployed.
    pub tenant: TenantName,
    /// Current status.
    pub status: DeploymentStatus,
    /// Human-readable progress or failure message.
    pub message: String,
    /// Whether the backend phase has finished, successfully or not.
    pub backend_complete: bool,
    /// Whether the backend phase succeeded.
    pub backend_success: bool,
    /// Public backend API URL once known.
    pub backend_url: Option<String>,
    /// Whether the frontend phase has finished, successfully or not.
    pub frontend_complete: bool,
    /// Whether the frontend phase succeeded.
    pub frontend_success: bool,
    /// Public frontend URL once known.
    pub frontend_url: Option<String>,
    /// Product label reported to clients.
    pub product: String,
    /// When the deployment was accepted.
    pub created_at: DateTime<Utc>,
    /// When the worker picked it up.
    pub start_time: Option<DateTime<Utc>>,
    /// When it completed or failed.
    pub end_time: Option<DateTime<Utc>>,
}

impl DeploymentRecord {
    /// A fresh pending record.
    #[must_use]
    pub fn pending(id: DeploymentId, tenant: TenantName, product: impl Into<String>) -> Self {
        Self {
            id,
            tenant,
            status: DeploymentStatus::Pending,
            message: "Deployment queued".to_string(),
            backend_complete: false,
            backend_success: false,
            backend_url: None,
            frontend_complete: false,
            frontend_success: false,
            frontend_url: None,
            product: product.into(),
            created_at: Utc::now(),
            start_time: None,
            end_time: None,
        }
    }
}

/// A deployment waiting in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    /// Deployment identifier.
    pub id: DeploymentId,
    /// Tenant being deployed.
    pub tenant: TenantName,
    /// One-based position in the queue.
    pub position: usize,
    /// When the deployment was accepted.
    pub created_at: Option<DateTime<Utc>>,
}

/// Configuration for deployment control.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Product label attached to deployment records.
    pub product: String,
    /// Grace period given to containers stopped before a redeploy.
    pub stop_timeout_secs: u32,
    /// Lines of container logs shown per container when no app is named.
    pub log_tail: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            product: "vsync".to_string(),
            stop_timeout_secs: 5,
            log_tail: 20,
        }
    }
}

impl ControlConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `BERTH_PRODUCT`: product label attached to deployment records
    /// - `BERTH_STOP_TIMEOUT_SECS`: grace period for stopped containers
    /// - `BERTH_LOG_TAIL`: log lines per container
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("BERTH_PRODUCT") {
            config.product = val;
        }
        if let Ok(val) = std::env::var("BERTH_STOP_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                config.stop_timeout_secs = n;
            }
        }
        if let Ok(val) = std::env::var("BERTH_LOG_TAIL") {
            if let Ok(n) = val.parse() {
                config.log_tail = n;
            }
        }

        config
    }
}
