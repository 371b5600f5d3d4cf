//! Types for the runtime crate.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::CommandSpec;

/// Which compose front end to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComposeBinary {
    /// The standalone `docker-compose` executable.
    #[default]
    Standalone,
    /// The `docker compose` CLI plugin.
    Plugin,
}

impl ComposeBinary {
    /// A command spec invoking compose against `compose_file`.
    #[must_use]
    pub fn command(self, compose_file: &str) -> CommandSpec {
        let spec = match self {
            Self::Standalone => CommandSpec::new("docker-compose"),
            Self::Plugin => CommandSpec::new("docker").arg("compose"),
        };
        spec.arg("-f").arg(compose_file)
    }

    /// Parse the `BERTH_COMPOSE` setting.
    #[must_use]
    pub fn from_setting(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "standalone" | "docker-compose" => Some(Self::Standalone),
            "plugin" | "docker compose" => Some(Self::Plugin),
            _ => None,
        }
    }
}

/// Configuration shared by the CLI and the webhook service.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Root of the tenants tree.
    pub tenants_root: PathBuf,
    /// Compose front end.
    pub compose: ComposeBinary,
    /// Domain tenant hostnames live under (`<tenant>.<domain>`).
    pub domain: String,
    /// Hosts file tenant hostnames are registered in.
    pub hosts_file: PathBuf,
    /// Password fed to `sudo -S` when the hosts file is not writable.
    pub hosts_sudo_pass: Option<String>,
    /// Number of readiness probe attempts (one per interval).
    pub probe_attempts: u32,
    /// Delay between readiness probe attempts.
    pub probe_interval: Duration,
    /// Host used to reach published ports.
    pub probe_host: String,
    /// Upper bound on any single external command.
    pub command_timeout: Duration,
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("tenants_root", &self.tenants_root)
            .field("compose", &self.compose)
            .field("domain", &self.domain)
            .field("hosts_file", &self.hosts_file)
            .field(
                "hosts_sudo_pass",
                &self.hosts_sudo_pass.as_ref().map(|_| "<redacted>"),
            )
            .field("probe_attempts", &self.probe_attempts)
            .field("probe_interval", &self.probe_interval)
            .field("probe_host", &self.probe_host)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tenants_root: PathBuf::from("tenants"),
            compose: ComposeBinary::Standalone,
            domain: "vsync".to_string(),
            hosts_file: PathBuf::from("/etc/hosts"),
            hosts_sudo_pass: None,
            probe_attempts: 60,
            probe_interval: Duration::from_secs(1),
            probe_host: "localhost".to_string(),
            command_timeout: Duration::from_secs(600),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `BERTH_TENANTS_ROOT`: root of the tenants tree
    /// - `BERTH_COMPOSE`: `standalone` (`docker-compose`) or `plugin` (`docker compose`)
    /// - `BERTH_DOMAIN`: domain tenant hostnames live under
    /// - `BERTH_HOSTS_FILE`: hosts file to register tenant hostnames in
    /// - `HOSTS_SUDO_PASS`: password for privileged hosts file edits
    /// - `BERTH_PROBE_TIMEOUT_SECS`: readiness probe attempts (one per second)
    /// - `BERTH_PROBE_HOST`: host used to reach published ports
    /// - `BERTH_COMMAND_TIMEOUT_SECS`: limit on any single external command
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("BERTH_TENANTS_ROOT") {
            config.tenants_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("BERTH_COMPOSE") {
            config.compose = ComposeBinary::from_setting(&val).unwrap_or(config.compose);
        }
        if let Ok(val) = std::env::var("BERTH_DOMAIN") {
            config.domain = val;
        }
        if let Ok(val) = std::env::var("BERTH_HOSTS_FILE") {
            config.hosts_file = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("HOSTS_SUDO_PASS") {
            if !val.is_empty() {
                config.hosts_sudo_pass = Some(val);
            }
        }
        if let Ok(val) = std::env::var("BERTH_PROBE_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                config.probe_attempts = n;
            }
        }
        if let Ok(val) = std::env::var("BERTH_PROBE_HOST") {
            config.probe_host = val;
        }
        if let Ok(val) = std::env::var("BERTH_COMMAND_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                config.command_timeout = Duration::from_secs(n);
            }
        }

        config
    }

    /// The public hostname of a tenant, e.g. `acme.vsync`.
    #[must_use]
    pub fn hostname(&self, tenant: &berth_core::TenantName) -> String {
        format!("{tenant}.{}", self.domain)
    }
}
