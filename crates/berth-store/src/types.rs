//! Tenant configuration record.
//!
//! The file format is a flat YAML mapping. Keys berth does not know about are
//! kept in [`TenantConfig::extra`] and written back untouched.

use std::collections::BTreeMap;

use berth_core::TenantName;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ports::PortSet;
use crate::secrets::{generate_password, generate_session_secret, PASSWORD_LEN};

/// A tenant configuration file as parsed, before validation.
pub type RawConfig = BTreeMap<String, serde_yaml::Value>;

/// Per-tenant configuration: derived names, generated secrets and host ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Name of the database container's default database (`<t>_db`).
    pub db_name: String,
    /// Database role owning the tenant's databases (`<t>_user`).
    pub db_user: String,
    /// Database password.
    pub db_pass: String,
    /// Master database name (`<t>_master`).
    pub db_master_name: String,
    /// Transactional database name (`<t>_transactional`).
    pub db_transactional_name: String,
    /// Host port mapped to the backend.
    pub backend_port: u16,
    /// Host port mapped to the frontend.
    pub frontend_port: u16,
    /// Host port mapped to nginx.
    pub nginx_port: u16,
    /// Public base URL of the tenant (`http://<t>.<domain>`).
    pub backend_url: String,
    /// Redis password.
    pub redis_pass: String,
    /// Redis connection URL used by the backend.
    pub redis_url: String,
    /// Hostname of the database container on the tenant network.
    pub db_server: String,
    /// Secret used to sign backend sessions.
    pub session_secret: String,
    /// Unrecognized keys, preserved on rewrite.
    #[serde(flatten)]
    pub extra: RawConfig,
}

impl TenantConfig {
    /// Build a complete config from whatever was on disk.
    ///
    /// Secrets, ports and the redis URL already present in `raw` are kept;
    /// missing ones are generated. Derived names are always recomputed.
    /// `allocate_slot` is only called when at least one port is missing.
    ///
    /// # Errors
    ///
    /// Returns the error from `allocate_slot` if a port slot cannot be found.
    pub fn resolve(
        tenant: &TenantName,
        domain: &str,
        mut raw: RawConfig,
        allocate_slot: impl FnOnce() -> Result<u16>,
    ) -> Result<Self> {
        let db_pass =
            take_string(&mut raw, "db_pass").unwrap_or_else(|| generate_password(PASSWORD_LEN));
        let redis_pass =
            take_string(&mut raw, "redis_pass").unwrap_or_else(|| generate_password(PASSWORD_LEN));
        let session_secret =
            take_string(&mut raw, "session_secret").unwrap_or_else(generate_session_secret);
        let redis_url = take_string(&mut raw, "redis_url").unwrap_or_else(|| {
            format!("redis://:{redis_pass}@{}:6379", tenant.container("redis"))
        });

        let backend = take_port(&mut raw, "backend_port");
        let frontend = take_port(&mut raw, "frontend_port");
        let nginx = take_port(&mut raw, "nginx_port");
        let ports = match (backend, frontend, nginx) {
            (Some(backend), Some(frontend), Some(nginx)) => PortSet {
                backend,
                frontend,
                nginx,
            },
            _ => {
                let fresh = PortSet::for_slot(allocate_slot()?);
                let backend = backend.unwrap_or(fresh.backend);
                PortSet {
                    backend,
                    frontend: frontend.unwrap_or_else(|| backend.saturating_add(1000)),
                    nginx: nginx.unwrap_or(fresh.nginx),
                }
            }
        };

        for derived in [
            "db_name",
            "db_user",
            "db_master_name",
            "db_transactional_name",
            "backend_url",
            "db_server",
        ] {
            raw.remove(derived);
        }

        Ok(Self {
            db_name: tenant.container("db"),
            db_user: tenant.container("user"),
            db_pass,
            db_master_name: tenant.container("master"),
            db_transactional_name: tenant.container("transactional"),
            backend_port: ports.backend,
            frontend_port: ports.frontend,
            nginx_port: ports.nginx,
            backend_url: format!("http://{tenant}.{domain}"),
            redis_pass,
            redis_url,
            db_server: tenant.container("db"),
            session_secret,
            extra: raw,
        })
    }

    /// The tenant's host ports.
    #[must_use]
    pub fn ports(&self) -> PortSet {
        PortSet {
            backend: self.backend_port,
            frontend: self.frontend_port,
            nginx: self.nginx_port,
        }
    }
}

/// Read the ports recorded in a raw config without consuming it.
#[must_use]
pub fn raw_ports(raw: &RawConfig) -> Vec<u16> {
    ["backend_port", "frontend_port", "nginx_port"]
        .into_iter()
        .filter_map(|key| raw.get(key).and_then(port_value))
        .collect()
}

fn take_string(raw: &mut RawConfig, key: &str) -> Option<String> {
    match raw.remove(key)? {
        serde_yaml::Value::String(s) if !s.is_empty() => Some(s),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn take_port(raw: &mut RawConfig, key: &str) -> Option<u16> {
    raw.remove(key).as_ref().and_then(port_value)
}

fn port_value(value: &serde_yaml::Value) -> Option<u16> {
    match value {
        serde_yaml::Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        serde_yaml::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
