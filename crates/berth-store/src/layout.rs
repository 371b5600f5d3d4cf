//! On-disk layout of the tenants tree.
//!
//! Every path belonging to a tenant is derived here so the CLI, the workflow
//! and the webhook agree on where things live:
//!
//! ```text
//! <root>/<tenant>/config/tenant_config.yaml
//! <root>/<tenant>/docker-compose.yml
//! <root>/<tenant>/nginx.conf
//! <root>/<tenant>/backend/
//! <root>/<tenant>/frontend/
//! ```

use std::path::{Path, PathBuf};

use berth_core::TenantName;

/// Name of the per-tenant configuration file.
pub const CONFIG_FILE_NAME: &str = "tenant_config.yaml";

/// Name of the per-tenant compose file.
pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";

/// Name of the per-tenant reverse proxy configuration.
pub const NGINX_CONF_NAME: &str = "nginx.conf";

/// Directory names that hold berth bookkeeping rather than applications.
pub const RESERVED_DIRS: &[&str] = &["config", "apps"];

/// Path builder rooted at the tenants directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantLayout {
    root: PathBuf,
}

impl TenantLayout {
    /// Create a layout rooted at `root` (usually `./tenants`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The tenants root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<tenant>`
    #[must_use]
    pub fn tenant_dir(&self, tenant: &TenantName) -> PathBuf {
        self.root.join(tenant.as_str())
    }

    /// `<root>/<tenant>/config`
    #[must_use]
    pub fn config_dir(&self, tenant: &TenantName) -> PathBuf {
        self.tenant_dir(tenant).join("config")
    }

    /// `<root>/<tenant>/config/tenant_config.yaml`
    #[must_use]
    pub fn config_file(&self, tenant: &TenantName) -> PathBuf {
        self.config_dir(tenant).join(CONFIG_FILE_NAME)
    }

    /// `<root>/<tenant>/apps`
    #[must_use]
    pub fn apps_dir(&self, tenant: &TenantName) -> PathBuf {
        self.tenant_dir(tenant).join("apps")
    }

    /// `<root>/<tenant>/docker-compose.yml`
    #[must_use]
    pub fn compose_file(&self, tenant: &TenantName) -> PathBuf {
        self.tenant_dir(tenant).join(COMPOSE_FILE_NAME)
    }

    /// `<root>/<tenant>/nginx.conf`
    #[must_use]
    pub fn nginx_conf(&self, tenant: &TenantName) -> PathBuf {
        self.tenant_dir(tenant).join(NGINX_CONF_NAME)
    }

    /// `<root>/<tenant>/backend`
    #[must_use]
    pub fn backend_dir(&self, tenant: &TenantName) -> PathBuf {
        self.tenant_dir(tenant).join("backend")
    }

    /// `<root>/<tenant>/frontend`
    #[must_use]
    pub fn frontend_dir(&self, tenant: &TenantName) -> PathBuf {
        self.tenant_dir(tenant).join("frontend")
    }

    /// `<root>/<tenant>/<app>` for plugin-managed applications.
    #[must_use]
    pub fn app_dir(&self, tenant: &TenantName, app: &str) -> PathBuf {
        self.tenant_dir(tenant).join(app)
    }
}

impl Default for TenantLayout {
    fn default() -> Self {
        Self::new("tenants")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_rooted_at_tenant_dir() {
        let layout = TenantLayout::new("/srv/tenants");
        let tenant = TenantName::new("acme").unwrap();

        assert_eq!(
            layout.config_file(&tenant),
            PathBuf::from("/srv/tenants/acme/config/tenant_config.yaml")
        );
        assert_eq!(
            layout.compose_file(&tenant),
            PathBuf::from("/srv/tenants/acme/docker-compose.yml")
        );
        assert_eq!(
            layout.nginx_conf(&tenant),
            PathBuf::from("/srv/tenants/acme/nginx.conf")
        );
        assert_eq!(
            layout.frontend_dir(&tenant),
            PathBuf::from("/srv/tenants/acme/frontend")
        );
    }
}
