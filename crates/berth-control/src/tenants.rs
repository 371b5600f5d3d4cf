//! Tenant administration: directory lifecycle, start/stop, logs and generic app deploys.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use berth_core::TenantName;
use berth_runtime::{
    app_name_from_url, non_fatal, CommandRunner, ComposeClient, PluginSet, RepositoryFetcher, RuntimeConfig,
};
use berth_store::layout::RESERVED_DIRS;
use berth_store::{ConfigStore, StoreError, TenantConfig};
use tracing::{info, warn};

use crate::error::{ControlError, Result};
use crate::types::{AccessUrls, ControlConfig};

/// Directories managed by the compose stack rather than by plugins.
const COMPOSE_MANAGED_DIRS: &[&str] = &["backend", "frontend"];

/// What happened to one app directory during start or stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppReport {
    /// Directory name.
    pub name: String,
    /// Plugin that handled it, `None` if no plugin applied.
    pub plugin: Option<&'static str>,
}

/// Result of a start or stop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantReport {
    /// Whether the tenant's compose stack was started or stopped.
    pub compose_stack: bool,
    /// Plugin-managed apps, in directory name order.
    pub apps: Vec<AppReport>,
}

/// A tenant's configuration and where it can be reached.
#[derive(Debug, Clone)]
pub struct TenantInfo {
    /// Tenant name.
    pub tenant: TenantName,
    /// Public hostname.
    pub hostname: String,
    /// Persisted configuration.
    pub config: TenantConfig,
    /// Access URLs.
    pub urls: AccessUrls,
}

/// An app deployed through a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedApp {
    /// App name derived from the repository URL.
    pub name: String,
    /// Checkout directory.
    pub path: PathBuf,
    /// Plugin that installed and started it.
    pub plugin: &'static str,
    /// False when the checkout already existed and nothing was done.
    pub deployed: bool,
}

/// Tenant-level operations behind the CLI.
pub struct TenantManager {
    store: Arc<dyn ConfigStore>,
    fetcher: RepositoryFetcher,
    compose: ComposeClient,
    plugins: PluginSet,
    runtime: RuntimeConfig,
    config: ControlConfig,
}

impl TenantManager {
    /// Create a manager writing through `store` and executing through `runner`.
    pub fn new(
        store: Arc<dyn ConfigStore>,
        runner: Arc<dyn CommandRunner>,
        runtime: RuntimeConfig,
        config: ControlConfig,
    ) -> Self {
        Self {
            store,
            fetcher: RepositoryFetcher::new(runner.clone()),
            compose: ComposeClient::new(runtime.compose, runner.clone()),
            plugins: PluginSet::builtin(runtime.compose, runner),
            runtime,
            config,
        }
    }

    /// Names of the available plugins.
    #[must_use]
    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.names()
    }

    fn existing_dir(&self, tenant: &TenantName) -> Result<PathBuf> {
        let dir = self.store.layout().tenant_dir(tenant);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(ControlError::TenantNotFound(tenant.clone()))
        }
    }

    /// Create the tenant's `apps` and `config` directories.
    ///
    /// Returns `false` without touching anything if the tenant already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn add_tenant(&self, tenant: &TenantName) -> Result<bool> {
        let layout = self.store.layout();
        let dir = layout.tenant_dir(tenant);
        if dir.exists() {
            warn!(tenant = %tenant, "Tenant already exists");
            return Ok(false);
        }
        for path in [layout.apps_dir(tenant), layout.config_dir(tenant)] {
            std::fs::create_dir_all(&path).map_err(|e| StoreError::io(&path, e))?;
        }
        info!(tenant = %tenant, "Tenant created");
        Ok(true)
    }

    /// Tear down the tenant's containers and delete its directory, config included.
    ///
    /// Returns `false` if the tenant does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be deleted. A failed
    /// `compose down` is only logged.
    pub async fn remove_tenant(&self, tenant: &TenantName) -> Result<bool> {
        let layout = self.store.layout();
        let dir = layout.tenant_dir(tenant);
        if !dir.exists() {
            warn!(tenant = %tenant, "Tenant does not exist");
            return Ok(false);
        }

        let compose_file = layout.compose_file(tenant);
        if compose_file.is_file() {
            non_fatal("bring down containers", self.compose.down(&compose_file).await);
        }

        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;
        info!(tenant = %tenant, "Tenant removed");
        Ok(true)
    }

    /// Start the tenant's compose stack and every plugin-managed app.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TenantNotFound` if the tenant does not exist,
    /// or the first start failure.
    pub async fn start(&self, tenant: &TenantName) -> Result<TenantReport> {
        let dir = self.existing_dir(tenant)?;
        let mut report = TenantReport::default();

        let compose_file = self.store.layout().compose_file(tenant);
        if compose_file.is_file() {
            info!(tenant = %tenant, "Starting compose stack");
            self.compose.apply(&compose_file, &[]).await?;
            report.compose_stack = true;
        }

        for app in app_dirs(&dir)? {
            let plugin = self.plugins.select(&app);
            if let Some(plugin) = &plugin {
                info!(tenant = %tenant, app = %app.display(), plugin = plugin.name(), "Starting app");
                plugin.start(&app).await?;
            } else {
                warn!(tenant = %tenant, app = %app.display(), "No plugin for app");
            }
            report.apps.push(app_report(&app, plugin.map(|p| p.name())));
        }
        Ok(report)
    }

    /// Stop the tenant's compose stack and every plugin-managed app.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TenantNotFound` if the tenant does not exist,
    /// or the first stop failure.
    pub async fn stop(&self, tenant: &TenantName) -> Result<TenantReport> {
        let dir = self.existing_dir(tenant)?;
        let mut report = TenantReport::default();

        let compose_file = self.store.layout().compose_file(tenant);
        if compose_file.is_file() {
            info!(tenant = %tenant, "Stopping compose stack");
            self.compose
                .stop(&compose_file, &[], self.config.stop_timeout_secs)
                .await?;
            report.compose_stack = true;
        }

        for app in app_dirs(&dir)? {
            let plugin = self.plugins.select(&app);
            if let Some(plugin) = &plugin {
                info!(tenant = %tenant, app = %app.display(), plugin = plugin.name(), "Stopping app");
                plugin.stop(&app).await?;
            } else {
                warn!(tenant = %tenant, app = %app.display(), "No plugin for app");
            }
            report.apps.push(app_report(&app, plugin.map(|p| p.name())));
        }
        Ok(report)
    }

    /// Container logs: all of `<tenant>_<app>`, or the tail of the frontend,
    /// backend and nginx containers.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TenantNotFound` if the tenant does not exist.
    /// Containers whose logs cannot be read are reported inline.
    pub async fn logs(&self, tenant: &TenantName, app: Option<&str>) -> Result<String> {
        self.existing_dir(tenant)?;

        if let Some(app) = app {
            return Ok(self.container_logs(&tenant.container(app), None).await);
        }

        let mut out = String::new();
        for component in ["frontend", "backend", "nginx"] {
            let _ = writeln!(out, "--- {} LOGS ---", component.to_uppercase());
            out.push_str(
                &self
                    .container_logs(&tenant.container(component), Some(self.config.log_tail))
                    .await,
            );
            out.push('\n');
        }
        Ok(out)
    }

    async fn container_logs(&self, container: &str, tail: Option<u32>) -> String {
        match self.compose.logs(container, tail).await {
            Ok(output) => {
                let mut text = output.stdout;
                text.push_str(&output.stderr);
                text
            }
            Err(e) => {
                warn!(container = %container, error = %e, "Could not read logs");
                format!("(logs unavailable for {container}: {e})\n")
            }
        }
    }

    /// Load or create the tenant's config and compute its access URLs.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be written or no port slot is free.
    pub fn info(&self, tenant: &TenantName) -> Result<TenantInfo> {
        let config = self.store.load_or_create(tenant)?;
        let urls = AccessUrls::new(tenant, &config, &self.runtime.domain, &self.runtime.probe_host);
        Ok(TenantInfo {
            tenant: tenant.clone(),
            hostname: self.runtime.hostname(tenant),
            config,
            urls,
        })
    }

    /// Clone an app into the tenant directory, then install, build and start it.
    ///
    /// An existing checkout is left alone.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NoPlugin` if no plugin recognizes the checkout,
    /// or the first failing clone or plugin step.
    pub async fn deploy_app(&self, tenant: &TenantName, repo_url: &str, branch: &str) -> Result<DeployedApp> {
        let name = app_name_from_url(repo_url);
        let path = self.store.layout().app_dir(tenant, &name);

        if path.exists() {
            warn!(tenant = %tenant, app = %name, "App already exists");
            let plugin = self.plugins.select(&path).map_or("none", |p| p.name());
            return Ok(DeployedApp {
                name,
                path,
                plugin,
                deployed: false,
            });
        }

        self.fetcher.clone_repo(repo_url, branch, &path).await?;
        let plugin = self
            .plugins
            .select(&path)
            .ok_or_else(|| ControlError::NoPlugin(path.clone()))?;
        info!(tenant = %tenant, app = %name, plugin = plugin.name(), "Detected app type");

        plugin.install(&path).await?;
        plugin.build(&path).await?;
        plugin.start(&path).await?;
        info!(tenant = %tenant, app = %name, "App deployed");

        Ok(DeployedApp {
            name,
            path,
            plugin: plugin.name(),
            deployed: true,
        })
    }
}

fn app_report(path: &Path, plugin: Option<&'static str>) -> AppReport {
    AppReport {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        plugin,
    }
}

/// Child directories of a tenant that may hold plugin-managed apps.
fn app_dirs(tenant_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(tenant_dir).map_err(|e| StoreError::io(tenant_dir, e))?;
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !RESERVED_DIRS.contains(&n) && !COMPOSE_MANAGED_DIRS.contains(&n))
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_runtime::RecordingRunner;
    use berth_store::{FileConfigStore, TenantLayout};
    use tempfile::TempDir;

    fn manager() -> (TenantManager, Arc<RecordingRunner>, TempDir) {
        let dir = TempDir::new().unwrap();
        let runtime = RuntimeConfig {
            tenants_root: dir.path().join("tenants"),
            ..RuntimeConfig::default()
        };
        let store = Arc::new(FileConfigStore::new(
            TenantLayout::new(runtime.tenants_root.clone()),
            runtime.domain.clone(),
        ));
        let runner = Arc::new(RecordingRunner::new());
        let manager = TenantManager::new(store, runner.clone(), runtime, ControlConfig::default());
        (manager, runner, dir)
    }

    fn acme() -> TenantName {
        TenantName::new("acme").unwrap()
    }

    #[test]
    fn add_tenant_creates_layout_once() {
        let (manager, _runner, dir) = manager();
        assert!(manager.add_tenant(&acme()).unwrap());
        assert!(dir.path().join("tenants/acme/apps").is_dir());
        assert!(dir.path().join("tenants/acme/config").is_dir());

        std::fs::write(dir.path().join("tenants/acme/config/marker"), "x").unwrap();
        assert!(!manager.add_tenant(&acme()).unwrap());
        assert!(dir.path().join("tenants/acme/config/marker").exists());
    }

    #[tokio::test]
    async fn remove_tenant_downs_stack_and_deletes_config() {
        let (manager, runner, dir) = manager();
        manager.info(&acme()).unwrap();
        std::fs::write(dir.path().join("tenants/acme/docker-compose.yml"), "services: {}\n").unwrap();

        assert!(manager.remove_tenant(&acme()).await.unwrap());
        assert!(!dir.path().join("tenants/acme").exists());
        assert_eq!(runner.commands(), vec!["docker-compose -f docker-compose.yml down"]);
    }

    #[tokio::test]
    async fn remove_missing_tenant_is_a_warning() {
        let (manager, runner, _dir) = manager();
        assert!(!manager.remove_tenant(&acme()).await.unwrap());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn remove_tenant_survives_failed_down() {
        let (manager, runner, dir) = manager();
        manager.add_tenant(&acme()).unwrap();
        std::fs::write(dir.path().join("tenants/acme/docker-compose.yml"), "services: {}\n").unwrap();
        runner.fail_when("down", "daemon not running");

        assert!(manager.remove_tenant(&acme()).await.unwrap());
        assert!(!dir.path().join("tenants/acme").exists());
    }

    #[tokio::test]
    async fn start_uses_compose_and_plugins() {
        let (manager, runner, dir) = manager();
        manager.add_tenant(&acme()).unwrap();
        let tenant_dir = dir.path().join("tenants/acme");
        std::fs::write(tenant_dir.join("docker-compose.yml"), "services: {}\n").unwrap();
        std::fs::create_dir_all(tenant_dir.join("backend")).unwrap();
        std::fs::write(tenant_dir.join("backend/package.json"), "{}").unwrap();
        std::fs::create_dir_all(tenant_dir.join("shop")).unwrap();
        std::fs::write(tenant_dir.join("shop/package.json"), "{}").unwrap();
        std::fs::write(tenant_dir.join("shop/index.js"), "").unwrap();
        std::fs::create_dir_all(tenant_dir.join("notes")).unwrap();

        let report = manager.start(&acme()).await.unwrap();
        assert!(report.compose_stack);
        assert_eq!(
            report.apps,
            vec![
                AppReport { name: "notes".into(), plugin: None },
                AppReport { name: "shop".into(), plugin: Some("nodejs") },
            ]
        );
        assert!(runner.commands()[0].ends_with("up -d"));
        assert!(runner.position("pm2 start").is_some());
    }

    #[tokio::test]
    async fn stop_missing_tenant_fails() {
        let (manager, _runner, _dir) = manager();
        let result = manager.stop(&acme()).await;
        assert!(matches!(result, Err(ControlError::TenantNotFound(_))));
    }

    #[tokio::test]
    async fn logs_without_app_tail_three_containers() {
        let (manager, runner, _dir) = manager();
        manager.add_tenant(&acme()).unwrap();
        runner.respond_when("acme_backend", "listening on 5004\n");
        runner.fail_when("acme_nginx", "No such container");

        let logs = manager.logs(&acme(), None).await.unwrap();
        assert!(logs.contains("--- BACKEND LOGS ---\nlistening on 5004"));
        assert!(logs.contains("logs unavailable for acme_nginx"));
        assert_eq!(
            runner.commands(),
            vec![
                "docker logs --tail 20 acme_frontend",
                "docker logs --tail 20 acme_backend",
                "docker logs --tail 20 acme_nginx",
            ]
        );
    }

    #[tokio::test]
    async fn logs_for_named_app() {
        let (manager, runner, _dir) = manager();
        manager.add_tenant(&acme()).unwrap();
        manager.logs(&acme(), Some("worker")).await.unwrap();
        assert_eq!(runner.commands(), vec!["docker logs acme_worker"]);
    }

    #[test]
    fn info_is_stable() {
        let (manager, _runner, _dir) = manager();
        let first = manager.info(&acme()).unwrap();
        let second = manager.info(&acme()).unwrap();
        assert_eq!(first.config, second.config);
        assert_eq!(first.hostname, "acme.vsync");
        assert_eq!(
            first.urls.backend_direct,
            format!("http://localhost:{}/v1/api", first.config.backend_port)
        );
    }

    #[tokio::test]
    async fn deploy_app_runs_plugin_steps() {
        let (manager, runner, dir) = manager();
        runner.clone_with_file("docker-compose.yml", "services: {}\n");

        let app = manager
            .deploy_app(&acme(), "https://git.example/org/shop.git", "main")
            .await
            .unwrap();
        assert_eq!(app.name, "shop");
        assert_eq!(app.plugin, "docker");
        assert!(app.deployed);
        assert_eq!(app.path, dir.path().join("tenants/acme/shop"));

        let pull = runner.position("pull").unwrap();
        let build = runner.position(" build").unwrap();
        let up = runner.position("up -d").unwrap();
        assert!(pull < build && build < up);
    }

    #[tokio::test]
    async fn deploy_app_skips_existing_checkout() {
        let (manager, runner, dir) = manager();
        std::fs::create_dir_all(dir.path().join("tenants/acme/shop")).unwrap();

        let app = manager
            .deploy_app(&acme(), "https://git.example/org/shop.git", "main")
            .await
            .unwrap();
        assert!(!app.deployed);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn deploy_app_without_plugin_fails() {
        let (manager, _runner, _dir) = manager();
        let result = manager
            .deploy_app(&acme(), "https://git.example/org/docs.git", "main")
            .await;
        assert!(matches!(result, Err(ControlError::NoPlugin(_))));
    }
}
