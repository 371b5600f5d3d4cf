//! The two-phase deployment workflow.
//!
//! This module provides the `Deployer` trait and `DeploymentWorkflow`, which
//! composes config bookkeeping, cloning, rendering, container orchestration
//! and readiness probing into the backend and frontend phases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use berth_core::TenantName;
use berth_runtime::render::{self, API_PREFIX};
use berth_runtime::{
    non_fatal, CommandRunner, ComposeClient, ComposeFile, HealthProber, HostsOutcome,
    HostsRegistrar, RepositoryFetcher, RuntimeConfig,
};
use berth_store::ConfigStore;
use tracing::{info, warn};

use crate::error::{ControlError, Result};
use crate::types::{AccessUrls, BackendOutcome, ControlConfig, FrontendOutcome, RepoRef};

/// Trait defining the deployment phases.
///
/// The CLI and both webhook modes drive deployments through this trait;
/// tests substitute a scripted implementation.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Deploy database, cache and backend for a tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if cloning, rendering or starting a container fails.
    /// An unhealthy backend is reported in the outcome, not as an error.
    async fn deploy_backend(&self, tenant: &TenantName, repo: &RepoRef) -> Result<BackendOutcome>;

    /// Deploy frontend and nginx for a tenant whose backend is deployed.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::BackendNotDeployed` if the tenant has no compose
    /// file, or an error if cloning, rendering or starting a container fails.
    async fn deploy_frontend(&self, tenant: &TenantName, repo: &RepoRef) -> Result<FrontendOutcome>;
}

/// The deployment workflow over the local container runtime.
pub struct DeploymentWorkflow {
    store: Arc<dyn ConfigStore>,
    fetcher: RepositoryFetcher,
    compose: ComposeClient,
    prober: HealthProber,
    hosts: HostsRegistrar,
    runtime: RuntimeConfig,
    config: ControlConfig,
}

impl DeploymentWorkflow {
    /// Create a workflow writing through `store` and executing through `runner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe HTTP client cannot be built.
    pub fn new(
        store: Arc<dyn ConfigStore>,
        runner: Arc<dyn CommandRunner>,
        runtime: RuntimeConfig,
        config: ControlConfig,
    ) -> Result<Self> {
        Ok(Self {
            store,
            fetcher: RepositoryFetcher::new(runner.clone()),
            compose: ComposeClient::new(runtime.compose, runner.clone()),
            prober: HealthProber::new(runtime.probe_interval)?,
            hosts: HostsRegistrar::new(
                runtime.hosts_file.clone(),
                runtime.hosts_sudo_pass.clone(),
                runner,
            ),
            runtime,
            config,
        })
    }

    /// Get the runtime configuration.
    #[must_use]
    pub const fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    async fn probe(&self, url: &str) -> bool {
        self.prober
            .wait_healthy(url, self.runtime.probe_attempts)
            .await
    }

    async fn start(&self, compose_file: &Path, services: &[String]) -> Result<()> {
        self.compose.apply(compose_file, services).await?;
        Ok(())
    }
}

#[async_trait]
impl Deployer for DeploymentWorkflow {
    async fn deploy_backend(&self, tenant: &TenantName, repo: &RepoRef) -> Result<BackendOutcome> {
        info!(tenant = %tenant, repo = %repo.url, branch = %repo.branch, "Deploying backend");
        let layout = self.store.layout();
        let config = self.store.load_or_create(tenant)?;
        let domain = self.runtime.domain.as_str();

        let backend_dir = layout.backend_dir(tenant);
        self.fetcher
            .clone_repo(&repo.url, &repo.branch, &backend_dir)
            .await?;

        let compose_file = layout.compose_file(tenant);
        render::render_base_compose(tenant, &config, domain, &backend_dir).write(&compose_file)?;
        render::write_env_file(
            &backend_dir.join(".env"),
            &render::backend_env(tenant, &config, domain),
        )?;
        info!(tenant = %tenant, path = %compose_file.display(), "Rendered base compose file");

        let db = tenant.container("db");
        let redis = tenant.container("redis");
        let backend = tenant.container("backend");

        non_fatal(
            "stop existing containers",
            self.compose
                .stop(
                    &compose_file,
                    &[db.clone(), redis.clone(), backend.clone()],
                    self.config.stop_timeout_secs,
                )
                .await,
        );

        self.start(&compose_file, &[db.clone(), redis]).await?;

        non_fatal(
            "create transactional database",
            self.compose
                .create_database(
                    &db,
                    &config.db_user,
                    &config.db_master_name,
                    &config.db_transactional_name,
                )
                .await,
        );

        self.start(&compose_file, &[backend]).await?;

        let hostname = self.runtime.hostname(tenant);
        if let HostsOutcome::Skipped(reason) = self.hosts.register(&hostname).await {
            warn!(hostname = %hostname, reason = %reason, "Hostname not registered");
        }

        let health_url = format!(
            "http://{}:{}{API_PREFIX}",
            self.runtime.probe_host, config.backend_port
        );
        let healthy = self.probe(&health_url).await;

        info!(tenant = %tenant, healthy, "Backend deployment finished");
        Ok(BackendOutcome {
            tenant: tenant.clone(),
            backend_url: config.backend_url.clone(),
            health_url,
            healthy,
        })
    }

    async fn deploy_frontend(&self, tenant: &TenantName, repo: &RepoRef) -> Result<FrontendOutcome> {
        info!(tenant = %tenant, repo = %repo.url, branch = %repo.branch, "Deploying frontend");
        let layout = self.store.layout();
        let compose_file = layout.compose_file(tenant);
        if !compose_file.is_file() {
            return Err(ControlError::BackendNotDeployed(tenant.clone()));
        }

        let config = self.store.load_or_create(tenant)?;
        let domain = self.runtime.domain.as_str();

        let frontend_dir = layout.frontend_dir(tenant);
        self.fetcher
            .clone_repo(&repo.url, &repo.branch, &frontend_dir)
            .await?;

        let nginx_conf = render::absolutize(&layout.nginx_conf(tenant))?;
        let mut compose = ComposeFile::read(&compose_file)?;
        render::add_frontend_services(tenant, &config, domain, &frontend_dir, &nginx_conf, &mut compose);
        compose.write(&compose_file)?;
        render::write_nginx_conf(&nginx_conf, &render::render_nginx_conf(tenant, domain))?;
        render::write_env_file(
            &frontend_dir.join(".env"),
            &render::frontend_env(tenant, &config, domain),
        )?;
        info!(tenant = %tenant, api = %render::public_api_url(tenant, &config, domain), "Rendered frontend configuration");

        self.start(&compose_file, &[tenant.container("frontend")]).await?;
        self.start(&compose_file, &[tenant.container("nginx")]).await?;

        if let Some(listing) = non_fatal("list containers", self.compose.ps(tenant.as_str()).await) {
            info!(tenant = %tenant, containers = %listing.trim_end(), "Container status");
        }

        let urls = AccessUrls::new(tenant, &config, domain, &self.runtime.probe_host);
        let backend_healthy = self.probe(&urls.backend_direct).await;
        let frontend_healthy = self.probe(&urls.frontend).await;
        let api_healthy = self.probe(&urls.api).await;

        info!(
            tenant = %tenant,
            backend_healthy,
            frontend_healthy,
            api_healthy,
            "Frontend deployment finished"
        );
        Ok(FrontendOutcome {
            tenant: tenant.clone(),
            urls,
            backend_healthy,
            frontend_healthy,
            api_healthy,
        })
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Scripted deployer for exercising callers without containers.

    use async_trait::async_trait;
    use berth_core::TenantName;
    use parking_lot::Mutex;

    use crate::error::{ControlError, Result};
    use crate::types::{AccessUrls, BackendOutcome, FrontendOutcome, RepoRef};
    use crate::workflow::Deployer;

    /// A deployer that records calls and succeeds unless told otherwise.
    #[derive(Default)]
    pub struct MockDeployer {
        calls: Mutex<Vec<String>>,
        fail_backend: Mutex<Option<String>>,
        fail_frontend: Mutex<Option<String>>,
    }

    impl MockDeployer {
        /// Create a deployer where both phases succeed.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the backend phase fail with `message`.
        pub fn fail_backend(&self, message: &str) {
            *self.fail_backend.lock() = Some(message.to_string());
        }

        /// Make the frontend phase fail with `message`.
        pub fn fail_frontend(&self, message: &str) {
            *self.fail_frontend.lock() = Some(message.to_string());
        }

        /// Phases run so far, as `backend:<tenant>` or `frontend:<tenant>`.
        #[must_use]
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Deployer for MockDeployer {
        async fn deploy_backend(&self, tenant: &TenantName, _repo: &RepoRef) -> Result<BackendOutcome> {
            self.calls.lock().push(format!("backend:{tenant}"));
            if let Some(message) = self.fail_backend.lock().clone() {
                return Err(ControlError::Internal(message));
            }
            Ok(BackendOutcome {
                tenant: tenant.clone(),
                backend_url: format!("http://{tenant}.vsync"),
                health_url: "http://localhost:5000/v1/api".to_string(),
                healthy: true,
            })
        }

        async fn deploy_frontend(&self, tenant: &TenantName, _repo: &RepoRef) -> Result<FrontendOutcome> {
            self.calls.lock().push(format!("frontend:{tenant}"));
            if let Some(message) = self.fail_frontend.lock().clone() {
                return Err(ControlError::Internal(message));
            }
            Ok(FrontendOutcome {
                tenant: tenant.clone(),
                urls: AccessUrls {
                    frontend: format!("http://{tenant}.vsync:8000/"),
                    frontend_local: "http://localhost:8000/".to_string(),
                    api: format!("http://{tenant}.vsync:8000/v1/api"),
                    api_local: "http://localhost:8000/v1/api".to_string(),
                    backend_direct: "http://localhost:5000/v1/api".to_string(),
                },
                backend_healthy: true,
                frontend_healthy: true,
                api_healthy: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_runtime::RecordingRunner;
    use berth_store::types::RawConfig;
    use berth_store::{FileConfigStore, TenantConfig, TenantLayout};
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        _dir: TempDir,
        store: Arc<FileConfigStore>,
        runner: Arc<RecordingRunner>,
        workflow: DeploymentWorkflow,
        tenant: TenantName,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let runtime = RuntimeConfig {
            tenants_root: dir.path().join("tenants"),
            hosts_file: dir.path().join("hosts"),
            probe_attempts: 1,
            probe_interval: Duration::from_millis(10),
            probe_host: "127.0.0.1".to_string(),
            ..RuntimeConfig::default()
        };
        let store = Arc::new(FileConfigStore::new(
            TenantLayout::new(runtime.tenants_root.clone()),
            runtime.domain.clone(),
        ));
        let runner = Arc::new(RecordingRunner::new());
        let workflow =
            DeploymentWorkflow::new(store.clone(), runner.clone(), runtime, ControlConfig::default())
                .unwrap();
        Fixture {
            _dir: dir,
            store,
            runner,
            workflow,
            tenant: TenantName::new("acme").unwrap(),
        }
    }

    /// Pin the tenant's backend port to a mock server so the probe can succeed.
    fn pin_backend_port(fx: &Fixture, port: u16) {
        let mut config =
            TenantConfig::resolve(&fx.tenant, "vsync", RawConfig::new(), || Ok(17)).unwrap();
        config.backend_port = port;
        fx.store.save(&fx.tenant, &config).unwrap();
    }

    fn backend_repo() -> RepoRef {
        RepoRef::new("https://git.example/api.git", "main")
    }

    fn frontend_repo() -> RepoRef {
        RepoRef::new("https://git.example/web.git", "main")
    }

    #[tokio::test]
    async fn backend_phase_runs_steps_in_order() {
        let fx = fixture();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/api"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        pin_backend_port(&fx, server.address().port());

        let outcome = fx
            .workflow
            .deploy_backend(&fx.tenant, &backend_repo())
            .await
            .unwrap();
        assert!(outcome.healthy);
        assert_eq!(outcome.backend_url, "http://acme.vsync");

        let clone = fx.runner.position("git clone").unwrap();
        let stop = fx.runner.position("stop -t 5 acme_db acme_redis acme_backend").unwrap();
        let infra = fx.runner.position("up -d acme_db acme_redis").unwrap();
        let create = fx.runner.position("CREATE DATABASE").unwrap();
        let backend = fx.runner.position("up -d acme_backend").unwrap();
        assert!(clone < stop && stop < infra && infra < create && create < backend);

        let layout = fx.store.layout();
        assert!(layout.compose_file(&fx.tenant).is_file());
        let env = std::fs::read_to_string(layout.backend_dir(&fx.tenant).join(".env")).unwrap();
        assert!(env.contains("DB_DATABASE_TRANSACTIONAL=acme_transactional\n"));

        let hosts = std::fs::read_to_string(fx.workflow.runtime().hosts_file.clone()).unwrap();
        assert!(hosts.contains("127.0.0.1 acme.vsync"));
    }

    #[tokio::test]
    async fn rerunning_backend_keeps_secrets() {
        let fx = fixture();
        fx.workflow
            .deploy_backend(&fx.tenant, &backend_repo())
            .await
            .unwrap();
        let first = fx.store.load(&fx.tenant).unwrap().unwrap();

        fx.workflow
            .deploy_backend(&fx.tenant, &backend_repo())
            .await
            .unwrap();
        let second = fx.store.load(&fx.tenant).unwrap().unwrap();

        assert_eq!(first.db_pass, second.db_pass);
        assert_eq!(first.redis_pass, second.redis_pass);
        assert_eq!(first.session_secret, second.session_secret);
        assert_eq!(first.ports(), second.ports());
    }

    #[tokio::test]
    async fn unhealthy_backend_is_not_an_error() {
        let fx = fixture();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        pin_backend_port(&fx, server.address().port());

        let outcome = fx
            .workflow
            .deploy_backend(&fx.tenant, &backend_repo())
            .await
            .unwrap();
        assert!(!outcome.healthy);
    }

    #[tokio::test]
    async fn non_fatal_steps_do_not_abort() {
        let fx = fixture();
        fx.runner.fail_when(" stop ", "no such service");
        fx.runner.fail_when("CREATE DATABASE", "already exists");

        fx.workflow
            .deploy_backend(&fx.tenant, &backend_repo())
            .await
            .unwrap();
        assert!(fx.runner.position("up -d acme_backend").is_some());
    }

    #[tokio::test]
    async fn clone_failure_aborts_backend_phase() {
        let fx = fixture();
        fx.runner.fail_when("git clone", "Repository not found");

        let result = fx.workflow.deploy_backend(&fx.tenant, &backend_repo()).await;
        assert!(matches!(result, Err(ControlError::Runtime(_))));
        assert!(fx.runner.position("up -d").is_none());
    }

    #[tokio::test]
    async fn container_start_failure_aborts_backend_phase() {
        let fx = fixture();
        fx.runner.fail_when("up -d acme_db", "port is already allocated");

        let result = fx.workflow.deploy_backend(&fx.tenant, &backend_repo()).await;
        assert!(result.is_err());
        assert!(fx.runner.position("up -d acme_backend").is_none());
    }

    #[tokio::test]
    async fn frontend_requires_backend() {
        let fx = fixture();
        let result = fx.workflow.deploy_frontend(&fx.tenant, &frontend_repo()).await;

        assert!(matches!(result, Err(ControlError::BackendNotDeployed(_))));
        assert!(fx.runner.calls().is_empty());
        assert!(fx.store.load(&fx.tenant).unwrap().is_none());
    }

    #[tokio::test]
    async fn frontend_phase_extends_compose_and_writes_proxy_config() {
        let fx = fixture();
        fx.workflow
            .deploy_backend(&fx.tenant, &backend_repo())
            .await
            .unwrap();

        let outcome = fx
            .workflow
            .deploy_frontend(&fx.tenant, &frontend_repo())
            .await
            .unwrap();

        let layout = fx.store.layout();
        let compose = ComposeFile::read(&layout.compose_file(&fx.tenant)).unwrap();
        assert!(compose.services.contains_key("acme_db"));
        assert!(compose.services.contains_key("acme_frontend"));
        assert!(compose.services.contains_key("acme_nginx"));

        let nginx = std::fs::read_to_string(layout.nginx_conf(&fx.tenant)).unwrap();
        assert!(nginx.contains("acme_backend:5004"));

        let config = fx.store.load(&fx.tenant).unwrap().unwrap();
        let env = std::fs::read_to_string(layout.frontend_dir(&fx.tenant).join(".env")).unwrap();
        assert!(env.contains(&format!(
            "REACT_APP_BASE_URL=http://acme.vsync:{}/v1/api",
            config.nginx_port
        )));

        let frontend = fx.runner.position("up -d acme_frontend").unwrap();
        let nginx_up = fx.runner.position("up -d acme_nginx").unwrap();
        assert!(frontend < nginx_up);
        assert_eq!(
            outcome.urls.api,
            format!("http://acme.vsync:{}/v1/api", config.nginx_port)
        );
    }

    #[tokio::test]
    async fn frontend_rerun_replaces_nginx_conf_directory() {
        let fx = fixture();
        fx.workflow
            .deploy_backend(&fx.tenant, &backend_repo())
            .await
            .unwrap();
        let conf = fx.store.layout().nginx_conf(&fx.tenant);
        std::fs::create_dir_all(&conf).unwrap();

        fx.workflow
            .deploy_frontend(&fx.tenant, &frontend_repo())
            .await
            .unwrap();
        assert!(conf.is_file());
    }
}
