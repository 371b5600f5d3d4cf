//! Berth CLI - deploy and administer tenants on the local container runtime.
//!
//! This is the entry point for the `berth` binary.

mod github;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use berth_control::{
    ControlConfig, Deployer, DeploymentWorkflow, RepoRef, TenantManager, TenantReport,
};
use berth_core::TenantName;
use berth_runtime::{ProcessRunner, RuntimeConfig};
use berth_store::{FileConfigStore, TenantLayout};

use github::GithubClient;

/// Berth - multi-tenant deployment CLI.
#[derive(Parser, Debug)]
#[command(name = "berth")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clone, configure and start a tenant's backend with its database and cache.
    DeployBackend {
        /// Tenant name.
        #[arg(long)]
        tenant: TenantName,
        /// Backend git repository URL.
        #[arg(long)]
        backend_repo_url: String,
        /// Backend branch to clone.
        #[arg(long)]
        backend_branch: String,
    },

    /// Clone and start a tenant's frontend behind nginx.
    DeployFrontend {
        /// Tenant name.
        #[arg(long)]
        tenant: TenantName,
        /// Frontend git repository URL.
        #[arg(long)]
        frontend_repo_url: String,
        /// Frontend branch to clone.
        #[arg(long)]
        frontend_branch: String,
    },

    /// Start all apps for a tenant.
    Start {
        /// Tenant name.
        #[arg(long)]
        tenant: TenantName,
    },

    /// Stop all apps for a tenant.
    Stop {
        /// Tenant name.
        #[arg(long)]
        tenant: TenantName,
    },

    /// Show logs for a tenant or one of its apps.
    Logs {
        /// Tenant name.
        #[arg(long)]
        tenant: TenantName,
        /// App name.
        #[arg(long)]
        app: Option<String>,
    },

    /// Create a tenant's directories.
    AddTenant {
        /// Tenant name.
        tenant: TenantName,
    },

    /// Tear down a tenant and delete its directory.
    RemoveTenant {
        /// Tenant name.
        tenant: TenantName,
    },

    /// Show a tenant's configuration and access URLs.
    TenantInfo {
        /// Tenant name.
        #[arg(long)]
        tenant: TenantName,
    },

    /// Deploy an app from a git repository with the matching plugin.
    Deploy {
        /// Git repository URL.
        repo_url: String,
        /// Tenant name.
        #[arg(long)]
        tenant: TenantName,
        /// Git branch to clone.
        #[arg(long)]
        branch: String,
    },

    /// List available plugins.
    ListPlugins,

    /// List all public repositories for a GitHub user.
    ListGithubRepos {
        /// GitHub user name.
        username: String,
        /// GitHub API base URL.
        #[arg(long, env = "BERTH_GITHUB_API", default_value = github::DEFAULT_API)]
        github_api: String,
    },
}

/// Shared wiring for commands that touch tenants.
struct Services {
    store: Arc<FileConfigStore>,
    runner: Arc<ProcessRunner>,
    runtime: RuntimeConfig,
    control: ControlConfig,
}

impl Services {
    fn from_env() -> Self {
        let runtime = RuntimeConfig::from_env();
        let store = Arc::new(FileConfigStore::new(
            TenantLayout::new(runtime.tenants_root.clone()),
            runtime.domain.clone(),
        ));
        let runner = Arc::new(ProcessRunner::new(runtime.command_timeout));
        Self {
            store,
            runner,
            runtime,
            control: ControlConfig::from_env(),
        }
    }

    fn workflow(self) -> anyhow::Result<DeploymentWorkflow> {
        DeploymentWorkflow::new(self.store, self.runner, self.runtime, self.control)
            .context("Failed to initialize deployment workflow")
    }

    fn tenants(self) -> TenantManager {
        TenantManager::new(self.store, self.runner, self.runtime, self.control)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "info,berth=debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    run(cli.command).await
}

async fn run(command: Command) -> anyhow::Result<()> {
    tracing::debug!(command = ?command, "Running command");

    match command {
        Command::DeployBackend {
            tenant,
            backend_repo_url,
            backend_branch,
        } => {
            let workflow = Services::from_env().workflow()?;
            let repo = RepoRef::new(backend_repo_url, backend_branch);
            let outcome = workflow
                .deploy_backend(&tenant, &repo)
                .await
                .with_context(|| format!("Backend deployment failed for {tenant}"))?;

            println!("Backend deployed for {tenant}: {}", outcome.backend_url);
            if !outcome.healthy {
                println!("Warning: backend did not become healthy at {}", outcome.health_url);
            }
        }

        Command::DeployFrontend {
            tenant,
            frontend_repo_url,
            frontend_branch,
        } => {
            let workflow = Services::from_env().workflow()?;
            let repo = RepoRef::new(frontend_repo_url, frontend_branch);
            let outcome = workflow
                .deploy_frontend(&tenant, &repo)
                .await
                .with_context(|| format!("Frontend deployment failed for {tenant}"))?;

            println!("Frontend deployed for {tenant}");
            println!("{}", outcome.urls);
            if !outcome.all_healthy() {
                println!(
                    "Warning: not all services are healthy (backend: {}, frontend: {}, api: {})",
                    outcome.backend_healthy, outcome.frontend_healthy, outcome.api_healthy
                );
            }
        }

        Command::Start { tenant } => {
            let report = Services::from_env().tenants().start(&tenant).await?;
            print_report("Started", "Starting", &tenant, &report);
        }

        Command::Stop { tenant } => {
            let report = Services::from_env().tenants().stop(&tenant).await?;
            print_report("Stopped", "Stopping", &tenant, &report);
        }

        Command::Logs { tenant, app } => {
            let logs = Services::from_env().tenants().logs(&tenant, app.as_deref()).await?;
            match app {
                Some(app) => println!("Showing logs for {tenant}/{app}"),
                None => println!("Showing logs for all {tenant} containers"),
            }
            print!("{logs}");
        }

        Command::AddTenant { tenant } => {
            if Services::from_env().tenants().add_tenant(&tenant)? {
                println!("Tenant {tenant} added.");
            } else {
                println!("Tenant {tenant} already exists.");
            }
        }

        Command::RemoveTenant { tenant } => {
            if Services::from_env().tenants().remove_tenant(&tenant).await? {
                println!("Tenant {tenant} removed.");
            } else {
                println!("Tenant {tenant} does not exist.");
            }
        }

        Command::TenantInfo { tenant } => {
            let info = Services::from_env().tenants().info(&tenant)?;
            let config = &info.config;
            println!("Tenant: {}", info.tenant);
            println!("Hostname: {}", info.hostname);
            println!(
                "Ports: backend {}, frontend {}, nginx {}",
                config.backend_port, config.frontend_port, config.nginx_port
            );
            println!("Database: {} (user {})", config.db_name, config.db_user);
            println!("{}", info.urls);
        }

        Command::Deploy {
            repo_url,
            tenant,
            branch,
        } => {
            let app = Services::from_env()
                .tenants()
                .deploy_app(&tenant, &repo_url, &branch)
                .await?;
            if app.deployed {
                println!("App {} deployed for tenant {tenant} with {}", app.name, app.plugin);
            } else {
                println!("App {} already exists for tenant {tenant}", app.name);
            }
        }

        Command::ListPlugins => {
            for name in Services::from_env().tenants().plugin_names() {
                println!("{name}");
            }
        }

        Command::ListGithubRepos {
            username,
            github_api,
        } => {
            let client = GithubClient::new(github_api)?;
            let repos = client.list_repos(&username).await?;
            println!("{}", github::format_repos(&username, &repos));
        }
    }

    Ok(())
}

fn print_report(done: &str, doing: &str, tenant: &TenantName, report: &TenantReport) {
    if report.compose_stack {
        println!("{done} compose stack for {tenant}");
    }
    for app in &report.apps {
        match app.plugin {
            Some(plugin) => println!("{doing} {} with {plugin}", app.name),
            None => println!("No plugin for {}", app.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_deploy_backend() {
        let cli = Cli::try_parse_from([
            "berth",
            "deploy-backend",
            "--tenant",
            "acme",
            "--backend-repo-url",
            "git@example.com:acme/api.git",
            "--backend-branch",
            "main",
        ])
        .unwrap();

        match cli.command {
            Command::DeployBackend {
                tenant,
                backend_repo_url,
                backend_branch,
            } => {
                assert_eq!(tenant.as_str(), "acme");
                assert_eq!(backend_repo_url, "git@example.com:acme/api.git");
                assert_eq!(backend_branch, "main");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_tenant_name() {
        let result = Cli::try_parse_from(["berth", "start", "--tenant", "Bad Name"]);
        assert!(result.is_err());
    }

    #[test]
    fn tenant_is_required() {
        assert!(Cli::try_parse_from(["berth", "stop"]).is_err());
    }

    #[test]
    fn positional_tenant_for_add_and_remove() {
        let cli = Cli::try_parse_from(["berth", "add-tenant", "globex"]).unwrap();
        assert!(matches!(cli.command, Command::AddTenant { ref tenant } if tenant.as_str() == "globex"));

        let cli = Cli::try_parse_from(["berth", "remove-tenant", "globex"]).unwrap();
        assert!(matches!(cli.command, Command::RemoveTenant { .. }));
    }

    #[test]
    fn logs_app_is_optional() {
        let cli = Cli::try_parse_from(["berth", "logs", "--tenant", "acme"]).unwrap();
        assert!(matches!(cli.command, Command::Logs { app: None, .. }));

        let cli =
            Cli::try_parse_from(["berth", "logs", "--tenant", "acme", "--app", "shop"]).unwrap();
        assert!(matches!(cli.command, Command::Logs { app: Some(ref a), .. } if a == "shop"));
    }

    #[test]
    fn deploy_takes_positional_repo() {
        let cli = Cli::try_parse_from([
            "berth",
            "deploy",
            "https://git.example/shop.git",
            "--tenant",
            "acme",
            "--branch",
            "dev",
        ])
        .unwrap();
        match cli.command {
            Command::Deploy { repo_url, branch, .. } => {
                assert_eq!(repo_url, "https://git.example/shop.git");
                assert_eq!(branch, "dev");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn debug_flag_is_global() {
        let cli = Cli::try_parse_from(["berth", "list-plugins", "--debug"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(cli.command, Command::ListPlugins));
    }

    #[test]
    fn report_printing_handles_missing_plugins() {
        let tenant = TenantName::new("acme").unwrap();
        let report = TenantReport {
            compose_stack: true,
            apps: vec![berth_control::AppReport {
                name: "docs".to_string(),
                plugin: None,
            }],
        };
        print_report("Started", "Starting", &tenant, &report);
    }
}
