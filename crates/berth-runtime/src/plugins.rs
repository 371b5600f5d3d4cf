//! Application plugins.
//!
//! A plugin knows how to install, build, start and stop one kind of
//! application checked out under a tenant directory. Which plugin applies is
//! decided by [`detect_kind`] from the files at the top of the checkout.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::command::{CommandRunner, CommandSpec};
use crate::error::{Result, RuntimeError};
use crate::types::ComposeBinary;

/// Compose file names recognised by the docker plugin, in lookup order.
pub const COMPOSE_FILE_NAMES: &[&str] = &[
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

/// Kinds of application berth can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppKind {
    /// A project with its own compose file.
    Docker,
    /// A Node.js project managed by pm2.
    Node,
}

impl fmt::Display for AppKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Docker => f.write_str("docker"),
            Self::Node => f.write_str("nodejs"),
        }
    }
}

/// Decide which kind of application lives at `path`.
///
/// A compose file wins over `package.json`, so containerised Node projects
/// are run through compose.
#[must_use]
pub fn detect_kind(path: &Path) -> Option<AppKind> {
    if !path.is_dir() {
        return None;
    }
    if find_compose_file(path).is_some() {
        Some(AppKind::Docker)
    } else if path.join("package.json").is_file() {
        Some(AppKind::Node)
    } else {
        None
    }
}

fn find_compose_file(path: &Path) -> Option<&'static str> {
    COMPOSE_FILE_NAMES
        .iter()
        .copied()
        .find(|name| path.join(name).is_file())
}

/// Lifecycle operations for one kind of application.
#[async_trait]
pub trait AppPlugin: Send + Sync {
    /// Plugin name as shown by `list-plugins`.
    fn name(&self) -> &'static str;

    /// Whether this plugin can manage the application at `path`.
    fn detect(&self, path: &Path) -> bool;

    /// Install dependencies.
    ///
    /// # Errors
    ///
    /// Returns an error if the install command fails.
    async fn install(&self, path: &Path) -> Result<()>;

    /// Build the application, if it has a build step.
    ///
    /// # Errors
    ///
    /// Returns an error if the build command fails.
    async fn build(&self, path: &Path) -> Result<()>;

    /// Start the application in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the start command fails.
    async fn start(&self, path: &Path) -> Result<()>;

    /// Stop the application.
    ///
    /// # Errors
    ///
    /// Returns an error if the stop command fails.
    async fn stop(&self, path: &Path) -> Result<()>;

    /// Recent log output.
    ///
    /// # Errors
    ///
    /// Returns an error if logs cannot be retrieved.
    async fn logs(&self, path: &Path) -> Result<String>;
}

/// Process name for an app: `<tenant>_<app>`, taken from the last two path components.
fn process_name(path: &Path) -> String {
    let component = |p: Option<&Path>| {
        p.and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
    };
    match (component(path.parent()), component(Some(path))) {
        (Some(tenant), Some(app)) => format!("{tenant}_{app}"),
        (None, Some(app)) => app,
        _ => "app".to_string(),
    }
}

#[derive(Deserialize, Default)]
struct PackageJson {
    #[serde(default)]
    scripts: std::collections::BTreeMap<String, String>,
}

/// Node.js applications run under pm2.
#[derive(Clone)]
pub struct NodePlugin {
    runner: Arc<dyn CommandRunner>,
}

impl NodePlugin {
    /// Create the plugin executing through `runner`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn has_build_script(path: &Path) -> Result<bool> {
        let manifest = path.join("package.json");
        let contents =
            std::fs::read_to_string(&manifest).map_err(|e| RuntimeError::io(&manifest, e))?;
        let package: PackageJson = serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!(path = %manifest.display(), error = %e, "Unparseable package.json");
            PackageJson::default()
        });
        Ok(package.scripts.contains_key("build"))
    }
}

#[async_trait]
impl AppPlugin for NodePlugin {
    fn name(&self) -> &'static str {
        "nodejs"
    }

    fn detect(&self, path: &Path) -> bool {
        detect_kind(path) == Some(AppKind::Node)
    }

    async fn install(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "npm install");
        self.runner
            .run(&CommandSpec::new("npm").arg("install").current_dir(path))
            .await?;
        Ok(())
    }

    async fn build(&self, path: &Path) -> Result<()> {
        if !Self::has_build_script(path)? {
            info!(path = %path.display(), "No build script, skipping build");
            return Ok(());
        }
        info!(path = %path.display(), "npm run build");
        self.runner
            .run(&CommandSpec::new("npm").args(["run", "build"]).current_dir(path))
            .await?;
        Ok(())
    }

    async fn start(&self, path: &Path) -> Result<()> {
        let spec = if path.join("ecosystem.config.js").is_file() {
            CommandSpec::new("pm2").args(["start", "ecosystem.config.js"])
        } else if path.join("index.js").is_file() {
            CommandSpec::new("pm2")
                .args(["start", "index.js", "--name"])
                .arg(process_name(path))
        } else {
            warn!(path = %path.display(), "No startable file found");
            return Ok(());
        };
        info!(path = %path.display(), command = %spec.display(), "Starting app");
        self.runner.run(&spec.current_dir(path)).await?;
        Ok(())
    }

    async fn stop(&self, path: &Path) -> Result<()> {
        let spec = if path.join("ecosystem.config.js").is_file() {
            CommandSpec::new("pm2").args(["stop", "ecosystem.config.js"])
        } else {
            CommandSpec::new("pm2").arg("stop").arg(process_name(path))
        };
        info!(path = %path.display(), command = %spec.display(), "Stopping app");
        self.runner.run(&spec.current_dir(path)).await?;
        Ok(())
    }

    async fn logs(&self, path: &Path) -> Result<String> {
        let spec = CommandSpec::new("pm2")
            .arg("logs")
            .arg(process_name(path))
            .args(["--lines", "50", "--nostream"])
            .current_dir(path);
        Ok(self.runner.run(&spec).await?.stdout)
    }
}

/// Applications shipping their own compose file.
#[derive(Clone)]
pub struct DockerPlugin {
    binary: ComposeBinary,
    runner: Arc<dyn CommandRunner>,
}

impl DockerPlugin {
    /// Create the plugin using `binary` and executing through `runner`.
    pub fn new(binary: ComposeBinary, runner: Arc<dyn CommandRunner>) -> Self {
        Self { binary, runner }
    }

    fn compose(&self, path: &Path) -> Result<CommandSpec> {
        let file = find_compose_file(path).ok_or_else(|| {
            RuntimeError::Compose(format!("no compose file in {}", path.display()))
        })?;
        Ok(self.binary.command(file).current_dir(path))
    }
}

#[async_trait]
impl AppPlugin for DockerPlugin {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn detect(&self, path: &Path) -> bool {
        detect_kind(path) == Some(AppKind::Docker)
    }

    async fn install(&self, path: &Path) -> Result<()> {
        self.runner.run(&self.compose(path)?.args(["pull", "--ignore-pull-failures"])).await?;
        Ok(())
    }

    async fn build(&self, path: &Path) -> Result<()> {
        self.runner.run(&self.compose(path)?.arg("build")).await?;
        Ok(())
    }

    async fn start(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "compose up");
        self.runner.run(&self.compose(path)?.args(["up", "-d"])).await?;
        Ok(())
    }

    async fn stop(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "compose stop");
        self.runner.run(&self.compose(path)?.arg("stop")).await?;
        Ok(())
    }

    async fn logs(&self, path: &Path) -> Result<String> {
        let output = self
            .runner
            .run(&self.compose(path)?.args(["logs", "--tail", "50"]))
            .await?;
        Ok(output.stdout)
    }
}

/// The available plugins.
#[derive(Clone)]
pub struct PluginSet {
    docker: Arc<dyn AppPlugin>,
    node: Arc<dyn AppPlugin>,
}

impl PluginSet {
    /// The built-in plugins, executing through `runner`.
    pub fn builtin(binary: ComposeBinary, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            docker: Arc::new(DockerPlugin::new(binary, runner.clone())),
            node: Arc::new(NodePlugin::new(runner)),
        }
    }

    /// The plugin handling `kind`.
    #[must_use]
    pub fn for_kind(&self, kind: AppKind) -> Arc<dyn AppPlugin> {
        match kind {
            AppKind::Docker => self.docker.clone(),
            AppKind::Node => self.node.clone(),
        }
    }

    /// The plugin for the application at `path`, if any applies.
    #[must_use]
    pub fn select(&self, path: &Path) -> Option<Arc<dyn AppPlugin>> {
        detect_kind(path).map(|kind| self.for_kind(kind))
    }

    /// Plugin names, in detection priority order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        vec![self.docker.name(), self.node.name()]
    }
}
