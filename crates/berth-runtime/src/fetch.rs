//! Repository fetching.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::command::{CommandRunner, CommandSpec};
use crate::error::{Result, RuntimeError};

/// Clones application repositories into tenant directories.
#[derive(Clone)]
pub struct RepositoryFetcher {
    runner: Arc<dyn CommandRunner>,
}

impl RepositoryFetcher {
    /// Create a fetcher executing `git` through `runner`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Clone `branch` of `repo_url` into `dest`, replacing anything already there.
    ///
    /// Submodules are initialized recursively when the repository declares any.
    ///
    /// # Errors
    ///
    /// Returns an error if the old destination cannot be removed or `git`
    /// fails (authentication, network, unknown branch). No retry is attempted.
    pub async fn clone_repo(&self, repo_url: &str, branch: &str, dest: &Path) -> Result<PathBuf> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RuntimeError::io(parent, e))?;
        }

        match tokio::fs::symlink_metadata(dest).await {
            Ok(meta) if meta.is_dir() => {
                info!(dest = %dest.display(), "Removing previous checkout");
                tokio::fs::remove_dir_all(dest)
                    .await
                    .map_err(|e| RuntimeError::io(dest, e))?;
            }
            Ok(_) => tokio::fs::remove_file(dest)
                .await
                .map_err(|e| RuntimeError::io(dest, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(RuntimeError::io(dest, e)),
        }

        info!(repo = %repo_url, branch = %branch, dest = %dest.display(), "Cloning repository");
        let clone = CommandSpec::new("git")
            .args(["clone", "--branch", branch, "--", repo_url])
            .arg(dest.display().to_string());
        self.runner.run(&clone).await?;

        if dest.join(".gitmodules").exists() {
            info!(dest = %dest.display(), "Initializing submodules");
            let submodules = CommandSpec::new("git")
                .args(["submodule", "update", "--init", "--recursive"])
                .current_dir(dest);
            self.runner.run(&submodules).await?;
        }

        Ok(dest.to_path_buf())
    }
}

/// Application name derived from a repository URL.
///
/// `https://host/org/shop-api.git/` becomes `shop-api`.
#[must_use]
pub fn app_name_from_url(repo_url: &str) -> String {
    let last = repo_url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(repo_url);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::mock::RecordingRunner;
    use tempfile::TempDir;

    #[tokio::test]
    async fn clone_replaces_existing_contents() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("acme/backend");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.txt"), "old").unwrap();

        let runner = Arc::new(RecordingRunner::new());
        let fetcher = RepositoryFetcher::new(runner.clone());
        let path = fetcher
            .clone_repo("https://git.example/backend.git", "main", &dest)
            .await
            .unwrap();

        assert_eq!(path, dest);
        assert!(!dest.join("stale.txt").exists());
        assert!(dest.join("README.md").exists());
        assert_eq!(runner.calls().len(), 1);
        assert!(runner.commands()[0].starts_with("git clone --branch main -- https://git.example/backend.git"));
    }

    #[tokio::test]
    async fn clone_creates_missing_parent() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("new-tenant/frontend");

        let runner = Arc::new(RecordingRunner::new());
        RepositoryFetcher::new(runner)
            .clone_repo("https://git.example/frontend.git", "dev", &dest)
            .await
            .unwrap();
        assert!(dest.is_dir());
    }

    #[tokio::test]
    async fn submodules_are_initialized_when_declared() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("app");
        let runner = Arc::new(RecordingRunner::new());
        runner.clone_with_file(".gitmodules", "[submodule \"lib\"]\n");

        RepositoryFetcher::new(runner.clone())
            .clone_repo("https://git.example/app.git", "main", &dest)
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].display(), "git submodule update --init --recursive");
        assert_eq!(calls[1].cwd.as_deref(), Some(dest.as_path()));
    }

    #[tokio::test]
    async fn clone_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.fail_when("git clone", "Remote branch nope not found");

        let err = RepositoryFetcher::new(runner)
            .clone_repo("https://git.example/app.git", "nope", &dir.path().join("app"))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::CommandFailed { .. }));
    }

    #[test]
    fn app_names() {
        assert_eq!(app_name_from_url("https://github.com/org/shop-api.git"), "shop-api");
        assert_eq!(app_name_from_url("https://github.com/org/shop-api/"), "shop-api");
        assert_eq!(app_name_from_url("git@github.com:org/web.git"), "web");
        assert_eq!(app_name_from_url("git@host:web.git"), "web");
    }
}
