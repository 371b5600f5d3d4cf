//! Sequenced container operations against the compose CLI and docker.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::Result;
use crate::types::ComposeBinary;

/// Issues compose and docker commands for one tenant directory.
///
/// Each call blocks until the underlying command exits. There is no rollback:
/// callers decide ordering and which failures are fatal.
#[derive(Clone)]
pub struct ComposeClient {
    binary: ComposeBinary,
    runner: Arc<dyn CommandRunner>,
}

impl ComposeClient {
    /// Create a client using `binary` and executing through `runner`.
    pub fn new(binary: ComposeBinary, runner: Arc<dyn CommandRunner>) -> Self {
        Self { binary, runner }
    }

    /// A compose invocation rooted at the compose file's directory.
    fn compose(&self, compose_file: &Path) -> CommandSpec {
        let name = compose_file
            .file_name()
            .map_or_else(|| compose_file.display().to_string(), |n| n.to_string_lossy().into_owned());
        let spec = self.binary.command(&name);
        match compose_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => spec.current_dir(dir),
            None => spec,
        }
    }

    /// `up -d <services>`: create or recreate and start the named services.
    ///
    /// # Errors
    ///
    /// Returns an error if compose exits unsuccessfully.
    pub async fn apply(&self, compose_file: &Path, services: &[String]) -> Result<()> {
        info!(services = ?services, "Starting services");
        let spec = self.compose(compose_file).args(["up", "-d"]).args(services);
        self.runner.run(&spec).await?;
        Ok(())
    }

    /// `stop -t <timeout> <services>`.
    ///
    /// # Errors
    ///
    /// Returns an error if compose exits unsuccessfully.
    pub async fn stop(&self, compose_file: &Path, services: &[String], timeout_secs: u32) -> Result<()> {
        info!(services = ?services, "Stopping services");
        let spec = self
            .compose(compose_file)
            .arg("stop")
            .arg("-t")
            .arg(timeout_secs.to_string())
            .args(services);
        self.runner.run(&spec).await?;
        Ok(())
    }

    /// `down`: stop and remove every service of the project.
    ///
    /// # Errors
    ///
    /// Returns an error if compose exits unsuccessfully.
    pub async fn down(&self, compose_file: &Path) -> Result<()> {
        let spec = self.compose(compose_file).arg("down");
        self.runner.run(&spec).await?;
        Ok(())
    }

    /// Create `database` owned by `owner` inside a running Postgres container.
    ///
    /// Identifiers are double-quoted; callers pass names derived from a
    /// validated tenant name.
    ///
    /// # Errors
    ///
    /// Returns an error if `psql` exits unsuccessfully, including when the
    /// database already exists.
    pub async fn create_database(
        &self,
        container: &str,
        owner: &str,
        maintenance_db: &str,
        database: &str,
    ) -> Result<()> {
        let sql = format!("CREATE DATABASE \"{database}\" OWNER \"{owner}\";");
        let spec = CommandSpec::new("docker").args([
            "exec",
            container,
            "psql",
            "-U",
            owner,
            "-d",
            maintenance_db,
            "-c",
            sql.as_str(),
        ]);
        self.runner.run(&spec).await?;
        Ok(())
    }

    /// Container logs, optionally limited to the last `tail` lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist.
    pub async fn logs(&self, container: &str, tail: Option<u32>) -> Result<CommandOutput> {
        let mut spec = CommandSpec::new("docker").arg("logs");
        if let Some(lines) = tail {
            spec = spec.arg("--tail").arg(lines.to_string());
        }
        self.runner.run(&spec.arg(container)).await
    }

    /// Running containers whose name contains `name_filter`, one per line.
    ///
    /// # Errors
    ///
    /// Returns an error if docker is unreachable.
    pub async fn ps(&self, name_filter: &str) -> Result<String> {
        let spec = CommandSpec::new("docker")
            .args(["ps", "--filter"])
            .arg(format!("name={name_filter}"))
            .args(["--format", "{{.Names}}\t{{.Status}}\t{{.Ports}}"]);
        Ok(self.runner.run(&spec).await?.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::mock::RecordingRunner;
    use crate::error::RuntimeError;

    fn client(binary: ComposeBinary) -> (ComposeClient, Arc<RecordingRunner>) {
        let runner = Arc::new(RecordingRunner::new());
        (ComposeClient::new(binary, runner.clone()), runner)
    }

    fn services(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn apply_runs_up_in_compose_dir() {
        let (client, runner) = client(ComposeBinary::Standalone);
        client
            .apply(
                Path::new("tenants/acme/docker-compose.yml"),
                &services(&["acme_db", "acme_redis"]),
            )
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(
            calls[0].display(),
            "docker-compose -f docker-compose.yml up -d acme_db acme_redis"
        );
        assert_eq!(calls[0].cwd.as_deref(), Some(Path::new("tenants/acme")));
    }

    #[tokio::test]
    async fn plugin_binary_uses_docker_compose() {
        let (client, runner) = client(ComposeBinary::Plugin);
        client
            .stop(
                Path::new("/t/acme/docker-compose.yml"),
                &services(&["acme_backend"]),
                5,
            )
            .await
            .unwrap();
        assert_eq!(
            runner.commands(),
            vec!["docker compose -f docker-compose.yml stop -t 5 acme_backend"]
        );
    }

    #[tokio::test]
    async fn create_database_quotes_identifiers() {
        let (client, runner) = client(ComposeBinary::Standalone);
        client
            .create_database("acme_db", "acme_user", "acme_master", "acme_transactional")
            .await
            .unwrap();

        let call = &runner.calls()[0];
        assert_eq!(call.program, "docker");
        assert_eq!(
            call.args.last().map(String::as_str),
            Some("CREATE DATABASE \"acme_transactional\" OWNER \"acme_user\";")
        );
    }

    #[tokio::test]
    async fn failures_surface_stderr() {
        let (client, runner) = client(ComposeBinary::Standalone);
        runner.fail_when("up -d", "pull access denied");

        let err = client
            .apply(Path::new("docker-compose.yml"), &services(&["x"]))
            .await
            .unwrap_err();
        match err {
            RuntimeError::CommandFailed { stderr, .. } => assert_eq!(stderr, "pull access denied"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn logs_with_tail() {
        let (client, runner) = client(ComposeBinary::Standalone);
        runner.respond_when("docker logs", "line one\n");

        let output = client.logs("acme_nginx", Some(20)).await.unwrap();
        assert_eq!(output.stdout, "line one\n");
        assert_eq!(runner.commands(), vec!["docker logs --tail 20 acme_nginx"]);
    }
}
