//! Registration of tenant hostnames in the hosts file.
//!
//! Registration is best effort: every failure is logged and reported through
//! [`HostsOutcome`], never returned as an error.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::command::{CommandRunner, CommandSpec};

/// Address tenant hostnames resolve to.
pub const LOOPBACK: &str = "127.0.0.1";

/// What happened when registering a hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostsOutcome {
    /// The hostname was already listed.
    AlreadyPresent,
    /// The entry was appended directly.
    Added,
    /// The entry was appended through `sudo`.
    AddedWithSudo,
    /// Nothing was written.
    Skipped(String),
}

/// Appends `127.0.0.1 <hostname>` entries to a hosts file.
#[derive(Clone)]
pub struct HostsRegistrar {
    path: PathBuf,
    sudo_pass: Option<String>,
    runner: Arc<dyn CommandRunner>,
}

impl HostsRegistrar {
    /// Create a registrar for the hosts file at `path`.
    ///
    /// `sudo_pass` is used only when the file is not writable by this process.
    pub fn new(path: impl Into<PathBuf>, sudo_pass: Option<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            path: path.into(),
            sudo_pass,
            runner,
        }
    }

    /// Ensure `hostname` resolves to the loopback address.
    pub async fn register(&self, hostname: &str) -> HostsOutcome {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read hosts file");
                return HostsOutcome::Skipped(e.to_string());
            }
        };

        if lists_hostname(&contents, hostname) {
            info!(hostname, "Hostname already registered");
            return HostsOutcome::AlreadyPresent;
        }

        let separator = if contents.is_empty() || contents.ends_with('\n') {
            ""
        } else {
            "\n"
        };
        let entry = format!("{separator}{LOOPBACK} {hostname}\n");

        match self.append(&entry).await {
            Ok(()) => {
                info!(hostname, path = %self.path.display(), "Registered hostname");
                HostsOutcome::Added
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                self.append_with_sudo(hostname, &entry).await
            }
            Err(e) => {
                warn!(hostname, error = %e, "Failed to update hosts file");
                HostsOutcome::Skipped(e.to_string())
            }
        }
    }

    async fn append(&self, entry: &str) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await
    }

    async fn append_with_sudo(&self, hostname: &str, entry: &str) -> HostsOutcome {
        let Some(password) = &self.sudo_pass else {
            warn!(
                hostname,
                path = %self.path.display(),
                "Hosts file not writable and HOSTS_SUDO_PASS is not set; add the entry manually"
            );
            return HostsOutcome::Skipped("permission denied".to_string());
        };

        // Only the password goes on stdin. sudo reads nothing when it does not
        // prompt, so anything else there would end up in the file.
        let spec = CommandSpec::new("sudo")
            .args(["-S", "-p", "", "sh", "-c", r#"printf '%s' "$1" >> "$2""#, "sh"])
            .arg(entry)
            .arg(self.path.display().to_string())
            .stdin(format!("{password}\n"));

        match self.runner.run(&spec).await {
            Ok(_) => {
                info!(hostname, "Registered hostname with sudo");
                HostsOutcome::AddedWithSudo
            }
            Err(e) => {
                warn!(hostname, error = %e, "Failed to update hosts file with sudo");
                HostsOutcome::Skipped(e.to_string())
            }
        }
    }
}

/// Whether any non-comment line of a hosts file maps `hostname`.
fn lists_hostname(contents: &str, hostname: &str) -> bool {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .any(|line| line.split_whitespace().skip(1).any(|name| name == hostname))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::mock::RecordingRunner;
    use tempfile::TempDir;

    fn registrar(path: PathBuf, pass: Option<&str>) -> (HostsRegistrar, Arc<RecordingRunner>) {
        let runner = Arc::new(RecordingRunner::new());
        (
            HostsRegistrar::new(path, pass.map(ToString::to_string), runner.clone()),
            runner,
        )
    }

    #[tokio::test]
    async fn appends_missing_entry_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, "127.0.0.1 localhost").unwrap();
        let (registrar, _) = registrar(path.clone(), None);

        assert_eq!(registrar.register("acme.vsync").await, HostsOutcome::Added);
        assert_eq!(
            registrar.register("acme.vsync").await,
            HostsOutcome::AlreadyPresent
        );
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "127.0.0.1 localhost\n127.0.0.1 acme.vsync\n"
        );
    }

    #[tokio::test]
    async fn similar_names_do_not_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, "127.0.0.1 acme.vsync.old\n# 127.0.0.1 acme.vsync\n").unwrap();
        let (registrar, _) = registrar(path, None);

        assert_eq!(registrar.register("acme.vsync").await, HostsOutcome::Added);
    }

    #[tokio::test]
    async fn unreadable_hosts_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hosts");
        std::fs::create_dir(&path).unwrap();
        let (registrar, runner) = registrar(path, None);

        assert!(matches!(
            registrar.register("acme.vsync").await,
            HostsOutcome::Skipped(_)
        ));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn permission_denied_without_password_is_skipped() {
        let (registrar, runner) = registrar(PathBuf::from("/etc/hosts"), None);

        assert!(matches!(
            registrar.append_with_sudo("acme.vsync", "x\n").await,
            HostsOutcome::Skipped(_)
        ));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn sudo_stdin_carries_only_the_password() {
        let (registrar, runner) = registrar(PathBuf::from("/etc/hosts"), Some("s3cret"));

        let outcome = registrar
            .append_with_sudo("acme.vsync", "127.0.0.1 acme.vsync\n")
            .await;
        assert_eq!(outcome, HostsOutcome::AddedWithSudo);

        let call = &runner.calls()[0];
        assert_eq!(call.program, "sudo");
        assert_eq!(call.stdin.as_deref(), Some("s3cret\n"));
        assert_eq!(
            call.args[call.args.len() - 2..],
            ["127.0.0.1 acme.vsync\n".to_string(), "/etc/hosts".to_string()]
        );
        assert!(!call.args.iter().any(|a| a.contains("s3cret")));
    }

    #[tokio::test]
    async fn sudo_failure_is_not_fatal() {
        let (registrar, runner) = registrar(PathBuf::from("/etc/hosts"), Some("wrong"));
        runner.fail_when("sudo", "incorrect password");

        assert!(matches!(
            registrar.append_with_sudo("acme.vsync", "x\n").await,
            HostsOutcome::Skipped(_)
        ));
    }

    #[test]
    fn hostname_matching() {
        let hosts = "127.0.0.1 localhost\n10.0.0.1 a.vsync b.vsync # lab\n";
        assert!(lists_hostname(hosts, "b.vsync"));
        assert!(!lists_hostname(hosts, "10.0.0.1"));
        assert!(!lists_hostname(hosts, "lab"));
    }
}
