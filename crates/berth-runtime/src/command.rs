//! Typed wrapper around external programs.
//!
//! Every call to `git`, `docker`, compose, `npm`, `pm2` or `sudo` goes through
//! a [`CommandRunner`]. Arguments are passed as a vector and never spliced
//! into a shell command line, so tenant names and repository URLs cannot be
//! interpreted as shell syntax.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, RuntimeError};

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute, looked up on `PATH`.
    pub program: String,
    /// Arguments, passed verbatim.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Data written to the program's standard input. Never logged.
    pub stdin: Option<String>,
    /// Per-command time limit overriding the runner default.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    /// Start building an invocation of `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            stdin: None,
            timeout: None,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Feed `input` on standard input.
    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Override the time limit.
    #[must_use]
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// The command line for logs and error messages.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the program exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes [`CommandSpec`]s.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a program to completion and capture its output, whatever its exit status.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or exceeds its time limit.
    async fn output(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Run a program and require it to succeed.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::CommandFailed` with the captured stderr if the
    /// program exits unsuccessfully.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = self.output(spec).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(RuntimeError::CommandFailed {
                command: spec.display(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Log the failure of a step that should not abort the surrounding workflow.
///
/// Returns the step's value when it succeeded.
pub fn non_fatal<T>(step: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(step, error = %e, "Non-fatal step failed, continuing");
            None
        }
    }
}

/// Runs programs as child processes of the current process.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    default_timeout: Duration,
}

impl ProcessRunner {
    /// Create a runner applying `default_timeout` to commands without their own limit.
    #[must_use]
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn output(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        debug!(command = %spec.display(), cwd = ?spec.cwd, "Running command");

        let spawn_error = |source| RuntimeError::Spawn {
            program: spec.program.clone(),
            source,
        };
        let mut child = cmd.spawn().map_err(spawn_error)?;

        if let (Some(input), Some(mut stdin)) = (&spec.stdin, child.stdin.take()) {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(spawn_error)?;
        }

        let limit = spec.timeout.unwrap_or(self.default_timeout);
        let output = tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| RuntimeError::Timeout {
                command: spec.display(),
                secs: limit.as_secs(),
            })?
            .map_err(spawn_error)?;

        let output = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !output.success() {
            debug!(
                command = %spec.display(),
                code = ?output.code,
                stderr = %output.stderr.trim(),
                "Command exited unsuccessfully"
            );
        }
        Ok(output)
    }
}

/// A recording runner for tests without docker or git installed.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;

    /// Records every command and answers with canned output.
    ///
    /// `git clone` is simulated by creating the destination directory and
    /// populating it with the configured files.
    #[derive(Default)]
    pub struct RecordingRunner {
        calls: Mutex<Vec<CommandSpec>>,
        failures: Mutex<Vec<(String, String)>>,
        stdout: Mutex<Vec<(String, String)>>,
        cloned_files: Mutex<Vec<(String, String)>>,
    }

    impl RecordingRunner {
        /// Create a runner where every command succeeds.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make any command whose command line contains `pattern` fail with `stderr`.
        pub fn fail_when(&self, pattern: &str, stderr: &str) {
            self.failures
                .lock()
                .push((pattern.to_string(), stderr.to_string()));
        }

        /// Answer commands containing `pattern` with `stdout`.
        pub fn respond_when(&self, pattern: &str, stdout: &str) {
            self.stdout
                .lock()
                .push((pattern.to_string(), stdout.to_string()));
        }

        /// Write `contents` to `relative` inside every simulated clone.
        pub fn clone_with_file(&self, relative: &str, contents: &str) {
            self.cloned_files
                .lock()
                .push((relative.to_string(), contents.to_string()));
        }

        /// All recorded invocations, in order.
        #[must_use]
        pub fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().clone()
        }

        /// Recorded command lines, in order.
        #[must_use]
        pub fn commands(&self) -> Vec<String> {
            self.calls.lock().iter().map(CommandSpec::display).collect()
        }

        /// Index of the first recorded command line containing `pattern`.
        #[must_use]
        pub fn position(&self, pattern: &str) -> Option<usize> {
            self.commands().iter().position(|c| c.contains(pattern))
        }

        fn simulate_clone(&self, spec: &CommandSpec) -> std::io::Result<()> {
            if spec.program != "git" || spec.args.first().map(String::as_str) != Some("clone") {
                return Ok(());
            }
            let Some(dest) = spec.args.last() else {
                return Ok(());
            };
            let dest = PathBuf::from(dest);
            std::fs::create_dir_all(&dest)?;
            std::fs::write(dest.join("README.md"), "cloned\n")?;
            for (relative, contents) in self.cloned_files.lock().iter() {
                let path = dest.join(relative);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, contents)?;
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn output(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            self.calls.lock().push(spec.clone());
            let line = spec.display();

            if let Some((_, stderr)) = self
                .failures
                .lock()
                .iter()
                .find(|(pattern, _)| line.contains(pattern.as_str()))
            {
                return Ok(CommandOutput {
                    code: Some(1),
                    stdout: String::new(),
                    stderr: stderr.clone(),
                });
            }

            self.simulate_clone(spec)
                .map_err(|e| RuntimeError::io(spec.args.last().cloned().unwrap_or_default(), e))?;

            let stdout = self
                .stdout
                .lock()
                .iter()
                .find(|(pattern, _)| line.contains(pattern.as_str()))
                .map(|(_, out)| out.clone())
                .unwrap_or_default();

            Ok(CommandOutput {
                code: Some(0),
                stdout,
                stderr: String::new(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::RecordingRunner;
    use super::*;

    #[test]
    fn display_joins_program_and_args() {
        let spec = CommandSpec::new("docker")
            .args(["logs", "--tail", "20"])
            .arg("acme_backend")
            .stdin("secret");
        assert_eq!(spec.display(), "docker logs --tail 20 acme_backend");
    }

    #[tokio::test]
    async fn process_runner_captures_output() {
        let runner = ProcessRunner::default();
        let output = runner
            .run(&CommandSpec::new("sh").args(["-c", "echo hello; echo oops >&2"]))
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn process_runner_reports_failure_with_stderr() {
        let runner = ProcessRunner::default();
        let err = runner
            .run(&CommandSpec::new("sh").args(["-c", "echo broken >&2; exit 3"]))
            .await
            .unwrap_err();
        match err {
            RuntimeError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn process_runner_feeds_stdin() {
        let runner = ProcessRunner::default();
        let output = runner
            .run(&CommandSpec::new("cat").stdin("from stdin"))
            .await
            .unwrap();
        assert_eq!(output.stdout, "from stdin");
    }

    #[tokio::test]
    async fn process_runner_enforces_timeout() {
        let runner = ProcessRunner::new(Duration::from_millis(100));
        let err = runner
            .output(&CommandSpec::new("sleep").arg("5"))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout { .. }));
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let runner = ProcessRunner::default();
        let err = runner
            .output(&CommandSpec::new("berth-definitely-not-installed"))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn { .. }));
    }

    #[tokio::test]
    async fn non_fatal_step_swallows_failure() {
        let runner = RecordingRunner::new();
        runner.fail_when("stop", "no such container");

        let stopped = non_fatal("stop", runner.run(&CommandSpec::new("docker").arg("stop")).await);
        assert!(stopped.is_none());
        let listed = non_fatal("ps", runner.run(&CommandSpec::new("docker").arg("ps")).await);
        assert!(listed.is_some());
        assert_eq!(runner.commands(), vec!["docker stop", "docker ps"]);
    }
}
