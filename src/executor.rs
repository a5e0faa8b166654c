//! Async process executor used by the reference CLI adapter.
//!
//! Spawns a child process, optionally enforcing a timeout, collects
//! stdout/stderr on background tasks, and reports a structured
//! [`CommandOutput`]. Backs `adapter::cli::CliShipDocker` and the
//! `exec`/`rexec` lifecycle checks, both of which need to run a child
//! process and observe its exit code.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{MaestroError, MaestroResult};

/// Configuration for a single command execution.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Command timeout (`None` for no timeout).
    pub timeout: Option<Duration>,
    /// Environment variables to set for the child.
    pub environment: HashMap<String, String>,
    /// Working directory for the child.
    pub working_dir: Option<PathBuf>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            environment: HashMap::new(),
            working_dir: None,
        }
    }
}

/// Result of running a command to completion.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Process exit code.
    pub exit_code: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Whether the exit code was zero.
    pub success: bool,
}

impl CommandOutput {
    /// Build an output record, deriving `success` from `exit_code == 0`.
    pub fn new(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            success: exit_code == 0,
        }
    }
}

/// Runs a binary as a child process with bounded wait time.
///
/// One `ProcessExecutor` is constructed per program (the `docker` binary for
/// the CLI adapter, the controller-local command for `exec` checks).
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    /// Path (or bare name, resolved via `PATH`) to the binary.
    pub program: PathBuf,
    default_config: ExecutionConfig,
}

impl ProcessExecutor {
    /// Create an executor for `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            default_config: ExecutionConfig::default(),
        }
    }

    /// Override the default per-command timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_config.timeout = Some(timeout);
        self
    }

    /// Run `program args...` to completion and return its captured output.
    /// A non-zero exit is NOT itself an error — callers (lifecycle checks,
    /// the CLI adapter) decide what a failing exit code means for their
    /// own operation.
    pub async fn execute(
        &self,
        args: &[String],
        config: Option<ExecutionConfig>,
    ) -> MaestroResult<CommandOutput> {
        let config = config.unwrap_or_else(|| self.default_config.clone());
        let command_str = format!("{} {}", self.program.display(), args.join(" "));
        debug!(command = %command_str, "executing");

        let mut command = Command::new(&self.program);
        command.args(args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        for (key, value) in &config.environment {
            command.env(key, value);
        }
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(MaestroError::from)?;

        let output = if let Some(duration) = config.timeout {
            match timeout(duration, Self::wait_for_output(child)).await {
                Ok(result) => result?,
                Err(_) => return Err(MaestroError::Timeout(duration)),
            }
        } else {
            Self::wait_for_output(child).await?
        };

        trace!(exit_code = output.exit_code, "command completed");
        Ok(output)
    }

    async fn wait_for_output(mut child: Child) -> MaestroResult<CommandOutput> {
        let stdout_handle = child.stdout.take().map(|stdout| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                let mut out = String::new();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(&line);
                }
                out
            })
        });
        let stderr_handle = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut out = String::new();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(&line);
                }
                out
            })
        });

        let status = child.wait().await.map_err(MaestroError::from)?;

        let stdout = match stdout_handle {
            Some(h) => h
                .await
                .map_err(|e| MaestroError::Parse(format!("stdout join error: {e}")))?,
            None => String::new(),
        };
        let stderr = match stderr_handle {
            Some(h) => h
                .await
                .map_err(|e| MaestroError::Parse(format!("stderr join error: {e}")))?,
            None => String::new(),
        };

        Ok(CommandOutput::new(
            status.code().unwrap_or(-1),
            stdout,
            stderr,
        ))
    }

    /// Feed `data` to the child's stdin and close it, logging (not failing)
    /// on error.
    pub fn feed_stdin(mut child: Child, data: Vec<u8>) {
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&data).await {
                    warn!("failed to write to stdin: {e}");
                }
                let _ = stdin.shutdown().await;
            });
        }
    }
}

/// Locate the `docker` binary on `PATH`, falling back to common install
/// locations.
#[cfg(feature = "cli-adapter")]
pub fn find_docker_binary() -> MaestroResult<PathBuf> {
    for candidate in ["docker", "/usr/bin/docker", "/usr/local/bin/docker"] {
        let path = PathBuf::from(candidate);
        if path.exists() || which::which(candidate).is_ok() {
            return Ok(path);
        }
    }
    which::which("docker").map_err(|_| MaestroError::config("docker binary not found in PATH"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_output_success_flag() {
        let out = CommandOutput::new(0, "ok".into(), String::new());
        assert!(out.success);
        let out = CommandOutput::new(1, String::new(), "bad".into());
        assert!(!out.success);
    }

    #[tokio::test]
    async fn execute_true_and_false() {
        let exec = ProcessExecutor::new("/bin/true");
        let out = exec.execute(&[], None).await.unwrap();
        assert!(out.success);

        let exec = ProcessExecutor::new("/bin/false");
        let out = exec.execute(&[], None).await.unwrap();
        assert!(!out.success);
    }

    #[tokio::test]
    async fn execute_times_out() {
        let exec = ProcessExecutor::new("/bin/sleep")
            .with_default_timeout(Duration::from_millis(50));
        let err = exec
            .execute(&["1".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, MaestroError::Timeout(_)));
    }
}
