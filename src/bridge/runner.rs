//! Process-execution boundary for the bridge.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

use super::BridgeError;

/// Runs external programs on behalf of the bridge.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` to completion and return its stdout.
    ///
    /// A non-zero exit or exceeding `timeout` is an error; the child is
    /// killed if it times out.
    async fn output(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, BridgeError>;

    /// Start a long-running program with stderr piped.
    fn spawn(&self, program: &str, args: &[String]) -> Result<Child, BridgeError>;

    /// Whether `program` can be found on `PATH`.
    async fn is_installed(&self, program: &str) -> bool;
}

/// Runs real processes via `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, BridgeError> {
        let command = command_line(program, args);
        debug!(%command, "running");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| BridgeError::Timeout {
                command: command.clone(),
            })?
            .map_err(|e| BridgeError::Execution {
                command: command.clone(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(BridgeError::Execution {
                command,
                detail: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn(&self, program: &str, args: &[String]) -> Result<Child, BridgeError> {
        debug!(command = %command_line(program, args), "spawning");
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BridgeError::Spawn {
                program: program.to_string(),
                source,
            })
    }

    async fn is_installed(&self, program: &str) -> bool {
        let program = program.to_string();
        tokio::task::spawn_blocking(move || which::which(program).is_ok())
            .await
            .unwrap_or(false)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn output_returns_stdout() {
        let out = SystemRunner
            .output("echo", &["hello".to_string()], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_is_execution_error() {
        let err = SystemRunner
            .output("false", &[], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Execution { .. }));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let err = SystemRunner
            .output("sleep", &["5".to_string()], Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_not_installed() {
        assert!(!SystemRunner.is_installed("md-open-no-such-program").await);
        assert!(SystemRunner.is_installed("sh").await);
    }
}
