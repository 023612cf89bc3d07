use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Hard limit on a single command's runtime.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Why an execution did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The command ran to completion with a nonzero exit status
    /// (`None` when terminated by a signal).
    ExitCode(Option<i32>),
    /// The command exceeded the execution timeout and was killed.
    Timeout,
    /// The command could not be spawned or waited on.
    Spawn(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::ExitCode(Some(code)) => write!(f, "exit code {code}"),
            FailureReason::ExitCode(None) => write!(f, "terminated by signal"),
            FailureReason::Timeout => write!(f, "timed out"),
            FailureReason::Spawn(e) => write!(f, "spawn error: {e}"),
        }
    }
}

/// Result of a single execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success,
    Failure(FailureReason),
    /// Shutdown arrived mid-execution; the child was killed and no outcome
    /// should be recorded.
    Interrupted,
}

/// Executes job commands through `sh -c`.
///
/// Commands are executed directly via shell without sandboxing. Exit status
/// is captured and a hard timeout bounds every run.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `command` to completion, enforcing the timeout.
    ///
    /// Exit 0 is success; a nonzero exit, timeout, or spawn error is a
    /// failure with the reason captured. Cancelling `shutdown` kills the
    /// child promptly and yields `Interrupted`.
    pub async fn execute(
        &self,
        job_id: &str,
        command: &str,
        shutdown: &CancellationToken,
    ) -> ExecutionOutcome {
        tracing::info!(job_id = %job_id, command, "Executing job");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to spawn command");
                return ExecutionOutcome::Failure(FailureReason::Spawn(e.to_string()));
            }
        };

        // Dropping the wait future on timeout or shutdown kills the child
        // via kill_on_drop.
        tokio::select! {
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => {
                match result {
                    Ok(Ok(output)) => Self::process_output(job_id, output),
                    Ok(Err(e)) => {
                        tracing::error!(job_id = %job_id, error = %e, "Failed to wait on command");
                        ExecutionOutcome::Failure(FailureReason::Spawn(e.to_string()))
                    }
                    Err(_) => {
                        tracing::warn!(
                            job_id = %job_id,
                            timeout_secs = self.timeout.as_secs(),
                            "Command timed out, killed"
                        );
                        ExecutionOutcome::Failure(FailureReason::Timeout)
                    }
                }
            }
            _ = shutdown.cancelled() => {
                tracing::info!(job_id = %job_id, "Shutdown during execution, command killed");
                ExecutionOutcome::Interrupted
            }
        }
    }

    fn process_output(job_id: &str, output: std::process::Output) -> ExecutionOutcome {
        let exit_code = output.status.code();

        if output.status.success() {
            tracing::info!(job_id = %job_id, "Command succeeded");
            return ExecutionOutcome::Success;
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = FailureReason::ExitCode(exit_code);
        tracing::warn!(
            job_id = %job_id,
            exit_code = ?exit_code,
            stderr = %stderr.trim_end(),
            "Command failed"
        );
        ExecutionOutcome::Failure(reason)
    }
}
