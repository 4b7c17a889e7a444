use crate::core::errors::QueueError;
use crate::queue::Queue;
use crate::storage::{CompletionRecord, RecordIndex};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// What happened when a command was invoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// The shell ran; streams are captured in full
    Finished {
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
    },
    /// The shell could not be started
    LaunchFailed { reason: String },
}

impl Execution {
    /// A command succeeded iff it wrote nothing to stderr. The exit code plays
    /// no part, so a program that only warns on stderr counts as failed and a
    /// silent non-zero exit counts as succeeded.
    pub fn succeeded(&self) -> bool {
        match self {
            Self::Finished { stderr, .. } => stderr.is_empty(),
            Self::LaunchFailed { .. } => false,
        }
    }

    pub fn into_completion(self, index: RecordIndex, command: &str) -> CompletionRecord {
        let status = self.succeeded();
        match self {
            Self::Finished { stdout, stderr, .. } => {
                CompletionRecord::new(index, command, status, stdout, stderr)
            }
            Self::LaunchFailed { .. } => {
                CompletionRecord::new(index, command, false, String::new(), String::new())
            }
        }
    }
}

/// Invokes a single queued command
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    async fn run(&self, index: RecordIndex, command: &str) -> Execution;
}

/// Runs commands through `<shell> -c <command>`
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    workdir: Option<PathBuf>,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            workdir: None,
        }
    }
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            workdir: None,
        }
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    async fn invoke(&self, command: &str) -> Result<Execution, QueueError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| QueueError::launch(command, e))?;

        Ok(Execution::Finished {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, index: RecordIndex, command: &str) -> Execution {
        info!("Running command {}: {}", index, command);
        match self.invoke(command).await {
            Ok(execution) => {
                if let Execution::Finished { exit_code, .. } = &execution {
                    debug!(index, exit_code = ?exit_code, "Command exited");
                }
                execution
            }
            Err(e) => {
                error!(index, error = %e, "Command failed: {}", e);
                Execution::LaunchFailed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Run one queued command and settle it.
///
/// Always writes one completion record and then removes the pending record,
/// whatever the outcome. A completion record that fails to write is lost with
/// only a warning, and the pending record is removed anyway. Neither step is
/// atomic with the other or with the execution; a crash before the removal
/// leaves the record pending and it runs again on the next start.
pub async fn run_one(
    index: RecordIndex,
    command: String,
    runner: &dyn CommandRunner,
    queue: &Queue,
) -> Result<CompletionRecord, QueueError> {
    let execution = runner.run(index, &command).await;
    info!("Command executed {}: {}", index, command);

    let record = execution.into_completion(index, &command);
    match queue.store().write_completion(&record).await {
        Ok(path) => debug!(index, path = %path.display(), "Completion recorded"),
        Err(e) => {
            warn!("Error in storing status of cmd {}: {}", command, e);
            info!(index, status = record.status, "Command Status: {}", command);
        }
    }

    queue.dequeue(&[index]).await?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_clean_command_succeeds() {
        let execution = ShellRunner::default().run(0, "echo hello").await;
        assert!(execution.succeeded());

        let record = execution.into_completion(0, "echo hello");
        assert!(record.status);
        assert_eq!(record.output.as_deref(), Some("hello\n"));
        assert_eq!(record.error, None);
    }

    #[tokio::test]
    async fn test_stderr_means_failure_even_on_zero_exit() {
        let execution = ShellRunner::default()
            .run(1, "echo warning >&2; exit 0")
            .await;
        assert!(matches!(
            execution,
            Execution::Finished { exit_code: Some(0), .. }
        ));
        assert!(!execution.succeeded());

        let record = execution.into_completion(1, "echo warning >&2; exit 0");
        assert!(!record.status);
        assert_eq!(record.error.as_deref(), Some("warning\n"));
    }

    #[tokio::test]
    async fn test_silent_nonzero_exit_still_succeeds() {
        let execution = ShellRunner::default().run(2, "exit 3").await;
        assert!(matches!(
            execution,
            Execution::Finished { exit_code: Some(3), .. }
        ));
        assert!(execution.succeeded());
    }

    #[tokio::test]
    async fn test_missing_shell_is_launch_failure() {
        let runner = ShellRunner::new("/nonexistent/bin/shell");
        let execution = runner.run(3, "echo hi").await;
        assert!(matches!(execution, Execution::LaunchFailed { .. }));

        let record = execution.into_completion(3, "echo hi");
        assert!(!record.status);
        assert_eq!(record.output, None);
        assert_eq!(record.error, None);
    }

    #[tokio::test]
    async fn test_workdir_is_applied() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = ShellRunner::default().with_workdir(dir.path());
        let execution = runner.run(4, "pwd").await;

        let Execution::Finished { stdout, .. } = execution else {
            panic!("expected the shell to run");
        };
        let expected = dir.path().canonicalize().unwrap();
        let reported = std::path::PathBuf::from(stdout.trim()).canonicalize().unwrap();
        assert_eq!(reported, expected);
    }
}
