//! Build command execution.
//!
//! Commands run through a trait so the worker flow is testable without a
//! shell. The process-backed runner streams stdout and stderr line by line
//! into a channel as they arrive; the worker forwards them to the log
//! relay, so a watching client sees build output in real time.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{BuildError, BuildResult};

/// Runs one shell command in a working directory, streaming output lines.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` in `workdir`, sending each output line to `output`.
    /// Returns the process exit code.
    async fn run(
        &self,
        command: &str,
        workdir: &Path,
        output: mpsc::Sender<String>,
    ) -> BuildResult<i32>;
}

/// Shell-backed runner used in the real worker.
#[derive(Debug, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        command: &str,
        workdir: &Path,
        output: mpsc::Sender<String>,
    ) -> BuildResult<i32> {
        debug!(%command, workdir = %workdir.display(), "spawning build command");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BuildError::Command(format!("failed to spawn: {e}")))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_sender = output.clone();
        let stdout_task = tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if stdout_sender.send(line).await.is_err() {
                        break;
                    }
                }
            }
        });

        let stderr_task = tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if output.send(line).await.is_err() {
                        break;
                    }
                }
            }
        });

        let status = child
            .wait()
            .await
            .map_err(|e| BuildError::Command(format!("process error: {e}")))?;

        // Drain both pipes before reporting the exit code so no tail of
        // output is dropped.
        stdout_task.await.ok();
        stderr_task.await.ok();

        Ok(status.code().unwrap_or(-1))
    }
}

/// Scripted runner for tests.
#[derive(Debug, Default)]
pub struct MockRunner {
    runs: tokio::sync::Mutex<Vec<String>>,
    lines: Vec<String>,
    exit_code: i32,
}

impl MockRunner {
    /// Runner that emits `lines` and exits with `exit_code`.
    #[must_use]
    pub fn new(lines: Vec<String>, exit_code: i32) -> Self {
        Self {
            runs: tokio::sync::Mutex::new(Vec::new()),
            lines,
            exit_code,
        }
    }

    /// Runner that succeeds silently.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::new(Vec::new(), 0)
    }

    /// Commands run so far, in order.
    pub async fn runs(&self) -> Vec<String> {
        self.runs.lock().await.clone()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(
        &self,
        command: &str,
        _workdir: &Path,
        output: mpsc::Sender<String>,
    ) -> BuildResult<i32> {
        self.runs.lock().await.push(command.to_owned());
        for line in &self.lines {
            if output.send(line.clone()).await.is_err() {
                break;
            }
        }
        Ok(self.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn process_runner_streams_stdout_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(16);

        let code = ProcessRunner
            .run("echo one && echo two", dir.path(), tx)
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(rx.recv().await.as_deref(), Some("one"));
        assert_eq!(rx.recv().await.as_deref(), Some("two"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn process_runner_reports_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(16);

        let code = ProcessRunner.run("exit 3", dir.path(), tx).await.unwrap();
        assert_eq!(code, 3);
    }

    #[tokio::test]
    async fn mock_runner_records_commands() {
        let runner = MockRunner::new(vec!["built".to_owned()], 0);
        let (tx, mut rx) = mpsc::channel(4);

        let code = runner.run("make", Path::new("/tmp"), tx).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(runner.runs().await, vec!["make".to_owned()]);
        assert_eq!(rx.recv().await.as_deref(), Some("built"));
    }
}
