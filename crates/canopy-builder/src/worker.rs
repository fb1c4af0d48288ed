//! Build worker flow.
//!
//! One worker builds exactly one deployment, start to finish:
//! screen the build command, publish `BUILDING`, clone the repository, run
//! the build while streaming its output to the log channel, upload the
//! output directory, publish `LIVE`. Every failure path publishes `FAILED`
//! best-effort before returning; the status channel is how the control
//! plane learns the outcome, so the worker never exits silently mid-flight.

use std::path::PathBuf;
use std::sync::Arc;

use canopy_control::DeploymentStatus;
use canopy_relay::{Relay, StatusEvent};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::env::WorkerEnv;
use crate::error::{BuildError, BuildResult};
use crate::runner::CommandRunner;
use crate::screen::screen_command;
use crate::upload::ArtifactUploader;

/// One-shot build worker.
pub struct Worker {
    env: WorkerEnv,
    relay: Arc<dyn Relay>,
    runner: Arc<dyn CommandRunner>,
    uploader: ArtifactUploader,
    workspace: PathBuf,
}

impl Worker {
    /// Assemble a worker. `workspace` is the scratch directory the
    /// repository is cloned into.
    pub fn new(
        env: WorkerEnv,
        relay: Arc<dyn Relay>,
        runner: Arc<dyn CommandRunner>,
        uploader: ArtifactUploader,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            env,
            relay,
            runner,
            uploader,
            workspace: workspace.into(),
        }
    }

    /// Run the build to a terminal status.
    ///
    /// Returns `Live` or `Failed` rather than exiting the process, so the
    /// binary decides the exit code and tests can assert on the outcome.
    pub async fn run(&self) -> DeploymentStatus {
        match self.build().await {
            Ok(()) => DeploymentStatus::Live,
            Err(e) => {
                error!(deployment_id = %self.env.deployment_id, error = %e, "build failed");
                self.log_best_effort(&format!("build failed: {e}")).await;
                self.publish_status_best_effort(DeploymentStatus::Failed)
                    .await;
                DeploymentStatus::Failed
            }
        }
    }

    async fn build(&self) -> BuildResult<()> {
        let deployment_id = &self.env.deployment_id;

        // The screen runs before anything else touches the repository or
        // the shell. A rejected command never starts building.
        screen_command(&self.env.build_command)?;

        self.publish_status(DeploymentStatus::Building).await?;
        self.log(&format!(
            "build started for project {}",
            self.env.project_id
        ))
        .await?;

        let checkout = self.workspace.join(deployment_id);
        self.clone_repository(&checkout).await?;

        self.log(&format!("running: {}", self.env.build_command))
            .await?;
        let exit_code = self
            .run_streamed(&self.env.build_command, &checkout)
            .await?;
        if exit_code != 0 {
            return Err(BuildError::BuildFailed { exit_code });
        }

        let output_dir = checkout.join(&self.env.output_dir);
        let uploaded = self.uploader.upload_dir(deployment_id, &output_dir).await?;
        self.log(&format!("uploaded {uploaded} files")).await?;

        self.publish_status(DeploymentStatus::Live).await?;
        info!(deployment_id, "deployment live");
        Ok(())
    }

    async fn clone_repository(&self, checkout: &std::path::Path) -> BuildResult<()> {
        tokio::fs::create_dir_all(&self.workspace).await?;
        self.log(&format!("cloning {}", self.env.repo_url)).await?;

        let clone_command = format!(
            "git clone --depth 1 {} {}",
            shell_quote(&self.env.repo_url),
            shell_quote(&checkout.to_string_lossy())
        );
        let exit_code = self.run_streamed(&clone_command, &self.workspace).await?;
        if exit_code != 0 {
            return Err(BuildError::Checkout(format!(
                "git clone exited with code {exit_code}"
            )));
        }
        Ok(())
    }

    /// Run a command, forwarding its output lines to the log channel as
    /// they arrive.
    async fn run_streamed(&self, command: &str, workdir: &std::path::Path) -> BuildResult<i32> {
        let (tx, mut rx) = mpsc::channel::<String>(64);

        let relay = self.relay.clone();
        let deployment_id = self.env.deployment_id.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if let Err(e) = relay.publish_log(&deployment_id, &line).await {
                    warn!(error = %e, "dropping log line");
                }
            }
        });

        let result = self.runner.run(command, workdir, tx).await;
        forwarder.await.ok();
        result
    }

    async fn publish_status(&self, status: DeploymentStatus) -> BuildResult<()> {
        self.relay
            .publish_status(&StatusEvent::new(&self.env.deployment_id, status.as_str()))
            .await?;
        Ok(())
    }

    async fn log(&self, line: &str) -> BuildResult<()> {
        self.relay
            .publish_log(&self.env.deployment_id, line)
            .await?;
        Ok(())
    }

    async fn publish_status_best_effort(&self, status: DeploymentStatus) {
        if let Err(e) = self.publish_status(status).await {
            error!(error = %e, "could not publish terminal status");
        }
    }

    async fn log_best_effort(&self, line: &str) {
        if let Err(e) = self.log(line).await {
            warn!(error = %e, "could not publish log line");
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("deployment_id", &self.env.deployment_id)
            .finish_non_exhaustive()
    }
}

/// Minimal single-quote shell quoting for interpolated arguments.
fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use canopy_relay::{ChannelKey, MemoryRelay, Relay as _, RelayMessage, Subscription};
    use object_store::memory::InMemory;

    use crate::env::{ENV_ARTIFACT_PATH, ENV_BUILD_COMMAND, ENV_RELAY_URL};
    use crate::runner::MockRunner;
    use canopy_control::launch::{ENV_DEPLOYMENT_ID, ENV_PROJECT_ID, ENV_REPO_URL};

    use super::*;

    fn worker_env(build_command: &str) -> WorkerEnv {
        let vars = HashMap::from(
            [
                (ENV_DEPLOYMENT_ID, "d1"),
                (ENV_PROJECT_ID, "p1"),
                (ENV_REPO_URL, "https://example.com/site.git"),
                (ENV_RELAY_URL, "memory"),
                (ENV_ARTIFACT_PATH, "unused"),
                (ENV_BUILD_COMMAND, build_command),
            ]
            .map(|(k, v)| (k.to_owned(), v.to_owned())),
        );
        WorkerEnv::from_vars(&vars).unwrap()
    }

    struct Harness {
        relay: Arc<MemoryRelay>,
        runner: Arc<MockRunner>,
        worker: Worker,
        _workspace: tempfile::TempDir,
    }

    fn harness(build_command: &str, runner: MockRunner, with_output: bool) -> Harness {
        let relay = Arc::new(MemoryRelay::new());
        let runner = Arc::new(runner);
        let workspace = tempfile::tempdir().unwrap();

        // The mock runner does not clone anything, so seed the directory
        // layout the real clone and build would have produced.
        let checkout = workspace.path().join("d1");
        if with_output {
            let output = checkout.join("dist");
            std::fs::create_dir_all(&output).unwrap();
            std::fs::write(output.join("index.html"), "<h1>built</h1>").unwrap();
        } else {
            std::fs::create_dir_all(&checkout).unwrap();
        }

        let worker = Worker::new(
            worker_env(build_command),
            relay.clone(),
            runner.clone(),
            ArtifactUploader::new(Arc::new(InMemory::new())),
            workspace.path(),
        );

        Harness {
            relay,
            runner,
            worker,
            _workspace: workspace,
        }
    }

    async fn subscribe_status(relay: &MemoryRelay) -> Subscription {
        relay
            .subscribe(&[ChannelKey::status("d1"), ChannelKey::logs("d1")])
            .await
            .unwrap()
    }

    async fn collect_statuses(subscription: &mut Subscription) -> Vec<String> {
        let mut statuses = Vec::new();
        while let Ok(Some((_, message))) = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            subscription.recv(),
        )
        .await
        {
            if let RelayMessage::Status(event) = message {
                statuses.push(event.status);
            }
        }
        statuses
    }

    #[tokio::test]
    async fn successful_build_publishes_building_then_live() {
        let h = harness("npm run build", MockRunner::succeeding(), true);
        let mut subscription = subscribe_status(&h.relay).await;

        let terminal = h.worker.run().await;
        assert_eq!(terminal, DeploymentStatus::Live);

        let statuses = collect_statuses(&mut subscription).await;
        assert_eq!(statuses, vec!["BUILDING".to_owned(), "LIVE".to_owned()]);

        // Clone plus build command.
        assert_eq!(h.runner.runs().await.len(), 2);
    }

    #[tokio::test]
    async fn screened_command_fails_without_running_anything() {
        let h = harness("rm -rf /", MockRunner::succeeding(), true);
        let mut subscription = subscribe_status(&h.relay).await;

        let terminal = h.worker.run().await;
        assert_eq!(terminal, DeploymentStatus::Failed);

        // Never reached the shell, never published BUILDING.
        assert!(h.runner.runs().await.is_empty());
        let statuses = collect_statuses(&mut subscription).await;
        assert_eq!(statuses, vec!["FAILED".to_owned()]);
    }

    #[tokio::test]
    async fn failing_build_command_publishes_failed() {
        let h = harness(
            "npm run build",
            MockRunner::new(vec!["boom".to_owned()], 1),
            true,
        );
        let mut subscription = subscribe_status(&h.relay).await;

        let terminal = h.worker.run().await;
        assert_eq!(terminal, DeploymentStatus::Failed);

        let statuses = collect_statuses(&mut subscription).await;
        assert_eq!(statuses, vec!["BUILDING".to_owned(), "FAILED".to_owned()]);
    }

    #[tokio::test]
    async fn missing_output_directory_publishes_failed() {
        let h = harness("npm run build", MockRunner::succeeding(), false);
        let mut subscription = subscribe_status(&h.relay).await;

        let terminal = h.worker.run().await;
        assert_eq!(terminal, DeploymentStatus::Failed);

        let statuses = collect_statuses(&mut subscription).await;
        assert_eq!(statuses, vec!["BUILDING".to_owned(), "FAILED".to_owned()]);
    }

    #[tokio::test]
    async fn build_output_lines_reach_the_log_channel() {
        let h = harness(
            "npm run build",
            MockRunner::new(vec!["compiling".to_owned(), "done".to_owned()], 0),
            true,
        );
        let mut subscription = subscribe_status(&h.relay).await;

        h.worker.run().await;

        let mut logs = Vec::new();
        while let Ok(Some((channel, message))) = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            subscription.recv(),
        )
        .await
        {
            if let (ChannelKey::Logs(_), RelayMessage::Log(line)) = (channel, message) {
                logs.push(line);
            }
        }

        // Mock runner output appears once per command invocation.
        assert!(logs.contains(&"compiling".to_owned()));
        assert!(logs.contains(&"done".to_owned()));
        assert!(logs.iter().any(|l| l.starts_with("cloning ")));
    }
}
