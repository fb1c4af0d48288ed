//! Client for the external task-launch service.
//!
//! Worker placement, isolation, and resource limits belong to the cluster
//! service behind this trait; the control plane only requests that exactly
//! one worker instance starts with the deployment's identity bound into its
//! environment.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{ControlError, ControlResult};

/// Environment variable carrying the deployment ID into the worker.
pub const ENV_DEPLOYMENT_ID: &str = "CANOPY_DEPLOYMENT_ID";
/// Environment variable carrying the project ID into the worker.
pub const ENV_PROJECT_ID: &str = "CANOPY_PROJECT_ID";
/// Environment variable carrying the source repository URL into the worker.
pub const ENV_REPO_URL: &str = "CANOPY_REPO_URL";

/// Specification for one build-worker task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSpec {
    /// Container image to run.
    pub image: String,
    /// Environment injected into the worker. Carries the deployment
    /// identity plus storage and relay endpoints.
    pub env: BTreeMap<String, String>,
}

impl TaskSpec {
    /// Build a worker spec for one deployment.
    #[must_use]
    pub fn for_deployment(
        image: impl Into<String>,
        deployment_id: &str,
        project_id: &str,
        repo_url: &str,
        extra_env: BTreeMap<String, String>,
    ) -> Self {
        let mut env = extra_env;
        env.insert(ENV_DEPLOYMENT_ID.to_owned(), deployment_id.to_owned());
        env.insert(ENV_PROJECT_ID.to_owned(), project_id.to_owned());
        env.insert(ENV_REPO_URL.to_owned(), repo_url.to_owned());
        Self {
            image: image.into(),
            env,
        }
    }
}

/// Fire-and-forget start of one worker instance.
///
/// `start_task` returns once the cluster has acknowledged the request; the
/// worker runs asynchronously and unsupervised afterwards. Calls are not
/// idempotent: retrying with the same deployment ID starts a duplicate
/// worker, which violates the one-active-worker invariant, so callers must
/// not retry without a fresh deployment.
#[async_trait]
pub trait TaskLauncher: Send + Sync {
    /// Start one worker task.
    async fn start_task(&self, spec: &TaskSpec) -> ControlResult<()>;
}

/// Task launcher that POSTs to an external cluster's task endpoint.
pub struct HttpTaskLauncher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTaskLauncher {
    /// Create a launcher targeting the given task endpoint.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> ControlResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ControlError::launch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl TaskLauncher for HttpTaskLauncher {
    async fn start_task(&self, spec: &TaskSpec) -> ControlResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(spec)
            .send()
            .await
            .map_err(|e| ControlError::launch(format!("task service unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(ControlError::launch(format!(
                "task service returned {}",
                response.status()
            )));
        }

        info!(image = %spec.image, "worker task started");
        Ok(())
    }
}

impl std::fmt::Debug for HttpTaskLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTaskLauncher")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Recording launcher for tests.
#[derive(Debug, Default)]
pub struct MockTaskLauncher {
    started: Mutex<Vec<TaskSpec>>,
    fail_next: Mutex<bool>,
}

impl MockTaskLauncher {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Specs of every task started so far.
    pub async fn started(&self) -> Vec<TaskSpec> {
        self.started.lock().await.clone()
    }

    /// Number of tasks started so far.
    pub async fn started_count(&self) -> usize {
        self.started.lock().await.len()
    }

    /// Make the next `start_task` call fail.
    pub async fn fail_next(&self) {
        *self.fail_next.lock().await = true;
    }
}

#[async_trait]
impl TaskLauncher for MockTaskLauncher {
    async fn start_task(&self, spec: &TaskSpec) -> ControlResult<()> {
        if std::mem::take(&mut *self.fail_next.lock().await) {
            return Err(ControlError::launch("injected failure"));
        }
        self.started.lock().await.push(spec.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_spec_binds_deployment_identity() {
        let spec = TaskSpec::for_deployment(
            "canopy/builder:latest",
            "d1",
            "p1",
            "https://example.com/repo.git",
            BTreeMap::from([("CANOPY_RELAY_URL".to_owned(), "redis://relay".to_owned())]),
        );

        assert_eq!(spec.env[ENV_DEPLOYMENT_ID], "d1");
        assert_eq!(spec.env[ENV_PROJECT_ID], "p1");
        assert_eq!(spec.env[ENV_REPO_URL], "https://example.com/repo.git");
        assert_eq!(spec.env["CANOPY_RELAY_URL"], "redis://relay");
    }

    #[tokio::test]
    async fn mock_records_and_fails_on_demand() {
        let launcher = MockTaskLauncher::new();
        let spec = TaskSpec::for_deployment("img", "d1", "p1", "url", BTreeMap::new());

        launcher.start_task(&spec).await.unwrap();
        assert_eq!(launcher.started_count().await, 1);

        launcher.fail_next().await;
        assert!(launcher.start_task(&spec).await.is_err());
        assert_eq!(launcher.started_count().await, 1);
    }
}
