//! Deployment launcher.
//!
//! Creates a deployment record and starts a build worker bound to it. The
//! one hard ordering requirement in the system lives here: relay
//! subscriptions for the deployment's channels are established *before* the
//! worker is launched, so the worker's first messages cannot be lost. The
//! subscription handle is returned to the caller, owned and scoped to this
//! deployment.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use canopy_relay::{ChannelKey, Relay, Subscription};

use crate::config::LaunchConfig;
use crate::error::{ControlError, ControlResult};
use crate::launch::{TaskLauncher, TaskSpec};
use crate::store::DeploymentStore;
use crate::types::{Deployment, ProjectId};

/// Maximum length for a subdomain label.
pub const MAX_SUBDOMAIN_LENGTH: usize = 63;

static SUBDOMAIN_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").ok());

/// Validate a subdomain label.
///
/// Subdomains are used as hostname labels and as lookup keys; path
/// separators and traversal sequences are rejected outright before the
/// pattern check so the error message names the sharper problem.
pub fn validate_subdomain(subdomain: &str) -> Result<(), ControlError> {
    if subdomain.is_empty() {
        return Err(ControlError::InvalidSubdomain(
            "subdomain cannot be empty".into(),
        ));
    }

    if subdomain.len() > MAX_SUBDOMAIN_LENGTH {
        return Err(ControlError::InvalidSubdomain(format!(
            "subdomain exceeds maximum length of {MAX_SUBDOMAIN_LENGTH} characters"
        )));
    }

    if subdomain.contains("..") || subdomain.contains('/') || subdomain.contains('\\') {
        return Err(ControlError::InvalidSubdomain(
            "subdomain contains path separator characters".into(),
        ));
    }

    let Some(pattern) = SUBDOMAIN_PATTERN.as_ref() else {
        return Err(ControlError::InvalidSubdomain(
            "subdomain validation unavailable".into(),
        ));
    };

    if !pattern.is_match(subdomain) {
        return Err(ControlError::InvalidSubdomain(
            "subdomain must be a lowercase DNS label (letters, digits, inner hyphens)".into(),
        ));
    }

    Ok(())
}

/// A freshly launched deployment.
///
/// Carries the relay subscription established before the worker started;
/// the caller owns it and typically hands it to a status consumer.
#[derive(Debug)]
pub struct LaunchedDeployment {
    /// The created deployment record, status `Queued`.
    pub deployment: Deployment,
    /// Routable URL built from the subdomain.
    pub url: String,
    /// Subscription to this deployment's log and status channels.
    pub subscription: Subscription,
}

/// Creates deployment records and starts build workers.
pub struct Launcher {
    store: Arc<dyn DeploymentStore>,
    relay: Arc<dyn Relay>,
    tasks: Arc<dyn TaskLauncher>,
    config: LaunchConfig,
}

impl Launcher {
    /// Create a new launcher.
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        relay: Arc<dyn Relay>,
        tasks: Arc<dyn TaskLauncher>,
        config: LaunchConfig,
    ) -> Self {
        Self {
            store,
            relay,
            tasks,
            config,
        }
    }

    /// Create a deployment and start its build worker.
    ///
    /// Steps, in order: validate the subdomain, look up the project, insert
    /// the `Queued` record (duplicate subdomain fails here, before any
    /// worker exists), subscribe to the deployment's relay channels, then
    /// start the worker task. A task-start failure leaves the deployment
    /// `Queued` and is returned to the caller; this call is not idempotent
    /// and must not be retried against the same deployment.
    pub async fn create_and_launch(
        &self,
        project_id: &ProjectId,
        subdomain: &str,
    ) -> ControlResult<LaunchedDeployment> {
        validate_subdomain(subdomain)?;

        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| ControlError::ProjectNotFound(project_id.to_string()))?;

        let deployment = Deployment::new(project.id.clone(), subdomain);
        self.store.insert(&deployment).await?;

        info!(
            deployment_id = %deployment.id,
            project = %project.id,
            subdomain,
            "deployment created"
        );

        // Subscribe before launch: a worker publishing into channels with no
        // listener would lose those messages permanently.
        let subscription = self
            .relay
            .subscribe(&[
                ChannelKey::logs(deployment.id.as_str()),
                ChannelKey::status(deployment.id.as_str()),
            ])
            .await?;

        let spec = TaskSpec::for_deployment(
            &self.config.worker_image,
            deployment.id.as_str(),
            project.id.as_str(),
            &project.repo_url,
            self.config.worker_env.clone(),
        );
        self.tasks.start_task(&spec).await?;

        info!(deployment_id = %deployment.id, "build worker launched");

        let url = format!("http://{subdomain}.{}", self.config.zone);
        Ok(LaunchedDeployment {
            deployment,
            url,
            subscription,
        })
    }

}

impl std::fmt::Debug for Launcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
