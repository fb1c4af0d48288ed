//! In-memory state store for tests and single-node development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{ControlError, ControlResult};
use crate::types::{Deployment, DeploymentId, DeploymentStatus, Project, ProjectId};

use super::DeploymentStore;

#[derive(Debug, Default)]
struct Inner {
    projects: HashMap<ProjectId, Project>,
    deployments: HashMap<DeploymentId, Deployment>,
    // subdomain -> deployment id, mirrors the UNIQUE constraint in Postgres
    subdomains: HashMap<String, DeploymentId>,
}

/// In-memory deployment store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn insert_project(&self, project: &Project) -> ControlResult<()> {
        let mut inner = self.inner.write().await;
        inner.projects.insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn get_project(&self, id: &ProjectId) -> ControlResult<Option<Project>> {
        let inner = self.inner.read().await;
        Ok(inner.projects.get(id).cloned())
    }

    async fn insert(&self, deployment: &Deployment) -> ControlResult<()> {
        let mut inner = self.inner.write().await;

        if inner.subdomains.contains_key(&deployment.subdomain) {
            return Err(ControlError::SubdomainTaken(deployment.subdomain.clone()));
        }

        inner
            .subdomains
            .insert(deployment.subdomain.clone(), deployment.id.clone());
        inner
            .deployments
            .insert(deployment.id.clone(), deployment.clone());
        Ok(())
    }

    async fn get(&self, id: &DeploymentId) -> ControlResult<Option<Deployment>> {
        let inner = self.inner.read().await;
        Ok(inner.deployments.get(id).cloned())
    }

    async fn get_by_subdomain(&self, subdomain: &str) -> ControlResult<Option<Deployment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .subdomains
            .get(subdomain)
            .and_then(|id| inner.deployments.get(id))
            .cloned())
    }

    async fn advance_status(
        &self,
        id: &DeploymentId,
        new_status: DeploymentStatus,
    ) -> ControlResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(deployment) = inner.deployments.get_mut(id) else {
            return Ok(false);
        };

        if !deployment.status.can_advance_to(new_status) {
            return Ok(false);
        }

        deployment.status = new_status;
        deployment.updated_at = chrono::Utc::now();
        Ok(true)
    }
}
