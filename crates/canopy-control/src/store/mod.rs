//! State store backends.
//!
//! The state store is the single source of truth for deployment status. It
//! is read concurrently by the gateway and written by the status consumer;
//! the monotonicity guarantee lives in [`DeploymentStore::advance_status`],
//! which must be atomic at the backend so that replicated consumers stay
//! correct without in-process locking.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;

use crate::error::ControlResult;
use crate::types::{Deployment, DeploymentId, DeploymentStatus, Project, ProjectId};

/// Backend for persisting projects and deployments.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Register a new project.
    async fn insert_project(&self, project: &Project) -> ControlResult<()>;

    /// Look up a project by ID. Returns `None` if absent.
    async fn get_project(&self, id: &ProjectId) -> ControlResult<Option<Project>>;

    /// Insert a new deployment record.
    ///
    /// Fails with [`ControlError::SubdomainTaken`] when another deployment
    /// already owns the subdomain.
    ///
    /// [`ControlError::SubdomainTaken`]: crate::error::ControlError::SubdomainTaken
    async fn insert(&self, deployment: &Deployment) -> ControlResult<()>;

    /// Get a deployment by ID. Returns `None` if absent.
    async fn get(&self, id: &DeploymentId) -> ControlResult<Option<Deployment>>;

    /// Resolve a deployment by its subdomain. Returns `None` if absent.
    async fn get_by_subdomain(&self, subdomain: &str) -> ControlResult<Option<Deployment>>;

    /// Conditionally advance a deployment's status.
    ///
    /// The new status is written only when the transition is forward-moving
    /// per [`DeploymentStatus::can_advance_to`]; backward moves and
    /// reapplied terminal states leave the row untouched. Returns whether a
    /// row changed, which makes event redelivery idempotent for callers.
    ///
    /// Advancing an unknown deployment returns `Ok(false)`.
    async fn advance_status(
        &self,
        id: &DeploymentId,
        new_status: DeploymentStatus,
    ) -> ControlResult<bool>;
}
