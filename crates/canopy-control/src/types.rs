//! Core types for canopy-control.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a deployment.
///
/// Doubles as the relay channel key suffix and the artifact-store path
/// prefix, so it must stay opaque and immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(String);

impl DeploymentId {
    /// Wrap an existing deployment ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique deployment ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DeploymentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Wrap an existing project ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique project ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ProjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Deployment lifecycle status.
///
/// Progression is monotonic: `NotStarted`/`Queued` → `Building` →
/// `Live`/`Failed`. `Live` and `Failed` are terminal; no event may move a
/// deployment backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    /// Deployment row exists but nothing has been queued. Present for
    /// schema compatibility; the launcher always writes `Queued`.
    NotStarted,
    /// Deployment created, build worker requested.
    Queued,
    /// Build worker is running.
    Building,
    /// Artifacts are uploaded and retrievable.
    Live,
    /// Build failed or was aborted.
    Failed,
}

impl DeploymentStatus {
    /// Get the status name as stored and sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Queued => "QUEUED",
            Self::Building => "BUILDING",
            Self::Live => "LIVE",
            Self::Failed => "FAILED",
        }
    }

    /// Position in the monotonic ordering.
    ///
    /// `NotStarted` and `Queued` share a rank, as do the two terminal
    /// states: a transition is valid only when the rank strictly increases.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::NotStarted | Self::Queued => 0,
            Self::Building => 1,
            Self::Live | Self::Failed => 2,
        }
    }

    /// Whether no further transitions are valid from this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Live | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a forward transition.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_STARTED" => Ok(Self::NotStarted),
            "QUEUED" => Ok(Self::Queued),
            "BUILDING" => Ok(Self::Building),
            "LIVE" => Ok(Self::Live),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("unknown deployment status: {s}")),
        }
    }
}

/// A deployment record as stored in the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique deployment identifier.
    pub id: DeploymentId,
    /// Project this deployment belongs to.
    pub project_id: ProjectId,
    /// Routing key: the first hostname label that resolves to this
    /// deployment. Unique across all deployments.
    pub subdomain: String,
    /// Current lifecycle status. Mutated only by the status consumer after
    /// creation.
    pub status: DeploymentStatus,
    /// When the deployment was created.
    pub created_at: DateTime<Utc>,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    /// Create a new queued deployment for a project.
    #[must_use]
    pub fn new(project_id: ProjectId, subdomain: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: DeploymentId::generate(),
            project_id,
            subdomain: subdomain.into(),
            status: DeploymentStatus::Queued,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A registered project: the source repository a deployment builds from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique project identifier.
    pub id: ProjectId,
    /// Human-readable project name.
    pub name: String,
    /// Source repository URL passed to the build worker.
    pub repo_url: String,
    /// When the project was registered.
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Register a new project.
    #[must_use]
    pub fn new(name: impl Into<String>, repo_url: impl Into<String>) -> Self {
        Self {
            id: ProjectId::generate(),
            name: name.into(),
            repo_url: repo_url.into(),
            created_at: Utc::now(),
        }
    }
}
