//! Canopy control plane.
//!
//! Orchestrates the deployment lifecycle: creating deployment records,
//! starting isolated build workers, and persisting the status transitions
//! those workers publish over the relay.
//!
//! # State machine
//!
//! ```text
//! NotStarted/Queued ──▶ Building ──▶ Live
//!                          │
//!                          ▼
//!                        Failed  (also reachable from Queued)
//! ```
//!
//! Status is monotonic: events that would move a deployment backward, or
//! re-apply a terminal state, are no-ops. `Live` and `Failed` are terminal.
//! The state store enforces this in [`store::DeploymentStore::advance_status`]
//! with an atomic conditional update, which keeps replicated status
//! consumers correct without coordination.
//!
//! # Ordering
//!
//! The launcher subscribes to a deployment's relay channels before starting
//! its worker. This is the one hard ordering requirement in the system:
//! the relay has no replay, so a message published before any subscriber
//! exists is lost permanently.

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod consumer;
pub mod error;
pub mod launch;
pub mod launcher;
pub mod store;
pub mod types;

pub use config::ControlConfig;
pub use consumer::StatusConsumer;
pub use error::{ControlError, ControlResult};
pub use launch::{HttpTaskLauncher, MockTaskLauncher, TaskLauncher, TaskSpec};
pub use launcher::{validate_subdomain, LaunchedDeployment, Launcher};
pub use store::{DeploymentStore, MemoryStore, PostgresStore};
pub use types::{Deployment, DeploymentId, DeploymentStatus, Project, ProjectId};
