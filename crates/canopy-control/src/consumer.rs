//! Status consumer.
//!
//! Applies status-channel events to the state store. Consumption is
//! idempotent: the store's conditional update rejects backward moves and
//! reapplied terminal states, so at-least-once delivery from the relay is
//! safe. There is no reconciliation for workers that die without publishing
//! a terminal status; a synthetic `FAILED` fed through the same
//! `advance_status` path would be the seam for one.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use canopy_relay::{RelayMessage, StatusEvent, Subscription};

use crate::config::ConsumerConfig;
use crate::store::DeploymentStore;
use crate::types::{DeploymentId, DeploymentStatus};

/// Consumes status events from a relay subscription and persists them.
pub struct StatusConsumer {
    store: Arc<dyn DeploymentStore>,
    config: ConsumerConfig,
}

impl StatusConsumer {
    /// Create a new status consumer.
    pub fn new(store: Arc<dyn DeploymentStore>, config: ConsumerConfig) -> Self {
        Self { store, config }
    }

    /// Drain a subscription until a terminal status is applied, the
    /// subscription ends, or the token is cancelled.
    ///
    /// Stopping at the terminal state drops the subscription, which tears
    /// down the relay-side forwarding for this deployment; nothing useful
    /// can arrive on the channel afterwards.
    ///
    /// Log-channel messages arriving on a shared subscription are ignored
    /// here; live-log observers read them from their own handles.
    pub async fn run(&self, mut subscription: Subscription, cancel: CancellationToken) {
        info!("status consumer started");

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    info!("status consumer shutting down");
                    break;
                }

                received = subscription.recv() => {
                    match received {
                        Some((_, RelayMessage::Status(event))) => {
                            if let Some(applied) = self.apply(&event).await {
                                if applied.is_terminal() {
                                    info!(
                                        deployment_id = %event.deployment_id,
                                        status = %applied,
                                        "terminal status reached, status consumer stopping"
                                    );
                                    break;
                                }
                            }
                        }
                        Some((_, RelayMessage::Log(_))) => {}
                        None => {
                            info!("subscription ended, status consumer stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Apply one status event to the store, retrying transport failures
    /// with bounded exponential backoff.
    ///
    /// Returns the status when it is applied as a forward transition;
    /// unknown, stale, duplicate, and lost events yield `None`.
    pub async fn apply(&self, event: &StatusEvent) -> Option<DeploymentStatus> {
        let status = match DeploymentStatus::from_str(&event.status) {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    deployment_id = %event.deployment_id,
                    raw = %event.status,
                    error = %e,
                    "ignoring status event with unknown status"
                );
                return None;
            }
        };

        // The payload's deployment id is authoritative over the channel key.
        let id = DeploymentId::new(event.deployment_id.clone());
        let mut backoff = Duration::from_millis(self.config.backoff_base_ms);

        // A zero budget would drop the event without a trace; every event
        // gets at least one attempt.
        let budget = self.config.retry_budget.max(1);

        for attempt in 1..=budget {
            match self.store.advance_status(&id, status).await {
                Ok(true) => {
                    info!(deployment_id = %id, status = %status, "deployment status advanced");
                    return Some(status);
                }
                Ok(false) => {
                    // Backward or duplicate-terminal transition: redelivery
                    // being a no-op is the idempotence contract.
                    debug!(
                        deployment_id = %id,
                        status = %status,
                        "transition not applied (stale or duplicate event)"
                    );
                    return None;
                }
                Err(e) if e.is_retryable() && attempt < budget => {
                    warn!(
                        deployment_id = %id,
                        status = %status,
                        attempt,
                        error = %e,
                        "store write failed, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    // Documented gap: the transition is lost, not silently
                    // ignored and not a crash.
                    error!(
                        deployment_id = %id,
                        status = %status,
                        error = %e,
                        "retry budget exhausted, transition lost"
                    );
                    return None;
                }
            }
        }

        None
    }
}

impl std::fmt::Debug for StatusConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusConsumer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
