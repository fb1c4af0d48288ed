use async_trait::async_trait;

use crate::error::RelayError;
use crate::types::{ChannelKey, StatusEvent, Subscription};

/// Pub/sub transport carrying per-deployment log and status messages.
///
/// Publishing is fire-and-forget: `Ok` means the transport accepted the
/// message, not that anyone received it. Subscriptions only see messages
/// published after they were established, so callers that must not miss a
/// worker's first messages have to subscribe before launching it.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Publish one raw log line on `logs:<deployment-id>`.
    async fn publish_log(&self, deployment_id: &str, line: &str) -> Result<(), RelayError>;

    /// Publish a lifecycle transition on `status:<deployment-id>`.
    async fn publish_status(&self, event: &StatusEvent) -> Result<(), RelayError>;

    /// Subscribe to the given channels.
    ///
    /// Within one channel, delivery order matches publish order from a
    /// single publisher. No cross-channel ordering is guaranteed.
    async fn subscribe(&self, channels: &[ChannelKey]) -> Result<Subscription, RelayError>;
}
