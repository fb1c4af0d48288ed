//! In-process relay backed by tokio broadcast channels.
//!
//! Used by tests and single-node development. Semantics match the Valkey
//! backend: no persistence, no replay, per-channel FIFO delivery.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::RelayError;
use crate::traits::Relay;
use crate::types::{ChannelKey, RelayMessage, StatusEvent, Subscription};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// In-memory relay.
#[derive(Debug, Clone)]
pub struct MemoryRelay {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<(ChannelKey, RelayMessage)>>>>,
    capacity: usize,
}

impl MemoryRelay {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a relay with a specific per-channel buffer capacity.
    ///
    /// A slow subscriber that falls more than `capacity` messages behind
    /// loses the overwritten messages, matching the no-replay contract.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    async fn sender(&self, key: &ChannelKey) -> broadcast::Sender<(ChannelKey, RelayMessage)> {
        let wire_key = key.to_string();
        {
            let channels = self.channels.read().await;
            if let Some(sender) = channels.get(&wire_key) {
                return sender.clone();
            }
        }
        let mut channels = self.channels.write().await;
        // Creating a channel is the natural moment to shed finished ones,
        // so the map stays bounded by live subscriptions rather than by
        // every deployment the process has ever seen.
        channels.retain(|_, sender| sender.receiver_count() > 0);
        channels
            .entry(wire_key)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Attach a receiver under the map lock so pruning cannot drop a
    /// channel between lookup and subscription.
    async fn attach(&self, key: &ChannelKey) -> broadcast::Receiver<(ChannelKey, RelayMessage)> {
        let mut channels = self.channels.write().await;
        channels
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    async fn send(&self, key: ChannelKey, message: RelayMessage) {
        let sender = self.sender(&key).await;
        let wire_key = key.to_string();
        // An error only means no subscriber is attached, which is the
        // at-most-once-from-the-past policy working as intended; drop the
        // abandoned channel rather than keep it in the map.
        if sender.send((key, message)).is_err() {
            let mut channels = self.channels.write().await;
            if channels
                .get(&wire_key)
                .is_some_and(|s| s.receiver_count() == 0)
            {
                channels.remove(&wire_key);
            }
        }
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn publish_log(&self, deployment_id: &str, line: &str) -> Result<(), RelayError> {
        self.send(
            ChannelKey::logs(deployment_id),
            RelayMessage::Log(line.to_owned()),
        )
        .await;
        Ok(())
    }

    async fn publish_status(&self, event: &StatusEvent) -> Result<(), RelayError> {
        self.send(
            ChannelKey::status(&event.deployment_id),
            RelayMessage::Status(event.clone()),
        )
        .await;
        Ok(())
    }

    async fn subscribe(&self, channels: &[ChannelKey]) -> Result<Subscription, RelayError> {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.capacity);

        for key in channels {
            let mut source = self.attach(key).await;
            let tx = tx.clone();
            let cancel = cancel.clone();
            let wire_key = key.to_string();

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        received = source.recv() => match received {
                            Ok(item) => {
                                if tx.send(item).await.is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(missed)) => {
                                warn!(channel = %wire_key, missed, "subscriber lagged, messages dropped");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        },
                    }
                }
            });
        }

        Ok(Subscription::new(rx, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_lines_arrive_in_publish_order() {
        let relay = MemoryRelay::new();
        let mut sub = relay
            .subscribe(&[ChannelKey::logs("d1")])
            .await
            .unwrap();

        relay.publish_log("d1", "L1").await.unwrap();
        relay.publish_log("d1", "L2").await.unwrap();
        relay.publish_log("d1", "L3").await.unwrap();

        for expected in ["L1", "L2", "L3"] {
            let (channel, message) = sub.recv().await.unwrap();
            assert_eq!(channel, ChannelKey::logs("d1"));
            assert_eq!(message, RelayMessage::Log(expected.to_owned()));
        }
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_messages() {
        let relay = MemoryRelay::new();

        relay.publish_log("d1", "early").await.unwrap();

        let mut sub = relay
            .subscribe(&[ChannelKey::logs("d1")])
            .await
            .unwrap();
        relay.publish_log("d1", "late").await.unwrap();

        let (_, message) = sub.recv().await.unwrap();
        assert_eq!(message, RelayMessage::Log("late".to_owned()));
    }

    #[tokio::test]
    async fn status_and_log_channels_are_independent() {
        let relay = MemoryRelay::new();
        let mut sub = relay
            .subscribe(&[ChannelKey::status("d1")])
            .await
            .unwrap();

        relay.publish_log("d1", "ignored").await.unwrap();
        relay
            .publish_status(&StatusEvent::new("d1", "BUILDING"))
            .await
            .unwrap();

        let (channel, message) = sub.recv().await.unwrap();
        assert_eq!(channel, ChannelKey::status("d1"));
        assert_eq!(
            message,
            RelayMessage::Status(StatusEvent::new("d1", "BUILDING"))
        );
    }

    #[tokio::test]
    async fn channels_are_scoped_by_deployment() {
        let relay = MemoryRelay::new();
        let mut sub = relay
            .subscribe(&[ChannelKey::logs("d1")])
            .await
            .unwrap();

        relay.publish_log("d2", "other deployment").await.unwrap();
        relay.publish_log("d1", "mine").await.unwrap();

        let (_, message) = sub.recv().await.unwrap();
        assert_eq!(message, RelayMessage::Log("mine".to_owned()));
    }

    #[tokio::test]
    async fn abandoned_channels_are_pruned() {
        let relay = MemoryRelay::new();
        let sub = relay
            .subscribe(&[ChannelKey::logs("d1"), ChannelKey::status("d1")])
            .await
            .unwrap();
        assert_eq!(relay.channels.read().await.len(), 2);

        drop(sub);

        // Dropping the subscription cancels the forwarding tasks; once
        // their receivers are gone a publish sheds the dead channels.
        for _ in 0..50 {
            relay.publish_log("d1", "after close").await.unwrap();
            relay.publish_log("d1", "after close").await.unwrap();
            if relay.channels.read().await.is_empty() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("channel map still holds channels with no subscribers");
    }

    #[tokio::test]
    async fn cancelled_subscription_stops_delivering() {
        let relay = MemoryRelay::new();
        let mut sub = relay
            .subscribe(&[ChannelKey::logs("d1")])
            .await
            .unwrap();

        sub.cancel();
        // Give the forwarding task a chance to observe the cancellation.
        tokio::task::yield_now().await;
        relay.publish_log("d1", "after cancel").await.unwrap();

        // The channel drains to None once forwarding stops.
        tokio::time::timeout(std::time::Duration::from_millis(100), async {
            while sub.recv().await.is_some() {}
        })
        .await
        .expect("subscription should close after cancel");
    }
}
