//! Valkey/Redis relay backend.
//!
//! Publishing goes through a pooled connection; each subscription holds a
//! dedicated pubsub connection whose messages are forwarded into the
//! subscription's delivery channel by a background task.

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::traits::Relay;
use crate::types::{ChannelKey, RelayMessage, StatusEvent, Subscription};

const SUBSCRIPTION_BUFFER: usize = 256;

/// Valkey/Redis pub/sub relay.
pub struct ValkeyRelay {
    pool: Pool,
    client: redis::Client,
}

impl ValkeyRelay {
    /// Connect to a Valkey/Redis instance.
    pub async fn new(url: &str, pool_size: usize) -> Result<Self, RelayError> {
        let config = Config::from_url(url);
        let pool = config
            .builder()
            .map_err(|e| RelayError::Connection(e.to_string()))?
            .max_size(pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| RelayError::Connection(e.to_string()))?;

        // Test the connection
        let mut conn = pool
            .get()
            .await
            .map_err(|e| RelayError::Connection(e.to_string()))?;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| RelayError::Connection(e.to_string()))?;

        let client =
            redis::Client::open(url).map_err(|e| RelayError::Connection(e.to_string()))?;

        Ok(Self { pool, client })
    }

    async fn publish_raw(&self, channel: &ChannelKey, payload: &[u8]) -> Result<(), RelayError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RelayError::Connection(e.to_string()))?;

        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel.to_string())
            .arg(payload)
            .query_async(&mut *conn)
            .await
            .map_err(|e| RelayError::Backend(e.to_string()))?;

        debug!(channel = %channel, receivers, "published relay message");
        Ok(())
    }
}

#[async_trait]
impl Relay for ValkeyRelay {
    async fn publish_log(&self, deployment_id: &str, line: &str) -> Result<(), RelayError> {
        self.publish_raw(&ChannelKey::logs(deployment_id), line.as_bytes())
            .await
    }

    async fn publish_status(&self, event: &StatusEvent) -> Result<(), RelayError> {
        let payload = RelayMessage::Status(event.clone()).encode()?;
        self.publish_raw(&ChannelKey::status(&event.deployment_id), &payload)
            .await
    }

    async fn subscribe(&self, channels: &[ChannelKey]) -> Result<Subscription, RelayError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| RelayError::Connection(e.to_string()))?;

        for channel in channels {
            pubsub
                .subscribe(channel.to_string())
                .await
                .map_err(|e| RelayError::Connection(e.to_string()))?;
        }

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let forward_cancel = cancel.clone();

        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            loop {
                tokio::select! {
                    () = forward_cancel.cancelled() => break,
                    message = stream.next() => {
                        let Some(message) = message else { break };
                        let channel = match ChannelKey::parse(message.get_channel_name()) {
                            Ok(channel) => channel,
                            Err(e) => {
                                warn!(error = %e, "ignoring message on unrecognised channel");
                                continue;
                            }
                        };
                        let decoded =
                            match RelayMessage::decode(&channel, message.get_payload_bytes()) {
                                Ok(decoded) => decoded,
                                Err(e) => {
                                    warn!(channel = %channel, error = %e, "undecodable relay payload");
                                    continue;
                                }
                            };
                        if tx.send((channel, decoded)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(rx, cancel))
    }
}

impl std::fmt::Debug for ValkeyRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValkeyRelay").finish_non_exhaustive()
    }
}
