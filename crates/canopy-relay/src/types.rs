//! Wire types for the relay.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;

/// A relay channel key, scoped to one deployment.
///
/// Two families exist: `logs:<id>` carries raw build output lines and
/// `status:<id>` carries lifecycle transitions. The family determines how a
/// payload is decoded; payload shape is never sniffed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    /// Ordered raw text lines for one deployment.
    Logs(String),
    /// Lifecycle transitions for one deployment.
    Status(String),
}

impl ChannelKey {
    /// Log channel for a deployment.
    #[must_use]
    pub fn logs(deployment_id: impl Into<String>) -> Self {
        Self::Logs(deployment_id.into())
    }

    /// Status channel for a deployment.
    #[must_use]
    pub fn status(deployment_id: impl Into<String>) -> Self {
        Self::Status(deployment_id.into())
    }

    /// The deployment this channel is scoped to.
    #[must_use]
    pub fn deployment_id(&self) -> &str {
        match self {
            Self::Logs(id) | Self::Status(id) => id,
        }
    }

    /// Parse a channel key from its wire form.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        match raw.split_once(':') {
            Some(("logs", id)) if !id.is_empty() => Ok(Self::Logs(id.to_owned())),
            Some(("status", id)) if !id.is_empty() => Ok(Self::Status(id.to_owned())),
            _ => Err(RelayError::InvalidChannel(raw.to_owned())),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logs(id) => write!(f, "logs:{id}"),
            Self::Status(id) => write!(f, "status:{id}"),
        }
    }
}

/// A lifecycle transition as carried on a status channel.
///
/// The deployment id is implicit in the channel key but repeated in the
/// payload; consumers treat the payload value as authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// New lifecycle status, e.g. `BUILDING` or `LIVE`.
    pub status: String,
    /// Deployment the transition applies to.
    pub deployment_id: String,
}

impl StatusEvent {
    #[must_use]
    pub fn new(deployment_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            deployment_id: deployment_id.into(),
        }
    }
}

/// A decoded relay message, tagged by channel family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// A structured lifecycle transition (status family).
    Status(StatusEvent),
    /// An opaque log line (logs family).
    Log(String),
}

impl RelayMessage {
    /// Decode a raw payload according to the channel family it arrived on.
    ///
    /// A status-family payload that is not valid JSON is an error, not a
    /// log line.
    pub fn decode(channel: &ChannelKey, payload: &[u8]) -> Result<Self, RelayError> {
        match channel {
            ChannelKey::Status(_) => {
                let event = serde_json::from_slice(payload).map_err(|e| RelayError::Decode {
                    channel: channel.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Self::Status(event))
            }
            ChannelKey::Logs(_) => Ok(Self::Log(
                String::from_utf8_lossy(payload).into_owned(),
            )),
        }
    }

    /// Encode the message for the wire.
    pub fn encode(&self) -> Result<Vec<u8>, RelayError> {
        match self {
            Self::Status(event) => serde_json::to_vec(event).map_err(|e| RelayError::Decode {
                channel: ChannelKey::status(&event.deployment_id).to_string(),
                reason: e.to_string(),
            }),
            Self::Log(line) => Ok(line.as_bytes().to_vec()),
        }
    }
}

/// An owned, cancelable subscription to one or more relay channels.
///
/// The handle is returned to and owned by the caller, scoped to the
/// deployment's lifetime. Dropping it detaches the subscriber; there is no
/// process-wide listener registry.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<(ChannelKey, RelayMessage)>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Create a subscription from its delivery channel and cancel token.
    ///
    /// Used by relay backends; callers obtain subscriptions from
    /// [`Relay::subscribe`](crate::Relay::subscribe).
    #[must_use]
    pub fn new(
        receiver: mpsc::Receiver<(ChannelKey, RelayMessage)>,
        cancel: CancellationToken,
    ) -> Self {
        Self { receiver, cancel }
    }

    /// Receive the next message, or `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<(ChannelKey, RelayMessage)> {
        self.receiver.recv().await
    }

    /// Cancel the subscription. Messages already delivered remain readable.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token observed by the backend's forwarding task.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_key_roundtrip() {
        let logs = ChannelKey::logs("d1");
        assert_eq!(logs.to_string(), "logs:d1");
        assert_eq!(ChannelKey::parse("logs:d1").unwrap(), logs);

        let status = ChannelKey::status("d1");
        assert_eq!(status.to_string(), "status:d1");
        assert_eq!(ChannelKey::parse("status:d1").unwrap(), status);
    }

    #[test]
    fn channel_key_rejects_unknown_family() {
        assert!(ChannelKey::parse("events:d1").is_err());
        assert!(ChannelKey::parse("logs:").is_err());
        assert!(ChannelKey::parse("nodelimiter").is_err());
    }

    #[test]
    fn status_payload_decodes_by_family() {
        let channel = ChannelKey::status("d1");
        let payload = br#"{"status":"BUILDING","deployment_id":"d1"}"#;

        let message = RelayMessage::decode(&channel, payload).unwrap();
        assert_eq!(
            message,
            RelayMessage::Status(StatusEvent::new("d1", "BUILDING"))
        );
    }

    #[test]
    fn malformed_status_payload_is_an_error_not_a_log() {
        let channel = ChannelKey::status("d1");
        let result = RelayMessage::decode(&channel, b"not json");
        assert!(matches!(result, Err(RelayError::Decode { .. })));
    }

    #[test]
    fn log_payload_is_opaque_text() {
        let channel = ChannelKey::logs("d1");
        let message = RelayMessage::decode(&channel, b"npm install").unwrap();
        assert_eq!(message, RelayMessage::Log("npm install".to_owned()));
    }

    #[test]
    fn status_event_wire_shape() {
        let event = StatusEvent::new("d1", "LIVE");
        let encoded = RelayMessage::Status(event).encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(value["status"], "LIVE");
        assert_eq!(value["deployment_id"], "d1");
    }
}
