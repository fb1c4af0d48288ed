use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid channel key: {0}")]
    InvalidChannel(String),

    #[error("Payload decode error on {channel}: {reason}")]
    Decode {
        channel: String,
        reason: String,
    },

    #[error("Subscription closed")]
    SubscriptionClosed,

    #[error("Backend error: {0}")]
    Backend(String),
}

impl RelayError {
    /// Whether the caller may retry the operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Backend(_))
    }
}
