//! Error types for canopy-control.

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur in the control plane.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Request body failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Subdomain is syntactically invalid.
    #[error("invalid subdomain: {0}")]
    InvalidSubdomain(String),

    /// Referenced project does not exist.
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    /// Referenced deployment does not exist.
    #[error("deployment not found: {0}")]
    DeploymentNotFound(String),

    /// Another deployment already owns this subdomain.
    #[error("subdomain already taken: {0}")]
    SubdomainTaken(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Relay transport error.
    #[error("relay error: {0}")]
    Relay(#[from] canopy_relay::RelayError),

    /// Task-launch service error.
    #[error("launch error: {0}")]
    Launch(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Create a validation error.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a launch error.
    #[must_use]
    pub fn launch(msg: impl Into<String>) -> Self {
        Self::Launch(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the operation may be retried against the same inputs.
    ///
    /// Validation and uniqueness failures are terminal for the request;
    /// transport failures are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Relay(_) | Self::Http(_))
    }
}
