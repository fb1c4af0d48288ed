//! Build worker error types.

use thiserror::Error;

/// Result alias for build worker operations.
pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Error, Debug)]
pub enum BuildError {
    /// A required environment variable is missing or empty.
    #[error("Missing environment variable: {0}")]
    Env(String),

    /// The build command matched a destructive or exfiltrating pattern.
    /// Terminal for the deployment; the build is never started.
    #[error("Build command rejected: {0}")]
    SecurityAbort(String),

    /// Cloning the source repository failed.
    #[error("Checkout failed: {0}")]
    Checkout(String),

    /// The build command could not be spawned or supervised.
    #[error("Command error: {0}")]
    Command(String),

    /// The build command ran and exited nonzero.
    #[error("Build failed with exit code {exit_code}")]
    BuildFailed {
        /// Exit code reported by the build command.
        exit_code: i32,
    },

    /// Uploading artifacts to the object store failed.
    #[error("Artifact upload failed: {0}")]
    Upload(String),

    /// Relay publish failure.
    #[error("Relay error: {0}")]
    Relay(#[from] canopy_relay::RelayError),

    /// Local filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
