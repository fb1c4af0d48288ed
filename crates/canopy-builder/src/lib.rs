//! Canopy build worker.
//!
//! A one-shot process started by the control plane with the deployment's
//! identity bound into its environment. It clones the project repository,
//! runs the build command (after screening it for destructive patterns),
//! streams build output over the relay's log channel, uploads the output
//! directory to the artifact store, and publishes the terminal lifecycle
//! status. The worker itself holds no state; everything it knows arrives
//! through the environment, and everything it produces leaves through the
//! relay and the artifact store.

#![forbid(unsafe_code)]

pub mod env;
pub mod error;
pub mod runner;
pub mod screen;
pub mod upload;
pub mod worker;

pub use env::WorkerEnv;
pub use error::{BuildError, BuildResult};
pub use runner::{CommandRunner, MockRunner, ProcessRunner};
pub use screen::screen_command;
pub use upload::ArtifactUploader;
pub use worker::Worker;
