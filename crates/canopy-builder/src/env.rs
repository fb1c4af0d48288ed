//! Worker environment contract.
//!
//! The launcher binds everything a worker needs into its process
//! environment; there is no config file inside the build container.

use std::collections::HashMap;

use canopy_control::launch::{ENV_DEPLOYMENT_ID, ENV_PROJECT_ID, ENV_REPO_URL};

use crate::error::{BuildError, BuildResult};

/// Relay endpoint the worker publishes logs and status to.
pub const ENV_RELAY_URL: &str = "CANOPY_RELAY_URL";
/// Artifact store kind, `local` or `s3`.
pub const ENV_ARTIFACT_STORE: &str = "CANOPY_ARTIFACT_STORE";
/// Artifact store location: a directory for `local`, a bucket for `s3`.
pub const ENV_ARTIFACT_PATH: &str = "CANOPY_ARTIFACT_PATH";
/// Optional S3-compatible endpoint override.
pub const ENV_ARTIFACT_ENDPOINT: &str = "CANOPY_ARTIFACT_ENDPOINT";
/// Optional S3 region.
pub const ENV_ARTIFACT_REGION: &str = "CANOPY_ARTIFACT_REGION";
/// Optional build command override.
pub const ENV_BUILD_COMMAND: &str = "CANOPY_BUILD_COMMAND";
/// Optional build output directory override, relative to the checkout.
pub const ENV_OUTPUT_DIR: &str = "CANOPY_OUTPUT_DIR";

fn default_build_command() -> String {
    "npm install && npm run build".to_owned()
}

fn default_output_dir() -> String {
    "dist".to_owned()
}

/// Validated worker environment.
#[derive(Debug, Clone)]
pub struct WorkerEnv {
    /// Deployment this worker builds. Scopes the relay channels and the
    /// artifact upload prefix.
    pub deployment_id: String,
    /// Owning project, for log context only.
    pub project_id: String,
    /// Source repository to clone.
    pub repo_url: String,
    /// Relay endpoint URL.
    pub relay_url: String,
    /// Artifact store kind, `local` or `s3`.
    pub artifact_store: String,
    /// Artifact store directory or bucket.
    pub artifact_path: String,
    /// Optional S3-compatible endpoint.
    pub artifact_endpoint: Option<String>,
    /// Optional S3 region.
    pub artifact_region: Option<String>,
    /// Shell command that produces the output directory.
    pub build_command: String,
    /// Output directory relative to the checkout root.
    pub output_dir: String,
}

impl WorkerEnv {
    /// Read and validate the process environment.
    pub fn from_env() -> BuildResult<Self> {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Build from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> BuildResult<Self> {
        let required = |key: &str| -> BuildResult<String> {
            match vars.get(key) {
                Some(value) if !value.trim().is_empty() => Ok(value.clone()),
                _ => Err(BuildError::Env(key.to_owned())),
            }
        };
        let optional = |key: &str| vars.get(key).filter(|v| !v.trim().is_empty()).cloned();

        Ok(Self {
            deployment_id: required(ENV_DEPLOYMENT_ID)?,
            project_id: required(ENV_PROJECT_ID)?,
            repo_url: required(ENV_REPO_URL)?,
            relay_url: required(ENV_RELAY_URL)?,
            artifact_store: optional(ENV_ARTIFACT_STORE).unwrap_or_else(|| "local".to_owned()),
            artifact_path: required(ENV_ARTIFACT_PATH)?,
            artifact_endpoint: optional(ENV_ARTIFACT_ENDPOINT),
            artifact_region: optional(ENV_ARTIFACT_REGION),
            build_command: optional(ENV_BUILD_COMMAND).unwrap_or_else(default_build_command),
            output_dir: optional(ENV_OUTPUT_DIR).unwrap_or_else(default_output_dir),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_vars() -> HashMap<String, String> {
        HashMap::from(
            [
                (ENV_DEPLOYMENT_ID, "d1"),
                (ENV_PROJECT_ID, "p1"),
                (ENV_REPO_URL, "https://example.com/site.git"),
                (ENV_RELAY_URL, "redis://127.0.0.1:6379"),
                (ENV_ARTIFACT_PATH, "/var/lib/canopy/artifacts"),
            ]
            .map(|(k, v)| (k.to_owned(), v.to_owned())),
        )
    }

    #[test]
    fn defaults_fill_the_optional_vars() {
        let env = WorkerEnv::from_vars(&full_vars()).unwrap();
        assert_eq!(env.deployment_id, "d1");
        assert_eq!(env.artifact_store, "local");
        assert_eq!(env.build_command, "npm install && npm run build");
        assert_eq!(env.output_dir, "dist");
    }

    #[test]
    fn missing_required_var_is_an_error() {
        let mut vars = full_vars();
        vars.remove(ENV_DEPLOYMENT_ID);
        match WorkerEnv::from_vars(&vars) {
            Err(BuildError::Env(key)) => assert_eq!(key, ENV_DEPLOYMENT_ID),
            other => panic!("expected Env error, got {other:?}"),
        }
    }

    #[test]
    fn blank_var_counts_as_missing() {
        let mut vars = full_vars();
        vars.insert(ENV_REPO_URL.to_owned(), "  ".to_owned());
        assert!(matches!(
            WorkerEnv::from_vars(&vars),
            Err(BuildError::Env(_))
        ));
    }

    #[test]
    fn overrides_are_honoured() {
        let mut vars = full_vars();
        vars.insert(ENV_BUILD_COMMAND.to_owned(), "make site".to_owned());
        vars.insert(ENV_OUTPUT_DIR.to_owned(), "public".to_owned());
        vars.insert(ENV_ARTIFACT_STORE.to_owned(), "s3".to_owned());

        let env = WorkerEnv::from_vars(&vars).unwrap();
        assert_eq!(env.build_command, "make site");
        assert_eq!(env.output_dir, "public");
        assert_eq!(env.artifact_store, "s3");
    }
}
