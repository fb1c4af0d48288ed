//! Canopy build worker binary.
//!
//! Reads its contract from the environment, runs one build, and exits
//! nonzero when the deployment ends `FAILED`.

use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::ObjectStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use canopy_builder::{ArtifactUploader, BuildError, ProcessRunner, Worker, WorkerEnv};
use canopy_control::DeploymentStatus;
use canopy_relay::ValkeyRelay;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("canopy_builder=info".parse()?),
        )
        .init();

    let env = WorkerEnv::from_env()?;
    info!(
        deployment_id = %env.deployment_id,
        project_id = %env.project_id,
        repo_url = %env.repo_url,
        "build worker starting"
    );

    let relay = Arc::new(ValkeyRelay::new(&env.relay_url, 2).await?);
    let store = create_object_store(&env)?;
    let uploader = ArtifactUploader::new(store);
    let workspace = std::env::temp_dir().join("canopy-build");

    let worker = Worker::new(
        env,
        relay,
        Arc::new(ProcessRunner),
        uploader,
        workspace,
    );

    match worker.run().await {
        DeploymentStatus::Failed => {
            error!("build worker finished with FAILED");
            std::process::exit(1);
        }
        terminal => {
            info!(status = %terminal, "build worker finished");
            Ok(())
        }
    }
}

/// Artifact store backend from the worker environment.
fn create_object_store(env: &WorkerEnv) -> Result<Arc<dyn ObjectStore>, BuildError> {
    match env.artifact_store.as_str() {
        "local" => {
            std::fs::create_dir_all(&env.artifact_path)?;
            let store = LocalFileSystem::new_with_prefix(&env.artifact_path)
                .map_err(|e| BuildError::Upload(format!("local store: {e}")))?;
            Ok(Arc::new(store))
        }
        "s3" => {
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(&env.artifact_path);
            if let Some(endpoint) = &env.artifact_endpoint {
                builder = builder.with_endpoint(endpoint).with_allow_http(true);
            }
            if let Some(region) = &env.artifact_region {
                builder = builder.with_region(region);
            }
            let store = builder
                .build()
                .map_err(|e| BuildError::Upload(format!("s3 store: {e}")))?;
            Ok(Arc::new(store))
        }
        other => Err(BuildError::Upload(format!(
            "unsupported artifact store kind: {other}"
        ))),
    }
}
