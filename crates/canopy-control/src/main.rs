//! Canopy control service binary.
//!
//! Runs the launcher API and status consumer.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use canopy_control::api::{self, ApiState};
use canopy_control::launch::HttpTaskLauncher;
use canopy_control::{
    ControlConfig, ControlError, DeploymentStore, Launcher, MemoryStore, PostgresStore,
    StatusConsumer, TaskLauncher,
};
use canopy_relay::{MemoryRelay, Relay, ValkeyRelay};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("canopy_control=info".parse()?),
        )
        .init();

    info!("Canopy control service starting");

    let config = ControlConfig::load().unwrap_or_else(|e| {
        info!(error = %e, "failed to load config, using defaults");
        ControlConfig::default()
    });

    info!(
        listen_addr = %config.server.listen_addr,
        database = config.database.url.as_deref().unwrap_or("(memory)"),
        relay = config.relay.url.as_deref().unwrap_or("(memory)"),
        "configuration loaded"
    );

    let store: Arc<dyn DeploymentStore> = match &config.database.url {
        Some(url) => Arc::new(PostgresStore::new(url, config.database.max_connections).await?),
        None => Arc::new(MemoryStore::new()),
    };

    let relay: Arc<dyn Relay> = match &config.relay.url {
        Some(url) => Arc::new(ValkeyRelay::new(url, config.relay.pool_size).await?),
        None => Arc::new(MemoryRelay::new()),
    };

    let tasks: Arc<dyn TaskLauncher> = match &config.launch.task_endpoint {
        Some(endpoint) => Arc::new(HttpTaskLauncher::new(
            endpoint,
            Duration::from_secs(config.launch.task_timeout_secs),
        )?),
        None => {
            return Err(ControlError::Config(
                "launch.task_endpoint is required outside of tests".into(),
            )
            .into());
        }
    };

    let launcher = Launcher::new(
        store.clone(),
        relay,
        tasks,
        config.launch.clone(),
    );
    let consumer = Arc::new(StatusConsumer::new(store.clone(), config.consumer.clone()));

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, initiating graceful shutdown");
        cancel_on_signal.cancel();
    });

    let state = Arc::new(ApiState::new(store, launcher, consumer, cancel.clone()));

    if let Err(e) = api::serve(state, config.server.listen_addr, cancel).await {
        error!(error = %e, "control service error");
        return Err(e.into());
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C");
        }
        () = terminate => {
            info!("received SIGTERM");
        }
    }
}
