//! Canopy gateway binary.
//!
//! Runs the wildcard subdomain router.

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use canopy_control::{DeploymentStore, MemoryStore, PostgresStore};
use canopy_gateway::proxy::ArtifactProxy;
use canopy_gateway::server::{self, GatewayState};
use canopy_gateway::GatewayConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("canopy_gateway=info".parse()?),
        )
        .init();

    info!("Canopy gateway starting");

    let config = GatewayConfig::load().unwrap_or_else(|e| {
        info!(error = %e, "failed to load config, using defaults");
        GatewayConfig::default()
    });

    info!(
        listen_addr = %config.server.listen_addr,
        database = config.database.url.as_deref().unwrap_or("(memory)"),
        origin = %config.origin.url,
        "configuration loaded"
    );

    let store: Arc<dyn DeploymentStore> = match &config.database.url {
        Some(url) => Arc::new(PostgresStore::new(url, config.database.max_connections).await?),
        None => Arc::new(MemoryStore::new()),
    };

    let proxy = ArtifactProxy::new(&config.origin.url, config.origin.request_timeout())?;

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, initiating graceful shutdown");
        cancel_on_signal.cancel();
    });

    let state = Arc::new(GatewayState::new(store, proxy));

    if let Err(e) = server::run(state, config.server.listen_addr, cancel).await {
        error!(error = %e, "gateway error");
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
