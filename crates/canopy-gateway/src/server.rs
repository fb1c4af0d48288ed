//! Wildcard request router.
//!
//! Every incoming request is keyed on the Host header's first label. The
//! resolved deployment's status decides the response: live deployments are
//! proxied to the artifact origin, in-flight builds get a progress page,
//! failed builds and unknown subdomains get their respective pages. The
//! gateway holds no routing table of its own; the state store is consulted
//! per request.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use canopy_control::{Deployment, DeploymentId, DeploymentStatus, DeploymentStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::pages;
use crate::proxy::ArtifactProxy;
use crate::resolver::extract_subdomain;

/// Shared router state.
pub struct GatewayState {
    store: Arc<dyn DeploymentStore>,
    proxy: ArtifactProxy,
}

impl GatewayState {
    /// Assemble the router state.
    pub fn new(store: Arc<dyn DeploymentStore>, proxy: ArtifactProxy) -> Self {
        Self { store, proxy }
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState").finish_non_exhaustive()
    }
}

/// How a resolved deployment should be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// No deployment owns the subdomain.
    NotFound,
    /// Build has not finished; serve the progress page.
    InProgress,
    /// Build failed terminally; serve the failure page.
    Failed,
    /// Deployment is live; proxy to its artifacts.
    Proxy(DeploymentId),
}

/// Map a store lookup result onto a routing decision.
///
/// Only `Live` routes to artifacts. `Failed` never falls through to the
/// origin even if stale artifacts exist from an earlier deployment.
pub fn route_decision(deployment: Option<&Deployment>) -> RouteDecision {
    match deployment {
        None => RouteDecision::NotFound,
        Some(d) => match d.status {
            DeploymentStatus::NotStarted
            | DeploymentStatus::Queued
            | DeploymentStatus::Building => RouteDecision::InProgress,
            DeploymentStatus::Failed => RouteDecision::Failed,
            DeploymentStatus::Live => RouteDecision::Proxy(d.id.clone()),
        },
    }
}

/// Build the router. All paths except `/healthz` are routed by Host header.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .fallback(handle_request)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn handle_request(
    State(state): State<Arc<GatewayState>>,
    request: Request,
) -> Result<Response, GatewayError> {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .ok_or(GatewayError::MissingHost)?;

    let subdomain = extract_subdomain(host)?.to_owned();
    let deployment = state.store.get_by_subdomain(&subdomain).await?;

    match route_decision(deployment.as_ref()) {
        RouteDecision::NotFound => {
            debug!(%subdomain, "no deployment for subdomain");
            Ok(pages::not_found())
        }
        RouteDecision::InProgress => Ok(pages::queued()),
        RouteDecision::Failed => Ok(pages::failed()),
        RouteDecision::Proxy(deployment_id) => {
            debug!(%subdomain, %deployment_id, path = %request.uri().path(), "proxying");
            state.proxy.forward(&deployment_id, request).await
        }
    }
}

/// Run the router until the token is cancelled.
pub async fn run(
    state: Arc<GatewayState>,
    listen_addr: std::net::SocketAddr,
    cancel: CancellationToken,
) -> Result<(), GatewayError> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|e| GatewayError::Config(format!("failed to bind {listen_addr}: {e}")))?;

    info!(address = %listen_addr, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| {
            warn!(error = %e, "gateway server error");
            GatewayError::Io(e)
        })?;

    info!("gateway shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use canopy_control::{Deployment, MemoryStore, Project};
    use tower::ServiceExt;

    use super::*;

    fn make_deployment(subdomain: &str, status: DeploymentStatus) -> Deployment {
        let project = Project::new("demo", "https://example.com/demo.git");
        let mut deployment = Deployment::new(project.id, subdomain);
        deployment.status = status;
        deployment
    }

    async fn app_with(deployments: Vec<Deployment>) -> Router {
        let store = MemoryStore::new();
        for deployment in &deployments {
            store.insert(deployment).await.unwrap();
        }
        let proxy =
            ArtifactProxy::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        router(Arc::new(GatewayState::new(Arc::new(store), proxy)))
    }

    fn get_with_host(host: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .uri("/")
            .header(header::HOST, host)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn decision_follows_status() {
        let live = make_deployment("a", DeploymentStatus::Live);
        assert_eq!(
            route_decision(Some(&live)),
            RouteDecision::Proxy(live.id.clone())
        );

        for status in [
            DeploymentStatus::NotStarted,
            DeploymentStatus::Queued,
            DeploymentStatus::Building,
        ] {
            let d = make_deployment("b", status);
            assert_eq!(route_decision(Some(&d)), RouteDecision::InProgress);
        }

        let failed = make_deployment("c", DeploymentStatus::Failed);
        assert_eq!(route_decision(Some(&failed)), RouteDecision::Failed);

        assert_eq!(route_decision(None), RouteDecision::NotFound);
    }

    #[tokio::test]
    async fn unknown_subdomain_is_404() {
        let app = app_with(vec![]).await;
        let response = app
            .oneshot(get_with_host("ghost.canopy.localhost:8000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn building_deployment_serves_progress_page() {
        let app =
            app_with(vec![make_deployment("wip", DeploymentStatus::Building)]).await;
        let response = app
            .oneshot(get_with_host("wip.canopy.localhost:8000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).contains("queued or in progress"));
    }

    #[tokio::test]
    async fn failed_deployment_serves_failure_page_not_artifacts() {
        let app =
            app_with(vec![make_deployment("broken", DeploymentStatus::Failed)]).await;
        let response = app
            .oneshot(get_with_host("broken.canopy.localhost:8000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).contains("failed to build"));
    }

    #[tokio::test]
    async fn live_deployment_is_proxied_to_origin() {
        // The origin is unreachable, so a live deployment surfaces as a
        // gateway error rather than a status page.
        let app = app_with(vec![make_deployment("up", DeploymentStatus::Live)]).await;
        let response = app
            .oneshot(get_with_host("up.canopy.localhost:8000"))
            .await
            .unwrap();
        assert!(
            response.status() == StatusCode::BAD_GATEWAY
                || response.status() == StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[tokio::test]
    async fn missing_host_is_404() {
        let app = app_with(vec![]).await;
        let request = HttpRequest::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn healthz_ignores_host() {
        let app = app_with(vec![]).await;
        let request = HttpRequest::builder()
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
