//! Thin HTTP API for project and deployment CRUD.
//!
//! Validation and persistence only; all lifecycle logic lives in the
//! launcher and status consumer. Each launched deployment gets a status
//! consumer task wired to the subscription the launcher established before
//! the worker started.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::consumer::StatusConsumer;
use crate::error::{ControlError, ControlResult};
use crate::launcher::Launcher;
use crate::store::DeploymentStore;
use crate::types::{Deployment, DeploymentId, Project, ProjectId};

/// Shared API state.
pub struct ApiState {
    store: Arc<dyn DeploymentStore>,
    launcher: Launcher,
    consumer: Arc<StatusConsumer>,
    shutdown: CancellationToken,
}

impl ApiState {
    /// Assemble the API state.
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        launcher: Launcher,
        consumer: Arc<StatusConsumer>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            launcher,
            consumer,
            shutdown,
        }
    }
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState").finish_non_exhaustive()
    }
}

/// Build the API router.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/projects", post(create_project))
        .route("/deployments", post(create_deployment))
        .route("/deployments/{id}", get(get_deployment))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

#[derive(Debug, Deserialize)]
struct CreateProjectRequest {
    name: String,
    repo_url: String,
}

async fn create_project(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.name.trim().is_empty() {
        return Err(ControlError::invalid_input("project name cannot be empty").into());
    }

    let project = Project::new(request.name, request.repo_url);
    state.store.insert_project(&project).await?;

    info!(project_id = %project.id, "project registered");
    Ok((StatusCode::CREATED, Json(project)))
}

#[derive(Debug, Deserialize)]
struct CreateDeploymentRequest {
    project_id: ProjectId,
    subdomain: String,
}

#[derive(Debug, Serialize)]
struct CreateDeploymentResponse {
    deployment: Deployment,
    url: String,
}

async fn create_deployment(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CreateDeploymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let launched = state
        .launcher
        .create_and_launch(&request.project_id, &request.subdomain)
        .await?;

    // The subscription predates the worker; hand it to a consumer task so
    // no status event can slip past unobserved.
    let consumer = state.consumer.clone();
    let cancel = state.shutdown.child_token();
    let subscription = launched.subscription;
    tokio::spawn(async move {
        consumer.run(subscription, cancel).await;
    });

    Ok(Json(CreateDeploymentResponse {
        deployment: launched.deployment,
        url: launched.url,
    }))
}

async fn get_deployment(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deployment = state
        .store
        .get(&DeploymentId::new(&id))
        .await?
        .ok_or(ControlError::DeploymentNotFound(id))?;

    Ok(Json(deployment))
}

/// HTTP wrapper for [`ControlError`].
#[derive(Debug)]
pub struct ApiError(ControlError);

impl From<ControlError> for ApiError {
    fn from(error: ControlError) -> Self {
        Self(error)
    }
}

impl ApiError {
    const fn status_code(&self) -> StatusCode {
        match &self.0 {
            ControlError::InvalidInput(_) | ControlError::InvalidSubdomain(_) => {
                StatusCode::BAD_REQUEST
            }
            ControlError::ProjectNotFound(_) | ControlError::DeploymentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ControlError::SubdomainTaken(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay out of responses.
        let message = match &self.0 {
            ControlError::InvalidInput(reason) => format!("invalid input: {reason}"),
            ControlError::InvalidSubdomain(reason) => format!("invalid subdomain: {reason}"),
            ControlError::ProjectNotFound(id) => format!("project not found: {id}"),
            ControlError::DeploymentNotFound(id) => format!("deployment not found: {id}"),
            ControlError::SubdomainTaken(subdomain) => {
                format!("subdomain already taken: {subdomain}")
            }
            _ => "internal server error".to_owned(),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Run the API server until the token is cancelled.
pub async fn serve(
    state: Arc<ApiState>,
    listen_addr: std::net::SocketAddr,
    cancel: CancellationToken,
) -> ControlResult<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|e| ControlError::Config(format!("failed to bind {listen_addr}: {e}")))?;

    info!(address = %listen_addr, "control API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| ControlError::internal(format!("server error: {e}")))?;

    info!("control API shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::config::{ConsumerConfig, LaunchConfig};
    use crate::launch::MockTaskLauncher;
    use crate::store::MemoryStore;
    use canopy_relay::MemoryRelay;

    fn app() -> Router {
        let store = Arc::new(MemoryStore::new());
        let launcher = Launcher::new(
            store.clone(),
            Arc::new(MemoryRelay::new()),
            MockTaskLauncher::new(),
            LaunchConfig::default(),
        );
        let consumer = Arc::new(StatusConsumer::new(store.clone(), ConsumerConfig::default()));
        router(Arc::new(ApiState::new(
            store,
            launcher,
            consumer,
            CancellationToken::new(),
        )))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn blank_project_name_is_a_client_error() {
        let app = app();
        let response = app
            .oneshot(post_json(
                "/projects",
                r#"{"name":"  ","repo_url":"https://example.com/site.git"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).contains("project name cannot be empty"));
    }

    #[tokio::test]
    async fn valid_project_is_created() {
        let app = app();
        let response = app
            .oneshot(post_json(
                "/projects",
                r#"{"name":"site","repo_url":"https://example.com/site.git"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ApiError(ControlError::invalid_input("x")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(ControlError::InvalidSubdomain("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(ControlError::ProjectNotFound("x".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(ControlError::SubdomainTaken("x".into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError(ControlError::internal("x")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
