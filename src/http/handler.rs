use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::dev_server::{DevServerState, DevServerSupervisor};
use crate::error::AppError;
use crate::http::schemas::{HealthResult, StatusQuery, StopResult};
use crate::projects::{resolve_launch, ProjectRepository};

/// Shared by every request handler.
pub struct AppState {
    pub supervisor: Arc<DevServerSupervisor>,
    pub projects: Arc<dyn ProjectRepository>,
}

impl AppState {
    pub fn new(supervisor: Arc<DevServerSupervisor>, projects: Arc<dyn ProjectRepository>) -> Self {
        Self {
            supervisor,
            projects,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/dev-servers", get(list_dev_servers))
        .route("/projects/:project_id/dev-server", get(dev_server_status))
        .route("/projects/:project_id/dev-server/start", post(start_dev_server))
        .route("/projects/:project_id/dev-server/stop", post(stop_dev_server))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<HealthResult> {
    Json(HealthResult {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[instrument(skip(state))]
async fn start_dev_server(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Result<Json<DevServerState>, AppError> {
    info!("Handling start request");
    let target = resolve_launch(state.projects.as_ref(), &project_id).await?;
    let dev_server = state
        .supervisor
        .start(&project_id, &target.repo_path, target.package_manager)
        .await?;
    Ok(Json(dev_server))
}

#[instrument(skip(state))]
async fn dev_server_status(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<DevServerState>, AppError> {
    let dev_server = match query.since {
        Some(cursor) => state.supervisor.status_since(&project_id, cursor).await?,
        None => state.supervisor.status(&project_id).await?,
    };
    Ok(Json(dev_server))
}

#[instrument(skip(state))]
async fn stop_dev_server(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Result<Json<StopResult>, AppError> {
    info!("Handling stop request");
    let stopped = state.supervisor.stop(&project_id).await?;
    Ok(Json(StopResult { stopped }))
}

async fn list_dev_servers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DevServerState>>, AppError> {
    Ok(Json(state.supervisor.list().await?))
}
