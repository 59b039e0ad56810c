use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};
use uuid::Uuid;

use crate::{
    history::HistoryStore, orchestrator::Orchestrator, tasks::TaskStore, types::ScanRequest,
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub tasks: TaskStore,
    pub history: Arc<HistoryStore>,
}

/// Serve the audit API under `/api` and the static frontend as the fallback.
pub async fn spawn_server(bind: &str, state: AppState, ui_dir: &str) -> Result<()> {
    let api = Router::new()
        .route("/scan", post(start_scan))
        .route("/scan/status/{task_id}", get(scan_status))
        .route("/history", get(list_history))
        .route("/history/purge", delete(purge_history))
        .route("/history/{scan_id}", delete(delete_history))
        .with_state(state);

    let static_svc = ServeDir::new(ui_dir).append_index_html_on_directories(true);

    let app = Router::new()
        .nest("/api", api)
        .fallback_service(static_svc)
        .layer(TraceLayer::new_for_http());

    tracing::info!(bind, "audit engine listening");
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

/// Accept a scan request and detach the worker; the caller polls the task id.
async fn start_scan(
    State(app): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> impl IntoResponse {
    let task_id = Uuid::new_v4().to_string();
    app.tasks.create(&task_id).await;

    let orchestrator = app.orchestrator.clone();
    let worker_id = task_id.clone();
    tokio::spawn(async move {
        orchestrator.run_scan(worker_id, request).await;
    });

    Json(serde_json::json!({ "task_id": task_id, "status": "running" }))
}

async fn scan_status(
    State(app): State<AppState>,
    Path(task_id): Path<String>,
) -> impl IntoResponse {
    match app.tasks.get(&task_id).await {
        Some(task) => (StatusCode::OK, Json(task)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "detail": "Task ID not found" })),
        )
            .into_response(),
    }
}

async fn list_history(State(app): State<AppState>) -> impl IntoResponse {
    let history = app.history.clone();
    match tokio::task::spawn_blocking(move || history.list(50)).await {
        Ok(Ok(reports)) => (StatusCode::OK, Json(reports)).into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "history listing failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "history worker panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn delete_history(
    State(app): State<AppState>,
    Path(scan_id): Path<i64>,
) -> impl IntoResponse {
    let history = app.history.clone();
    match tokio::task::spawn_blocking(move || history.delete(scan_id)).await {
        Ok(Ok(true)) => (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response(),
        Ok(Ok(false)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "detail": "Record not found" })),
        )
            .into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, scan_id, "history delete failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "history worker panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn purge_history(State(app): State<AppState>) -> impl IntoResponse {
    let history = app.history.clone();
    match tokio::task::spawn_blocking(move || history.purge()).await {
        Ok(Ok(())) => (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "history purge failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "history worker panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
