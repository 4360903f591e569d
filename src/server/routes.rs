//! Axum HTTP routes for the admin API.

use crate::cache::LiveQueueCache;
use crate::db::SqliteQueueStore;
use crate::error::{AdminError, ApiError, ApiResult, StoreError};
use crate::model::Class;
use crate::resolve::{Resolution, ResolveCoordinator, ResumeFrom};
use crate::server::extract::{AdminUser, JsonBody};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared application state
pub struct AppState {
    pub coordinator: ResolveCoordinator,
    /// Same store the coordinator resolves against, for class and queue reads
    pub store: SqliteQueueStore,
    pub cache: Arc<dyn LiveQueueCache>,
}

// ─── Route builder ───────────────────────────────────────────────

pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/class", get(list_classes).post(create_class))
        .route("/class/:class_number", patch(update_class))
        .route("/queue", get(active_queue))
        .route("/queue/:student_id", delete(resolve_question))
        .route("/queue/:student_id/resume", post(resume_resolution))
        .route("/snapshot", get(live_snapshot));

    Router::new()
        .route("/health", get(health))
        .nest("/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Handlers ────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "tutorq-admin",
    }))
}

async fn list_classes(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let classes = state.store.list_classes().await?;
    Ok(Json(classes))
}

/// Request body for creating a class
#[derive(Deserialize)]
struct NewClassRequest {
    #[serde(default)]
    class_number: String,
    topics: Option<Vec<String>>,
}

async fn create_class(
    State(state): State<Arc<AppState>>,
    AdminUser(user): AdminUser,
    JsonBody(body): JsonBody<NewClassRequest>,
) -> ApiResult<impl IntoResponse> {
    let class_number = body.class_number.trim();
    if class_number.is_empty() {
        return Err(ApiError::InvalidRequest("Class number is required".into()));
    }
    let topics = required_topics(body.topics)?;

    let class = Class {
        class_number: class_number.to_string(),
        topics,
    };
    let created = state.store.insert_class(class).await.map_err(|e| match e {
        StoreError::Duplicate { id, .. } => ApiError::ClassExists(id),
        other => ApiError::Store(other),
    })?;

    info!(user = %user, class_number = %created.class_number, "class created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// Request body for replacing a class's topics
#[derive(Deserialize)]
struct UpdateClassRequest {
    topics: Option<Vec<String>>,
}

async fn update_class(
    State(state): State<Arc<AppState>>,
    Path(class_number): Path<String>,
    AdminUser(user): AdminUser,
    JsonBody(body): JsonBody<UpdateClassRequest>,
) -> ApiResult<impl IntoResponse> {
    let topics = required_topics(body.topics)?;

    let updated = state
        .store
        .update_class_topics(&class_number, topics)
        .await?
        .ok_or_else(|| ApiError::ClassNotFound(class_number.clone()))?;

    info!(user = %user, class_number = %updated.class_number, "class topics replaced");
    Ok(Json(updated))
}

/// Topics must be present as a list; an empty list is allowed
fn required_topics(topics: Option<Vec<String>>) -> ApiResult<Vec<String>> {
    topics.ok_or_else(|| ApiError::InvalidRequest("Class topics are required".into()))
}

async fn active_queue(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let entries = state.store.active_entries().await?;
    Ok(Json(serde_json::json!({
        "queue": entries,
        "count": entries.len(),
    })))
}

async fn live_snapshot(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let snapshot = state.cache.snapshot().await.map_err(|e| {
        error!(error = %e, "failed to read live queue");
        ApiError::Cache(e)
    })?;
    Ok(Json(snapshot))
}

async fn resolve_question(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let resolution = state.coordinator.resolve(&student_id).await?;
    Ok(resolved_body(resolution))
}

/// Request body for a targeted retry
#[derive(Deserialize)]
struct ResumeRequest {
    from: ResumeFrom,
}

async fn resume_resolution(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<String>,
    AdminUser(user): AdminUser,
    JsonBody(body): JsonBody<ResumeRequest>,
) -> ApiResult<impl IntoResponse> {
    info!(user = %user, student_id = %student_id, from = %body.from, "resume requested");
    let resolution = state.coordinator.resume(&student_id, body.from).await?;
    Ok(resolved_body(resolution))
}

fn resolved_body(resolution: Resolution) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "resolved",
        "student_id": resolution.student_id,
        "resolved_at": resolution.resolved_at,
        "already_resolved": resolution.already_resolved,
        "cache_removed": resolution.cache_removed,
    }))
}

// ─── Server startup ──────────────────────────────────────────────

/// Serve the admin API until Ctrl-C
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> Result<(), AdminError> {
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "admin API listening");
    info!("  GET    /health");
    info!("  GET    /v1/class");
    info!("  POST   /v1/class");
    info!("  PATCH  /v1/class/:class_number");
    info!("  GET    /v1/queue");
    info!("  DELETE /v1/queue/:student_id");
    info!("  POST   /v1/queue/:student_id/resume");
    info!("  GET    /v1/snapshot");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AdminError::Io)?;

    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down gracefully"),
        Err(e) => {
            // Without a handler the server runs until killed
            error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    }
}
