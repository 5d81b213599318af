//! Session inspection and lifecycle HTTP handlers.
//!
//! Endpoints:
//! - GET    /api/v1/sessions                 - List live sessions
//! - GET    /api/v1/sessions/{key}           - Inspect one session
//! - POST   /api/v1/sessions/{key}/interrupt - Interrupt an in-flight reply
//! - DELETE /api/v1/sessions/{key}           - Close a session

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};
use uuid::Uuid;

use parley_types::session::SessionSnapshot;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /api/v1/sessions - List snapshots of all live sessions.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<SessionSnapshot>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let snapshots = state.registry.snapshots();

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(snapshots, request_id, elapsed)))
}

/// GET /api/v1/sessions/{key} - Inspect a single session.
pub async fn get_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<SessionSnapshot>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let snapshot = state
        .registry
        .snapshot(&key)
        .ok_or(AppError::SessionNotFound(key))?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(snapshot, request_id, elapsed)))
}

/// POST /api/v1/sessions/{key}/interrupt - Best-effort interrupt.
///
/// Raises the session's interrupt signal without touching its guard; if no
/// reply is being collected right now, this is a no-op.
pub async fn interrupt_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    if !state.registry.interrupt(&key) {
        return Err(AppError::SessionNotFound(key));
    }

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(
        json!({ "key": key, "interrupted": true }),
        request_id,
        elapsed,
    )))
}

/// DELETE /api/v1/sessions/{key} - Close a session and its agent handle.
///
/// Waits for any in-flight exchange to finish before the handle is closed.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    if !state.registry.close_session(&key).await {
        return Err(AppError::SessionNotFound(key));
    }

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(
        json!({ "key": key, "closed": true }),
        request_id,
        elapsed,
    )))
}
