//! Message exchange HTTP handler.
//!
//! POST /api/v1/sessions/{key}/messages
//!
//! Runs one full exchange against the session's agent handle: the message is
//! sent under the session guard and the complete reply is collected before
//! the response returns. A concurrent request for the same key waits its
//! turn; requests for other keys are unaffected.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use parley_types::agent::Reply;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body for the message endpoint.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// The message to send into the session's conversational context.
    pub message: String,
}

/// POST /api/v1/sessions/{key}/messages - Send a message, collect the reply.
pub async fn send_message(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<ApiResponse<Reply>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    if body.message.trim().is_empty() {
        return Err(AppError::Validation("message must not be empty".to_string()));
    }

    let reply = state.registry.run_exclusive(&key, &body.message).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(reply, request_id, elapsed)))
}
