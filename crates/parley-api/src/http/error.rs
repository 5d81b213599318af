//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use parley_types::error::AgentError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
///
/// Collaborator failures map to 502 -- the upstream agent failed, not this
/// service.
#[derive(Debug)]
pub enum AppError {
    /// Failure surfaced by the agent collaborator.
    Agent(AgentError),
    /// No live session for the given key.
    SessionNotFound(String),
    /// Validation error.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<AgentError> for AppError {
    fn from(e: AgentError) -> Self {
        AppError::Agent(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Agent(AgentError::HandleCreation(msg)) => (
                StatusCode::BAD_GATEWAY,
                "HANDLE_CREATION_FAILED",
                msg.clone(),
            ),
            AppError::Agent(AgentError::Connection(msg)) => {
                (StatusCode::BAD_GATEWAY, "AGENT_CONNECTION_ERROR", msg.clone())
            }
            AppError::Agent(err @ AgentError::Process { .. }) => {
                (StatusCode::BAD_GATEWAY, "AGENT_PROCESS_FAILED", err.to_string())
            }
            AppError::Agent(AgentError::MalformedReply(msg)) => {
                (StatusCode::BAD_GATEWAY, "MALFORMED_AGENT_REPLY", msg.clone())
            }
            AppError::SessionNotFound(key) => (
                StatusCode::NOT_FOUND,
                "SESSION_NOT_FOUND",
                format!("No live session for key '{key}'"),
            ),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        };

        let envelope =
            ApiResponse::<()>::error(code, message, Uuid::now_v7().to_string());
        (status, envelope).into_response()
    }
}
