use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::{dao::storage::StorageError, state::battle::InvalidTransition};

/// Domain errors produced by the formation engine.
///
/// Every variant is recoverable and carries an actionable reason: races are
/// expected and frequent in a multi-captain formation flow, so callers get a
/// precise retry-or-not message instead of an opaque failure.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The team, invitation, or request no longer exists.
    #[error("not found: {0}")]
    NotFound(String),
    /// The actor lacks the required role (not captain, not invitee, ...).
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// The target team is already at capacity.
    #[error("team is full: {0}")]
    CapacityExceeded(String),
    /// The opponent side was raced shut before this acceptance.
    #[error("opponent slot already filled: {0}")]
    SlotAlreadyFilled(String),
    /// The user already has an active join request somewhere.
    #[error("already pending: {0}")]
    AlreadyPending(String),
    /// The command targets an entity that is already terminal.
    #[error("expired: {0}")]
    Expired(String),
    /// Generic race loser or state mismatch.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Roster storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::Conflict(err.to_string())
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Identity headers missing or malformed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Actor lacks the required role.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Command targeted an entity that is already terminal.
    #[error("gone: {0}")]
    Gone(String),
    /// Service unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Forbidden(message) => AppError::Forbidden(message),
            ServiceError::CapacityExceeded(message) => AppError::Conflict(message),
            ServiceError::SlotAlreadyFilled(message) => AppError::Conflict(message),
            ServiceError::AlreadyPending(message) => AppError::Conflict(message),
            ServiceError::Expired(message) => AppError::Gone(message),
            ServiceError::Conflict(message) => AppError::Conflict(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Gone(_) => StatusCode::GONE,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
