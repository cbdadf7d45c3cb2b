//! Application-level error type returned by handlers.
//!
//! All variants serialise to the [`ErrorResponse`] JSON format and map to the
//! appropriate HTTP status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hgroups::EngineError;
use hgroups_node_api::{error::codes, ErrorResponse};

use crate::storage::StorageError;

/// An error that a handler can return; converts directly to an HTTP response.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    InvalidSetting(String),
    Conflict(String),
    UnprocessableEntity(String),
    Internal(String),
    Forbidden(String),
    Unauthorized(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, codes::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, codes::INVALID_PARAMETER, msg),
            AppError::InvalidSetting(msg) => (StatusCode::BAD_REQUEST, codes::INVALID_SETTING, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, codes::CONFLICT, msg),
            AppError::UnprocessableEntity(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, codes::VALIDATION_FAILED, msg)
            }
            AppError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, codes::INTERNAL_ERROR, msg)
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, codes::FORBIDDEN, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, codes::UNAUTHENTICATED, msg),
        };
        let body = ErrorResponse::new(code, message);
        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => AppError::NotFound("not found".into()),
            StorageError::Conflict(msg) => AppError::Conflict(msg),
            StorageError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Store(inner) => inner.into(),
            EngineError::GroupNotFound(id) => AppError::NotFound(format!("group {id} not found")),
            e @ EngineError::InvalidSetting { .. } => AppError::InvalidSetting(e.to_string()),
            EngineError::Forbidden(msg) => AppError::Forbidden(msg),
        }
    }
}
