use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    services::{
        file_state::FileWaitError, game_mode::ModeError, messaging::SendError, replies::WaitError,
    },
    state::model::UnknownMode,
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The on-disk store failed.
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    /// The requested mode or catalog cannot support the operation.
    #[error("configuration error: {0}")]
    Configuration(#[from] ModeError),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The client could not be reached.
    #[error("delivery failed: {0}")]
    Delivery(#[from] SendError),
    /// The client answered with a negative acknowledgement.
    #[error("client rejected command: {0}")]
    Rejected(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl From<UnknownMode> for ServiceError {
    fn from(err: UnknownMode) -> Self {
        ServiceError::Configuration(ModeError::Unknown(err.0))
    }
}

impl From<WaitError> for ServiceError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Delivery(source) => ServiceError::Delivery(source),
            WaitError::Timeout { .. } => ServiceError::Timeout,
            WaitError::Dropped => ServiceError::Delivery(SendError::Closed),
        }
    }
}

impl From<FileWaitError> for ServiceError {
    fn from(err: FileWaitError) -> Self {
        match err {
            FileWaitError::Timeout { .. } => ServiceError::Timeout,
            FileWaitError::UnknownInstance(id) => {
                ServiceError::NotFound(format!("instance `{id}` not found"))
            }
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or client unreachable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// A wait on a client or a file ran out of time.
    #[error("timed out: {0}")]
    Timeout(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Storage(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Configuration(source) => AppError::BadRequest(source.to_string()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Delivery(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Rejected(reason) => {
                AppError::Conflict(format!("client rejected command: {reason}"))
            }
            ServiceError::Timeout => AppError::Timeout("operation timed out".into()),
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
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
