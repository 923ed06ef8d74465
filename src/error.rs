use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

/// Failures raised by the scheduling core.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// Missing or malformed input, or a slot outside the doctor's hours.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// The requested slot is already held by another appointment.
    #[error("{0}")]
    Conflict(String),

    /// Booked-slot lookup failed; availability cannot be computed.
    #[error("could not resolve booked slots: {0}")]
    Resolution(String),
}

impl ScheduleError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ScheduleError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ScheduleError::NotFound(msg.into())
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::BadRequest("VALIDATION_ERROR", message.into())
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound("NOT_FOUND", format!("{what} not found"))
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::Validation(msg) => ApiError::BadRequest("VALIDATION_ERROR", msg),
            ScheduleError::NotFound(msg) => ApiError::NotFound("NOT_FOUND", msg),
            ScheduleError::Conflict(msg) => ApiError::Conflict("SLOT_TAKEN", msg),
            e @ ScheduleError::Resolution(_) => ApiError::Internal(e.to_string()),
        }
    }
}

/// Maps a write failure, turning constraint violations into client errors.
pub fn db_write_error(e: sqlx::Error) -> ApiError {
    if let sqlx::Error::Database(db) = &e {
        match db.kind() {
            sqlx::error::ErrorKind::UniqueViolation => {
                return ApiError::Conflict("DUPLICATE", db.message().to_string());
            }
            sqlx::error::ErrorKind::ForeignKeyViolation => {
                return ApiError::BadRequest("INVALID_REFERENCE", db.message().to_string());
            }
            sqlx::error::ErrorKind::CheckViolation => {
                return ApiError::BadRequest("VALIDATION_ERROR", db.message().to_string());
            }
            _ => {}
        }
    }
    ApiError::Internal(format!("db error: {e}"))
}

pub fn db_error(e: sqlx::Error) -> ApiError {
    ApiError::Internal(format!("db error: {e}"))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(code, msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::NotFound(code, msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Conflict(code, msg) => {
                (StatusCode::CONFLICT, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::to_error_response("INTERNAL", &msg),
                )
                    .into_response()
            }
        }
    }
}
