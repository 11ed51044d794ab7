use axum::{
    Json,
    extract::path::ErrorKind,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use parley_db::StoreError;

use crate::bot::BotError;

/// One rejected input field.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Errors surfaced at the HTTP boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidOperation(String),

    /// The resource exists but belongs to someone else. Reported as not found.
    #[error("{0}")]
    Unauthorized(String),

    #[error("Username or password is incorrect")]
    BadCredentials,

    #[error("missing or invalid token")]
    Unauthenticated,

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Validation failure with the generic "Invalid data" summary.
    pub fn invalid(errors: Vec<FieldError>) -> Self {
        Self::Validation {
            message: "Invalid data".into(),
            errors,
        }
    }

    /// A required field was absent or blank.
    pub fn missing(field: &'static str) -> Self {
        Self::Validation {
            message: "Missing data".into(),
            errors: vec![FieldError {
                field,
                message: "This field is required".into(),
            }],
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. }
            | Self::Conflict(_)
            | Self::InvalidOperation(_)
            | Self::BadCredentials => StatusCode::BAD_REQUEST,
            Self::NotFound(_) | Self::Unauthorized(_) => StatusCode::NOT_FOUND,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Upstream(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Validation { message, errors } => json!({ "message": message, "errors": errors }),
            Self::BadCredentials => json!({ "message": "Username or password is incorrect" }),
            Self::Unauthenticated => json!({ "message": "Unauthorized" }),
            Self::Upstream(detail) => {
                error!("Upstream failure: {}", detail);
                json!({
                    "message": "Error talking to the bot",
                    "reply": "Error talking to the bot",
                    "error": detail,
                })
            }
            Self::Storage(detail) => {
                error!("Storage failure: {}", detail);
                json!({ "message": "Server error", "error": detail })
            }
            Self::NotFound(message)
            | Self::Conflict(message)
            | Self::InvalidOperation(message)
            | Self::Unauthorized(message) => json!({ "message": message }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation { field, message } => Self::Validation {
                message: message.clone(),
                errors: vec![FieldError { field, message }],
            },
            StoreError::NotFound(what) => Self::NotFound(format!("{} not found", what)),
            StoreError::Conflict(message) => Self::Conflict(message),
            StoreError::InvalidOperation(message) => Self::InvalidOperation(message),
            StoreError::Storage(detail) => Self::Storage(detail),
        }
    }
}

/// A body that does not parse is a validation failure on the body as a whole.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid(vec![FieldError {
            field: "body",
            message: rejection.body_text(),
        }])
    }
}

/// A path segment that is not a valid id names something that cannot
/// exist, so it is reported like a missing record of that kind.
impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        let key = match &rejection {
            PathRejection::FailedToDeserializePathParams(err) => match err.kind() {
                ErrorKind::ParseErrorAtKey { key, .. }
                | ErrorKind::DeserializeError { key, .. }
                | ErrorKind::InvalidUtf8InPathParam { key } => Some(key.as_str()),
                _ => None,
            },
            _ => None,
        };

        match key {
            Some("message_id") => Self::Unauthorized("Message not found or unauthorized".into()),
            _ => Self::NotFound("User not found".into()),
        }
    }
}

impl From<BotError> for ApiError {
    fn from(err: BotError) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Storage(format!("spawn_blocking join error: {}", err))
    }
}
