use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Error body returned by every endpoint on failure.
///
/// `detail` keeps the human-readable message; `code` lets the client
/// rebuild the typed [`EngineError`] on its side of the wire.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub detail: String,
}

/// Failures shared by the server-side engine and the client reconciliation layer.
///
/// The type is `Clone` so that one failed load can be handed to every caller
/// that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid content target: {0}")]
    InvalidTarget(String),
    #[error("comment text is required")]
    EmptyText,
    #[error("invalid parent comment: {0}")]
    InvalidParent(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("invalid moderation transition: {0}")]
    InvalidTransition(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("session expired")]
    SessionExpired,
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("request cancelled")]
    Cancelled,
    #[error("database error: {0}")]
    Database(String),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTarget(_) => "INVALID_TARGET",
            Self::EmptyText => "EMPTY_TEXT",
            Self::InvalidParent(_) => "INVALID_PARENT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Cancelled => "CANCELLED",
            Self::Database(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidTarget(_)
            | Self::EmptyText
            | Self::InvalidParent(_)
            | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) | Self::SessionExpired => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) | Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message carried on the wire; payload variants send their payload only
    /// so that [`EngineError::from_wire`] rebuilds an identical value.
    pub fn detail(&self) -> String {
        match self {
            Self::InvalidTarget(msg)
            | Self::InvalidParent(msg)
            | Self::Validation(msg)
            | Self::NotFound(msg)
            | Self::Forbidden(msg)
            | Self::InvalidTransition(msg)
            | Self::Unauthenticated(msg)
            | Self::Unavailable(msg)
            | Self::Database(msg) => msg.clone(),
            Self::EmptyText | Self::SessionExpired | Self::Cancelled => self.to_string(),
        }
    }

    /// Rebuilds a typed error from a non-success HTTP response.
    pub fn from_wire(status: u16, body: Option<ErrorBody>) -> Self {
        let Some(body) = body else {
            return match status {
                401 => Self::Unauthenticated("Unauthorized".to_string()),
                403 => Self::Forbidden("Forbidden".to_string()),
                404 => Self::NotFound("Not found".to_string()),
                _ => Self::Unavailable(format!("unexpected status {}", status)),
            };
        };

        match body.code.as_str() {
            "INVALID_TARGET" => Self::InvalidTarget(body.detail),
            "EMPTY_TEXT" => Self::EmptyText,
            "INVALID_PARENT" => Self::InvalidParent(body.detail),
            "VALIDATION_ERROR" => Self::Validation(body.detail),
            "NOT_FOUND" => Self::NotFound(body.detail),
            "FORBIDDEN" => Self::Forbidden(body.detail),
            "INVALID_TRANSITION" => Self::InvalidTransition(body.detail),
            "UNAUTHENTICATED" => Self::Unauthenticated(body.detail),
            "SESSION_EXPIRED" => Self::SessionExpired,
            "INTERNAL_ERROR" => Self::Database(body.detail),
            _ => Self::Unavailable(body.detail),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database(error.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(error: reqwest::Error) -> Self {
        Self::Unavailable(error.to_string())
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "Request failed: {}", self);
        }

        let body = ErrorBody {
            code: self.code().to_string(),
            detail: self.detail(),
        };
        (status, Json(body)).into_response()
    }
}
