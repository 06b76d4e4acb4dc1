//! Error handling for the screenwall server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Queue entry, screen or photo absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Photo already has an entry in the target queue
    #[error("Photo {photo_id} already queued for {scope}")]
    AlreadyQueued { photo_id: String, scope: String },

    /// Skip requested with nothing at position 0
    #[error("Queue is empty: {0}")]
    EmptyQueue(String),

    /// Caller lacks the required role
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Backing store unreachable (network, pool exhausted, closed)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// SQLx database error
    #[error("SQLx error: {0}")]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Error::StoreUnavailable(e.to_string())
            }
            other => Error::Sqlx(other),
        }
    }
}

impl Error {
    /// Stable machine-readable code, also used in structured mutation results
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::AlreadyQueued { .. } => "ALREADY_QUEUED",
            Error::EmptyQueue(_) => "EMPTY_QUEUE",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Sqlx(_) => "DATABASE_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyQueued { .. } => StatusCode::CONFLICT,
            Error::EmptyQueue(_) => StatusCode::CONFLICT,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Internal(_)
            | Error::Sqlx(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_code = self.code();
        let message = self.to_string();

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_store_unavailable() {
        let err: Error = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.code(), "STORE_UNAVAILABLE");
    }

    #[test]
    fn test_row_not_found_stays_database_error() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert_eq!(err.code(), "DATABASE_ERROR");
    }

    #[test]
    fn test_already_queued_message() {
        let err = Error::AlreadyQueued {
            photo_id: "p1".to_string(),
            scope: "screen s1".to_string(),
        };
        assert_eq!(err.to_string(), "Photo p1 already queued for screen s1");
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
