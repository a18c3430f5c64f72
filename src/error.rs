//! Error taxonomy for the vitals service.
//!
//! Every failure in the ingestion and query paths is surfaced synchronously
//! to the caller of the request that hit it. Nothing is retried.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::models::RecordKey;

// ---

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // ---
    /// Malformed or out-of-range field on an inbound sample.
    #[error("invalid sample: {0}")]
    Validation(String),

    /// A merge was attempted against a row belonging to another key.
    #[error("sample key {found} does not match row key {expected}")]
    KeyMismatch {
        expected: RecordKey,
        found: RecordKey,
    },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

impl Error {
    // ---
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        // ---
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::KeyMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::ConstraintViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        // ---
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::ConstraintViolation(db.message().to_string())
            }
            _ => Error::StorageUnavailable(err.to_string()),
        }
    }
}

/// JSON body returned for any failed request.
#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // ---
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = ErrorBody {
            status: "error",
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_status_codes() {
        // ---
        assert_eq!(
            Error::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::StorageUnavailable("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::ConstraintViolation("dup".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let mismatch = Error::KeyMismatch {
            expected: RecordKey::new("A", "D1"),
            found: RecordKey::new("B", "D1"),
        };
        assert_eq!(mismatch.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_pool_errors_are_storage_unavailable() {
        // ---
        let err: Error = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, Error::StorageUnavailable(_)));
    }

    #[test]
    fn test_key_mismatch_message_names_both_keys() {
        // ---
        let err = Error::KeyMismatch {
            expected: RecordKey::new("A", "D1"),
            found: RecordKey::new("A", "D2"),
        };
        let msg = err.to_string();
        assert!(msg.contains("A/D1"));
        assert!(msg.contains("A/D2"));
    }
}
