//! Error types for inferno-poison
//!
//! Client-correctable failures (wrong media, bad input) are kept apart from
//! internal ones so the HTTP layer can map them to status codes.

use crate::media::MediaKind;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the poisoning service
#[derive(Error, Debug)]
pub enum Error {
    /// Pool or startup configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised by the shared library
    #[error(transparent)]
    Common(#[from] inferno_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload belongs to a different media category than the endpoint accepts
    #[error("must be {} file ({}), got {detected}", .expected, .expected.accepted_format())]
    WrongKind {
        expected: MediaKind,
        detected: String,
    },

    /// Payload has the right category but an unsupported codec or container
    #[error("must be {}, got {detected}", .expected.accepted_format())]
    WrongSubtype {
        expected: MediaKind,
        detected: String,
    },

    /// Invalid request
    #[error("Bad request: {0}")]
    InvalidInput(String),

    /// Empty pool or missing resource
    #[error("Not found: {0}")]
    NotFound(String),

    /// Markov generation produced nothing usable
    #[error("ERROR: {0}")]
    Generation(String),

    /// Audio stream could not be parsed
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller can fix this by sending different input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::WrongKind { .. } | Error::WrongSubtype { .. } | Error::InvalidInput(_)
        )
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Background task failed: {}", err))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            e if e.is_validation() => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::Decode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DECODE_ERROR"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Convenience Result type using the service Error
pub type Result<T> = std::result::Result<T, Error>;
