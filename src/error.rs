//! Error types for modelkit.
//!
//! Uses thiserror for ergonomic error definitions that integrate
//! with axum's response system. Errors only become JSON bodies when
//! they happen before an archive has started streaming.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Validation errors
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Storage tree errors (anything other than "not found")
    #[error("Storage error at {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // Archive errors
    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Output stream closed by the client")]
    SinkClosed,

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Wrap an I/O error raised while touching `path` in the storage tree.
    pub fn storage(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400
            Self::Validation(_) | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,

            // 500
            Self::Storage { .. }
            | Self::Archive(_)
            | Self::SinkClosed
            | Self::Internal(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Archive(_) => "ARCHIVE_ERROR",
            Self::SinkClosed => "STREAM_CLOSED",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "UNKNOWN_ERROR",
        }
    }

    /// Human readable summary used as the `message` field.
    fn summary(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::InvalidInput(_) => "Invalid export request",
            _ => "Failed to build export package",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            Self::Validation(problems) => json!({
                "success": false,
                "message": self.summary(),
                "errors": problems,
            }),
            _ => json!({
                "success": false,
                "message": self.summary(),
                "error": self.to_string(),
                "code": self.error_code(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

// Convenience conversions
impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => Self::from(io),
            other => Self::Archive(other.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe => Self::SinkClosed,
            _ => Self::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(format!("JSON parsing error: {}", err))
    }
}
