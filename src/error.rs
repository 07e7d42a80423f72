use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DbError(String),

    #[error("Failed to connect to database: {0}")]
    DbConnectionError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("HTTP request error: {0}")]
    RequestError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Geo dataset error: {0}")]
    DatasetError(String),

    #[error("Failed to resolve host {0}")]
    ResolutionError(String),

    #[error("Resource not found: {0}")]
    NotFoundError(String),

    #[error("Invalid input: {0}")]
    ValidationError(String),
}

// Utility methods for error conversion
impl AppError {
    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        AppError::RequestError(err.to_string())
    }

    pub fn from_sqlx_error(err: sqlx::Error) -> Self {
        AppError::DbError(err.to_string())
    }

    pub fn from_serde_error(err: serde_json::Error) -> Self {
        AppError::JsonError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::from_reqwest_error(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::from_sqlx_error(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::from_serde_error(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

/// Why a single relay probe classified its relay as dead.
///
/// Probe failures never abort a crawl; they travel inside the probe result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to send request: {0}")]
    Send(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("relay closed the connection before EOSE")]
    Closed,

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("probe cancelled")]
    Cancelled,

    #[error("probe task failed: {0}")]
    Task(String),
}

/// A relay frame that could not be decoded. The frame is skipped.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame is not a JSON array: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame has {0} elements, expected at least {1}")]
    TooShort(usize, usize),

    #[error("frame discriminant is not a string")]
    MissingDiscriminant,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::DbError(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::DbConnectionError(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::ServerError(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::RequestError(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::JsonError(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::IoError(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::DatasetError(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::ResolutionError(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::NotFoundError(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, self.to_string()),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "code": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}
