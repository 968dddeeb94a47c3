//! Error handling module
//!
//! Provides unified error types and handling for the entire application.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Service timeout: {0}")]
    ServiceTimeout(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    /// A pipeline trigger arrived while busy or out of order
    #[error("Stage trigger ignored: {0}")]
    StageIgnored(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Stable machine-readable code used in error responses
    pub fn code(&self) -> &'static str {
        match self {
            AppError::AnalysisFailed(_) => "ANALYSIS_FAILED",
            AppError::ServiceTimeout(_) => "SERVICE_TIMEOUT",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::DuplicateId(_) => "DUPLICATE_ID",
            AppError::StageIgnored(_) => "STAGE_IGNORED",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message, details) = match &self {
            AppError::AnalysisFailed(msg) => {
                warn!("Analysis failed: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "Document or liveness analysis failed".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::ServiceTimeout(msg) => {
                warn!("Service timeout: {}", msg);
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "Analysis service did not respond in time".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::InvalidInput(msg) | AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone(), None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::DuplicateId(msg) | AppError::StageIgnored(msg) => {
                (StatusCode::CONFLICT, msg.clone(), None)
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone(), None),
            AppError::Storage(msg) => {
                error!("Storage error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Outcome storage failed".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Config(msg) => {
                error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A configuration error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(code.to_string()),
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}
