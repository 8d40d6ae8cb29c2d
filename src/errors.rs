use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::{http::StatusCode, response::Json};
use serde::Serialize;
use tracing::{error, warn};

use crate::llm_providers::LLMError;

/// Body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

pub type ApiErrorResponse = (StatusCode, Json<ErrorResponse>);

/// Centralized error types for consistent API error handling
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("AI service error: {0}")]
    Upstream(#[from] LLMError),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("File exceeds the {limit} byte upload limit")]
    FileTooLarge { limit: usize },
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::ValidationError(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::ValidationError(rejection.body_text())
    }
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Multipart(e) => e.status(),
            ApiError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert API error to HTTP response with consistent structure and logging
    pub fn to_response_with_context(self, context: ErrorContext) -> ApiErrorResponse {
        let status = self.status_code();

        if status.is_server_error() {
            error!(
                operation = %context.operation,
                resource_type = %context.resource_type,
                resource_id = ?context.resource_id,
                status = status.as_u16(),
                error = %self,
                "Request failed"
            );
        } else {
            warn!(
                operation = %context.operation,
                resource_type = %context.resource_type,
                resource_id = ?context.resource_id,
                status = status.as_u16(),
                error = %self,
                "Request rejected"
            );
        }

        let message = match &self {
            ApiError::ValidationError(message) => message.clone(),
            ApiError::Upstream(e) => e.to_string(),
            ApiError::Multipart(e) => e.body_text(),
            ApiError::FileTooLarge { .. } => self.to_string(),
            ApiError::Io(_) => "Failed to store uploaded file. Please try again.".to_string(),
        };

        (status, Json(ErrorResponse::new(message)))
    }
}

/// Helper macro for structured error responses
#[macro_export]
macro_rules! api_error {
    (validation, $operation:expr, $resource_type:expr, $message:expr) => {
        $crate::errors::ApiError::ValidationError($message.to_string())
            .to_response_with_context($crate::errors::ErrorContext::new($operation, $resource_type))
    };

    (upstream, $operation:expr, $resource_type:expr, $error:expr) => {
        $crate::errors::ApiError::Upstream($error)
            .to_response_with_context($crate::errors::ErrorContext::new($operation, $resource_type))
    };

    ($error:expr, $operation:expr, $resource_type:expr) => {
        $crate::errors::ApiError::from($error)
            .to_response_with_context($crate::errors::ErrorContext::new($operation, $resource_type))
    };
}
