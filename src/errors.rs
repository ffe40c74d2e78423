use crate::api::ApiResponse;
use axum::{http::StatusCode, response::Json};
use tracing::{error, warn};

/// Centralized error types for consistent API error handling
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Grading engine error: {0}")]
    #[allow(dead_code)]
    GradingEngineError(String),

    #[error("Internal server error: {0}")]
    #[allow(dead_code)]
    InternalError(String),
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_type: String,
    pub user_friendly_message: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_type: resource_type.to_string(),
            user_friendly_message: None,
        }
    }

    #[allow(dead_code)]
    pub fn with_user_message(mut self, message: &str) -> Self {
        self.user_friendly_message = Some(message.to_string());
        self
    }
}

impl ApiError {
    /// Convert API error to HTTP response with consistent structure and logging
    pub fn to_response_with_context(
        self,
        context: ErrorContext,
    ) -> (StatusCode, Json<ApiResponse<()>>) {
        match &self {
            ApiError::BadRequest(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    error = %self,
                    "Bad request"
                );
                (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(
                        context
                            .user_friendly_message
                            .unwrap_or_else(|| self.to_string()),
                    )),
                )
            }
            ApiError::ValidationError(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    error = %self,
                    "Validation error"
                );
                (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(self.to_string())),
                )
            }
            ApiError::GradingEngineError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    error = %self,
                    "Grading engine error"
                );
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ApiResponse::error(
                        "Grading service temporarily unavailable. Please try again.".to_string(),
                    )),
                )
            }
            ApiError::InternalError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    error = %self,
                    "Internal server error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error(
                        "An internal error occurred. Please try again.".to_string(),
                    )),
                )
            }
        }
    }

    /// Simple conversion without context
    #[allow(dead_code)]
    pub fn to_response(self) -> (StatusCode, Json<ApiResponse<()>>) {
        let context = ErrorContext::new("unknown", "resource");
        self.to_response_with_context(context)
    }
}

/// Per-attempt failure taxonomy for a single grading call.
///
/// Every variant is retryable inside the retry supervisor; none of them
/// escape it. Exhausting the retry budget produces a synthetic
/// error-status outcome instead of an error value.
#[derive(Debug, thiserror::Error)]
pub enum GradeError {
    #[error("question text is empty")]
    EmptyQuestion,

    #[error("malformed grading response: {0}")]
    MalformedResponse(String),

    #[error("grading attempt timed out after {0}s")]
    Timeout(u64),

    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("grade_batch", "questions")
            .with_user_message("No questions provided");

        assert_eq!(context.operation, "grade_batch");
        assert_eq!(context.resource_type, "questions");
        assert_eq!(
            context.user_friendly_message,
            Some("No questions provided".to_string())
        );
    }

    #[test]
    fn test_api_error_responses() {
        let error = ApiError::BadRequest("No questions provided".to_string());
        let context = ErrorContext::new("grade_batch", "questions");
        let (status, _response) = error.to_response_with_context(context);
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let error = ApiError::ValidationError("Invalid data".to_string());
        let (status, _) = error.to_response();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let error = ApiError::GradingEngineError("engine down".to_string());
        let (status, _) = error.to_response();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let error = ApiError::InternalError("boom".to_string());
        let (status, _) = error.to_response();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_grade_error_messages() {
        let err = GradeError::Timeout(120);
        assert_eq!(err.to_string(), "grading attempt timed out after 120s");

        let err = GradeError::MalformedResponse("no JSON object found".to_string());
        assert!(err.to_string().contains("no JSON object found"));

        let err: GradeError = anyhow::anyhow!("connection refused").into();
        assert!(matches!(err, GradeError::Engine(_)));
    }
}
