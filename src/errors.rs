use crate::api::ApiResponse;
use axum::{http::StatusCode, response::Json};
use tracing::{error, info, warn};

/// Error kinds surfaced by the study core
#[derive(Debug, thiserror::Error)]
pub enum StudyError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cannot {operation} while quiz is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: String,
    },

    #[error("Could not parse service response: {0}")]
    ResponseParse(String),

    #[error("{}", schema_message(*question, reason))]
    SchemaViolation {
        question: Option<usize>,
        reason: String,
    },

    #[error("Generation service error: {0}")]
    Service(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

fn schema_message(question: Option<usize>, reason: &str) -> String {
    match question {
        Some(position) => format!("Schema violation in question {}: {}", position, reason),
        None => format!("Schema violation: {}", reason),
    }
}

impl StudyError {
    /// True for failures of the generation service that the generator
    /// absorbs through its fallback path.
    pub fn is_recoverable_generation_failure(&self) -> bool {
        matches!(
            self,
            StudyError::ResponseParse(_)
                | StudyError::SchemaViolation { .. }
                | StudyError::Service(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            StudyError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            StudyError::InvalidTransition { .. } => StatusCode::CONFLICT,
            StudyError::NotFound(_) => StatusCode::NOT_FOUND,
            StudyError::ResponseParse(_)
            | StudyError::SchemaViolation { .. }
            | StudyError::Service(_) => StatusCode::BAD_GATEWAY,
            StudyError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for StudyError {
    fn from(err: sqlx::Error) -> Self {
        StudyError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StudyError {
    fn from(err: serde_json::Error) -> Self {
        StudyError::Storage(format!("JSON encoding failed: {}", err))
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

impl StudyError {
    /// Convert to an HTTP response with consistent structure and logging
    pub fn to_response_with_context(
        self,
        context: ErrorContext,
    ) -> (StatusCode, Json<ApiResponse<()>>) {
        let status = self.status_code();
        let message = match &self {
            StudyError::NotFound(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Resource not found"
                );
                format!("{} not found", context.resource_type)
            }
            StudyError::InvalidInput(_) | StudyError::InvalidTransition { .. } => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Rejected request"
                );
                self.to_string()
            }
            StudyError::ResponseParse(_)
            | StudyError::SchemaViolation { .. }
            | StudyError::Service(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Generation service error"
                );
                "AI service temporarily unavailable. Please try again.".to_string()
            }
            StudyError::Storage(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Storage error"
                );
                "Storage operation failed. Please try again.".to_string()
            }
        };

        (status, Json(ApiResponse::error(message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("remove_item", "library item").with_id("dQw4w9WgXcQ");

        assert_eq!(context.operation, "remove_item");
        assert_eq!(context.resource_type, "library item");
        assert_eq!(context.resource_id, Some("dQw4w9WgXcQ".to_string()));
    }

    #[test]
    fn test_schema_violation_message_names_question() {
        let error = StudyError::SchemaViolation {
            question: Some(2),
            reason: "expected 4 options, found 3".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Schema violation in question 2: expected 4 options, found 3"
        );

        let error = StudyError::SchemaViolation {
            question: None,
            reason: "summary must be a non-empty string".to_string(),
        };
        assert_eq!(error.to_string(), "Schema violation: summary must be a non-empty string");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(StudyError::Service("down".to_string()).is_recoverable_generation_failure());
        assert!(StudyError::ResponseParse("bad".to_string()).is_recoverable_generation_failure());
        assert!(!StudyError::InvalidInput("empty".to_string()).is_recoverable_generation_failure());
        assert!(!StudyError::NotFound("x".to_string()).is_recoverable_generation_failure());
    }

    #[test]
    fn test_error_responses() {
        let error = StudyError::NotFound("item 'abc'".to_string());
        let context = ErrorContext::new("get_item", "library item").with_id("abc");
        let (status, _response) = error.to_response_with_context(context);
        assert_eq!(status, StatusCode::NOT_FOUND);

        let error = StudyError::InvalidInput("empty transcript".to_string());
        let (status, _) = error.to_response_with_context(ErrorContext::new("generate", "study module"));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let error = StudyError::InvalidTransition {
            operation: "submit",
            state: "presenting question 1".to_string(),
        };
        let (status, _) = error.to_response_with_context(ErrorContext::new("submit", "quiz"));
        assert_eq!(status, StatusCode::CONFLICT);

        let error = StudyError::Storage("disk full".to_string());
        let (status, _) = error.to_response_with_context(ErrorContext::new("upsert", "library item"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
