//! HTTP error handling and response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Unknown session
    NotFound(String),
    /// Malformed request
    BadRequest(String),
    /// Internal server error
    Internal(String),
    /// Failure from the analysis layer
    Analysis(AnalysisError),
}

fn analysis_response(err: AnalysisError) -> (StatusCode, ApiError) {
    let details = err.context().to_string();
    let (status, code, message) = match err {
        AnalysisError::SourceUnavailable { message, .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "SOURCE_UNAVAILABLE", message)
        }
        AnalysisError::UnresolvableSchedule { message, .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "UNRESOLVABLE_SCHEDULE",
            message,
        ),
        AnalysisError::ConfigurationError { message, .. } => {
            (StatusCode::BAD_REQUEST, "CONFIGURATION_ERROR", message)
        }
        AnalysisError::InvalidInput { message, .. } => {
            (StatusCode::BAD_REQUEST, "INVALID_INPUT", message)
        }
        AnalysisError::InternalError { message, .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
        }
    };
    (status, ApiError::new(code, message).with_details(details))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", msg)),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", msg))
            }
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new("INTERNAL_ERROR", msg),
            ),
            AppError::Analysis(e) => {
                if e.is_retryable() {
                    log::warn!("Retryable analysis failure: {}", e);
                }
                analysis_response(e)
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        AppError::Analysis(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorContext;

    fn status_of(err: AnalysisError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_analysis_errors_map_to_status_codes() {
        assert_eq!(
            status_of(AnalysisError::source_unavailable("timeout")),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(AnalysisError::unresolvable("before first profile")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(AnalysisError::configuration("recovery_count")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AnalysisError::invalid_input("dates")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AnalysisError::internal("boom")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_context_becomes_details() {
        let err = AnalysisError::unresolvable_with_context(
            "no schedule",
            ErrorContext::new("reconstruct_basal"),
        );
        let (_, body) = analysis_response(err);
        assert_eq!(body.code, "UNRESOLVABLE_SCHEDULE");
        assert_eq!(body.message, "no schedule");
        assert_eq!(body.details.as_deref(), Some("[operation=reconstruct_basal]"));
    }
}
