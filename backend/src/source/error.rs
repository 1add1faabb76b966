//! Error type for event source operations.

use crate::error::{AnalysisError, ErrorContext};

/// Result type for event source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Failure while retrieving raw records.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Transport failure or the service refused the request.
    #[error("Source {source_id} unavailable: {message}")]
    Unavailable { source_id: String, message: String },

    /// Nothing is known about the requested source.
    #[error("Source {source_id} not found")]
    NotFound { source_id: String },

    /// The response could not be parsed into the expected records.
    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },
}

impl SourceError {
    pub fn unavailable(source_id: impl ToString, message: impl Into<String>) -> Self {
        Self::Unavailable {
            source_id: source_id.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(source_id: impl ToString) -> Self {
        Self::NotFound {
            source_id: source_id.to_string(),
        }
    }

    pub fn parse(what: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::parse("response", err)
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Unavailable {
            source_id: "local".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<SourceError> for AnalysisError {
    fn from(err: SourceError) -> Self {
        let entity = match &err {
            SourceError::Unavailable { .. } => "transport",
            SourceError::NotFound { .. } => "source",
            SourceError::Parse { .. } => "response",
        };
        AnalysisError::source_unavailable_with_context(
            err.to_string(),
            ErrorContext::new("fetch").with_entity(entity),
        )
    }
}
