//! Error types for analysis operations.
//!
//! Every failure surfaced by the crate falls into one of the categories below.
//! Each variant carries an [`ErrorContext`] so callers can tell where the
//! failure happened and whether retrying makes sense.

use std::fmt;

/// Result type for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Structured context for analysis errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// The operation being performed (e.g., "ensure_range", "reconstruct_basal")
    pub operation: Option<String>,
    /// The entity type involved (e.g., "events", "schedule", "thresholds")
    pub entity: Option<String>,
    /// The entity ID if applicable
    pub entity_id: Option<String>,
    /// Additional details about the error
    pub details: Option<String>,
    /// Whether this error is retryable
    pub retryable: bool,
}

impl ErrorContext {
    /// Create a new error context with an operation name.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    /// Set the entity type.
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Set the entity ID.
    pub fn with_entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    /// Set additional details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Mark this error as retryable.
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(ref op) = self.operation {
            parts.push(format!("operation={}", op));
        }
        if let Some(ref entity) = self.entity {
            parts.push(format!("entity={}", entity));
        }
        if let Some(ref id) = self.entity_id {
            parts.push(format!("id={}", id));
        }
        if let Some(ref details) = self.details {
            parts.push(format!("details={}", details));
        }
        if self.retryable {
            parts.push("retryable=true".to_string());
        }
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Error type for analysis operations.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Transport or parse failure while retrieving data.
    /// Cache state is left untouched when this is returned.
    #[error("Source unavailable: {message} {context}")]
    SourceUnavailable {
        message: String,
        context: ErrorContext,
    },

    /// An instant predates every known schedule.
    /// Never to be read as a zero delivery rate.
    #[error("Unresolvable schedule: {message} {context}")]
    UnresolvableSchedule {
        message: String,
        context: ErrorContext,
    },

    /// Invalid thresholds, time zones or other settings.
    #[error("Configuration error: {message} {context}")]
    ConfigurationError {
        message: String,
        context: ErrorContext,
    },

    /// Caller supplied arguments that cannot be analysed (e.g. inverted ranges).
    #[error("Invalid input: {message} {context}")]
    InvalidInput {
        message: String,
        context: ErrorContext,
    },

    /// Internal/unexpected errors.
    #[error("Internal error: {message} {context}")]
    InternalError {
        message: String,
        context: ErrorContext,
    },
}

impl AnalysisError {
    /// Create a source-unavailable error. These are always retryable.
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
            context: ErrorContext::default().retryable(),
        }
    }

    /// Create a source-unavailable error with full context.
    pub fn source_unavailable_with_context(
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
            context: context.retryable(),
        }
    }

    /// Create an unresolvable-schedule error.
    pub fn unresolvable(message: impl Into<String>) -> Self {
        Self::UnresolvableSchedule {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Create an unresolvable-schedule error with context.
    pub fn unresolvable_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::UnresolvableSchedule {
            message: message.into(),
            context,
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Create a configuration error with context.
    pub fn configuration_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            context,
        }
    }

    /// Create an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Create an invalid-input error with context.
    pub fn invalid_input_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::InvalidInput {
            message: message.into(),
            context,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SourceUnavailable { context, .. } => context.retryable,
            _ => false,
        }
    }

    /// Get the error context.
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::SourceUnavailable { context, .. } => context,
            Self::UnresolvableSchedule { context, .. } => context,
            Self::ConfigurationError { context, .. } => context,
            Self::InvalidInput { context, .. } => context,
            Self::InternalError { context, .. } => context,
        }
    }

    /// Add or update the operation in the error context.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        match &mut self {
            Self::SourceUnavailable { context, .. }
            | Self::UnresolvableSchedule { context, .. }
            | Self::ConfigurationError { context, .. }
            | Self::InvalidInput { context, .. }
            | Self::InternalError { context, .. } => {
                context.operation = Some(operation.into());
            }
        }
        self
    }
}
