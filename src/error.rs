//! Custom error types for the cleaning pipeline.
//!
//! This module provides the error hierarchy used throughout the pipeline,
//! built on `thiserror`. The propagation policy mirrors the component
//! contracts: code extraction and validation always return status values,
//! script execution always returns an outcome value, and only the
//! orchestrator surfaces hard errors.

use thiserror::Error;

/// The main error type for the cleaning pipeline.
#[derive(Error, Debug)]
pub enum CleaningError {
    /// The generation/profiling service failed or timed out.
    #[error("Generation service error: {0}")]
    Service(String),

    /// The service response could not be parsed into the expected shape.
    #[error("Malformed service response: {0}")]
    MalformedResponse(String),

    /// Generated code failed the syntax check even after the bounded retry.
    #[error("Generated script is not valid Python: {0}")]
    SyntaxInvalid(String),

    /// The sandboxed script reported failure.
    #[error("Script execution failed (exit status {exit_status}): {stderr}")]
    ExecutionFailed { exit_status: i32, stderr: String },

    /// A downstream stage expected a committed artifact that is absent.
    #[error("Missing artifact: {0}")]
    MissingArtifact(String),

    /// Required service credentials are absent.
    #[error("Missing API key: set {0} in the environment")]
    MissingApiKey(String),

    /// The input file has an unrecognized tabular extension.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Cleanup was requested while a run is executing for the identifier.
    #[error("Dataset {0} has a cleaning run in progress")]
    RunInProgress(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error (generation service transport).
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<CleaningError>,
    },
}

impl CleaningError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        CleaningError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable error code for display and dispatch.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Service(_) => "SERVICE_ERROR",
            Self::MalformedResponse(_) => "PARSE_ERROR",
            Self::SyntaxInvalid(_) => "SYNTAX_INVALID",
            Self::ExecutionFailed { .. } => "EXECUTION_FAILED",
            Self::MissingArtifact(_) => "MISSING_ARTIFACT",
            Self::MissingApiKey(_) => "MISSING_API_KEY",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::RunInProgress(_) => "RUN_IN_PROGRESS",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Http(_) => "HTTP_REQUEST_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check whether the error is recoverable by degrading to a default
    /// result (analysis path) rather than aborting the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Service(_) | Self::MalformedResponse(_) | Self::Http(_)
        )
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, CleaningError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| CleaningError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| CleaningError::Io(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            CleaningError::Service("down".to_string()).error_code(),
            "SERVICE_ERROR"
        );
        assert_eq!(
            CleaningError::MissingArtifact("cleaned table".to_string()).error_code(),
            "MISSING_ARTIFACT"
        );
        assert_eq!(
            CleaningError::ExecutionFailed {
                exit_status: 1,
                stderr: "boom".to_string()
            }
            .error_code(),
            "EXECUTION_FAILED"
        );
    }

    #[test]
    fn test_is_recoverable() {
        assert!(CleaningError::Service("timeout".to_string()).is_recoverable());
        assert!(CleaningError::MalformedResponse("{".to_string()).is_recoverable());
        assert!(!CleaningError::SyntaxInvalid("bad".to_string()).is_recoverable());
        assert!(!CleaningError::MissingArtifact("x".to_string()).is_recoverable());
    }

    #[test]
    fn test_with_context_preserves_code() {
        let err = CleaningError::SyntaxInvalid("unexpected EOF".to_string())
            .with_context("During master pass");
        assert!(err.to_string().contains("During master pass"));
        assert_eq!(err.error_code(), "SYNTAX_INVALID");
    }
}
