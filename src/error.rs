//! Error types for the Nango provider.

use thiserror::Error;

use crate::schema::Diagnostic;

/// Errors that can occur while serving provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP request could not be completed (network failure or exhausted retries).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The API answered with a body that could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The API answered with a non-success status not covered by a more specific variant.
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code returned by the API.
        status: u16,
        /// Operation label, status reason and response body.
        message: String,
    },

    /// Resource already exists (create conflict).
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied (authentication/authorization failure).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Quota or rate limit exceeded.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Service temporarily unavailable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Operation timed out.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Operation failed due to current state (precondition not met).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Operation not implemented.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Invalid request from client.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Get the error message as a string.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg) => msg,
            Self::Validation(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::Http(msg) => msg,
            Self::Decode(msg) => msg,
            Self::Api { message, .. } => message,
            Self::AlreadyExists(msg) => msg,
            Self::PermissionDenied(msg) => msg,
            Self::ResourceExhausted(msg) => msg,
            Self::Unavailable(msg) => msg,
            Self::DeadlineExceeded(msg) => msg,
            Self::FailedPrecondition(msg) => msg,
            Self::Unimplemented(msg) => msg,
            Self::InvalidRequest(msg) => msg,
        }
    }

    /// The HTTP status that caused this error, if it came from an API response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::NotFound(_) => Some(404),
            Self::AlreadyExists(_) => Some(409),
            Self::ResourceExhausted(_) => Some(429),
            Self::Unavailable(_) => Some(503),
            _ => None,
        }
    }

    /// Short, user-facing summary naming the error class.
    fn summary(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "Resource not found",
            Self::Validation(_) => "Invalid resource configuration",
            Self::Configuration(_) => "Invalid provider configuration",
            Self::UnknownResource(_) => "Unknown resource type",
            Self::Serialization(_) => "Unable to encode request",
            Self::Http(_) => "HTTP request failed",
            Self::Decode(_) => "Unable to decode API response",
            Self::Api { .. } => "Nango API returned an error",
            Self::AlreadyExists(_) => "Resource already exists",
            Self::PermissionDenied(_) => "Permission denied",
            Self::ResourceExhausted(_) => "Rate limit exceeded",
            Self::Unavailable(_) => "Nango API unavailable",
            Self::DeadlineExceeded(_) => "Request timed out",
            Self::FailedPrecondition(_) => "Provider not ready",
            Self::Unimplemented(_) => "Operation not supported",
            Self::InvalidRequest(_) => "Invalid request",
        }
    }

    /// Render this error as an error diagnostic for the orchestration host.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.summary()).with_detail(self.to_string())
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        err.to_diagnostic()
    }
}
