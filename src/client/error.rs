//! Error types for the Nango HTTP client.

use reqwest::StatusCode;
use thiserror::Error;

use super::transport::redact_body;
use crate::error::ProviderError;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Longest response body quoted in an error message.
const MAX_BODY_IN_MESSAGE: usize = 1024;

/// Error type for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP request could not be completed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// A URL could not be parsed.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The base URL is unusable (wrong scheme, cannot carry a path).
    #[error("invalid host: {0}")]
    BaseUrl(String),

    /// The environment key cannot be sent as a header value.
    #[error("invalid environment key: {0}")]
    InvalidCredential(String),

    /// The request body could not be encoded.
    #[error("unable to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// The response body could not be decoded.
    #[error("unable to decode response body: {source}")]
    Decode {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
        /// Response body, redacted and possibly truncated.
        body: String,
    },

    /// The API answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// Response status.
        status: StatusCode,
        /// Response body, redacted and possibly truncated.
        body: String,
    },
}

impl ClientError {
    /// Whether a transport-level failure is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }

    /// Build a status error. The body is redacted and truncated.
    pub fn status(status: StatusCode, body: &[u8]) -> Self {
        Self::Status {
            status,
            body: excerpt(body),
        }
    }

    /// Build a decode error. The body is redacted and truncated.
    pub fn decode(source: serde_json::Error, body: &[u8]) -> Self {
        Self::Decode {
            source,
            body: excerpt(body),
        }
    }

    /// Classify this error into a [`ProviderError`], labeled with the failed operation.
    pub fn into_provider_error(self, operation: &str) -> ProviderError {
        match self {
            Self::Request(e) if e.is_timeout() => {
                ProviderError::DeadlineExceeded(format!("{}: {}", operation, e))
            },
            Self::Request(e) => ProviderError::Http(format!("{}: {}", operation, e)),
            err @ (Self::Url(_) | Self::BaseUrl(_) | Self::InvalidCredential(_)) => {
                ProviderError::Configuration(format!("{}: {}", operation, err))
            },
            err @ Self::Encode(_) => ProviderError::InvalidRequest(format!("{}: {}", operation, err)),
            Self::Decode { source, body } => ProviderError::Decode(format!(
                "{}: {} (body: {})",
                operation, source, body
            )),
            Self::Status { status, body } => {
                let message = format!("{}: {} {}", operation, status, body);
                match status {
                    StatusCode::NOT_FOUND => ProviderError::NotFound(message),
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                        ProviderError::PermissionDenied(message)
                    },
                    StatusCode::CONFLICT => ProviderError::AlreadyExists(message),
                    StatusCode::TOO_MANY_REQUESTS => ProviderError::ResourceExhausted(message),
                    StatusCode::SERVICE_UNAVAILABLE => ProviderError::Unavailable(message),
                    _ => ProviderError::Api {
                        status: status.as_u16(),
                        message,
                    },
                }
            },
        }
    }
}

/// Quote a response body in a message: secrets masked, length capped.
fn excerpt(body: &[u8]) -> String {
    let mut body = redact_body(body);
    if body.len() > MAX_BODY_IN_MESSAGE {
        let mut cut = MAX_BODY_IN_MESSAGE;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}

impl From<ClientError> for ProviderError {
    fn from(err: ClientError) -> Self {
        err.into_provider_error("Nango API request")
    }
}

/// Attach the failed operation to client errors.
pub trait OperationContext<T> {
    /// Convert the error into a [`ProviderError`] labeled with `operation`.
    fn during(self, operation: &str) -> std::result::Result<T, ProviderError>;
}

impl<T> OperationContext<T> for Result<T> {
    fn during(self, operation: &str) -> std::result::Result<T, ProviderError> {
        self.map_err(|err| err.into_provider_error(operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let err = ClientError::status(StatusCode::NOT_FOUND, b"{\"error\":\"missing\"}")
            .into_provider_error("Unable to Read Integration");
        assert!(matches!(err, ProviderError::NotFound(_)));
        assert!(err.message().starts_with("Unable to Read Integration: 404"));

        let err = ClientError::status(StatusCode::FORBIDDEN, b"").into_provider_error("op");
        assert!(matches!(err, ProviderError::PermissionDenied(_)));

        let err = ClientError::status(StatusCode::CONFLICT, b"").into_provider_error("op");
        assert!(matches!(err, ProviderError::AlreadyExists(_)));

        let err =
            ClientError::status(StatusCode::INTERNAL_SERVER_ERROR, b"boom").into_provider_error("op");
        match err {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("boom"));
            },
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_keeps_body() {
        let source = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err = ClientError::Decode {
            source,
            body: "not json".to_string(),
        }
        .into_provider_error("Unable to Decode JSON");
        assert!(matches!(err, ProviderError::Decode(_)));
        assert!(err.message().contains("body: not json"));
    }

    #[test]
    fn test_long_body_is_truncated() {
        let body = "x".repeat(MAX_BODY_IN_MESSAGE * 2);
        match ClientError::status(StatusCode::BAD_GATEWAY, body.as_bytes()) {
            ClientError::Status { body, .. } => {
                assert_eq!(body.len(), MAX_BODY_IN_MESSAGE + 3);
                assert!(body.ends_with("..."));
            },
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_status_body_is_redacted() {
        let body = br#"{"credentials":{"client_id":"cid","client_secret":"TOPSECRET"}}"#;
        let err = ClientError::status(StatusCode::BAD_REQUEST, body).into_provider_error("op");
        let message = err.to_diagnostic().detail.unwrap_or_default();
        assert!(!message.contains("TOPSECRET"));
        assert!(message.contains("cid"));
    }

    #[test]
    fn test_decode_body_is_redacted_and_truncated() {
        let mut body = br#"{"data":{"credentials":{"client_secret":"TOPSECRET","#.to_vec();
        body.extend(std::iter::repeat(b'x').take(MAX_BODY_IN_MESSAGE * 2));
        let source = serde_json::from_slice::<serde_json::Value>(&body).unwrap_err();

        match ClientError::decode(source, &body) {
            ClientError::Decode { body, .. } => {
                assert!(!body.contains("TOPSECRET"));
                assert!(body.contains("[REDACTED]"));
                assert_eq!(body.len(), MAX_BODY_IN_MESSAGE + 3);
            },
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_configuration_errors() {
        let err = ClientError::BaseUrl("ftp://example.com".to_string()).into_provider_error("Configure");
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert!(!ClientError::BaseUrl(String::new()).is_retryable());
    }

    #[test]
    fn test_operation_context() {
        let result: Result<()> = Err(ClientError::status(StatusCode::BAD_REQUEST, b"bad"));
        let err = result.during("Unable to Update Integration").unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("Unable to Update Integration"));
    }
}
