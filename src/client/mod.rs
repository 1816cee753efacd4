//! HTTP access to the Nango API.
//!
//! [`NangoClient`] resolves endpoints against a base URL and sends requests
//! through a stack of [`Transport`] layers: retry, request logging, bearer
//! authentication and finally `reqwest`. Non-2xx responses are returned to
//! the caller, who decides how to classify them with
//! [`ApiResponse::error_for_status`].

mod api;
mod config;
mod error;
mod transport;

pub use api::{normalize_base_url, NangoClient};
pub use config::{
    is_retryable_status, ClientConfig, RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_MAX_WAIT,
    DEFAULT_MIN_WAIT, DEFAULT_TIMEOUT_SECS,
};
pub use error::{ClientError, OperationContext, Result};
pub use transport::{
    redact_body, ApiRequest, ApiResponse, BearerAuth, HttpTransport, RequestLogging, Retry,
    Transport,
};

/// Tracing target for HTTP client events.
pub const TRACING_TARGET: &str = "hemmer_provider_nango::client";
