//! Composable HTTP transport layers.
//!
//! A request travels through the layers outermost first:
//!
//! ```text
//! Retry -> RequestLogging -> BearerAuth -> HttpTransport (reqwest)
//! ```
//!
//! Retry sits outside everything so each attempt is logged on its own and
//! re-authenticated. Logging sits outside auth so the `Authorization` header
//! is never in scope when a request is logged.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use super::config::{is_retryable_status, ClientConfig, RetryPolicy};
use super::error::{ClientError, Result};
use super::TRACING_TARGET;

/// JSON keys whose values are masked in logged bodies.
const SENSITIVE_KEY_FRAGMENTS: &[&str] = &["secret", "token", "password"];

const REDACTED: &str = "[REDACTED]";

/// A buffered HTTP request. Cloneable so it can be replayed on retry.
#[derive(Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Encoded body, if any.
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    /// Create a request without headers or body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Attach a JSON body.
    pub fn with_json_body(mut self, body: Vec<u8>) -> Self {
        self.headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = Some(body);
        self
    }
}

// Headers are left out so credentials never reach a Debug dump.
impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .finish()
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Turn non-2xx responses into [`ClientError::Status`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ClientError::status(self.status, &self.body))
        }
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|source| ClientError::decode(source, &self.body))
    }
}

/// Something that can execute an [`ApiRequest`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send a request and buffer the response.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        (**self).send(request).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        (**self).send(request).await
    }
}

/// The innermost layer: performs requests with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a `reqwest` client from the given configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.effective_timeout())
            .user_agent(config.effective_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing `reqwest` client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

/// Sets `Authorization: Bearer <key>` on every request, replacing any
/// existing value.
pub struct BearerAuth<T> {
    inner: T,
    header: HeaderValue,
}

impl<T: Transport> BearerAuth<T> {
    /// Wrap `inner`, authenticating with `key`.
    pub fn new(inner: T, key: &str) -> Result<Self> {
        let mut header = HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|_| {
            ClientError::InvalidCredential("key contains characters not allowed in a header".into())
        })?;
        header.set_sensitive(true);
        Ok(Self { inner, header })
    }
}

#[async_trait]
impl<T: Transport> Transport for BearerAuth<T> {
    async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        request.headers.insert(AUTHORIZATION, self.header.clone());
        self.inner.send(request).await
    }
}

/// Logs request and response metadata at debug level.
///
/// Bodies are logged only when enabled, with secret-bearing JSON keys masked.
pub struct RequestLogging<T> {
    inner: T,
    log_bodies: bool,
}

impl<T: Transport> RequestLogging<T> {
    /// Wrap `inner`.
    pub fn new(inner: T, log_bodies: bool) -> Self {
        Self { inner, log_bodies }
    }
}

#[async_trait]
impl<T: Transport> Transport for RequestLogging<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let method = request.method.clone();
        let url = request.url.clone();

        tracing::debug!(
            target: TRACING_TARGET,
            method = %method,
            url = %url,
            "Sending request"
        );
        if self.log_bodies {
            if let Some(body) = &request.body {
                tracing::debug!(target: TRACING_TARGET, body = %redact_body(body), "Request body");
            }
        }

        let started = Instant::now();
        let result = self.inner.send(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    method = %method,
                    url = %url,
                    status = response.status.as_u16(),
                    elapsed_ms,
                    "Received response"
                );
                if self.log_bodies && !response.body.is_empty() {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        body = %redact_body(&response.body),
                        "Response body"
                    );
                }
            },
            Err(err) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    method = %method,
                    url = %url,
                    error = %err,
                    elapsed_ms,
                    "Request failed"
                );
            },
        }

        result
    }
}

/// Replays requests that fail transiently, per [`RetryPolicy`].
///
/// Once the attempts run out, the last outcome is returned as-is: a final
/// 5xx comes back as a response for the caller to classify.
pub struct Retry<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Transport> Retry<T> {
    /// Wrap `inner`.
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<T: Transport> Transport for Retry<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut attempt = 0;
        loop {
            let outcome = self.inner.send(request.clone()).await;
            let retryable = match &outcome {
                Ok(response) => is_retryable_status(response.status),
                Err(err) => err.is_retryable(),
            };

            if !retryable {
                return outcome;
            }
            if attempt >= self.policy.max_retries {
                tracing::warn!(
                    target: TRACING_TARGET,
                    method = %request.method,
                    url = %request.url,
                    attempts = attempt + 1,
                    "Giving up after retries"
                );
                return outcome;
            }

            let wait = self.policy.wait_for(attempt, outcome.as_ref().ok());
            tracing::warn!(
                target: TRACING_TARGET,
                method = %request.method,
                url = %request.url,
                attempt = attempt + 1,
                wait_ms = wait.as_millis() as u64,
                "Retrying request"
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}

/// Render a body for logs and error messages, masking values under sensitive
/// JSON keys.
///
/// Bodies that do not parse as JSON (truncated, or not JSON at all) are
/// scanned as text: any string following a sensitive `"key":` is masked.
pub fn redact_body(body: &[u8]) -> String {
    match serde_json::from_slice::<Value>(body) {
        Ok(mut value) => {
            redact_value(&mut value);
            value.to_string()
        },
        Err(_) => redact_text(&String::from_utf8_lossy(body)),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    Idle,
    SensitiveKey,
    SensitiveValue,
}

fn redact_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    let mut state = Scan::Idle;

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                let (token, closed) = read_string(&mut chars);
                if state == Scan::SensitiveValue {
                    out.push('"');
                    out.push_str(REDACTED);
                    out.push('"');
                    state = Scan::Idle;
                    continue;
                }
                out.push('"');
                out.push_str(&token);
                if closed {
                    out.push('"');
                }
                state = if closed && is_sensitive_key(&token) {
                    Scan::SensitiveKey
                } else {
                    Scan::Idle
                };
            },
            ':' if state == Scan::SensitiveKey => {
                out.push(c);
                state = Scan::SensitiveValue;
            },
            c if c.is_whitespace() => out.push(c),
            _ => {
                out.push(c);
                state = Scan::Idle;
            },
        }
    }
    out
}

/// Read a JSON string body up to its closing quote. Escapes are kept as-is.
fn read_string(chars: &mut std::str::Chars<'_>) -> (String, bool) {
    let mut token = String::new();
    let mut escaped = false;
    for c in chars.by_ref() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return (token, true);
        }
        token.push(c);
    }
    (token, false)
}

fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *child = Value::String(REDACTED.to_string());
                } else {
                    redact_value(child);
                }
            }
        },
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {},
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEY_FRAGMENTS
        .iter()
        .any(|fragment| key.contains(fragment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(max_retries)
            .with_wait(Duration::from_millis(1), Duration::from_millis(5))
    }

    fn http() -> HttpTransport {
        HttpTransport::new(&ClientConfig::default()).unwrap()
    }

    fn get(server: &MockServer, route: &str) -> ApiRequest {
        let url = Url::parse(&format!("{}{}", server.uri(), route)).unwrap();
        ApiRequest::new(Method::GET, url)
    }

    /// Replies with a fixed script of statuses and counts calls.
    struct Scripted {
        statuses: Mutex<VecDeque<StatusCode>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(statuses: &[StatusCode]) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().copied().collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, _request: ApiRequest) -> Result<ApiResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let status = self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(StatusCode::OK);
            Ok(ApiResponse {
                status,
                headers: HeaderMap::new(),
                body: Vec::new(),
            })
        }
    }

    fn dummy_request() -> ApiRequest {
        ApiRequest::new(Method::GET, Url::parse("http://localhost/integrations").unwrap())
    }

    #[tokio::test]
    async fn test_retry_stops_at_first_success() {
        let scripted = Arc::new(Scripted::new(&[
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::BAD_GATEWAY,
            StatusCode::OK,
        ]));
        let retry = Retry::new(scripted.clone(), fast_policy(3));

        let response = retry.send(dummy_request()).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_last_outcome_when_exhausted() {
        let scripted = Arc::new(Scripted::new(&[StatusCode::INTERNAL_SERVER_ERROR; 10]));
        let retry = Retry::new(scripted.clone(), fast_policy(3));

        let response = retry.send(dummy_request()).await.unwrap();
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 4);
        assert!(response.error_for_status().is_err());
    }

    #[tokio::test]
    async fn test_no_retry_for_client_errors_or_501() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::NOT_FOUND,
            StatusCode::NOT_IMPLEMENTED,
        ] {
            let scripted = Arc::new(Scripted::new(&[status]));
            let retry = Retry::new(scripted.clone(), fast_policy(3));

            let response = retry.send(dummy_request()).await.unwrap();
            assert_eq!(response.status, status);
            assert_eq!(scripted.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_disabled_retry_makes_one_attempt() {
        let scripted = Arc::new(Scripted::new(&[StatusCode::TOO_MANY_REQUESTS]));
        let retry = Retry::new(scripted.clone(), RetryPolicy::disabled());

        let response = retry.send(dummy_request()).await.unwrap();
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bearer_auth_overwrites_existing_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/integrations"))
            .and(header("authorization", "Bearer env-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = BearerAuth::new(http(), "env-key").unwrap();
        let mut request = get(&server, "/integrations");
        request
            .headers
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer stale"));

        let response = transport.send(request).await.unwrap();
        assert!(response.is_success());
    }

    #[test]
    fn test_bearer_auth_rejects_invalid_key() {
        let err = BearerAuth::new(http(), "bad\nkey").err().unwrap();
        assert!(matches!(err, ClientError::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn test_full_stack_retries_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/integrations"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/integrations"))
            .and(header("authorization", "Bearer env-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":[]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let stack = Retry::new(
            RequestLogging::new(BearerAuth::new(http(), "env-key").unwrap(), true),
            fast_policy(3),
        );

        let response = stack.send(get(&server, "/integrations")).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        let body: Value = response.json().unwrap();
        assert_eq!(body["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_network_error_is_retried_then_surfaced() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("http://127.0.0.1:{}/integrations", port)).unwrap();
        let retry = Retry::new(http(), fast_policy(2));

        let err = retry
            .send(ApiRequest::new(Method::GET, url))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Request(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_json_decode_failure_keeps_body() {
        let response = ApiResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: b"<html>".to_vec(),
        };
        match response.json::<Value>() {
            Err(ClientError::Decode { body, .. }) => assert_eq!(body, "<html>"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_redact_body_masks_secrets() {
        let body = serde_json::json!({
            "unique_key": "github",
            "credentials": {
                "client_id": "id",
                "client_secret": "hunter2",
                "access_token": "tok"
            },
            "items": [{"password": "p"}]
        });
        let rendered = redact_body(body.to_string().as_bytes());

        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("\"tok\""));
        assert!(!rendered.contains("\"p\""));
        assert!(rendered.contains("github"));
        assert!(rendered.contains("\"client_id\":\"id\""));
        assert!(rendered.contains(REDACTED));
    }

    #[test]
    fn test_redact_body_passes_non_json_through() {
        assert_eq!(redact_body(b"plain text"), "plain text");
    }

    #[test]
    fn test_redact_body_masks_secrets_in_truncated_json() {
        let body = br#"{"data":{"unique_key":"gh1","credentials":{"client_id":"cid","client_secret" : "TOPSECRET","access_token":"tok\"en"}"#;
        let rendered = redact_body(body);

        assert!(!rendered.contains("TOPSECRET"));
        assert!(!rendered.contains(r#"tok\"en"#));
        assert!(rendered.contains(r#""client_id":"cid""#));
        assert!(rendered.contains(r#""client_secret" : "[REDACTED]""#));
        assert!(rendered.starts_with(r#"{"data":{"unique_key":"gh1""#));
    }

    #[test]
    fn test_redact_body_masks_unterminated_secret() {
        let rendered = redact_body(br#"{"client_secret":"TOPSEC"#);
        assert_eq!(rendered, r#"{"client_secret":"[REDACTED]""#);
    }

    #[test]
    fn test_request_debug_hides_headers() {
        let mut request = dummy_request().with_json_body(b"{}".to_vec());
        request
            .headers
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        let rendered = format!("{:?}", request);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("body_len"));
    }
}
