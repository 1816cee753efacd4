//! The Nango API client.

use std::fmt;
use std::sync::Arc;

use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::Method;
use serde::Serialize;
use url::Url;

use super::config::ClientConfig;
use super::error::{ClientError, Result};
use super::transport::{
    ApiRequest, ApiResponse, BearerAuth, HttpTransport, RequestLogging, Retry, Transport,
};

/// Client for the Nango REST API.
///
/// Cheap to clone: all clones share one transport stack and connection pool.
#[derive(Clone)]
pub struct NangoClient {
    inner: Arc<NangoClientInner>,
}

struct NangoClientInner {
    base_url: Url,
    transport: Box<dyn Transport>,
}

impl NangoClient {
    /// Build a client with the standard layer stack:
    /// retry, request logging (if enabled), bearer auth, then `reqwest`.
    pub fn new(host: &str, environment_key: &str, config: &ClientConfig) -> Result<Self> {
        let http = HttpTransport::new(config)?;
        let authed = BearerAuth::new(http, environment_key)?;

        let transport: Box<dyn Transport> = if config.log_requests {
            Box::new(Retry::new(
                RequestLogging::new(authed, config.log_http_bodies),
                config.retry,
            ))
        } else {
            Box::new(Retry::new(authed, config.retry))
        };

        Self::with_transport(host, transport)
    }

    /// Build a client over a caller-supplied transport stack.
    pub fn with_transport(host: &str, transport: impl Transport) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(NangoClientInner {
                base_url: normalize_base_url(host)?,
                transport: Box::new(transport),
            }),
        })
    }

    /// The base URL every endpoint is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Append percent-encoded path segments to the base URL.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.inner.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ClientError::BaseUrl(self.inner.base_url.to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    /// `GET url`.
    pub async fn get(&self, url: Url) -> Result<ApiResponse> {
        self.execute(ApiRequest::new(Method::GET, url)).await
    }

    /// `POST url` with a JSON body.
    pub async fn post<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<ApiResponse> {
        let body = serde_json::to_vec(body).map_err(ClientError::Encode)?;
        self.execute(ApiRequest::new(Method::POST, url).with_json_body(body))
            .await
    }

    /// `PATCH url` with a JSON body.
    pub async fn patch<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<ApiResponse> {
        let body = serde_json::to_vec(body).map_err(ClientError::Encode)?;
        self.execute(ApiRequest::new(Method::PATCH, url).with_json_body(body))
            .await
    }

    /// `DELETE url`.
    pub async fn delete(&self, url: Url) -> Result<ApiResponse> {
        self.execute(ApiRequest::new(Method::DELETE, url)).await
    }

    async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        self.inner.transport.send(request).await
    }
}

impl fmt::Debug for NangoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NangoClient")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Parse a host into a base URL, dropping trailing slashes.
///
/// Only `http` and `https` are accepted.
pub fn normalize_base_url(host: &str) -> Result<Url> {
    let trimmed = host.trim().trim_end_matches('/');
    let url = Url::parse(trimmed)?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::BaseUrl(format!(
            "unsupported scheme '{}' in '{}'",
            url.scheme(),
            host
        )));
    }
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ClientError::BaseUrl(host.to_string()));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RetryPolicy;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> ClientConfig {
        ClientConfig::default().with_retry(RetryPolicy::disabled())
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://api.nango.dev/").unwrap().as_str(),
            "https://api.nango.dev/"
        );
        assert_eq!(
            normalize_base_url("https://nango.internal/api//")
                .unwrap()
                .as_str(),
            "https://nango.internal/api"
        );
        assert!(matches!(
            normalize_base_url("ftp://nango.internal"),
            Err(ClientError::BaseUrl(_))
        ));
        assert!(matches!(
            normalize_base_url("not a url"),
            Err(ClientError::Url(_))
        ));
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = NangoClient::new("https://api.nango.dev/", "key", &config()).unwrap();
        assert_eq!(
            client.endpoint(&["integrations"]).unwrap().as_str(),
            "https://api.nango.dev/integrations"
        );
        assert_eq!(
            client
                .endpoint(&["integrations", "git hub/x?y"])
                .unwrap()
                .as_str(),
            "https://api.nango.dev/integrations/git%20hub%2Fx%3Fy"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = NangoClient::new("https://nango.internal/api/", "key", &config()).unwrap();
        assert_eq!(
            client.endpoint(&["integrations", "github"]).unwrap().as_str(),
            "https://nango.internal/api/integrations/github"
        );
    }

    #[tokio::test]
    async fn test_post_sends_json_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/integrations"))
            .and(header("authorization", "Bearer env-key"))
            .and(header("content-type", "application/json"))
            .and(header("accept", "application/json"))
            .and(body_json(json!({"unique_key": "github"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = NangoClient::new(&server.uri(), "env-key", &config()).unwrap();
        let url = client.endpoint(&["integrations"]).unwrap();
        let response = client
            .post(url, &json!({"unique_key": "github"}))
            .await
            .unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_non_success_is_returned_as_response() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/integrations/github"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;

        let client = NangoClient::new(&server.uri(), "env-key", &config()).unwrap();
        let url = client.endpoint(&["integrations", "github"]).unwrap();
        let response = client.delete(url).await.unwrap();
        assert_eq!(response.status.as_u16(), 404);

        match response.error_for_status() {
            Err(ClientError::Status { status, body }) => {
                assert_eq!(status.as_u16(), 404);
                assert_eq!(body, "gone");
            },
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_debug_omits_transport() {
        let client = NangoClient::new("https://api.nango.dev", "env-key", &config()).unwrap();
        let rendered = format!("{:?}", client);
        assert!(rendered.contains("api.nango.dev"));
        assert!(!rendered.contains("env-key"));
    }
}
