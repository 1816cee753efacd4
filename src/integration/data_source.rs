//! The `nango_integrations` data source.

use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::model::{Envelope, Integration, IntegrationResponse};
use super::{credentials_block, string_attr, DATA_SOURCE_TYPE, INTEGRATIONS_PATH};
use crate::client::{ApiResponse, NangoClient, OperationContext};
use crate::error::ProviderError;
use crate::resource::DataSource;
use crate::schema::{AttributeFlags, Block, NestedBlock, Schema};

const LIST: &str = "Unable to Read Integrations";

/// Lists every integration in the environment.
#[derive(Debug, Clone)]
pub struct IntegrationsDataSource {
    client: NangoClient,
}

impl IntegrationsDataSource {
    /// Create a reader using `client`.
    pub fn new(client: NangoClient) -> Self {
        Self { client }
    }

    /// `GET /integrations`, in API order. Credentials are never included.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Integration>, ProviderError> {
        let url = self.client.endpoint(&[INTEGRATIONS_PATH]).during(LIST)?;
        let response = self
            .client
            .get(url)
            .await
            .and_then(ApiResponse::error_for_status)
            .during(LIST)?;

        let items: Envelope<Vec<IntegrationResponse>> = response.json().during(LIST)?;
        let integrations: Vec<Integration> =
            items.into_inner().into_iter().map(Integration::listed).collect();

        debug!(count = integrations.len(), "Listed integrations");
        Ok(integrations)
    }
}

#[async_trait::async_trait]
impl DataSource for IntegrationsDataSource {
    fn schema() -> Schema {
        let item = Block::new()
            .with_attribute(
                "unique_key",
                string_attr(AttributeFlags::computed(), "The integration ID."),
            )
            .with_attribute(
                "display_name",
                string_attr(AttributeFlags::computed(), "The provider display name."),
            )
            .with_attribute(
                "provider_type",
                string_attr(AttributeFlags::computed(), "The upstream provider."),
            )
            .with_attribute(
                "updated_at",
                string_attr(AttributeFlags::computed(), "Last time it was updated."),
            )
            .with_attribute(
                "created_at",
                string_attr(AttributeFlags::computed(), "When it was created."),
            )
            .with_attribute(
                "webhook_url",
                string_attr(AttributeFlags::computed(), "Webhook URL assigned by Nango."),
            )
            .with_block("credentials", NestedBlock::single(credentials_block(true)));

        Schema::v0()
            .with_description("All integrations of the configured Nango environment.")
            .with_block("integrations", NestedBlock::list(item))
    }

    fn type_name(&self) -> &'static str {
        DATA_SOURCE_TYPE
    }

    async fn read(&self, _config: Value) -> Result<Value, ProviderError> {
        let integrations = self.list().await?;
        Ok(json!({ "integrations": integrations }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientConfig, RetryPolicy};
    use crate::validation::validate;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn data_source(server: &MockServer) -> IntegrationsDataSource {
        let config = ClientConfig::default().with_retry(RetryPolicy::disabled());
        IntegrationsDataSource::new(NangoClient::new(&server.uri(), "env-key", &config).unwrap())
    }

    #[tokio::test]
    async fn test_two_items_in_order_without_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/integrations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {
                        "unique_key": "slack-prod",
                        "display_name": "Slack",
                        "provider": "slack",
                        "updated_at": "2024-02-01T00:00:00.000Z"
                    },
                    {
                        "unique_key": "gh1",
                        "display_name": "GitHub",
                        "provider": "github",
                        "updated_at": "2024-01-01T00:00:00.000Z",
                        "credentials": {"client_id": "leaked?"}
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let state = data_source(&server).read(Value::Null).await.unwrap();
        let items = state["integrations"].as_array().unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["unique_key"], "slack-prod");
        assert_eq!(items[0]["provider_type"], "slack");
        assert_eq!(items[1]["unique_key"], "gh1");
        assert!(items.iter().all(|item| item["credentials"].is_null()));
    }

    #[tokio::test]
    async fn test_empty_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/integrations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let state = data_source(&server).read(json!({})).await.unwrap();
        assert_eq!(state, json!({"integrations": []}));
    }

    #[tokio::test]
    async fn test_list_errors_are_distinct() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/integrations"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data": "nope"}"#))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/integrations"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let source = data_source(&server);
        let decode = source.read(Value::Null).await.unwrap_err();
        let denied = source.read(Value::Null).await.unwrap_err();

        assert!(matches!(decode, ProviderError::Decode(_)));
        assert!(matches!(denied, ProviderError::PermissionDenied(_)));
        assert_ne!(decode.to_diagnostic().summary, denied.to_diagnostic().summary);
    }

    #[test]
    fn test_schema_accepts_empty_config() {
        assert!(validate(&IntegrationsDataSource::schema(), &json!({})).is_empty());
    }
}
