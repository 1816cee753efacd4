//! The `nango_integration` resource.

use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use url::Url;

use super::model::{Envelope, Integration, IntegrationResponse};
use super::{credentials_block, string_attr, INTEGRATIONS_PATH, RESOURCE_TYPE};
use crate::client::{ApiResponse, NangoClient, OperationContext};
use crate::error::ProviderError;
use crate::resource::Resource;
use crate::schema::{AttributeFlags, NestedBlock, Schema};

const CREATE: &str = "Unable to Create Integration";
const FETCH: &str = "Unable to Get Integration";
const READ: &str = "Unable to Read Integration";
const UPDATE: &str = "Unable to Update Integration";
const DELETE: &str = "Unable to Delete Integration";

/// Lifecycle controller for Nango integrations.
#[derive(Debug, Clone)]
pub struct IntegrationResource {
    client: NangoClient,
}

impl IntegrationResource {
    /// Create a controller using `client`.
    pub fn new(client: NangoClient) -> Self {
        Self { client }
    }

    fn integration_url(&self, unique_key: &str, operation: &str) -> Result<Url, ProviderError> {
        self.client
            .endpoint(&[INTEGRATIONS_PATH, unique_key])
            .during(operation)
    }

    /// `GET /integrations/{unique_key}` with webhook and credentials included.
    async fn fetch(&self, unique_key: &str, operation: &str) -> Result<IntegrationResponse, ProviderError> {
        let mut url = self.integration_url(unique_key, operation)?;
        url.query_pairs_mut()
            .append_pair("include", "webhook")
            .append_pair("include", "credentials");

        let response = self
            .client
            .get(url)
            .await
            .and_then(ApiResponse::error_for_status)
            .during(operation)?;

        let envelope: Envelope<IntegrationResponse> = response.json().during(operation)?;
        Ok(envelope.into_inner())
    }

    /// POST the integration, then fetch it back for the server-computed fields.
    #[instrument(skip_all, fields(unique_key = %plan.unique_key))]
    pub async fn create_integration(&self, mut plan: Integration) -> Result<Integration, ProviderError> {
        let request = plan.to_create_request()?;
        let url = self.client.endpoint(&[INTEGRATIONS_PATH]).during(CREATE)?;
        self.client
            .post(url, &request)
            .await
            .and_then(ApiResponse::error_for_status)
            .during(CREATE)?;

        let fetched = self.fetch(&plan.unique_key, FETCH).await?;
        plan.apply_timestamps(&fetched);
        if plan.updated_at.is_none() {
            warn!("Nango returned no updated_at for the new integration");
        }

        info!(provider = %plan.provider_type, "Created integration");
        Ok(plan)
    }

    /// Refresh `state` from the API. A 404 surfaces as [`ProviderError::NotFound`].
    #[instrument(skip_all, fields(unique_key = %state.unique_key))]
    pub async fn read_integration(&self, mut state: Integration) -> Result<Integration, ProviderError> {
        let fetched = self.fetch(&state.unique_key, READ).await?;
        state.reconcile(fetched);
        Ok(state)
    }

    /// PATCH the integration. `provider` is never sent.
    #[instrument(skip_all, fields(unique_key = %plan.unique_key))]
    pub async fn update_integration(&self, mut plan: Integration) -> Result<Integration, ProviderError> {
        let request = plan.to_update_request()?;
        let url = self.integration_url(&plan.unique_key, UPDATE)?;
        let response = self
            .client
            .patch(url, &request)
            .await
            .and_then(ApiResponse::error_for_status)
            .during(UPDATE)?;

        let updated = if response.body.is_empty() {
            IntegrationResponse::default()
        } else {
            response
                .json::<Envelope<IntegrationResponse>>()
                .during(UPDATE)?
                .into_inner()
        };

        if let Some(display_name) = updated.display_name.filter(|name| !name.is_empty()) {
            plan.display_name = display_name;
        }
        match updated.updated_at.filter(|at| !at.is_empty()) {
            Some(updated_at) => plan.updated_at = Some(updated_at),
            None => {
                let now = chrono::Utc::now().to_rfc3339();
                warn!(updated_at = %now, "Nango returned no updated_at, using local time");
                plan.updated_at = Some(now);
            },
        }

        info!("Updated integration");
        Ok(plan)
    }

    /// DELETE the integration. Any non-2xx response, 404 included, is an error.
    #[instrument(skip(self))]
    pub async fn delete_integration(&self, unique_key: &str) -> Result<(), ProviderError> {
        let url = self.integration_url(unique_key, DELETE)?;
        self.client
            .delete(url)
            .await
            .and_then(ApiResponse::error_for_status)
            .during(DELETE)?;

        info!("Deleted integration");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Resource for IntegrationResource {
    fn schema() -> Schema {
        Schema::v0()
            .with_description("A Nango integration: an OAuth app registered with an upstream provider.")
            .with_attribute(
                "unique_key",
                string_attr(
                    AttributeFlags::required(),
                    "The integration ID that you created in Nango.",
                )
                .with_force_new(),
            )
            .with_attribute(
                "display_name",
                string_attr(AttributeFlags::required(), "The provider display name."),
            )
            .with_attribute(
                "provider_type",
                string_attr(
                    AttributeFlags::required(),
                    "The upstream provider, for example `github`.",
                )
                .with_force_new(),
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
            .with_block(
                "credentials",
                NestedBlock::single(credentials_block(false)).with_min_items(1),
            )
    }

    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(&self, planned_state: Value) -> Result<Value, ProviderError> {
        let plan: Integration = serde_json::from_value(planned_state)?;
        let state = self.create_integration(plan).await?;
        Ok(serde_json::to_value(state)?)
    }

    async fn read(&self, current_state: Value) -> Result<Value, ProviderError> {
        let state: Integration = serde_json::from_value(current_state)?;
        let state = self.read_integration(state).await?;
        Ok(serde_json::to_value(state)?)
    }

    async fn update(&self, _prior_state: Value, planned_state: Value) -> Result<Value, ProviderError> {
        let plan: Integration = serde_json::from_value(planned_state)?;
        let state = self.update_integration(plan).await?;
        Ok(serde_json::to_value(state)?)
    }

    async fn delete(&self, current_state: Value) -> Result<(), ProviderError> {
        let state: Integration = serde_json::from_value(current_state)?;
        self.delete_integration(&state.unique_key).await
    }

    async fn import(&self, id: &str) -> Result<Value, ProviderError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "Import ID must be the integration's unique_key".to_string(),
            ));
        }
        Ok(json!({ "unique_key": id }))
    }
}
