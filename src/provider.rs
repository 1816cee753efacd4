//! The Nango provider: configuration, dispatch and validation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::client::{ClientConfig, NangoClient};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::integration::{
    IntegrationResource, IntegrationsDataSource, DATA_SOURCE_TYPE, RESOURCE_TYPE,
};
use crate::plan::plan_resource;
use crate::resource::{DataSource, Resource};
use crate::schema::{has_errors, Diagnostic, ProviderSchema, Schema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use crate::validation::validate;

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Instances built by `configure`, all sharing one client.
struct Configured {
    resources: HashMap<&'static str, Arc<dyn Resource>>,
    data_sources: HashMap<&'static str, Arc<dyn DataSource>>,
}

impl Configured {
    fn new(client: NangoClient) -> Self {
        let resources: Vec<Arc<dyn Resource>> =
            vec![Arc::new(IntegrationResource::new(client.clone()))];
        let data_sources: Vec<Arc<dyn DataSource>> =
            vec![Arc::new(IntegrationsDataSource::new(client))];

        Self {
            resources: resources.into_iter().map(|r| (r.type_name(), r)).collect(),
            data_sources: data_sources
                .into_iter()
                .map(|d| (d.type_name(), d))
                .collect(),
        }
    }
}

/// Provider for managing Nango integrations.
///
/// Unusable until [`configure`](ProviderService::configure) succeeds.
pub struct NangoProvider {
    env: EnvLookup,
    client_config: ClientConfig,
    configured: RwLock<Option<Configured>>,
}

impl NangoProvider {
    /// Provider type name.
    pub const TYPE_NAME: &'static str = "nango";

    /// Create a provider reading fallbacks from the process environment.
    pub fn new() -> Self {
        Self::with_env(|name| std::env::var(name).ok())
    }

    /// Create a provider with a custom environment lookup.
    pub fn with_env<F>(env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            env: Arc::new(env),
            client_config: ClientConfig::default(),
            configured: RwLock::new(None),
        }
    }

    /// Override the client settings used by `configure`.
    #[must_use]
    pub fn with_client_config(mut self, client_config: ClientConfig) -> Self {
        self.client_config = client_config;
        self
    }

    fn resource_schema(resource_type: &str) -> Result<Schema, ProviderError> {
        match resource_type {
            RESOURCE_TYPE => Ok(IntegrationResource::schema()),
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }

    fn data_source_schema(data_source_type: &str) -> Result<Schema, ProviderError> {
        match data_source_type {
            DATA_SOURCE_TYPE => Ok(IntegrationsDataSource::schema()),
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }

    async fn resource(&self, resource_type: &str) -> Result<Arc<dyn Resource>, ProviderError> {
        Self::resource_schema(resource_type)?;
        let configured = self.configured.read().await;
        let configured = configured.as_ref().ok_or_else(not_configured)?;
        configured
            .resources
            .get(resource_type)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    async fn data_source(&self, data_source_type: &str) -> Result<Arc<dyn DataSource>, ProviderError> {
        Self::data_source_schema(data_source_type)?;
        let configured = self.configured.read().await;
        let configured = configured.as_ref().ok_or_else(not_configured)?;
        configured
            .data_sources
            .get(data_source_type)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))
    }

    /// Reject planned states that do not match the resource schema.
    fn check_planned(resource_type: &str, planned_state: &Value) -> Result<(), ProviderError> {
        let diagnostics = validate(&Self::resource_schema(resource_type)?, planned_state);
        if !has_errors(&diagnostics) {
            return Ok(());
        }
        let summary = diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| d.summary.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Err(ProviderError::Validation(summary))
    }
}

impl Default for NangoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NangoProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NangoProvider")
            .field("client_config", &self.client_config)
            .finish_non_exhaustive()
    }
}

fn not_configured() -> ProviderError {
    ProviderError::FailedPrecondition("Provider has not been configured".to_string())
}

#[async_trait::async_trait]
impl ProviderService for NangoProvider {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(ProviderConfig::schema())
            .with_resource(RESOURCE_TYPE, IntegrationResource::schema())
            .with_data_source(DATA_SOURCE_TYPE, IntegrationsDataSource::schema())
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&ProviderConfig::schema(), &config);
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }
        if let Err(err) = ProviderConfig::from_value(config).and_then(|c| c.resolve_with(&*self.env)) {
            diagnostics.push(err.to_diagnostic());
        }
        Ok(diagnostics)
    }

    #[instrument(skip_all)]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = validate(&ProviderConfig::schema(), &config);
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }

        let resolved = match ProviderConfig::from_value(config).and_then(|c| c.resolve_with(&*self.env)) {
            Ok(resolved) => resolved,
            Err(err) => return Ok(vec![err.to_diagnostic()]),
        };

        let client_config = resolved.client_config(self.client_config.clone());
        let client = match NangoClient::new(
            resolved.host.as_str(),
            &resolved.environment_key,
            &client_config,
        ) {
            Ok(client) => client,
            Err(err) => {
                return Ok(vec![err
                    .into_provider_error("Unable to Create Nango Client")
                    .to_diagnostic()])
            },
        };

        *self.configured.write().await = Some(Configured::new(client));
        info!(
            host = %resolved.host,
            log_http_bodies = resolved.log_http_bodies,
            "Configured Nango provider"
        );
        Ok(diagnostics)
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        if self.configured.write().await.take().is_some() {
            debug!("Released Nango client");
        }
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&Self::resource_schema(resource_type)?, &config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = Self::resource_schema(resource_type)?;
        Ok(plan_resource(&schema, prior_state.as_ref(), proposed_state))
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type).await?;
        Self::check_planned(resource_type, &planned_state)?;
        resource.create(planned_state).await
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        self.resource(resource_type).await?.read(current_state).await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type).await?;
        Self::check_planned(resource_type, &planned_state)?;
        resource.update(prior_state, planned_state).await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.resource(resource_type).await?.delete(current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type).await?;
        let state = resource.import(id).await?;
        Ok(vec![ImportedResource::new(resource.type_name(), state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&Self::data_source_schema(data_source_type)?, &config))
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.data_source(data_source_type).await?.read(config).await
    }
}
