//! Capability interfaces for resources and data sources.
//!
//! A [`NangoProvider`](crate::NangoProvider) builds one instance of each
//! type in `configure`, injecting the shared client, and dispatches host
//! calls to it by type name.

use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::Schema;

/// A managed resource type.
#[async_trait::async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Schema of this resource type.
    fn schema() -> Schema
    where
        Self: Sized;

    /// Type name, for example `nango_integration`.
    fn type_name(&self) -> &'static str;

    /// Create the remote object and return the new state.
    async fn create(&self, planned_state: Value) -> Result<Value, ProviderError>;

    /// Refresh state from the remote object.
    async fn read(&self, current_state: Value) -> Result<Value, ProviderError>;

    /// Apply in-place changes and return the new state.
    async fn update(&self, prior_state: Value, planned_state: Value) -> Result<Value, ProviderError>;

    /// Delete the remote object.
    async fn delete(&self, current_state: Value) -> Result<(), ProviderError>;

    /// Seed state for an existing remote object.
    async fn import(&self, id: &str) -> Result<Value, ProviderError>;
}

/// A read-only data source type.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Schema of this data source type.
    fn schema() -> Schema
    where
        Self: Sized;

    /// Type name, for example `nango_integrations`.
    fn type_name(&self) -> &'static str;

    /// Read the data source.
    async fn read(&self, config: Value) -> Result<Value, ProviderError>;
}
