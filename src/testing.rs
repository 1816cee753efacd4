//! Test harness for [`ProviderService`] implementations.
//!
//! [`ProviderTester`] drives a provider the way an orchestration host would,
//! without any transport in between. Pair it with a `wiremock` server
//! standing in for the Nango API:
//!
//! ```no_run
//! use hemmer_provider_nango::testing::ProviderTester;
//! use hemmer_provider_nango::NangoProvider;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let tester = ProviderTester::new(NangoProvider::with_env(|_| None));
//! tester
//!     .configure(json!({"environment_key": "test", "host": "http://127.0.0.1:3003"}))
//!     .await?;
//!
//! let state = tester.read_data_source("nango_integrations", json!({})).await?;
//! println!("{}", state["integrations"]);
//! # Ok(())
//! # }
//! ```

use serde_json::Value;
use thiserror::Error;

use crate::error::ProviderError;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// Drives a [`ProviderService`] through host-style calls.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Wrap `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The provider's full schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Resource type names, sorted.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Data source type names, sorted.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration, failing on error diagnostics.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        error_diagnostics(self.provider.validate_provider_config(config).await?)
    }

    /// Configure the provider, failing on error diagnostics.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        error_diagnostics(self.provider.configure(config).await?)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration, failing on error diagnostics.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        error_diagnostics(
            self.provider
                .validate_resource_config(resource_type, config)
                .await?,
        )
    }

    /// Plan a creation: no prior state.
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a change from `prior_state` to `proposed_state`.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a destroy.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a resource.
    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read a resource.
    pub async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update a resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Upgrade stored state from schema `version`.
    pub async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .upgrade_resource_state(resource_type, version, state)
            .await
    }

    /// Import a resource by ID.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source configuration, failing on error diagnostics.
    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        error_diagnostics(
            self.provider
                .validate_data_source_config(data_source_type, config)
                .await?,
        )
    }

    /// Read a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// plan → create → read. Returns the state after read.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created).await
    }

    /// plan → update → read. Returns the state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        if plan.requires_replace {
            return Err(ProviderError::InvalidRequest(
                "Planned change requires replacement, not an in-place update".to_string(),
            ));
        }
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        self.read(resource_type, updated).await
    }

    /// plan destroy → delete.
    pub async fn lifecycle_delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.plan_delete(resource_type, current_state.clone()).await?;
        self.delete(resource_type, current_state).await
    }

    /// import → read. Returns the refreshed state of the first imported object.
    pub async fn lifecycle_import(&self, resource_type: &str, id: &str) -> Result<Value, ProviderError> {
        let imported = self
            .import_resource(resource_type, id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound(format!("Nothing imported for '{}'", id)))?;
        self.read(&imported.resource_type, imported.state).await
    }

    /// create → update → delete, each with its plan and refresh.
    ///
    /// Returns the state after the update, before the delete.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created = self.lifecycle_create(resource_type, initial_config).await?;
        let updated = self
            .lifecycle_update(resource_type, created, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated.clone()).await?;
        Ok(updated)
    }
}

/// Failure of a diagnostics-returning operation.
#[derive(Debug, Error)]
pub enum TestError {
    /// The operation reported error diagnostics.
    #[error("operation failed with {}", render_diagnostics(.0))]
    Diagnostics(Vec<Diagnostic>),

    /// The operation itself failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| {
            let mut line = d.summary.clone();
            if let Some(detail) = &d.detail {
                line.push_str(": ");
                line.push_str(detail);
            }
            if let Some(attribute) = &d.attribute {
                line.push_str(&format!(" (at {})", attribute));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn error_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<Diagnostic> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

fn changed_paths(plan: &PlanResult) -> Vec<&str> {
    plan.changes.iter().map(|c| c.path.as_str()).collect()
}

/// Assert the plan creates something without replacing.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(!plan.changes.is_empty(), "Expected a create plan, got no changes");
    assert!(!plan.requires_replace, "Expected a create plan, got a replacement");
}

/// Assert the plan has no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, got {:?}",
        changed_paths(plan)
    );
}

/// Assert the plan requires replacement.
///
/// # Panics
///
/// Panics if the plan updates in place.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected a replacement, changes were {:?}",
        changed_paths(plan)
    );
}

/// Assert the plan updates in place.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected an in-place update, got a replacement"
    );
}

/// Assert the plan changes `path`.
///
/// # Panics
///
/// Panics if `path` is not among the changes.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected '{}' to change, changed: {:?}",
        path,
        changed_paths(plan)
    );
}

/// Assert the diagnostics hold no errors.
///
/// # Panics
///
/// Panics on any error diagnostic.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<&str> = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.summary.as_str())
        .collect();
    assert!(errors.is_empty(), "Expected no errors, got {:?}", errors);
}

/// Assert some error diagnostic's summary contains `substring`.
///
/// # Panics
///
/// Panics if none does.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    assert!(
        diagnostics
            .iter()
            .any(|d| d.is_error() && d.summary.contains(substring)),
        "Expected an error containing '{}', got {:?}",
        substring,
        diagnostics.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert some error diagnostic points at `attribute`.
///
/// # Panics
///
/// Panics if none does.
pub fn assert_error_at(diagnostics: &[Diagnostic], attribute: &str) {
    assert!(
        diagnostics
            .iter()
            .any(|d| d.is_error() && d.attribute.as_deref() == Some(attribute)),
        "Expected an error at '{}', got {:?}",
        attribute,
        diagnostics.iter().map(|d| &d.attribute).collect::<Vec<_>>()
    );
}
