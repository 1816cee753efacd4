//! Hemmer provider for Nango
//!
//! Manages the integrations of a [Nango](https://nango.dev) environment from
//! Hemmer configurations.
//!
//! # Overview
//!
//! - **`nango_integration`**: a resource with create, read, update, delete
//!   and import. Changing `unique_key` or `provider_type` replaces it.
//! - **`nango_integrations`**: a data source listing every integration in
//!   the environment, without credentials.
//! - **HTTP client**: [`NangoClient`] sends bearer-authenticated JSON
//!   requests through a retrying, logging transport stack.
//!
//! # Configuration
//!
//! | Key | Environment | Default |
//! |---|---|---|
//! | `environment_key` | `NANGO_ENVIRONMENT_KEY` | required |
//! | `host` | `NANGO_HOST` | `https://api.nango.dev` |
//! | `log_http_bodies` | | `false` |
//!
//! # Quick Start
//!
//! ```no_run
//! use hemmer_provider_nango::{NangoProvider, ProviderService};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), hemmer_provider_nango::ProviderError> {
//! hemmer_provider_nango::init_logging();
//!
//! let provider = NangoProvider::new();
//! let diagnostics = provider
//!     .configure(json!({"environment_key": "nango-secret"}))
//!     .await?;
//! assert!(diagnostics.is_empty());
//!
//! let created = provider
//!     .create(
//!         "nango_integration",
//!         json!({
//!             "unique_key": "github-prod",
//!             "display_name": "GitHub",
//!             "provider_type": "github",
//!             "credentials": {
//!                 "type": "OAUTH2",
//!                 "client_id": "client-id",
//!                 "client_secret": "client-secret",
//!                 "scopes": ["repo", "read:org"]
//!             }
//!         }),
//!     )
//!     .await?;
//! println!("updated at {}", created["updated_at"]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod integration;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod service;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::{ClientConfig, NangoClient, RetryPolicy};
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::NangoProvider;
pub use schema::ProviderSchema;
pub use service::ProviderService;
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
