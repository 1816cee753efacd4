//! Provider configuration.
//!
//! The host's configure payload is deserialized into [`ProviderConfig`] and
//! then resolved against the process environment:
//!
//! | Setting | Payload key | Environment | Default |
//! |---|---|---|---|
//! | API key | `environment_key` | `NANGO_ENVIRONMENT_KEY` | required |
//! | Base URL | `host` | `NANGO_HOST` | `https://api.nango.dev` |
//! | Body logging | `log_http_bodies` | | `false` |

use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::client::{normalize_base_url, ClientConfig};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

/// Environment variable holding the Nango environment key.
pub const ENV_ENVIRONMENT_KEY: &str = "NANGO_ENVIRONMENT_KEY";

/// Environment variable overriding the API host.
pub const ENV_HOST: &str = "NANGO_HOST";

/// API host used when none is configured.
pub const DEFAULT_HOST: &str = "https://api.nango.dev";

/// Raw provider configuration as sent by the host.
///
/// Absent and `null` values are treated the same.
#[derive(Clone, Default, Deserialize)]
pub struct ProviderConfig {
    /// Secret key of the Nango environment.
    #[serde(default)]
    pub environment_key: Option<String>,
    /// Base URL of the Nango API.
    #[serde(default)]
    pub host: Option<String>,
    /// Log HTTP bodies (secrets redacted).
    #[serde(default)]
    pub log_http_bodies: Option<bool>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field(
                "environment_key",
                &self.environment_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("host", &self.host)
            .field("log_http_bodies", &self.log_http_bodies)
            .finish()
    }
}

/// Fully resolved settings used to build the client.
#[derive(Clone)]
pub struct ResolvedConfig {
    /// Bearer credential.
    pub environment_key: String,
    /// Normalized base URL.
    pub host: Url,
    /// Body logging switch.
    pub log_http_bodies: bool,
}

impl fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("environment_key", &"[REDACTED]")
            .field("host", &self.host.as_str())
            .field("log_http_bodies", &self.log_http_bodies)
            .finish()
    }
}

impl ResolvedConfig {
    /// Apply this configuration's client settings on top of `base`.
    pub fn client_config(&self, base: ClientConfig) -> ClientConfig {
        base.with_body_logging(self.log_http_bodies)
    }
}

impl ProviderConfig {
    /// Schema of the configure payload.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Connects to a Nango environment.")
            .with_attribute(
                "environment_key",
                Attribute::optional_string()
                    .sensitive()
                    .with_description(format!(
                        "Secret key of the Nango environment. Falls back to `{}`.",
                        ENV_ENVIRONMENT_KEY
                    )),
            )
            .with_attribute(
                "host",
                Attribute::optional_string().with_description(format!(
                    "Base URL for the Nango API. Defaults to `{}`. Can also be set via `{}`.",
                    DEFAULT_HOST, ENV_HOST
                )),
            )
            .with_attribute(
                "log_http_bodies",
                Attribute::optional_bool()
                    .with_description("Log request and response bodies at debug level."),
            )
    }

    /// Deserialize the host's configure payload. `null` means no settings.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|e| ProviderError::Configuration(format!("Invalid provider configuration: {}", e)))
    }

    /// Resolve against the process environment.
    pub fn resolve(&self) -> Result<ResolvedConfig, ProviderError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve against a custom environment lookup.
    ///
    /// An explicit `environment_key` wins over the environment, even when
    /// empty. An empty `host` falls back to the default.
    pub fn resolve_with<F>(&self, env: F) -> Result<ResolvedConfig, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment_key = match &self.environment_key {
            Some(key) => key.clone(),
            None => env(ENV_ENVIRONMENT_KEY).unwrap_or_default(),
        };
        if environment_key.trim().is_empty() {
            return Err(ProviderError::Configuration(format!(
                "Unable to find environment key: set `environment_key` or {}",
                ENV_ENVIRONMENT_KEY
            )));
        }

        let host = match &self.host {
            Some(host) => host.clone(),
            None => env(ENV_HOST).unwrap_or_default(),
        };
        let host = if host.trim().is_empty() {
            DEFAULT_HOST.to_string()
        } else {
            host
        };
        let host = normalize_base_url(&host).map_err(|e| {
            ProviderError::Configuration(format!("Invalid host '{}': {}", host, e))
        })?;

        Ok(ResolvedConfig {
            environment_key,
            host,
            log_http_bodies: self.log_http_bodies.unwrap_or(false),
        })
    }
}
