//! Integration state and its wire representation.
//!
//! The declarative state is [`Integration`]. Requests and responses use the
//! Nango JSON shapes, where the upstream system is called `provider` and
//! scopes travel as one comma-joined string.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Declarative state of a `nango_integration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    /// Client-chosen identity, also the import ID.
    pub unique_key: String,
    /// Human-readable label.
    #[serde(default)]
    pub display_name: String,
    /// Upstream system (for example `github`). Fixed at creation.
    #[serde(default)]
    pub provider_type: String,
    /// Server timestamp of the last change.
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Server timestamp of creation.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Webhook URL assigned by Nango.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// OAuth client credentials. Never populated by list reads.
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

/// OAuth client credentials of an integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// OAuth client ID.
    #[serde(default)]
    pub client_id: String,
    /// OAuth client secret.
    #[serde(default)]
    pub client_secret: String,
    /// Credential kind, for example `OAUTH2`.
    #[serde(rename = "type", default)]
    pub credential_type: String,
    /// Requested scopes, in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

/// Credentials as sent to the API.
#[derive(Debug, Serialize)]
pub struct WireCredentials<'a> {
    /// OAuth client ID.
    pub client_id: &'a str,
    /// OAuth client secret.
    pub client_secret: &'a str,
    /// Credential kind.
    #[serde(rename = "type")]
    pub credential_type: &'a str,
    /// Comma-joined scopes.
    pub scopes: String,
}

/// Body of `POST /integrations`.
#[derive(Debug, Serialize)]
pub struct CreateIntegrationRequest<'a> {
    /// Integration identity.
    pub unique_key: &'a str,
    /// Human-readable label.
    pub display_name: &'a str,
    /// Upstream system name.
    pub provider: &'a str,
    /// Full credentials block.
    pub credentials: WireCredentials<'a>,
}

/// Body of `PATCH /integrations/{unique_key}`. The upstream provider cannot
/// change, so it is not sent.
#[derive(Debug, Serialize)]
pub struct UpdateIntegrationRequest<'a> {
    /// Integration identity.
    pub unique_key: &'a str,
    /// Human-readable label.
    pub display_name: &'a str,
    /// Full credentials block.
    pub credentials: WireCredentials<'a>,
}

/// An integration as returned by the API. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntegrationResponse {
    /// Integration identity.
    #[serde(default)]
    pub unique_key: Option<String>,
    /// Human-readable label.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Upstream system name.
    #[serde(default)]
    pub provider: Option<String>,
    /// Last change timestamp.
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Webhook URL, with `include=webhook`.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Credentials, with `include=credentials`.
    #[serde(default)]
    pub credentials: Option<CredentialsResponse>,
}

/// Credentials as returned with `include=credentials`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsResponse {
    /// OAuth client ID.
    #[serde(default)]
    pub client_id: Option<String>,
    /// OAuth client secret.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Credential kind.
    #[serde(rename = "type", default)]
    pub credential_type: Option<String>,
    /// Scopes in either wire form.
    #[serde(default)]
    pub scopes: Option<WireScopes>,
}

/// Scopes come back joined, but some API versions send an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireScopes {
    /// `"a,b"`
    Joined(String),
    /// `["a", "b"]`
    List(Vec<String>),
}

impl WireScopes {
    fn into_list(self) -> Vec<String> {
        match self {
            Self::Joined(joined) => unflatten_scopes(&joined),
            Self::List(list) => list
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

/// Response body that may or may not be wrapped in `{"data": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    /// `{"data": ...}`
    Wrapped {
        /// The payload.
        data: T,
    },
    /// The payload itself.
    Bare(T),
}

impl<T> Envelope<T> {
    /// The payload, unwrapped.
    pub fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

/// Join scopes into the wire form. An empty list becomes `""`.
pub fn flatten_scopes(scopes: &[String]) -> String {
    scopes.join(",")
}

/// Split the wire form into scopes, trimming blanks and dropping empty items.
pub fn unflatten_scopes(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn carried(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl Credentials {
    fn to_wire(&self) -> WireCredentials<'_> {
        WireCredentials {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            credential_type: &self.credential_type,
            scopes: flatten_scopes(self.scopes.as_deref().unwrap_or_default()),
        }
    }

    fn from_response(wire: CredentialsResponse) -> Self {
        let scopes = wire
            .scopes
            .map(WireScopes::into_list)
            .filter(|scopes| !scopes.is_empty());
        Self {
            client_id: wire.client_id.unwrap_or_default(),
            client_secret: wire.client_secret.unwrap_or_default(),
            credential_type: wire.credential_type.unwrap_or_default(),
            scopes,
        }
    }

    /// Overwrite every field the response carries.
    fn reconcile(&mut self, wire: CredentialsResponse) {
        if let Some(client_id) = carried(wire.client_id) {
            self.client_id = client_id;
        }
        if let Some(client_secret) = carried(wire.client_secret) {
            self.client_secret = client_secret;
        }
        if let Some(credential_type) = carried(wire.credential_type) {
            self.credential_type = credential_type;
        }
        if let Some(scopes) = wire.scopes.map(WireScopes::into_list) {
            // An unset list and an empty list are the same remotely.
            if !scopes.is_empty() || self.scopes.is_some() {
                self.scopes = Some(scopes);
            }
        }
    }
}

impl Integration {
    /// State seeded from an import ID.
    pub fn imported(unique_key: impl Into<String>) -> Self {
        Self {
            unique_key: unique_key.into(),
            display_name: String::new(),
            provider_type: String::new(),
            updated_at: None,
            created_at: None,
            webhook_url: None,
            credentials: None,
        }
    }

    fn credentials(&self) -> Result<&Credentials, ProviderError> {
        self.credentials.as_ref().ok_or_else(|| {
            ProviderError::Validation(format!(
                "Integration '{}' requires a credentials block",
                self.unique_key
            ))
        })
    }

    /// Payload for creating this integration.
    pub fn to_create_request(&self) -> Result<CreateIntegrationRequest<'_>, ProviderError> {
        Ok(CreateIntegrationRequest {
            unique_key: &self.unique_key,
            display_name: &self.display_name,
            provider: &self.provider_type,
            credentials: self.credentials()?.to_wire(),
        })
    }

    /// Payload for updating this integration.
    pub fn to_update_request(&self) -> Result<UpdateIntegrationRequest<'_>, ProviderError> {
        Ok(UpdateIntegrationRequest {
            unique_key: &self.unique_key,
            display_name: &self.display_name,
            credentials: self.credentials()?.to_wire(),
        })
    }

    /// Build state from an API response. Credentials are set only when present.
    pub fn from_response(wire: IntegrationResponse) -> Self {
        Self {
            unique_key: wire.unique_key.unwrap_or_default(),
            display_name: wire.display_name.unwrap_or_default(),
            provider_type: wire.provider.unwrap_or_default(),
            updated_at: carried(wire.updated_at),
            created_at: carried(wire.created_at),
            webhook_url: carried(wire.webhook_url),
            credentials: wire.credentials.map(Credentials::from_response),
        }
    }

    /// Build a list item. List reads never expose credentials.
    pub fn listed(wire: IntegrationResponse) -> Self {
        Self {
            credentials: None,
            ..Self::from_response(wire)
        }
    }

    /// Overwrite every attribute the response carries, empty strings included.
    /// `unique_key` is kept.
    pub fn reconcile(&mut self, wire: IntegrationResponse) {
        self.apply_timestamps(&wire);

        if let Some(display_name) = wire.display_name {
            self.display_name = display_name;
        }
        if let Some(provider) = wire.provider {
            self.provider_type = provider;
        }

        if let Some(credentials) = wire.credentials {
            match &mut self.credentials {
                Some(existing) => existing.reconcile(credentials),
                None => self.credentials = Some(Credentials::from_response(credentials)),
            }
        }
    }

    /// Copy the server-computed attributes present in `wire`.
    pub fn apply_timestamps(&mut self, wire: &IntegrationResponse) {
        if let Some(updated_at) = carried(wire.updated_at.clone()) {
            self.updated_at = Some(updated_at);
        }
        if let Some(created_at) = carried(wire.created_at.clone()) {
            self.created_at = Some(created_at);
        }
        if let Some(webhook_url) = carried(wire.webhook_url.clone()) {
            self.webhook_url = Some(webhook_url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn github() -> Integration {
        serde_json::from_value(json!({
            "unique_key": "gh1",
            "display_name": "GitHub",
            "provider_type": "github",
            "credentials": {
                "client_id": "cid",
                "client_secret": "csecret",
                "type": "OAUTH2",
                "scopes": ["repo", "user"]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_scope_flattening() {
        assert_eq!(flatten_scopes(&["a".into(), "b".into()]), "a,b");
        assert_eq!(flatten_scopes(&[]), "");
        assert_eq!(unflatten_scopes("a,b"), vec!["a", "b"]);
        assert!(unflatten_scopes("").is_empty());
        assert_eq!(unflatten_scopes(" a , ,b,"), vec!["a", "b"]);
    }

    #[test]
    fn test_create_request_shape() {
        let plan = github();
        let body = serde_json::to_value(plan.to_create_request().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "unique_key": "gh1",
                "display_name": "GitHub",
                "provider": "github",
                "credentials": {
                    "client_id": "cid",
                    "client_secret": "csecret",
                    "type": "OAUTH2",
                    "scopes": "repo,user"
                }
            })
        );
    }

    #[test]
    fn test_update_request_omits_provider() {
        let plan = github();
        let body = serde_json::to_value(plan.to_update_request().unwrap()).unwrap();
        assert!(body.get("provider").is_none());
        assert_eq!(body["unique_key"], "gh1");
        assert_eq!(body["credentials"]["scopes"], "repo,user");
    }

    #[test]
    fn test_absent_scopes_send_empty_string() {
        let mut plan = github();
        if let Some(credentials) = plan.credentials.as_mut() {
            credentials.scopes = None;
        }
        let body = serde_json::to_value(plan.to_create_request().unwrap()).unwrap();
        assert_eq!(body["credentials"]["scopes"], "");
    }

    #[test]
    fn test_missing_credentials_is_validation_error() {
        let mut plan = github();
        plan.credentials = None;
        assert!(matches!(
            plan.to_create_request(),
            Err(ProviderError::Validation(_))
        ));
        assert!(matches!(
            plan.to_update_request(),
            Err(ProviderError::Validation(_))
        ));
    }

    #[test]
    fn test_from_response_round_trips_identity() {
        let wire: IntegrationResponse = serde_json::from_value(json!({
            "unique_key": "gh1",
            "display_name": "GitHub",
            "provider": "github",
            "updated_at": "2024-05-01T10:00:00.000Z",
            "logo": "https://nango.dev/logo.svg"
        }))
        .unwrap();
        let state = Integration::from_response(wire);

        assert_eq!(state.unique_key, "gh1");
        assert_eq!(state.display_name, "GitHub");
        assert_eq!(state.provider_type, "github");
        assert_eq!(state.updated_at.as_deref(), Some("2024-05-01T10:00:00.000Z"));
        assert!(state.credentials.is_none());
    }

    #[test]
    fn test_envelope_accepts_wrapped_and_bare() {
        let wrapped: Envelope<IntegrationResponse> =
            serde_json::from_str(r#"{"data":{"unique_key":"gh1"}}"#).unwrap();
        assert_eq!(wrapped.into_inner().unique_key.as_deref(), Some("gh1"));

        let bare: Envelope<IntegrationResponse> =
            serde_json::from_str(r#"{"unique_key":"gh1"}"#).unwrap();
        assert_eq!(bare.into_inner().unique_key.as_deref(), Some("gh1"));

        let list: Envelope<Vec<IntegrationResponse>> =
            serde_json::from_str(r#"{"data":[{"unique_key":"a"},{"unique_key":"b"}]}"#).unwrap();
        assert_eq!(list.into_inner().len(), 2);

        assert!(serde_json::from_str::<Envelope<Vec<IntegrationResponse>>>(r#"{"data":5}"#).is_err());
    }

    #[test]
    fn test_listed_never_has_credentials() {
        let wire: IntegrationResponse = serde_json::from_value(json!({
            "unique_key": "gh1",
            "credentials": {"client_id": "cid"}
        }))
        .unwrap();
        assert!(Integration::listed(wire).credentials.is_none());
    }

    #[test]
    fn test_reconcile_overwrites_carried_fields() {
        let mut state = github();
        let wire: IntegrationResponse = serde_json::from_value(json!({
            "unique_key": "ignored",
            "display_name": "GitHub (prod)",
            "provider": "github",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-05-01T00:00:00Z",
            "webhook_url": "https://api.nango.dev/webhook/abc/github",
            "credentials": {
                "type": "OAUTH2",
                "client_id": "cid2",
                "client_secret": "",
                "scopes": "repo"
            }
        }))
        .unwrap();

        state.reconcile(wire);

        assert_eq!(state.unique_key, "gh1");
        assert_eq!(state.display_name, "GitHub (prod)");
        assert_eq!(state.created_at.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(
            state.webhook_url.as_deref(),
            Some("https://api.nango.dev/webhook/abc/github")
        );
        let credentials = state.credentials.unwrap();
        assert_eq!(credentials.client_id, "cid2");
        assert_eq!(credentials.client_secret, "csecret");
        assert_eq!(credentials.scopes, Some(vec!["repo".to_string()]));
    }

    #[test]
    fn test_reconcile_overwrites_with_empty_display_name() {
        let mut state = github();
        state.display_name = "Stale".to_string();
        let wire: IntegrationResponse = serde_json::from_value(json!({
            "display_name": "",
            "updated_at": "2024-05-01T00:00:00Z"
        }))
        .unwrap();

        state.reconcile(wire);

        assert_eq!(state.display_name, "");
        assert_eq!(state.provider_type, "github");
        assert_eq!(state.updated_at.as_deref(), Some("2024-05-01T00:00:00Z"));
    }

    #[test]
    fn test_reconcile_keeps_unset_scopes_unset() {
        let mut state = github();
        if let Some(credentials) = state.credentials.as_mut() {
            credentials.scopes = None;
        }
        let wire: IntegrationResponse =
            serde_json::from_value(json!({"credentials": {"scopes": ""}})).unwrap();
        state.reconcile(wire);
        assert_eq!(state.credentials.unwrap().scopes, None);
    }

    #[test]
    fn test_wire_scopes_array_form() {
        let wire: IntegrationResponse = serde_json::from_value(json!({
            "credentials": {"scopes": ["repo", " user "]}
        }))
        .unwrap();
        let state = Integration::from_response(wire);
        assert_eq!(
            state.credentials.unwrap().scopes,
            Some(vec!["repo".to_string(), "user".to_string()])
        );
    }

    #[test]
    fn test_state_serializes_computed_as_null() {
        let value = serde_json::to_value(Integration::imported("gh1")).unwrap();
        assert_eq!(value["unique_key"], "gh1");
        assert!(value["updated_at"].is_null());
        assert!(value["credentials"].is_null());
    }
}
