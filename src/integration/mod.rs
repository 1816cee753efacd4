//! The Nango integration entity: the `nango_integration` resource and the
//! `nango_integrations` data source.

mod data_source;
mod model;
mod resource;

pub use data_source::IntegrationsDataSource;
pub use model::{
    flatten_scopes, unflatten_scopes, CreateIntegrationRequest, Credentials, CredentialsResponse,
    Envelope, Integration, IntegrationResponse, UpdateIntegrationRequest, WireCredentials,
    WireScopes,
};
pub use resource::IntegrationResource;

use crate::schema::{Attribute, AttributeFlags, AttributeType, Block};

/// Resource type name.
pub const RESOURCE_TYPE: &str = "nango_integration";

/// Data source type name.
pub const DATA_SOURCE_TYPE: &str = "nango_integrations";

const INTEGRATIONS_PATH: &str = "integrations";

fn string_attr(flags: AttributeFlags, description: &str) -> Attribute {
    Attribute::new(AttributeType::String, flags).with_description(description)
}

/// Attributes of the `credentials` block. All computed for list reads.
fn credentials_block(computed: bool) -> Block {
    let required = if computed {
        AttributeFlags::computed()
    } else {
        AttributeFlags::required()
    };
    let optional = if computed {
        AttributeFlags::computed()
    } else {
        AttributeFlags::optional()
    };

    Block::new()
        .with_description("OAuth client credentials for this integration.")
        .with_attribute("client_id", string_attr(required, "The client ID."))
        .with_attribute(
            "client_secret",
            string_attr(required, "The client secret.").sensitive(),
        )
        .with_attribute("type", string_attr(required, "The type of credential."))
        .with_attribute(
            "scopes",
            Attribute::new(AttributeType::list(AttributeType::String), optional)
                .with_description("The scopes for this credential."),
        )
}
