//! OpenAPI documentation configuration.

use utoipa::OpenApi;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};

use crate::config::{ADMIN_KEY_HEADER, API_KEY_HEADER, API_SECRET_HEADER};
use crate::{api, auth, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Token Exchange Server",
        version = "0.1.0",
        description = "Exchanges long-lived service credentials for short-lived, scope-limited bearer tokens and authorizes requests against them"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Token endpoints
        api::token::issue_token,
        api::token::refresh_token,
        api::token::revoke_token,
        api::token::token_info,
        api::token::list_tokens,
        // Key management
        api::keys::create_key,
        api::keys::list_keys,
        api::keys::get_key,
        api::keys::regenerate_secret,
        api::keys::update_key,
        api::keys::deactivate_key,
        // Auth
        api::me::me,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            models::Pagination,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            // Tokens
            models::TokenRequest,
            models::RefreshRequest,
            models::RevokeRequest,
            models::TokenTypeHint,
            models::TokenResponse,
            models::TokenInfo,
            models::TokenListItem,
            models::ListTokensResponse,
            api::token::RevokeResponse,
            // Keys
            models::CreateApiKeyRequest,
            models::UpdateApiKeyRequest,
            models::ApiKeyCreateResponse,
            models::ApiKeyListItem,
            models::ListApiKeysResponse,
            models::RegenerateSecretResponse,
            api::keys::DeactivateKeyResponse,
            // Auth
            auth::AuthType,
            api::me::MeResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Tokens", description = "Credential exchange, refresh, revocation and introspection"),
        (name = "Keys", description = "Credential management"),
        (name = "Auth", description = "Authenticated caller")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Add credential, bearer and admin security schemes.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(API_KEY_HEADER))),
            );
            components.add_security_scheme(
                "api_secret",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(API_SECRET_HEADER))),
            );
            components.add_security_scheme(
                "admin_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(ADMIN_KEY_HEADER))),
            );
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
