//! Domain models for the token exchange server.

use utoipa::ToSchema;

pub mod access_token;
pub mod api_key;
pub mod user;

// Re-export commonly used types
pub use access_token::{
    AccessClaims, AccessToken, ListTokensResponse, RefreshRequest, RevokeRequest, TokenInfo,
    TokenListItem, TokenRequest, TokenResponse, TokenTypeHint,
};
pub use api_key::{
    ApiKey, ApiKeyCreateResponse, ApiKeyListItem, ApiKeyPolicy, CreateApiKeyRequest,
    ListApiKeysResponse, RegenerateSecretResponse, UpdateApiKeyRequest,
};
pub use user::User;

/// Pagination parameters.
#[derive(Debug, Clone, Default, serde::Deserialize, ToSchema)]
pub struct PaginationParams {
    pub page: Option<u32>,
    #[serde(alias = "per_page")]
    pub limit: Option<u32>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

impl PaginationParams {
    /// One-based page number.
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(default_page()).max(1)
    }

    /// Calculate the offset for database queries.
    pub fn offset(&self) -> u64 {
        u64::from(self.page().saturating_sub(1)) * u64::from(self.clamped_limit())
    }

    /// Clamp limit to maximum allowed value.
    pub fn clamped_limit(&self) -> u32 {
        self.limit.unwrap_or(default_limit()).clamp(1, 100)
    }
}

/// Pagination metadata for responses.
#[derive(Debug, Clone, serde::Serialize, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Pagination {
    /// Create pagination metadata.
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            u32::try_from(total.div_ceil(u64::from(limit.max(1)))).unwrap_or(u32::MAX)
        };

        Pagination {
            page,
            limit,
            total,
            total_pages,
        }
    }
}
