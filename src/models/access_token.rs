//! Access/refresh token records, signed claims, and token endpoint payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// `type` claim value of access tokens.
pub const ACCESS_TOKEN_TYPE: &str = "access";

/// The only grant this service implements.
pub const CLIENT_CREDENTIALS_GRANT: &str = "client_credentials";

/// One issued access/refresh pair.
///
/// Only hashes of the two bearer strings are stored. After creation only
/// `is_active`, `revoked_at` and the usage telemetry change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub id: Uuid,
    pub token_hash: String,
    pub refresh_token_hash: String,
    pub api_key_id: Uuid,
    pub user_id: Uuid,
    pub scopes: Vec<String>,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_used_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Check if the access half has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Check if the refresh half has expired at `now`.
    pub fn is_refresh_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.refresh_token_expires_at
    }
}

/// Claims embedded in a signed access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Principal id
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_id: Option<String>,
    /// Absent on legacy tokens; the principal's default scopes apply then
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(rename = "type")]
    pub token_type: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token so that two tokens minted in the same second differ
    pub jti: String,
}

impl AccessClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Tokens minted from a credential always have a store record. Without
    /// one they were revoked and purged.
    pub fn is_store_minted(&self) -> bool {
        self.api_key_id.is_some()
    }
}

/// `POST /token` body. Credentials may come from headers instead.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: Option<String>,
    /// Space or comma separated scopes
    #[serde(default)]
    pub scope: Option<String>,
    /// Requested access token lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default, alias = "client_id")]
    pub access_key: Option<String>,
    #[serde(default, alias = "client_secret")]
    pub secret_key: Option<String>,
}

/// `POST /refresh` body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Which half of a pair a revocation request names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
    /// Unrecognized hints are ignored
    #[serde(other)]
    Other,
}

/// `POST /revoke` body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeRequest {
    pub token: String,
    #[serde(default)]
    pub token_type_hint: Option<TokenTypeHint>,
}

/// Successful issuance or refresh.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
    /// Granted scopes, space separated
    pub scope: String,
}

/// `GET /token-info` response.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenInfo {
    pub active: bool,
    /// `access_token` for store-backed tokens, `legacy` for self-contained ones
    pub auth_type: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Token listing entry. Never carries token material.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenListItem {
    pub id: Uuid,
    pub api_key_id: Uuid,
    pub scopes: Vec<String>,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_used_ip: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<AccessToken> for TokenListItem {
    fn from(t: AccessToken) -> Self {
        Self {
            id: t.id,
            api_key_id: t.api_key_id,
            scopes: t.scopes,
            is_active: t.is_active,
            expires_at: t.expires_at,
            refresh_token_expires_at: t.refresh_token_expires_at,
            created_at: t.created_at,
            last_used_at: t.last_used_at,
            last_used_ip: t.last_used_ip,
            revoked_at: t.revoked_at,
        }
    }
}

/// Paginated `GET /tokens` response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListTokensResponse {
    pub tokens: Vec<TokenListItem>,
    pub pagination: super::Pagination,
}
