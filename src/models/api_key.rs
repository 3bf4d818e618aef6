//! Long-lived credential (API key) model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Advisory request budget assigned when none is given.
pub const DEFAULT_RATE_LIMIT: i32 = 1000;

/// Credential stored in the persistence layer.
///
/// The secret is only ever held as `secret_key_hash`; the plaintext is shown
/// to the owner once at creation or regeneration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKey {
    /// Unique identifier (UUID)
    pub id: Uuid,
    /// Owning principal
    pub user_id: Uuid,
    /// Human-readable name (e.g., "CI - GitHub Actions")
    pub name: String,
    /// Public identifier presented alongside the secret
    pub access_key: String,
    /// SHA-256 hash of the secret
    pub secret_key_hash: String,
    /// Maximal grant this credential can produce tokens for
    pub scopes: Vec<String>,
    /// Client IPs allowed to use the credential; empty means unrestricted
    pub allowed_ips: Vec<String>,
    /// Advisory, enforced outside this service
    pub rate_limit: i32,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_used_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// Check if the key is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Check if the key is expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether a request from `ip` may use this key.
    pub fn is_ip_allowed(&self, ip: Option<&str>) -> bool {
        if self.allowed_ips.is_empty() {
            return true;
        }
        match ip {
            Some(ip) => self.allowed_ips.iter().any(|allowed| allowed == ip),
            None => false,
        }
    }
}

/// Policy attributes chosen when a credential is created.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyPolicy {
    pub scopes: Vec<String>,
    pub allowed_ips: Vec<String>,
    pub rate_limit: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request to create a new credential.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateApiKeyRequest {
    pub name: String,
    /// Target principal; only honored for administrators
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default)]
    pub rate_limit: Option<i32>,
    /// Expiration duration (e.g., "365d", "30d", "1y")
    #[serde(default)]
    pub expires_in: Option<String>,
}

/// Partial policy update. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateApiKeyRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(default)]
    pub allowed_ips: Option<Vec<String>>,
    #[serde(default)]
    pub rate_limit: Option<i32>,
    /// New expiration duration; `"never"` clears the expiry
    #[serde(default)]
    pub expires_in: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Response when creating a credential (includes the plaintext secret).
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyCreateResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub access_key: String,
    /// Plaintext secret - only shown once
    pub secret_key: String,
    pub scopes: Vec<String>,
    pub allowed_ips: Vec<String>,
    pub rate_limit: i32,
    pub expires_at: Option<String>,
    pub created_at: String,
}

impl ApiKeyCreateResponse {
    pub fn new(key: ApiKey, secret_key: String) -> Self {
        Self {
            id: key.id,
            user_id: key.user_id,
            name: key.name,
            access_key: key.access_key,
            secret_key,
            scopes: key.scopes,
            allowed_ips: key.allowed_ips,
            rate_limit: key.rate_limit,
            expires_at: key.expires_at.map(|d| d.to_rfc3339()),
            created_at: key.created_at.to_rfc3339(),
        }
    }
}

/// Response when regenerating a credential's secret.
#[derive(Debug, Serialize, ToSchema)]
pub struct RegenerateSecretResponse {
    pub id: Uuid,
    pub access_key: String,
    /// Plaintext secret - only shown once
    pub secret_key: String,
}

/// Credential view without any secret material.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyListItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub access_key: String,
    pub scopes: Vec<String>,
    pub allowed_ips: Vec<String>,
    pub rate_limit: i32,
    pub is_active: bool,
    pub expires_at: Option<String>,
    pub last_used_at: Option<String>,
    pub last_used_ip: Option<String>,
    pub created_at: String,
}

impl From<ApiKey> for ApiKeyListItem {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            user_id: key.user_id,
            name: key.name,
            access_key: key.access_key,
            scopes: key.scopes,
            allowed_ips: key.allowed_ips,
            rate_limit: key.rate_limit,
            is_active: key.is_active,
            expires_at: key.expires_at.map(|d| d.to_rfc3339()),
            last_used_at: key.last_used_at.map(|d| d.to_rfc3339()),
            last_used_ip: key.last_used_ip,
            created_at: key.created_at.to_rfc3339(),
        }
    }
}

/// Response for listing credentials.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListApiKeysResponse {
    pub keys: Vec<ApiKeyListItem>,
}
