//! Credential (key/secret) generation, verification and management.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{constant_time_eq, hash_secret, random_hex};
use crate::error::{AppError, AppResult};
use crate::models::api_key::DEFAULT_RATE_LIMIT;
use crate::models::{ApiKey, ApiKeyPolicy};
use crate::store::ApiKeyRepository;

/// Public access key prefix.
const ACCESS_KEY_PREFIX: &str = "ak_";
/// Secret key prefix.
const SECRET_KEY_PREFIX: &str = "sk_";
/// Attempts at inserting a credential before giving up on access key collisions.
const MAX_INSERT_ATTEMPTS: usize = 3;

/// Freshly generated key material. The plaintext secret leaves this struct
/// exactly once, in the creation or regeneration response.
pub struct GeneratedCredential {
    pub access_key: String,
    pub secret_key: String,
    pub secret_key_hash: String,
}

impl std::fmt::Debug for GeneratedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedCredential")
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

fn generate_secret() -> (String, String) {
    let secret_key = format!("{}{}", SECRET_KEY_PREFIX, random_hex::<32>());
    let hash = hash_secret(&secret_key);
    (secret_key, hash)
}

/// Parse a duration string like "365d", "30d", "1y", "6m", "2w".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();

    if let Some(days) = s.strip_suffix('d') {
        days.parse::<i64>().ok().and_then(Duration::try_days)
    } else if let Some(years) = s.strip_suffix('y') {
        years
            .parse::<i64>()
            .ok()
            .and_then(|y| y.checked_mul(365))
            .and_then(Duration::try_days)
    } else if let Some(months) = s.strip_suffix('m') {
        months
            .parse::<i64>()
            .ok()
            .and_then(|m| m.checked_mul(30))
            .and_then(Duration::try_days)
    } else if let Some(weeks) = s.strip_suffix('w') {
        weeks.parse::<i64>().ok().and_then(Duration::try_weeks)
    } else {
        // Bare numbers are days
        s.parse::<i64>().ok().and_then(Duration::try_days)
    }
}

/// Resolve an `expires_in` string into an absolute expiry. Durations that
/// land outside the representable date range are rejected.
pub fn expiry_from(expires_in: &str, now: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
    parse_duration(expires_in)
        .filter(|d| *d > Duration::zero())
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Invalid expires_in '{}'. Use e.g. 30d, 2w, 6m, 1y",
                expires_in
            ))
        })
}

/// Owner of all credential records.
#[derive(Clone)]
pub struct CredentialStore {
    repo: Arc<dyn ApiKeyRepository>,
}

impl CredentialStore {
    pub fn new(repo: Arc<dyn ApiKeyRepository>) -> Self {
        Self { repo }
    }

    /// Fresh `(access_key, secret_key, secret_key_hash)` triple from the OS RNG.
    pub fn generate() -> GeneratedCredential {
        let access_key = format!("{}{}", ACCESS_KEY_PREFIX, random_hex::<12>());
        let (secret_key, secret_key_hash) = generate_secret();
        GeneratedCredential {
            access_key,
            secret_key,
            secret_key_hash,
        }
    }

    /// Compare `hash(candidate)` with the stored hash in constant time.
    pub fn verify_secret(candidate: &str, stored_hash: &str) -> bool {
        constant_time_eq(&hash_secret(candidate), stored_hash)
    }

    pub async fn find_by_access_key(&self, access_key: &str) -> AppResult<Option<ApiKey>> {
        self.repo.find_by_access_key(access_key).await
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Option<ApiKey>> {
        self.repo.find_by_id(id).await
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<ApiKey>> {
        self.repo.list_by_user(user_id).await
    }

    /// Record usage in the background. Failures are logged only.
    pub fn touch(&self, key_id: Uuid, ip: Option<String>) {
        let repo = self.repo.clone();
        let now = Utc::now();
        tokio::spawn(async move {
            if let Err(e) = repo.record_usage(key_id, ip.as_deref(), now).await {
                warn!(api_key_id = %key_id, "Failed to record credential usage: {}", e);
            }
        });
    }

    /// Create and persist a credential for `user_id`.
    ///
    /// Returns the stored record and the plaintext secret.
    pub async fn create(
        &self,
        user_id: Uuid,
        name: &str,
        policy: ApiKeyPolicy,
    ) -> AppResult<(ApiKey, String)> {
        let now = Utc::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let generated = Self::generate();
            let key = ApiKey {
                id: Uuid::new_v4(),
                user_id,
                name: name.to_string(),
                access_key: generated.access_key,
                secret_key_hash: generated.secret_key_hash,
                scopes: policy.scopes.clone(),
                allowed_ips: policy.allowed_ips.clone(),
                rate_limit: policy.rate_limit.unwrap_or(DEFAULT_RATE_LIMIT),
                is_active: true,
                expires_at: policy.expires_at,
                last_used_at: None,
                last_used_ip: None,
                created_at: now,
                updated_at: now,
            };

            match self.repo.insert(&key).await {
                Ok(()) => {
                    info!(
                        api_key_id = %key.id,
                        user_id = %user_id,
                        access_key = %key.access_key,
                        "Created credential"
                    );
                    return Ok((key, generated.secret_key));
                }
                Err(AppError::Conflict(detail)) if attempt < MAX_INSERT_ATTEMPTS => {
                    warn!("Access key collision, regenerating: {}", detail);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Replace the secret of a credential, keeping its access key.
    pub async fn regenerate_secret(&self, mut key: ApiKey) -> AppResult<(ApiKey, String)> {
        let (secret_key, secret_key_hash) = generate_secret();
        key.secret_key_hash = secret_key_hash;
        key.updated_at = Utc::now();
        self.repo.update(&key).await?;

        info!(api_key_id = %key.id, "Regenerated credential secret");
        Ok((key, secret_key))
    }

    pub async fn update(&self, mut key: ApiKey) -> AppResult<ApiKey> {
        key.updated_at = Utc::now();
        self.repo.update(&key).await?;
        Ok(key)
    }
}
