//! Persistence seams.
//!
//! The service talks to storage only through these traits. `DbPool`
//! (PostgreSQL via SeaORM) implements them for production; `MemoryStore`
//! implements them in-process for development and tests.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::{AccessToken, ApiKey, User};

pub use memory::MemoryStore;

/// Credential records. `access_key` is unique; `insert` fails with
/// `AppError::Conflict` on a duplicate.
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn insert(&self, key: &ApiKey) -> AppResult<()>;
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<ApiKey>>;
    async fn find_by_access_key(&self, access_key: &str) -> AppResult<Option<ApiKey>>;
    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<ApiKey>>;
    /// Overwrite the mutable fields (name, secret hash, policy, active flag).
    async fn update(&self, key: &ApiKey) -> AppResult<()>;
    async fn record_usage(&self, id: Uuid, ip: Option<&str>, at: DateTime<Utc>) -> AppResult<()>;
}

/// Token records. `token_hash` and `refresh_token_hash` are unique.
///
/// Lookups return records whether or not they are still active; callers
/// decide how to treat revoked and expired records.
#[async_trait]
pub trait AccessTokenRepository: Send + Sync {
    async fn insert(&self, token: &AccessToken) -> AppResult<()>;
    async fn find_by_token_hash(&self, token_hash: &str) -> AppResult<Option<AccessToken>>;
    async fn find_by_refresh_hash(&self, refresh_hash: &str) -> AppResult<Option<AccessToken>>;
    /// Mark a record inactive. Returns whether it was active before.
    async fn deactivate(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<bool>;
    /// Deactivate `old_id` and insert `replacement` as one unit.
    ///
    /// Fails with `AppError::TokenRevoked` and inserts nothing when `old_id`
    /// is no longer active, so a refresh token can be spent only once.
    async fn rotate(
        &self,
        old_id: Uuid,
        replacement: &AccessToken,
        at: DateTime<Utc>,
    ) -> AppResult<()>;
    /// Deactivate every active record issued from a credential.
    async fn deactivate_by_api_key(&self, api_key_id: Uuid, at: DateTime<Utc>) -> AppResult<u64>;
    /// One page of a principal's tokens, newest first, plus the total count.
    async fn list_by_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> AppResult<(Vec<AccessToken>, u64)>;
    async fn record_usage(&self, id: Uuid, ip: Option<&str>, at: DateTime<Utc>) -> AppResult<()>;
    /// Delete records whose refresh half expired, or which were revoked, before `cutoff`.
    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}

/// Principal directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn insert(&self, user: &User) -> AppResult<()>;
    /// Returns whether the user exists.
    async fn set_active(&self, id: Uuid, active: bool) -> AppResult<bool>;
}

/// Backend round trip used by the readiness probe.
#[async_trait]
pub trait Readiness: Send + Sync {
    async fn ping(&self) -> AppResult<()>;
}

/// All repositories, sharing one backend.
#[derive(Clone)]
pub struct Stores {
    pub api_keys: Arc<dyn ApiKeyRepository>,
    pub tokens: Arc<dyn AccessTokenRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub readiness: Arc<dyn Readiness>,
}

impl Stores {
    /// In-process store.
    pub fn memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::default()))
    }

    /// PostgreSQL store.
    pub fn database(pool: DbPool) -> Self {
        Self::from_backend(Arc::new(pool))
    }

    fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ApiKeyRepository + AccessTokenRepository + UserDirectory + Readiness + 'static,
    {
        Self {
            api_keys: backend.clone(),
            tokens: backend.clone(),
            users: backend.clone(),
            readiness: backend,
        }
    }
}
