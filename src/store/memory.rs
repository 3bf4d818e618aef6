//! In-process store with the same uniqueness rules as the database schema.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AccessTokenRepository, ApiKeyRepository, Readiness, UserDirectory};
use crate::error::{AppError, AppResult};
use crate::models::{AccessToken, ApiKey, User};

#[derive(Default)]
struct KeyTable {
    rows: HashMap<Uuid, ApiKey>,
    by_access_key: HashMap<String, Uuid>,
}

#[derive(Default)]
struct TokenTable {
    rows: HashMap<Uuid, AccessToken>,
    by_token: HashMap<String, Uuid>,
    by_refresh: HashMap<String, Uuid>,
}

impl TokenTable {
    fn insert(&mut self, token: &AccessToken) -> AppResult<()> {
        if self.rows.contains_key(&token.id)
            || self.by_token.contains_key(&token.token_hash)
            || self.by_refresh.contains_key(&token.refresh_token_hash)
        {
            return Err(AppError::Conflict("access token already exists".to_string()));
        }
        self.by_token.insert(token.token_hash.clone(), token.id);
        self.by_refresh
            .insert(token.refresh_token_hash.clone(), token.id);
        self.rows.insert(token.id, token.clone());
        Ok(())
    }

    fn deactivate(&mut self, id: Uuid, at: DateTime<Utc>) -> bool {
        match self.rows.get_mut(&id) {
            Some(row) if row.is_active => {
                row.is_active = false;
                row.revoked_at = Some(at);
                true
            }
            _ => false,
        }
    }

    fn remove(&mut self, id: Uuid) {
        if let Some(row) = self.rows.remove(&id) {
            self.by_token.remove(&row.token_hash);
            self.by_refresh.remove(&row.refresh_token_hash);
        }
    }
}

/// Hash-map backed implementation of every repository trait.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    keys: RwLock<KeyTable>,
    tokens: RwLock<TokenTable>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ApiKeyRepository for MemoryStore {
    async fn insert(&self, key: &ApiKey) -> AppResult<()> {
        let mut table = write(&self.keys);
        if table.rows.contains_key(&key.id) || table.by_access_key.contains_key(&key.access_key) {
            return Err(AppError::Conflict("access key already exists".to_string()));
        }
        table.by_access_key.insert(key.access_key.clone(), key.id);
        table.rows.insert(key.id, key.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<ApiKey>> {
        Ok(read(&self.keys).rows.get(&id).cloned())
    }

    async fn find_by_access_key(&self, access_key: &str) -> AppResult<Option<ApiKey>> {
        let table = read(&self.keys);
        Ok(table
            .by_access_key
            .get(access_key)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<ApiKey>> {
        let mut keys: Vec<ApiKey> = read(&self.keys)
            .rows
            .values()
            .filter(|k| k.user_id == user_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn update(&self, key: &ApiKey) -> AppResult<()> {
        let mut table = write(&self.keys);
        let row = table
            .rows
            .get_mut(&key.id)
            .ok_or_else(|| AppError::NotFound("API key".to_string()))?;
        row.name = key.name.clone();
        row.secret_key_hash = key.secret_key_hash.clone();
        row.scopes = key.scopes.clone();
        row.allowed_ips = key.allowed_ips.clone();
        row.rate_limit = key.rate_limit;
        row.is_active = key.is_active;
        row.expires_at = key.expires_at;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn record_usage(&self, id: Uuid, ip: Option<&str>, at: DateTime<Utc>) -> AppResult<()> {
        if let Some(row) = write(&self.keys).rows.get_mut(&id) {
            row.last_used_at = Some(at);
            row.last_used_ip = ip.map(str::to_string);
        }
        Ok(())
    }
}

#[async_trait]
impl AccessTokenRepository for MemoryStore {
    async fn insert(&self, token: &AccessToken) -> AppResult<()> {
        write(&self.tokens).insert(token)
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> AppResult<Option<AccessToken>> {
        let table = read(&self.tokens);
        Ok(table
            .by_token
            .get(token_hash)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn find_by_refresh_hash(&self, refresh_hash: &str) -> AppResult<Option<AccessToken>> {
        let table = read(&self.tokens);
        Ok(table
            .by_refresh
            .get(refresh_hash)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn deactivate(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        Ok(write(&self.tokens).deactivate(id, at))
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        replacement: &AccessToken,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut table = write(&self.tokens);
        if !table.rows.get(&old_id).is_some_and(|row| row.is_active) {
            return Err(AppError::TokenRevoked);
        }
        table.insert(replacement)?;
        table.deactivate(old_id, at);
        Ok(())
    }

    async fn deactivate_by_api_key(&self, api_key_id: Uuid, at: DateTime<Utc>) -> AppResult<u64> {
        let mut table = write(&self.tokens);
        let mut count = 0;
        for row in table.rows.values_mut() {
            if row.api_key_id == api_key_id && row.is_active {
                row.is_active = false;
                row.revoked_at = Some(at);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> AppResult<(Vec<AccessToken>, u64)> {
        let mut tokens: Vec<AccessToken> = read(&self.tokens)
            .rows
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = tokens.len() as u64;
        let page = tokens
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect();
        Ok((page, total))
    }

    async fn record_usage(&self, id: Uuid, ip: Option<&str>, at: DateTime<Utc>) -> AppResult<()> {
        if let Some(row) = write(&self.tokens).rows.get_mut(&id) {
            row.last_used_at = Some(at);
            row.last_used_ip = ip.map(str::to_string);
        }
        Ok(())
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut table = write(&self.tokens);
        let stale: Vec<Uuid> = table
            .rows
            .values()
            .filter(|t| {
                t.refresh_token_expires_at < cutoff || t.revoked_at.is_some_and(|r| r < cutoff)
            })
            .map(|t| t.id)
            .collect();
        for id in &stale {
            table.remove(*id);
        }
        Ok(stale.len() as u64)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(read(&self.users).get(&id).cloned())
    }

    async fn insert(&self, user: &User) -> AppResult<()> {
        let mut users = write(&self.users);
        if users.contains_key(&user.id) || users.values().any(|u| u.username == user.username) {
            return Err(AppError::Conflict(format!(
                "user '{}' already exists",
                user.username
            )));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> AppResult<bool> {
        match write(&self.users).get_mut(&id) {
            Some(user) => {
                user.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl Readiness for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
