//! Storage failures during issuance and refresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use actix_web::http::StatusCode;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use token_exchange_lib::config::TokenSettings;
use token_exchange_lib::error::{AppError, AppResult};
use token_exchange_lib::models::AccessToken;
use token_exchange_lib::services::AuthServices;
use token_exchange_lib::store::{AccessTokenRepository, MemoryStore, Stores};

use super::test_helpers::*;

/// Token repository whose writes fail while `failing` is set.
struct FlakyTokens {
    inner: Arc<MemoryStore>,
    failing: AtomicBool,
}

impl FlakyTokens {
    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Database("connection reset by peer".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AccessTokenRepository for FlakyTokens {
    async fn insert(&self, token: &AccessToken) -> AppResult<()> {
        self.check()?;
        AccessTokenRepository::insert(self.inner.as_ref(), token).await
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> AppResult<Option<AccessToken>> {
        self.inner.find_by_token_hash(token_hash).await
    }

    async fn find_by_refresh_hash(&self, refresh_hash: &str) -> AppResult<Option<AccessToken>> {
        self.inner.find_by_refresh_hash(refresh_hash).await
    }

    async fn deactivate(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        self.check()?;
        self.inner.deactivate(id, at).await
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        replacement: &AccessToken,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.check()?;
        self.inner.rotate(old_id, replacement, at).await
    }

    async fn deactivate_by_api_key(&self, api_key_id: Uuid, at: DateTime<Utc>) -> AppResult<u64> {
        self.check()?;
        self.inner.deactivate_by_api_key(api_key_id, at).await
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> AppResult<(Vec<AccessToken>, u64)> {
        AccessTokenRepository::list_by_user(self.inner.as_ref(), user_id, offset, limit).await
    }

    async fn record_usage(&self, id: Uuid, ip: Option<&str>, at: DateTime<Utc>) -> AppResult<()> {
        AccessTokenRepository::record_usage(self.inner.as_ref(), id, ip, at).await
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        self.inner.purge_expired(cutoff).await
    }
}

fn flaky_services() -> (AuthServices, Arc<FlakyTokens>) {
    let backend = Arc::new(MemoryStore::default());
    let tokens = Arc::new(FlakyTokens {
        inner: backend.clone(),
        failing: AtomicBool::new(false),
    });
    let stores = Stores {
        api_keys: backend.clone(),
        tokens: tokens.clone(),
        users: backend.clone(),
        readiness: backend,
    };
    (AuthServices::new(stores, TokenSettings::default()), tokens)
}

#[actix_rt::test]
async fn test_exchange_fails_closed_when_token_cannot_be_stored() {
    let (services, tokens) = flaky_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    tokens.set_failing(true);
    let (status, body) = exchange(&app, &key.access_key, &secret, json!({})).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "DATABASE_ERROR");
    assert!(body.get("access_token").is_none());
    assert!(body.get("refresh_token").is_none());

    let (_, total) = services.tokens.list_for_user(user.id, 0, 10).await.unwrap();
    assert_eq!(total, 0);
}

#[actix_rt::test]
async fn test_failed_rotation_spends_nothing() {
    let (services, tokens) = flaky_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (access, refresh_token) = issue_pair(&app, &key.access_key, &secret, None).await;

    tokens.set_failing(true);
    let (status, body) = refresh(&app, &refresh_token, None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "DATABASE_ERROR");
    assert!(body.get("access_token").is_none());

    // No replacement was stored and the old pair is untouched
    let (_, total) = services.tokens.list_for_user(user.id, 0, 10).await.unwrap();
    assert_eq!(total, 1);
    let (status, _) = me_with_bearer(&app, &access).await;
    assert_eq!(status, StatusCode::OK);

    // Once storage recovers the refresh token is spendable exactly once
    tokens.set_failing(false);
    let (status, body) = refresh(&app, &refresh_token, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = refresh(&app, &refresh_token, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "TOKEN_REVOKED");
}

#[actix_rt::test]
async fn test_revoke_reports_success_when_storage_fails() {
    let (services, tokens) = flaky_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (access, _) = issue_pair(&app, &key.access_key, &secret, None).await;

    tokens.set_failing(true);
    let (status, body) = revoke(&app, json!({ "token": access })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}
