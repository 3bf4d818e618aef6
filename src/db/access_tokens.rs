//! Database operations for access/refresh token pairs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::prelude::Expr;
use sea_orm::*;
use uuid::Uuid;

use super::{DbPool, json_to_strings, strings_to_json};
use crate::entity::access_token::{ActiveModel, Column, Entity, Model};
use crate::error::{AppError, AppResult};
use crate::models::AccessToken;
use crate::store::AccessTokenRepository;

fn to_active_model(token: &AccessToken) -> ActiveModel {
    ActiveModel {
        id: Set(token.id),
        token_hash: Set(token.token_hash.clone()),
        refresh_token_hash: Set(token.refresh_token_hash.clone()),
        api_key_id: Set(token.api_key_id),
        user_id: Set(token.user_id),
        scopes: Set(strings_to_json(&token.scopes)),
        is_active: Set(token.is_active),
        expires_at: Set(token.expires_at),
        refresh_token_expires_at: Set(token.refresh_token_expires_at),
        last_used_at: Set(token.last_used_at),
        last_used_ip: Set(token.last_used_ip.clone()),
        created_at: Set(token.created_at),
        revoked_at: Set(token.revoked_at),
    }
}

/// Insert a new token pair (hashes only).
pub async fn insert<C: ConnectionTrait>(db: &C, token: &AccessToken) -> AppResult<()> {
    Entity::insert(to_active_model(token)).exec(db).await?;
    Ok(())
}

/// Find a token pair by access token hash, active or not.
pub async fn find_by_token_hash(
    db: &DatabaseConnection,
    token_hash: &str,
) -> AppResult<Option<AccessToken>> {
    let result = Entity::find()
        .filter(Column::TokenHash.eq(token_hash))
        .one(db)
        .await?;

    Ok(result.map(model_to_access_token))
}

/// Find a token pair by refresh token hash, active or not.
pub async fn find_by_refresh_hash(
    db: &DatabaseConnection,
    refresh_hash: &str,
) -> AppResult<Option<AccessToken>> {
    let result = Entity::find()
        .filter(Column::RefreshTokenHash.eq(refresh_hash))
        .one(db)
        .await?;

    Ok(result.map(model_to_access_token))
}

/// Deactivate a token pair if it is still active. Returns rows affected.
pub async fn deactivate<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    at: DateTime<Utc>,
) -> AppResult<u64> {
    let result = Entity::update_many()
        .col_expr(Column::IsActive, Expr::value(false))
        .col_expr(Column::RevokedAt, Expr::value(Some(at)))
        .filter(Column::Id.eq(id))
        .filter(Column::IsActive.eq(true))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

/// Revoke `old_id` and insert `replacement` in one transaction.
pub async fn rotate(
    db: &DatabaseConnection,
    old_id: Uuid,
    replacement: &AccessToken,
    at: DateTime<Utc>,
) -> AppResult<()> {
    let txn = db.begin().await?;

    // Conditional update doubles as the single-use guard for the refresh token
    if deactivate(&txn, old_id, at).await? == 0 {
        txn.rollback().await?;
        return Err(AppError::TokenRevoked);
    }

    insert(&txn, replacement).await?;
    txn.commit().await?;

    Ok(())
}

/// Deactivate every active token pair issued from a credential.
pub async fn deactivate_by_api_key(
    db: &DatabaseConnection,
    api_key_id: Uuid,
    at: DateTime<Utc>,
) -> AppResult<u64> {
    let result = Entity::update_many()
        .col_expr(Column::IsActive, Expr::value(false))
        .col_expr(Column::RevokedAt, Expr::value(Some(at)))
        .filter(Column::ApiKeyId.eq(api_key_id))
        .filter(Column::IsActive.eq(true))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

/// One page of a principal's token pairs, newest first, with the total count.
pub async fn list_by_user(
    db: &DatabaseConnection,
    user_id: Uuid,
    offset: u64,
    limit: u64,
) -> AppResult<(Vec<AccessToken>, u64)> {
    let total = Entity::find()
        .filter(Column::UserId.eq(user_id))
        .count(db)
        .await?;

    let results = Entity::find()
        .filter(Column::UserId.eq(user_id))
        .order_by_desc(Column::CreatedAt)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await?;

    Ok((
        results.into_iter().map(model_to_access_token).collect(),
        total,
    ))
}

/// Update usage telemetry.
pub async fn update_last_used(
    db: &DatabaseConnection,
    id: Uuid,
    ip: Option<&str>,
    at: DateTime<Utc>,
) -> AppResult<()> {
    Entity::update_many()
        .col_expr(Column::LastUsedAt, Expr::value(Some(at)))
        .col_expr(Column::LastUsedIp, Expr::value(ip.map(str::to_string)))
        .filter(Column::Id.eq(id))
        .exec(db)
        .await?;

    Ok(())
}

/// Delete token pairs whose refresh half expired, or which were revoked, before `cutoff`.
pub async fn cleanup_expired(db: &DatabaseConnection, cutoff: DateTime<Utc>) -> AppResult<u64> {
    let result = Entity::delete_many()
        .filter(
            Condition::any()
                .add(Column::RefreshTokenExpiresAt.lt(cutoff))
                .add(Column::RevokedAt.lt(cutoff)),
        )
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

fn model_to_access_token(m: Model) -> AccessToken {
    AccessToken {
        id: m.id,
        token_hash: m.token_hash,
        refresh_token_hash: m.refresh_token_hash,
        api_key_id: m.api_key_id,
        user_id: m.user_id,
        scopes: json_to_strings(m.scopes),
        is_active: m.is_active,
        expires_at: m.expires_at,
        refresh_token_expires_at: m.refresh_token_expires_at,
        last_used_at: m.last_used_at,
        last_used_ip: m.last_used_ip,
        created_at: m.created_at,
        revoked_at: m.revoked_at,
    }
}

#[async_trait]
impl AccessTokenRepository for DbPool {
    async fn insert(&self, token: &AccessToken) -> AppResult<()> {
        insert(self.connection(), token).await
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> AppResult<Option<AccessToken>> {
        find_by_token_hash(self.connection(), token_hash).await
    }

    async fn find_by_refresh_hash(&self, refresh_hash: &str) -> AppResult<Option<AccessToken>> {
        find_by_refresh_hash(self.connection(), refresh_hash).await
    }

    async fn deactivate(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        Ok(deactivate(self.connection(), id, at).await? > 0)
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        replacement: &AccessToken,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        rotate(self.connection(), old_id, replacement, at).await
    }

    async fn deactivate_by_api_key(&self, api_key_id: Uuid, at: DateTime<Utc>) -> AppResult<u64> {
        deactivate_by_api_key(self.connection(), api_key_id, at).await
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> AppResult<(Vec<AccessToken>, u64)> {
        list_by_user(self.connection(), user_id, offset, limit).await
    }

    async fn record_usage(&self, id: Uuid, ip: Option<&str>, at: DateTime<Utc>) -> AppResult<()> {
        update_last_used(self.connection(), id, ip, at).await
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        cleanup_expired(self.connection(), cutoff).await
    }
}
