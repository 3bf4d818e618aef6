//! Database operations for credentials using SeaORM.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::prelude::Expr;
use sea_orm::*;
use uuid::Uuid;

use super::{DbPool, json_to_strings, strings_to_json};
use crate::entity::api_key::{ActiveModel, Column, Entity, Model};
use crate::error::{AppError, AppResult};
use crate::models::ApiKey;
use crate::store::ApiKeyRepository;

/// Insert a new credential. A duplicate access key surfaces as `AppError::Conflict`.
pub async fn insert_api_key(db: &DatabaseConnection, key: &ApiKey) -> AppResult<()> {
    let model = ActiveModel {
        id: Set(key.id),
        user_id: Set(key.user_id),
        name: Set(key.name.clone()),
        access_key: Set(key.access_key.clone()),
        secret_key_hash: Set(key.secret_key_hash.clone()),
        scopes: Set(strings_to_json(&key.scopes)),
        allowed_ips: Set(strings_to_json(&key.allowed_ips)),
        rate_limit: Set(key.rate_limit),
        is_active: Set(key.is_active),
        expires_at: Set(key.expires_at),
        last_used_at: Set(key.last_used_at),
        last_used_ip: Set(key.last_used_ip.clone()),
        created_at: Set(key.created_at),
        updated_at: Set(key.updated_at),
    };

    Entity::insert(model).exec(db).await?;

    Ok(())
}

/// Find a credential by its public access key.
pub async fn find_by_access_key(
    db: &DatabaseConnection,
    access_key: &str,
) -> AppResult<Option<ApiKey>> {
    let result = Entity::find()
        .filter(Column::AccessKey.eq(access_key))
        .one(db)
        .await?;

    Ok(result.map(model_to_api_key))
}

/// Find a credential by ID.
pub async fn find_by_id(db: &DatabaseConnection, id: Uuid) -> AppResult<Option<ApiKey>> {
    let result = Entity::find_by_id(id).one(db).await?;
    Ok(result.map(model_to_api_key))
}

/// List a principal's credentials, newest first.
pub async fn list_by_user(db: &DatabaseConnection, user_id: Uuid) -> AppResult<Vec<ApiKey>> {
    let results = Entity::find()
        .filter(Column::UserId.eq(user_id))
        .order_by_desc(Column::CreatedAt)
        .all(db)
        .await?;

    Ok(results.into_iter().map(model_to_api_key).collect())
}

/// Overwrite the mutable policy fields of a credential.
pub async fn update_api_key(db: &DatabaseConnection, key: &ApiKey) -> AppResult<()> {
    let model = Entity::find_by_id(key.id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("API key".to_string()))?;

    let mut active: ActiveModel = model.into();
    active.name = Set(key.name.clone());
    active.secret_key_hash = Set(key.secret_key_hash.clone());
    active.scopes = Set(strings_to_json(&key.scopes));
    active.allowed_ips = Set(strings_to_json(&key.allowed_ips));
    active.rate_limit = Set(key.rate_limit);
    active.is_active = Set(key.is_active);
    active.expires_at = Set(key.expires_at);
    active.updated_at = Set(Utc::now());
    active.update(db).await?;

    Ok(())
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

fn model_to_api_key(m: Model) -> ApiKey {
    ApiKey {
        id: m.id,
        user_id: m.user_id,
        name: m.name,
        access_key: m.access_key,
        secret_key_hash: m.secret_key_hash,
        scopes: json_to_strings(m.scopes),
        allowed_ips: json_to_strings(m.allowed_ips),
        rate_limit: m.rate_limit,
        is_active: m.is_active,
        expires_at: m.expires_at,
        last_used_at: m.last_used_at,
        last_used_ip: m.last_used_ip,
        created_at: m.created_at,
        updated_at: m.updated_at,
    }
}

#[async_trait]
impl ApiKeyRepository for DbPool {
    async fn insert(&self, key: &ApiKey) -> AppResult<()> {
        insert_api_key(self.connection(), key).await
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<ApiKey>> {
        find_by_id(self.connection(), id).await
    }

    async fn find_by_access_key(&self, access_key: &str) -> AppResult<Option<ApiKey>> {
        find_by_access_key(self.connection(), access_key).await
    }

    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<ApiKey>> {
        list_by_user(self.connection(), user_id).await
    }

    async fn update(&self, key: &ApiKey) -> AppResult<()> {
        update_api_key(self.connection(), key).await
    }

    async fn record_usage(&self, id: Uuid, ip: Option<&str>, at: DateTime<Utc>) -> AppResult<()> {
        update_last_used(self.connection(), id, ip, at).await
    }
}
