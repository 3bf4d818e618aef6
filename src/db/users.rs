//! Database operations for users.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::*;
use uuid::Uuid;

use super::{DbPool, json_to_strings, strings_to_json};
use crate::entity::user::{ActiveModel, Entity, Model};
use crate::error::AppResult;
use crate::models::User;
use crate::store::UserDirectory;

/// Insert a user. A duplicate username surfaces as `AppError::Conflict`.
pub async fn insert_user(db: &DatabaseConnection, user: &User) -> AppResult<()> {
    let model = ActiveModel {
        id: Set(user.id),
        username: Set(user.username.clone()),
        email: Set(user.email.clone()),
        roles: Set(strings_to_json(&user.roles)),
        is_active: Set(user.is_active),
        created_at: Set(user.created_at),
        updated_at: Set(Utc::now()),
    };

    Entity::insert(model).exec(db).await?;

    Ok(())
}

/// Find a user by ID.
pub async fn find_by_id(db: &DatabaseConnection, id: Uuid) -> AppResult<Option<User>> {
    let result = Entity::find_by_id(id).one(db).await?;
    Ok(result.map(model_to_user))
}

/// Activate or deactivate a user. Returns false if the user does not exist.
pub async fn set_active(db: &DatabaseConnection, id: Uuid, active: bool) -> AppResult<bool> {
    let Some(model) = Entity::find_by_id(id).one(db).await? else {
        return Ok(false);
    };

    let mut am: ActiveModel = model.into();
    am.is_active = Set(active);
    am.updated_at = Set(Utc::now());
    am.update(db).await?;

    Ok(true)
}

fn model_to_user(m: Model) -> User {
    User {
        id: m.id,
        username: m.username,
        email: m.email,
        roles: json_to_strings(m.roles),
        is_active: m.is_active,
        created_at: m.created_at,
    }
}

#[async_trait]
impl UserDirectory for DbPool {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        find_by_id(self.connection(), id).await
    }

    async fn insert(&self, user: &User) -> AppResult<()> {
        insert_user(self.connection(), user).await
    }

    async fn set_active(&self, id: Uuid, active: bool) -> AppResult<bool> {
        set_active(self.connection(), id, active).await
    }
}
