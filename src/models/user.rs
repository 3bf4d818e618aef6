//! Principal records owned by the user directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// The account on whose behalf credentials and tokens act.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    /// Role names; also the default scope set of self-contained tokens without a `scopes` claim
    pub roles: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>, email: Option<String>, roles: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email,
            roles,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Scopes assumed for a self-contained token that carries none.
    pub fn default_scopes(&self) -> Vec<String> {
        self.roles.clone()
    }
}
