//! Database module providing connection management, migrations, and the
//! SeaORM implementations of the repository traits.

pub mod access_tokens;
pub mod api_keys;
pub mod users;

use async_trait::async_trait;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::migration::Migrator;
use crate::store::Readiness;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration.
    pub async fn new(config: &Config) -> AppResult<Self> {
        if config.database.is_memory() {
            return Err(AppError::Database(
                "DATABASE_URL selects the in-memory store; no database pool to open".to_string(),
            ));
        }

        let mut options = ConnectOptions::new(config.database.url.clone());
        options
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .sqlx_logging(false);

        let conn = Database::connect(options).await?;
        info!(
            "Connected to PostgreSQL (max {} connections)",
            config.database.max_connections
        );

        Ok(DbPool { conn })
    }

    /// Get the underlying connection.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Apply all pending migrations.
    pub async fn run_migrations(&self) -> AppResult<()> {
        Migrator::up(&self.conn, None).await?;
        Ok(())
    }
}

#[async_trait]
impl Readiness for DbPool {
    async fn ping(&self) -> AppResult<()> {
        let stmt = Statement::from_string(self.conn.get_database_backend(), "SELECT 1".to_owned());
        self.conn.query_one_raw(stmt).await?;
        Ok(())
    }
}

/// Decode a JSONB string array column, tolerating malformed rows.
pub(crate) fn json_to_strings(value: sea_orm::JsonValue) -> Vec<String> {
    serde_json::from_value(value).unwrap_or_default()
}

/// Encode a string list for a JSONB column.
pub(crate) fn strings_to_json(values: &[String]) -> sea_orm::JsonValue {
    sea_orm::JsonValue::from(values.to_vec())
}
