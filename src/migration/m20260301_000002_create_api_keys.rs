//! Migration: Create api_keys table.
//!
//! Long-lived credentials. Only the SHA-256 hash of the secret is stored.
//! Credentials are deactivated, never deleted.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE api_keys (
                    id UUID PRIMARY KEY,
                    user_id UUID NOT NULL REFERENCES users(id),
                    name VARCHAR(100) NOT NULL,
                    access_key VARCHAR(64) NOT NULL,
                    secret_key_hash VARCHAR(64) NOT NULL,
                    scopes JSONB NOT NULL DEFAULT '[]'::jsonb,
                    allowed_ips JSONB NOT NULL DEFAULT '[]'::jsonb,
                    rate_limit INTEGER NOT NULL DEFAULT 1000,
                    is_active BOOLEAN NOT NULL DEFAULT TRUE,

                    expires_at TIMESTAMPTZ,
                    last_used_at TIMESTAMPTZ,
                    last_used_ip VARCHAR(64),

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                -- Public identifier must be globally unique
                CREATE UNIQUE INDEX idx_api_keys_access_key ON api_keys(access_key);

                -- Owner listing
                CREATE INDEX idx_api_keys_user_id ON api_keys(user_id);

                CREATE TRIGGER update_api_keys_updated_at
                    BEFORE UPDATE ON api_keys
                    FOR EACH ROW
                    EXECUTE FUNCTION update_updated_at_column();
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                DROP TRIGGER IF EXISTS update_api_keys_updated_at ON api_keys;
                DROP TABLE IF EXISTS api_keys CASCADE;
                "#,
            )
            .await?;

        Ok(())
    }
}
