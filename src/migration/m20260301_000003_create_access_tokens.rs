//! Migration: Create access_tokens table.
//!
//! One row per issued access/refresh pair, keyed by the hashes of both
//! bearer strings. Enables revocation and refresh-token rotation.

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
                CREATE TABLE access_tokens (
                    id UUID PRIMARY KEY,
                    token_hash VARCHAR(64) NOT NULL,
                    refresh_token_hash VARCHAR(64) NOT NULL,
                    api_key_id UUID NOT NULL REFERENCES api_keys(id),
                    user_id UUID NOT NULL REFERENCES users(id),
                    scopes JSONB NOT NULL DEFAULT '[]'::jsonb,
                    is_active BOOLEAN NOT NULL DEFAULT TRUE,
                    expires_at TIMESTAMPTZ NOT NULL,
                    refresh_token_expires_at TIMESTAMPTZ NOT NULL,
                    last_used_at TIMESTAMPTZ,
                    last_used_ip VARCHAR(64),

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    revoked_at TIMESTAMPTZ
                );

                -- Bearer and refresh lookups
                CREATE UNIQUE INDEX idx_access_tokens_token_hash ON access_tokens(token_hash);
                CREATE UNIQUE INDEX idx_access_tokens_refresh_hash
                    ON access_tokens(refresh_token_hash);

                -- Principal listing (newest first)
                CREATE INDEX idx_access_tokens_user_created
                    ON access_tokens(user_id, created_at DESC);

                -- Revoke-all on credential deactivation
                CREATE INDEX idx_access_tokens_api_key_active
                    ON access_tokens(api_key_id)
                    WHERE is_active;

                -- Cleanup sweep
                CREATE INDEX idx_access_tokens_refresh_expires_at
                    ON access_tokens(refresh_token_expires_at);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS access_tokens CASCADE;")
            .await?;

        Ok(())
    }
}
