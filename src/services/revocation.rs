//! Token revocation. Never reports whether a token existed.

use tracing::{debug, warn};

use super::AuthServices;
use crate::auth::hash_secret;
use crate::error::AppResult;
use crate::models::{AccessToken, TokenTypeHint};

async fn lookup(
    services: &AuthServices,
    token: &str,
    hint: Option<TokenTypeHint>,
) -> AppResult<Option<AccessToken>> {
    let hash = hash_secret(token);

    if let Some(record) = services.tokens.find_by_token_hash(&hash).await? {
        return Ok(Some(record));
    }
    if hint == Some(TokenTypeHint::AccessToken) {
        return Ok(None);
    }
    services.tokens.find_by_refresh_hash(&hash).await
}

/// Revoke the pair `token` belongs to, if any. Storage failures are logged
/// and swallowed so the caller's response is the same in every case.
pub async fn revoke(services: &AuthServices, token: &str, hint: Option<TokenTypeHint>) {
    let result = match lookup(services, token, hint).await {
        Ok(Some(record)) => services.tokens.revoke(&record).await.map(|()| Some(record.id)),
        Ok(None) => Ok(None),
        Err(e) => Err(e),
    };

    match result {
        Ok(Some(id)) => debug!(token_id = %id, "Revoked token"),
        Ok(None) => debug!("Revocation requested for unknown token"),
        Err(e) => warn!("Revocation failed: {}", e),
    }
}
