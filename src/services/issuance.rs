//! Credential exchange and refresh-token rotation.

use chrono::Utc;
use secrecy::SecretString;
use tracing::{error, info};

use super::AuthServices;
use crate::auth::credential_verifier::verify_credential;
use crate::auth::hash_secret;
use crate::auth::scope::{narrow_for_refresh, negotiate, parse_scope_param};
use crate::error::{AppError, AppResult};
use crate::models::TokenResponse;
use crate::models::access_token::CLIENT_CREDENTIALS_GRANT;

/// Reject anything but `client_credentials`.
pub fn check_grant_type(grant_type: Option<&str>) -> AppResult<()> {
    match grant_type {
        Some(CLIENT_CREDENTIALS_GRANT) => Ok(()),
        Some(other) => Err(AppError::UnsupportedGrantType(other.to_string())),
        None => Err(AppError::UnsupportedGrantType(
            "grant_type is required".to_string(),
        )),
    }
}

/// Input of [`exchange`].
pub struct ExchangeRequest<'a> {
    pub access_key: &'a str,
    pub secret: &'a SecretString,
    pub scope: Option<&'a str>,
    pub expires_in: Option<u64>,
    pub ip: Option<String>,
}

/// Trade a key/secret pair for a new access/refresh token pair.
pub async fn exchange(services: &AuthServices, req: ExchangeRequest<'_>) -> AppResult<TokenResponse> {
    let requested = parse_scope_param(req.scope)?;
    let (key, user) =
        verify_credential(services, req.access_key, req.secret, req.ip.as_deref()).await?;

    let scopes = negotiate(requested, &key.scopes)?;
    let pair = services
        .tokens
        .mint_pair(key.id, user.id, scopes, req.expires_in)?;

    if let Err(e) = services.tokens.persist(&pair.record).await {
        error!(
            user_id = %user.id,
            api_key_id = %key.id,
            "Failed to persist issued token: {}",
            e
        );
        return Err(e);
    }

    services.credentials.touch(key.id, req.ip);
    info!(
        user_id = %user.id,
        api_key_id = %key.id,
        token_id = %pair.record.id,
        scope = %pair.response.scope,
        "Issued access token"
    );

    Ok(pair.response)
}

/// Spend a refresh token for a new pair. The old pair is revoked whether or
/// not its access token has expired.
pub async fn refresh(
    services: &AuthServices,
    refresh_token: &str,
    scope: Option<&str>,
    expires_in: Option<u64>,
) -> AppResult<TokenResponse> {
    let requested = parse_scope_param(scope)?;

    let old = services
        .tokens
        .find_by_refresh_hash(&hash_secret(refresh_token))
        .await?
        .ok_or(AppError::InvalidRefreshToken)?;

    if !old.is_active {
        return Err(AppError::TokenRevoked);
    }
    if old.is_refresh_expired_at(Utc::now()) {
        return Err(AppError::RefreshTokenExpired {
            expires_at: old.refresh_token_expires_at,
        });
    }

    let key = services
        .credentials
        .get(old.api_key_id)
        .await?
        .ok_or(AppError::ApiKeyInactive)?;
    if !key.is_active {
        return Err(AppError::ApiKeyInactive);
    }
    if let Some(expires_at) = key.expires_at
        && key.is_expired_at(Utc::now())
    {
        return Err(AppError::ApiKeyExpired { expires_at });
    }

    let user = services
        .users
        .find_by_id(old.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::UserInactive)?;

    let scopes = narrow_for_refresh(requested, &old.scopes, &key.scopes)?;
    let pair = services
        .tokens
        .mint_pair(key.id, user.id, scopes, expires_in)?;

    match services.tokens.rotate(&old, &pair.record).await {
        Ok(()) => {}
        // Lost a race with another refresh or a revocation
        Err(AppError::TokenRevoked) => return Err(AppError::TokenRevoked),
        Err(e) => {
            error!(
                user_id = %user.id,
                token_id = %old.id,
                "Failed to rotate refresh token: {}",
                e
            );
            return Err(e);
        }
    }

    info!(
        user_id = %user.id,
        api_key_id = %key.id,
        old_token_id = %old.id,
        token_id = %pair.record.id,
        "Refreshed access token"
    );

    Ok(pair.response)
}
