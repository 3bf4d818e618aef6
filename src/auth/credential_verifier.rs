//! Key/secret verification shared by the token endpoint and per-request
//! credential authentication.

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};

use super::{AuthContext, AuthType};
use crate::error::{AppError, AppResult};
use crate::models::{ApiKey, User};
use crate::services::AuthServices;
use crate::services::credential_store::CredentialStore;

/// Check a presented key/secret pair and resolve its owner.
///
/// Order: lookup, active flag, expiry, secret, IP allow-list, principal.
pub async fn verify_credential(
    services: &AuthServices,
    access_key: &str,
    secret: &SecretString,
    ip: Option<&str>,
) -> AppResult<(ApiKey, User)> {
    let key = services
        .credentials
        .find_by_access_key(access_key)
        .await?
        .ok_or(AppError::InvalidApiKey)?;

    if !key.is_active {
        return Err(AppError::ApiKeyInactive);
    }
    if let Some(expires_at) = key.expires_at
        && key.is_expired_at(Utc::now())
    {
        return Err(AppError::ApiKeyExpired { expires_at });
    }
    if !CredentialStore::verify_secret(secret.expose_secret(), &key.secret_key_hash) {
        return Err(AppError::InvalidApiSecret);
    }
    if !key.is_ip_allowed(ip) {
        return Err(AppError::IpNotAllowed(
            ip.unwrap_or("unknown").to_string(),
        ));
    }

    let user = services
        .users
        .find_by_id(key.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::UserInactive)?;

    Ok((key, user))
}

/// Authenticate the current request directly with a long-lived credential.
pub async fn authenticate_credential(
    services: &AuthServices,
    access_key: &str,
    secret: &SecretString,
    ip: Option<String>,
) -> AppResult<AuthContext> {
    let (key, user) = verify_credential(services, access_key, secret, ip.as_deref()).await?;
    services.credentials.touch(key.id, ip);

    Ok(AuthContext {
        principal: user,
        auth_type: AuthType::ApiKey,
        scopes: key.scopes,
        api_key_id: Some(key.id),
        token_id: None,
    })
}
