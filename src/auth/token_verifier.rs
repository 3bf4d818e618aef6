//! Bearer token verification.
//!
//! A bearer string resolves either to a store record or, when no record
//! matches, to the claims of a self-contained signed token. Both paths end
//! in the same [`AuthContext`].

use chrono::Utc;
use uuid::Uuid;

use super::{AuthContext, AuthType, hash_secret};
use crate::error::{AppError, AppResult};
use crate::models::{AccessClaims, AccessToken, User};
use crate::services::AuthServices;

/// What a bearer string turned out to be.
#[derive(Debug)]
pub enum TokenResolution {
    StoreBacked(AccessToken),
    SelfContained(AccessClaims),
}

/// Classify a bearer string. A store record wins whatever its state, so a
/// revoked token never falls through to the self-contained path. A token
/// minted from a credential whose record is gone counts as revoked.
pub async fn resolve(services: &AuthServices, bearer: &str) -> AppResult<TokenResolution> {
    match services
        .tokens
        .find_by_token_hash(&hash_secret(bearer))
        .await?
    {
        Some(record) => Ok(TokenResolution::StoreBacked(record)),
        None => {
            let claims = services.tokens.verify_self_contained(bearer)?;
            if claims.is_store_minted() {
                return Err(AppError::TokenRevoked);
            }
            Ok(TokenResolution::SelfContained(claims))
        }
    }
}

async fn active_principal(services: &AuthServices, user_id: Uuid) -> AppResult<User> {
    services
        .users
        .find_by_id(user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::UserInactive)
}

/// Authenticate the current request with a bearer token.
pub async fn verify_bearer(
    services: &AuthServices,
    bearer: &str,
    ip: Option<String>,
) -> AppResult<AuthContext> {
    match resolve(services, bearer).await? {
        TokenResolution::StoreBacked(record) => {
            if !record.is_active {
                return Err(AppError::TokenRevoked);
            }
            if record.is_expired_at(Utc::now()) {
                return Err(AppError::TokenExpired {
                    expires_at: record.expires_at,
                });
            }
            let principal = active_principal(services, record.user_id).await?;
            services.tokens.touch(record.id, ip);

            Ok(AuthContext {
                principal,
                auth_type: AuthType::AccessToken,
                scopes: record.scopes,
                api_key_id: Some(record.api_key_id),
                token_id: Some(record.id),
            })
        }
        TokenResolution::SelfContained(claims) => {
            let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)?;
            let principal = active_principal(services, user_id).await?;
            // Tokens minted without a scopes claim act with the principal's roles
            let scopes = claims
                .scopes
                .unwrap_or_else(|| principal.default_scopes());

            Ok(AuthContext {
                principal,
                auth_type: AuthType::Legacy,
                scopes,
                api_key_id: None,
                token_id: None,
            })
        }
    }
}
