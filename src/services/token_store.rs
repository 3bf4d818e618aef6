//! Access/refresh token minting, signing, lookup and revocation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use tracing::warn;
use uuid::Uuid;

use crate::auth::{hash_secret, random_hex};
use crate::auth::scope::format_scopes;
use crate::config::TokenSettings;
use crate::error::{AppError, AppResult};
use crate::models::access_token::ACCESS_TOKEN_TYPE;
use crate::models::{AccessClaims, AccessToken, TokenResponse};
use crate::store::AccessTokenRepository;

/// Refresh token prefix.
const REFRESH_TOKEN_PREFIX: &str = "rt_";

/// A bearer string together with what gets stored about it.
pub struct IssuedToken {
    pub token: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// A new token pair: the record to persist and the response to return.
pub struct MintedPair {
    pub record: AccessToken,
    pub response: TokenResponse,
}

/// HS256 signer and verifier for self-contained access tokens.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
}

impl TokenSigner {
    pub fn new(settings: &TokenSettings) -> Self {
        let secret = settings.signing_secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: settings.issuer.clone(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn sign(&self, claims: &AccessClaims) -> AppResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign access token: {}", e)))
    }

    /// Check signature and issuer only. Expiry and type are left to the caller
    /// so that an expired token can be reported with its expiry.
    pub fn decode(&self, token: &str) -> AppResult<AccessClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = false;
        validation.validate_aud = false;

        decode::<AccessClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::InvalidToken)
    }
}

/// Owner of all access token records.
#[derive(Clone)]
pub struct TokenStore {
    repo: Arc<dyn AccessTokenRepository>,
    signer: TokenSigner,
    settings: TokenSettings,
}

impl TokenStore {
    pub fn new(repo: Arc<dyn AccessTokenRepository>, settings: TokenSettings) -> Self {
        Self {
            repo,
            signer: TokenSigner::new(&settings),
            settings,
        }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Sign an access token for `user_id`.
    ///
    /// `scopes: None` yields a token whose scopes default to the principal's
    /// roles at verification time.
    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        api_key_id: Option<Uuid>,
        scopes: Option<Vec<String>>,
        ttl_secs: u64,
        now: DateTime<Utc>,
    ) -> AppResult<IssuedToken> {
        let expires_at = now + seconds(ttl_secs);
        let claims = AccessClaims {
            sub: user_id.to_string(),
            api_key_id: api_key_id.map(|id| id.to_string()),
            scopes,
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            iss: self.signer.issuer().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = self.signer.sign(&claims)?;
        Ok(IssuedToken {
            token_hash: hash_secret(&token),
            token,
            expires_at,
        })
    }

    /// Opaque refresh token. It carries no claims and is only a lookup key.
    pub fn issue_refresh_token(&self, now: DateTime<Utc>) -> IssuedToken {
        let token = format!("{}{}", REFRESH_TOKEN_PREFIX, random_hex::<32>());
        IssuedToken {
            token_hash: hash_secret(&token),
            token,
            expires_at: now + seconds(self.settings.refresh_ttl_secs),
        }
    }

    /// Mint a store-backed pair. Nothing is persisted here.
    pub fn mint_pair(
        &self,
        api_key_id: Uuid,
        user_id: Uuid,
        scopes: Vec<String>,
        requested_ttl: Option<u64>,
    ) -> AppResult<MintedPair> {
        let now = Utc::now();
        let ttl = self.settings.clamp_ttl(requested_ttl);
        let access =
            self.issue_access_token(user_id, Some(api_key_id), Some(scopes.clone()), ttl, now)?;
        let refresh = self.issue_refresh_token(now);

        let response = TokenResponse {
            access_token: access.token,
            token_type: "Bearer".to_string(),
            expires_in: ttl,
            expires_at: access.expires_at,
            refresh_token: refresh.token,
            refresh_token_expires_at: refresh.expires_at,
            scope: format_scopes(&scopes),
        };
        let record = AccessToken {
            id: Uuid::new_v4(),
            token_hash: access.token_hash,
            refresh_token_hash: refresh.token_hash,
            api_key_id,
            user_id,
            scopes,
            is_active: true,
            expires_at: access.expires_at,
            refresh_token_expires_at: refresh.expires_at,
            last_used_at: None,
            last_used_ip: None,
            created_at: now,
            revoked_at: None,
        };

        Ok(MintedPair { record, response })
    }

    /// Verify a bearer string as a self-contained token: signature, then
    /// expiry, then type.
    pub fn verify_self_contained(&self, token: &str) -> AppResult<AccessClaims> {
        let claims = self.signer.decode(token)?;
        let expires_at = claims.expires_at().ok_or(AppError::InvalidToken)?;
        if Utc::now() >= expires_at {
            return Err(AppError::TokenExpired { expires_at });
        }
        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AppError::InvalidTokenType {
                expected: ACCESS_TOKEN_TYPE,
            });
        }
        Ok(claims)
    }

    pub async fn find_by_token_hash(&self, token_hash: &str) -> AppResult<Option<AccessToken>> {
        self.repo.find_by_token_hash(token_hash).await
    }

    pub async fn find_by_refresh_hash(&self, refresh_hash: &str) -> AppResult<Option<AccessToken>> {
        self.repo.find_by_refresh_hash(refresh_hash).await
    }

    pub async fn persist(&self, record: &AccessToken) -> AppResult<()> {
        self.repo.insert(record).await
    }

    /// Spend `old` and store `replacement` as one unit.
    pub async fn rotate(&self, old: &AccessToken, replacement: &AccessToken) -> AppResult<()> {
        self.repo.rotate(old.id, replacement, Utc::now()).await
    }

    /// Deactivate a record. Revoking an inactive record is a no-op.
    pub async fn revoke(&self, record: &AccessToken) -> AppResult<()> {
        if record.is_active {
            self.repo.deactivate(record.id, Utc::now()).await?;
        }
        Ok(())
    }

    pub async fn revoke_all_for_key(&self, api_key_id: Uuid) -> AppResult<u64> {
        self.repo.deactivate_by_api_key(api_key_id, Utc::now()).await
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> AppResult<(Vec<AccessToken>, u64)> {
        self.repo.list_by_user(user_id, offset, limit).await
    }

    pub async fn purge_expired(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        self.repo.purge_expired(cutoff).await
    }

    /// Record usage in the background. Failures are logged only.
    pub fn touch(&self, token_id: Uuid, ip: Option<String>) {
        let repo = self.repo.clone();
        let now = Utc::now();
        tokio::spawn(async move {
            if let Err(e) = repo.record_usage(token_id, ip.as_deref(), now).await {
                warn!(token_id = %token_id, "Failed to record token usage: {}", e);
            }
        });
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
}
