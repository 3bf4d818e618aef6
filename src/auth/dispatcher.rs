//! Chooses the verification strategy for a request and exposes the result
//! as actix extractors.
//!
//! # Security
//! - Secrets and bearer strings are wrapped in `SecretString` as soon as they
//!   are read and never logged

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{FromRequest, HttpRequest, web};
use futures_util::future::LocalBoxFuture;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::credential_verifier::authenticate_credential;
use super::token_verifier::verify_bearer;
use super::{AuthContext, client_ip};
use crate::config::{API_KEY_HEADER, API_SECRET_HEADER};
use crate::error::{AppError, AppResult};
use crate::services::AuthServices;

#[derive(Deserialize)]
struct KeyQuery {
    api_key: Option<String>,
    api_secret: Option<String>,
}

fn header_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Bearer string from `Authorization: Bearer <token>`.
pub fn bearer_token(req: &HttpRequest) -> Option<SecretString> {
    let value = header_value(req, AUTHORIZATION.as_str())?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(SecretString::from(token.to_string()))
    } else {
        None
    }
}

/// Authentication material found on a request.
pub enum PresentedCredentials {
    ApiKey {
        access_key: String,
        secret: SecretString,
    },
    Bearer(SecretString),
    None,
}

impl PresentedCredentials {
    /// Key/secret headers, then key/secret query parameters, then a bearer
    /// token. Only a complete pair counts as a credential.
    pub fn from_request(req: &HttpRequest) -> Self {
        if let (Some(access_key), Some(secret)) = (
            header_value(req, API_KEY_HEADER),
            header_value(req, API_SECRET_HEADER),
        ) {
            return Self::ApiKey {
                access_key,
                secret: SecretString::from(secret),
            };
        }

        if let Ok(query) = web::Query::<KeyQuery>::from_query(req.query_string())
            && let KeyQuery {
                api_key: Some(access_key),
                api_secret: Some(secret),
            } = query.into_inner()
            && !access_key.is_empty()
            && !secret.is_empty()
        {
            return Self::ApiKey {
                access_key,
                secret: SecretString::from(secret),
            };
        }

        match bearer_token(req) {
            Some(token) => Self::Bearer(token),
            None => Self::None,
        }
    }
}

impl std::fmt::Debug for PresentedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey { access_key, .. } => f
                .debug_struct("ApiKey")
                .field("access_key", access_key)
                .field("secret", &"[REDACTED]")
                .finish(),
            Self::Bearer(_) => write!(f, "Bearer([REDACTED])"),
            Self::None => write!(f, "None"),
        }
    }
}

/// Route presented material to the matching verifier.
pub async fn authenticate(
    services: &AuthServices,
    presented: PresentedCredentials,
    ip: Option<String>,
) -> AppResult<AuthContext> {
    match presented {
        PresentedCredentials::ApiKey { access_key, secret } => {
            authenticate_credential(services, &access_key, &secret, ip).await
        }
        PresentedCredentials::Bearer(token) => {
            verify_bearer(services, token.expose_secret(), ip).await
        }
        PresentedCredentials::None => Err(AppError::MissingAuth),
    }
}

fn services_of(req: &HttpRequest) -> AppResult<web::Data<AuthServices>> {
    req.app_data::<web::Data<AuthServices>>()
        .cloned()
        .ok_or_else(|| AppError::Internal("AuthServices not registered".to_string()))
}

/// Extractor for routes open to any authentication scheme.
///
/// ```ignore
/// async fn handler(Authenticated(ctx): Authenticated) -> impl Responder {
///     ctx.require_any(&["orders.read"])?;
///     // ...
/// }
/// ```
pub struct Authenticated(pub AuthContext);

impl FromRequest for Authenticated {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let services = services_of(req);
        let presented = PresentedCredentials::from_request(req);
        let ip = client_ip(req);

        Box::pin(async move {
            let services = services?;
            authenticate(&services, presented, ip).await.map(Authenticated)
        })
    }
}

/// Extractor for routes that accept only a key/secret pair.
pub struct CredentialAuth(pub AuthContext);

impl FromRequest for CredentialAuth {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let services = services_of(req);
        let presented = PresentedCredentials::from_request(req);
        let ip = client_ip(req);

        Box::pin(async move {
            let services = services?;
            match presented {
                PresentedCredentials::ApiKey { access_key, secret } => {
                    authenticate_credential(&services, &access_key, &secret, ip)
                        .await
                        .map(CredentialAuth)
                }
                _ => Err(AppError::MissingAuth),
            }
        })
    }
}
