//! Token endpoints: exchange, refresh, revocation, introspection and listing.

use actix_web::http::header::{CACHE_CONTROL, PRAGMA};
use actix_web::web::{self, Either};
use actix_web::{HttpRequest, HttpResponse, get, post};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{AuthType, CredentialAuth, PresentedCredentials, bearer_token, client_ip, hash_secret};
use crate::error::{AppError, AppResult};
use crate::models::access_token::ACCESS_TOKEN_TYPE;
use crate::models::{
    ListTokensResponse, Pagination, PaginationParams, RefreshRequest, RevokeRequest, TokenInfo,
    TokenListItem, TokenRequest, TokenResponse,
};
use crate::services::{AuthServices, issuance, revocation};

/// Configure token routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(issue_token)
        .service(refresh_token)
        .service(revoke_token)
        .service(token_info)
        .service(list_tokens);
}

/// `POST /revoke` response. Identical whether or not the token existed.
#[derive(Serialize, ToSchema)]
pub struct RevokeResponse {
    pub success: bool,
}

fn token_response(body: TokenResponse) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((CACHE_CONTROL, "no-store"))
        .insert_header((PRAGMA, "no-cache"))
        .json(body)
}

/// Exchange a credential for an access/refresh token pair.
///
/// Credentials come from the `X-API-Key`/`X-API-Secret` headers or the
/// `access_key`/`secret_key` (alias `client_id`/`client_secret`) body fields.
/// The body may be JSON or form encoded.
#[utoipa::path(
    post,
    path = "/api/v1/token",
    tag = "Tokens",
    request_body(content = TokenRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Token pair issued", body = TokenResponse),
        (status = 400, description = "Unsupported grant type or missing credentials", body = crate::error::ErrorResponse),
        (status = 401, description = "Unknown credential or wrong secret", body = crate::error::ErrorResponse),
        (status = 403, description = "Credential inactive/expired, IP not allowed, user inactive, or invalid scope", body = crate::error::ErrorResponse),
    ),
    security(
        (),
        ("api_key" = [], "api_secret" = [])
    )
)]
#[post("/token")]
pub async fn issue_token(
    req: HttpRequest,
    services: web::Data<AuthServices>,
    body: Either<web::Json<TokenRequest>, web::Form<TokenRequest>>,
) -> AppResult<HttpResponse> {
    let body = match body {
        Either::Left(json) => json.into_inner(),
        Either::Right(form) => form.into_inner(),
    };

    issuance::check_grant_type(body.grant_type.as_deref())?;

    let (access_key, secret) = match PresentedCredentials::from_request(&req) {
        PresentedCredentials::ApiKey { access_key, secret } => (access_key, secret),
        _ => match (body.access_key, body.secret_key) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                (key, SecretString::from(secret))
            }
            _ => return Err(AppError::MissingCredentials),
        },
    };

    let response = issuance::exchange(
        &services,
        issuance::ExchangeRequest {
            access_key: &access_key,
            secret: &secret,
            scope: body.scope.as_deref(),
            expires_in: body.expires_in,
            ip: client_ip(&req),
        },
    )
    .await?;

    Ok(token_response(response))
}

/// Spend a refresh token for a new pair. The presented pair is revoked.
#[utoipa::path(
    post,
    path = "/api/v1/refresh",
    tag = "Tokens",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 401, description = "Unknown or expired refresh token", body = crate::error::ErrorResponse),
        (status = 403, description = "Token revoked, credential or user inactive, or scope escalation", body = crate::error::ErrorResponse),
    )
)]
#[post("/refresh")]
pub async fn refresh_token(
    services: web::Data<AuthServices>,
    body: web::Json<RefreshRequest>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner();
    if body.refresh_token.trim().is_empty() {
        return Err(AppError::InvalidInput("refresh_token is required".to_string()));
    }

    let response = issuance::refresh(
        &services,
        body.refresh_token.trim(),
        body.scope.as_deref(),
        body.expires_in,
    )
    .await?;

    Ok(token_response(response))
}

/// Revoke an access or refresh token. Always succeeds.
#[utoipa::path(
    post,
    path = "/api/v1/revoke",
    tag = "Tokens",
    request_body(content = RevokeRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Token revoked if it existed", body = RevokeResponse),
    )
)]
#[post("/revoke")]
pub async fn revoke_token(
    services: web::Data<AuthServices>,
    body: Either<web::Json<RevokeRequest>, web::Form<RevokeRequest>>,
) -> HttpResponse {
    let body = match body {
        Either::Left(json) => json.into_inner(),
        Either::Right(form) => form.into_inner(),
    };
    revocation::revoke(&services, body.token.trim(), body.token_type_hint).await;
    HttpResponse::Ok().json(RevokeResponse { success: true })
}

fn claims_timestamp(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

/// Describe the presented bearer token.
///
/// Store-backed tokens are described whatever their state; `active` tells
/// whether the token would currently authenticate.
#[utoipa::path(
    get,
    path = "/api/v1/token-info",
    tag = "Tokens",
    responses(
        (status = 200, description = "Token details", body = TokenInfo),
        (status = 401, description = "No bearer token", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown token", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer" = [])
    )
)]
#[get("/token-info")]
pub async fn token_info(
    req: HttpRequest,
    services: web::Data<AuthServices>,
) -> AppResult<HttpResponse> {
    let token = bearer_token(&req).ok_or(AppError::MissingAuth)?;
    let token = token.expose_secret();
    let now = Utc::now();

    if let Some(record) = services
        .tokens
        .find_by_token_hash(&hash_secret(token))
        .await?
    {
        return Ok(HttpResponse::Ok().json(TokenInfo {
            active: record.is_active && !record.is_expired_at(now),
            auth_type: AuthType::AccessToken.to_string(),
            scopes: record.scopes,
            expires_at: Some(record.expires_at),
            created_at: Some(record.created_at),
            last_used_at: record.last_used_at,
        }));
    }

    match services.tokens.signer().decode(token) {
        Ok(claims) => {
            let expires_at = claims.expires_at();
            Ok(HttpResponse::Ok().json(TokenInfo {
                active: claims.token_type == ACCESS_TOKEN_TYPE
                    && !claims.is_store_minted()
                    && expires_at.is_some_and(|e| now < e),
                auth_type: AuthType::Legacy.to_string(),
                scopes: claims.scopes.unwrap_or_default(),
                expires_at,
                created_at: claims_timestamp(claims.iat),
                last_used_at: None,
            }))
        }
        Err(_) => Err(AppError::NotFound("Token".to_string())),
    }
}

/// List the calling principal's tokens. Requires a key/secret pair.
#[utoipa::path(
    get,
    path = "/api/v1/tokens",
    tag = "Tokens",
    params(
        ("page" = Option<u32>, Query, description = "Page number (default 1)"),
        ("limit" = Option<u32>, Query, description = "Items per page (default 20, max 100); alias per_page"),
    ),
    responses(
        (status = 200, description = "Token page", body = ListTokensResponse),
        (status = 401, description = "Missing or invalid credential", body = crate::error::ErrorResponse),
    ),
    security(
        ("api_key" = [], "api_secret" = [])
    )
)]
#[get("/tokens")]
pub async fn list_tokens(
    auth: CredentialAuth,
    services: web::Data<AuthServices>,
    query: web::Query<PaginationParams>,
) -> AppResult<HttpResponse> {
    let CredentialAuth(ctx) = auth;
    let limit = query.clamped_limit();

    let (tokens, total) = services
        .tokens
        .list_for_user(ctx.user_id(), query.offset(), u64::from(limit))
        .await?;

    Ok(HttpResponse::Ok().json(ListTokensResponse {
        tokens: tokens.into_iter().map(TokenListItem::from).collect(),
        pagination: Pagination::new(query.page(), limit, total),
    }))
}
