//! Credential management endpoints.
//!
//! Owners authenticate like any other caller and need the `keys.manage`
//! scope; the bootstrap administrator uses `X-Admin-Key` and names the
//! target user explicitly.

use std::net::IpAddr;

use actix_web::{HttpResponse, delete, get, patch, post, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{ADMIN_OVERRIDE_SCOPES, ManagementCaller};
use crate::auth::scope::{grant_covers, validate_scopes};
use crate::error::{AppError, AppResult};
use crate::models::{
    ApiKey, ApiKeyCreateResponse, ApiKeyListItem, ApiKeyPolicy, CreateApiKeyRequest,
    ListApiKeysResponse, RegenerateSecretResponse, UpdateApiKeyRequest,
};
use crate::services::AuthServices;
use crate::services::credential_store::expiry_from;

/// Configure credential management routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_key)
        .service(list_keys)
        .service(get_key)
        .service(regenerate_secret)
        .service(update_key)
        .service(deactivate_key);
}

/// `GET /keys` query.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListKeysQuery {
    /// Principal whose keys to list; required with the admin key
    pub user_id: Option<Uuid>,
}

/// `DELETE /keys/{id}` response.
#[derive(Serialize, ToSchema)]
pub struct DeactivateKeyResponse {
    pub success: bool,
    /// Tokens issued from the key that were still active
    pub revoked_tokens: u64,
}

fn validate_ips(ips: &[String]) -> AppResult<Vec<String>> {
    ips.iter()
        .map(|ip| {
            ip.trim()
                .parse::<IpAddr>()
                .map(|parsed| parsed.to_string())
                .map_err(|_| AppError::InvalidInput(format!("Invalid IP address: {}", ip)))
        })
        .collect()
}

fn validate_rate_limit(rate_limit: Option<i32>) -> AppResult<Option<i32>> {
    match rate_limit {
        Some(n) if n <= 0 => Err(AppError::InvalidInput(
            "rate_limit must be positive".to_string(),
        )),
        other => Ok(other),
    }
}

/// Owners cannot hand a credential more than they hold themselves.
fn check_grantable(caller: &ManagementCaller, scopes: &[String]) -> AppResult<()> {
    let ManagementCaller::Owner(ctx) = caller else {
        return Ok(());
    };
    if ctx
        .scopes
        .iter()
        .any(|s| ADMIN_OVERRIDE_SCOPES.contains(&s.as_str()))
    {
        return Ok(());
    }
    if scopes
        .iter()
        .all(|s| ctx.scopes.iter().any(|g| grant_covers(g, s)))
    {
        return Ok(());
    }
    Err(AppError::InvalidScope {
        requested: scopes.to_vec(),
        allowed: ctx.scopes.clone(),
    })
}

/// Load a key the caller may see. Other owners' keys are reported as missing.
async fn load_key(
    services: &AuthServices,
    caller: &ManagementCaller,
    id: Uuid,
) -> AppResult<ApiKey> {
    services
        .credentials
        .get(id)
        .await?
        .filter(|key| caller.can_access(key))
        .ok_or_else(|| AppError::NotFound(format!("API key {}", id)))
}

/// Create a new credential.
///
/// The secret is returned only in this response.
#[utoipa::path(
    post,
    path = "/api/v1/keys",
    tag = "Keys",
    request_body = CreateApiKeyRequest,
    responses(
        (status = 201, description = "Credential created", body = ApiKeyCreateResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 403, description = "Missing keys.manage scope or scope not grantable", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = []),
        ("bearer" = []),
        ("api_key" = [], "api_secret" = [])
    )
)]
#[post("/keys")]
pub async fn create_key(
    caller: ManagementCaller,
    services: web::Data<AuthServices>,
    body: web::Json<CreateApiKeyRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();

    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("name is required".to_string()));
    }

    let user_id = caller.target_user(req.user_id)?;
    services
        .users
        .find_by_id(user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

    let scopes = validate_scopes(&req.scopes)?;
    check_grantable(&caller, &scopes)?;

    let policy = ApiKeyPolicy {
        scopes,
        allowed_ips: validate_ips(&req.allowed_ips)?,
        rate_limit: validate_rate_limit(req.rate_limit)?,
        expires_at: req
            .expires_in
            .as_deref()
            .map(|e| expiry_from(e, Utc::now()))
            .transpose()?,
    };

    let (key, secret) = services.credentials.create(user_id, name, policy).await?;
    info!(
        api_key_id = %key.id,
        actor = %caller.actor(),
        "Credential created via API"
    );

    Ok(HttpResponse::Created().json(ApiKeyCreateResponse::new(key, secret)))
}

/// List credentials.
#[utoipa::path(
    get,
    path = "/api/v1/keys",
    tag = "Keys",
    params(ListKeysQuery),
    responses(
        (status = 200, description = "Credentials", body = ListApiKeysResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = []),
        ("bearer" = []),
        ("api_key" = [], "api_secret" = [])
    )
)]
#[get("/keys")]
pub async fn list_keys(
    caller: ManagementCaller,
    services: web::Data<AuthServices>,
    query: web::Query<ListKeysQuery>,
) -> AppResult<HttpResponse> {
    let user_id = caller.target_user(query.user_id)?;
    let keys = services.credentials.list_for_user(user_id).await?;

    Ok(HttpResponse::Ok().json(ListApiKeysResponse {
        keys: keys.into_iter().map(ApiKeyListItem::from).collect(),
    }))
}

/// Get one credential.
#[utoipa::path(
    get,
    path = "/api/v1/keys/{id}",
    tag = "Keys",
    params(
        ("id" = Uuid, Path, description = "Credential ID")
    ),
    responses(
        (status = 200, description = "Credential", body = ApiKeyListItem),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = []),
        ("bearer" = []),
        ("api_key" = [], "api_secret" = [])
    )
)]
#[get("/keys/{id}")]
pub async fn get_key(
    caller: ManagementCaller,
    services: web::Data<AuthServices>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let key = load_key(&services, &caller, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiKeyListItem::from(key)))
}

/// Replace a credential's secret. The access key and issued tokens are kept.
#[utoipa::path(
    post,
    path = "/api/v1/keys/{id}/regenerate",
    tag = "Keys",
    params(
        ("id" = Uuid, Path, description = "Credential ID")
    ),
    responses(
        (status = 200, description = "New secret", body = RegenerateSecretResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = []),
        ("bearer" = []),
        ("api_key" = [], "api_secret" = [])
    )
)]
#[post("/keys/{id}/regenerate")]
pub async fn regenerate_secret(
    caller: ManagementCaller,
    services: web::Data<AuthServices>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let key = load_key(&services, &caller, path.into_inner()).await?;
    let (key, secret_key) = services.credentials.regenerate_secret(key).await?;

    info!(api_key_id = %key.id, actor = %caller.actor(), "Credential secret regenerated");

    Ok(HttpResponse::Ok().json(RegenerateSecretResponse {
        id: key.id,
        access_key: key.access_key,
        secret_key,
    }))
}

/// Update a credential's name or policy.
///
/// Setting `is_active: false` revokes the credential's tokens like `DELETE`.
/// Only the administrator may reactivate a credential.
#[utoipa::path(
    patch,
    path = "/api/v1/keys/{id}",
    tag = "Keys",
    params(
        ("id" = Uuid, Path, description = "Credential ID")
    ),
    request_body = UpdateApiKeyRequest,
    responses(
        (status = 200, description = "Updated credential", body = ApiKeyListItem),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = []),
        ("bearer" = []),
        ("api_key" = [], "api_secret" = [])
    )
)]
#[patch("/keys/{id}")]
pub async fn update_key(
    caller: ManagementCaller,
    services: web::Data<AuthServices>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateApiKeyRequest>,
) -> AppResult<HttpResponse> {
    let mut key = load_key(&services, &caller, path.into_inner()).await?;
    let req = body.into_inner();

    let reactivating = req.is_active == Some(true) && !key.is_active;
    let deactivating = req.is_active == Some(false) && key.is_active;
    if reactivating && !matches!(caller, ManagementCaller::Admin) {
        return Err(AppError::Unauthorized(
            "Only the administrator can reactivate a credential".to_string(),
        ));
    }

    if let Some(name) = req.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidInput("name cannot be empty".to_string()));
        }
        key.name = name.to_string();
    }
    if let Some(scopes) = req.scopes {
        let scopes = validate_scopes(&scopes)?;
        check_grantable(&caller, &scopes)?;
        key.scopes = scopes;
    }
    if let Some(ips) = req.allowed_ips {
        key.allowed_ips = validate_ips(&ips)?;
    }
    if let Some(rate_limit) = validate_rate_limit(req.rate_limit)? {
        key.rate_limit = rate_limit;
    }
    if let Some(expires_in) = req.expires_in {
        key.expires_at = if expires_in.trim().eq_ignore_ascii_case("never") {
            None
        } else {
            Some(expiry_from(&expires_in, Utc::now())?)
        };
    }
    if let Some(is_active) = req.is_active {
        key.is_active = is_active;
    }

    let key = services.credentials.update(key).await?;
    if deactivating {
        let revoked_tokens = services.tokens.revoke_all_for_key(key.id).await?;
        info!(
            api_key_id = %key.id,
            actor = %caller.actor(),
            revoked_tokens,
            "Credential deactivated"
        );
    } else {
        info!(api_key_id = %key.id, actor = %caller.actor(), "Credential updated");
    }

    Ok(HttpResponse::Ok().json(ApiKeyListItem::from(key)))
}

/// Deactivate a credential and revoke every token issued from it.
#[utoipa::path(
    delete,
    path = "/api/v1/keys/{id}",
    tag = "Keys",
    params(
        ("id" = Uuid, Path, description = "Credential ID")
    ),
    responses(
        (status = 200, description = "Credential deactivated", body = DeactivateKeyResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = []),
        ("bearer" = []),
        ("api_key" = [], "api_secret" = [])
    )
)]
#[delete("/keys/{id}")]
pub async fn deactivate_key(
    caller: ManagementCaller,
    services: web::Data<AuthServices>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let mut key = load_key(&services, &caller, path.into_inner()).await?;

    key.is_active = false;
    let key = services.credentials.update(key).await?;
    let revoked_tokens = services.tokens.revoke_all_for_key(key.id).await?;

    info!(
        api_key_id = %key.id,
        actor = %caller.actor(),
        revoked_tokens,
        "Credential deactivated"
    );

    Ok(HttpResponse::Ok().json(DeactivateKeyResponse {
        success: true,
        revoked_tokens,
    }))
}
