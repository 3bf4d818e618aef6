//! Whoami endpoint.

use actix_web::{HttpResponse, get, web};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{AuthType, Authenticated};

/// The authenticated caller as every protected route sees it.
#[derive(Serialize, ToSchema)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub auth_type: AuthType,
    pub scopes: Vec<String>,
    pub api_key_id: Option<Uuid>,
    pub token_id: Option<Uuid>,
}

/// Return the normalized authentication context of the request.
#[utoipa::path(
    get,
    path = "/api/v1/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Authenticated caller", body = MeResponse),
        (status = 401, description = "Missing or invalid authentication", body = crate::error::ErrorResponse),
        (status = 403, description = "Revoked token, inactive credential or user", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer" = []),
        ("api_key" = [], "api_secret" = [])
    )
)]
#[get("/me")]
pub async fn me(Authenticated(ctx): Authenticated) -> HttpResponse {
    HttpResponse::Ok().json(MeResponse {
        user_id: ctx.principal.id,
        username: ctx.principal.username,
        email: ctx.principal.email,
        auth_type: ctx.auth_type,
        scopes: ctx.scopes,
        api_key_id: ctx.api_key_id,
        token_id: ctx.token_id,
    })
}

/// Configure whoami routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(me);
}
