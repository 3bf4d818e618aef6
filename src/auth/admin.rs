//! Caller identity for credential management routes.

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest, web};
use futures_util::future::LocalBoxFuture;
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use super::dispatcher::{PresentedCredentials, authenticate};
use super::{AdminKey, AuthContext, client_ip};
use crate::config::ADMIN_KEY_HEADER;
use crate::error::AppError;
use crate::models::ApiKey;
use crate::services::AuthServices;

/// Scope an owner needs to manage their own credentials.
pub const KEYS_MANAGE_SCOPE: &str = "keys.manage";

/// Either the bootstrap administrator or a principal managing their own keys.
pub enum ManagementCaller {
    Admin,
    Owner(AuthContext),
}

impl ManagementCaller {
    /// Principal a request acts on. Administrators must name one; owners act
    /// on themselves.
    pub fn target_user(&self, requested: Option<Uuid>) -> Result<Uuid, AppError> {
        match self {
            ManagementCaller::Admin => requested.ok_or_else(|| {
                AppError::InvalidInput("user_id is required with the admin key".to_string())
            }),
            ManagementCaller::Owner(ctx) => match requested {
                Some(id) if id != ctx.user_id() => Err(AppError::Unauthorized(
                    "Cannot manage credentials of another user".to_string(),
                )),
                _ => Ok(ctx.user_id()),
            },
        }
    }

    /// Owners only see their own credentials.
    pub fn can_access(&self, key: &ApiKey) -> bool {
        match self {
            ManagementCaller::Admin => true,
            ManagementCaller::Owner(ctx) => key.user_id == ctx.user_id(),
        }
    }

    /// Label for audit logging.
    pub fn actor(&self) -> String {
        match self {
            ManagementCaller::Admin => "admin".to_string(),
            ManagementCaller::Owner(ctx) => ctx.user_id().to_string(),
        }
    }
}

impl FromRequest for ManagementCaller {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let services = req.app_data::<web::Data<AuthServices>>().cloned();
        let admin_key = req.app_data::<web::Data<AdminKey>>().cloned();
        let provided_admin = req
            .headers()
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(SecretString::from);
        let presented = PresentedCredentials::from_request(req);
        let ip = client_ip(req);

        Box::pin(async move {
            if let Some(provided) = provided_admin {
                return match admin_key {
                    Some(key) if key.verify(provided.expose_secret()) => {
                        Ok(ManagementCaller::Admin)
                    }
                    _ => Err(AppError::Unauthorized("Invalid admin key".to_string())),
                };
            }

            let services = services
                .ok_or_else(|| AppError::Internal("AuthServices not registered".to_string()))?;
            let ctx = authenticate(&services, presented, ip).await?;
            ctx.require_any(&[KEYS_MANAGE_SCOPE])?;
            Ok(ManagementCaller::Owner(ctx))
        })
    }
}
