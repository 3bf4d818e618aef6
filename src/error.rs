//! Domain error types for the token exchange server.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.
//! Every variant maps to exactly one HTTP status and one machine-readable code.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// `grant_type` missing or not `client_credentials`
    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// Invalid input data
    #[error("Invalid request: {0}")]
    InvalidInput(String),

    /// No access key / secret pair supplied to the token endpoint
    #[error("Missing credentials. Provide X-API-Key and X-API-Secret headers or access_key and secret_key in the body")]
    MissingCredentials,

    /// No recognizable authentication on a protected route
    #[error("Missing authentication. Provide X-API-Key/X-API-Secret or Authorization: Bearer")]
    MissingAuth,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Invalid API secret")]
    InvalidApiSecret,

    #[error("API key is inactive")]
    ApiKeyInactive,

    #[error("API key has expired")]
    ApiKeyExpired { expires_at: DateTime<Utc> },

    #[error("IP address {0} is not allowed for this API key")]
    IpNotAllowed(String),

    #[error("User is inactive or does not exist")]
    UserInactive,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired { expires_at: DateTime<Utc> },

    #[error("Invalid token type: expected {expected}")]
    InvalidTokenType { expected: &'static str },

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Refresh token has expired")]
    RefreshTokenExpired { expires_at: DateTime<Utc> },

    /// Requested scopes cannot be granted
    #[error("Requested scope is not allowed")]
    InvalidScope {
        requested: Vec<String>,
        allowed: Vec<String>,
    },

    /// None of the acceptable scopes were granted
    #[error("Insufficient scope")]
    InsufficientScope {
        required: Vec<String>,
        granted: Vec<String>,
    },

    /// At least one mandatory scope was not granted
    #[error("Missing required scope")]
    MissingScope {
        required: Vec<String>,
        granted: Vec<String>,
    },

    /// Authentication failed (admin key, ownership)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Unique constraint violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable error code returned in the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::UnsupportedGrantType(_) => "UNSUPPORTED_GRANT_TYPE",
            AppError::InvalidInput(_) => "INVALID_REQUEST",
            AppError::MissingCredentials => "MISSING_CREDENTIALS",
            AppError::MissingAuth => "MISSING_AUTH",
            AppError::InvalidApiKey => "INVALID_API_KEY",
            AppError::InvalidApiSecret => "INVALID_API_SECRET",
            AppError::ApiKeyInactive => "API_KEY_INACTIVE",
            AppError::ApiKeyExpired { .. } => "API_KEY_EXPIRED",
            AppError::IpNotAllowed(_) => "IP_NOT_ALLOWED",
            AppError::UserInactive => "USER_INACTIVE",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::TokenExpired { .. } => "TOKEN_EXPIRED",
            AppError::InvalidTokenType { .. } => "INVALID_TOKEN_TYPE",
            AppError::TokenRevoked => "TOKEN_REVOKED",
            AppError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            AppError::RefreshTokenExpired { .. } => "REFRESH_TOKEN_EXPIRED",
            AppError::InvalidScope { .. } => "INVALID_SCOPE",
            AppError::InsufficientScope { .. } => "INSUFFICIENT_SCOPE",
            AppError::MissingScope { .. } => "MISSING_SCOPE",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Build the JSON body for this error.
    pub fn to_response(&self) -> ErrorResponse {
        let mut body = ErrorResponse::new(self.code(), self.to_string());
        match self {
            AppError::Database(_) => {
                body.message = "An internal database error occurred".to_string();
            }
            AppError::Internal(_) => {
                body.message = "An internal error occurred".to_string();
            }
            AppError::ApiKeyExpired { expires_at }
            | AppError::TokenExpired { expires_at }
            | AppError::RefreshTokenExpired { expires_at } => {
                body.expires_at = Some(expires_at.to_rfc3339());
            }
            AppError::InvalidScope { requested, allowed } => {
                body.requested_scopes = Some(requested.clone());
                body.allowed_scopes = Some(allowed.clone());
            }
            AppError::InsufficientScope { required, granted }
            | AppError::MissingScope { required, granted } => {
                body.required_scopes = Some(required.clone());
                body.granted_scopes = Some(granted.clone());
            }
            _ => {}
        }
        body
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::UnsupportedGrantType(_)
            | AppError::InvalidInput(_)
            | AppError::MissingCredentials => StatusCode::BAD_REQUEST,
            AppError::MissingAuth
            | AppError::InvalidApiKey
            | AppError::InvalidApiSecret
            | AppError::InvalidToken
            | AppError::TokenExpired { .. }
            | AppError::InvalidTokenType { .. }
            | AppError::InvalidRefreshToken
            | AppError::RefreshTokenExpired { .. }
            | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::ApiKeyInactive
            | AppError::ApiKeyExpired { .. }
            | AppError::IpNotAllowed(_)
            | AppError::UserInactive
            | AppError::TokenRevoked
            | AppError::InvalidScope { .. }
            | AppError::InsufficientScope { .. }
            | AppError::MissingScope { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Database(err_str) => tracing::error!("Database error: {}", err_str),
            AppError::Internal(err_str) => tracing::error!("Internal error: {}", err_str),
            _ => {}
        }

        let mut response = HttpResponse::build(self.status_code());
        if self.status_code() == StatusCode::UNAUTHORIZED {
            response.insert_header(("WWW-Authenticate", "Bearer"));
        }
        response.json(self.to_response())
    }
}

/// Error response body matching OpenAPI schema.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_scopes: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
            expires_at: None,
            requested_scopes: None,
            allowed_scopes: None,
            required_scopes: None,
            granted_scopes: None,
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

// Conversion implementations for common error types

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        match err.sql_err() {
            Some(sea_orm::SqlErr::UniqueConstraintViolation(detail)) => AppError::Conflict(detail),
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("Invalid UUID: {}", err))
    }
}
