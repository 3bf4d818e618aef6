//! API endpoint modules.

pub mod health;
pub mod keys;
pub mod me;
pub mod openapi;
pub mod token;

use actix_web::{HttpRequest, error, web};

use crate::error::AppError;

pub use health::configure_health_routes;
pub use keys::configure_routes as configure_key_routes;
pub use me::configure_routes as configure_me_routes;
pub use openapi::ApiDoc;
pub use token::configure_routes as configure_token_routes;

fn json_error(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::InvalidInput(err.to_string()).into()
}

fn form_error(err: error::UrlencodedError, _req: &HttpRequest) -> actix_web::Error {
    AppError::InvalidInput(err.to_string()).into()
}

fn query_error(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::InvalidInput(err.to_string()).into()
}

fn path_error(err: error::PathError, _req: &HttpRequest) -> actix_web::Error {
    AppError::InvalidInput(err.to_string()).into()
}

/// Mount every route, with extractor failures reported in the JSON error shape.
///
/// Meant to be called inside the `/api/v1` scope.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::FormConfig::default().error_handler(form_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .configure(configure_health_routes)
        .configure(configure_token_routes)
        .configure(configure_key_routes)
        .configure(configure_me_routes);
}
