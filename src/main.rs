//! Token exchange server - main entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

use std::io;

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};
use actix_web::{App, HttpServer, web};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use token_exchange_lib::api::{self, ApiDoc};
use token_exchange_lib::auth::{AdminKey, TrustedProxies};
use token_exchange_lib::config::{ADMIN_KEY_HEADER, API_KEY_HEADER, API_SECRET_HEADER, Config};
use token_exchange_lib::db::DbPool;
use token_exchange_lib::middleware::RequestLogger;
use token_exchange_lib::services::{AuthServices, start_cleanup_task};
use token_exchange_lib::store::Stores;

/// Perform health check (for Docker healthcheck).
fn health_check() -> bool {
    Config::from_env().is_ok()
}

fn cors(is_development: bool) -> Cors {
    let cors = if is_development {
        Cors::default()
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:3000")
    } else {
        // Same-origin only
        Cors::default()
    };

    cors.allowed_methods(vec!["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static("x-api-secret"),
            HeaderName::from_static("x-admin-key"),
        ])
        .max_age(3600)
}

async fn open_stores(config: &Config) -> io::Result<Stores> {
    if config.database.is_memory() {
        warn!("Using the in-memory store - all credentials and tokens are lost on restart");
        return Ok(Stores::memory());
    }

    let pool = DbPool::new(config).await.map_err(io::Error::other)?;
    info!("Database connection established");

    pool.run_migrations().await.map_err(io::Error::other)?;
    info!("Database migrations complete");

    Ok(Stores::database(pool))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    if std::env::args().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        std::process::exit(if health_check() { 0 } else { 1 });
    }

    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(io::Error::other)?;

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL and TEX_TOKEN_SECRET must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Token Exchange Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
        info!("Using development defaults for DATABASE_URL, TEX_ADMIN_KEY and TEX_TOKEN_SECRET");
    }
    if config.admin_key.is_none() {
        info!("No admin key configured; key management requires the keys.manage scope");
    }

    let stores = open_stores(&config).await?;
    let services = AuthServices::new(stores, config.tokens.clone());

    start_cleanup_task(services.tokens.clone(), config.cleanup.clone());
    info!(
        "Cleanup service started (interval: {}s, retention: {}s)",
        config.cleanup.interval_secs, config.cleanup.retention_secs
    );
    info!(
        "Access token TTL: default {}s, range {}s..={}s; refresh TTL {}s",
        config.tokens.default_ttl_secs,
        config.tokens.min_ttl_secs,
        config.tokens.max_ttl_secs,
        config.tokens.refresh_ttl_secs
    );
    info!(
        "Credential headers: {}, {}; admin header: {}",
        API_KEY_HEADER, API_SECRET_HEADER, ADMIN_KEY_HEADER
    );

    let bind_address = config.bind_address();
    let admin_key = web::Data::new(AdminKey::new(config.admin_key.clone()));
    if !config.trusted_proxies.is_empty() {
        info!("Trusting X-Forwarded-For from: {:?}", config.trusted_proxies);
    }
    let trusted_proxies = web::Data::new(TrustedProxies::new(config.trusted_proxies.clone()));
    let services = web::Data::new(services);
    let is_development = config.is_development();

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!(
            "Starting server at http://{} ({} workers)",
            bind_address, cpus
        );
        cpus
    };

    let server = HttpServer::new(move || {
        App::new()
            .wrap(cors(is_development))
            .wrap(RequestLogger)
            .app_data(services.clone())
            .app_data(admin_key.clone())
            .app_data(trusted_proxies.clone())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
            .service(web::scope("/api/v1").configure(api::configure_api))
    });

    server
        .workers(worker_count)
        .bind(&bind_address)?
        .run()
        .await
}
