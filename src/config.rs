//! Application configuration loaded from environment variables.

use std::env;
use std::net::IpAddr;

use secrecy::{ExposeSecret, SecretString};

/// HTTP header carrying the public access key of a credential.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// HTTP header carrying the secret half of a credential.
pub const API_SECRET_HEADER: &str = "X-API-Secret";

/// Query parameter alternative to [`API_KEY_HEADER`].
pub const API_KEY_QUERY_PARAM: &str = "api_key";

/// Query parameter alternative to [`API_SECRET_HEADER`].
pub const API_SECRET_QUERY_PARAM: &str = "api_secret";

/// HTTP header name for admin key (bootstrap).
pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

/// `DATABASE_URL` value selecting the in-process store.
pub const MEMORY_DATABASE_URL: &str = "memory";

/// Minimum accepted length of the token signing secret in production.
const MIN_TOKEN_SECRET_LEN: usize = 32;

/// Development default values - NEVER use in production.
pub mod defaults {
    pub const DEV_DATABASE_URL: &str = super::MEMORY_DATABASE_URL;
    pub const DEV_ADMIN_KEY: &str = "dev-admin-key-do-not-use-in-production";
    pub const DEV_TOKEN_SECRET: &str = "dev-token-secret-do-not-use-in-production";
    pub const DEV_HOST: &str = "127.0.0.1";
    pub const DEV_PORT: u16 = 8080;
    pub const DB_MAX_CONNECTIONS: u32 = 10;
    pub const DB_MIN_CONNECTIONS: u32 = 1;

    pub const TOKEN_ISSUER: &str = "token-exchange";
    pub const ACCESS_TOKEN_DEFAULT_TTL_SECS: u64 = 3600;
    pub const ACCESS_TOKEN_MIN_TTL_SECS: u64 = 300;
    pub const ACCESS_TOKEN_MAX_TTL_SECS: u64 = 86_400;
    pub const REFRESH_TOKEN_TTL_SECS: u64 = 30 * 86_400;

    pub const CLEANUP_INTERVAL_SECS: u64 = 3600;
    pub const DEV_CLEANUP_INTERVAL_SECS: u64 = 60;
    pub const TOKEN_RETENTION_SECS: u64 = 7 * 86_400;
}

/// Runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Parse environment from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    /// Check if this is a development environment.
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// Check if this is a production environment.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Database connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// PostgreSQL URL, or `memory` for the in-process store
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl DatabaseSettings {
    /// Whether the in-process store was selected.
    pub fn is_memory(&self) -> bool {
        self.url.eq_ignore_ascii_case(MEMORY_DATABASE_URL)
    }
}

/// Access/refresh token issuance settings.
#[derive(Clone)]
pub struct TokenSettings {
    /// HMAC secret used to sign access tokens
    pub signing_secret: SecretString,
    /// `iss` claim written into and required from access tokens
    pub issuer: String,
    pub default_ttl_secs: u64,
    pub min_ttl_secs: u64,
    pub max_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
}

impl TokenSettings {
    /// Clamp a caller-requested access token lifetime into the configured range.
    pub fn clamp_ttl(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_ttl_secs)
            .clamp(self.min_ttl_secs, self.max_ttl_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_ttl_secs > self.default_ttl_secs || self.default_ttl_secs > self.max_ttl_secs
        {
            return Err(ConfigError::InvalidValue(
                "access token TTLs must satisfy MIN <= DEFAULT <= MAX",
            ));
        }
        if self.refresh_ttl_secs <= self.max_ttl_secs {
            return Err(ConfigError::InvalidValue(
                "TEX_REFRESH_TOKEN_TTL_SECS must exceed TEX_ACCESS_TOKEN_MAX_TTL_SECS",
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("signing_secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("default_ttl_secs", &self.default_ttl_secs)
            .field("min_ttl_secs", &self.min_ttl_secs)
            .field("max_ttl_secs", &self.max_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish()
    }
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            signing_secret: SecretString::from(defaults::DEV_TOKEN_SECRET),
            issuer: defaults::TOKEN_ISSUER.to_string(),
            default_ttl_secs: defaults::ACCESS_TOKEN_DEFAULT_TTL_SECS,
            min_ttl_secs: defaults::ACCESS_TOKEN_MIN_TTL_SECS,
            max_ttl_secs: defaults::ACCESS_TOKEN_MAX_TTL_SECS,
            refresh_ttl_secs: defaults::REFRESH_TOKEN_TTL_SECS,
        }
    }
}

/// Expired-token sweep settings.
#[derive(Debug, Clone)]
pub struct CleanupSettings {
    pub interval_secs: u64,
    /// How long expired or revoked records are kept before removal
    pub retention_secs: u64,
}

impl CleanupSettings {
    /// A purged record must not outlive the signed access token it stood for.
    fn validate(&self, tokens: &TokenSettings) -> Result<(), ConfigError> {
        if self.retention_secs < tokens.max_ttl_secs {
            return Err(ConfigError::InvalidValue(
                "TEX_TOKEN_RETENTION_SECS must be at least TEX_ACCESS_TOKEN_MAX_TTL_SECS",
            ));
        }
        Ok(())
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Runtime environment
    pub environment: Environment,
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    pub database: DatabaseSettings,
    /// Admin key for bootstrap operations (creating users' first credentials)
    pub admin_key: Option<SecretString>,
    pub tokens: TokenSettings,
    pub cleanup: CleanupSettings,
    /// Reverse proxies allowed to report the client address via `X-Forwarded-For`
    pub trusted_proxies: Vec<IpAddr>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In development mode every variable has a default and the in-process
    /// store is used. In production `DATABASE_URL` and `TEX_TOKEN_SECRET`
    /// must be set to non-default values.
    ///
    /// Environment variables:
    /// - `RUST_ENV`: Environment (development/production) - REQUIRED
    /// - `TEX_HOST`, `TEX_PORT`: bind address (default: 127.0.0.1:8080)
    /// - `DATABASE_URL`: PostgreSQL URL or `memory`
    /// - `TEX_DB_MAX_CONNECTIONS`, `TEX_DB_MIN_CONNECTIONS`
    /// - `TEX_ADMIN_KEY`: bootstrap admin key (optional in production)
    /// - `TEX_TOKEN_SECRET`, `TEX_TOKEN_ISSUER`
    /// - `TEX_ACCESS_TOKEN_DEFAULT_TTL_SECS`, `TEX_ACCESS_TOKEN_MIN_TTL_SECS`,
    ///   `TEX_ACCESS_TOKEN_MAX_TTL_SECS`, `TEX_REFRESH_TOKEN_TTL_SECS`
    /// - `TEX_CLEANUP_INTERVAL_SECS`, `TEX_TOKEN_RETENTION_SECS`
    /// - `TEX_TRUSTED_PROXIES`: comma-separated proxy addresses (default: none)
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_str = env::var("RUST_ENV").map_err(|_| ConfigError::MissingEnvVar("RUST_ENV"))?;

        let environment = Environment::parse(&env_str).ok_or(ConfigError::InvalidValue(
            "RUST_ENV must be 'development' or 'production'",
        ))?;

        let host = env::var("TEX_HOST").unwrap_or_else(|_| defaults::DEV_HOST.to_string());
        let port = parse_var("TEX_PORT", defaults::DEV_PORT, "TEX_PORT must be a valid port")?;

        let database = DatabaseSettings {
            url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| defaults::DEV_DATABASE_URL.to_string()),
            max_connections: parse_var(
                "TEX_DB_MAX_CONNECTIONS",
                defaults::DB_MAX_CONNECTIONS,
                "TEX_DB_MAX_CONNECTIONS must be a valid number",
            )?,
            min_connections: parse_var(
                "TEX_DB_MIN_CONNECTIONS",
                defaults::DB_MIN_CONNECTIONS,
                "TEX_DB_MIN_CONNECTIONS must be a valid number",
            )?,
        };

        // Admin key is optional outside development
        let admin_key = if environment.is_development() {
            Some(env::var("TEX_ADMIN_KEY").unwrap_or_else(|_| defaults::DEV_ADMIN_KEY.to_string()))
        } else {
            env::var("TEX_ADMIN_KEY").ok()
        }
        .map(SecretString::from);

        let tokens = TokenSettings {
            signing_secret: SecretString::from(
                env::var("TEX_TOKEN_SECRET")
                    .unwrap_or_else(|_| defaults::DEV_TOKEN_SECRET.to_string()),
            ),
            issuer: env::var("TEX_TOKEN_ISSUER")
                .unwrap_or_else(|_| defaults::TOKEN_ISSUER.to_string()),
            default_ttl_secs: parse_var(
                "TEX_ACCESS_TOKEN_DEFAULT_TTL_SECS",
                defaults::ACCESS_TOKEN_DEFAULT_TTL_SECS,
                "TEX_ACCESS_TOKEN_DEFAULT_TTL_SECS must be a valid number",
            )?,
            min_ttl_secs: parse_var(
                "TEX_ACCESS_TOKEN_MIN_TTL_SECS",
                defaults::ACCESS_TOKEN_MIN_TTL_SECS,
                "TEX_ACCESS_TOKEN_MIN_TTL_SECS must be a valid number",
            )?,
            max_ttl_secs: parse_var(
                "TEX_ACCESS_TOKEN_MAX_TTL_SECS",
                defaults::ACCESS_TOKEN_MAX_TTL_SECS,
                "TEX_ACCESS_TOKEN_MAX_TTL_SECS must be a valid number",
            )?,
            refresh_ttl_secs: parse_var(
                "TEX_REFRESH_TOKEN_TTL_SECS",
                defaults::REFRESH_TOKEN_TTL_SECS,
                "TEX_REFRESH_TOKEN_TTL_SECS must be a valid number",
            )?,
        };
        tokens.validate()?;

        let cleanup = CleanupSettings {
            interval_secs: parse_var(
                "TEX_CLEANUP_INTERVAL_SECS",
                if environment.is_development() {
                    defaults::DEV_CLEANUP_INTERVAL_SECS
                } else {
                    defaults::CLEANUP_INTERVAL_SECS
                },
                "TEX_CLEANUP_INTERVAL_SECS must be a valid number",
            )?,
            retention_secs: parse_var(
                "TEX_TOKEN_RETENTION_SECS",
                defaults::TOKEN_RETENTION_SECS,
                "TEX_TOKEN_RETENTION_SECS must be a valid number",
            )?,
        };
        cleanup.validate(&tokens)?;

        let trusted_proxies = match env::var("TEX_TRUSTED_PROXIES") {
            Ok(raw) => parse_ip_list(&raw)?,
            Err(_) => Vec::new(),
        };

        let config = Config {
            environment,
            host,
            port,
            database,
            admin_key,
            tokens,
            cleanup,
            trusted_proxies,
        };

        if environment.is_production() {
            config.validate_production()?;
        }

        Ok(config)
    }

    /// Validate that production configuration does not use development defaults.
    fn validate_production(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.database.is_memory() {
            errors.push(
                "DATABASE_URL selects the in-memory store. Set a production PostgreSQL URL."
                    .to_string(),
            );
        }

        let secret = self.tokens.signing_secret.expose_secret();
        if secret == defaults::DEV_TOKEN_SECRET {
            errors.push(
                "TEX_TOKEN_SECRET is using development default. Set a random signing secret."
                    .to_string(),
            );
        } else if secret.len() < MIN_TOKEN_SECRET_LEN {
            errors.push(format!(
                "TEX_TOKEN_SECRET must be at least {} bytes long.",
                MIN_TOKEN_SECRET_LEN
            ));
        }

        if let Some(ref key) = self.admin_key
            && key.expose_secret() == defaults::DEV_ADMIN_KEY
        {
            errors.push(
                "TEX_ADMIN_KEY is using development default. Set a secure admin key or remove it."
                    .to_string(),
            );
        }

        if !errors.is_empty() {
            return Err(ConfigError::ProductionValidation(errors));
        }

        Ok(())
    }

    /// Get the server bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode.
    pub fn is_development(&self) -> bool {
        self.environment.is_development()
    }
}

fn parse_var<T: std::str::FromStr>(
    name: &str,
    default: T,
    message: &'static str,
) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue(message)),
        Err(_) => Ok(default),
    }
}

fn parse_ip_list(raw: &str) -> Result<Vec<IpAddr>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpAddr>().map_err(|_| {
                ConfigError::InvalidValue("TEX_TRUSTED_PROXIES must be comma-separated IP addresses")
            })
        })
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(&'static str),

    #[error("Production configuration validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    ProductionValidation(Vec<String>),
}
