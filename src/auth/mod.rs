//! Request authentication: credential and bearer-token verification, the
//! dispatcher choosing between them, and scope enforcement.

mod admin;
pub mod credential_verifier;
mod dispatcher;
pub mod scope;
pub mod token_verifier;

use std::net::{IpAddr, SocketAddr};

use actix_web::http::header::HeaderMap;
use actix_web::{HttpRequest, web};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::User;

pub use admin::{KEYS_MANAGE_SCOPE, ManagementCaller};
pub use dispatcher::{
    Authenticated, CredentialAuth, PresentedCredentials, authenticate, bearer_token,
};
pub use scope::{ADMIN_OVERRIDE_SCOPES, ScopeGuard};

/// Wrapper type for the bootstrap admin key.
/// Uses `SecretString` to prevent accidental logging and zeroize on drop.
#[derive(Clone)]
pub struct AdminKey(Option<SecretString>);

impl AdminKey {
    pub fn new(key: Option<SecretString>) -> Self {
        Self(key)
    }

    /// Constant-time comparison of the provided key with the configured one.
    /// Always false when no admin key is configured.
    pub fn verify(&self, provided: &str) -> bool {
        match &self.0 {
            Some(secret) => constant_time_eq(secret.expose_secret(), provided),
            None => false,
        }
    }
}

impl std::fmt::Debug for AdminKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(_) => write!(f, "AdminKey([REDACTED])"),
            None => write!(f, "AdminKey(None)"),
        }
    }
}

/// One-way hash used for secrets, access tokens and refresh tokens (SHA-256, lowercase hex).
pub fn hash_secret(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// String comparison without early exit on the first differing byte.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Header a reverse proxy appends the address it received a request from to.
pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

/// Reverse proxies whose `X-Forwarded-For` entries are believed.
///
/// Registered as `web::Data<TrustedProxies>`. Without it, or with an empty
/// list, the socket peer is the client.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies(Vec<IpAddr>);

impl TrustedProxies {
    pub fn new(proxies: Vec<IpAddr>) -> Self {
        Self(proxies)
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.0.contains(ip)
    }

    /// Walk `X-Forwarded-For` from the right while the hop that reported the
    /// next entry is a trusted proxy. Entries left of the first untrusted hop
    /// are client-controlled and ignored.
    pub fn resolve(&self, peer: IpAddr, headers: &HeaderMap) -> IpAddr {
        let hops: Vec<&str> = headers
            .get_all(FORWARDED_FOR_HEADER)
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .collect();

        let mut client = peer;
        for hop in hops.into_iter().rev() {
            if !self.contains(&client) {
                break;
            }
            match parse_ip(hop) {
                Some(ip) => client = ip,
                None => break,
            }
        }
        client
    }
}

fn parse_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Some(addr.ip());
    }
    raw.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>().ok()
}

/// Client address used for IP allow-lists and usage records, without port.
///
/// The socket peer, unless it is a configured [`TrustedProxies`] entry.
pub fn client_ip(req: &HttpRequest) -> Option<String> {
    let peer = req.peer_addr()?.ip();
    let client = match req.app_data::<web::Data<TrustedProxies>>() {
        Some(trusted) => trusted.resolve(peer, req.headers()),
        None => peer,
    };
    Some(client.to_string())
}

/// How a request was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// Long-lived key/secret pair presented directly
    ApiKey,
    /// Store-backed bearer token
    AccessToken,
    /// Self-contained signed bearer token with no store record
    Legacy,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::ApiKey => "api_key",
            AuthType::AccessToken => "access_token",
            AuthType::Legacy => "legacy",
        }
    }
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized result of authenticating a request, whichever scheme was used.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal: User,
    pub auth_type: AuthType,
    pub scopes: Vec<String>,
    /// Credential the request (or its token) was issued from, when known
    pub api_key_id: Option<Uuid>,
    /// Store record backing the bearer token
    pub token_id: Option<Uuid>,
}

impl AuthContext {
    pub fn user_id(&self) -> Uuid {
        self.principal.id
    }

    /// Check scopes with the default administrative override set.
    pub fn require_any(&self, required: &[&str]) -> crate::error::AppResult<()> {
        ScopeGuard::default().require_any(&self.scopes, required)
    }

    pub fn require_all(&self, required: &[&str]) -> crate::error::AppResult<()> {
        ScopeGuard::default().require_all(&self.scopes, required)
    }
}

/// Random lowercase hex string of `N` bytes of entropy.
pub(crate) fn random_hex<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    for chunk in bytes.chunks_mut(32) {
        let random: [u8; 32] = rand::random();
        chunk.copy_from_slice(&random[..chunk.len()]);
    }
    hex::encode(bytes)
}
