//! Business logic services.

pub mod cleanup;
pub mod credential_store;
pub mod issuance;
pub mod revocation;
pub mod token_store;

use std::sync::Arc;

use crate::config::TokenSettings;
use crate::store::{Readiness, Stores, UserDirectory};

pub use cleanup::start_cleanup_task;
pub use credential_store::CredentialStore;
pub use token_store::{TokenSigner, TokenStore};

/// Everything the token endpoints and the request verifiers need, shared as
/// `web::Data<AuthServices>`.
#[derive(Clone)]
pub struct AuthServices {
    pub credentials: CredentialStore,
    pub tokens: TokenStore,
    pub users: Arc<dyn UserDirectory>,
    pub readiness: Arc<dyn Readiness>,
}

impl AuthServices {
    pub fn new(stores: Stores, settings: TokenSettings) -> Self {
        Self {
            credentials: CredentialStore::new(stores.api_keys),
            tokens: TokenStore::new(stores.tokens, settings),
            users: stores.users,
            readiness: stores.readiness,
        }
    }
}
