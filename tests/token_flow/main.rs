//! Token flow test suite.
//!
//! Drives the real actix routes against the in-memory store: credential
//! exchange, refresh rotation, revocation, request verification, scope
//! negotiation and credential management.
//!
//! Run with: cargo test --test token_flow


mod test_failures;
mod test_keys;
mod test_refresh;
mod test_revoke;
mod test_scopes;
mod test_verifier;
