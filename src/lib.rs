//! Token exchange server library.
//!
//! Exchanges long-lived service credentials (access key + secret) for
//! short-lived, scope-limited bearer tokens, and authenticates incoming
//! requests presenting either.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
pub mod store;
