//! SeaORM entity definitions for PostgreSQL database.

pub mod access_token;
pub mod api_key;
pub mod user;
