// Core modules
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod model;

#[cfg(test)]
mod test_support;

// Re-export key types and functions
pub use auth::{AuthError, AuthService, IdentityResolver, KeySetCache, TokenCodec, UserStore};
pub use config::AuthSettings;
pub use db::{
    DatabaseConfig, Db, connect_and_seed_with_retry, create_connection, ensure_schema, seed_static,
};

use anyhow::Result;

/// Connect, seed and build the HTTP application for the given settings.
///
/// Connecting and seeding are retried `seed_attempts` times while the store
/// comes up.
pub async fn build_app(
    settings: &AuthSettings,
    db_config: DatabaseConfig,
    seed_attempts: u32,
    seed_retry_delay: std::time::Duration,
) -> Result<axum::Router> {
    settings.validate()?;

    let db = connect_and_seed_with_retry(db_config, seed_attempts, seed_retry_delay).await?;

    let service = AuthService::from_settings(settings, db)?;
    Ok(api::create_router(std::sync::Arc::new(service), settings))
}
