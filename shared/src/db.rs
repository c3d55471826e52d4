//! Database connection management.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

use crate::{Config, DatabaseCredentials, Error, Result};

/// Create a database connection pool.
pub async fn create_pool(config: &Config, creds: &DatabaseCredentials) -> Result<PgPool> {
    let database_url = format!(
        "postgres://{}:{}@{}:{}/{}",
        creds.username,
        creds.password,
        config.db_host,
        creds.port.unwrap_or(5432),
        config.db_name
    );

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&database_url)
        .await
        .map_err(Error::Database)?;

    Ok(pool)
}

/// Look up the application user id for a Cognito subject.
///
/// Returns `None` when the subject has no `users` row, which handlers
/// surface as 401 (the token is valid but the user never registered).
pub async fn user_id_for_sub(pool: &PgPool, sub: &str) -> Result<Option<Uuid>> {
    let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE cognito_sub = $1")
        .bind(sub)
        .fetch_optional(pool)
        .await?;

    Ok(id)
}
