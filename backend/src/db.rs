use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::str::FromStr;

use crate::config::AppConfig;
use crate::error::{FarmHubError, FarmHubResult};

pub mod enums;
pub mod models;

pub use enums::*;
pub use models::*;

pub type DbPool = Pool<Postgres>;

pub fn init_pool_with_options(opts: PgConnectOptions, max_connections: u32) -> DbPool {
    // connect_lazy_with returns the pool immediately. It does not validate connection.
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .idle_timeout(std::time::Duration::from_secs(120))
        .max_lifetime(std::time::Duration::from_secs(300))
        .connect_lazy_with(opts)
}

pub fn init_pool(database_url: &str, max_connections: u32) -> FarmHubResult<DbPool> {
    let opts = PgConnectOptions::from_str(database_url)
        .map_err(|e| FarmHubError::Config(format!("Invalid DB URL: {}", e)))?;

    Ok(init_pool_with_options(opts, max_connections))
}

pub async fn init_database(pool: &DbPool, config: &AppConfig) -> FarmHubResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    ensure_super_admin(pool, config).await?;
    tracing::info!("Database ready");
    Ok(())
}

async fn ensure_super_admin(pool: &DbPool, config: &AppConfig) -> FarmHubResult<()> {
    let exists: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = $1")
        .bind(&config.admin_username)
        .fetch_one(pool)
        .await?;
    if exists.0 > 0 {
        return Ok(());
    }

    let hash = bcrypt::hash(&config.admin_password, bcrypt::DEFAULT_COST)?;
    sqlx::query(
        "INSERT INTO users (username, email, password_hash, role) VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
    )
    .bind(&config.admin_username)
    .bind(&config.admin_email)
    .bind(hash)
    .bind(Role::SuperAdmin)
    .execute(pool)
    .await?;

    tracing::info!("Seeded super admin '{}'", config.admin_username);
    Ok(())
}
