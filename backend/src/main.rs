use dotenvy::dotenv;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod access;
mod commands;
mod config;
mod db;
mod error;
mod middleware;
mod routes;
mod state;
mod validation;

#[cfg(test)]
mod business_logic_tests;
#[cfg(test)]
mod integration_tests;

use config::AppConfig;
use state::AppState;

#[tokio::main]
async fn main() {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting FarmHub backend...");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return;
        }
    };

    let pool = match db::init_pool(&config.database_url, config.db_max_connections) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to create database pool: {}", e);
            return;
        }
    };
    if let Err(e) = db::init_database(&pool, &config).await {
        tracing::error!("Failed to prepare database: {}", e);
        return;
    }

    let addr = config.socket_addr();
    let app = routes::build_app(AppState {
        pool,
        config: Arc::new(config),
    });

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };
    tracing::info!("listening on {}", addr);
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
