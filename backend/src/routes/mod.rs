use crate::middleware::auth::auth_middleware;
use crate::state::AppState;
use axum::{middleware::from_fn_with_state, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod activity;
pub mod auth;
pub mod cow;
pub mod farm;
pub mod milk;
pub mod user;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .merge(auth::router())
        .merge(user::router())
        .merge(farm::router())
        .merge(cow::router())
        .merge(milk::router())
        .merge(activity::router())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Full application: every route behind the bearer-token check, plus CORS and request tracing.
pub fn build_app(state: AppState) -> Router {
    create_router()
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
