use crate::commands;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/cows",
            get(commands::cow::list_cows_axum).post(commands::cow::create_cow_axum),
        )
        .route(
            "/api/cows/:id",
            get(commands::cow::get_cow_axum)
                .put(commands::cow::update_cow_axum)
                .delete(commands::cow::delete_cow_axum),
        )
}
