use crate::commands;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/farms",
            get(commands::farm::list_farms_axum).post(commands::farm::create_farm_axum),
        )
        .route(
            "/api/farms/:id",
            get(commands::farm::get_farm_axum)
                .put(commands::farm::update_farm_axum)
                .delete(commands::farm::delete_farm_axum),
        )
}
