use crate::commands;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/users",
            get(commands::user::list_users_axum).post(commands::user::create_user_axum),
        )
        .route(
            "/api/users/:id",
            get(commands::user::get_user_axum)
                .put(commands::user::update_user_axum)
                .delete(commands::user::delete_user_axum),
        )
}
