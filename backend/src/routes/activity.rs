use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        // Logging forms
        .route(
            "/api/activities/log-activity",
            post(commands::activity::log_activity_axum),
        )
        .route(
            "/api/activities/log-vaccination",
            post(commands::activity::log_vaccination_axum),
        )
        .route(
            "/api/activities/log-health-check",
            post(commands::activity::log_health_check_axum),
        )
        .route(
            "/api/activities/log-calving",
            post(commands::activity::log_calving_axum),
        )
        .route(
            "/api/activities/log-breeding",
            post(commands::activity::log_breeding_axum),
        )
        // Reports
        .route(
            "/api/activities/activity-summary",
            get(commands::activity::activity_summary_axum),
        )
        .route(
            "/api/activities/cow-activities/:tag",
            get(commands::activity::cow_activities_axum),
        )
        .route(
            "/api/activities/overdue-activities",
            get(commands::activity::overdue_activities_axum),
        )
        .route(
            "/api/activities/upcoming-activities",
            get(commands::activity::upcoming_activities_axum),
        )
        // Records
        .route(
            "/api/activities",
            get(commands::activity::list_activities_axum)
                .post(commands::activity::create_activity_axum),
        )
        .route(
            "/api/activities/:id",
            get(commands::activity::get_activity_axum)
                .put(commands::activity::update_activity_axum)
                .delete(commands::activity::delete_activity_axum),
        )
}
