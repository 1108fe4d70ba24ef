use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        // Data entry forms
        .route(
            "/api/milk-records/record-daily",
            post(commands::milk::record_daily_axum),
        )
        .route(
            "/api/milk-records/bulk-record",
            post(commands::milk::bulk_record_axum),
        )
        // Reports
        .route(
            "/api/milk-records/production-summary",
            get(commands::milk::production_summary_axum),
        )
        .route(
            "/api/milk-records/cow-production/:tag",
            get(commands::milk::cow_production_axum),
        )
        // Records
        .route(
            "/api/milk-records",
            get(commands::milk::list_milk_records_axum).post(commands::milk::create_milk_record_axum),
        )
        .route(
            "/api/milk-records/:id",
            get(commands::milk::get_milk_record_axum)
                .put(commands::milk::update_milk_record_axum)
                .delete(commands::milk::delete_milk_record_axum),
        )
}
