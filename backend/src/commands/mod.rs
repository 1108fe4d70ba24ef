use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::Json;

use crate::access::EntityKind;
use crate::error::{ErrorCode, FarmHubError, FarmHubResult, ValidationErrors};

pub mod activity;
pub mod auth;
pub mod cow;
pub mod farm;
pub mod listing;
pub mod milk;
pub mod user;

/// Unwraps a JSON body, turning malformed input into a 400 in the usual error shape.
pub fn body<T>(payload: Result<Json<T>, JsonRejection>) -> FarmHubResult<T> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        FarmHubError::Validation(ValidationErrors::single(
            "non_field_errors",
            ErrorCode::Invalid,
            rejection.body_text(),
        ))
    })
}

pub fn query<T>(params: Result<Query<T>, QueryRejection>) -> FarmHubResult<T> {
    params.map(|Query(value)| value).map_err(|rejection| {
        FarmHubError::Validation(ValidationErrors::single(
            "non_field_errors",
            ErrorCode::Invalid,
            rejection.body_text(),
        ))
    })
}

pub fn not_found(kind: EntityKind) -> FarmHubError {
    FarmHubError::NotFound(format!("{} not found", kind.label()))
}
