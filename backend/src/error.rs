use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use thiserror::Error;

/// Machine-readable reason attached to every field-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    FieldRequired,
    FieldOutOfRange,
    DuplicateRecord,
    InvalidOrdering,
    FutureDateNotAllowed,
    StaleDateNotAllowed,
    BatchTooLarge,
    Mismatch,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub code: ErrorCode,
    pub message: String,
}

/// Every rule a single record violated, optionally pinned to a batch index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
    record_index: Option<usize>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, code, message);
        errors
    }

    pub fn push(&mut self, field: impl Into<String>, code: ErrorCode, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            code,
            message: message.into(),
        });
    }

    pub fn required(&mut self, field: &str) {
        self.push(field, ErrorCode::FieldRequired, format!("{} is required", field));
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    pub fn has(&self, field: &str, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.field == field && e.code == code)
    }

    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    pub fn record_index(&self) -> Option<usize> {
        self.record_index
    }

    /// Re-keys every field under `records[index]` for batch reporting.
    pub fn at_index(mut self, index: usize) -> Self {
        for e in &mut self.errors {
            e.field = format!("records[{}].{}", index, e.field);
        }
        self.record_index = Some(index);
        self
    }

    pub fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    pub fn field_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for e in &self.errors {
            let entry = map
                .entry(e.field.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = entry {
                items.push(json!({ "code": e.code, "message": e.message }));
            }
        }
        map
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

#[derive(Error, Debug)]
pub enum FarmHubError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(ValidationErrors),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type FarmHubResult<T> = Result<T, FarmHubError>;

impl From<ValidationErrors> for FarmHubError {
    fn from(errors: ValidationErrors) -> Self {
        FarmHubError::Validation(errors)
    }
}

/// Unique constraints the schema declares, keyed to the field they guard.
const UNIQUE_CONSTRAINTS: &[(&str, &str, &str)] = &[
    (
        "milk_records_cow_id_date_key",
        "date",
        "a milk record already exists for this cow on this date",
    ),
    ("cows_tag_number_key", "tag_number", "a cow with this tag number already exists"),
    ("users_username_key", "username", "a user with this username already exists"),
];

impl FarmHubError {
    /// Translates storage constraint violations on a write into the validation
    /// taxonomy, so a lost race on a uniqueness check surfaces as
    /// `duplicate_record` instead of a raw database error.
    pub fn from_storage(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            let constraint = db_err.constraint().unwrap_or_default();
            match db_err.code().as_deref() {
                Some("23505") => {
                    if let Some((_, field, message)) =
                        UNIQUE_CONSTRAINTS.iter().find(|(name, _, _)| *name == constraint)
                    {
                        return FarmHubError::Validation(ValidationErrors::single(
                            *field,
                            ErrorCode::DuplicateRecord,
                            *message,
                        ));
                    }
                    return FarmHubError::Validation(ValidationErrors::single(
                        "non_field_errors",
                        ErrorCode::DuplicateRecord,
                        "record already exists",
                    ));
                }
                Some("23514") => {
                    return FarmHubError::Validation(ValidationErrors::single(
                        "non_field_errors",
                        ErrorCode::FieldOutOfRange,
                        format!("value rejected by constraint {}", constraint),
                    ));
                }
                Some("23503") => {
                    return FarmHubError::NotFound("referenced record does not exist".to_string());
                }
                _ => {}
            }
        }
        FarmHubError::Database(err)
    }

    /// Pins a validation failure to a batch entry; other errors pass through.
    pub fn at_index(self, index: usize) -> Self {
        match self {
            FarmHubError::Validation(errors) => FarmHubError::Validation(errors.at_index(index)),
            other => other,
        }
    }
}

impl IntoResponse for FarmHubError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            FarmHubError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                json!({ "success": false, "error": msg }),
            ),
            FarmHubError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "success": false,
                    "error": errors.to_string(),
                    "errors": errors.field_map(),
                    "record_index": errors.record_index(),
                }),
            ),
            FarmHubError::PermissionDenied(msg) => (
                StatusCode::FORBIDDEN,
                json!({ "success": false, "error": msg }),
            ),
            FarmHubError::Unauthenticated(msg) => (
                StatusCode::UNAUTHORIZED,
                json!({ "success": false, "error": msg }),
            ),
            FarmHubError::Database(ref e) => {
                tracing::error!("Database Error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "success": false, "error": "A storage error occurred." }),
                )
            }
            other => {
                tracing::error!("Unhandled Error: {:?}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "success": false, "error": "An internal error occurred." }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_map_groups_by_field() {
        let mut errors = ValidationErrors::new();
        errors.required("veterinarian");
        errors.push("cost", ErrorCode::FieldOutOfRange, "cost must not be negative");
        errors.push("cost", ErrorCode::Invalid, "cost is malformed");

        let map = errors.field_map();
        assert_eq!(map["veterinarian"].as_array().map(Vec::len), Some(1));
        assert_eq!(map["cost"].as_array().map(Vec::len), Some(2));
        assert_eq!(map["veterinarian"][0]["code"], "field_required");
    }

    #[test]
    fn at_index_prefixes_fields() {
        let errors = ValidationErrors::single("morning_quantity_liters", ErrorCode::FieldOutOfRange, "too much")
            .at_index(3);
        assert_eq!(errors.record_index(), Some(3));
        assert!(errors.has("records[3].morning_quantity_liters", ErrorCode::FieldOutOfRange));
    }

    #[test]
    fn validation_maps_to_bad_request() {
        let response =
            FarmHubError::from(ValidationErrors::single("date", ErrorCode::DuplicateRecord, "dup"))
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn scope_errors_map_to_expected_statuses() {
        assert_eq!(
            FarmHubError::NotFound("cow".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            FarmHubError::PermissionDenied("no".into()).into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            FarmHubError::Unauthenticated("no".into()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn non_database_storage_errors_pass_through() {
        let err = FarmHubError::from_storage(sqlx::Error::RowNotFound);
        assert!(matches!(err, FarmHubError::Database(_)));
    }

    /// Stands in for a Postgres error carrying a SQLSTATE and constraint name.
    #[derive(Debug)]
    struct ConstraintViolation {
        code: &'static str,
        constraint: &'static str,
    }

    impl std::fmt::Display for ConstraintViolation {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "violates constraint \"{}\"", self.constraint)
        }
    }

    impl std::error::Error for ConstraintViolation {}

    impl sqlx::error::DatabaseError for ConstraintViolation {
        fn message(&self) -> &str {
            "constraint violated"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.code.into())
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn constraint(&self) -> Option<&str> {
            Some(self.constraint)
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            match self.code {
                "23505" => sqlx::error::ErrorKind::UniqueViolation,
                "23503" => sqlx::error::ErrorKind::ForeignKeyViolation,
                "23514" => sqlx::error::ErrorKind::CheckViolation,
                _ => sqlx::error::ErrorKind::Other,
            }
        }
    }

    fn violation(code: &'static str, constraint: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(ConstraintViolation { code, constraint }))
    }

    #[test]
    fn lost_milk_race_is_a_duplicate_date() {
        let err = FarmHubError::from_storage(violation("23505", "milk_records_cow_id_date_key"));
        match err {
            FarmHubError::Validation(errors) => {
                assert!(errors.has("date", ErrorCode::DuplicateRecord));
                assert_eq!(errors.len(), 1);
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let err = FarmHubError::from_storage(violation("23505", "some_other_key")).at_index(3);
        match err {
            FarmHubError::Validation(errors) => {
                assert!(errors.has("records[3].non_field_errors", ErrorCode::DuplicateRecord));
                assert_eq!(errors.record_index(), Some(3));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn other_constraint_codes_are_translated() {
        let err = FarmHubError::from_storage(violation("23503", "cows_farm_id_fkey"));
        assert!(matches!(err, FarmHubError::NotFound(_)));

        let err = FarmHubError::from_storage(violation("23514", "milk_records_total_check"));
        assert!(matches!(
            err,
            FarmHubError::Validation(ref e) if e.has("non_field_errors", ErrorCode::FieldOutOfRange)
        ));

        let err = FarmHubError::from_storage(violation("40001", ""));
        assert!(matches!(err, FarmHubError::Database(_)));
    }
}
