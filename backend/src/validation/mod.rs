//! Cross-field and cross-entity rules applied before anything is written.
//!
//! Each subtype first normalizes its request into a fully populated record
//! (defaults, synthesized title/description) and only then validates it, so
//! defaulting never interleaves with rule checks. All violations of a single
//! record are collected and reported together.

pub mod activity;
pub mod cow;
pub mod farm;
pub mod milk;
pub mod user;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::{ErrorCode, ValidationErrors};

pub const MAX_MILK_LITERS: i64 = 50;
pub const MAX_PERCENTAGE: i64 = 10;
pub const MAX_BULK_RECORDS: usize = 50;
pub const ROUTINE_BACKDATE_DAYS: i64 = 7;
pub const MAX_CALF_WEIGHT_KG: i64 = 100;

/// Trimmed, non-empty text or a `field_required` error.
pub fn required_text(errors: &mut ValidationErrors, field: &str, value: Option<&str>) -> Option<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => {
            errors.required(field);
            None
        }
    }
}

/// Trimmed text with blanks folded to `None`.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn check_range(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<Decimal>,
    min: Decimal,
    max: Decimal,
) {
    if let Some(v) = value {
        if v < min || v > max {
            errors.push(
                field,
                ErrorCode::FieldOutOfRange,
                format!("{} must be between {} and {}", field, min, max),
            );
        }
    }
}

pub fn check_non_negative(errors: &mut ValidationErrors, field: &str, value: Option<Decimal>) {
    if let Some(v) = value {
        if v.is_sign_negative() && !v.is_zero() {
            errors.push(
                field,
                ErrorCode::FieldOutOfRange,
                format!("{} must not be negative", field),
            );
        }
    }
}

pub fn check_not_future(errors: &mut ValidationErrors, field: &str, date: NaiveDate, today: NaiveDate) {
    if date > today {
        errors.push(
            field,
            ErrorCode::FutureDateNotAllowed,
            format!("{} cannot be in the future", field),
        );
    }
}

/// Parses an enum field, recording `field_required` or `invalid` on failure.
pub fn parse_choice<T: std::str::FromStr>(
    errors: &mut ValidationErrors,
    field: &str,
    raw: Option<&str>,
    required: bool,
    choices: &[&str],
) -> Option<T> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => {
            if required {
                errors.required(field);
            }
            None
        }
        Some(v) => match v.to_uppercase().parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                errors.push(
                    field,
                    ErrorCode::Invalid,
                    format!("{} must be one of {}", field, choices.join(", ")),
                );
                None
            }
        },
    }
}

/// Loose phone format: optional `+`, optional leading `1`, then 9 to 15 digits.
pub fn is_valid_phone(raw: &str) -> bool {
    let digits = raw.strip_prefix('+').unwrap_or(raw);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let max = if digits.starts_with('1') { 16 } else { 15 };
    (9..=max).contains(&digits.len())
}
