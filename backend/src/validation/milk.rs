use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{
    check_non_negative, check_not_future, check_range, optional_text, parse_choice, required_text,
    MAX_BULK_RECORDS, MAX_MILK_LITERS, MAX_PERCENTAGE,
};
use crate::db::{Cow, MilkRecord, Quality};
use crate::error::{ErrorCode, ValidationErrors};

/// A milk record ready for insertion. `farmer_id` and `farm_id` always come
/// from the cow, never from the request.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMilkRecord {
    pub cow_id: i32,
    pub farmer_id: i32,
    pub farm_id: i32,
    pub date: NaiveDate,
    pub morning_quantity_liters: Decimal,
    pub evening_quantity_liters: Decimal,
    pub total_quantity_liters: Decimal,
    pub fat_percentage: Option<Decimal>,
    pub protein_percentage: Option<Decimal>,
    pub quality_rating: Option<Quality>,
    pub notes: Option<String>,
}

/// Quantities and quality readings shared by the daily and bulk forms.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ProductionEntry {
    pub cow_tag: Option<String>,
    pub morning_quantity_liters: Option<Decimal>,
    pub evening_quantity_liters: Option<Decimal>,
    pub fat_percentage: Option<Decimal>,
    pub protein_percentage: Option<Decimal>,
    pub quality_rating: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DailyProductionRequest {
    pub farm_name: Option<String>,
    pub date: Option<NaiveDate>,
    #[serde(flatten)]
    pub entry: ProductionEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BulkProductionRequest {
    pub farm_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub records: Vec<ProductionEntry>,
}

/// Body of the plain milk-record create/update endpoints. Unlike the daily
/// form, a caller may supply the total explicitly.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MilkRecordInput {
    pub cow_id: Option<i32>,
    pub date: Option<NaiveDate>,
    pub morning_quantity_liters: Option<Decimal>,
    pub evening_quantity_liters: Option<Decimal>,
    pub total_quantity_liters: Option<Decimal>,
    pub fat_percentage: Option<Decimal>,
    pub protein_percentage: Option<Decimal>,
    pub quality_rating: Option<String>,
    pub notes: Option<String>,
}

impl MilkRecordInput {
    /// Fills every absent field from the stored row. A stored total is only
    /// kept when neither quantity changes.
    pub fn over(self, current: &MilkRecord) -> MilkRecordInput {
        let quantities_changed =
            self.morning_quantity_liters.is_some() || self.evening_quantity_liters.is_some();
        let total = match self.total_quantity_liters {
            Some(total) => Some(total),
            None if quantities_changed => None,
            None => Some(current.total_quantity_liters),
        };
        MilkRecordInput {
            cow_id: self.cow_id.or(Some(current.cow_id)),
            date: self.date.or(Some(current.date)),
            morning_quantity_liters: self
                .morning_quantity_liters
                .or(Some(current.morning_quantity_liters)),
            evening_quantity_liters: self
                .evening_quantity_liters
                .or(Some(current.evening_quantity_liters)),
            total_quantity_liters: total,
            fat_percentage: self.fat_percentage.or(current.fat_percentage),
            protein_percentage: self.protein_percentage.or(current.protein_percentage),
            quality_rating: self
                .quality_rating
                .or_else(|| current.quality_rating.map(|q| q.to_string())),
            notes: self.notes.or_else(|| current.notes.clone()),
        }
    }
}

/// What the caller already resolved about a daily submission.
#[derive(Debug, Clone, Copy)]
pub struct DailyContext<'a> {
    pub farm_name: Option<&'a str>,
    pub date: NaiveDate,
    pub today: NaiveDate,
    /// A record for this cow and date is already stored.
    pub duplicate: bool,
}

struct Readings {
    morning: Decimal,
    evening: Decimal,
    fat: Option<Decimal>,
    protein: Option<Decimal>,
    quality: Option<Quality>,
}

fn check_readings(
    errors: &mut ValidationErrors,
    morning: Option<Decimal>,
    evening: Option<Decimal>,
    fat: Option<Decimal>,
    protein: Option<Decimal>,
    quality: Option<&str>,
) -> Readings {
    let liters = Decimal::from(MAX_MILK_LITERS);
    let percent = Decimal::from(MAX_PERCENTAGE);
    check_range(errors, "morning_quantity_liters", morning, Decimal::ZERO, liters);
    check_range(errors, "evening_quantity_liters", evening, Decimal::ZERO, liters);
    check_range(errors, "fat_percentage", fat, Decimal::ZERO, percent);
    check_range(errors, "protein_percentage", protein, Decimal::ZERO, percent);
    let quality = parse_choice::<Quality>(
        errors,
        "quality_rating",
        quality,
        false,
        &Quality::names(),
    );
    Readings {
        morning: morning.unwrap_or(Decimal::ZERO),
        evening: evening.unwrap_or(Decimal::ZERO),
        fat,
        protein,
        quality,
    }
}

fn entry_readings(errors: &mut ValidationErrors, entry: &ProductionEntry) -> Readings {
    check_readings(
        errors,
        entry.morning_quantity_liters,
        entry.evening_quantity_liters,
        entry.fat_percentage,
        entry.protein_percentage,
        entry.quality_rating.as_deref(),
    )
}

/// Farm name and date are required up front; both forms share them.
pub fn check_header(
    farm_name: Option<&str>,
    date: Option<NaiveDate>,
) -> Result<(String, NaiveDate), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let farm_name = required_text(&mut errors, "farm_name", farm_name);
    if date.is_none() {
        errors.required("date");
    }
    match (farm_name, date) {
        (Some(name), Some(date)) => errors.into_result((name, date)),
        _ => Err(errors),
    }
}

/// Rules for one cow's daily production, the cow already resolved within the
/// caller's scope.
pub fn validate_daily(
    cow: &Cow,
    entry: &ProductionEntry,
    ctx: DailyContext<'_>,
) -> Result<NewMilkRecord, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if let Some(name) = ctx.farm_name {
        if name.trim() != cow.farm_name {
            errors.push(
                "farm_name",
                ErrorCode::Mismatch,
                format!("cow {} does not belong to farm {}", cow.tag_number, name.trim()),
            );
        }
    }
    if ctx.duplicate {
        errors.push(
            "date",
            ErrorCode::DuplicateRecord,
            format!(
                "a milk record already exists for cow {} on {}",
                cow.tag_number, ctx.date
            ),
        );
    }
    check_not_future(&mut errors, "date", ctx.date, ctx.today);
    let readings = entry_readings(&mut errors, entry);

    errors.into_result(NewMilkRecord {
        cow_id: cow.id,
        farmer_id: cow.farmer_id,
        farm_id: cow.farm_id,
        date: ctx.date,
        morning_quantity_liters: readings.morning,
        evening_quantity_liters: readings.evening,
        total_quantity_liters: readings.morning + readings.evening,
        fat_percentage: readings.fat,
        protein_percentage: readings.protein,
        quality_rating: readings.quality,
        notes: optional_text(entry.notes.as_deref()),
    })
}

pub fn check_batch_size(records: &[ProductionEntry]) -> Result<(), ValidationErrors> {
    if records.is_empty() {
        return Err(ValidationErrors::single(
            "records",
            ErrorCode::FieldRequired,
            "at least one record is required",
        ));
    }
    if records.len() > MAX_BULK_RECORDS {
        return Err(ValidationErrors::single(
            "records",
            ErrorCode::BatchTooLarge,
            format!(
                "a batch may hold at most {} records, got {}",
                MAX_BULK_RECORDS,
                records.len()
            ),
        ));
    }
    Ok(())
}

/// The cow tag is the only per-entry field needed before the cow lookup.
/// Without one the readings are still checked, so the entry reports all of
/// its problems at once.
pub fn entry_tag(entry: &ProductionEntry) -> Result<String, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    match required_text(&mut errors, "cow_tag", entry.cow_tag.as_deref()) {
        Some(tag) => Ok(tag),
        None => {
            entry_readings(&mut errors, entry);
            Err(errors)
        }
    }
}

/// Header and tag of a single daily submission: `(farm_name, date, cow_tag)`.
pub fn check_daily_request(
    farm_name: Option<&str>,
    date: Option<NaiveDate>,
    entry: &ProductionEntry,
) -> Result<(String, NaiveDate, String), ValidationErrors> {
    match (check_header(farm_name, date), entry_tag(entry)) {
        (Ok((name, date)), Ok(tag)) => Ok((name, date, tag)),
        (header, tag) => {
            let mut errors = ValidationErrors::new();
            if let Err(e) = header {
                errors.extend(e);
            }
            match tag {
                Err(e) => errors.extend(e),
                Ok(_) => {
                    entry_readings(&mut errors, entry);
                }
            }
            Err(errors)
        }
    }
}

/// Plain create/update body, validated against the cow it references.
/// `duplicate` is whether another record already holds this cow and date.
pub fn validate_record_input(
    cow: &Cow,
    input: &MilkRecordInput,
    today: NaiveDate,
    duplicate: bool,
) -> Result<NewMilkRecord, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if duplicate {
        errors.push(
            "date",
            ErrorCode::DuplicateRecord,
            format!("a milk record already exists for cow {} on this date", cow.tag_number),
        );
    }
    let date = match input.date {
        Some(date) => {
            check_not_future(&mut errors, "date", date, today);
            date
        }
        None => {
            errors.required("date");
            today
        }
    };
    let readings = check_readings(
        &mut errors,
        input.morning_quantity_liters,
        input.evening_quantity_liters,
        input.fat_percentage,
        input.protein_percentage,
        input.quality_rating.as_deref(),
    );
    check_non_negative(&mut errors, "total_quantity_liters", input.total_quantity_liters);
    // A zero total counts as not given.
    let total = input
        .total_quantity_liters
        .filter(|total| !total.is_zero())
        .unwrap_or(readings.morning + readings.evening);

    errors.into_result(NewMilkRecord {
        cow_id: cow.id,
        farmer_id: cow.farmer_id,
        farm_id: cow.farm_id,
        date,
        morning_quantity_liters: readings.morning,
        evening_quantity_liters: readings.evening,
        total_quantity_liters: total,
        fat_percentage: readings.fat,
        protein_percentage: readings.protein,
        quality_rating: readings.quality,
        notes: optional_text(input.notes.as_deref()),
    })
}
