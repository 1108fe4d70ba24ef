use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{
    check_non_negative, check_not_future, check_range, optional_text, parse_choice, required_text,
    MAX_CALF_WEIGHT_KG, ROUTINE_BACKDATE_DAYS,
};
use crate::db::{Activity, ActivityStatus, ActivityType, CalfGender};
use crate::error::{ErrorCode, ValidationErrors};

/// An activity row ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub cow_id: i32,
    pub title: String,
    pub activity_type: ActivityType,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: Option<NaiveTime>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ActivityStatus,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub cost: Option<Decimal>,
}

/// Change a logged event applies to the cow itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CowEffect {
    Calved,
    Bred(NaiveDate),
}

/// Result of a logging form: the activity plus the form-only fields echoed
/// back to the caller. Form-only fields are never stored verbatim.
#[derive(Debug, Clone)]
pub struct NormalizedLog {
    pub activity: NewActivity,
    pub cow_effect: Option<CowEffect>,
    pub details: Map<String, Value>,
}

/// The cow a log was resolved against.
#[derive(Debug, Clone, Copy)]
pub struct LogTarget<'a> {
    pub cow_id: i32,
    pub tag_number: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogActivityRequest {
    pub cow_tag: Option<String>,
    pub activity_type: Option<String>,
    pub title: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub cost: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VaccinationRequest {
    pub cow_tag: Option<String>,
    pub vaccine_name: Option<String>,
    pub dosage: Option<String>,
    pub veterinarian: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
    pub cost: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HealthCheckRequest {
    pub cow_tag: Option<String>,
    pub veterinarian: Option<String>,
    pub health_status: Option<String>,
    pub symptoms: Option<String>,
    pub treatment: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
    pub cost: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CalvingRequest {
    pub cow_tag: Option<String>,
    pub calf_gender: Option<String>,
    pub calf_weight: Option<Decimal>,
    pub assistance_provided: Option<bool>,
    pub veterinarian: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
    pub cost: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BreedingRequest {
    pub cow_tag: Option<String>,
    pub description: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
    pub cost: Option<Decimal>,
    pub notes: Option<String>,
}

/// Body of the plain activity create/update endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ActivityInput {
    pub cow_id: Option<i32>,
    pub title: Option<String>,
    pub activity_type: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub cost: Option<Decimal>,
}

impl ActivityInput {
    /// Fills every absent field from the stored row.
    pub fn over(self, current: &Activity) -> ActivityInput {
        ActivityInput {
            cow_id: self.cow_id.or(Some(current.cow_id)),
            title: self.title.or_else(|| Some(current.title.clone())),
            activity_type: self
                .activity_type
                .or_else(|| Some(current.activity_type.to_string())),
            scheduled_date: self.scheduled_date.or(Some(current.scheduled_date)),
            scheduled_time: self.scheduled_time.or(current.scheduled_time),
            start_time: self.start_time.or(current.start_time),
            end_time: self.end_time.or(current.end_time),
            status: self.status.or_else(|| Some(current.status.to_string())),
            description: self.description.or_else(|| current.description.clone()),
            notes: self.notes.or_else(|| current.notes.clone()),
            cost: self.cost.or(current.cost),
        }
    }
}

fn check_ordering(
    errors: &mut ValidationErrors,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) {
    if let (Some(s), Some(e)) = (start, end) {
        if s >= e {
            errors.push(
                "end_time",
                ErrorCode::InvalidOrdering,
                "end_time must be after start_time",
            );
        }
    }
}

fn completed_log(
    target: LogTarget<'_>,
    activity_type: ActivityType,
    title: String,
    scheduled_date: NaiveDate,
    scheduled_time: Option<NaiveTime>,
    description: Option<String>,
    notes: Option<&str>,
    cost: Option<Decimal>,
) -> NewActivity {
    NewActivity {
        cow_id: target.cow_id,
        title,
        activity_type,
        scheduled_date,
        scheduled_time,
        start_time: None,
        end_time: None,
        status: ActivityStatus::Completed,
        description,
        notes: optional_text(notes),
        cost,
    }
}

/// General activity log. Status defaults to COMPLETED, the date to today,
/// and a bare `end_time` backfills `start_time` with `now`.
pub fn normalize_log(
    target: LogTarget<'_>,
    req: &LogActivityRequest,
    now: DateTime<Utc>,
) -> Result<NormalizedLog, ValidationErrors> {
    let today = now.date_naive();
    let mut errors = ValidationErrors::new();

    let activity_type = parse_choice::<ActivityType>(
        &mut errors,
        "activity_type",
        req.activity_type.as_deref(),
        true,
        &ActivityType::names(),
    );
    let status = parse_choice::<ActivityStatus>(
        &mut errors,
        "status",
        req.status.as_deref(),
        false,
        &ActivityStatus::names(),
    )
    .unwrap_or(ActivityStatus::Completed);
    let scheduled_date = req.scheduled_date.unwrap_or(today);
    let start_time = match (req.start_time, req.end_time) {
        (None, Some(_)) => Some(now),
        (start, _) => start,
    };
    let title = optional_text(req.title.as_deref()).unwrap_or_else(|| {
        let label = activity_type.map(|t| t.label()).unwrap_or("Activity");
        format!("{} - {}", label, target.tag_number)
    });

    if let Some(kind) = activity_type {
        if kind.is_routine() && scheduled_date < today - Duration::days(ROUTINE_BACKDATE_DAYS) {
            errors.push(
                "scheduled_date",
                ErrorCode::StaleDateNotAllowed,
                format!(
                    "{} can only be logged for the past {} days",
                    kind.label(),
                    ROUTINE_BACKDATE_DAYS
                ),
            );
        }
    }
    check_ordering(&mut errors, start_time, req.end_time);
    check_non_negative(&mut errors, "cost", req.cost);

    let Some(activity_type) = activity_type else {
        return Err(errors);
    };
    let mut details = Map::new();
    details.insert("title".into(), json!(title));

    errors.into_result(NormalizedLog {
        activity: NewActivity {
            cow_id: target.cow_id,
            title,
            activity_type,
            scheduled_date,
            scheduled_time: req.scheduled_time,
            start_time,
            end_time: req.end_time,
            status,
            description: optional_text(req.description.as_deref()),
            notes: optional_text(req.notes.as_deref()),
            cost: req.cost,
        },
        cow_effect: None,
        details,
    })
}

pub fn normalize_vaccination(
    target: LogTarget<'_>,
    req: &VaccinationRequest,
    now: DateTime<Utc>,
) -> Result<NormalizedLog, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let vaccine = required_text(&mut errors, "vaccine_name", req.vaccine_name.as_deref());
    let dosage = required_text(&mut errors, "dosage", req.dosage.as_deref());
    let vet = required_text(&mut errors, "veterinarian", req.veterinarian.as_deref());
    check_non_negative(&mut errors, "cost", req.cost);

    let (Some(vaccine), Some(dosage), Some(vet)) = (vaccine, dosage, vet) else {
        return Err(errors);
    };
    let description = format!("Vaccine: {} | Dosage: {} | Vet: {}", vaccine, dosage, vet);
    let activity = completed_log(
        target,
        ActivityType::Vaccination,
        format!("Vaccination - {}", vaccine),
        req.scheduled_date.unwrap_or(now.date_naive()),
        req.scheduled_time,
        Some(description),
        req.notes.as_deref(),
        req.cost,
    );

    let mut details = Map::new();
    details.insert("vaccine_name".into(), json!(vaccine));
    details.insert("dosage".into(), json!(dosage));
    details.insert("veterinarian".into(), json!(vet));

    errors.into_result(NormalizedLog {
        activity,
        cow_effect: None,
        details,
    })
}

pub fn normalize_health_check(
    target: LogTarget<'_>,
    req: &HealthCheckRequest,
    now: DateTime<Utc>,
) -> Result<NormalizedLog, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let vet = required_text(&mut errors, "veterinarian", req.veterinarian.as_deref());
    check_non_negative(&mut errors, "cost", req.cost);

    let Some(vet) = vet else {
        return Err(errors);
    };
    let health_status =
        optional_text(req.health_status.as_deref()).unwrap_or_else(|| "Healthy".to_string());
    let mut description = format!("Status: {} | Vet: {}", health_status, vet);
    if let Some(symptoms) = optional_text(req.symptoms.as_deref()) {
        description.push_str(&format!(" | Symptoms: {}", symptoms));
    }
    if let Some(treatment) = optional_text(req.treatment.as_deref()) {
        description.push_str(&format!(" | Treatment: {}", treatment));
    }

    let activity = completed_log(
        target,
        ActivityType::HealthCheck,
        format!("Health Check - {}", target.tag_number),
        req.scheduled_date.unwrap_or(now.date_naive()),
        req.scheduled_time,
        Some(description),
        req.notes.as_deref(),
        req.cost,
    );

    let mut details = Map::new();
    details.insert("health_status".into(), json!(health_status));
    details.insert("veterinarian".into(), json!(vet));

    errors.into_result(NormalizedLog {
        activity,
        cow_effect: None,
        details,
    })
}

/// Calving: the date may not be in the future whatever else is valid.
pub fn normalize_calving(
    target: LogTarget<'_>,
    req: &CalvingRequest,
    now: DateTime<Utc>,
) -> Result<NormalizedLog, ValidationErrors> {
    let today = now.date_naive();
    let mut errors = ValidationErrors::new();

    let scheduled_date = req.scheduled_date.unwrap_or(today);
    let assistance = req.assistance_provided.unwrap_or(false);
    let gender = parse_choice::<CalfGender>(
        &mut errors,
        "calf_gender",
        req.calf_gender.as_deref(),
        true,
        &CalfGender::names(),
    );
    check_not_future(&mut errors, "scheduled_date", scheduled_date, today);
    check_range(
        &mut errors,
        "calf_weight",
        req.calf_weight,
        Decimal::ZERO,
        Decimal::from(MAX_CALF_WEIGHT_KG),
    );
    check_non_negative(&mut errors, "cost", req.cost);

    let Some(gender) = gender else {
        return Err(errors);
    };
    let mut description = format!("Calf gender: {}", gender);
    if let Some(weight) = req.calf_weight {
        description.push_str(&format!(" | Calf weight: {} kg", weight));
    }
    description.push_str(if assistance {
        " | Assistance provided: Yes"
    } else {
        " | Assistance provided: No"
    });
    if let Some(vet) = optional_text(req.veterinarian.as_deref()) {
        description.push_str(&format!(" | Vet: {}", vet));
    }

    let activity = completed_log(
        target,
        ActivityType::Calving,
        format!("Calving - {}", target.tag_number),
        scheduled_date,
        req.scheduled_time,
        Some(description),
        req.notes.as_deref(),
        req.cost,
    );

    let mut details = Map::new();
    details.insert("calf_gender".into(), json!(gender));
    details.insert("calf_weight".into(), json!(req.calf_weight));
    details.insert("assistance_provided".into(), json!(assistance));

    errors.into_result(NormalizedLog {
        activity,
        cow_effect: Some(CowEffect::Calved),
        details,
    })
}

pub fn normalize_breeding(
    target: LogTarget<'_>,
    req: &BreedingRequest,
    now: DateTime<Utc>,
) -> Result<NormalizedLog, ValidationErrors> {
    let today = now.date_naive();
    let mut errors = ValidationErrors::new();

    let scheduled_date = req.scheduled_date.unwrap_or(today);
    let description = required_text(&mut errors, "description", req.description.as_deref());
    check_not_future(&mut errors, "scheduled_date", scheduled_date, today);
    check_non_negative(&mut errors, "cost", req.cost);

    let activity = completed_log(
        target,
        ActivityType::Breeding,
        format!("Breeding - {}", target.tag_number),
        scheduled_date,
        req.scheduled_time,
        description,
        req.notes.as_deref(),
        req.cost,
    );

    let mut details = Map::new();
    details.insert("breeding_date".into(), json!(scheduled_date));

    errors.into_result(NormalizedLog {
        activity,
        cow_effect: Some(CowEffect::Bred(scheduled_date)),
        details,
    })
}

/// Plain create/update body. Status defaults to PLANNED here, unlike the logging forms.
pub fn normalize_activity_input(input: &ActivityInput) -> Result<NewActivity, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if input.cow_id.is_none() {
        errors.required("cow_id");
    }
    let title = required_text(&mut errors, "title", input.title.as_deref());
    let activity_type = parse_choice::<ActivityType>(
        &mut errors,
        "activity_type",
        input.activity_type.as_deref(),
        true,
        &ActivityType::names(),
    );
    let status = parse_choice::<ActivityStatus>(
        &mut errors,
        "status",
        input.status.as_deref(),
        false,
        &ActivityStatus::names(),
    )
    .unwrap_or(ActivityStatus::Planned);
    if input.scheduled_date.is_none() {
        errors.required("scheduled_date");
    }
    check_ordering(&mut errors, input.start_time, input.end_time);
    check_non_negative(&mut errors, "cost", input.cost);

    match (input.cow_id, title, activity_type, input.scheduled_date) {
        (Some(cow_id), Some(title), Some(activity_type), Some(scheduled_date)) => {
            errors.into_result(NewActivity {
                cow_id,
                title,
                activity_type,
                scheduled_date,
                scheduled_time: input.scheduled_time,
                start_time: input.start_time,
                end_time: input.end_time,
                status,
                description: optional_text(input.description.as_deref()),
                notes: optional_text(input.notes.as_deref()),
                cost: input.cost,
            })
        }
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap()
    }

    fn target() -> LogTarget<'static> {
        LogTarget {
            cow_id: 11,
            tag_number: "COW001",
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn log_defaults_status_date_and_title() {
        let req = LogActivityRequest {
            activity_type: Some("feeding".into()),
            ..Default::default()
        };
        let log = normalize_log(target(), &req, now()).unwrap();
        assert_eq!(log.activity.status, ActivityStatus::Completed);
        assert_eq!(log.activity.scheduled_date, date(2024, 6, 15));
        assert_eq!(log.activity.title, "Feeding - COW001");
        assert_eq!(log.activity.cow_id, 11);
    }

    #[test]
    fn log_backfills_start_time_from_now() {
        let end = Utc.with_ymd_and_hms(2024, 6, 15, 11, 0, 0).unwrap();
        let req = LogActivityRequest {
            activity_type: Some("WEIGHING".into()),
            end_time: Some(end),
            ..Default::default()
        };
        let log = normalize_log(target(), &req, now()).unwrap();
        assert_eq!(log.activity.start_time, Some(now()));
        assert_eq!(log.activity.end_time, Some(end));
    }

    #[test]
    fn log_rejects_inverted_times() {
        let req = LogActivityRequest {
            activity_type: Some("MEDICATION".into()),
            start_time: Some(Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap()),
            end_time: Some(Utc.with_ymd_and_hms(2024, 6, 15, 8, 0, 0).unwrap()),
            ..Default::default()
        };
        let errors = normalize_log(target(), &req, now()).unwrap_err();
        assert!(errors.has("end_time", ErrorCode::InvalidOrdering));
    }

    #[test]
    fn routine_logs_cannot_be_older_than_a_week() {
        let stale = LogActivityRequest {
            activity_type: Some("MILKING".into()),
            scheduled_date: Some(date(2024, 6, 7)),
            ..Default::default()
        };
        let errors = normalize_log(target(), &stale, now()).unwrap_err();
        assert!(errors.has("scheduled_date", ErrorCode::StaleDateNotAllowed));

        let edge = LogActivityRequest {
            activity_type: Some("CLEANING".into()),
            scheduled_date: Some(date(2024, 6, 8)),
            ..Default::default()
        };
        assert!(normalize_log(target(), &edge, now()).is_ok());

        let not_routine = LogActivityRequest {
            activity_type: Some("MAINTENANCE".into()),
            scheduled_date: Some(date(2024, 1, 1)),
            ..Default::default()
        };
        assert!(normalize_log(target(), &not_routine, now()).is_ok());
    }

    #[test]
    fn log_collects_every_violation() {
        let req = LogActivityRequest {
            activity_type: Some("DANCING".into()),
            status: Some("SOMETIME".into()),
            cost: Some(Decimal::new(-500, 2)),
            ..Default::default()
        };
        let errors = normalize_log(target(), &req, now()).unwrap_err();
        assert!(errors.has("activity_type", ErrorCode::Invalid));
        assert!(errors.has("status", ErrorCode::Invalid));
        assert!(errors.has("cost", ErrorCode::FieldOutOfRange));
    }

    #[test]
    fn vaccination_without_vet_names_the_field() {
        let req = VaccinationRequest {
            vaccine_name: Some("FMD".into()),
            dosage: Some("5ml".into()),
            ..Default::default()
        };
        let errors = normalize_vaccination(target(), &req, now()).unwrap_err();
        assert!(errors.has("veterinarian", ErrorCode::FieldRequired));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn vaccination_synthesizes_description_and_forces_type() {
        let req = VaccinationRequest {
            vaccine_name: Some("FMD".into()),
            dosage: Some("5ml".into()),
            veterinarian: Some("Dr. Wanjiru".into()),
            cost: Some(Decimal::new(1500, 2)),
            ..Default::default()
        };
        let log = normalize_vaccination(target(), &req, now()).unwrap();
        assert_eq!(log.activity.activity_type, ActivityType::Vaccination);
        assert_eq!(log.activity.status, ActivityStatus::Completed);
        assert_eq!(
            log.activity.description.as_deref(),
            Some("Vaccine: FMD | Dosage: 5ml | Vet: Dr. Wanjiru")
        );
        assert_eq!(log.details["vaccine_name"], "FMD");
    }

    #[test]
    fn health_check_template() {
        let req = HealthCheckRequest {
            veterinarian: Some("Dr. Otieno".into()),
            health_status: Some("Sick".into()),
            symptoms: Some("fever".into()),
            ..Default::default()
        };
        let log = normalize_health_check(target(), &req, now()).unwrap();
        assert_eq!(
            log.activity.description.as_deref(),
            Some("Status: Sick | Vet: Dr. Otieno | Symptoms: fever")
        );

        let missing_vet = HealthCheckRequest::default();
        let errors = normalize_health_check(target(), &missing_vet, now()).unwrap_err();
        assert!(errors.has("veterinarian", ErrorCode::FieldRequired));
    }

    #[test]
    fn calving_in_the_future_always_fails() {
        let req = CalvingRequest {
            calf_gender: Some("FEMALE".into()),
            scheduled_date: Some(date(2024, 6, 16)),
            ..Default::default()
        };
        let errors = normalize_calving(target(), &req, now()).unwrap_err();
        assert!(errors.has("scheduled_date", ErrorCode::FutureDateNotAllowed));

        let also_bad_gender = CalvingRequest {
            calf_gender: Some("UNKNOWN".into()),
            scheduled_date: Some(date(2025, 1, 1)),
            ..Default::default()
        };
        let errors = normalize_calving(target(), &also_bad_gender, now()).unwrap_err();
        assert!(errors.has("scheduled_date", ErrorCode::FutureDateNotAllowed));
        assert!(errors.has("calf_gender", ErrorCode::Invalid));
    }

    #[test]
    fn calving_checks_weight_and_defaults_assistance() {
        let heavy = CalvingRequest {
            calf_gender: Some("MALE".into()),
            calf_weight: Some(Decimal::from(101)),
            ..Default::default()
        };
        let errors = normalize_calving(target(), &heavy, now()).unwrap_err();
        assert!(errors.has("calf_weight", ErrorCode::FieldOutOfRange));

        let ok = CalvingRequest {
            calf_gender: Some("male".into()),
            calf_weight: Some(Decimal::new(325, 1)),
            ..Default::default()
        };
        let log = normalize_calving(target(), &ok, now()).unwrap();
        assert_eq!(log.cow_effect, Some(CowEffect::Calved));
        assert_eq!(log.details["assistance_provided"], false);
        assert_eq!(
            log.activity.description.as_deref(),
            Some("Calf gender: MALE | Calf weight: 32.5 kg | Assistance provided: No")
        );
    }

    #[test]
    fn breeding_requires_description_and_past_date() {
        let req = BreedingRequest {
            scheduled_date: Some(date(2024, 7, 1)),
            ..Default::default()
        };
        let errors = normalize_breeding(target(), &req, now()).unwrap_err();
        assert!(errors.has("description", ErrorCode::FieldRequired));
        assert!(errors.has("scheduled_date", ErrorCode::FutureDateNotAllowed));

        let ok = BreedingRequest {
            description: Some("AI with Friesian sire".into()),
            scheduled_date: Some(date(2024, 6, 1)),
            ..Default::default()
        };
        let log = normalize_breeding(target(), &ok, now()).unwrap();
        assert_eq!(log.cow_effect, Some(CowEffect::Bred(date(2024, 6, 1))));
    }

    #[test]
    fn plain_input_defaults_to_planned() {
        let input = ActivityInput {
            cow_id: Some(3),
            title: Some("Hoof trimming".into()),
            activity_type: Some("MAINTENANCE".into()),
            scheduled_date: Some(date(2024, 6, 20)),
            ..Default::default()
        };
        let activity = normalize_activity_input(&input).unwrap();
        assert_eq!(activity.status, ActivityStatus::Planned);

        let errors = normalize_activity_input(&ActivityInput::default()).unwrap_err();
        assert!(errors.has("cow_id", ErrorCode::FieldRequired));
        assert!(errors.has("title", ErrorCode::FieldRequired));
        assert!(errors.has("activity_type", ErrorCode::FieldRequired));
        assert!(errors.has("scheduled_date", ErrorCode::FieldRequired));
    }
}
