use std::collections::BTreeMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::postgres::PgExecutor;
use sqlx::{FromRow, Postgres, QueryBuilder};

use super::cow::{ensure_farmer_owns, find_cow_by_tag, find_cow_in_scope};
use super::listing::{fetch_page, push_eq, push_search, ListParams, Page};
use super::{body, not_found, query};
use crate::access::{enforce, ownership, visible_rows, EntityKind, Identity, Operation, Scope};
use crate::db::{Activity, ActivityStatus, ActivityType, ActivityView, Breed, DbPool};
use crate::error::{FarmHubError, FarmHubResult, ValidationErrors};
use crate::state::AppState;
use crate::validation::activity::{
    normalize_activity_input, normalize_breeding, normalize_calving, normalize_health_check,
    normalize_log, normalize_vaccination, ActivityInput, BreedingRequest, CalvingRequest, CowEffect,
    HealthCheckRequest, LogActivityRequest, LogTarget, NewActivity, NormalizedLog,
    VaccinationRequest,
};
use crate::validation::required_text;

const ACTIVITY_SELECT: &str = "SELECT a.*, c.tag_number AS cow_tag, c.farmer_id AS farmer_id, \
     c.farm_id AS farm_id, f.name AS farm_name, f.agent_id AS farm_agent_id";
const ACTIVITY_FROM: &str =
    "FROM activities a JOIN cows c ON c.id = a.cow_id JOIN farms f ON f.id = c.farm_id";
const ACTIVITY_SEARCH: &[&str] = &["a.title", "c.tag_number", "c.name", "a.description", "a.notes"];
const ACTIVITY_ORDERING: &[(&str, &str)] = &[
    ("scheduled_date", "a.scheduled_date"),
    ("scheduled_time", "a.scheduled_time"),
    ("created_at", "a.created_at"),
];
const ACTIVITY_DEFAULT_ORDER: &str = "a.scheduled_date DESC, a.scheduled_time DESC NULLS LAST";
const DEFAULT_UPCOMING_DAYS: i64 = 7;
const MAX_UPCOMING_DAYS: i64 = 90;
/// A planned activity is overdue once its date plus time (midnight if unset) has passed.
const OVERDUE_SQL: &str =
    "a.status = 'PLANNED' AND (a.scheduled_date + COALESCE(a.scheduled_time, TIME '00:00')) < ";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ActivityFilter {
    pub activity_type: Option<ActivityType>,
    pub status: Option<ActivityStatus>,
    pub scheduled_date: Option<NaiveDate>,
    pub breed: Option<Breed>,
    pub farm: Option<i32>,
    pub cow: Option<i32>,
}

/// Response of the logging forms: the stored activity plus the form fields
/// that only live in its description.
#[derive(Debug, Serialize)]
pub struct LoggedActivity {
    pub message: String,
    pub id: i32,
    pub cow_tag: String,
    pub activity_type: ActivityType,
    pub status: ActivityStatus,
    pub scheduled_date: NaiveDate,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SummaryParams {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

#[derive(Debug, FromRow)]
struct ActivityTotals {
    total: i64,
    overdue: i64,
    total_cost: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ActivitySummary {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub total_activities: i64,
    pub overdue_activities: i64,
    pub total_cost: Decimal,
    pub by_type: BTreeMap<String, i64>,
    pub by_status: BTreeMap<String, i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpcomingParams {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CowActivities {
    pub cow_id: i32,
    pub cow_tag: String,
    pub cow_name: Option<String>,
    pub count: usize,
    pub activities: Vec<ActivityView>,
}

#[derive(Debug, Serialize)]
pub struct UpcomingActivities {
    pub days: i64,
    pub until: NaiveDate,
    pub count: usize,
    pub activities: Vec<ActivityView>,
}

pub async fn fetch_activity(pool: &DbPool, id: i32) -> FarmHubResult<Option<Activity>> {
    let sql = format!("{} {} WHERE a.id = $1", ACTIVITY_SELECT, ACTIVITY_FROM);
    let activity = sqlx::query_as::<_, Activity>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(activity)
}

async fn insert_activity<'e, E: PgExecutor<'e>>(exec: E, activity: &NewActivity) -> FarmHubResult<i32> {
    let id: i32 = sqlx::query_scalar(
        "INSERT INTO activities (title, activity_type, cow_id, scheduled_date, scheduled_time,
             start_time, end_time, status, description, notes, cost)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         RETURNING id",
    )
    .bind(&activity.title)
    .bind(activity.activity_type)
    .bind(activity.cow_id)
    .bind(activity.scheduled_date)
    .bind(activity.scheduled_time)
    .bind(activity.start_time)
    .bind(activity.end_time)
    .bind(activity.status)
    .bind(&activity.description)
    .bind(&activity.notes)
    .bind(activity.cost)
    .fetch_one(exec)
    .await
    .map_err(FarmHubError::from_storage)?;
    Ok(id)
}

async fn apply_cow_effect<'e, E: PgExecutor<'e>>(
    exec: E,
    cow_id: i32,
    effect: CowEffect,
) -> FarmHubResult<()> {
    match effect {
        CowEffect::Calved => {
            sqlx::query("UPDATE cows SET is_pregnant = FALSE, updated_at = NOW() WHERE id = $1")
                .bind(cow_id)
                .execute(exec)
                .await?;
        }
        CowEffect::Bred(date) => {
            sqlx::query("UPDATE cows SET last_breeding_date = $1, updated_at = NOW() WHERE id = $2")
                .bind(date)
                .bind(cow_id)
                .execute(exec)
                .await?;
        }
    }
    Ok(())
}

/// Shared flow of every logging form: resolve the cow by tag inside the
/// caller's scope, normalize, then store the activity and its effect on the
/// cow in one transaction.
/// A form without a cow tag is still run through its own rules against a
/// placeholder cow, so the caller sees every missing field in one response.
fn require_cow_tag<R, F>(
    cow_tag: Option<&str>,
    req: &R,
    now: DateTime<Utc>,
    normalize: &F,
) -> Result<String, ValidationErrors>
where
    F: Fn(LogTarget<'_>, &R, DateTime<Utc>) -> Result<NormalizedLog, ValidationErrors>,
{
    let mut errors = ValidationErrors::new();
    if let Some(tag) = required_text(&mut errors, "cow_tag", cow_tag) {
        return Ok(tag);
    }
    let placeholder = LogTarget {
        cow_id: 0,
        tag_number: "",
    };
    if let Err(form) = normalize(placeholder, req, now) {
        errors.extend(form);
    }
    Err(errors)
}

async fn log_with<R, F>(
    pool: &DbPool,
    identity: &Identity,
    cow_tag: Option<&str>,
    req: &R,
    now: DateTime<Utc>,
    normalize: F,
) -> FarmHubResult<LoggedActivity>
where
    F: Fn(LogTarget<'_>, &R, DateTime<Utc>) -> Result<NormalizedLog, ValidationErrors>,
{
    enforce(identity, EntityKind::Activity, Operation::Create, None)?;
    let tag = require_cow_tag(cow_tag, req, now, &normalize)?;

    let cow = find_cow_by_tag(pool, identity, &tag).await?;
    let target = LogTarget {
        cow_id: cow.id,
        tag_number: &cow.tag_number,
    };
    let NormalizedLog {
        activity,
        cow_effect,
        details,
    } = normalize(target, req, now)?;
    ensure_farmer_owns(identity, &cow)?;

    let mut tx = pool.begin().await?;
    let id = insert_activity(&mut *tx, &activity).await?;
    if let Some(effect) = cow_effect {
        apply_cow_effect(&mut *tx, cow.id, effect).await?;
    }
    tx.commit().await?;

    tracing::info!(
        "user {} logged {} activity {} for cow {}",
        identity.user_id,
        activity.activity_type,
        id,
        cow.tag_number
    );

    Ok(LoggedActivity {
        message: format!(
            "{} logged for cow {}",
            activity.activity_type.label(),
            cow.tag_number
        ),
        id,
        cow_tag: cow.tag_number,
        activity_type: activity.activity_type,
        status: activity.status,
        scheduled_date: activity.scheduled_date,
        details,
    })
}

pub async fn log_activity(
    pool: &DbPool,
    identity: &Identity,
    req: LogActivityRequest,
    now: DateTime<Utc>,
) -> FarmHubResult<LoggedActivity> {
    log_with(pool, identity, req.cow_tag.as_deref(), &req, now, normalize_log).await
}

pub async fn log_vaccination(
    pool: &DbPool,
    identity: &Identity,
    req: VaccinationRequest,
    now: DateTime<Utc>,
) -> FarmHubResult<LoggedActivity> {
    log_with(pool, identity, req.cow_tag.as_deref(), &req, now, normalize_vaccination).await
}

pub async fn log_health_check(
    pool: &DbPool,
    identity: &Identity,
    req: HealthCheckRequest,
    now: DateTime<Utc>,
) -> FarmHubResult<LoggedActivity> {
    log_with(pool, identity, req.cow_tag.as_deref(), &req, now, normalize_health_check).await
}

pub async fn log_calving(
    pool: &DbPool,
    identity: &Identity,
    req: CalvingRequest,
    now: DateTime<Utc>,
) -> FarmHubResult<LoggedActivity> {
    log_with(pool, identity, req.cow_tag.as_deref(), &req, now, normalize_calving).await
}

pub async fn log_breeding(
    pool: &DbPool,
    identity: &Identity,
    req: BreedingRequest,
    now: DateTime<Utc>,
) -> FarmHubResult<LoggedActivity> {
    log_with(pool, identity, req.cow_tag.as_deref(), &req, now, normalize_breeding).await
}

fn push_period(qb: &mut QueryBuilder<'_, Postgres>, scope: Scope, params: &SummaryParams) {
    qb.push(" WHERE ");
    scope.push_sql(EntityKind::Activity, qb);
    if let Some(from) = params.from_date {
        qb.push(" AND a.scheduled_date >= ").push_bind(from);
    }
    if let Some(to) = params.to_date {
        qb.push(" AND a.scheduled_date <= ").push_bind(to);
    }
}

async fn count_by(
    pool: &DbPool,
    column: &str,
    scope: Scope,
    params: &SummaryParams,
) -> FarmHubResult<BTreeMap<String, i64>> {
    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT ");
    qb.push(column).push(", COUNT(*) ").push(ACTIVITY_FROM);
    push_period(&mut qb, scope, params);
    qb.push(" GROUP BY ").push(column);
    let rows: Vec<(String, i64)> = qb.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}

pub async fn activity_summary(
    pool: &DbPool,
    identity: &Identity,
    params: SummaryParams,
    now: DateTime<Utc>,
) -> FarmHubResult<ActivitySummary> {
    enforce(identity, EntityKind::Activity, Operation::List, None)?;
    let scope = visible_rows(identity, EntityKind::Activity);

    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT COUNT(*) AS total, COUNT(*) FILTER (WHERE ");
    qb.push(OVERDUE_SQL).push_bind(now.naive_utc());
    qb.push(") AS overdue, COALESCE(SUM(a.cost), 0) AS total_cost ");
    qb.push(ACTIVITY_FROM);
    push_period(&mut qb, scope, &params);
    let totals = qb.build_query_as::<ActivityTotals>().fetch_one(pool).await?;

    let mut by_type: BTreeMap<String, i64> =
        ActivityType::ALL.iter().map(|t| (t.as_str().to_string(), 0)).collect();
    by_type.extend(count_by(pool, "a.activity_type", scope, &params).await?);
    let mut by_status: BTreeMap<String, i64> =
        ActivityStatus::ALL.iter().map(|s| (s.as_str().to_string(), 0)).collect();
    by_status.extend(count_by(pool, "a.status", scope, &params).await?);

    Ok(ActivitySummary {
        from_date: params.from_date,
        to_date: params.to_date,
        total_activities: totals.total,
        overdue_activities: totals.overdue,
        total_cost: totals.total_cost,
        by_type,
        by_status,
    })
}

pub async fn cow_activities(
    pool: &DbPool,
    identity: &Identity,
    tag: &str,
    now: DateTime<Utc>,
) -> FarmHubResult<CowActivities> {
    enforce(identity, EntityKind::Activity, Operation::List, None)?;
    let cow = find_cow_by_tag(pool, identity, tag).await?;
    let scope = visible_rows(identity, EntityKind::Activity);

    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(ACTIVITY_SELECT);
    qb.push(" ").push(ACTIVITY_FROM).push(" WHERE ");
    scope.push_sql(EntityKind::Activity, &mut qb);
    qb.push(" AND a.cow_id = ").push_bind(cow.id);
    qb.push(" ORDER BY ").push(ACTIVITY_DEFAULT_ORDER).push(", a.id DESC");
    let activities: Vec<ActivityView> = qb
        .build_query_as::<Activity>()
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|a| a.view(now))
        .collect();

    Ok(CowActivities {
        cow_id: cow.id,
        cow_tag: cow.tag_number,
        cow_name: cow.name,
        count: activities.len(),
        activities,
    })
}

pub async fn overdue_activities(
    pool: &DbPool,
    identity: &Identity,
    params: &ListParams,
    now: DateTime<Utc>,
) -> FarmHubResult<Page<ActivityView>> {
    enforce(identity, EntityKind::Activity, Operation::List, None)?;
    let scope = visible_rows(identity, EntityKind::Activity);
    let search = params.search_term();
    let order = params.order_by(
        ACTIVITY_ORDERING,
        "a.scheduled_date ASC, a.scheduled_time ASC NULLS FIRST",
        "a.id",
    );
    let cutoff = now.naive_utc();

    let page: Page<Activity> = fetch_page(
        pool,
        ACTIVITY_SELECT,
        ACTIVITY_FROM,
        |qb| {
            qb.push(" WHERE ");
            scope.push_sql(EntityKind::Activity, qb);
            qb.push(" AND ").push(OVERDUE_SQL).push_bind(cutoff);
            push_search(qb, search.as_deref(), ACTIVITY_SEARCH);
        },
        &order,
        params.pagination(),
    )
    .await?;
    Ok(page.map(|a| a.view(now)))
}

pub async fn upcoming_activities(
    pool: &DbPool,
    identity: &Identity,
    days: Option<i64>,
    now: DateTime<Utc>,
) -> FarmHubResult<UpcomingActivities> {
    enforce(identity, EntityKind::Activity, Operation::List, None)?;
    let scope = visible_rows(identity, EntityKind::Activity);
    let days = days.unwrap_or(DEFAULT_UPCOMING_DAYS).clamp(1, MAX_UPCOMING_DAYS);
    let today = now.date_naive();
    let until = today + Duration::days(days);

    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(ACTIVITY_SELECT);
    qb.push(" ").push(ACTIVITY_FROM).push(" WHERE ");
    scope.push_sql(EntityKind::Activity, &mut qb);
    qb.push(" AND a.status = ").push_bind(ActivityStatus::Planned);
    qb.push(" AND a.scheduled_date >= ").push_bind(today);
    qb.push(" AND a.scheduled_date <= ").push_bind(until);
    qb.push(" ORDER BY a.scheduled_date ASC, a.scheduled_time ASC NULLS FIRST, a.id ASC");
    let activities: Vec<ActivityView> = qb
        .build_query_as::<Activity>()
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|a| a.view(now))
        .collect();

    Ok(UpcomingActivities {
        days,
        until,
        count: activities.len(),
        activities,
    })
}

pub async fn list_activities(
    pool: &DbPool,
    identity: &Identity,
    params: &ListParams,
    filter: ActivityFilter,
    now: DateTime<Utc>,
) -> FarmHubResult<Page<ActivityView>> {
    enforce(identity, EntityKind::Activity, Operation::List, None)?;
    let scope = visible_rows(identity, EntityKind::Activity);
    let search = params.search_term();
    let order = params.order_by(ACTIVITY_ORDERING, ACTIVITY_DEFAULT_ORDER, "a.id");

    let page: Page<Activity> = fetch_page(
        pool,
        ACTIVITY_SELECT,
        ACTIVITY_FROM,
        |qb| {
            qb.push(" WHERE ");
            scope.push_sql(EntityKind::Activity, qb);
            push_eq(qb, "a.activity_type", filter.activity_type);
            push_eq(qb, "a.status", filter.status);
            push_eq(qb, "a.scheduled_date", filter.scheduled_date);
            push_eq(qb, "c.breed", filter.breed);
            push_eq(qb, "c.farm_id", filter.farm);
            push_eq(qb, "a.cow_id", filter.cow);
            push_search(qb, search.as_deref(), ACTIVITY_SEARCH);
        },
        &order,
        params.pagination(),
    )
    .await?;
    Ok(page.map(|a| a.view(now)))
}

pub async fn get_activity(
    pool: &DbPool,
    identity: &Identity,
    id: i32,
    now: DateTime<Utc>,
) -> FarmHubResult<ActivityView> {
    enforce(identity, EntityKind::Activity, Operation::Retrieve, None)?;
    let activity = fetch_activity(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::Activity))?;
    enforce(identity, EntityKind::Activity, Operation::Retrieve, Some(&activity.ownership()))?;
    Ok(activity.view(now))
}

pub async fn create_activity(
    pool: &DbPool,
    identity: &Identity,
    input: ActivityInput,
    now: DateTime<Utc>,
) -> FarmHubResult<ActivityView> {
    enforce(identity, EntityKind::Activity, Operation::Create, None)?;
    let activity = normalize_activity_input(&input)?;
    let cow = find_cow_in_scope(pool, identity, activity.cow_id).await?;
    ensure_farmer_owns(identity, &cow)?;

    let id = insert_activity(pool, &activity).await?;
    tracing::info!("user {} scheduled activity {} for cow {}", identity.user_id, id, cow.tag_number);
    let stored = fetch_activity(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::Activity))?;
    Ok(stored.view(now))
}

pub async fn update_activity(
    pool: &DbPool,
    identity: &Identity,
    id: i32,
    input: ActivityInput,
    now: DateTime<Utc>,
) -> FarmHubResult<ActivityView> {
    enforce(identity, EntityKind::Activity, Operation::Update, None)?;
    let current = fetch_activity(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::Activity))?;
    enforce(identity, EntityKind::Activity, Operation::Update, Some(&current.ownership()))?;

    let activity = normalize_activity_input(&input.over(&current))?;
    let cow = find_cow_in_scope(pool, identity, activity.cow_id).await?;
    ensure_farmer_owns(identity, &cow)?;

    sqlx::query(
        "UPDATE activities SET title = $1, activity_type = $2, cow_id = $3, scheduled_date = $4,
             scheduled_time = $5, start_time = $6, end_time = $7, status = $8, description = $9,
             notes = $10, cost = $11, updated_at = NOW()
         WHERE id = $12",
    )
    .bind(&activity.title)
    .bind(activity.activity_type)
    .bind(activity.cow_id)
    .bind(activity.scheduled_date)
    .bind(activity.scheduled_time)
    .bind(activity.start_time)
    .bind(activity.end_time)
    .bind(activity.status)
    .bind(&activity.description)
    .bind(&activity.notes)
    .bind(activity.cost)
    .bind(id)
    .execute(pool)
    .await
    .map_err(FarmHubError::from_storage)?;

    tracing::info!("user {} updated activity {}", identity.user_id, id);
    let stored = fetch_activity(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::Activity))?;
    Ok(stored.view(now))
}

pub async fn delete_activity(pool: &DbPool, identity: &Identity, id: i32) -> FarmHubResult<()> {
    enforce(identity, EntityKind::Activity, Operation::Delete, None)?;
    let owner = ownership::load(pool, EntityKind::Activity, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::Activity))?;
    enforce(identity, EntityKind::Activity, Operation::Delete, Some(&owner))?;

    sqlx::query("DELETE FROM activities WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    tracing::info!("user {} deleted activity {}", identity.user_id, id);
    Ok(())
}

pub async fn log_activity_axum(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<LogActivityRequest>, JsonRejection>,
) -> FarmHubResult<(StatusCode, Json<LoggedActivity>)> {
    let req = body(payload)?;
    let logged = log_activity(&state.pool, &identity, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(logged)))
}

pub async fn log_vaccination_axum(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<VaccinationRequest>, JsonRejection>,
) -> FarmHubResult<(StatusCode, Json<LoggedActivity>)> {
    let req = body(payload)?;
    let logged = log_vaccination(&state.pool, &identity, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(logged)))
}

pub async fn log_health_check_axum(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<HealthCheckRequest>, JsonRejection>,
) -> FarmHubResult<(StatusCode, Json<LoggedActivity>)> {
    let req = body(payload)?;
    let logged = log_health_check(&state.pool, &identity, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(logged)))
}

pub async fn log_calving_axum(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<CalvingRequest>, JsonRejection>,
) -> FarmHubResult<(StatusCode, Json<LoggedActivity>)> {
    let req = body(payload)?;
    let logged = log_calving(&state.pool, &identity, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(logged)))
}

pub async fn log_breeding_axum(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<BreedingRequest>, JsonRejection>,
) -> FarmHubResult<(StatusCode, Json<LoggedActivity>)> {
    let req = body(payload)?;
    let logged = log_breeding(&state.pool, &identity, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(logged)))
}

pub async fn activity_summary_axum(
    State(state): State<AppState>,
    identity: Identity,
    params: Result<Query<SummaryParams>, QueryRejection>,
) -> FarmHubResult<Json<ActivitySummary>> {
    let params = query(params)?;
    Ok(Json(
        activity_summary(&state.pool, &identity, params, Utc::now()).await?,
    ))
}

pub async fn cow_activities_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(tag): Path<String>,
) -> FarmHubResult<Json<CowActivities>> {
    Ok(Json(cow_activities(&state.pool, &identity, &tag, Utc::now()).await?))
}

pub async fn overdue_activities_axum(
    State(state): State<AppState>,
    identity: Identity,
    params: Result<Query<ListParams>, QueryRejection>,
) -> FarmHubResult<Json<Page<ActivityView>>> {
    let params = query(params)?;
    Ok(Json(
        overdue_activities(&state.pool, &identity, &params, Utc::now()).await?,
    ))
}

pub async fn upcoming_activities_axum(
    State(state): State<AppState>,
    identity: Identity,
    params: Result<Query<UpcomingParams>, QueryRejection>,
) -> FarmHubResult<Json<UpcomingActivities>> {
    let params = query(params)?;
    Ok(Json(
        upcoming_activities(&state.pool, &identity, params.days, Utc::now()).await?,
    ))
}

pub async fn list_activities_axum(
    State(state): State<AppState>,
    identity: Identity,
    params: Result<Query<ListParams>, QueryRejection>,
    filter: Result<Query<ActivityFilter>, QueryRejection>,
) -> FarmHubResult<Json<Page<ActivityView>>> {
    let params = query(params)?;
    let filter = query(filter)?;
    Ok(Json(
        list_activities(&state.pool, &identity, &params, filter, Utc::now()).await?,
    ))
}

pub async fn get_activity_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i32>,
) -> FarmHubResult<Json<ActivityView>> {
    Ok(Json(get_activity(&state.pool, &identity, id, Utc::now()).await?))
}

pub async fn create_activity_axum(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<ActivityInput>, JsonRejection>,
) -> FarmHubResult<(StatusCode, Json<ActivityView>)> {
    let input = body(payload)?;
    let activity = create_activity(&state.pool, &identity, input, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

pub async fn update_activity_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i32>,
    payload: Result<Json<ActivityInput>, JsonRejection>,
) -> FarmHubResult<Json<ActivityView>> {
    let input = body(payload)?;
    Ok(Json(
        update_activity(&state.pool, &identity, id, input, Utc::now()).await?,
    ))
}

pub async fn delete_activity_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i32>,
) -> FarmHubResult<StatusCode> {
    delete_activity(&state.pool, &identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::TimeZone;

    #[test]
    fn untagged_form_reports_its_own_missing_fields_too() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 8, 0, 0).unwrap();
        let req = VaccinationRequest {
            vaccine_name: Some("FMD".into()),
            dosage: Some("2ml".into()),
            cost: Some(Decimal::from(-5)),
            ..VaccinationRequest::default()
        };
        let errors = require_cow_tag(req.cow_tag.as_deref(), &req, now, &normalize_vaccination)
            .unwrap_err();
        assert!(errors.has("cow_tag", ErrorCode::FieldRequired));
        assert!(errors.has("veterinarian", ErrorCode::FieldRequired));
        assert!(errors.has("cost", ErrorCode::FieldOutOfRange));
        assert!(!errors.has("vaccine_name", ErrorCode::FieldRequired));
    }

    #[test]
    fn tagged_form_defers_to_the_cow_lookup() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 8, 0, 0).unwrap();
        // Form errors wait until the cow is known.
        let req = CalvingRequest::default();
        let tag = require_cow_tag(Some(" COW001 "), &req, now, &normalize_calving).unwrap();
        assert_eq!(tag, "COW001");
    }
}
