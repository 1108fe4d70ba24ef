use std::collections::BTreeMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgExecutor;
use sqlx::{FromRow, Postgres, QueryBuilder};

use super::cow::{ensure_farmer_owns, find_cow_by_tag, find_cow_in_scope};
use super::listing::{fetch_page, push_eq, push_search, ListParams, Page};
use super::{body, not_found, query};
use crate::access::{enforce, ownership, visible_rows, EntityKind, Identity, Operation, Scope};
use crate::db::{Breed, DbPool, MilkRecord, Quality};
use crate::error::{ErrorCode, FarmHubError, FarmHubResult, ValidationErrors};
use crate::state::AppState;
use crate::validation::milk::{
    check_batch_size, check_daily_request, check_header, entry_tag, validate_daily,
    validate_record_input, BulkProductionRequest, DailyContext, DailyProductionRequest,
    MilkRecordInput, NewMilkRecord,
};

const MILK_SELECT: &str = "SELECT m.*, c.tag_number AS cow_tag, f.name AS farm_name, \
     f.agent_id AS farm_agent_id";
const MILK_FROM: &str = "FROM milk_records m JOIN cows c ON c.id = m.cow_id \
     JOIN farms f ON f.id = m.farm_id JOIN users fu ON fu.id = m.farmer_id";
const MILK_SEARCH: &[&str] = &[
    "c.tag_number",
    "c.name",
    "fu.username",
    "fu.first_name",
    "fu.last_name",
    "f.name",
];
const MILK_ORDERING: &[(&str, &str)] = &[
    ("date", "m.date"),
    ("total_quantity_liters", "m.total_quantity_liters"),
    ("created_at", "m.created_at"),
];
const DEFAULT_HISTORY_DAYS: i64 = 30;
const MAX_HISTORY_DAYS: i64 = 365;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MilkFilter {
    pub date: Option<NaiveDate>,
    pub quality_rating: Option<Quality>,
    pub breed: Option<Breed>,
    pub farm: Option<i32>,
    pub cow: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct RecordedProduction {
    pub message: String,
    pub id: i32,
    pub cow_tag: String,
    pub farm_name: String,
    pub date: NaiveDate,
    pub total_quantity_liters: Decimal,
    pub record: MilkRecord,
}

#[derive(Debug, Serialize)]
pub struct BulkEntryResult {
    pub index: usize,
    pub id: i32,
    pub cow_tag: String,
    pub total_quantity_liters: Decimal,
}

#[derive(Debug, Serialize)]
pub struct BulkRecorded {
    pub message: String,
    pub farm_name: String,
    pub date: NaiveDate,
    pub count: usize,
    pub records: Vec<BulkEntryResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SummaryParams {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub farm_id: Option<i32>,
}

#[derive(Debug, FromRow)]
struct ProductionTotals {
    record_count: i64,
    total_liters: Decimal,
    morning_liters: Decimal,
    evening_liters: Decimal,
    average_liters: Option<Decimal>,
    average_fat: Option<Decimal>,
    average_protein: Option<Decimal>,
    cow_count: i64,
    farm_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ProductionSummary {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub farm_id: Option<i32>,
    pub record_count: i64,
    pub total_liters: Decimal,
    pub morning_liters: Decimal,
    pub evening_liters: Decimal,
    pub average_liters_per_record: Option<Decimal>,
    pub average_fat_percentage: Option<Decimal>,
    pub average_protein_percentage: Option<Decimal>,
    pub cow_count: i64,
    pub farm_count: i64,
    pub quality_breakdown: BTreeMap<String, i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HistoryParams {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CowProduction {
    pub cow_id: i32,
    pub cow_tag: String,
    pub cow_name: Option<String>,
    pub days: i64,
    pub since: NaiveDate,
    pub record_count: usize,
    pub total_liters: Decimal,
    pub average_daily_liters: Option<Decimal>,
    pub records: Vec<MilkRecord>,
}

pub async fn fetch_milk_record(pool: &DbPool, id: i32) -> FarmHubResult<Option<MilkRecord>> {
    let sql = format!("{} {} WHERE m.id = $1", MILK_SELECT, MILK_FROM);
    let record = sqlx::query_as::<_, MilkRecord>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(record)
}

async fn milk_exists<'e, E: PgExecutor<'e>>(
    exec: E,
    cow_id: i32,
    date: NaiveDate,
    except_id: Option<i32>,
) -> FarmHubResult<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM milk_records WHERE cow_id = $1 AND date = $2 AND ($3::INT IS NULL OR id <> $3))",
    )
    .bind(cow_id)
    .bind(date)
    .bind(except_id)
    .fetch_one(exec)
    .await?;
    Ok(exists)
}

/// The unique `(cow_id, date)` constraint is the final word on duplicates.
pub(crate) async fn insert_milk<'e, E: PgExecutor<'e>>(
    exec: E,
    record: &NewMilkRecord,
) -> FarmHubResult<i32> {
    let id: i32 = sqlx::query_scalar(
        "INSERT INTO milk_records (cow_id, farmer_id, farm_id, date, morning_quantity_liters,
             evening_quantity_liters, total_quantity_liters, fat_percentage, protein_percentage,
             quality_rating, notes)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         RETURNING id",
    )
    .bind(record.cow_id)
    .bind(record.farmer_id)
    .bind(record.farm_id)
    .bind(record.date)
    .bind(record.morning_quantity_liters)
    .bind(record.evening_quantity_liters)
    .bind(record.total_quantity_liters)
    .bind(record.fat_percentage)
    .bind(record.protein_percentage)
    .bind(record.quality_rating)
    .bind(&record.notes)
    .fetch_one(exec)
    .await
    .map_err(FarmHubError::from_storage)?;
    Ok(id)
}

pub async fn record_daily(
    pool: &DbPool,
    identity: &Identity,
    req: DailyProductionRequest,
    now: DateTime<Utc>,
) -> FarmHubResult<RecordedProduction> {
    enforce(identity, EntityKind::MilkRecord, Operation::Create, None)?;

    let (farm_name, date, tag) =
        check_daily_request(req.farm_name.as_deref(), req.date, &req.entry)?;

    let cow = find_cow_by_tag(pool, identity, &tag).await?;
    let duplicate = milk_exists(pool, cow.id, date, None).await?;
    let record = validate_daily(
        &cow,
        &req.entry,
        DailyContext {
            farm_name: Some(&farm_name),
            date,
            today: now.date_naive(),
            duplicate,
        },
    )?;
    ensure_farmer_owns(identity, &cow)?;

    let id = insert_milk(pool, &record).await?;
    tracing::info!(
        "user {} recorded {} L for cow {} on {}",
        identity.user_id,
        record.total_quantity_liters,
        cow.tag_number,
        date
    );
    let stored = fetch_milk_record(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::MilkRecord))?;

    Ok(RecordedProduction {
        message: format!("Milk production recorded for cow {}", cow.tag_number),
        id,
        cow_tag: cow.tag_number,
        farm_name: cow.farm_name,
        date,
        total_quantity_liters: stored.total_quantity_liters,
        record: stored,
    })
}

/// All-or-nothing: the first failing entry aborts the transaction and is
/// reported by index.
pub async fn bulk_record(
    pool: &DbPool,
    identity: &Identity,
    req: BulkProductionRequest,
    now: DateTime<Utc>,
) -> FarmHubResult<BulkRecorded> {
    enforce(identity, EntityKind::MilkRecord, Operation::Create, None)?;
    let (farm_name, date) = check_header(req.farm_name.as_deref(), req.date)?;
    check_batch_size(&req.records)?;

    let mut tx = pool.begin().await?;
    let mut results = Vec::with_capacity(req.records.len());

    for (index, entry) in req.records.iter().enumerate() {
        let tag = entry_tag(entry).map_err(|e| e.at_index(index))?;
        let cow = match find_cow_by_tag(&mut *tx, identity, &tag).await {
            Ok(cow) => cow,
            Err(FarmHubError::NotFound(msg)) => {
                return Err(ValidationErrors::single("cow_tag", ErrorCode::NotFound, msg)
                    .at_index(index)
                    .into());
            }
            Err(other) => return Err(other),
        };
        let duplicate = milk_exists(&mut *tx, cow.id, date, None).await?;
        let record = validate_daily(
            &cow,
            entry,
            DailyContext {
                farm_name: Some(&farm_name),
                date,
                today: now.date_naive(),
                duplicate,
            },
        )
        .map_err(|e| e.at_index(index))?;
        ensure_farmer_owns(identity, &cow)?;

        let id = insert_milk(&mut *tx, &record)
            .await
            .map_err(|e| e.at_index(index))?;
        results.push(BulkEntryResult {
            index,
            id,
            cow_tag: cow.tag_number,
            total_quantity_liters: record.total_quantity_liters,
        });
    }

    tx.commit().await?;
    tracing::info!(
        "user {} bulk-recorded {} milk records for {} on {}",
        identity.user_id,
        results.len(),
        farm_name,
        date
    );

    Ok(BulkRecorded {
        message: format!("Recorded {} milk records", results.len()),
        farm_name,
        date,
        count: results.len(),
        records: results,
    })
}

fn push_summary_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    scope: Scope,
    params: &SummaryParams,
) {
    qb.push(" WHERE ");
    scope.push_sql(EntityKind::MilkRecord, qb);
    if let Some(from) = params.from_date {
        qb.push(" AND m.date >= ").push_bind(from);
    }
    if let Some(to) = params.to_date {
        qb.push(" AND m.date <= ").push_bind(to);
    }
    push_eq(qb, "m.farm_id", params.farm_id);
}

pub async fn production_summary(
    pool: &DbPool,
    identity: &Identity,
    params: SummaryParams,
) -> FarmHubResult<ProductionSummary> {
    enforce(identity, EntityKind::MilkRecord, Operation::List, None)?;
    if let (Some(from), Some(to)) = (params.from_date, params.to_date) {
        if from > to {
            return Err(ValidationErrors::single(
                "to_date",
                ErrorCode::InvalidOrdering,
                "to_date must not be before from_date",
            )
            .into());
        }
    }
    let scope = visible_rows(identity, EntityKind::MilkRecord);

    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
        "SELECT COUNT(*) AS record_count,
             COALESCE(SUM(m.total_quantity_liters), 0) AS total_liters,
             COALESCE(SUM(m.morning_quantity_liters), 0) AS morning_liters,
             COALESCE(SUM(m.evening_quantity_liters), 0) AS evening_liters,
             AVG(m.total_quantity_liters) AS average_liters,
             AVG(m.fat_percentage) AS average_fat,
             AVG(m.protein_percentage) AS average_protein,
             COUNT(DISTINCT m.cow_id) AS cow_count,
             COUNT(DISTINCT m.farm_id) AS farm_count ",
    );
    qb.push(MILK_FROM);
    push_summary_filter(&mut qb, scope, &params);
    let totals = qb.build_query_as::<ProductionTotals>().fetch_one(pool).await?;

    let mut qb: QueryBuilder<'_, Postgres> =
        QueryBuilder::new("SELECT m.quality_rating, COUNT(*) ");
    qb.push(MILK_FROM);
    push_summary_filter(&mut qb, scope, &params);
    qb.push(" GROUP BY m.quality_rating");
    let rows: Vec<(Option<Quality>, i64)> = qb.build_query_as().fetch_all(pool).await?;

    let mut quality_breakdown: BTreeMap<String, i64> = Quality::ALL
        .iter()
        .map(|q| (q.as_str().to_string(), 0))
        .collect();
    for (quality, count) in rows {
        let key = quality.map(|q| q.as_str()).unwrap_or("UNRATED");
        *quality_breakdown.entry(key.to_string()).or_insert(0) += count;
    }

    Ok(ProductionSummary {
        from_date: params.from_date,
        to_date: params.to_date,
        farm_id: params.farm_id,
        record_count: totals.record_count,
        total_liters: totals.total_liters,
        morning_liters: totals.morning_liters,
        evening_liters: totals.evening_liters,
        average_liters_per_record: totals.average_liters.map(|d| d.round_dp(2)),
        average_fat_percentage: totals.average_fat.map(|d| d.round_dp(2)),
        average_protein_percentage: totals.average_protein.map(|d| d.round_dp(2)),
        cow_count: totals.cow_count,
        farm_count: totals.farm_count,
        quality_breakdown,
    })
}

pub async fn cow_production(
    pool: &DbPool,
    identity: &Identity,
    tag: &str,
    days: Option<i64>,
    today: NaiveDate,
) -> FarmHubResult<CowProduction> {
    enforce(identity, EntityKind::MilkRecord, Operation::List, None)?;
    let cow = find_cow_by_tag(pool, identity, tag).await?;
    let days = days.unwrap_or(DEFAULT_HISTORY_DAYS).clamp(1, MAX_HISTORY_DAYS);
    let since = today - Duration::days(days);
    let scope = visible_rows(identity, EntityKind::MilkRecord);

    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(MILK_SELECT);
    qb.push(" ").push(MILK_FROM).push(" WHERE ");
    scope.push_sql(EntityKind::MilkRecord, &mut qb);
    qb.push(" AND m.cow_id = ").push_bind(cow.id);
    qb.push(" AND m.date >= ").push_bind(since);
    qb.push(" ORDER BY m.date DESC");
    let records = qb.build_query_as::<MilkRecord>().fetch_all(pool).await?;

    let total_liters: Decimal = records.iter().map(|r| r.total_quantity_liters).sum();
    let average_daily_liters = if records.is_empty() {
        None
    } else {
        Some((total_liters / Decimal::from(records.len() as i64)).round_dp(2))
    };

    Ok(CowProduction {
        cow_id: cow.id,
        cow_tag: cow.tag_number,
        cow_name: cow.name,
        days,
        since,
        record_count: records.len(),
        total_liters,
        average_daily_liters,
        records,
    })
}

pub async fn list_milk_records(
    pool: &DbPool,
    identity: &Identity,
    params: &ListParams,
    filter: MilkFilter,
) -> FarmHubResult<Page<MilkRecord>> {
    enforce(identity, EntityKind::MilkRecord, Operation::List, None)?;
    let scope = visible_rows(identity, EntityKind::MilkRecord);
    let search = params.search_term();
    let order = params.order_by(MILK_ORDERING, "m.date DESC, m.created_at DESC", "m.id");

    fetch_page(
        pool,
        MILK_SELECT,
        MILK_FROM,
        |qb| {
            qb.push(" WHERE ");
            scope.push_sql(EntityKind::MilkRecord, qb);
            push_eq(qb, "m.date", filter.date);
            push_eq(qb, "m.quality_rating", filter.quality_rating);
            push_eq(qb, "c.breed", filter.breed);
            push_eq(qb, "m.farm_id", filter.farm);
            push_eq(qb, "m.cow_id", filter.cow);
            push_search(qb, search.as_deref(), MILK_SEARCH);
        },
        &order,
        params.pagination(),
    )
    .await
}

pub async fn get_milk_record(pool: &DbPool, identity: &Identity, id: i32) -> FarmHubResult<MilkRecord> {
    enforce(identity, EntityKind::MilkRecord, Operation::Retrieve, None)?;
    let record = fetch_milk_record(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::MilkRecord))?;
    enforce(identity, EntityKind::MilkRecord, Operation::Retrieve, Some(&record.ownership()))?;
    Ok(record)
}

pub async fn create_milk_record(
    pool: &DbPool,
    identity: &Identity,
    input: MilkRecordInput,
    today: NaiveDate,
) -> FarmHubResult<MilkRecord> {
    enforce(identity, EntityKind::MilkRecord, Operation::Create, None)?;
    let Some(cow_id) = input.cow_id else {
        let mut errors = ValidationErrors::new();
        errors.required("cow_id");
        return Err(errors.into());
    };
    let cow = find_cow_in_scope(pool, identity, cow_id).await?;
    let duplicate = match input.date {
        Some(date) => milk_exists(pool, cow.id, date, None).await?,
        None => false,
    };
    let record = validate_record_input(&cow, &input, today, duplicate)?;
    ensure_farmer_owns(identity, &cow)?;

    let id = insert_milk(pool, &record).await?;
    tracing::info!("user {} created milk record {}", identity.user_id, id);
    fetch_milk_record(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::MilkRecord))
}

pub async fn update_milk_record(
    pool: &DbPool,
    identity: &Identity,
    id: i32,
    input: MilkRecordInput,
    today: NaiveDate,
) -> FarmHubResult<MilkRecord> {
    enforce(identity, EntityKind::MilkRecord, Operation::Update, None)?;
    let current = fetch_milk_record(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::MilkRecord))?;
    enforce(identity, EntityKind::MilkRecord, Operation::Update, Some(&current.ownership()))?;

    let input = input.over(&current);
    let cow = find_cow_in_scope(pool, identity, input.cow_id.unwrap_or(current.cow_id)).await?;
    let date = input.date.unwrap_or(current.date);
    let duplicate = milk_exists(pool, cow.id, date, Some(id)).await?;
    let record = validate_record_input(&cow, &input, today, duplicate)?;
    ensure_farmer_owns(identity, &cow)?;

    sqlx::query(
        "UPDATE milk_records SET cow_id = $1, farmer_id = $2, farm_id = $3, date = $4,
             morning_quantity_liters = $5, evening_quantity_liters = $6, total_quantity_liters = $7,
             fat_percentage = $8, protein_percentage = $9, quality_rating = $10, notes = $11,
             updated_at = NOW()
         WHERE id = $12",
    )
    .bind(record.cow_id)
    .bind(record.farmer_id)
    .bind(record.farm_id)
    .bind(record.date)
    .bind(record.morning_quantity_liters)
    .bind(record.evening_quantity_liters)
    .bind(record.total_quantity_liters)
    .bind(record.fat_percentage)
    .bind(record.protein_percentage)
    .bind(record.quality_rating)
    .bind(&record.notes)
    .bind(id)
    .execute(pool)
    .await
    .map_err(FarmHubError::from_storage)?;

    tracing::info!("user {} updated milk record {}", identity.user_id, id);
    fetch_milk_record(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::MilkRecord))
}

pub async fn delete_milk_record(pool: &DbPool, identity: &Identity, id: i32) -> FarmHubResult<()> {
    enforce(identity, EntityKind::MilkRecord, Operation::Delete, None)?;
    let owner = ownership::load(pool, EntityKind::MilkRecord, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::MilkRecord))?;
    enforce(identity, EntityKind::MilkRecord, Operation::Delete, Some(&owner))?;

    sqlx::query("DELETE FROM milk_records WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    tracing::info!("user {} deleted milk record {}", identity.user_id, id);
    Ok(())
}

pub async fn record_daily_axum(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<DailyProductionRequest>, JsonRejection>,
) -> FarmHubResult<(StatusCode, Json<RecordedProduction>)> {
    let req = body(payload)?;
    let recorded = record_daily(&state.pool, &identity, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

pub async fn bulk_record_axum(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<BulkProductionRequest>, JsonRejection>,
) -> FarmHubResult<(StatusCode, Json<BulkRecorded>)> {
    let req = body(payload)?;
    let recorded = bulk_record(&state.pool, &identity, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

pub async fn production_summary_axum(
    State(state): State<AppState>,
    identity: Identity,
    params: Result<Query<SummaryParams>, QueryRejection>,
) -> FarmHubResult<Json<ProductionSummary>> {
    let params = query(params)?;
    Ok(Json(production_summary(&state.pool, &identity, params).await?))
}

pub async fn cow_production_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(tag): Path<String>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> FarmHubResult<Json<CowProduction>> {
    let params = query(params)?;
    let today = Utc::now().date_naive();
    Ok(Json(
        cow_production(&state.pool, &identity, &tag, params.days, today).await?,
    ))
}

pub async fn list_milk_records_axum(
    State(state): State<AppState>,
    identity: Identity,
    params: Result<Query<ListParams>, QueryRejection>,
    filter: Result<Query<MilkFilter>, QueryRejection>,
) -> FarmHubResult<Json<Page<MilkRecord>>> {
    let params = query(params)?;
    let filter = query(filter)?;
    Ok(Json(list_milk_records(&state.pool, &identity, &params, filter).await?))
}

pub async fn get_milk_record_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i32>,
) -> FarmHubResult<Json<MilkRecord>> {
    Ok(Json(get_milk_record(&state.pool, &identity, id).await?))
}

pub async fn create_milk_record_axum(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<MilkRecordInput>, JsonRejection>,
) -> FarmHubResult<(StatusCode, Json<MilkRecord>)> {
    let input = body(payload)?;
    let today = Utc::now().date_naive();
    let record = create_milk_record(&state.pool, &identity, input, today).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update_milk_record_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i32>,
    payload: Result<Json<MilkRecordInput>, JsonRejection>,
) -> FarmHubResult<Json<MilkRecord>> {
    let input = body(payload)?;
    let today = Utc::now().date_naive();
    Ok(Json(
        update_milk_record(&state.pool, &identity, id, input, today).await?,
    ))
}

pub async fn delete_milk_record_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i32>,
) -> FarmHubResult<StatusCode> {
    delete_milk_record(&state.pool, &identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
