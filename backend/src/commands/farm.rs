use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::listing::{fetch_page, push_eq, push_search, ListParams, Page};
use super::user::user_role;
use super::{body, not_found, query};
use crate::access::{enforce, ownership, visible_rows, EntityKind, Identity, Operation};
use crate::db::{DbPool, Farm};
use crate::error::{ErrorCode, FarmHubError, FarmHubResult, ValidationErrors};
use crate::state::AppState;
use crate::validation::farm::{validate_farm, FarmInput, NewFarm};

const FARM_SELECT: &str = "SELECT f.*, au.username AS agent_username, \
     (SELECT COUNT(*) FROM cows fc WHERE fc.farm_id = f.id) AS cow_count";
const FARM_FROM: &str = "FROM farms f JOIN users au ON au.id = f.agent_id";
const FARM_SEARCH: &[&str] = &[
    "f.name",
    "f.location",
    "au.username",
    "au.first_name",
    "au.last_name",
];
const FARM_ORDERING: &[(&str, &str)] = &[
    ("name", "f.name"),
    ("size_acres", "f.size_acres"),
    ("created_at", "f.created_at"),
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FarmFilter {
    pub is_active: Option<bool>,
    pub agent: Option<i32>,
}

pub async fn fetch_farm(pool: &DbPool, id: i32) -> FarmHubResult<Option<Farm>> {
    let sql = format!("{} {} WHERE f.id = $1", FARM_SELECT, FARM_FROM);
    let farm = sqlx::query_as::<_, Farm>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(farm)
}

/// Managing agent of a farm, `None` when the id is absent or unknown.
pub async fn farm_agent(pool: &DbPool, id: Option<i32>) -> FarmHubResult<Option<i32>> {
    let Some(id) = id else {
        return Ok(None);
    };
    let agent: Option<i32> = sqlx::query_scalar("SELECT agent_id FROM farms WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(agent)
}

pub async fn list_farms(
    pool: &DbPool,
    identity: &Identity,
    params: &ListParams,
    filter: FarmFilter,
) -> FarmHubResult<Page<Farm>> {
    enforce(identity, EntityKind::Farm, Operation::List, None)?;
    let scope = visible_rows(identity, EntityKind::Farm);
    let search = params.search_term();
    let order = params.order_by(FARM_ORDERING, "f.created_at DESC", "f.id");

    fetch_page(
        pool,
        FARM_SELECT,
        FARM_FROM,
        |qb| {
            qb.push(" WHERE ");
            scope.push_sql(EntityKind::Farm, qb);
            push_eq(qb, "f.is_active", filter.is_active);
            push_eq(qb, "f.agent_id", filter.agent);
            push_search(qb, search.as_deref(), FARM_SEARCH);
        },
        &order,
        params.pagination(),
    )
    .await
}

pub async fn get_farm(pool: &DbPool, identity: &Identity, id: i32) -> FarmHubResult<Farm> {
    enforce(identity, EntityKind::Farm, Operation::Retrieve, None)?;
    let farm = fetch_farm(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::Farm))?;
    enforce(identity, EntityKind::Farm, Operation::Retrieve, Some(&farm.ownership()))?;
    Ok(farm)
}

pub async fn create_farm(pool: &DbPool, identity: &Identity, mut input: FarmInput) -> FarmHubResult<Farm> {
    enforce(identity, EntityKind::Farm, Operation::Create, None)?;
    if identity.is_agent() {
        input.agent_id = Some(identity.user_id);
    }
    let agent_role = user_role(pool, input.agent_id).await?;
    let farm = validate_farm(&input, agent_role)?;

    let id = insert_farm(pool, &farm).await?;
    tracing::info!("user {} created farm {} '{}'", identity.user_id, id, farm.name);
    fetch_farm(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::Farm))
}

async fn insert_farm(pool: &DbPool, farm: &NewFarm) -> FarmHubResult<i32> {
    let id: i32 = sqlx::query_scalar(
        "INSERT INTO farms (name, agent_id, location, size_acres, description, is_active)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id",
    )
    .bind(&farm.name)
    .bind(farm.agent_id)
    .bind(&farm.location)
    .bind(farm.size_acres)
    .bind(&farm.description)
    .bind(farm.is_active)
    .fetch_one(pool)
    .await
    .map_err(FarmHubError::from_storage)?;
    Ok(id)
}

pub async fn update_farm(
    pool: &DbPool,
    identity: &Identity,
    id: i32,
    input: FarmInput,
) -> FarmHubResult<Farm> {
    enforce(identity, EntityKind::Farm, Operation::Update, None)?;
    let current = fetch_farm(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::Farm))?;
    enforce(identity, EntityKind::Farm, Operation::Update, Some(&current.ownership()))?;

    let input = input.over(&current);
    if identity.is_agent() && input.agent_id != Some(identity.user_id) {
        return Err(ValidationErrors::single(
            "agent_id",
            ErrorCode::Mismatch,
            "agents cannot hand a farm over to another agent",
        )
        .into());
    }
    let agent_role = user_role(pool, input.agent_id).await?;
    let farm = validate_farm(&input, agent_role)?;

    sqlx::query(
        "UPDATE farms SET name = $1, agent_id = $2, location = $3, size_acres = $4,
             description = $5, is_active = $6, updated_at = NOW()
         WHERE id = $7",
    )
    .bind(&farm.name)
    .bind(farm.agent_id)
    .bind(&farm.location)
    .bind(farm.size_acres)
    .bind(&farm.description)
    .bind(farm.is_active)
    .bind(id)
    .execute(pool)
    .await
    .map_err(FarmHubError::from_storage)?;

    tracing::info!("user {} updated farm {}", identity.user_id, id);
    fetch_farm(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::Farm))
}

/// Cows, their milk records and activities go with the farm.
pub async fn delete_farm(pool: &DbPool, identity: &Identity, id: i32) -> FarmHubResult<()> {
    enforce(identity, EntityKind::Farm, Operation::Delete, None)?;
    let owner = ownership::load(pool, EntityKind::Farm, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::Farm))?;
    enforce(identity, EntityKind::Farm, Operation::Delete, Some(&owner))?;

    sqlx::query("DELETE FROM farms WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    tracing::info!("user {} deleted farm {}", identity.user_id, id);
    Ok(())
}

pub async fn list_farms_axum(
    State(state): State<AppState>,
    identity: Identity,
    params: Result<Query<ListParams>, QueryRejection>,
    filter: Result<Query<FarmFilter>, QueryRejection>,
) -> FarmHubResult<Json<Page<Farm>>> {
    let params = query(params)?;
    let filter = query(filter)?;
    Ok(Json(list_farms(&state.pool, &identity, &params, filter).await?))
}

pub async fn get_farm_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i32>,
) -> FarmHubResult<Json<Farm>> {
    Ok(Json(get_farm(&state.pool, &identity, id).await?))
}

pub async fn create_farm_axum(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<FarmInput>, JsonRejection>,
) -> FarmHubResult<(StatusCode, Json<Farm>)> {
    let input = body(payload)?;
    let farm = create_farm(&state.pool, &identity, input).await?;
    Ok((StatusCode::CREATED, Json(farm)))
}

pub async fn update_farm_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i32>,
    payload: Result<Json<FarmInput>, JsonRejection>,
) -> FarmHubResult<Json<Farm>> {
    let input = body(payload)?;
    Ok(Json(update_farm(&state.pool, &identity, id, input).await?))
}

pub async fn delete_farm_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i32>,
) -> FarmHubResult<StatusCode> {
    delete_farm(&state.pool, &identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
