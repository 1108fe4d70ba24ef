use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use sqlx::postgres::PgExecutor;
use sqlx::{Postgres, QueryBuilder};

use super::farm::farm_agent;
use super::listing::{fetch_page, push_eq, push_search, ListParams, Page};
use super::user::user_role;
use super::{body, not_found, query};
use crate::access::{enforce, ownership, visible_rows, EntityKind, Identity, Operation};
use crate::db::{Breed, Cow, CowStatus, CowView, DbPool};
use crate::error::{ErrorCode, FarmHubError, FarmHubResult, ValidationErrors};
use crate::state::AppState;
use crate::validation::cow::{validate_cow, CowInput, CowRefs, NewCow};

pub(crate) const COW_SELECT: &str = "SELECT c.*, f.name AS farm_name, f.agent_id AS farm_agent_id, \
     fu.username AS farmer_username";
pub(crate) const COW_FROM: &str =
    "FROM cows c JOIN farms f ON f.id = c.farm_id JOIN users fu ON fu.id = c.farmer_id";
const COW_SEARCH: &[&str] = &[
    "c.tag_number",
    "c.name",
    "fu.username",
    "fu.first_name",
    "fu.last_name",
    "f.name",
];
const COW_ORDERING: &[(&str, &str)] = &[
    ("tag_number", "c.tag_number"),
    ("name", "c.name"),
    ("date_of_birth", "c.date_of_birth"),
    ("created_at", "c.created_at"),
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CowFilter {
    pub breed: Option<Breed>,
    pub status: Option<CowStatus>,
    pub is_pregnant: Option<bool>,
    pub farm: Option<i32>,
    pub farmer: Option<i32>,
}

pub async fn fetch_cow(pool: &DbPool, id: i32) -> FarmHubResult<Option<Cow>> {
    let sql = format!("{} {} WHERE c.id = $1", COW_SELECT, COW_FROM);
    let cow = sqlx::query_as::<_, Cow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(cow)
}

/// Resolves a cow by tag inside the caller's scope. A cow that exists but is
/// out of scope is reported exactly like one that does not exist.
pub async fn find_cow_by_tag<'e, E: PgExecutor<'e>>(
    exec: E,
    identity: &Identity,
    tag: &str,
) -> FarmHubResult<Cow> {
    let scope = visible_rows(identity, EntityKind::Cow);
    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(COW_SELECT);
    qb.push(" ").push(COW_FROM).push(" WHERE ");
    scope.push_sql(EntityKind::Cow, &mut qb);
    qb.push(" AND c.tag_number = ").push_bind(tag.trim().to_string());

    qb.build_query_as::<Cow>()
        .fetch_optional(exec)
        .await?
        .ok_or_else(|| FarmHubError::NotFound(format!("cow with tag {} not found", tag.trim())))
}

/// Resolves a cow referenced by id from a write body, inside the caller's scope.
pub async fn find_cow_in_scope(pool: &DbPool, identity: &Identity, id: i32) -> FarmHubResult<Cow> {
    let cow = fetch_cow(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::Cow))?;
    if !visible_rows(identity, EntityKind::Cow).admits(&cow.ownership()) {
        return Err(not_found(EntityKind::Cow));
    }
    Ok(cow)
}

/// Last check before a farmer's write touches a cow.
pub fn ensure_farmer_owns(identity: &Identity, cow: &Cow) -> FarmHubResult<()> {
    if identity.is_farmer() && cow.farmer_id != identity.user_id {
        tracing::warn!(
            "farmer {} tried to write against cow {} owned by {}",
            identity.user_id,
            cow.id,
            cow.farmer_id
        );
        return Err(FarmHubError::PermissionDenied(
            "You can only record data for your own cows".into(),
        ));
    }
    Ok(())
}

async fn cow_refs(pool: &DbPool, identity: &Identity, input: &CowInput) -> FarmHubResult<CowRefs> {
    Ok(CowRefs {
        farmer_role: user_role(pool, input.farmer_id).await?,
        farm_agent_id: farm_agent(pool, input.farm_id).await?,
        acting_agent: identity.is_agent().then_some(identity.user_id),
    })
}

pub async fn list_cows(
    pool: &DbPool,
    identity: &Identity,
    params: &ListParams,
    filter: CowFilter,
) -> FarmHubResult<Page<CowView>> {
    enforce(identity, EntityKind::Cow, Operation::List, None)?;
    let scope = visible_rows(identity, EntityKind::Cow);
    let search = params.search_term();
    let order = params.order_by(COW_ORDERING, "c.tag_number ASC", "c.id");

    let page: Page<Cow> = fetch_page(
        pool,
        COW_SELECT,
        COW_FROM,
        |qb| {
            qb.push(" WHERE ");
            scope.push_sql(EntityKind::Cow, qb);
            push_eq(qb, "c.breed", filter.breed);
            push_eq(qb, "c.status", filter.status);
            push_eq(qb, "c.is_pregnant", filter.is_pregnant);
            push_eq(qb, "c.farm_id", filter.farm);
            push_eq(qb, "c.farmer_id", filter.farmer);
            push_search(qb, search.as_deref(), COW_SEARCH);
        },
        &order,
        params.pagination(),
    )
    .await?;

    let today = Utc::now().date_naive();
    Ok(page.map(|cow| cow.view(today)))
}

pub async fn get_cow(pool: &DbPool, identity: &Identity, id: i32) -> FarmHubResult<CowView> {
    enforce(identity, EntityKind::Cow, Operation::Retrieve, None)?;
    let cow = fetch_cow(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::Cow))?;
    enforce(identity, EntityKind::Cow, Operation::Retrieve, Some(&cow.ownership()))?;
    Ok(cow.view(Utc::now().date_naive()))
}

pub async fn create_cow(pool: &DbPool, identity: &Identity, mut input: CowInput) -> FarmHubResult<CowView> {
    enforce(identity, EntityKind::Cow, Operation::Create, None)?;
    if identity.is_farmer() {
        input.farmer_id = Some(identity.user_id);
    }
    let refs = cow_refs(pool, identity, &input).await?;
    let today = Utc::now().date_naive();
    let cow = validate_cow(&input, refs, today)?;

    let id = insert_cow(pool, &cow).await?;
    tracing::info!("user {} registered cow {} ({})", identity.user_id, id, cow.tag_number);
    let stored = fetch_cow(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::Cow))?;
    Ok(stored.view(today))
}

async fn insert_cow(pool: &DbPool, cow: &NewCow) -> FarmHubResult<i32> {
    let id: i32 = sqlx::query_scalar(
        "INSERT INTO cows (tag_number, name, breed, farmer_id, farm_id, date_of_birth, weight_kg,
             height_cm, status, is_pregnant, last_breeding_date)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         RETURNING id",
    )
    .bind(&cow.tag_number)
    .bind(&cow.name)
    .bind(cow.breed)
    .bind(cow.farmer_id)
    .bind(cow.farm_id)
    .bind(cow.date_of_birth)
    .bind(cow.weight_kg)
    .bind(cow.height_cm)
    .bind(cow.status)
    .bind(cow.is_pregnant)
    .bind(cow.last_breeding_date)
    .fetch_one(pool)
    .await
    .map_err(FarmHubError::from_storage)?;
    Ok(id)
}

pub async fn update_cow(
    pool: &DbPool,
    identity: &Identity,
    id: i32,
    input: CowInput,
) -> FarmHubResult<CowView> {
    enforce(identity, EntityKind::Cow, Operation::Update, None)?;
    let current = fetch_cow(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::Cow))?;
    enforce(identity, EntityKind::Cow, Operation::Update, Some(&current.ownership()))?;

    let input = input.over(&current);
    if identity.is_farmer() && input.farmer_id != Some(identity.user_id) {
        return Err(ValidationErrors::single(
            "farmer_id",
            ErrorCode::Mismatch,
            "farmers cannot transfer a cow to another farmer",
        )
        .into());
    }
    let refs = cow_refs(pool, identity, &input).await?;
    let today = Utc::now().date_naive();
    let cow = validate_cow(&input, refs, today)?;

    sqlx::query(
        "UPDATE cows SET tag_number = $1, name = $2, breed = $3, farmer_id = $4, farm_id = $5,
             date_of_birth = $6, weight_kg = $7, height_cm = $8, status = $9, is_pregnant = $10,
             last_breeding_date = $11, updated_at = NOW()
         WHERE id = $12",
    )
    .bind(&cow.tag_number)
    .bind(&cow.name)
    .bind(cow.breed)
    .bind(cow.farmer_id)
    .bind(cow.farm_id)
    .bind(cow.date_of_birth)
    .bind(cow.weight_kg)
    .bind(cow.height_cm)
    .bind(cow.status)
    .bind(cow.is_pregnant)
    .bind(cow.last_breeding_date)
    .bind(id)
    .execute(pool)
    .await
    .map_err(FarmHubError::from_storage)?;

    tracing::info!("user {} updated cow {}", identity.user_id, id);
    let stored = fetch_cow(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::Cow))?;
    Ok(stored.view(today))
}

pub async fn delete_cow(pool: &DbPool, identity: &Identity, id: i32) -> FarmHubResult<()> {
    enforce(identity, EntityKind::Cow, Operation::Delete, None)?;
    let owner = ownership::load(pool, EntityKind::Cow, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::Cow))?;
    enforce(identity, EntityKind::Cow, Operation::Delete, Some(&owner))?;

    sqlx::query("DELETE FROM cows WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    tracing::info!("user {} deleted cow {}", identity.user_id, id);
    Ok(())
}

pub async fn list_cows_axum(
    State(state): State<AppState>,
    identity: Identity,
    params: Result<Query<ListParams>, QueryRejection>,
    filter: Result<Query<CowFilter>, QueryRejection>,
) -> FarmHubResult<Json<Page<CowView>>> {
    let params = query(params)?;
    let filter = query(filter)?;
    Ok(Json(list_cows(&state.pool, &identity, &params, filter).await?))
}

pub async fn get_cow_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i32>,
) -> FarmHubResult<Json<CowView>> {
    Ok(Json(get_cow(&state.pool, &identity, id).await?))
}

pub async fn create_cow_axum(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<CowInput>, JsonRejection>,
) -> FarmHubResult<(StatusCode, Json<CowView>)> {
    let input = body(payload)?;
    let cow = create_cow(&state.pool, &identity, input).await?;
    Ok((StatusCode::CREATED, Json(cow)))
}

pub async fn update_cow_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i32>,
    payload: Result<Json<CowInput>, JsonRejection>,
) -> FarmHubResult<Json<CowView>> {
    let input = body(payload)?;
    Ok(Json(update_cow(&state.pool, &identity, id, input).await?))
}

pub async fn delete_cow_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i32>,
) -> FarmHubResult<StatusCode> {
    delete_cow(&state.pool, &identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
