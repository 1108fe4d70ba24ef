use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::listing::{fetch_page, push_eq, push_search, ListParams, Page};
use super::{body, not_found, query};
use crate::access::{enforce, ownership, visible_rows, EntityKind, Identity, Operation};
use crate::db::{DbPool, Role, User};
use crate::error::{FarmHubError, FarmHubResult};
use crate::state::AppState;
use crate::validation::user::{validate_new_user, validate_user_update, UserInput};

const USER_SELECT: &str = "SELECT u.*";
const USER_FROM: &str = "FROM users u";
const USER_SEARCH: &[&str] = &[
    "u.username",
    "u.email",
    "u.first_name",
    "u.last_name",
    "u.phone_number",
];
const USER_ORDERING: &[(&str, &str)] = &[
    ("username", "u.username"),
    ("first_name", "u.first_name"),
    ("last_name", "u.last_name"),
    ("created_at", "u.created_at"),
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

pub async fn fetch_user(pool: &DbPool, id: i32) -> FarmHubResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT u.* FROM users u WHERE u.id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Stored role of a user, `None` when the id is absent or unknown.
pub async fn user_role(pool: &DbPool, id: Option<i32>) -> FarmHubResult<Option<Role>> {
    let Some(id) = id else {
        return Ok(None);
    };
    let role: Option<Role> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(role)
}

pub async fn list_users(
    pool: &DbPool,
    identity: &Identity,
    params: &ListParams,
    filter: UserFilter,
) -> FarmHubResult<Page<User>> {
    enforce(identity, EntityKind::User, Operation::List, None)?;
    let scope = visible_rows(identity, EntityKind::User);
    let search = params.search_term();
    let order = params.order_by(USER_ORDERING, "u.created_at DESC", "u.id");

    fetch_page(
        pool,
        USER_SELECT,
        USER_FROM,
        |qb| {
            qb.push(" WHERE ");
            scope.push_sql(EntityKind::User, qb);
            push_eq(qb, "u.role", filter.role);
            push_eq(qb, "u.is_active", filter.is_active);
            push_search(qb, search.as_deref(), USER_SEARCH);
        },
        &order,
        params.pagination(),
    )
    .await
}

pub async fn get_user(pool: &DbPool, identity: &Identity, id: i32) -> FarmHubResult<User> {
    enforce(identity, EntityKind::User, Operation::Retrieve, None)?;
    let user = fetch_user(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::User))?;
    enforce(identity, EntityKind::User, Operation::Retrieve, Some(&user.ownership()))?;
    Ok(user)
}

pub async fn create_user(pool: &DbPool, identity: &Identity, input: UserInput) -> FarmHubResult<User> {
    enforce(identity, EntityKind::User, Operation::Create, None)?;
    let (fields, password) = validate_new_user(&input)?;
    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, email, first_name, last_name, password_hash, role, phone_number, address, date_of_birth, is_active)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING *",
    )
    .bind(&fields.username)
    .bind(&fields.email)
    .bind(&fields.first_name)
    .bind(&fields.last_name)
    .bind(hash)
    .bind(fields.role)
    .bind(&fields.phone_number)
    .bind(&fields.address)
    .bind(fields.date_of_birth)
    .bind(fields.is_active)
    .fetch_one(pool)
    .await
    .map_err(FarmHubError::from_storage)?;

    tracing::info!("user {} created user {} ({})", identity.user_id, user.id, user.role);
    Ok(user)
}

pub async fn update_user(
    pool: &DbPool,
    identity: &Identity,
    id: i32,
    input: UserInput,
) -> FarmHubResult<User> {
    enforce(identity, EntityKind::User, Operation::Update, None)?;
    let current = fetch_user(pool, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::User))?;
    enforce(identity, EntityKind::User, Operation::Update, Some(&current.ownership()))?;

    let (fields, password) = validate_user_update(&current, &input, identity.is_super_admin())?;
    let hash = match password {
        Some(raw) => Some(bcrypt::hash(raw, bcrypt::DEFAULT_COST)?),
        None => None,
    };

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET email = $1, first_name = $2, last_name = $3, role = $4, phone_number = $5,
             address = $6, date_of_birth = $7, is_active = $8,
             password_hash = COALESCE($9, password_hash), updated_at = NOW()
         WHERE id = $10
         RETURNING *",
    )
    .bind(&fields.email)
    .bind(&fields.first_name)
    .bind(&fields.last_name)
    .bind(fields.role)
    .bind(&fields.phone_number)
    .bind(&fields.address)
    .bind(fields.date_of_birth)
    .bind(fields.is_active)
    .bind(hash)
    .bind(id)
    .fetch_one(pool)
    .await
    .map_err(FarmHubError::from_storage)?;

    tracing::info!("user {} updated user {}", identity.user_id, id);
    Ok(user)
}

pub async fn delete_user(pool: &DbPool, identity: &Identity, id: i32) -> FarmHubResult<()> {
    enforce(identity, EntityKind::User, Operation::Delete, None)?;
    let owner = ownership::load(pool, EntityKind::User, id)
        .await?
        .ok_or_else(|| not_found(EntityKind::User))?;
    enforce(identity, EntityKind::User, Operation::Delete, Some(&owner))?;

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    tracing::info!("user {} deleted user {}", identity.user_id, id);
    Ok(())
}

pub async fn list_users_axum(
    State(state): State<AppState>,
    identity: Identity,
    params: Result<Query<ListParams>, QueryRejection>,
    filter: Result<Query<UserFilter>, QueryRejection>,
) -> FarmHubResult<Json<Page<User>>> {
    let params = query(params)?;
    let filter = query(filter)?;
    Ok(Json(list_users(&state.pool, &identity, &params, filter).await?))
}

pub async fn get_user_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i32>,
) -> FarmHubResult<Json<User>> {
    Ok(Json(get_user(&state.pool, &identity, id).await?))
}

pub async fn create_user_axum(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<UserInput>, JsonRejection>,
) -> FarmHubResult<(StatusCode, Json<User>)> {
    let input = body(payload)?;
    let user = create_user(&state.pool, &identity, input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i32>,
    payload: Result<Json<UserInput>, JsonRejection>,
) -> FarmHubResult<Json<User>> {
    let input = body(payload)?;
    Ok(Json(update_user(&state.pool, &identity, id, input).await?))
}

pub async fn delete_user_axum(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i32>,
) -> FarmHubResult<StatusCode> {
    delete_user(&state.pool, &identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
