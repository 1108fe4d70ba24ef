use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{body, not_found};
use crate::access::{EntityKind, Identity};
use crate::config::AppConfig;
use crate::db::{DbPool, User};
use crate::error::{FarmHubError, FarmHubResult, ValidationErrors};
use crate::middleware::auth::issue_token;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub user: User,
}

const BAD_CREDENTIALS: &str = "invalid username or password";

pub async fn login(pool: &DbPool, config: &AppConfig, req: LoginRequest) -> FarmHubResult<LoginResponse> {
    let mut errors = ValidationErrors::new();
    let username = crate::validation::required_text(&mut errors, "username", req.username.as_deref());
    let password = crate::validation::required_text(&mut errors, "password", req.password.as_deref());
    let (Some(username), Some(password)) = (username, password) else {
        return Err(errors.into());
    };

    let user = sqlx::query_as::<_, User>("SELECT u.* FROM users u WHERE u.username = $1")
        .bind(&username)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| FarmHubError::Unauthenticated(BAD_CREDENTIALS.into()))?;

    let Some(hash) = user.password_hash.as_deref() else {
        return Err(FarmHubError::Unauthenticated(BAD_CREDENTIALS.into()));
    };
    if !bcrypt::verify(&password, hash)? {
        tracing::warn!("failed login for '{}'", username);
        return Err(FarmHubError::Unauthenticated(BAD_CREDENTIALS.into()));
    }
    if !user.is_active {
        return Err(FarmHubError::Unauthenticated("this account is disabled".into()));
    }

    let token = issue_token(&config.jwt_secret, config.jwt_ttl_hours, &user)?;
    tracing::info!("user {} logged in", user.id);
    Ok(LoginResponse {
        success: true,
        token,
        user,
    })
}

pub async fn login_axum(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> FarmHubResult<Json<LoginResponse>> {
    let req = body(payload)?;
    Ok(Json(login(&state.pool, &state.config, req).await?))
}

/// The caller's own row, whatever their role.
pub async fn me_axum(State(state): State<AppState>, identity: Identity) -> FarmHubResult<Json<User>> {
    let user = super::user::fetch_user(&state.pool, identity.user_id)
        .await?
        .ok_or_else(|| not_found(EntityKind::User))?;
    Ok(Json(user))
}
