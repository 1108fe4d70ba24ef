use crate::db::User;
use crate::error::{FarmHubError, FarmHubResult};
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub user_id: Option<i32>,
    pub username: Option<String>,
    pub role: Option<String>,
    pub exp: usize,
}

const PUBLIC_ROUTES: &[&str] = &["/api/auth/login", "/api/health"];

pub fn issue_token(secret: &[u8], ttl_hours: i64, user: &User) -> FarmHubResult<String> {
    let exp = chrono::Utc::now() + chrono::Duration::hours(ttl_hours);
    let claims = Claims {
        sub: user.username.clone(),
        user_id: Some(user.id),
        username: Some(user.username.clone()),
        role: Some(user.role.as_str().to_string()),
        exp: exp.timestamp().max(0) as usize,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )?)
}

pub fn verify_token(secret: &[u8], token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, FarmHubError> {
    let path = request.uri().path();
    if !path.starts_with("/api/") || PUBLIC_ROUTES.contains(&path) {
        return Ok(next.run(request).await);
    }

    // 1. Extract the Authorization header
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| FarmHubError::Unauthenticated("a bearer token is required".into()))?;

    // 2. Validate the token
    let claims = verify_token(&state.config.jwt_secret, token)
        .ok_or_else(|| FarmHubError::Unauthenticated("invalid or expired token".into()))?;

    // 3. Attach the claims to the request extensions
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Role;
    use chrono::Utc;

    fn user() -> User {
        User {
            id: 42,
            username: "farmer.jane".into(),
            email: None,
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            password_hash: None,
            role: Role::Farmer,
            phone_number: None,
            address: None,
            date_of_birth: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn issued_tokens_verify_with_the_same_secret() {
        let token = issue_token(b"secret", 1, &user()).unwrap();
        let claims = verify_token(b"secret", &token).unwrap();
        assert_eq!(claims.user_id, Some(42));
        assert_eq!(claims.role.as_deref(), Some("FARMER"));
        assert!(verify_token(b"other", &token).is_none());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let token = issue_token(b"secret", -2, &user()).unwrap();
        assert!(verify_token(b"secret", &token).is_none());
    }
}
