use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::db::Role;
use crate::error::FarmHubError;
use crate::middleware::auth::Claims;

/// The verified actor behind a request.
///
/// `role` is `None` when the token carries a role this service does not know;
/// such an identity sees nothing and may do nothing, but is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i32,
    pub username: String,
    pub role: Option<Role>,
}

impl Identity {
    pub fn new(user_id: i32, username: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            username: username.into(),
            role: Some(role),
        }
    }

    pub fn from_claims(claims: &Claims) -> Option<Self> {
        Some(Self {
            user_id: claims.user_id?,
            username: claims.username.clone().unwrap_or_default(),
            role: claims.role.as_deref().and_then(|r| r.parse().ok()),
        })
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == Some(Role::SuperAdmin)
    }

    pub fn is_agent(&self) -> bool {
        self.role == Some(Role::Agent)
    }

    pub fn is_farmer(&self) -> bool {
        self.role == Some(Role::Farmer)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = FarmHubError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .and_then(Identity::from_claims)
            .ok_or_else(|| FarmHubError::Unauthenticated("a valid bearer token is required".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(user_id: Option<i32>, role: Option<&str>) -> Claims {
        Claims {
            sub: "someone".into(),
            user_id,
            username: Some("someone".into()),
            role: role.map(str::to_string),
            exp: 0,
        }
    }

    #[test]
    fn known_role_is_parsed() {
        let identity = Identity::from_claims(&claims(Some(7), Some("AGENT"))).unwrap();
        assert!(identity.is_agent());
        assert!(!identity.is_farmer());
        assert_eq!(identity.user_id, 7);
    }

    #[test]
    fn unknown_role_yields_roleless_identity() {
        let identity = Identity::from_claims(&claims(Some(7), Some("AUDITOR"))).unwrap();
        assert_eq!(identity.role, None);
        assert!(!identity.is_super_admin());
    }

    #[test]
    fn claims_without_user_id_are_not_an_identity() {
        assert!(Identity::from_claims(&claims(None, Some("FARMER"))).is_none());
    }
}
