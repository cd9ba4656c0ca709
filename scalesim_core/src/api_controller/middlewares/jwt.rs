use crate::api_controller::AppState;
use crate::lifecycle_manager::error::CoreError;
use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::http::request::Parts;
use axum::{RequestPartsExt, TypedHeader};
use chrono::{Duration, Utc};
use db_entities::users::{self, UserRole};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bearer token claims. `sub` carries the user id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub verified: bool,
    pub exp: i64,
}

/// Issues an access token for a user.
pub fn create_access_token(
    user: &users::Model,
    secret: &str,
    expire_minutes: u64,
) -> Result<String, CoreError> {
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        role: role_str(user.role).to_string(),
        verified: user.verified,
        exp: (Utc::now() + Duration::minutes(expire_minutes as i64)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| CoreError::Internal(format!("Failed to sign token: {e}")))
}

pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, CoreError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|_| CoreError::Unauthenticated("Could not validate credentials".to_string()))
}

pub fn role_str(role: UserRole) -> &'static str {
    match role {
        UserRole::Student => "student",
        UserRole::Teacher => "teacher",
        UserRole::Admin => "admin",
    }
}

pub fn role_from_str(value: &str) -> Option<UserRole> {
    match value {
        "student" => Some(UserRole::Student),
        "teacher" => Some(UserRole::Teacher),
        "admin" => Some(UserRole::Admin),
        _ => None,
    }
}

/// The authenticated caller, resolved from the Authorization header.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub role: UserRole,
}

impl AuthenticatedUser {
    /// Students only see their own containers; teachers and admins see all.
    pub fn can_read_all_containers(&self) -> bool {
        matches!(self.role, UserRole::Teacher | UserRole::Admin)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| CoreError::Unauthenticated("Missing bearer token".to_string()))?;

        let state = AppState::from_ref(state);
        let claims = decode_claims(bearer.token(), &state.config.auth.jwt_secret)?;

        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| CoreError::Unauthenticated("Invalid token subject".to_string()))?;
        let role = role_from_str(&claims.role)
            .ok_or_else(|| CoreError::Unauthenticated("Invalid token role".to_string()))?;

        Ok(AuthenticatedUser { id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> users::Model {
        users::Model {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "hash".to_string(),
            role: UserRole::Teacher,
            verified: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_token_round_trip() {
        let user = test_user();
        let token = create_access_token(&user, "secret", 60).unwrap();
        let claims = decode_claims(&token, "secret").unwrap();

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.role, "teacher");
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = create_access_token(&test_user(), "secret", 60).unwrap();
        assert!(decode_claims(&token, "other-secret").is_err());
    }

    #[test]
    fn test_role_round_trip() {
        for role in [UserRole::Student, UserRole::Teacher, UserRole::Admin] {
            assert_eq!(role_from_str(role_str(role)), Some(role));
        }
        assert_eq!(role_from_str("root"), None);
    }
}
