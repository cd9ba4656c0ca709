use crate::api_controller::middlewares::jwt::{
    create_access_token, role_from_str, AuthenticatedUser,
};
use crate::api_controller::AppState;
use crate::db::user::UserDBRepo;
use crate::lifecycle_manager::error::{CoreError, CoreResult};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use db_entities::users::{self, UserRole};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

/// Registers a new account. Email verification is issued by the external
/// identity flow; accounts start unverified.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> CoreResult<(StatusCode, Json<users::Model>)> {
    if payload.password.len() < 8 {
        return Err(CoreError::InvalidInput(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    let role = match payload.role.as_deref() {
        None => UserRole::Student,
        Some(value) => role_from_str(value)
            .ok_or_else(|| CoreError::InvalidInput(format!("Invalid role: {value}")))?,
    };

    if UserDBRepo::find_by_email(&state.db_conn, &payload.email)
        .await?
        .is_some()
    {
        return Err(CoreError::InvalidInput("Email already registered".to_string()));
    }

    let password_hash = hash_password(&payload.password)?;
    let user = UserDBRepo::create(
        &state.db_conn,
        payload.name.trim(),
        &payload.email,
        &password_hash,
        role,
    )
    .await?;

    info!("Registered user {} ({})", user.email, user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> CoreResult<Json<TokenResponse>> {
    let user = UserDBRepo::find_by_email(&state.db_conn, &payload.email)
        .await?
        .ok_or_else(|| CoreError::Unauthenticated("Invalid email or password".to_string()))?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(CoreError::Unauthenticated("Invalid email or password".to_string()));
    }

    let token = create_access_token(
        &user,
        &state.config.auth.jwt_secret,
        state.config.auth.access_token_expire_minutes,
    )?;
    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer",
    }))
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> CoreResult<Json<users::Model>> {
    let profile = UserDBRepo::find_by_id(&state.db_conn, user.id)
        .await?
        .ok_or_else(|| CoreError::NotFound("User not found".to_string()))?;
    Ok(Json(profile))
}

fn hash_password(password: &str) -> CoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CoreError::Internal(format!("Failed to hash password: {e}")))
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("hunter2hunter2").unwrap();
        assert!(verify_password("hunter2hunter2", &hash));
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }
}
