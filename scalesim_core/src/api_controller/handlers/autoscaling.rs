use crate::api_controller::middlewares::jwt::AuthenticatedUser;
use crate::api_controller::AppState;
use crate::db::container::ContainerDBRepo;
use crate::db::scaling::ScalingDBRepo;
use crate::lifecycle_manager::error::{CoreError, CoreResult};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use db_entities::{scaling_events, scaling_policies};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, SqlErr};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreatePolicyRequest {
    pub container_id: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_up_threshold")]
    pub scale_up_cpu_threshold: f64,
    #[serde(default = "default_up_threshold")]
    pub scale_up_memory_threshold: f64,
    #[serde(default = "default_down_threshold")]
    pub scale_down_cpu_threshold: f64,
    #[serde(default = "default_down_threshold")]
    pub scale_down_memory_threshold: f64,
    #[serde(default = "default_min_replicas")]
    pub min_replicas: i32,
    #[serde(default = "default_max_replicas")]
    pub max_replicas: i32,
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: i32,
    #[serde(default = "default_evaluation")]
    pub evaluation_seconds: i32,
}

fn default_true() -> bool {
    true
}
fn default_up_threshold() -> f64 {
    80.0
}
fn default_down_threshold() -> f64 {
    30.0
}
fn default_min_replicas() -> i32 {
    1
}
fn default_max_replicas() -> i32 {
    8
}
fn default_cooldown() -> i32 {
    300
}
fn default_evaluation() -> i32 {
    60
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePolicyRequest {
    pub enabled: Option<bool>,
    pub scale_up_cpu_threshold: Option<f64>,
    pub scale_up_memory_threshold: Option<f64>,
    pub scale_down_cpu_threshold: Option<f64>,
    pub scale_down_memory_threshold: Option<f64>,
    pub min_replicas: Option<i32>,
    pub max_replicas: Option<i32>,
    pub cooldown_seconds: Option<i32>,
    pub evaluation_seconds: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub container_id: Option<i32>,
    pub limit: Option<u64>,
}

/// Creates the single policy a container may have.
pub async fn create_policy(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreatePolicyRequest>,
) -> CoreResult<(StatusCode, Json<scaling_policies::Model>)> {
    validate_bounds(
        payload.min_replicas,
        payload.max_replicas,
        payload.cooldown_seconds,
        payload.evaluation_seconds,
        &[
            payload.scale_up_cpu_threshold,
            payload.scale_up_memory_threshold,
            payload.scale_down_cpu_threshold,
            payload.scale_down_memory_threshold,
        ],
    )?;

    ContainerDBRepo::find_owned(&state.db_conn, payload.container_id, &user).await?;

    if ScalingDBRepo::policy_for_container(&state.db_conn, payload.container_id)
        .await?
        .is_some()
    {
        return Err(CoreError::InvalidInput(
            "Policy already exists for this container".to_string(),
        ));
    }

    let policy = scaling_policies::ActiveModel {
        container_id: Set(payload.container_id),
        user_id: Set(user.id),
        enabled: Set(payload.enabled),
        scale_up_cpu_threshold: Set(payload.scale_up_cpu_threshold),
        scale_up_memory_threshold: Set(payload.scale_up_memory_threshold),
        scale_down_cpu_threshold: Set(payload.scale_down_cpu_threshold),
        scale_down_memory_threshold: Set(payload.scale_down_memory_threshold),
        min_replicas: Set(payload.min_replicas),
        max_replicas: Set(payload.max_replicas),
        cooldown_seconds: Set(payload.cooldown_seconds),
        evaluation_seconds: Set(payload.evaluation_seconds),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    // The unique index on container_id backs up the duplicate check under
    // concurrent creation.
    let policy = match policy.insert(&state.db_conn).await {
        Ok(model) => model,
        Err(err) => match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                return Err(CoreError::InvalidInput(
                    "Policy already exists for this container".to_string(),
                ))
            }
            _ => return Err(err.into()),
        },
    };

    info!("Created scaling policy {} for container {}", policy.id, policy.container_id);
    Ok((StatusCode::CREATED, Json(policy)))
}

pub async fn list_policies(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> CoreResult<Json<Vec<scaling_policies::Model>>> {
    Ok(Json(ScalingDBRepo::list_policies(&state.db_conn, &user).await?))
}

pub async fn get_policy(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(policy_id): Path<i32>,
) -> CoreResult<Json<scaling_policies::Model>> {
    Ok(Json(
        ScalingDBRepo::find_owned_policy(&state.db_conn, policy_id, &user).await?,
    ))
}

pub async fn update_policy(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(policy_id): Path<i32>,
    Json(payload): Json<UpdatePolicyRequest>,
) -> CoreResult<Json<scaling_policies::Model>> {
    let policy = ScalingDBRepo::find_owned_policy(&state.db_conn, policy_id, &user).await?;

    let min_replicas = payload.min_replicas.unwrap_or(policy.min_replicas);
    let max_replicas = payload.max_replicas.unwrap_or(policy.max_replicas);
    let cooldown = payload.cooldown_seconds.unwrap_or(policy.cooldown_seconds);
    let evaluation = payload.evaluation_seconds.unwrap_or(policy.evaluation_seconds);
    let thresholds = [
        payload.scale_up_cpu_threshold.unwrap_or(policy.scale_up_cpu_threshold),
        payload.scale_up_memory_threshold.unwrap_or(policy.scale_up_memory_threshold),
        payload.scale_down_cpu_threshold.unwrap_or(policy.scale_down_cpu_threshold),
        payload.scale_down_memory_threshold.unwrap_or(policy.scale_down_memory_threshold),
    ];
    validate_bounds(min_replicas, max_replicas, cooldown, evaluation, &thresholds)?;

    let mut active: scaling_policies::ActiveModel = policy.into();
    if let Some(enabled) = payload.enabled {
        active.enabled = Set(enabled);
    }
    active.scale_up_cpu_threshold = Set(thresholds[0]);
    active.scale_up_memory_threshold = Set(thresholds[1]);
    active.scale_down_cpu_threshold = Set(thresholds[2]);
    active.scale_down_memory_threshold = Set(thresholds[3]);
    active.min_replicas = Set(min_replicas);
    active.max_replicas = Set(max_replicas);
    active.cooldown_seconds = Set(cooldown);
    active.evaluation_seconds = Set(evaluation);
    active.updated_at = Set(Some(Utc::now()));

    Ok(Json(active.update(&state.db_conn).await?))
}

pub async fn delete_policy(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(policy_id): Path<i32>,
) -> CoreResult<StatusCode> {
    let policy = ScalingDBRepo::find_owned_policy(&state.db_conn, policy_id, &user).await?;
    policy.delete(&state.db_conn).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_policy(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(policy_id): Path<i32>,
) -> CoreResult<Json<scaling_policies::Model>> {
    let policy = ScalingDBRepo::find_owned_policy(&state.db_conn, policy_id, &user).await?;
    let enabled = policy.enabled;

    let mut active: scaling_policies::ActiveModel = policy.into();
    active.enabled = Set(!enabled);
    active.updated_at = Set(Some(Utc::now()));

    Ok(Json(active.update(&state.db_conn).await?))
}

/// Recent scaling events for the caller, newest first.
pub async fn list_events(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<EventsQuery>,
) -> CoreResult<Json<Vec<scaling_events::Model>>> {
    let limit = query.limit.unwrap_or(50).min(500);
    let events =
        ScalingDBRepo::recent_events(&state.db_conn, &user, query.container_id, limit).await?;
    Ok(Json(events))
}

/// Manual trigger: evaluate the caller's policies immediately (teaching aid).
pub async fn evaluate_now(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> CoreResult<Json<serde_json::Value>> {
    info!("Manual policy evaluation triggered by {}", user.id);
    let evaluated = state.autoscaler.evaluate_for_user(user.id).await?;

    Ok(Json(json!({
        "status": "success",
        "message": format!("Policy evaluation completed for {evaluated} policies. Check scaling events."),
    })))
}

fn validate_bounds(
    min_replicas: i32,
    max_replicas: i32,
    cooldown_seconds: i32,
    evaluation_seconds: i32,
    thresholds: &[f64],
) -> CoreResult<()> {
    if !(1..=8).contains(&min_replicas) || !(1..=8).contains(&max_replicas) {
        return Err(CoreError::InvalidInput(
            "Replica counts must be between 1 and 8".to_string(),
        ));
    }
    if min_replicas > max_replicas {
        return Err(CoreError::InvalidInput(
            "min_replicas cannot exceed max_replicas".to_string(),
        ));
    }
    if cooldown_seconds < 60 {
        return Err(CoreError::InvalidInput(
            "cooldown_seconds must be at least 60".to_string(),
        ));
    }
    if evaluation_seconds < 30 {
        return Err(CoreError::InvalidInput(
            "evaluation_seconds must be at least 30".to_string(),
        ));
    }
    if thresholds.iter().any(|t| !(0.0..=100.0).contains(t)) {
        return Err(CoreError::InvalidInput(
            "Thresholds must be between 0 and 100 percent".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_bounds() {
        assert!(validate_bounds(1, 8, 300, 60, &[80.0, 80.0, 30.0, 30.0]).is_ok());

        // min > max
        assert!(validate_bounds(4, 2, 300, 60, &[80.0]).is_err());
        // replica range
        assert!(validate_bounds(0, 8, 300, 60, &[80.0]).is_err());
        assert!(validate_bounds(1, 9, 300, 60, &[80.0]).is_err());
        // cooldown and evaluation minimums
        assert!(validate_bounds(1, 8, 59, 60, &[80.0]).is_err());
        assert!(validate_bounds(1, 8, 60, 29, &[80.0]).is_err());
        // threshold range
        assert!(validate_bounds(1, 8, 60, 30, &[101.0]).is_err());
        assert!(validate_bounds(1, 8, 60, 30, &[-1.0]).is_err());
    }
}
