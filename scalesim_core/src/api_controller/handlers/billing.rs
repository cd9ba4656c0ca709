use crate::api_controller::middlewares::jwt::AuthenticatedUser;
use crate::api_controller::AppState;
use crate::db::container::ContainerDBRepo;
use crate::lifecycle_manager::error::{CoreError, CoreResult};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{Duration, Utc};
use db_entities::pricing_models::{self, PricingProvider};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct RealTimeBillingRequest {
    pub container_id: i32,
    #[serde(default = "default_hours_back")]
    pub hours_back: f64,
    #[serde(default = "default_provider")]
    pub provider: PricingProvider,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioRequest {
    pub cpu_cores: f64,
    pub memory_gb: f64,
    pub storage_gb: f64,
    pub duration_hours: f64,
    #[serde(default = "default_provider")]
    pub provider: PricingProvider,
}

#[derive(Debug, Deserialize)]
pub struct UsageHistoryQuery {
    #[serde(default = "default_history_hours")]
    pub hours: f64,
}

fn default_hours_back() -> f64 {
    1.0
}

fn default_provider() -> PricingProvider {
    PricingProvider::Aws
}

fn default_history_hours() -> f64 {
    24.0
}

pub async fn pricing_models(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> CoreResult<Json<Vec<pricing_models::Model>>> {
    Ok(Json(state.billing.pricing_models().await?))
}

/// Cost of a container over the trailing window, from harvested usage.
pub async fn real_time_calculate(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<RealTimeBillingRequest>,
) -> CoreResult<Json<serde_json::Value>> {
    if payload.hours_back <= 0.0 {
        return Err(CoreError::InvalidInput("hours_back must be positive".to_string()));
    }
    ContainerDBRepo::find_owned(&state.db_conn, payload.container_id, &user).await?;

    let billing = state
        .billing
        .real_time_billing(payload.container_id, payload.hours_back, payload.provider)
        .await?
        .ok_or_else(|| {
            CoreError::InvalidInput("No usage data found for this time period".to_string())
        })?;

    Ok(Json(json!(billing)))
}

/// Hypothetical scenario costing; touches no container state.
pub async fn scenario_simulate(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(payload): Json<ScenarioRequest>,
) -> CoreResult<Json<serde_json::Value>> {
    if payload.duration_hours <= 0.0 {
        return Err(CoreError::InvalidInput("duration_hours must be positive".to_string()));
    }
    if payload.cpu_cores < 0.0 || payload.memory_gb < 0.0 || payload.storage_gb < 0.0 {
        return Err(CoreError::InvalidInput("Resource amounts cannot be negative".to_string()));
    }

    let scenario = state
        .billing
        .simulate_scenario(
            payload.cpu_cores,
            payload.memory_gb,
            payload.storage_gb,
            payload.duration_hours,
            payload.provider,
        )
        .await;

    Ok(Json(json!(scenario)))
}

/// Raw harvested usage rows for one container over the trailing window.
pub async fn usage_history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(container_id): Path<i32>,
    Query(query): Query<UsageHistoryQuery>,
) -> CoreResult<Json<serde_json::Value>> {
    if query.hours <= 0.0 {
        return Err(CoreError::InvalidInput("hours must be positive".to_string()));
    }
    ContainerDBRepo::find_owned(&state.db_conn, container_id, &user).await?;

    let end = Utc::now();
    let start = end - Duration::milliseconds((query.hours * 3_600_000.0) as i64);
    let usage = state.billing.usage_history(container_id, start, end).await?;

    Ok(Json(json!({
        "container_id": container_id,
        "hours": query.hours,
        "usage": usage,
    })))
}
