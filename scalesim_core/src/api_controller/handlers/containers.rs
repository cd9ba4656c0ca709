use crate::api_controller::middlewares::jwt::AuthenticatedUser;
use crate::api_controller::AppState;
use crate::db::container::ContainerDBRepo;
use crate::lifecycle_manager::deploy::{self, DeployContainerRequest};
use crate::lifecycle_manager::error::{CoreError, CoreResult};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use db_entities::containers::{self, ContainerStatus};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct ContainerListOut {
    pub containers: Vec<containers::Model>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ContainerActionResponse {
    pub ok: bool,
    pub message: String,
    pub container: Option<containers::Model>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

pub async fn docker_status(State(state): State<AppState>, _user: AuthenticatedUser) -> Json<serde_json::Value> {
    Json(json!(state.driver.status().await))
}

pub async fn docker_images(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> CoreResult<Json<serde_json::Value>> {
    let images = state.driver.list_local_images().await?;
    Ok(Json(json!({ "images": images })))
}

/// Deploy a container from Docker Hub, a GitHub repository, or as a
/// simulated record.
pub async fn deploy_container(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<DeployContainerRequest>,
) -> CoreResult<(StatusCode, Json<containers::Model>)> {
    let container = deploy::deploy_container(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(container)))
}

/// List containers. Students see only their own, teachers/admins see all.
pub async fn list_containers(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> CoreResult<Json<ContainerListOut>> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(parse_status(raw)?),
    };

    let containers = ContainerDBRepo::list_visible(&state.db_conn, &user, status).await?;
    let total = containers.len();
    Ok(Json(ContainerListOut { containers, total }))
}

pub async fn get_container(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(container_id): Path<i32>,
) -> CoreResult<Json<containers::Model>> {
    let container = ContainerDBRepo::find_visible(&state.db_conn, container_id, &user).await?;
    Ok(Json(container))
}

pub async fn start_container(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(container_id): Path<i32>,
) -> CoreResult<Json<ContainerActionResponse>> {
    let container = ContainerDBRepo::find_visible(&state.db_conn, container_id, &user).await?;

    if container.status == ContainerStatus::Running {
        return Ok(Json(ContainerActionResponse {
            ok: true,
            message: "Container is already running".to_string(),
            container: Some(container),
        }));
    }

    if let Some(engine_id) = container.engine_id.as_deref() {
        state.driver.start_container(engine_id).await?;
    }

    let name = container.name.clone();
    let mut active: containers::ActiveModel = container.into();
    active.status = Set(ContainerStatus::Running);
    active.started_at = Set(Some(Utc::now()));
    active.stopped_at = Set(None);
    active.updated_at = Set(Utc::now());
    let updated = active.update(&state.db_conn).await?;

    Ok(Json(ContainerActionResponse {
        ok: true,
        message: format!("Container '{name}' started successfully"),
        container: Some(updated),
    }))
}

pub async fn stop_container(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(container_id): Path<i32>,
) -> CoreResult<Json<ContainerActionResponse>> {
    let container = ContainerDBRepo::find_visible(&state.db_conn, container_id, &user).await?;

    if container.status == ContainerStatus::Stopped {
        return Ok(Json(ContainerActionResponse {
            ok: true,
            message: "Container is already stopped".to_string(),
            container: Some(container),
        }));
    }

    if let Some(engine_id) = container.engine_id.as_deref() {
        state.driver.stop_container(engine_id).await?;
    }

    let name = container.name.clone();
    let mut active: containers::ActiveModel = container.into();
    active.status = Set(ContainerStatus::Stopped);
    active.stopped_at = Set(Some(Utc::now()));
    active.updated_at = Set(Utc::now());
    let updated = active.update(&state.db_conn).await?;

    Ok(Json(ContainerActionResponse {
        ok: true,
        message: format!("Container '{name}' stopped successfully"),
        container: Some(updated),
    }))
}

/// Deletes the record (replicas, policies and tests cascade) and tears down
/// the engine container best-effort.
pub async fn delete_container(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(container_id): Path<i32>,
) -> CoreResult<Json<ContainerActionResponse>> {
    let container = ContainerDBRepo::find_visible(&state.db_conn, container_id, &user).await?;

    if let Some(engine_id) = container.engine_id.as_deref() {
        if let Err(e) = state.driver.remove_container(engine_id).await {
            warn!("Failed to remove engine container {engine_id}: {e}");
        }
    }

    let name = container.name.clone();
    container.delete(&state.db_conn).await?;
    info!("Container '{name}' deleted");

    Ok(Json(ContainerActionResponse {
        ok: true,
        message: format!("Container '{name}' deleted successfully"),
        container: None,
    }))
}

/// Engine logs for live containers; synthesized lines for simulated ones.
pub async fn container_logs(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(container_id): Path<i32>,
) -> CoreResult<Json<serde_json::Value>> {
    let container = ContainerDBRepo::find_visible(&state.db_conn, container_id, &user).await?;

    let logs = match container.engine_id.as_deref() {
        Some(engine_id) => state.driver.container_logs(engine_id, 100).await?,
        None => synthesized_logs(&container),
    };

    Ok(Json(json!({
        "logs": logs,
        "container_name": container.name,
        "status": container.status,
    })))
}

fn synthesized_logs(container: &containers::Model) -> Vec<String> {
    let stamp = |t: chrono::DateTime<Utc>| t.format("%Y-%m-%d %H:%M:%S").to_string();
    let started = container.started_at.map(stamp).unwrap_or_else(|| "N/A".to_string());

    match container.status {
        ContainerStatus::Running => vec![
            format!(
                "[{}] Container '{}' initialized",
                stamp(container.created_at),
                container.name
            ),
            format!(
                "[{started}] Starting {}...",
                container.image.as_deref().unwrap_or("simulated")
            ),
            format!("[{started}] Container started successfully"),
            format!(
                "[{}] Running with {}m CPU and {}Mi memory",
                stamp(Utc::now()),
                container.cpu_limit,
                container.memory_limit
            ),
            format!(
                "[{}] Listening on port {}",
                stamp(Utc::now()),
                container.port.map(|p| p.to_string()).unwrap_or_else(|| "N/A".to_string())
            ),
        ],
        ContainerStatus::Stopped => vec![
            format!(
                "[{}] Container '{}' initialized",
                stamp(container.created_at),
                container.name
            ),
            format!(
                "[{}] Container stopped",
                container.stopped_at.map(stamp).unwrap_or_else(|| "N/A".to_string())
            ),
        ],
        _ => vec![
            format!(
                "[{}] Container '{}' created",
                stamp(container.created_at),
                container.name
            ),
            format!("[{}] Status: {:?}", stamp(container.created_at), container.status),
        ],
    }
}

fn parse_status(raw: &str) -> CoreResult<ContainerStatus> {
    match raw {
        "pending" => Ok(ContainerStatus::Pending),
        "running" => Ok(ContainerStatus::Running),
        "stopped" => Ok(ContainerStatus::Stopped),
        "error" => Ok(ContainerStatus::Error),
        other => Err(CoreError::InvalidInput(format!("Invalid status: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("running").unwrap(), ContainerStatus::Running);
        assert_eq!(parse_status("stopped").unwrap(), ContainerStatus::Stopped);
        assert!(parse_status("paused").is_err());
    }
}
