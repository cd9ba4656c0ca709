use crate::api_controller::middlewares::jwt::AuthenticatedUser;
use crate::api_controller::AppState;
use crate::db::container::ContainerDBRepo;
use crate::lifecycle_manager::error::{CoreError, CoreResult};
use chrono::Utc;
use db_entities::containers::{self, ContainerStatus, DeploymentType};
use runtime::core::docker::RunSpec;
use runtime::core::git;
use runtime::shared::utils::{engine_container_name, localhost_url};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, DatabaseConnection, SqlErr};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Lowest port the allocator hands out.
const PORT_RANGE_START: i32 = 3000;
/// Attempts before giving up on a port collision storm.
const PORT_ALLOC_RETRIES: usize = 5;

#[derive(Debug, Deserialize)]
pub struct DeployContainerRequest {
    pub name: String,
    pub deployment_type: DeploymentType,
    /// Image reference for dockerhub deployments.
    pub image: Option<String>,
    /// Repository URL for github deployments.
    pub source_url: Option<String>,
    pub github_branch: Option<String>,
    pub dockerfile_path: Option<String>,
    pub git_token: Option<String>,
    pub docker_username: Option<String>,
    pub docker_password: Option<String>,
    /// Requested host port; auto-allocated when omitted.
    pub port: Option<i32>,
    /// Port the application listens on inside the container.
    pub internal_port: Option<i32>,
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: i32,
    #[serde(default = "default_memory_limit")]
    pub memory_limit: i32,
    pub environment_vars: Option<HashMap<String, String>>,
}

fn default_cpu_limit() -> i32 {
    500
}

fn default_memory_limit() -> i32 {
    512
}

/// Deploys one container for the caller: allocates a port, records the row,
/// and drives the engine for non-simulated deployments.
pub async fn deploy_container(
    state: &AppState,
    user: &AuthenticatedUser,
    payload: DeployContainerRequest,
) -> CoreResult<containers::Model> {
    if payload.name.trim().is_empty() {
        return Err(CoreError::InvalidInput("Container name cannot be empty".to_string()));
    }
    if ContainerDBRepo::name_exists(&state.db_conn, user, &payload.name).await? {
        return Err(CoreError::InvalidInput(format!(
            "Container with name '{}' already exists",
            payload.name
        )));
    }

    // Engine-backed deployments refuse early when the engine is down.
    if payload.deployment_type != DeploymentType::Simulated {
        let status = state.driver.status().await;
        if !status.available {
            return Err(CoreError::DriverUnavailable(status.message));
        }
    }

    let container = insert_with_port(&state.db_conn, user, &payload).await?;

    let deployed = match payload.deployment_type {
        DeploymentType::Simulated => deploy_simulated(state, container, &payload).await,
        DeploymentType::Dockerhub => deploy_dockerhub(state, container, &payload).await,
        DeploymentType::Github => deploy_github(state, container, &payload).await,
    }?;

    info!(
        "Container deployed: {} (id {}, type {:?})",
        deployed.name, deployed.id, deployed.deployment_type
    );
    Ok(deployed)
}

/// Inserts the pending container row. Port allocation is read-modify-write:
/// scan for the lowest free port, insert, and let the unique index arbitrate
/// concurrent allocations — the loser rescans and retries.
async fn insert_with_port(
    db: &DatabaseConnection,
    user: &AuthenticatedUser,
    payload: &DeployContainerRequest,
) -> CoreResult<containers::Model> {
    let env_json = payload
        .environment_vars
        .as_ref()
        .map(|vars| serde_json::to_value(vars).unwrap_or_default());

    for attempt in 0..PORT_ALLOC_RETRIES {
        let port = match payload.port {
            Some(requested) => requested,
            None => {
                let used = ContainerDBRepo::used_ports(db).await?;
                let mut candidate = PORT_RANGE_START + attempt as i32;
                while used.contains(&candidate) {
                    candidate += 1;
                }
                candidate
            }
        };

        let now = Utc::now();
        let row = containers::ActiveModel {
            user_id: Set(user.id),
            name: Set(payload.name.clone()),
            status: Set(ContainerStatus::Pending),
            port: Set(Some(port)),
            cpu_limit: Set(payload.cpu_limit),
            memory_limit: Set(payload.memory_limit),
            environment_vars: Set(env_json.clone()),
            deployment_type: Set(payload.deployment_type),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        match row.insert(db).await {
            Ok(model) => return Ok(model),
            Err(err) => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    if payload.port.is_some() {
                        return Err(CoreError::Conflict(format!("Port {port} is already in use")));
                    }
                    warn!("Port {port} was taken concurrently, retrying allocation");
                    continue;
                }
                _ => return Err(err.into()),
            },
        }
    }

    Err(CoreError::Conflict(
        "Could not allocate a free port, please retry".to_string(),
    ))
}

async fn deploy_simulated(
    state: &AppState,
    container: containers::Model,
    payload: &DeployContainerRequest,
) -> CoreResult<containers::Model> {
    let mut active: containers::ActiveModel = container.into();
    active.image = Set(Some(payload.image.clone().unwrap_or_else(|| "simulated".to_string())));
    active.status = Set(ContainerStatus::Running);
    active.started_at = Set(Some(Utc::now()));
    active.updated_at = Set(Utc::now());
    Ok(active.update(&state.db_conn).await?)
}

async fn deploy_dockerhub(
    state: &AppState,
    container: containers::Model,
    payload: &DeployContainerRequest,
) -> CoreResult<containers::Model> {
    let Some(image) = payload.image.clone() else {
        mark_error(&state.db_conn, &container).await;
        return Err(CoreError::InvalidInput(
            "Image name is required for Docker Hub deployments".to_string(),
        ));
    };

    if !state.driver.image_exists_locally(&image).await {
        info!("Image not found locally, pulling: {image}");
        let credentials = payload
            .docker_username
            .clone()
            .zip(payload.docker_password.clone());
        if let Err(e) = state.driver.pull_image(&image, credentials).await {
            mark_error(&state.db_conn, &container).await;
            return Err(CoreError::DriverFailure(format!("Failed to pull image: {e}")));
        }
    } else {
        info!("Using local image: {image}");
    }

    run_engine_container(state, container, &image, payload.internal_port.unwrap_or(80), Some(image.clone()))
        .await
}

async fn deploy_github(
    state: &AppState,
    container: containers::Model,
    payload: &DeployContainerRequest,
) -> CoreResult<containers::Model> {
    let Some(source_url) = payload.source_url.clone() else {
        mark_error(&state.db_conn, &container).await;
        return Err(CoreError::InvalidInput(
            "Repository URL (source_url) is required for GitHub deployments".to_string(),
        ));
    };

    let branch = payload.github_branch.as_deref().unwrap_or("main");
    let image_tag = format!("scalesim-github-{}:latest", container.id);

    let build = async {
        let repo = git::clone_repository(&source_url, branch, payload.git_token.as_deref()).await?;
        let dockerfile = git::find_dockerfile(repo.path(), payload.dockerfile_path.as_deref())?;
        let internal_port = git::parse_dockerfile_expose(&dockerfile)
            .map(i32::from)
            .or(payload.internal_port)
            .unwrap_or(80);

        let context_dir = dockerfile.parent().unwrap_or(repo.path()).to_path_buf();
        let dockerfile_name = dockerfile
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "Dockerfile".to_string());

        state
            .driver
            .build_image(&context_dir, &dockerfile_name, &image_tag)
            .await?;
        Ok::<i32, runtime::shared::error::RuntimeError>(internal_port)
    };

    let internal_port = match build.await {
        Ok(port) => port,
        Err(e) => {
            error!("GitHub deployment failed: {e}");
            mark_error(&state.db_conn, &container).await;
            return Err(CoreError::DriverFailure(format!("GitHub deployment failed: {e}")));
        }
    };

    run_engine_container(state, container, &image_tag, internal_port, Some(source_url)).await
}

/// Runs the engine container for a prepared record and flips it to running.
async fn run_engine_container(
    state: &AppState,
    container: containers::Model,
    image: &str,
    internal_port: i32,
    source_url: Option<String>,
) -> CoreResult<containers::Model> {
    let host_port = container
        .port
        .ok_or_else(|| CoreError::Internal("Container has no allocated port".to_string()))?;

    let env = container
        .environment_vars
        .as_ref()
        .and_then(|v| serde_json::from_value::<HashMap<String, String>>(v.clone()).ok())
        .unwrap_or_default()
        .into_iter()
        .collect();

    let spec = RunSpec {
        image: image.to_string(),
        name: engine_container_name(container.id, &container.name),
        host_port,
        container_port: internal_port,
        cpu_millicores: container.cpu_limit,
        memory_mb: container.memory_limit,
        env,
        restart_policy: "always".to_string(),
    };

    match state.driver.run_container(spec).await {
        Ok(engine_id) => {
            let mut active: containers::ActiveModel = container.into();
            active.image = Set(Some(image.to_string()));
            active.source_url = Set(source_url);
            active.build_status = Set(Some("success".to_string()));
            active.engine_id = Set(Some(engine_id));
            active.status = Set(ContainerStatus::Running);
            active.started_at = Set(Some(Utc::now()));
            active.updated_at = Set(Utc::now());
            active.localhost_url = Set(Some(localhost_url(host_port)));
            Ok(active.update(&state.db_conn).await?)
        }
        Err(e) => {
            mark_error(&state.db_conn, &container).await;
            Err(CoreError::DriverFailure(format!("Failed to run container: {e}")))
        }
    }
}

/// Best-effort error stamp; deploy failures must not hide behind a second
/// store error.
async fn mark_error(db: &DatabaseConnection, container: &containers::Model) {
    let mut active: containers::ActiveModel = container.clone().into();
    active.status = Set(ContainerStatus::Error);
    active.build_status = Set(Some("failed".to_string()));
    active.updated_at = Set(Utc::now());
    if let Err(e) = active.update(db).await {
        error!("Failed to mark container {} as errored: {e}", container.id);
    }
}
