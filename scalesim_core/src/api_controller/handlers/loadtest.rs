use crate::api_controller::middlewares::jwt::AuthenticatedUser;
use crate::api_controller::AppState;
use crate::db::container::ContainerDBRepo;
use crate::db::loadtest::LoadTestDBRepo;
use crate::lifecycle_manager::error::{CoreError, CoreResult};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use chrono::Utc;
use db_entities::containers::ContainerStatus;
use db_entities::load_tests::{self, LoadTestStatus};
use db_entities::prelude::LoadTests;
use runtime::shared::utils::localhost_url;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, DatabaseConnection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::{info, warn};

const STREAM_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct StartLoadTestRequest {
    pub container_id: i32,
    pub target_url: Option<String>,
    pub total_requests: i32,
    pub concurrency: i32,
    pub duration_seconds: i32,
}

#[derive(Debug, Serialize)]
pub struct LoadTestOut {
    #[serde(flatten)]
    pub test: load_tests::Model,
    pub progress_percent: f64,
}

impl From<load_tests::Model> for LoadTestOut {
    fn from(test: load_tests::Model) -> Self {
        let progress_percent = test.progress_percent();
        Self {
            test,
            progress_percent,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub container_id: Option<i32>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Enqueues a load test against a running container and spawns its task.
pub async fn start_test(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<StartLoadTestRequest>,
) -> CoreResult<(StatusCode, Json<serde_json::Value>)> {
    if !(1..=1000).contains(&payload.total_requests) {
        return Err(CoreError::InvalidInput(
            "total_requests must be between 1 and 1000".to_string(),
        ));
    }
    if !(1..=50).contains(&payload.concurrency) {
        return Err(CoreError::InvalidInput(
            "concurrency must be between 1 and 50".to_string(),
        ));
    }
    if !(10..=300).contains(&payload.duration_seconds) {
        return Err(CoreError::InvalidInput(
            "duration_seconds must be between 10 and 300".to_string(),
        ));
    }

    let container = ContainerDBRepo::find_owned(&state.db_conn, payload.container_id, &user).await?;
    if container.status != ContainerStatus::Running {
        return Err(CoreError::InvalidInput(
            "Container must be running to load test it".to_string(),
        ));
    }

    let target_url = payload
        .target_url
        .or_else(|| container.localhost_url.clone())
        .or_else(|| container.port.map(localhost_url))
        .ok_or_else(|| {
            CoreError::InvalidInput("Container has no reachable URL to test".to_string())
        })?;

    let test = load_tests::ActiveModel {
        user_id: Set(user.id),
        container_id: Set(container.id),
        target_url: Set(target_url),
        total_requests: Set(payload.total_requests),
        concurrency: Set(payload.concurrency),
        duration_seconds: Set(payload.duration_seconds),
        status: Set(LoadTestStatus::Pending),
        requests_sent: Set(0),
        requests_completed: Set(0),
        requests_failed: Set(0),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let test = test.insert(&state.db_conn).await?;

    state.loadtester.spawn(test.id);
    info!("Load test {} enqueued for container {}", test.id, container.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": test.id,
            "status": "pending",
            "message": "Load test started",
        })),
    ))
}

pub async fn get_test(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(test_id): Path<i32>,
) -> CoreResult<Json<LoadTestOut>> {
    let test = LoadTestDBRepo::find_owned(&state.db_conn, test_id, &user).await?;
    Ok(Json(test.into()))
}

pub async fn test_metrics(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(test_id): Path<i32>,
) -> CoreResult<Json<serde_json::Value>> {
    LoadTestDBRepo::find_owned(&state.db_conn, test_id, &user).await?;
    let metrics = LoadTestDBRepo::metrics(&state.db_conn, test_id).await?;
    Ok(Json(json!({ "metrics": metrics })))
}

/// Cancels a running test. Terminal tests reject with 400.
pub async fn cancel_test(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(test_id): Path<i32>,
) -> CoreResult<Json<serde_json::Value>> {
    let test = LoadTestDBRepo::find_owned(&state.db_conn, test_id, &user).await?;
    if test.status.is_terminal() {
        return Err(CoreError::InvalidInput(
            "Load test has already finished".to_string(),
        ));
    }

    let signalled = state.loadtester.cancel(test_id);
    if !signalled {
        // No live task (e.g. the process restarted); settle the row directly.
        warn!("No live task for test {test_id}, marking cancelled");
        let mut active: load_tests::ActiveModel = test.into();
        active.status = Set(LoadTestStatus::Cancelled);
        active.completed_at = Set(Some(Utc::now()));
        active.update(&state.db_conn).await?;
    }

    Ok(Json(json!({ "message": "Load test cancelled" })))
}

pub async fn history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<HistoryQuery>,
) -> CoreResult<Json<serde_json::Value>> {
    let limit = query.limit.unwrap_or(20).min(100);
    let offset = query.offset.unwrap_or(0);
    let (tests, total) =
        LoadTestDBRepo::history(&state.db_conn, &user, query.container_id, limit, offset).await?;

    Ok(Json(json!({ "tests": tests, "total": total })))
}

/// Streams test progress as Server-Sent Events: one `metric` event per
/// snapshot and a final `complete` event when the test reaches a terminal
/// state, after which the stream closes.
pub async fn stream_metrics(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(test_id): Path<i32>,
) -> CoreResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    LoadTestDBRepo::find_owned(&state.db_conn, test_id, &user).await?;

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(stream_worker(state.db_conn.clone(), test_id, tx));

    Ok(Sse::new(UnboundedReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

async fn stream_worker(
    db: DatabaseConnection,
    test_id: i32,
    tx: mpsc::UnboundedSender<Result<Event, Infallible>>,
) {
    let mut last_metric_id = 0;

    loop {
        let test = match LoadTests::find_by_id(test_id).one(&db).await {
            Ok(Some(test)) => test,
            Ok(None) => return,
            Err(e) => {
                warn!("Metric stream for test {test_id} lost the store: {e}");
                return;
            }
        };

        match LoadTestDBRepo::metrics_after(&db, test_id, last_metric_id).await {
            Ok(snapshots) => {
                for snapshot in snapshots {
                    last_metric_id = snapshot.id;
                    let payload = json!({
                        "timestamp": snapshot.timestamp,
                        "cpu": snapshot.cpu_percent,
                        "memory": snapshot.memory_mb,
                        "completed": snapshot.requests_completed,
                        "failed": snapshot.requests_failed,
                        "active": snapshot.active_requests,
                        "progress": test.progress_percent(),
                    });
                    let event = Event::default().event("metric").data(payload.to_string());
                    if tx.send(Ok(event)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => warn!("Metric stream for test {test_id} failed to read snapshots: {e}"),
        }

        if test.status.is_terminal() {
            let payload = json!({
                "status": test.status,
                "total_completed": test.requests_completed,
                "total_failed": test.requests_failed,
            });
            let event = Event::default().event("complete").data(payload.to_string());
            let _ = tx.send(Ok(event));
            return;
        }

        tokio::time::sleep(STREAM_POLL_INTERVAL).await;
    }
}
