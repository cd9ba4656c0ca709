use crate::api_controller::middlewares::jwt::AuthenticatedUser;
use crate::api_controller::AppState;
use crate::db::container::ContainerDBRepo;
use crate::lifecycle_manager::error::CoreResult;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use db_entities::containers::{self, ContainerStatus};
use runtime::core::stats::StatsSample;
use serde::Serialize;
use std::fmt::Write as _;

const MIB: f64 = 1_048_576.0;

#[derive(Debug, Serialize)]
pub struct ContainerStatsOut {
    pub id: i32,
    pub name: String,
    pub engine_id: Option<String>,
    pub status: ContainerStatus,
    pub cpu_percent: f64,
    pub memory_usage_mb: f64,
    pub memory_limit_mb: f64,
    pub memory_percent: f64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub network_rx_mb: f64,
    pub network_tx_mb: f64,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct MonitoringOverviewOut {
    pub total_containers: usize,
    pub running_containers: usize,
    pub stopped_containers: usize,
    pub total_cpu_percent: f64,
    pub total_memory_usage_mb: f64,
    pub containers_stats: Vec<ContainerStatsOut>,
}

fn stats_out(container: &containers::Model, sample: &StatsSample) -> ContainerStatsOut {
    ContainerStatsOut {
        id: container.id,
        name: container.name.clone(),
        engine_id: container.engine_id.clone(),
        status: container.status,
        cpu_percent: sample.cpu_percent,
        memory_usage_mb: sample.memory_usage_mb,
        memory_limit_mb: sample.memory_limit_mb,
        memory_percent: sample.memory_percent,
        network_rx_bytes: sample.network_rx_bytes,
        network_tx_bytes: sample.network_tx_bytes,
        network_rx_mb: round2(sample.network_rx_bytes as f64 / MIB),
        network_tx_mb: round2(sample.network_tx_bytes as f64 / MIB),
        timestamp: Utc::now().to_rfc3339(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

async fn live_sample(state: &AppState, container: &containers::Model) -> StatsSample {
    match (&container.engine_id, container.status) {
        (Some(engine_id), ContainerStatus::Running) => state.driver.sample_stats(engine_id).await,
        _ => StatsSample::default(),
    }
}

/// Live stats for every container the caller owns.
pub async fn all_container_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> CoreResult<Json<Vec<ContainerStatsOut>>> {
    let containers = ContainerDBRepo::list_owned(&state.db_conn, &user).await?;

    let mut stats = Vec::new();
    for container in &containers {
        if container.status != ContainerStatus::Running {
            continue;
        }
        let sample = live_sample(&state, container).await;
        stats.push(stats_out(container, &sample));
    }
    Ok(Json(stats))
}

/// Live stats for one container; zero-valued when it is not running.
pub async fn container_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(container_id): Path<i32>,
) -> CoreResult<Json<ContainerStatsOut>> {
    let container = ContainerDBRepo::find_visible(&state.db_conn, container_id, &user).await?;
    let sample = live_sample(&state, &container).await;
    Ok(Json(stats_out(&container, &sample)))
}

/// Aggregated monitoring view: counts, owner-wide cpu/memory totals, and one
/// snapshot per running container.
pub async fn overview(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> CoreResult<Json<MonitoringOverviewOut>> {
    let containers = ContainerDBRepo::list_owned(&state.db_conn, &user).await?;

    let total_containers = containers.len();
    let running_containers = containers
        .iter()
        .filter(|c| c.status == ContainerStatus::Running)
        .count();

    let mut stats_list = Vec::new();
    let mut total_cpu = 0.0;
    let mut total_memory = 0.0;
    for container in &containers {
        if container.status != ContainerStatus::Running {
            continue;
        }
        let sample = live_sample(&state, container).await;
        total_cpu += sample.cpu_percent;
        total_memory += sample.memory_usage_mb;
        stats_list.push(stats_out(container, &sample));
    }

    Ok(Json(MonitoringOverviewOut {
        total_containers,
        running_containers,
        stopped_containers: total_containers - running_containers,
        total_cpu_percent: round2(total_cpu),
        total_memory_usage_mb: round2(total_memory),
        containers_stats: stats_list,
    }))
}

/// Metrics in Prometheus text exposition format, one gauge series per
/// running engine-backed container. Served unauthenticated for scrapers.
pub async fn prometheus_metrics(State(state): State<AppState>) -> CoreResult<Response> {
    let containers = ContainerDBRepo::running_with_engine(&state.db_conn).await?;

    let mut series = Vec::with_capacity(containers.len());
    for container in &containers {
        let engine_id = container.engine_id.as_deref().unwrap_or_default();
        let sample = state.driver.sample_stats(engine_id).await;
        let short_id: String = engine_id.chars().take(12).collect();
        series.push((
            format!(
                "container_id=\"{}\",container_name=\"{}\",user_id=\"{}\"",
                short_id, container.name, container.user_id
            ),
            sample,
        ));
    }

    let mut body = String::new();
    render_gauge(
        &mut body,
        "container_cpu_usage_percent",
        "Container CPU usage percentage",
        series.iter().map(|(labels, s)| (labels.as_str(), s.cpu_percent)),
    );
    render_gauge(
        &mut body,
        "container_memory_usage_bytes",
        "Container memory usage in bytes",
        series.iter().map(|(labels, s)| (labels.as_str(), s.memory_usage_mb * MIB)),
    );
    render_gauge(
        &mut body,
        "container_memory_limit_bytes",
        "Container memory limit in bytes",
        series.iter().map(|(labels, s)| (labels.as_str(), s.memory_limit_mb * MIB)),
    );
    render_gauge(
        &mut body,
        "container_network_rx_bytes",
        "Container network bytes received",
        series.iter().map(|(labels, s)| (labels.as_str(), s.network_rx_bytes as f64)),
    );
    render_gauge(
        &mut body,
        "container_network_tx_bytes",
        "Container network bytes transmitted",
        series.iter().map(|(labels, s)| (labels.as_str(), s.network_tx_bytes as f64)),
    );

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

fn render_gauge<'a>(
    out: &mut String,
    name: &str,
    help: &str,
    series: impl Iterator<Item = (&'a str, f64)>,
) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
    for (labels, value) in series {
        let _ = writeln!(out, "{name}{{{labels}}} {value}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_gauge_format() {
        let mut out = String::new();
        render_gauge(
            &mut out,
            "container_cpu_usage_percent",
            "Container CPU usage percentage",
            vec![("container_id=\"abc\",container_name=\"web\",user_id=\"u1\"", 12.5)].into_iter(),
        );

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "# HELP container_cpu_usage_percent Container CPU usage percentage");
        assert_eq!(lines[1], "# TYPE container_cpu_usage_percent gauge");
        assert_eq!(
            lines[2],
            "container_cpu_usage_percent{container_id=\"abc\",container_name=\"web\",user_id=\"u1\"} 12.5"
        );
    }

    #[test]
    fn test_render_gauge_empty_series() {
        let mut out = String::new();
        render_gauge(&mut out, "g", "help", std::iter::empty());
        assert_eq!(out, "# HELP g help\n# TYPE g gauge\n");
    }
}
