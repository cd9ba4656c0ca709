mod config;
mod handlers;
pub mod middlewares;

use axum::extract::FromRef;
use axum::routing::{get, post};
use axum::{Json, Router};
pub use config::{ScalesimConfig, ScalesimConfigError};
use db_migrations::{Migrator, MigratorTrait};
use handlers::{auth, autoscaling, billing, containers, loadtest, monitoring};
use runtime::core::autoscaler::AutoscalerEngine;
use runtime::core::billing::BillingEngine;
use runtime::core::docker::DockerDriver;
use runtime::core::loadtest::LoadTestEngine;
use runtime::core::sampler::MetricSampler;
use runtime::core::scheduler::{Scheduler, SchedulerConfig};
use sea_orm::{Database, DatabaseConnection};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Application state shared across handlers.
#[derive(Clone, FromRef)]
pub struct AppState {
    /// Database connection for persisting data.
    pub db_conn: DatabaseConnection,
    /// Application configuration.
    pub config: ScalesimConfig,
    /// Container engine adapter.
    pub driver: DockerDriver,
    pub autoscaler: Arc<AutoscalerEngine>,
    pub billing: Arc<BillingEngine>,
    pub loadtester: LoadTestEngine,
}

/// Custom error type for server initialization.
#[derive(Debug, Error)]
pub enum ScalesimAppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ScalesimConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("HTTP server error: {0}")]
    Http(#[from] hyper::Error),
}

/// Starts the server and sets up the necessary connections and loops.
///
/// This function performs the following:
/// - Initializes structured logging.
/// - Loads application configuration.
/// - Connects to the database and runs migrations.
/// - Seeds provider pricing models.
/// - Starts the background scheduler (autoscaler tick + billing harvester).
/// - Sets up the Axum router and serves until a shutdown signal arrives.
pub async fn start_server() -> Result<(), ScalesimAppError> {
    tracing_subscriber::fmt::init();

    let config = ScalesimConfig::load()?;

    // Connect to the database; an unreachable store aborts startup.
    let db_conn = Database::connect(config.server.database_url.clone()).await?;
    Migrator::up(&db_conn, None).await?;

    let driver = DockerDriver::connect(&config.engine.docker_bin)
        .map_err(|e| ScalesimAppError::Runtime(e.to_string()))?;
    let sampler = MetricSampler::Engine(driver.clone());

    let autoscaler = Arc::new(AutoscalerEngine::new(db_conn.clone(), sampler.clone()));
    let billing = Arc::new(BillingEngine::new(db_conn.clone(), driver.clone()));
    billing
        .seed_pricing_models()
        .await
        .map_err(|e| ScalesimAppError::Runtime(e.to_string()))?;

    let loadtester = LoadTestEngine::new(db_conn.clone(), sampler)
        .map_err(|e| ScalesimAppError::Runtime(e.to_string()))?;

    let scheduler = Arc::new(Scheduler::new(
        autoscaler.clone(),
        billing.clone(),
        SchedulerConfig {
            autoscale_interval: config.engine.autoscale_interval,
            harvest_interval: config.engine.harvest_interval,
        },
    ));
    scheduler.start();

    let app_state = AppState {
        db_conn,
        config: config.clone(),
        driver,
        autoscaler,
        billing,
        loadtester: loadtester.clone(),
    };

    let app = router(app_state);

    let addr = SocketAddr::new(
        config
            .server
            .host
            .parse()
            .unwrap_or_else(|_| "0.0.0.0".parse().unwrap()),
        config.server.port,
    );

    info!("Server listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(scheduler, loadtester))
        .await?;

    Ok(())
}

/// Builds the application router with all routes.
fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        // Auth routes
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        // Container management routes
        .route("/containers/deploy", post(containers::deploy_container))
        .route("/containers", get(containers::list_containers))
        .route("/containers/docker/status", get(containers::docker_status))
        .route("/containers/docker/images", get(containers::docker_images))
        .route(
            "/containers/:id",
            get(containers::get_container).delete(containers::delete_container),
        )
        .route("/containers/:id/start", post(containers::start_container))
        .route("/containers/:id/stop", post(containers::stop_container))
        .route("/containers/:id/logs", get(containers::container_logs))
        // Auto-scaling routes
        .route(
            "/autoscaling/policies",
            post(autoscaling::create_policy).get(autoscaling::list_policies),
        )
        .route(
            "/autoscaling/policies/:id",
            get(autoscaling::get_policy)
                .put(autoscaling::update_policy)
                .delete(autoscaling::delete_policy),
        )
        .route("/autoscaling/policies/:id/toggle", post(autoscaling::toggle_policy))
        .route("/autoscaling/events", get(autoscaling::list_events))
        .route("/autoscaling/evaluate-now", post(autoscaling::evaluate_now))
        // Load testing routes
        .route("/loadtest/start", post(loadtest::start_test))
        .route("/loadtest/history", get(loadtest::history))
        .route(
            "/loadtest/:id",
            get(loadtest::get_test).delete(loadtest::cancel_test),
        )
        .route("/loadtest/:id/metrics", get(loadtest::test_metrics))
        .route("/loadtest/:id/metrics/stream", get(loadtest::stream_metrics))
        // Billing routes
        .route("/billing/pricing-models", get(billing::pricing_models))
        .route("/billing/real-time/calculate", post(billing::real_time_calculate))
        .route("/billing/scenario/simulate", post(billing::scenario_simulate))
        .route("/billing/usage-history/:id", get(billing::usage_history))
        // Monitoring routes
        .route("/monitoring/overview", get(monitoring::overview))
        .route("/monitoring/containers", get(monitoring::all_container_stats))
        .route("/monitoring/containers/:id", get(monitoring::container_stats))
        .route("/monitoring/metrics", get(monitoring::prometheus_metrics))
        .with_state(app_state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "name": "scalesim API", "status": "ok" }))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// Waits for ctrl-c, then cancels in-flight load tests and drains the
/// background loops before the server stops accepting connections.
async fn shutdown_signal(scheduler: Arc<Scheduler>, loadtester: LoadTestEngine) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received");
    loadtester.cancel_all();
    scheduler.shutdown().await;
}
