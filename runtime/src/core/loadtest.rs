use crate::core::sampler::MetricSampler;
use crate::shared::error::{RuntimeError, RuntimeResult};
use chrono::Utc;
use dashmap::DashMap;
use db_entities::load_tests::{self, LoadTestStatus};
use db_entities::prelude::{Containers, LoadTestMetrics, LoadTests};
use db_entities::{containers, load_test_metrics};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, DatabaseConnection};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

const DRAIN_BUDGET: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(2);

/// In-memory progress counters. The dispatcher and its request tasks are the
/// only writers; the snapshot sampler reads them without locks.
#[derive(Default)]
struct Counters {
    sent: AtomicU32,
    completed: AtomicU32,
    failed: AtomicU32,
    active: AtomicI64,
}

/// Executes load tests, one spawned task per test.
///
/// Running tests are registered in `active` keyed by test id; cancelling
/// flips the test's watch channel, which stops the dispatcher and the
/// snapshot sampler.
#[derive(Clone)]
pub struct LoadTestEngine {
    db: DatabaseConnection,
    sampler: MetricSampler,
    http: reqwest::Client,
    active: Arc<DashMap<i32, watch::Sender<bool>>>,
}

impl LoadTestEngine {
    pub fn new(db: DatabaseConnection, sampler: MetricSampler) -> RuntimeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RuntimeError::Request(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            db,
            sampler,
            http,
            active: Arc::new(DashMap::new()),
        })
    }

    /// Spawns the execution task for a pending test.
    pub fn spawn(&self, test_id: i32) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.active.insert(test_id, cancel_tx);

        let engine = self.clone();
        tokio::spawn(async move {
            engine.execute(test_id, cancel_rx).await;
            engine.active.remove(&test_id);
        });
    }

    /// Signals a running test to stop. Returns false when no task is live.
    pub fn cancel(&self, test_id: i32) -> bool {
        match self.active.get(&test_id) {
            Some(tx) => tx.send(true).is_ok(),
            None => false,
        }
    }

    pub fn is_active(&self, test_id: i32) -> bool {
        self.active.contains_key(&test_id)
    }

    /// Cancels every live test; used on process shutdown.
    pub fn cancel_all(&self) {
        for entry in self.active.iter() {
            let _ = entry.value().send(true);
        }
    }

    async fn execute(&self, test_id: i32, cancel_rx: watch::Receiver<bool>) {
        let test = match LoadTests::find_by_id(test_id).one(&self.db).await {
            Ok(Some(test)) => test,
            Ok(None) => {
                error!("Load test {test_id} not found");
                return;
            }
            Err(e) => {
                error!("Failed to load test {test_id}: {e}");
                return;
            }
        };

        // Status transitions are write-once.
        if test.status != LoadTestStatus::Pending {
            warn!("Load test {test_id} is {:?}, refusing to run", test.status);
            return;
        }

        if let Err(e) = self.mark_running(test_id).await {
            error!("Failed to mark test {test_id} running: {e}");
            return;
        }

        let container = match Containers::find_by_id(test.container_id).one(&self.db).await {
            Ok(Some(container)) => container,
            Ok(None) => {
                self.mark_failed(test_id, "Container no longer exists").await;
                return;
            }
            Err(e) => {
                self.mark_failed(test_id, &format!("Store error: {e}")).await;
                return;
            }
        };

        info!(
            test_id,
            total = test.total_requests,
            concurrency = test.concurrency,
            duration_s = test.duration_seconds,
            "Load test starting"
        );

        let counters = Arc::new(Counters::default());
        let latencies: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));

        match self
            .run_test(&test, &container, counters.clone(), latencies.clone(), cancel_rx)
            .await
        {
            Ok(cancelled) => {
                let status = if cancelled {
                    LoadTestStatus::Cancelled
                } else {
                    LoadTestStatus::Completed
                };
                if let Err(e) = self.finalize(test_id, status, &counters, &latencies).await {
                    error!("Failed to finalize test {test_id}: {e}");
                }
            }
            Err(e) => {
                error!("Load test {test_id} failed: {e}");
                self.mark_failed(test_id, &e.to_string()).await;
            }
        }
    }

    /// Dispatch loop: one request per `duration / total` tick, at most
    /// `concurrency` in flight, never past the wall clock. Returns whether
    /// the run was cancelled.
    async fn run_test(
        &self,
        test: &load_tests::Model,
        container: &containers::Model,
        counters: Arc<Counters>,
        latencies: Arc<Mutex<Vec<f64>>>,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> RuntimeResult<bool> {
        let total = test.total_requests.max(0) as u32;
        let deadline = Instant::now() + Duration::from_secs(test.duration_seconds as u64);
        let tick = Duration::from_secs_f64(test.duration_seconds as f64 / test.total_requests as f64);

        let (stop_tx, stop_rx) = watch::channel(false);
        let sampler_task = tokio::spawn(snapshot_loop(
            self.db.clone(),
            self.sampler.clone(),
            container.clone(),
            test.id,
            counters.clone(),
            stop_rx,
        ));

        let semaphore = Arc::new(Semaphore::new(test.concurrency.max(1) as usize));
        let mut ticker = interval(tick);
        // A saturated dispatcher skips missed ticks instead of bursting.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut cancelled = false;
        while counters.sent.load(Ordering::Relaxed) < total {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel_rx.changed() => {
                    cancelled = *cancel_rx.borrow();
                    break;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }

            // Block for a concurrency slot, but only up to the remaining
            // wall-clock budget.
            let remaining = deadline.saturating_duration_since(now);
            let permit = tokio::select! {
                acquired = timeout(remaining, semaphore.clone().acquire_owned()) => {
                    match acquired {
                        Ok(Ok(permit)) => permit,
                        Ok(Err(_)) => break,
                        Err(_) => break,
                    }
                }
                _ = cancel_rx.changed() => {
                    cancelled = *cancel_rx.borrow();
                    break;
                }
            };

            counters.sent.fetch_add(1, Ordering::Relaxed);
            let url = test.target_url.clone();
            let http = self.http.clone();
            let counters = counters.clone();
            let latencies = latencies.clone();
            tokio::spawn(async move {
                counters.active.fetch_add(1, Ordering::Relaxed);
                let started = Instant::now();
                let ok = match http.get(&url).send().await {
                    Ok(response) => response.status().is_success(),
                    Err(_) => false,
                };
                if ok {
                    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                    latencies.lock().unwrap().push(elapsed_ms);
                } else {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }
                counters.active.fetch_sub(1, Ordering::Relaxed);
                drop(permit);
            });
        }

        // Bounded drain; whatever is still in flight afterwards is abandoned
        // and gets no credit.
        let drain_deadline = Instant::now() + DRAIN_BUDGET;
        while counters.active.load(Ordering::Relaxed) > 0 && Instant::now() < drain_deadline {
            sleep(Duration::from_millis(100)).await;
        }

        let _ = stop_tx.send(true);
        let _ = sampler_task.await;

        Ok(cancelled)
    }

    async fn mark_running(&self, test_id: i32) -> RuntimeResult<()> {
        let update = load_tests::ActiveModel {
            id: Set(test_id),
            status: Set(LoadTestStatus::Running),
            started_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        update.update(&self.db).await?;
        Ok(())
    }

    async fn mark_failed(&self, test_id: i32, message: &str) {
        let update = load_tests::ActiveModel {
            id: Set(test_id),
            status: Set(LoadTestStatus::Failed),
            error_message: Set(Some(message.to_string())),
            completed_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        if let Err(e) = update.update(&self.db).await {
            error!("Failed to mark test {test_id} failed: {e}");
        }
    }

    /// Writes the terminal row: final counters, latency aggregates over
    /// successes, and resource peaks over the collected snapshots.
    async fn finalize(
        &self,
        test_id: i32,
        status: LoadTestStatus,
        counters: &Counters,
        latencies: &Mutex<Vec<f64>>,
    ) -> RuntimeResult<()> {
        let samples = latencies.lock().unwrap().clone();
        let stats = LatencyStats::from_samples(&samples);

        let metrics = LoadTestMetrics::find()
            .filter(load_test_metrics::Column::LoadTestId.eq(test_id))
            .all(&self.db)
            .await?;
        let peak_cpu = metrics.iter().map(|m| m.cpu_percent).fold(None, fold_max);
        let peak_memory = metrics.iter().map(|m| m.memory_mb).fold(None, fold_max);

        let update = load_tests::ActiveModel {
            id: Set(test_id),
            status: Set(status),
            requests_sent: Set(counters.sent.load(Ordering::Relaxed) as i32),
            requests_completed: Set(counters.completed.load(Ordering::Relaxed) as i32),
            requests_failed: Set(counters.failed.load(Ordering::Relaxed) as i32),
            avg_response_time_ms: Set(stats.avg),
            min_response_time_ms: Set(stats.min),
            max_response_time_ms: Set(stats.max),
            peak_cpu_percent: Set(peak_cpu),
            peak_memory_mb: Set(peak_memory),
            completed_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        update.update(&self.db).await?;

        info!(
            test_id,
            ?status,
            completed = counters.completed.load(Ordering::Relaxed),
            failed = counters.failed.load(Ordering::Relaxed),
            "Load test finished"
        );
        Ok(())
    }
}

/// Snapshot sampler: every two seconds, one `load_test_metrics` row plus a
/// progress update on the test. This task is the only writer of persisted
/// progress while a test runs.
async fn snapshot_loop(
    db: DatabaseConnection,
    sampler: MetricSampler,
    container: containers::Model,
    test_id: i32,
    counters: Arc<Counters>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(SNAPSHOT_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop_rx.changed() => break,
        }

        // Sampling degrades to zero-valued readings rather than failing the
        // test when the driver is unhappy.
        let reading = sampler.sample(&container).await;

        let snapshot = load_test_metrics::ActiveModel {
            load_test_id: Set(test_id),
            timestamp: Set(Utc::now()),
            cpu_percent: Set(reading.cpu_percent),
            memory_mb: Set(reading.memory_mb),
            requests_completed: Set(counters.completed.load(Ordering::Relaxed) as i32),
            requests_failed: Set(counters.failed.load(Ordering::Relaxed) as i32),
            active_requests: Set(counters.active.load(Ordering::Relaxed) as i32),
            ..Default::default()
        };
        if let Err(e) = snapshot.insert(&db).await {
            warn!("Failed to persist snapshot for test {test_id}: {e}");
        }

        let progress = load_tests::ActiveModel {
            id: Set(test_id),
            requests_sent: Set(counters.sent.load(Ordering::Relaxed) as i32),
            requests_completed: Set(counters.completed.load(Ordering::Relaxed) as i32),
            requests_failed: Set(counters.failed.load(Ordering::Relaxed) as i32),
            ..Default::default()
        };
        if let Err(e) = progress.update(&db).await {
            warn!("Failed to update progress for test {test_id}: {e}");
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct LatencyStats {
    avg: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

impl LatencyStats {
    fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let sum: f64 = samples.iter().sum();
        Self {
            avg: Some(sum / samples.len() as f64),
            min: samples.iter().copied().fold(None, fold_min),
            max: samples.iter().copied().fold(None, fold_max),
        }
    }
}

fn fold_max(acc: Option<f64>, value: f64) -> Option<f64> {
    Some(match acc {
        Some(current) => current.max(value),
        None => value,
    })
}

fn fold_min(acc: Option<f64>, value: f64) -> Option<f64> {
    Some(match acc {
        Some(current) => current.min(value),
        None => value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_stats_empty() {
        assert_eq!(LatencyStats::from_samples(&[]), LatencyStats::default());
    }

    #[test]
    fn test_latency_stats_aggregates() {
        let stats = LatencyStats::from_samples(&[10.0, 20.0, 60.0]);
        assert_eq!(stats.avg, Some(30.0));
        assert_eq!(stats.min, Some(10.0));
        assert_eq!(stats.max, Some(60.0));
    }

    #[test]
    fn test_dispatch_interval_spacing() {
        // 200 requests over 20 seconds: one dispatch every 100ms.
        let tick = Duration::from_secs_f64(20.0 / 200.0);
        assert_eq!(tick, Duration::from_millis(100));

        // 1000 requests over 300 seconds: 3.33 req/s.
        let tick = Duration::from_secs_f64(300.0 / 1000.0);
        assert!((tick.as_secs_f64() - 0.3).abs() < 1e-9);

        // A single request over 10 seconds waits the whole window at most.
        let tick = Duration::from_secs_f64(10.0 / 1.0);
        assert_eq!(tick, Duration::from_secs(10));
    }

    #[test]
    fn test_counters_accounting_bounds() {
        let counters = Counters::default();
        counters.sent.store(10, Ordering::Relaxed);
        counters.completed.store(6, Ordering::Relaxed);
        counters.failed.store(3, Ordering::Relaxed);

        let sent = counters.sent.load(Ordering::Relaxed);
        let done = counters.completed.load(Ordering::Relaxed) + counters.failed.load(Ordering::Relaxed);
        assert!(done <= sent);
    }
}
