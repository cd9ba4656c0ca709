use crate::core::autoscaler::AutoscalerEngine;
use crate::core::billing::BillingEngine;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{error, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Autoscaler evaluation cadence.
    pub autoscale_interval: Duration,
    /// Billing usage harvest cadence.
    pub harvest_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            autoscale_interval: Duration::from_secs(30),
            harvest_interval: Duration::from_secs(60),
        }
    }
}

/// Owns the two perpetual background loops: the autoscaler tick and the
/// billing harvester. `start` spawns them; `shutdown` signals both and waits
/// a bounded grace period for them to drain.
pub struct Scheduler {
    autoscaler: Arc<AutoscalerEngine>,
    billing: Arc<BillingEngine>,
    config: SchedulerConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        autoscaler: Arc<AutoscalerEngine>,
        billing: Arc<BillingEngine>,
        config: SchedulerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            autoscaler,
            billing,
            config,
            shutdown_tx,
            shutdown_rx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns both loops. Ticks are serial per loop: a slow evaluation delays
    /// the next tick instead of overlapping it, and a failed tick is logged
    /// and never ends the loop.
    pub fn start(&self) {
        info!(
            "Starting background scheduler (autoscale every {:?}, harvest every {:?})",
            self.config.autoscale_interval, self.config.harvest_interval
        );

        let autoscaler = self.autoscaler.clone();
        let autoscale_interval = self.config.autoscale_interval;
        let mut rx = self.shutdown_rx.clone();
        let autoscale_loop = tokio::spawn(async move {
            let mut ticker =
                interval_at(Instant::now() + autoscale_interval, autoscale_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = autoscaler.evaluate_all().await {
                            error!("Autoscaler tick failed: {e}");
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
            info!("Autoscaler loop stopped");
        });

        let billing = self.billing.clone();
        let harvest_interval = self.config.harvest_interval;
        let mut rx = self.shutdown_rx.clone();
        let harvest_loop = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + harvest_interval, harvest_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = billing.collect_usage_once().await {
                            error!("Billing harvest tick failed: {e}");
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
            info!("Billing harvester loop stopped");
        });

        let mut handles = self.handles.lock().unwrap();
        handles.push(autoscale_loop);
        handles.push(harvest_loop);
    }

    /// Signals both loops and joins them within a bounded deadline.
    pub async fn shutdown(&self) {
        info!("Stopping background scheduler");
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            if timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("Background task did not stop within {SHUTDOWN_GRACE:?}");
            }
        }
    }
}
