use crate::core::docker::DockerDriver;
use crate::core::stats::StatsSample;
use crate::shared::error::RuntimeResult;
use chrono::{DateTime, Duration, Utc};
use db_entities::billing_snapshots;
use db_entities::containers::{self, ContainerStatus};
use db_entities::pricing_models::{self, PricingProvider};
use db_entities::prelude::{BillingSnapshots, Containers, PricingModels, ResourceUsage};
use db_entities::resource_usage;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, DatabaseConnection, QueryOrder};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info};

/// Storage is billed monthly; a month is fixed at 730 hours.
pub const HOURS_PER_MONTH: f64 = 730.0;

/// Rate table for one provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderRates {
    pub cpu_per_hour: f64,
    pub memory_per_gb_hour: f64,
    pub storage_per_gb_month: f64,
    pub storage_ssd_per_gb_month: Option<f64>,
    pub storage_hdd_per_gb_month: Option<f64>,
}

/// Fallback rates used when a provider row is missing from the store. Also
/// the values seeded at startup.
pub fn default_rates(provider: PricingProvider) -> ProviderRates {
    match provider {
        PricingProvider::Aws => ProviderRates {
            cpu_per_hour: 0.05,
            memory_per_gb_hour: 0.01,
            storage_per_gb_month: 0.08,
            storage_ssd_per_gb_month: Some(0.08),
            storage_hdd_per_gb_month: Some(0.045),
        },
        PricingProvider::Gcp => ProviderRates {
            cpu_per_hour: 0.0335,
            memory_per_gb_hour: 0.0045,
            storage_per_gb_month: 0.10,
            storage_ssd_per_gb_month: Some(0.17),
            storage_hdd_per_gb_month: Some(0.04),
        },
        PricingProvider::Azure => ProviderRates {
            cpu_per_hour: 0.048,
            memory_per_gb_hour: 0.0062,
            storage_per_gb_month: 0.10,
            storage_ssd_per_gb_month: Some(0.143),
            storage_hdd_per_gb_month: Some(0.05),
        },
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CostBreakdown {
    pub cpu_cost: f64,
    pub memory_cost: f64,
    pub storage_cost: f64,
    pub total_cost: f64,
    pub provider: String,
}

/// Applies the cost formula: cpu and memory hourly, storage prorated against
/// the 730-hour month. All figures rounded to 4 decimal places.
pub fn calculate_cost(
    rates: &ProviderRates,
    provider: PricingProvider,
    cpu_cores: f64,
    memory_gb: f64,
    storage_gb: f64,
    duration_hours: f64,
) -> CostBreakdown {
    let cpu_cost = cpu_cores * duration_hours * rates.cpu_per_hour;
    let memory_cost = memory_gb * duration_hours * rates.memory_per_gb_hour;
    let month_fraction = duration_hours / HOURS_PER_MONTH;
    let storage_cost = storage_gb * month_fraction * rates.storage_per_gb_month;
    let total_cost = cpu_cost + memory_cost + storage_cost;

    CostBreakdown {
        cpu_cost: round4(cpu_cost),
        memory_cost: round4(memory_cost),
        storage_cost: round4(storage_cost),
        total_cost: round4(total_cost),
        provider: provider.as_str().to_string(),
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Clone, Serialize)]
pub struct AverageUsage {
    pub cpu_cores: f64,
    pub memory_gb: f64,
    pub storage_gb: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealTimeBilling {
    pub container_id: i32,
    pub time_range: serde_json::Value,
    pub average_usage: AverageUsage,
    pub costs: CostBreakdown,
    pub usage_history: Vec<resource_usage::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioCost {
    pub scenario: serde_json::Value,
    pub costs: CostBreakdown,
    pub cost_breakdown: serde_json::Value,
}

/// Accumulates resource usage and projects cost under provider rate tables.
pub struct BillingEngine {
    db: DatabaseConnection,
    driver: DockerDriver,
}

impl BillingEngine {
    pub fn new(db: DatabaseConnection, driver: DockerDriver) -> Self {
        Self { db, driver }
    }

    /// Inserts the default rate row for every provider that has none yet.
    /// Safe to call on every startup.
    pub async fn seed_pricing_models(&self) -> RuntimeResult<()> {
        for provider in [PricingProvider::Aws, PricingProvider::Gcp, PricingProvider::Azure] {
            let existing = PricingModels::find()
                .filter(pricing_models::Column::ProviderName.eq(provider))
                .one(&self.db)
                .await?;
            if existing.is_some() {
                continue;
            }

            let rates = default_rates(provider);
            let row = pricing_models::ActiveModel {
                provider_name: Set(provider),
                cpu_per_hour: Set(rates.cpu_per_hour),
                memory_per_gb_hour: Set(rates.memory_per_gb_hour),
                storage_per_gb_month: Set(rates.storage_per_gb_month),
                storage_ssd_per_gb_month: Set(rates.storage_ssd_per_gb_month),
                storage_hdd_per_gb_month: Set(rates.storage_hdd_per_gb_month),
                updated_at: Set(Utc::now()),
                ..Default::default()
            };
            row.insert(&self.db).await?;
        }
        info!("Pricing models initialized");
        Ok(())
    }

    pub async fn pricing_models(&self) -> RuntimeResult<Vec<pricing_models::Model>> {
        Ok(PricingModels::find().all(&self.db).await?)
    }

    /// Rates for a provider, falling back to the default table on a missing
    /// row.
    pub async fn rates_for(&self, provider: PricingProvider) -> ProviderRates {
        match PricingModels::find()
            .filter(pricing_models::Column::ProviderName.eq(provider))
            .one(&self.db)
            .await
        {
            Ok(Some(row)) => ProviderRates {
                cpu_per_hour: row.cpu_per_hour,
                memory_per_gb_hour: row.memory_per_gb_hour,
                storage_per_gb_month: row.storage_per_gb_month,
                storage_ssd_per_gb_month: row.storage_ssd_per_gb_month,
                storage_hdd_per_gb_month: row.storage_hdd_per_gb_month,
            },
            Ok(None) => default_rates(provider),
            Err(e) => {
                error!("Failed to read pricing model for {provider:?}: {e}");
                default_rates(provider)
            }
        }
    }

    /// One harvester pass: samples every running container that has an
    /// engine handle and appends a usage row for each. Returns how many rows
    /// were written.
    pub async fn collect_usage_once(&self) -> RuntimeResult<usize> {
        let running = Containers::find()
            .filter(containers::Column::Status.eq(ContainerStatus::Running))
            .all(&self.db)
            .await?;

        let mut collected = 0;
        for container in running {
            let Some(engine_id) = container.engine_id.as_deref() else {
                continue;
            };
            let sample = self.driver.sample_stats(engine_id).await;
            if let Err(e) = self.save_resource_usage(&container, &sample).await {
                error!("Failed to save usage for container {}: {e}", container.id);
                continue;
            }
            collected += 1;
        }

        if collected > 0 {
            info!("Collected billing metrics for {collected} containers");
        }
        Ok(collected)
    }

    async fn save_resource_usage(
        &self,
        container: &containers::Model,
        sample: &StatsSample,
    ) -> RuntimeResult<resource_usage::Model> {
        let memory_gb = sample.memory_usage_mb / 1024.0;
        let row = resource_usage::ActiveModel {
            container_id: Set(container.id),
            timestamp: Set(Utc::now()),
            cpu_percent: Set(sample.cpu_percent),
            cpu_cores_used: Set(sample.cpu_percent / 100.0),
            memory_mb: Set(sample.memory_usage_mb),
            memory_gb: Set(memory_gb),
            // Allocated storage approximated from the memory limit until the
            // engine reports per-container disk usage.
            storage_gb: Set(container.memory_limit as f64 / 1024.0),
            network_rx_bytes: Set(sample.network_rx_bytes as i64),
            network_tx_bytes: Set(sample.network_tx_bytes as i64),
            ..Default::default()
        };
        Ok(row.insert(&self.db).await?)
    }

    pub async fn usage_history(
        &self,
        container_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RuntimeResult<Vec<resource_usage::Model>> {
        Ok(ResourceUsage::find()
            .filter(resource_usage::Column::ContainerId.eq(container_id))
            .filter(resource_usage::Column::Timestamp.gte(start))
            .filter(resource_usage::Column::Timestamp.lte(end))
            .order_by_asc(resource_usage::Column::Timestamp)
            .all(&self.db)
            .await?)
    }

    /// Costs a container over `[now - hours_back, now]` from recorded usage:
    /// cores and memory averaged over the window, storage from the latest
    /// sample. `None` when the window holds no samples.
    pub async fn real_time_billing(
        &self,
        container_id: i32,
        hours_back: f64,
        provider: PricingProvider,
    ) -> RuntimeResult<Option<RealTimeBilling>> {
        let end = Utc::now();
        let start = end - Duration::milliseconds((hours_back * 3_600_000.0) as i64);

        let records = self.usage_history(container_id, start, end).await?;
        if records.is_empty() {
            debug!("No usage data for container {container_id} in the last {hours_back}h");
            return Ok(None);
        }

        let count = records.len() as f64;
        let avg_cpu_cores = records.iter().map(|u| u.cpu_cores_used).sum::<f64>() / count;
        let avg_memory_gb = records.iter().map(|u| u.memory_gb).sum::<f64>() / count;
        let storage_gb = records.last().map(|u| u.storage_gb).unwrap_or(0.0);

        let rates = self.rates_for(provider).await;
        let costs = calculate_cost(
            &rates,
            provider,
            avg_cpu_cores,
            avg_memory_gb,
            storage_gb,
            hours_back,
        );

        Ok(Some(RealTimeBilling {
            container_id,
            time_range: json!({
                "start": start,
                "end": end,
                "hours": hours_back,
            }),
            average_usage: AverageUsage {
                cpu_cores: round3(avg_cpu_cores),
                memory_gb: round3(avg_memory_gb),
                storage_gb: (storage_gb * 100.0).round() / 100.0,
            },
            costs,
            usage_history: records,
        }))
    }

    /// Stateless what-if costing with printable rate strings.
    pub async fn simulate_scenario(
        &self,
        cpu_cores: f64,
        memory_gb: f64,
        storage_gb: f64,
        duration_hours: f64,
        provider: PricingProvider,
    ) -> ScenarioCost {
        let rates = self.rates_for(provider).await;
        let costs = calculate_cost(&rates, provider, cpu_cores, memory_gb, storage_gb, duration_hours);

        ScenarioCost {
            scenario: json!({
                "cpu_cores": cpu_cores,
                "memory_gb": memory_gb,
                "storage_gb": storage_gb,
                "duration_hours": duration_hours,
            }),
            cost_breakdown: json!({
                "cpu": {
                    "usage": format!("{cpu_cores} cores × {duration_hours} hours"),
                    "rate": format!("${}/hour per core", rates.cpu_per_hour),
                    "cost": costs.cpu_cost,
                },
                "memory": {
                    "usage": format!("{memory_gb} GB × {duration_hours} hours"),
                    "rate": format!("${}/hour per GB", rates.memory_per_gb_hour),
                    "cost": costs.memory_cost,
                },
                "storage": {
                    "usage": format!("{storage_gb} GB × {:.2} months", duration_hours / HOURS_PER_MONTH),
                    "rate": format!("${}/month per GB", rates.storage_per_gb_month),
                    "cost": costs.storage_cost,
                },
            }),
            costs,
        }
    }

    /// Computes and persists a cost breakdown for one window.
    pub async fn create_billing_snapshot(
        &self,
        container_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        provider: PricingProvider,
    ) -> RuntimeResult<Option<billing_snapshots::Model>> {
        let hours = (end - start).num_seconds() as f64 / 3600.0;
        let Some(billing) = self.real_time_billing(container_id, hours, provider).await? else {
            return Ok(None);
        };

        let row = billing_snapshots::ActiveModel {
            container_id: Set(container_id),
            provider: Set(provider),
            start_time: Set(start),
            end_time: Set(end),
            cpu_cost: Set(billing.costs.cpu_cost),
            memory_cost: Set(billing.costs.memory_cost),
            storage_cost: Set(billing.costs.storage_cost),
            total_cost: Set(billing.costs.total_cost),
            usage_data: Set(serde_json::to_value(&billing).ok()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        Ok(Some(row.insert(&self.db).await?))
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_cost_matches_formula() {
        // 2 cores, 4 GB, 50 GB for 10 hours on the aws defaults.
        let rates = default_rates(PricingProvider::Aws);
        let costs = calculate_cost(&rates, PricingProvider::Aws, 2.0, 4.0, 50.0, 10.0);

        assert!((costs.cpu_cost - 1.0).abs() < 1e-4);
        assert!((costs.memory_cost - 0.4).abs() < 1e-4);
        assert!((costs.storage_cost - 50.0 * (10.0 / 730.0) * 0.08).abs() < 1e-4);
        assert!((costs.total_cost - 1.4548).abs() < 1e-4);
        assert_eq!(costs.provider, "aws");
    }

    #[test]
    fn test_cost_is_rounded_to_four_decimals() {
        let rates = default_rates(PricingProvider::Gcp);
        let costs = calculate_cost(&rates, PricingProvider::Gcp, 0.333, 0.777, 3.33, 1.5);

        for value in [costs.cpu_cost, costs.memory_cost, costs.storage_cost, costs.total_cost] {
            assert!((value * 10_000.0).fract().abs() < 1e-9, "{value} not rounded");
        }
    }

    #[test]
    fn test_zero_duration_costs_nothing() {
        let rates = default_rates(PricingProvider::Azure);
        let costs = calculate_cost(&rates, PricingProvider::Azure, 4.0, 8.0, 100.0, 0.0);
        assert_eq!(costs.total_cost, 0.0);
    }

    #[test]
    fn test_default_rates_table() {
        let aws = default_rates(PricingProvider::Aws);
        assert_eq!(aws.cpu_per_hour, 0.05);
        assert_eq!(aws.memory_per_gb_hour, 0.01);
        assert_eq!(aws.storage_per_gb_month, 0.08);

        let gcp = default_rates(PricingProvider::Gcp);
        assert_eq!(gcp.cpu_per_hour, 0.0335);

        let azure = default_rates(PricingProvider::Azure);
        assert_eq!(azure.memory_per_gb_hour, 0.0062);
    }
}
