use crate::core::docker::DockerDriver;
use db_entities::containers::{self, DeploymentType};
use rand::Rng;

/// One metric observation for a container, in the units the control loops
/// consume.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricReading {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_mb: f64,
}

/// Source of container metrics for the autoscaler and load-test engines.
///
/// `Engine` samples the driver for live containers and falls back to
/// synthesized values for simulated deployments (and records without an
/// engine handle), which lets scaling demos run without a real workload.
/// `Fixed` pins deterministic readings for tests.
#[derive(Clone)]
pub enum MetricSampler {
    Engine(DockerDriver),
    Simulated,
    Fixed(MetricReading),
}

impl MetricSampler {
    pub async fn sample(&self, container: &containers::Model) -> MetricReading {
        match self {
            MetricSampler::Fixed(reading) => *reading,
            MetricSampler::Simulated => simulated_reading(container.memory_limit),
            MetricSampler::Engine(driver) => {
                let engine_id = match &container.engine_id {
                    Some(id) if container.deployment_type != DeploymentType::Simulated => id,
                    _ => return simulated_reading(container.memory_limit),
                };
                let sample = driver.sample_stats(engine_id).await;
                MetricReading {
                    cpu_percent: sample.cpu_percent,
                    memory_percent: sample.memory_percent,
                    memory_mb: sample.memory_usage_mb,
                }
            }
        }
    }
}

/// Synthesizes a plausible idle-ish reading: cpu in [3, 15] percent, memory
/// in [10, 30] percent of the container's limit.
pub fn simulated_reading(memory_limit_mb: i32) -> MetricReading {
    let mut rng = rand::thread_rng();
    let cpu_percent: f64 = rng.gen_range(3.0..=15.0);
    let memory_percent: f64 = rng.gen_range(10.0..=30.0);
    MetricReading {
        cpu_percent: round2(cpu_percent),
        memory_percent: round2(memory_percent),
        memory_mb: round2(memory_percent / 100.0 * memory_limit_mb as f64),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_reading_ranges() {
        for _ in 0..200 {
            let reading = simulated_reading(512);
            assert!((3.0..=15.0).contains(&reading.cpu_percent));
            assert!((10.0..=30.0).contains(&reading.memory_percent));
            assert!(reading.memory_mb >= 0.1 * 512.0 - 1.0);
            assert!(reading.memory_mb <= 0.3 * 512.0 + 1.0);
        }
    }

    #[tokio::test]
    async fn test_fixed_sampler_is_deterministic() {
        let pinned = MetricReading {
            cpu_percent: 42.0,
            memory_percent: 21.0,
            memory_mb: 107.5,
        };
        let sampler = MetricSampler::Fixed(pinned);
        let container = test_container();

        assert_eq!(sampler.sample(&container).await, pinned);
        assert_eq!(sampler.sample(&container).await, pinned);
    }

    fn test_container() -> containers::Model {
        use chrono::Utc;
        use db_entities::containers::ContainerStatus;

        containers::Model {
            id: 1,
            user_id: uuid::Uuid::new_v4(),
            name: "demo".to_string(),
            image: Some("nginx:latest".to_string()),
            status: ContainerStatus::Running,
            port: Some(3000),
            cpu_limit: 500,
            memory_limit: 512,
            environment_vars: None,
            deployment_type: DeploymentType::Simulated,
            source_url: None,
            build_status: None,
            engine_id: None,
            localhost_url: None,
            parent_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: Some(Utc::now()),
            stopped_at: None,
        }
    }
}
