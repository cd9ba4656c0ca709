use crate::core::sampler::{MetricReading, MetricSampler};
use crate::shared::error::RuntimeResult;
use crate::shared::utils::replica_name;
use chrono::{DateTime, Utc};
use db_entities::containers::{self, ContainerStatus};
use db_entities::prelude::{Containers, ScalingPolicies};
use db_entities::scaling_events::{self, ScalingAction, ScalingTrigger};
use db_entities::scaling_policies;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, DatabaseConnection, DatabaseTransaction, QueryOrder, TransactionTrait};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One scaling decision produced by [`decide`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub action: ScalingAction,
    pub trigger: ScalingTrigger,
    pub metric_value: f64,
}

/// Pure decision core. Scale-up is considered before scale-down, cpu before
/// memory (cpu wins when both thresholds trip). Both directions require the
/// policy to be enabled, replicas inside the configured bounds, and the
/// cooldown to have elapsed; a never-scaled policy always passes cooldown.
pub fn decide(
    policy: &scaling_policies::Model,
    reading: &MetricReading,
    current_replicas: i32,
    now: DateTime<Utc>,
) -> Option<Decision> {
    if !policy.enabled {
        return None;
    }

    if let Some(last) = policy.last_scaled_at {
        if (now - last).num_seconds() < policy.cooldown_seconds as i64 {
            return None;
        }
    }

    if current_replicas < policy.max_replicas {
        if reading.cpu_percent >= policy.scale_up_cpu_threshold {
            return Some(Decision {
                action: ScalingAction::ScaleUp,
                trigger: ScalingTrigger::Cpu,
                metric_value: reading.cpu_percent,
            });
        }
        if reading.memory_percent >= policy.scale_up_memory_threshold {
            return Some(Decision {
                action: ScalingAction::ScaleUp,
                trigger: ScalingTrigger::Memory,
                metric_value: reading.memory_percent,
            });
        }
    }

    if current_replicas > policy.min_replicas
        && reading.cpu_percent < policy.scale_down_cpu_threshold
        && reading.memory_percent < policy.scale_down_memory_threshold
    {
        return Some(Decision {
            action: ScalingAction::ScaleDown,
            trigger: ScalingTrigger::BothLow,
            metric_value: reading.cpu_percent.min(reading.memory_percent),
        });
    }

    None
}

/// Evaluates scaling policies and applies decisions to the store.
///
/// Constructed with a store handle and a metric sampler; owns no other
/// state. One evaluation pass walks policies serially, and a fault in one
/// policy never aborts the pass.
pub struct AutoscalerEngine {
    db: DatabaseConnection,
    sampler: MetricSampler,
}

impl AutoscalerEngine {
    pub fn new(db: DatabaseConnection, sampler: MetricSampler) -> Self {
        Self { db, sampler }
    }

    /// Evaluates every enabled policy. Called by the scheduler tick.
    pub async fn evaluate_all(&self) -> RuntimeResult<usize> {
        let policies = ScalingPolicies::find()
            .filter(scaling_policies::Column::Enabled.eq(true))
            .all(&self.db)
            .await?;

        info!("Evaluating {} active scaling policies", policies.len());
        for policy in &policies {
            if let Err(e) = self.evaluate_policy(policy).await {
                error!("Failed to evaluate policy {}: {e}", policy.id);
            }
        }
        Ok(policies.len())
    }

    /// Evaluates the enabled policies owned by one user (manual trigger).
    pub async fn evaluate_for_user(&self, user_id: Uuid) -> RuntimeResult<usize> {
        let policies = ScalingPolicies::find()
            .filter(scaling_policies::Column::UserId.eq(user_id))
            .filter(scaling_policies::Column::Enabled.eq(true))
            .all(&self.db)
            .await?;

        for policy in &policies {
            if let Err(e) = self.evaluate_policy(policy).await {
                error!("Failed to evaluate policy {}: {e}", policy.id);
            }
        }
        Ok(policies.len())
    }

    async fn evaluate_policy(&self, policy: &scaling_policies::Model) -> RuntimeResult<()> {
        let Some(container) = Containers::find_by_id(policy.container_id).one(&self.db).await?
        else {
            debug!("Container {} for policy {} is gone", policy.container_id, policy.id);
            return Ok(());
        };

        let reading = self.sampler.sample(&container).await;
        let current_replicas = self.running_replica_count(&container).await?;

        match decide(policy, &reading, current_replicas, Utc::now()) {
            Some(decision) if decision.action == ScalingAction::ScaleUp => {
                info!(
                    "Scaling up container {} ({:?}={:.2})",
                    container.id, decision.trigger, decision.metric_value
                );
                self.scale_up(policy, &container, current_replicas, decision).await
            }
            Some(decision) => {
                info!(
                    "Scaling down container {} (cpu={:.2}, mem={:.2})",
                    container.id, reading.cpu_percent, reading.memory_percent
                );
                self.scale_down(policy, &container, current_replicas, decision).await
            }
            None => {
                debug!("No scaling action needed for container {}", container.id);
                Ok(())
            }
        }
    }

    /// Running replicas of a container: the parent itself plus its running
    /// children.
    async fn running_replica_count(&self, container: &containers::Model) -> RuntimeResult<i32> {
        let children = Containers::find()
            .filter(containers::Column::ParentId.eq(container.id))
            .filter(containers::Column::Status.eq(ContainerStatus::Running))
            .count(&self.db)
            .await? as i32;

        let this = if container.status == ContainerStatus::Running {
            1
        } else {
            0
        };
        Ok(children + this)
    }

    /// Creates one replica record, appends the audit event, and stamps the
    /// policy cooldown — all in one transaction.
    async fn scale_up(
        &self,
        policy: &scaling_policies::Model,
        parent: &containers::Model,
        current_replicas: i32,
        decision: Decision,
    ) -> RuntimeResult<()> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let replica = containers::ActiveModel {
            user_id: Set(parent.user_id),
            name: Set(replica_name(&parent.name, current_replicas)),
            image: Set(parent.image.clone()),
            status: Set(ContainerStatus::Pending),
            port: Set(parent.port.map(|p| p + current_replicas)),
            cpu_limit: Set(parent.cpu_limit),
            memory_limit: Set(parent.memory_limit),
            environment_vars: Set(parent.environment_vars.clone()),
            deployment_type: Set(parent.deployment_type),
            parent_id: Set(Some(parent.id)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        replica.insert(&txn).await?;

        record_event(&txn, policy, decision, current_replicas, current_replicas + 1).await?;
        stamp_policy(&txn, policy, now).await?;

        txn.commit().await?;
        info!(
            "Scaled up container {}: {} -> {}",
            parent.id,
            current_replicas,
            current_replicas + 1
        );
        Ok(())
    }

    /// Stops the newest running replica, appends the audit event, and stamps
    /// the policy cooldown — all in one transaction.
    async fn scale_down(
        &self,
        policy: &scaling_policies::Model,
        parent: &containers::Model,
        current_replicas: i32,
        decision: Decision,
    ) -> RuntimeResult<()> {
        let Some(replica) = Containers::find()
            .filter(containers::Column::ParentId.eq(parent.id))
            .filter(containers::Column::Status.eq(ContainerStatus::Running))
            .order_by_desc(containers::Column::CreatedAt)
            .one(&self.db)
            .await?
        else {
            warn!("No replicas found to scale down for container {}", parent.id);
            return Ok(());
        };

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let mut victim: containers::ActiveModel = replica.into();
        victim.status = Set(ContainerStatus::Stopped);
        victim.stopped_at = Set(Some(now));
        victim.updated_at = Set(now);
        victim.update(&txn).await?;

        record_event(&txn, policy, decision, current_replicas, current_replicas - 1).await?;
        stamp_policy(&txn, policy, now).await?;

        txn.commit().await?;
        info!(
            "Scaled down container {}: {} -> {}",
            parent.id,
            current_replicas,
            current_replicas - 1
        );
        Ok(())
    }
}

async fn record_event(
    txn: &DatabaseTransaction,
    policy: &scaling_policies::Model,
    decision: Decision,
    before: i32,
    after: i32,
) -> RuntimeResult<()> {
    let event = scaling_events::ActiveModel {
        policy_id: Set(policy.id),
        container_id: Set(policy.container_id),
        action: Set(decision.action),
        trigger_metric: Set(decision.trigger),
        metric_value: Set(decision.metric_value),
        replicas_before: Set(before),
        replicas_after: Set(after),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    event.insert(txn).await?;
    Ok(())
}

async fn stamp_policy(
    txn: &DatabaseTransaction,
    policy: &scaling_policies::Model,
    now: DateTime<Utc>,
) -> RuntimeResult<()> {
    let mut active: scaling_policies::ActiveModel = policy.clone().into();
    active.last_scaled_at = Set(Some(now));
    active.updated_at = Set(Some(now));
    active.update(txn).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_policy() -> scaling_policies::Model {
        scaling_policies::Model {
            id: 1,
            container_id: 1,
            user_id: Uuid::new_v4(),
            enabled: true,
            scale_up_cpu_threshold: 80.0,
            scale_up_memory_threshold: 80.0,
            scale_down_cpu_threshold: 30.0,
            scale_down_memory_threshold: 30.0,
            min_replicas: 1,
            max_replicas: 8,
            cooldown_seconds: 300,
            evaluation_seconds: 60,
            last_scaled_at: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn reading(cpu: f64, mem: f64) -> MetricReading {
        MetricReading {
            cpu_percent: cpu,
            memory_percent: mem,
            memory_mb: mem * 5.12,
        }
    }

    #[test]
    fn test_scale_up_on_cpu() {
        let decision = decide(&test_policy(), &reading(92.0, 40.0), 1, Utc::now()).unwrap();
        assert_eq!(decision.action, ScalingAction::ScaleUp);
        assert_eq!(decision.trigger, ScalingTrigger::Cpu);
        assert_eq!(decision.metric_value, 92.0);
    }

    #[test]
    fn test_scale_up_on_memory() {
        let decision = decide(&test_policy(), &reading(40.0, 85.0), 1, Utc::now()).unwrap();
        assert_eq!(decision.action, ScalingAction::ScaleUp);
        assert_eq!(decision.trigger, ScalingTrigger::Memory);
    }

    #[test]
    fn test_cpu_wins_when_both_thresholds_trip() {
        let decision = decide(&test_policy(), &reading(95.0, 95.0), 1, Utc::now()).unwrap();
        assert_eq!(decision.trigger, ScalingTrigger::Cpu);
    }

    #[test]
    fn test_scale_down_requires_both_low() {
        let policy = test_policy();

        let decision = decide(&policy, &reading(10.0, 12.0), 3, Utc::now()).unwrap();
        assert_eq!(decision.action, ScalingAction::ScaleDown);
        assert_eq!(decision.trigger, ScalingTrigger::BothLow);
        assert_eq!(decision.metric_value, 10.0);

        // Memory still hot: no action.
        assert!(decide(&policy, &reading(10.0, 50.0), 3, Utc::now()).is_none());
    }

    #[test]
    fn test_replica_bounds() {
        let policy = test_policy();

        // At max replicas a hot container stays put.
        assert!(decide(&policy, &reading(99.0, 99.0), 8, Utc::now()).is_none());

        // At min replicas a cold container stays put.
        assert!(decide(&policy, &reading(1.0, 1.0), 1, Utc::now()).is_none());
    }

    #[test]
    fn test_min_equals_max_never_scales() {
        let mut policy = test_policy();
        policy.min_replicas = 1;
        policy.max_replicas = 1;

        assert!(decide(&policy, &reading(99.0, 99.0), 1, Utc::now()).is_none());
        assert!(decide(&policy, &reading(1.0, 1.0), 1, Utc::now()).is_none());
    }

    #[test]
    fn test_cooldown_blocks_and_elapses() {
        let now = Utc::now();
        let mut policy = test_policy();

        policy.last_scaled_at = Some(now - Duration::seconds(30));
        assert!(decide(&policy, &reading(99.0, 99.0), 1, now).is_none());

        policy.last_scaled_at = Some(now - Duration::seconds(300));
        assert!(decide(&policy, &reading(99.0, 99.0), 1, now).is_some());

        // Never-scaled policies always pass cooldown.
        policy.last_scaled_at = None;
        assert!(decide(&policy, &reading(99.0, 99.0), 1, now).is_some());
    }

    #[test]
    fn test_disabled_policy_never_scales() {
        let mut policy = test_policy();
        policy.enabled = false;
        assert!(decide(&policy, &reading(99.0, 99.0), 1, Utc::now()).is_none());
    }
}
