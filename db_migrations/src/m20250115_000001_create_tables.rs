use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Users::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Users::Email).string_len(255).not_null())
                    .col(ColumnDef::new(Users::PasswordHash).string_len(255).not_null())
                    .col(ColumnDef::new(Users::Role).string_len(20).not_null())
                    .col(ColumnDef::new(Users::Verified).boolean().not_null().default(false))
                    .col(ColumnDef::new(Users::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Users::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_users_email")
                    .table(Users::Table)
                    .col(Users::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Containers::Table)
                    .col(
                        ColumnDef::new(Containers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Containers::UserId).uuid().not_null())
                    .col(ColumnDef::new(Containers::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Containers::Image).string_len(255))
                    .col(ColumnDef::new(Containers::Status).string_len(20).not_null())
                    .col(ColumnDef::new(Containers::Port).integer())
                    .col(ColumnDef::new(Containers::CpuLimit).integer().not_null().default(500))
                    .col(ColumnDef::new(Containers::MemoryLimit).integer().not_null().default(512))
                    .col(ColumnDef::new(Containers::EnvironmentVars).json_binary())
                    .col(ColumnDef::new(Containers::DeploymentType).string_len(20).not_null())
                    .col(ColumnDef::new(Containers::SourceUrl).text())
                    .col(ColumnDef::new(Containers::BuildStatus).string_len(20))
                    .col(ColumnDef::new(Containers::EngineId).string_len(255))
                    .col(ColumnDef::new(Containers::LocalhostUrl).string_len(500))
                    .col(ColumnDef::new(Containers::ParentId).integer())
                    .col(ColumnDef::new(Containers::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Containers::UpdatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Containers::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Containers::StoppedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_containers_user")
                            .from(Containers::Table, Containers::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_containers_parent")
                            .from(Containers::Table, Containers::ParentId)
                            .to(Containers::Table, Containers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Port allocation relies on this index to arbitrate concurrent
        // read-modify-write races; NULL ports do not collide.
        manager
            .create_index(
                Index::create()
                    .name("uq_containers_port")
                    .table(Containers::Table)
                    .col(Containers::Port)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_containers_user_name")
                    .table(Containers::Table)
                    .col(Containers::UserId)
                    .col(Containers::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_containers_parent")
                    .table(Containers::Table)
                    .col(Containers::ParentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ScalingPolicies::Table)
                    .col(
                        ColumnDef::new(ScalingPolicies::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScalingPolicies::ContainerId).integer().not_null())
                    .col(ColumnDef::new(ScalingPolicies::UserId).uuid().not_null())
                    .col(ColumnDef::new(ScalingPolicies::Enabled).boolean().not_null().default(true))
                    .col(
                        ColumnDef::new(ScalingPolicies::ScaleUpCpuThreshold)
                            .double()
                            .not_null()
                            .default(80.0),
                    )
                    .col(
                        ColumnDef::new(ScalingPolicies::ScaleUpMemoryThreshold)
                            .double()
                            .not_null()
                            .default(80.0),
                    )
                    .col(
                        ColumnDef::new(ScalingPolicies::ScaleDownCpuThreshold)
                            .double()
                            .not_null()
                            .default(30.0),
                    )
                    .col(
                        ColumnDef::new(ScalingPolicies::ScaleDownMemoryThreshold)
                            .double()
                            .not_null()
                            .default(30.0),
                    )
                    .col(ColumnDef::new(ScalingPolicies::MinReplicas).integer().not_null().default(1))
                    .col(ColumnDef::new(ScalingPolicies::MaxReplicas).integer().not_null().default(8))
                    .col(
                        ColumnDef::new(ScalingPolicies::CooldownSeconds)
                            .integer()
                            .not_null()
                            .default(300),
                    )
                    .col(
                        ColumnDef::new(ScalingPolicies::EvaluationSeconds)
                            .integer()
                            .not_null()
                            .default(60),
                    )
                    .col(ColumnDef::new(ScalingPolicies::LastScaledAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ScalingPolicies::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ScalingPolicies::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_scaling_policies_container")
                            .from(ScalingPolicies::Table, ScalingPolicies::ContainerId)
                            .to(Containers::Table, Containers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_scaling_policies_user")
                            .from(ScalingPolicies::Table, ScalingPolicies::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One policy per container.
        manager
            .create_index(
                Index::create()
                    .name("uq_scaling_policies_container")
                    .table(ScalingPolicies::Table)
                    .col(ScalingPolicies::ContainerId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ScalingEvents::Table)
                    .col(
                        ColumnDef::new(ScalingEvents::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScalingEvents::PolicyId).integer().not_null())
                    .col(ColumnDef::new(ScalingEvents::ContainerId).integer().not_null())
                    .col(ColumnDef::new(ScalingEvents::Action).string_len(20).not_null())
                    .col(ColumnDef::new(ScalingEvents::TriggerMetric).string_len(20).not_null())
                    .col(ColumnDef::new(ScalingEvents::MetricValue).double().not_null())
                    .col(ColumnDef::new(ScalingEvents::ReplicasBefore).integer().not_null())
                    .col(ColumnDef::new(ScalingEvents::ReplicasAfter).integer().not_null())
                    .col(
                        ColumnDef::new(ScalingEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_scaling_events_policy")
                            .from(ScalingEvents::Table, ScalingEvents::PolicyId)
                            .to(ScalingPolicies::Table, ScalingPolicies::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_scaling_events_container")
                            .from(ScalingEvents::Table, ScalingEvents::ContainerId)
                            .to(Containers::Table, Containers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_scaling_events_created_at")
                    .table(ScalingEvents::Table)
                    .col(ScalingEvents::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LoadTests::Table)
                    .col(
                        ColumnDef::new(LoadTests::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LoadTests::UserId).uuid().not_null())
                    .col(ColumnDef::new(LoadTests::ContainerId).integer().not_null())
                    .col(ColumnDef::new(LoadTests::TargetUrl).string_len(500).not_null())
                    .col(ColumnDef::new(LoadTests::TotalRequests).integer().not_null())
                    .col(ColumnDef::new(LoadTests::Concurrency).integer().not_null())
                    .col(ColumnDef::new(LoadTests::DurationSeconds).integer().not_null())
                    .col(ColumnDef::new(LoadTests::Status).string_len(20).not_null())
                    .col(ColumnDef::new(LoadTests::ErrorMessage).text())
                    .col(ColumnDef::new(LoadTests::RequestsSent).integer().not_null().default(0))
                    .col(ColumnDef::new(LoadTests::RequestsCompleted).integer().not_null().default(0))
                    .col(ColumnDef::new(LoadTests::RequestsFailed).integer().not_null().default(0))
                    .col(ColumnDef::new(LoadTests::AvgResponseTimeMs).double())
                    .col(ColumnDef::new(LoadTests::MinResponseTimeMs).double())
                    .col(ColumnDef::new(LoadTests::MaxResponseTimeMs).double())
                    .col(ColumnDef::new(LoadTests::PeakCpuPercent).double())
                    .col(ColumnDef::new(LoadTests::PeakMemoryMb).double())
                    .col(ColumnDef::new(LoadTests::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(LoadTests::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(LoadTests::CompletedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_load_tests_user")
                            .from(LoadTests::Table, LoadTests::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_load_tests_container")
                            .from(LoadTests::Table, LoadTests::ContainerId)
                            .to(Containers::Table, Containers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_load_tests_user")
                    .table(LoadTests::Table)
                    .col(LoadTests::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LoadTestMetrics::Table)
                    .col(
                        ColumnDef::new(LoadTestMetrics::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LoadTestMetrics::LoadTestId).integer().not_null())
                    .col(
                        ColumnDef::new(LoadTestMetrics::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LoadTestMetrics::CpuPercent).double().not_null())
                    .col(ColumnDef::new(LoadTestMetrics::MemoryMb).double().not_null())
                    .col(
                        ColumnDef::new(LoadTestMetrics::RequestsCompleted)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(LoadTestMetrics::RequestsFailed)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(LoadTestMetrics::ActiveRequests)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_load_test_metrics_test")
                            .from(LoadTestMetrics::Table, LoadTestMetrics::LoadTestId)
                            .to(LoadTests::Table, LoadTests::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_load_test_metrics_test")
                    .table(LoadTestMetrics::Table)
                    .col(LoadTestMetrics::LoadTestId)
                    .col(LoadTestMetrics::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ResourceUsage::Table)
                    .col(
                        ColumnDef::new(ResourceUsage::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ResourceUsage::ContainerId).integer().not_null())
                    .col(
                        ColumnDef::new(ResourceUsage::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ResourceUsage::CpuPercent).double().not_null())
                    .col(ColumnDef::new(ResourceUsage::CpuCoresUsed).double().not_null().default(0.0))
                    .col(ColumnDef::new(ResourceUsage::MemoryMb).double().not_null())
                    .col(ColumnDef::new(ResourceUsage::MemoryGb).double().not_null().default(0.0))
                    .col(ColumnDef::new(ResourceUsage::StorageGb).double().not_null().default(0.0))
                    .col(
                        ColumnDef::new(ResourceUsage::NetworkRxBytes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ResourceUsage::NetworkTxBytes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_resource_usage_container")
                            .from(ResourceUsage::Table, ResourceUsage::ContainerId)
                            .to(Containers::Table, Containers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_resource_usage_container_ts")
                    .table(ResourceUsage::Table)
                    .col(ResourceUsage::ContainerId)
                    .col(ResourceUsage::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PricingModels::Table)
                    .col(
                        ColumnDef::new(PricingModels::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PricingModels::ProviderName).string_len(20).not_null())
                    .col(ColumnDef::new(PricingModels::CpuPerHour).double().not_null())
                    .col(ColumnDef::new(PricingModels::MemoryPerGbHour).double().not_null())
                    .col(ColumnDef::new(PricingModels::StoragePerGbMonth).double().not_null())
                    .col(ColumnDef::new(PricingModels::StorageSsdPerGbMonth).double())
                    .col(ColumnDef::new(PricingModels::StorageHddPerGbMonth).double())
                    .col(
                        ColumnDef::new(PricingModels::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_pricing_models_provider")
                    .table(PricingModels::Table)
                    .col(PricingModels::ProviderName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BillingSnapshots::Table)
                    .col(
                        ColumnDef::new(BillingSnapshots::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BillingSnapshots::ContainerId).integer().not_null())
                    .col(ColumnDef::new(BillingSnapshots::Provider).string_len(20).not_null())
                    .col(
                        ColumnDef::new(BillingSnapshots::StartTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BillingSnapshots::EndTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BillingSnapshots::CpuCost).double().not_null().default(0.0))
                    .col(ColumnDef::new(BillingSnapshots::MemoryCost).double().not_null().default(0.0))
                    .col(ColumnDef::new(BillingSnapshots::StorageCost).double().not_null().default(0.0))
                    .col(ColumnDef::new(BillingSnapshots::TotalCost).double().not_null().default(0.0))
                    .col(ColumnDef::new(BillingSnapshots::UsageData).json_binary())
                    .col(
                        ColumnDef::new(BillingSnapshots::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_billing_snapshots_container")
                            .from(BillingSnapshots::Table, BillingSnapshots::ContainerId)
                            .to(Containers::Table, Containers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BillingSnapshots::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PricingModels::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ResourceUsage::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LoadTestMetrics::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LoadTests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ScalingEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ScalingPolicies::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Containers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Name,
    Email,
    PasswordHash,
    Role,
    Verified,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Containers {
    Table,
    Id,
    UserId,
    Name,
    Image,
    Status,
    Port,
    CpuLimit,
    MemoryLimit,
    EnvironmentVars,
    DeploymentType,
    SourceUrl,
    BuildStatus,
    EngineId,
    LocalhostUrl,
    ParentId,
    CreatedAt,
    UpdatedAt,
    StartedAt,
    StoppedAt,
}

#[derive(DeriveIden)]
enum ScalingPolicies {
    Table,
    Id,
    ContainerId,
    UserId,
    Enabled,
    ScaleUpCpuThreshold,
    ScaleUpMemoryThreshold,
    ScaleDownCpuThreshold,
    ScaleDownMemoryThreshold,
    MinReplicas,
    MaxReplicas,
    CooldownSeconds,
    EvaluationSeconds,
    LastScaledAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ScalingEvents {
    Table,
    Id,
    PolicyId,
    ContainerId,
    Action,
    TriggerMetric,
    MetricValue,
    ReplicasBefore,
    ReplicasAfter,
    CreatedAt,
}

#[derive(DeriveIden)]
enum LoadTests {
    Table,
    Id,
    UserId,
    ContainerId,
    TargetUrl,
    TotalRequests,
    Concurrency,
    DurationSeconds,
    Status,
    ErrorMessage,
    RequestsSent,
    RequestsCompleted,
    RequestsFailed,
    AvgResponseTimeMs,
    MinResponseTimeMs,
    MaxResponseTimeMs,
    PeakCpuPercent,
    PeakMemoryMb,
    CreatedAt,
    StartedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum LoadTestMetrics {
    Table,
    Id,
    LoadTestId,
    Timestamp,
    CpuPercent,
    MemoryMb,
    RequestsCompleted,
    RequestsFailed,
    ActiveRequests,
}

#[derive(DeriveIden)]
enum ResourceUsage {
    Table,
    Id,
    ContainerId,
    Timestamp,
    CpuPercent,
    CpuCoresUsed,
    MemoryMb,
    MemoryGb,
    StorageGb,
    NetworkRxBytes,
    NetworkTxBytes,
}

#[derive(DeriveIden)]
enum PricingModels {
    Table,
    Id,
    ProviderName,
    CpuPerHour,
    MemoryPerGbHour,
    StoragePerGbMonth,
    StorageSsdPerGbMonth,
    StorageHddPerGbMonth,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum BillingSnapshots {
    Table,
    Id,
    ContainerId,
    Provider,
    StartTime,
    EndTime,
    CpuCost,
    MemoryCost,
    StorageCost,
    TotalCost,
    UsageData,
    CreatedAt,
}
