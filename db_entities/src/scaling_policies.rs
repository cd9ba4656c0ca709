use sea_orm::entity::prelude::*;
use serde::Serialize;

/// Auto-scaling policy for one container. At most one policy per container,
/// enforced by a unique index on `container_id`.
#[derive(Debug, Clone, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "scaling_policies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub container_id: i32,
    pub user_id: Uuid,
    pub enabled: bool,
    /// Thresholds in percent (0..100).
    pub scale_up_cpu_threshold: f64,
    pub scale_up_memory_threshold: f64,
    pub scale_down_cpu_threshold: f64,
    pub scale_down_memory_threshold: f64,
    pub min_replicas: i32,
    pub max_replicas: i32,
    /// Minimum seconds between scaling actions for this policy.
    pub cooldown_seconds: i32,
    /// Nominal evaluation cadence; the engine tick treats it as a lower bound.
    pub evaluation_seconds: i32,
    pub last_scaled_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::containers::Entity",
        from = "Column::ContainerId",
        to = "super::containers::Column::Id",
        on_delete = "Cascade"
    )]
    Container,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(has_many = "super::scaling_events::Entity")]
    ScalingEvents,
}

impl Related<super::containers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Container.def()
    }
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::scaling_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ScalingEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
