use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum ScalingAction {
    #[sea_orm(string_value = "scale_up")]
    ScaleUp,
    #[sea_orm(string_value = "scale_down")]
    ScaleDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum ScalingTrigger {
    #[sea_orm(string_value = "cpu")]
    Cpu,
    #[sea_orm(string_value = "memory")]
    Memory,
    #[sea_orm(string_value = "both_low")]
    BothLow,
}

/// Append-only audit record of one scaling action.
#[derive(Debug, Clone, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "scaling_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub policy_id: i32,
    pub container_id: i32,
    pub action: ScalingAction,
    pub trigger_metric: ScalingTrigger,
    pub metric_value: f64,
    pub replicas_before: i32,
    pub replicas_after: i32,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::scaling_policies::Entity",
        from = "Column::PolicyId",
        to = "super::scaling_policies::Column::Id",
        on_delete = "Cascade"
    )]
    Policy,
    #[sea_orm(
        belongs_to = "super::containers::Entity",
        from = "Column::ContainerId",
        to = "super::containers::Column::Id",
        on_delete = "Cascade"
    )]
    Container,
}

impl Related<super::scaling_policies::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Policy.def()
    }
}

impl Related<super::containers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Container.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
