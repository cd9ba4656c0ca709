use sea_orm::entity::prelude::*;
use serde::Serialize;

/// One harvested resource sample for a container.
#[derive(Debug, Clone, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "resource_usage")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub container_id: i32,
    pub timestamp: DateTimeUtc,
    pub cpu_percent: f64,
    pub cpu_cores_used: f64,
    pub memory_mb: f64,
    pub memory_gb: f64,
    pub storage_gb: f64,
    pub network_rx_bytes: i64,
    pub network_tx_bytes: i64,
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
}

impl Related<super::containers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Container.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
