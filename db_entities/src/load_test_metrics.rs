use sea_orm::entity::prelude::*;
use serde::Serialize;

/// Immutable snapshot of a load test, captured every two seconds while the
/// test runs. `requests_completed`/`requests_failed` are cumulative;
/// `active_requests` is the in-flight count at the sample instant.
#[derive(Debug, Clone, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "load_test_metrics")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub load_test_id: i32,
    pub timestamp: DateTimeUtc,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub requests_completed: i32,
    pub requests_failed: i32,
    pub active_requests: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::load_tests::Entity",
        from = "Column::LoadTestId",
        to = "super::load_tests::Column::Id",
        on_delete = "Cascade"
    )]
    LoadTest,
}

impl Related<super::load_tests::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LoadTest.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
