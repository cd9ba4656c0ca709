use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "stopped")]
    Stopped,
    #[sea_orm(string_value = "error")]
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    #[sea_orm(string_value = "dockerhub")]
    Dockerhub,
    #[sea_orm(string_value = "github")]
    Github,
    #[sea_orm(string_value = "simulated")]
    Simulated,
}

/// A container record. `parent_id` is set on replicas spawned by the
/// autoscaler; `engine_id` is the opaque handle of the live engine container
/// and stays null for simulated deployments and bare replica records.
#[derive(Debug, Clone, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "containers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub status: ContainerStatus,
    #[sea_orm(unique)]
    pub port: Option<i32>,
    /// CPU limit in millicores.
    pub cpu_limit: i32,
    /// Memory limit in MB.
    pub memory_limit: i32,
    pub environment_vars: Option<Json>,
    pub deployment_type: DeploymentType,
    pub source_url: Option<String>,
    pub build_status: Option<String>,
    pub engine_id: Option<String>,
    pub localhost_url: Option<String>,
    pub parent_id: Option<i32>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub started_at: Option<DateTimeUtc>,
    pub stopped_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentId",
        to = "Column::Id",
        on_delete = "Cascade"
    )]
    Parent,
    #[sea_orm(has_many = "super::load_tests::Entity")]
    LoadTests,
    #[sea_orm(has_many = "super::resource_usage::Entity")]
    ResourceUsage,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::load_tests::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LoadTests.def()
    }
}

impl Related<super::resource_usage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ResourceUsage.def()
    }
}

impl Model {
    /// True for replica records created by the autoscaler.
    pub fn is_replica(&self) -> bool {
        self.parent_id.is_some()
    }
}

impl ActiveModelBehavior for ActiveModel {}
