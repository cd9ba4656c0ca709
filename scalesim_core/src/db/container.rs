use crate::api_controller::middlewares::jwt::AuthenticatedUser;
use crate::lifecycle_manager::error::{CoreError, CoreResult};
use db_entities::containers::{self, ContainerStatus};
use db_entities::prelude::Containers;
use sea_orm::entity::prelude::*;
use sea_orm::{DatabaseConnection, QueryOrder, QuerySelect};
use std::collections::HashSet;

pub struct ContainerDBRepo;

impl ContainerDBRepo {
    /// Fetches a container and enforces the ownership rule: students may
    /// only touch their own containers, teachers and admins may read all.
    pub async fn find_visible(
        db: &DatabaseConnection,
        id: i32,
        user: &AuthenticatedUser,
    ) -> CoreResult<containers::Model> {
        let container = Containers::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| CoreError::NotFound("Container not found".to_string()))?;

        if !user.can_read_all_containers() && container.user_id != user.id {
            return Err(CoreError::NotAuthorized(
                "Not authorized to access this container".to_string(),
            ));
        }
        Ok(container)
    }

    /// Fetches a container the caller owns outright; used for operations that
    /// mutate state or attach sub-resources (policies, load tests).
    pub async fn find_owned(
        db: &DatabaseConnection,
        id: i32,
        user: &AuthenticatedUser,
    ) -> CoreResult<containers::Model> {
        Containers::find_by_id(id)
            .filter(containers::Column::UserId.eq(user.id))
            .one(db)
            .await?
            .ok_or_else(|| CoreError::NotFound("Container not found".to_string()))
    }

    pub async fn list_visible(
        db: &DatabaseConnection,
        user: &AuthenticatedUser,
        status: Option<ContainerStatus>,
    ) -> CoreResult<Vec<containers::Model>> {
        let mut query = Containers::find();
        if !user.can_read_all_containers() {
            query = query.filter(containers::Column::UserId.eq(user.id));
        }
        if let Some(status) = status {
            query = query.filter(containers::Column::Status.eq(status));
        }
        Ok(query
            .order_by_desc(containers::Column::CreatedAt)
            .all(db)
            .await?)
    }

    pub async fn list_owned(
        db: &DatabaseConnection,
        user: &AuthenticatedUser,
    ) -> CoreResult<Vec<containers::Model>> {
        Ok(Containers::find()
            .filter(containers::Column::UserId.eq(user.id))
            .order_by_desc(containers::Column::CreatedAt)
            .all(db)
            .await?)
    }

    pub async fn name_exists(
        db: &DatabaseConnection,
        user: &AuthenticatedUser,
        name: &str,
    ) -> CoreResult<bool> {
        let found = Containers::find()
            .filter(containers::Column::UserId.eq(user.id))
            .filter(containers::Column::Name.eq(name))
            .one(db)
            .await?;
        Ok(found.is_some())
    }

    /// All ports currently assigned to any container, for allocation scans.
    pub async fn used_ports(db: &DatabaseConnection) -> CoreResult<HashSet<i32>> {
        let ports: Vec<Option<i32>> = Containers::find()
            .select_only()
            .column(containers::Column::Port)
            .filter(containers::Column::Port.is_not_null())
            .into_tuple()
            .all(db)
            .await?;
        Ok(ports.into_iter().flatten().collect())
    }

    pub async fn running_with_engine(
        db: &DatabaseConnection,
    ) -> CoreResult<Vec<containers::Model>> {
        Ok(Containers::find()
            .filter(containers::Column::Status.eq(ContainerStatus::Running))
            .filter(containers::Column::EngineId.is_not_null())
            .all(db)
            .await?)
    }
}
