use crate::api_controller::middlewares::jwt::AuthenticatedUser;
use crate::lifecycle_manager::error::{CoreError, CoreResult};
use db_entities::prelude::{ScalingEvents, ScalingPolicies};
use db_entities::{scaling_events, scaling_policies};
use sea_orm::entity::prelude::*;
use sea_orm::{DatabaseConnection, JoinType, QueryOrder, QuerySelect};

pub struct ScalingDBRepo;

impl ScalingDBRepo {
    pub async fn find_owned_policy(
        db: &DatabaseConnection,
        policy_id: i32,
        user: &AuthenticatedUser,
    ) -> CoreResult<scaling_policies::Model> {
        ScalingPolicies::find_by_id(policy_id)
            .filter(scaling_policies::Column::UserId.eq(user.id))
            .one(db)
            .await?
            .ok_or_else(|| CoreError::NotFound("Policy not found".to_string()))
    }

    pub async fn list_policies(
        db: &DatabaseConnection,
        user: &AuthenticatedUser,
    ) -> CoreResult<Vec<scaling_policies::Model>> {
        Ok(ScalingPolicies::find()
            .filter(scaling_policies::Column::UserId.eq(user.id))
            .order_by_asc(scaling_policies::Column::Id)
            .all(db)
            .await?)
    }

    pub async fn policy_for_container(
        db: &DatabaseConnection,
        container_id: i32,
    ) -> CoreResult<Option<scaling_policies::Model>> {
        Ok(ScalingPolicies::find()
            .filter(scaling_policies::Column::ContainerId.eq(container_id))
            .one(db)
            .await?)
    }

    /// Recent scaling events for the caller's policies, newest first.
    pub async fn recent_events(
        db: &DatabaseConnection,
        user: &AuthenticatedUser,
        container_id: Option<i32>,
        limit: u64,
    ) -> CoreResult<Vec<scaling_events::Model>> {
        let mut query = ScalingEvents::find()
            .join(JoinType::InnerJoin, scaling_events::Relation::Policy.def())
            .filter(scaling_policies::Column::UserId.eq(user.id));

        if let Some(container_id) = container_id {
            query = query.filter(scaling_events::Column::ContainerId.eq(container_id));
        }

        Ok(query
            .order_by_desc(scaling_events::Column::CreatedAt)
            .limit(limit)
            .all(db)
            .await?)
    }
}
