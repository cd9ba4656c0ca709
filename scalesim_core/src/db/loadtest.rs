use crate::api_controller::middlewares::jwt::AuthenticatedUser;
use crate::lifecycle_manager::error::{CoreError, CoreResult};
use db_entities::prelude::{LoadTestMetrics, LoadTests};
use db_entities::{load_test_metrics, load_tests};
use sea_orm::entity::prelude::*;
use sea_orm::{DatabaseConnection, QueryOrder, QuerySelect};

pub struct LoadTestDBRepo;

impl LoadTestDBRepo {
    pub async fn find_owned(
        db: &DatabaseConnection,
        test_id: i32,
        user: &AuthenticatedUser,
    ) -> CoreResult<load_tests::Model> {
        LoadTests::find_by_id(test_id)
            .filter(load_tests::Column::UserId.eq(user.id))
            .one(db)
            .await?
            .ok_or_else(|| CoreError::NotFound("Load test not found".to_string()))
    }

    pub async fn history(
        db: &DatabaseConnection,
        user: &AuthenticatedUser,
        container_id: Option<i32>,
        limit: u64,
        offset: u64,
    ) -> CoreResult<(Vec<load_tests::Model>, u64)> {
        let mut query = LoadTests::find().filter(load_tests::Column::UserId.eq(user.id));
        if let Some(container_id) = container_id {
            query = query.filter(load_tests::Column::ContainerId.eq(container_id));
        }

        let total = query.clone().count(db).await?;
        let tests = query
            .order_by_desc(load_tests::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(db)
            .await?;
        Ok((tests, total))
    }

    /// Snapshots for one test in capture order.
    pub async fn metrics(
        db: &DatabaseConnection,
        test_id: i32,
    ) -> CoreResult<Vec<load_test_metrics::Model>> {
        Ok(LoadTestMetrics::find()
            .filter(load_test_metrics::Column::LoadTestId.eq(test_id))
            .order_by_asc(load_test_metrics::Column::Id)
            .all(db)
            .await?)
    }

    /// Snapshots newer than a cursor, for incremental streaming.
    pub async fn metrics_after(
        db: &DatabaseConnection,
        test_id: i32,
        after_id: i32,
    ) -> CoreResult<Vec<load_test_metrics::Model>> {
        Ok(LoadTestMetrics::find()
            .filter(load_test_metrics::Column::LoadTestId.eq(test_id))
            .filter(load_test_metrics::Column::Id.gt(after_id))
            .order_by_asc(load_test_metrics::Column::Id)
            .all(db)
            .await?)
    }
}
