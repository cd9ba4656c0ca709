use chrono::Utc;
use db_entities::prelude::Users;
use db_entities::users::{self, UserRole};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, DatabaseConnection};
use uuid::Uuid;

pub struct UserDBRepo;

impl UserDBRepo {
    pub async fn find_by_email(
        db: &DatabaseConnection,
        email: &str,
    ) -> Result<Option<users::Model>, DbErr> {
        Users::find()
            .filter(users::Column::Email.eq(email.to_lowercase()))
            .one(db)
            .await
    }

    pub async fn find_by_id(
        db: &DatabaseConnection,
        id: Uuid,
    ) -> Result<Option<users::Model>, DbErr> {
        Users::find_by_id(id).one(db).await
    }

    pub async fn create(
        db: &DatabaseConnection,
        name: &str,
        email: &str,
        password_hash: &str,
        role: UserRole,
    ) -> Result<users::Model, DbErr> {
        let now = Utc::now();
        let user = users::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            email: Set(email.to_lowercase()),
            password_hash: Set(password_hash.to_string()),
            role: Set(role),
            verified: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };
        user.insert(db).await
    }
}
