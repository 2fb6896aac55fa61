use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::user;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    fn from_model(model: user::Model) -> Self {
        Self {
            id: model.uuid,
            email: model.email,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = user::Entity::find()
            .filter(user::Column::Uuid.eq(id))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    /// Provisions the row backing an authenticated principal. Called by the
    /// auth layer, so a valid token always resolves to a stored user.
    pub async fn find_or_create<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        email: &str,
    ) -> Result<Self, DbErr> {
        if let Some(existing) = Self::find_by_id(db, id).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let active = user::ActiveModel {
            uuid: Set(id),
            email: Set(email.to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        Ok(Self::from_model(model))
    }

    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let result = user::Entity::delete_many()
            .filter(user::Column::Uuid.eq(id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    use super::*;

    async fn setup_db() -> sea_orm::DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    #[tokio::test]
    async fn find_or_create_is_idempotent() {
        let db = setup_db().await;
        let user_id = Uuid::new_v4();

        let first = User::find_or_create(&db, user_id, "user@example.com")
            .await
            .unwrap();
        let second = User::find_or_create(&db, user_id, "user@example.com")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn delete_removes_user() {
        let db = setup_db().await;
        let user_id = Uuid::new_v4();
        User::find_or_create(&db, user_id, "user@example.com")
            .await
            .unwrap();

        let rows = User::delete(&db, user_id).await.unwrap();
        assert_eq!(rows, 1);
        assert!(User::find_by_id(&db, user_id).await.unwrap().is_none());
    }
}
