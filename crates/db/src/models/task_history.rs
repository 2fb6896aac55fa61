use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{entities::task_history, models::ids, types::TaskStatus};

#[derive(Debug, Error)]
pub enum TaskHistoryError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Task history not found")]
    NotFound,
}

/// Immutable snapshot of a task's `status`/`due_time` at one point in time.
/// Rows are only ever inserted or deleted; there is no update path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHistory {
    pub id: Uuid,
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub due_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TaskHistory {
    async fn from_model<C: ConnectionTrait>(
        db: &C,
        model: task_history::Model,
    ) -> Result<Self, DbErr> {
        let task_uuid = ids::task_uuid_by_id(db, model.task_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Task not found".to_string()))?;

        Ok(Self {
            id: model.uuid,
            task_id: task_uuid,
            status: model.status,
            due_time: model.due_time.into(),
            created_at: model.created_at.into(),
        })
    }

    /// Appends one snapshot row for the given task. Runs on whatever
    /// connection the caller holds, so it joins the caller's transaction.
    pub(crate) async fn record<C: ConnectionTrait>(
        db: &C,
        task_row_id: i64,
        status: TaskStatus,
        due_time: DateTime<Utc>,
    ) -> Result<(), DbErr> {
        let active = task_history::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            task_id: Set(task_row_id),
            status: Set(status),
            due_time: Set(due_time.into()),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };

        active.insert(db).await?;
        Ok(())
    }

    pub async fn find_by_task_id<C: ConnectionTrait>(
        db: &C,
        task_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let task_row_id = match ids::task_id_by_uuid(db, task_id).await? {
            Some(id) => id,
            None => return Ok(Vec::new()),
        };

        let models = task_history::Entity::find()
            .filter(task_history::Column::TaskId.eq(task_row_id))
            .order_by_asc(task_history::Column::CreatedAt)
            .all(db)
            .await?;

        let mut rows = Vec::with_capacity(models.len());
        for model in models {
            rows.push(Self::from_model(db, model).await?);
        }
        Ok(rows)
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = task_history::Entity::find()
            .filter(task_history::Column::Uuid.eq(id))
            .one(db)
            .await?;

        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let result = task_history::Entity::delete_many()
            .filter(task_history::Column::Uuid.eq(id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn delete_by_task_id<C: ConnectionTrait>(
        db: &C,
        task_id: Uuid,
    ) -> Result<u64, DbErr> {
        let task_row_id = match ids::task_id_by_uuid(db, task_id).await? {
            Some(id) => id,
            None => return Ok(0),
        };

        let result = task_history::Entity::delete_many()
            .filter(task_history::Column::TaskId.eq(task_row_id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}
