use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Select, Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use crate::types::TaskStatus;

use crate::{
    entities::task,
    models::{ids, task_history::TaskHistory},
};

const TITLE_MAX_LEN: usize = 100;
const DESCRIPTION_MAX_LEN: usize = 500;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Task not found")]
    TaskNotFound,
    #[error("Validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub due_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTask {
    pub title: String,
    pub description: String,
    pub due_time: DateTime<Utc>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_time: Option<DateTime<Utc>>,
    pub status: Option<TaskStatus>,
}

/// Optional listing predicates; absent fields impose no constraint.
/// The wire names follow the `field__op` query-parameter convention.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    #[serde(rename = "due_time__gte")]
    pub due_time_gte: Option<DateTime<Utc>>,
    #[serde(rename = "due_time__lte")]
    pub due_time_lte: Option<DateTime<Utc>>,
}

fn validate_title(title: &str) -> Result<(), TaskError> {
    if title.trim().is_empty() {
        return Err(TaskError::Validation("title must not be empty".to_string()));
    }
    if title.chars().count() > TITLE_MAX_LEN {
        return Err(TaskError::Validation(format!(
            "title must be at most {TITLE_MAX_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), TaskError> {
    if description.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(TaskError::Validation(format!(
            "description must be at most {DESCRIPTION_MAX_LEN} characters"
        )));
    }
    Ok(())
}

impl CreateTask {
    pub fn validate(&self) -> Result<(), TaskError> {
        validate_title(&self.title)?;
        validate_description(&self.description)
    }
}

impl UpdateTask {
    pub fn validate(&self) -> Result<(), TaskError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        Ok(())
    }
}

fn apply_filter(query: Select<task::Entity>, filter: &TaskFilter) -> Select<task::Entity> {
    let mut query = query;
    if let Some(status) = &filter.status {
        query = query.filter(task::Column::Status.eq(status.clone()));
    }
    if let Some(due_time_gte) = filter.due_time_gte {
        query = query.filter(task::Column::DueTime.gte(due_time_gte));
    }
    if let Some(due_time_lte) = filter.due_time_lte {
        query = query.filter(task::Column::DueTime.lte(due_time_lte));
    }
    query
}

impl Task {
    async fn from_model<C: ConnectionTrait>(db: &C, model: task::Model) -> Result<Self, DbErr> {
        let user_uuid = ids::user_uuid_by_id(db, model.user_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;

        Ok(Self {
            id: model.uuid,
            user_id: user_uuid,
            title: model.title,
            description: model.description,
            status: model.status,
            due_time: model.due_time.into(),
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }

    /// Administrative listing across all users.
    pub async fn find_all<C: ConnectionTrait>(
        db: &C,
        filter: &TaskFilter,
    ) -> Result<Vec<Self>, DbErr> {
        let models = apply_filter(task::Entity::find(), filter)
            .order_by_desc(task::Column::CreatedAt)
            .all(db)
            .await?;

        let mut tasks = Vec::with_capacity(models.len());
        for model in models {
            tasks.push(Self::from_model(db, model).await?);
        }
        Ok(tasks)
    }

    pub async fn find_by_user_id<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
        filter: &TaskFilter,
    ) -> Result<Vec<Self>, DbErr> {
        let user_row_id = match ids::user_id_by_uuid(db, user_id).await? {
            Some(id) => id,
            None => return Ok(Vec::new()),
        };

        let models = apply_filter(
            task::Entity::find().filter(task::Column::UserId.eq(user_row_id)),
            filter,
        )
        .order_by_desc(task::Column::CreatedAt)
        .all(db)
        .await?;

        let mut tasks = Vec::with_capacity(models.len());
        for model in models {
            tasks.push(Self::from_model(db, model).await?);
        }
        Ok(tasks)
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .one(db)
            .await?;

        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    /// Owner-scoped lookup. The ownership predicate is part of the query, so
    /// a missing task and another user's task are indistinguishable.
    pub async fn find_by_id_for_user<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, DbErr> {
        let user_row_id = match ids::user_id_by_uuid(db, user_id).await? {
            Some(row_id) => row_id,
            None => return Ok(None),
        };

        let record = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .filter(task::Column::UserId.eq(user_row_id))
            .one(db)
            .await?;

        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    /// Inserts the task and the snapshot of its initial state. Run inside a
    /// transaction so neither row outlives a failure of the other.
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
        data: &CreateTask,
        task_id: Uuid,
    ) -> Result<Self, TaskError> {
        data.validate()?;

        let user_row_id = ids::user_id_by_uuid(db, user_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;

        let now = Utc::now();
        let active = task::ActiveModel {
            uuid: Set(task_id),
            user_id: Set(user_row_id),
            title: Set(data.title.clone()),
            description: Set(data.description.clone()),
            status: Set(data.status.clone().unwrap_or_default()),
            due_time: Set(data.due_time.into()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        TaskHistory::record(db, model.id, model.status.clone(), model.due_time.into()).await?;
        Self::from_model(db, model).await.map_err(TaskError::from)
    }

    /// Merges the provided fields onto the stored row and appends a snapshot
    /// of the post-merge `status`/`due_time`, regardless of which fields
    /// changed.
    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        user_id: Uuid,
        data: &UpdateTask,
    ) -> Result<Self, TaskError> {
        data.validate()?;

        let user_row_id = ids::user_id_by_uuid(db, user_id)
            .await?
            .ok_or(TaskError::TaskNotFound)?;

        let record = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .filter(task::Column::UserId.eq(user_row_id))
            .one(db)
            .await?
            .ok_or(TaskError::TaskNotFound)?;

        let mut active: task::ActiveModel = record.into();
        if let Some(title) = data.title.clone() {
            active.title = Set(title);
        }
        if let Some(description) = data.description.clone() {
            active.description = Set(description);
        }
        if let Some(due_time) = data.due_time {
            active.due_time = Set(due_time.into());
        }
        if let Some(status) = data.status.clone() {
            active.status = Set(status);
        }
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(db).await?;
        TaskHistory::record(db, updated.id, updated.status.clone(), updated.due_time.into())
            .await?;
        Self::from_model(db, updated).await.map_err(TaskError::from)
    }

    /// Owner-scoped delete; history rows go with the task via the store's
    /// cascade constraint.
    pub async fn delete<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, DbErr> {
        let user_row_id = match ids::user_id_by_uuid(db, user_id).await? {
            Some(row_id) => row_id,
            None => return Ok(0),
        };

        let result = task::Entity::delete_many()
            .filter(task::Column::Uuid.eq(id))
            .filter(task::Column::UserId.eq(user_row_id))
            .exec(db)
            .await?;

        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use sea_orm::{Database, TransactionTrait};
    use sea_orm_migration::MigratorTrait;

    use crate::models::user::User;

    use super::*;

    async fn setup_db() -> sea_orm::DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn setup_user(db: &sea_orm::DatabaseConnection, email: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        User::find_or_create(db, user_id, email).await.unwrap();
        user_id
    }

    fn due(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 23, 59, 59).unwrap()
    }

    fn create_data(title: &str, due_time: DateTime<Utc>) -> CreateTask {
        CreateTask {
            title: title.to_string(),
            description: "This is a test task.".to_string(),
            due_time,
            status: None,
        }
    }

    #[tokio::test]
    async fn create_records_initial_snapshot() {
        let db = setup_db().await;
        let user_id = setup_user(&db, "create@example.com").await;
        let due_time = due(2023, 12, 31);

        let task = Task::create(&db, user_id, &create_data("Test Task", due_time), Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(task.user_id, user_id);
        assert_eq!(task.status, TaskStatus::New);
        assert_eq!(task.due_time, due_time);

        let history = TaskHistory::find_by_task_id(&db, task.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TaskStatus::New);
        assert_eq!(history[0].due_time, due_time);
    }

    #[tokio::test]
    async fn create_honors_explicit_status() {
        let db = setup_db().await;
        let user_id = setup_user(&db, "status@example.com").await;

        let data = CreateTask {
            status: Some(TaskStatus::InProgress),
            ..create_data("Started task", due(2024, 1, 1))
        };
        let task = Task::create(&db, user_id, &data, Uuid::new_v4()).await.unwrap();

        assert_eq!(task.status, TaskStatus::InProgress);
        let history = TaskHistory::find_by_task_id(&db, task.id).await.unwrap();
        assert_eq!(history[0].status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn create_rejects_invalid_input() {
        let db = setup_db().await;
        let user_id = setup_user(&db, "invalid@example.com").await;

        let empty_title = create_data("   ", due(2024, 1, 1));
        assert!(matches!(
            Task::create(&db, user_id, &empty_title, Uuid::new_v4()).await,
            Err(TaskError::Validation(_))
        ));

        let long_title = create_data(&"x".repeat(101), due(2024, 1, 1));
        assert!(matches!(
            Task::create(&db, user_id, &long_title, Uuid::new_v4()).await,
            Err(TaskError::Validation(_))
        ));

        let long_description = CreateTask {
            description: "x".repeat(501),
            ..create_data("Valid title", due(2024, 1, 1))
        };
        assert!(matches!(
            Task::create(&db, user_id, &long_description, Uuid::new_v4()).await,
            Err(TaskError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn update_merges_only_provided_fields() {
        let db = setup_db().await;
        let user_id = setup_user(&db, "merge@example.com").await;
        let due_time = due(2023, 12, 31);
        let task = Task::create(&db, user_id, &create_data("Test Task", due_time), Uuid::new_v4())
            .await
            .unwrap();

        let updated = Task::update(
            &db,
            task.id,
            user_id,
            &UpdateTask {
                status: Some(TaskStatus::Done),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.status, TaskStatus::Done);
        assert_eq!(updated.title, task.title);
        assert_eq!(updated.description, task.description);
        assert_eq!(updated.due_time, due_time);
        assert_eq!(updated.created_at, task.created_at);
    }

    #[tokio::test]
    async fn update_always_appends_snapshot() {
        let db = setup_db().await;
        let user_id = setup_user(&db, "append@example.com").await;
        let due_time = due(2023, 12, 31);
        let task = Task::create(&db, user_id, &create_data("Test Task", due_time), Uuid::new_v4())
            .await
            .unwrap();

        // A title-only update still snapshots the unchanged status/due_time.
        Task::update(
            &db,
            task.id,
            user_id,
            &UpdateTask {
                title: Some("Renamed task".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let history = TaskHistory::find_by_task_id(&db, task.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].status, TaskStatus::New);
        assert_eq!(history[1].due_time, due_time);
    }

    #[tokio::test]
    async fn update_snapshots_post_update_values() {
        let db = setup_db().await;
        let user_id = setup_user(&db, "snapshot@example.com").await;
        let task = Task::create(
            &db,
            user_id,
            &create_data("Test Task", due(2023, 12, 31)),
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let new_due = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Task::update(
            &db,
            task.id,
            user_id,
            &UpdateTask {
                status: Some(TaskStatus::InProgress),
                due_time: Some(new_due),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let history = TaskHistory::find_by_task_id(&db, task.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].status, TaskStatus::InProgress);
        assert_eq!(history[1].due_time, new_due);
    }

    #[tokio::test]
    async fn ownership_scopes_reads_and_writes() {
        let db = setup_db().await;
        let owner = setup_user(&db, "owner@example.com").await;
        let intruder = setup_user(&db, "intruder@example.com").await;
        let task = Task::create(&db, owner, &create_data("Private", due(2024, 1, 1)), Uuid::new_v4())
            .await
            .unwrap();

        assert!(
            Task::find_by_id_for_user(&db, task.id, intruder)
                .await
                .unwrap()
                .is_none()
        );
        assert!(matches!(
            Task::update(
                &db,
                task.id,
                intruder,
                &UpdateTask {
                    status: Some(TaskStatus::Done),
                    ..Default::default()
                },
            )
            .await,
            Err(TaskError::TaskNotFound)
        ));
        assert_eq!(Task::delete(&db, task.id, intruder).await.unwrap(), 0);

        // The owner still sees the untouched task.
        let found = Task::find_by_id_for_user(&db, task.id, owner)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, TaskStatus::New);
    }

    #[tokio::test]
    async fn delete_cascades_history() {
        let db = setup_db().await;
        let user_id = setup_user(&db, "cascade@example.com").await;
        let task = Task::create(
            &db,
            user_id,
            &create_data("Doomed task", due(2024, 1, 1)),
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        Task::update(
            &db,
            task.id,
            user_id,
            &UpdateTask {
                status: Some(TaskStatus::Done),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let rows = Task::delete(&db, task.id, user_id).await.unwrap();
        assert_eq!(rows, 1);

        assert!(Task::find_by_id(&db, task.id).await.unwrap().is_none());
        assert!(
            TaskHistory::find_by_task_id(&db, task.id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn deleting_user_cascades_tasks_and_history() {
        let db = setup_db().await;
        let user_id = setup_user(&db, "gone@example.com").await;
        let task = Task::create(&db, user_id, &create_data("Orphan", due(2024, 1, 1)), Uuid::new_v4())
            .await
            .unwrap();

        User::delete(&db, user_id).await.unwrap();

        assert!(Task::find_by_id(&db, task.id).await.unwrap().is_none());
        assert!(
            TaskHistory::find_by_task_id(&db, task.id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn filters_compose_with_and_semantics() {
        let db = setup_db().await;
        let user_id = setup_user(&db, "filter@example.com").await;
        let cutoff = due(2024, 6, 1);

        let matching = Task::create(
            &db,
            user_id,
            &CreateTask {
                status: Some(TaskStatus::InProgress),
                ..create_data("Due late, in progress", due(2024, 12, 31))
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        // Right status, due before the cutoff.
        Task::create(
            &db,
            user_id,
            &CreateTask {
                status: Some(TaskStatus::InProgress),
                ..create_data("Due early, in progress", due(2024, 1, 1))
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        // Due after the cutoff, wrong status.
        Task::create(
            &db,
            user_id,
            &create_data("Due late, new", due(2024, 12, 31)),
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let filter = TaskFilter {
            status: Some(TaskStatus::InProgress),
            due_time_gte: Some(cutoff),
            due_time_lte: None,
        };
        let tasks = Task::find_all(&db, &filter).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, matching.id);

        let bounded = TaskFilter {
            status: None,
            due_time_gte: Some(due(2023, 1, 1)),
            due_time_lte: Some(cutoff),
        };
        let tasks = Task::find_all(&db, &bounded).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Due early, in progress");
    }

    #[tokio::test]
    async fn listing_is_scoped_to_user() {
        let db = setup_db().await;
        let alice = setup_user(&db, "alice@example.com").await;
        let bob = setup_user(&db, "bob@example.com").await;

        Task::create(&db, alice, &create_data("Alice's", due(2024, 1, 1)), Uuid::new_v4())
            .await
            .unwrap();
        Task::create(&db, bob, &create_data("Bob's", due(2024, 1, 1)), Uuid::new_v4())
            .await
            .unwrap();

        let mine = Task::find_by_user_id(&db, alice, &TaskFilter::default())
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "Alice's");

        let all = Task::find_all(&db, &TaskFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn create_rolls_back_without_commit() {
        let db = setup_db().await;
        let user_id = setup_user(&db, "rollback@example.com").await;
        let task_id = Uuid::new_v4();

        let tx = db.begin().await.unwrap();
        Task::create(&tx, user_id, &create_data("Ephemeral", due(2024, 1, 1)), task_id)
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert!(Task::find_by_id(&db, task_id).await.unwrap().is_none());
        assert!(
            TaskHistory::find_by_task_id(&db, task_id)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
