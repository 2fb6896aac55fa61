use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::TransactionTrait;
use db::models::task::{CreateTask, Task, TaskFilter, UpdateTask};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    Deployment, error::ApiError, http::auth::AuthenticatedUser,
    middleware::load_owned_task_middleware,
};

/// Administrative listing across all users; the filter still applies.
pub async fn get_tasks(
    State(deployment): State<Deployment>,
    Query(filter): Query<TaskFilter>,
) -> Result<ResponseJson<ApiResponse<Vec<Task>>>, ApiError> {
    let tasks = Task::find_all(&deployment.db().pool, &filter).await?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub async fn get_my_tasks(
    State(deployment): State<Deployment>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(filter): Query<TaskFilter>,
) -> Result<ResponseJson<ApiResponse<Vec<Task>>>, ApiError> {
    let tasks = Task::find_by_user_id(&deployment.db().pool, user.id, &filter).await?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub async fn get_task(
    Extension(task): Extension<Task>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn create_task(
    State(deployment): State<Deployment>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(payload): Json<CreateTask>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Task>>), ApiError> {
    let id = Uuid::new_v4();

    tracing::debug!("Creating task '{}' for user {}", payload.title, user.id);

    // Task insert and initial history snapshot commit together.
    let tx = deployment.db().pool.begin().await?;
    let task = Task::create(&tx, user.id, &payload, id).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(task))))
}

pub async fn update_task(
    Extension(existing_task): Extension<Task>,
    Extension(user): Extension<AuthenticatedUser>,
    State(deployment): State<Deployment>,
    Json(payload): Json<UpdateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    // Merge and post-merge history snapshot commit together.
    let tx = deployment.db().pool.begin().await?;
    let task = Task::update(&tx, existing_task.id, user.id, &payload).await?;
    tx.commit().await?;

    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn delete_task(
    Extension(task): Extension<Task>,
    Extension(user): Extension<AuthenticatedUser>,
    State(deployment): State<Deployment>,
) -> Result<StatusCode, ApiError> {
    let rows_affected = Task::delete(&deployment.db().pool, task.id, user.id).await?;
    if rows_affected == 0 {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub fn router(deployment: &Deployment) -> Router<Deployment> {
    let task_actions_router = Router::new()
        .route(
            "/task/{task_id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .layer(from_fn_with_state(
            deployment.clone(),
            load_owned_task_middleware,
        ));

    Router::new()
        .route("/tasks", get(get_tasks))
        .route("/tasks/mine", get(get_my_tasks))
        .route("/task", post(create_task))
        .merge(task_actions_router)
}
