use axum::{
    Extension, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{delete, get},
};
use db::models::{
    task::Task,
    task_history::{TaskHistory, TaskHistoryError},
};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    Deployment, error::ApiError, http::auth::AuthenticatedUser,
    middleware::load_owned_task_middleware,
};

pub async fn get_task_history(
    Extension(task): Extension<Task>,
    State(deployment): State<Deployment>,
) -> Result<ResponseJson<ApiResponse<Vec<TaskHistory>>>, ApiError> {
    let history = TaskHistory::find_by_task_id(&deployment.db().pool, task.id).await?;
    Ok(ResponseJson(ApiResponse::success(history)))
}

/// Deleting an already-empty history is an error, not a no-op.
pub async fn delete_task_history(
    Extension(task): Extension<Task>,
    State(deployment): State<Deployment>,
) -> Result<StatusCode, ApiError> {
    let rows_affected = TaskHistory::delete_by_task_id(&deployment.db().pool, task.id).await?;
    if rows_affected == 0 {
        return Err(TaskHistoryError::NotFound.into());
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_history(
    State(deployment): State<Deployment>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(history_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let pool = &deployment.db().pool;

    let history = TaskHistory::find_by_id(pool, history_id)
        .await?
        .ok_or(TaskHistoryError::NotFound)?;

    // Resolve the parent through the caller's ownership scope; a foreign or
    // vanished task reads the same as a missing snapshot.
    Task::find_by_id_for_user(pool, history.task_id, user.id)
        .await?
        .ok_or(TaskHistoryError::NotFound)?;

    let rows_affected = TaskHistory::delete(pool, history_id).await?;
    if rows_affected == 0 {
        return Err(TaskHistoryError::NotFound.into());
    }

    Ok(StatusCode::NO_CONTENT)
}

pub fn router(deployment: &Deployment) -> Router<Deployment> {
    let owned_history_router = Router::new()
        .route(
            "/task/{task_id}/history",
            get(get_task_history).delete(delete_task_history),
        )
        .layer(from_fn_with_state(
            deployment.clone(),
            load_owned_task_middleware,
        ));

    Router::new()
        .merge(owned_history_router)
        .route("/history/{history_id}", delete(delete_history))
}
