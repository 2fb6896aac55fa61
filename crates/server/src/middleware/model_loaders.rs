use std::{fmt::Display, future::Future};

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use db::models::task::Task;
use uuid::Uuid;

use crate::{Deployment, http::auth::AuthenticatedUser};

async fn fetch_model_or_status<M, E, Fut>(
    model_name: &'static str,
    model_id: Uuid,
    load_future: Fut,
) -> Result<M, StatusCode>
where
    E: Display,
    Fut: Future<Output = Result<Option<M>, E>>,
{
    match load_future.await {
        Ok(Some(model)) => Ok(model),
        Ok(None) => {
            tracing::warn!("{model_name} {model_id} not found");
            Err(StatusCode::NOT_FOUND)
        }
        Err(error) => {
            tracing::error!("Failed to fetch {model_name} {model_id}: {error}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn load_request_extension<M, E, Fut>(
    request: Request,
    next: Next,
    model_name: &'static str,
    model_id: Uuid,
    load_future: Fut,
) -> Result<Response, StatusCode>
where
    M: Clone + Send + Sync + 'static,
    E: Display,
    Fut: Future<Output = Result<Option<M>, E>>,
{
    let model = fetch_model_or_status(model_name, model_id, load_future).await?;
    let mut request = request;
    request.extensions_mut().insert(model);
    Ok(next.run(request).await)
}

/// Loads the task addressed by the `task_id` path parameter, scoped to the
/// authenticated caller. A task owned by someone else loads exactly like a
/// task that does not exist.
pub async fn load_owned_task_middleware(
    State(deployment): State<Deployment>,
    Path(task_id): Path<Uuid>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(user) = request.extensions().get::<AuthenticatedUser>().cloned() else {
        tracing::error!("Authenticated user missing from request extensions");
        return Err(StatusCode::UNAUTHORIZED);
    };

    load_request_extension(
        request,
        next,
        "Task",
        task_id,
        Task::find_by_id_for_user(&deployment.db().pool, task_id, user.id),
    )
    .await
}
