use axum::{Router, middleware::from_fn_with_state, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{Deployment, routes};

pub mod auth;

pub fn router(deployment: Deployment) -> Router {
    let api_routes = Router::new()
        .merge(routes::tasks::router(&deployment))
        .merge(routes::task_history::router(&deployment))
        .layer(from_fn_with_state(
            deployment.clone(),
            auth::require_api_auth,
        ));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(deployment)
}
