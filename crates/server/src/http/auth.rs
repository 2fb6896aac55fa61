use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use db::models::user::User;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::Deployment;

/// Principal resolved from a valid access token, stored in the request
/// extensions for handlers and model loaders.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
}

fn parse_authorization_bearer(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    let (prefix, rest) = trimmed.split_once(' ')?;
    if !prefix.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

fn extract_request_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_authorization_bearer)
}

fn unauthorized(message: &str) -> Response {
    let response = ApiResponse::<()>::error(message);
    (StatusCode::UNAUTHORIZED, Json(response)).into_response()
}

/// Rejects requests without a valid bearer token and resolves the caller
/// into an [`AuthenticatedUser`]. The backing user row is provisioned on
/// first sight, so every authenticated principal exists in the store.
pub async fn require_api_auth(
    State(deployment): State<Deployment>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match extract_request_token(&req) {
        Some(token) => token.to_string(),
        None => {
            tracing::warn!(
                path = %req.uri().path(),
                method = %req.method(),
                reason = "missing_token",
                "Unauthorized API request"
            );
            return unauthorized("Missing authorization header");
        }
    };

    let claims = match deployment.jwt().validate_token(&token) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::warn!(
                path = %req.uri().path(),
                method = %req.method(),
                error = %err,
                reason = "invalid_token",
                "Unauthorized API request"
            );
            return unauthorized("Invalid token");
        }
    };

    let user_id = match claims.user_id() {
        Ok(user_id) => user_id,
        Err(_) => return unauthorized("Invalid token claims"),
    };

    let user = match User::find_or_create(&deployment.db().pool, user_id, &claims.email).await {
        Ok(user) => user,
        Err(err) => {
            tracing::error!(error = %err, "Failed to resolve authenticated user");
            let response = ApiResponse::<()>::error("Internal server error");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response();
        }
    };

    req.extensions_mut().insert(AuthenticatedUser {
        id: user.id,
        email: user.email,
    });

    next.run(req).await
}
