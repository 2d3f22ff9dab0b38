pub mod billing;
pub mod invitations;
pub mod projects;
pub mod webhooks;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::{Json, http};
use uuid::Uuid;

use crate::adapters::http::app_state::AppState;
use crate::app_error::{AppError, AppResult};
use crate::application::jwt;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/projects", projects::router())
        .nest("/invitations", invitations::router())
        .nest("/billing", billing::router())
        .nest("/webhooks", webhooks::router())
}

/// Extract the authenticated user from the bearer credential.
pub(crate) fn current_user(headers: &HeaderMap, app_state: &AppState) -> AppResult<Uuid> {
    let token = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::InvalidCredentials)?;

    let claims = jwt::verify(token, &app_state.config.jwt_secret)?;
    Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidCredentials)
}

/// Unwrap a JSON body, folding extractor rejections into the structured error
/// envelope instead of axum's plain-text 400.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(AppError::InvalidInput(rejection.body_text())),
    }
}
