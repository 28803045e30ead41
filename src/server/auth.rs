//! GitHub sign-in routes and signed-in user lookup.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use super::AppState;
use super::error::{ApiError, ApiResponse};
use crate::oauth::GitHubOAuth;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/github/login", get(login))
        .route("/auth/github/callback", get(callback))
        .route("/api/users", get(list_users))
        .route("/api/users/{login}", get(get_user))
}

fn oauth(state: &AppState) -> Result<&Arc<GitHubOAuth>, ApiError> {
    state
        .oauth
        .as_ref()
        .ok_or(ApiError::Unavailable("GitHub sign-in"))
}

async fn login(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let url = oauth(&state)?.start().await?;
    Ok(Redirect::to(&url))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<impl IntoResponse, ApiError> {
    let oauth = oauth(&state)?;

    if let Some(error) = params.error {
        return Err(ApiError::BadRequest(format!("GitHub sign-in denied: {error}")));
    }
    let (Some(code), Some(csrf_state)) = (params.code, params.state) else {
        return Err(ApiError::BadRequest(
            "callback requires code and state".to_string(),
        ));
    };

    let user = oauth.complete(&csrf_state, &code).await?;
    Ok(Json(user))
}

async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let users = oauth(&state)?.known_users().await?;
    Ok(Json(ApiResponse::ok(users)))
}

async fn get_user(
    State(state): State<AppState>,
    Path(login): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match oauth(&state)?.stored_profile(&login).await? {
        Some(profile) => Ok(Json(ApiResponse::ok(profile))),
        None => Err(ApiError::NotFound(format!("user {login} not found"))),
    }
}
