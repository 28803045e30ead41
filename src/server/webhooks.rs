//! Webhook console routes: intake, event log and outbound dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use secrecy::ExposeSecret;
use serde::Deserialize;

use super::AppState;
use super::error::ApiError;
use crate::error::WebhookError;
use crate::webhooks::{
    EventQuery, SignatureScheme, WebhookConfig, WebhookDispatcher, WebhookSource, parse_delivery,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/webhooks/events", get(list_events).delete(clear_events))
        .route("/api/webhooks/events/{id}", delete(delete_event))
        .route("/api/webhooks/dispatch", post(dispatch))
        .route("/api/webhooks/dispatch/stats", get(dispatch_stats))
        .route("/api/webhooks/{source}", post(receive))
}

async fn receive(
    State(state): State<AppState>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let source: WebhookSource = source.parse()?;
    let secret = state
        .github_webhook_secret
        .as_ref()
        .map(|s| s.expose_secret());

    let event = parse_delivery(source, &headers, &body, secret).inspect_err(|e| {
        tracing::warn!(source = %source, error = %e, "Rejected inbound webhook");
    })?;

    let id = event.id.clone();
    let logged = state.events.log(event);

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "id": id, "logged": logged })),
    ))
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> impl IntoResponse {
    Json(query.apply(state.events.events()))
}

async fn delete_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.events.delete_event(&id) {
        Ok(Json(serde_json::json!({ "deleted": true })))
    } else {
        Err(WebhookError::NotFound { id }.into())
    }
}

async fn clear_events(State(state): State<AppState>) -> impl IntoResponse {
    let cleared = state.events.clear_events();
    tracing::info!(cleared, "Webhook event log cleared");
    Json(serde_json::json!({ "cleared": cleared }))
}

#[derive(Debug, Deserialize)]
struct DispatchRequest {
    url: String,
    payload: serde_json::Value,
    #[serde(default)]
    secret: Option<String>,
    #[serde(default)]
    retry_attempts: Option<u32>,
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(default)]
    signature_scheme: Option<SignatureScheme>,
    #[serde(default)]
    headers: HashMap<String, String>,
}

async fn dispatch(
    State(state): State<AppState>,
    Json(request): Json<DispatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let config = WebhookConfig::new(
        request.url,
        request.secret,
        request
            .retry_attempts
            .unwrap_or(WebhookConfig::DEFAULT_RETRY_ATTEMPTS),
        request.timeout_ms.unwrap_or(WebhookConfig::DEFAULT_TIMEOUT_MS),
    )?
    .with_signature_scheme(request.signature_scheme.unwrap_or_default());

    let dispatcher = WebhookDispatcher::with_transport(config, Arc::clone(&state.transport))
        .with_metrics(Arc::clone(&state.dispatch_metrics));
    let report = dispatcher
        .send_with_report(&request.payload, &request.headers)
        .await;

    Ok(Json(report))
}

async fn dispatch_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dispatch_metrics.snapshot())
}
