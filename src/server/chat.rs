//! Chat and model-selection routes.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::ApiError;
use crate::cache::RateLimitDecision;
use crate::llm::{ChatMessage, SelectionHints};

/// Reply sent when no provider could answer.
pub const FALLBACK_REPLY: &str =
    "I'm having trouble reaching the AI service right now. Please try again in a moment.";

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer in the language the user writes in.";

/// Past messages replayed to the model per session.
const HISTORY_MESSAGES: isize = 10;
const HISTORY_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_MESSAGE_CHARS: usize = 8_000;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/models/select", post(select_model))
        .route("/api/chat", post(chat))
}

#[derive(Debug, Deserialize)]
struct SelectRequest {
    query: String,
    #[serde(default)]
    hints: SelectionHints,
}

async fn select_model(
    State(state): State<AppState>,
    Json(request): Json<SelectRequest>,
) -> impl IntoResponse {
    Json(state.selector.select_with_hints(&request.query, &request.hints))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    hints: SelectionHints,
}

#[derive(Debug, Serialize)]
struct ChatReply {
    reply: String,
    provider: String,
    model: String,
    rule: &'static str,
    /// True when the canned reply was used.
    fallback: bool,
    analysis: crate::llm::QueryAnalysis,
    rate_limit: RateLimitDecision,
}

fn history_key(session: &str) -> String {
    format!("chat:{session}:history")
}

/// Identify the caller for rate limiting.
///
/// `X-Forwarded-For` is client-controlled, so its first hop is used only
/// when the deployment says a proxy sets it; otherwise the peer address is.
fn client_id(headers: &HeaderMap, peer: IpAddr, trust_forwarded_for: bool) -> String {
    let forwarded = trust_forwarded_for
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .and_then(|v| v.parse::<IpAddr>().ok());
    format!("ip:{}", forwarded.unwrap_or(peer))
}

async fn chat(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "message exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }
    let session = request.session_id.as_deref().filter(|s| !s.is_empty());

    let rate_limit = state
        .chat_limiter
        .check(&client_id(&headers, peer.ip(), state.trust_forwarded_for))
        .await?
        .into_result()?;

    let decision = state.selector.select_with_hints(message, &request.hints);

    let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
    if let Some(session) = session {
        let stored = state
            .cache
            .lrange(&history_key(session), 0, HISTORY_MESSAGES - 1)
            .await?;
        // Stored newest first.
        messages.extend(
            stored
                .iter()
                .rev()
                .filter_map(|raw| serde_json::from_str::<ChatMessage>(raw).ok()),
        );
    }
    messages.push(ChatMessage::user(message));

    let (reply, provider, model, fallback) =
        match state.llm.complete(&decision.selection, messages).await {
            Ok(routed) => (
                routed.response.content,
                routed.provider.to_string(),
                routed.response.model,
                false,
            ),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    rule = decision.rule,
                    "No provider answered, using fallback reply"
                );
                (
                    FALLBACK_REPLY.to_string(),
                    "none".to_string(),
                    decision.selection.model.clone(),
                    true,
                )
            }
        };

    if let Some(session) = session
        && !fallback
    {
        let key = history_key(session);
        for entry in [ChatMessage::user(message), ChatMessage::assistant(&reply)] {
            if let Ok(raw) = serde_json::to_string(&entry) {
                state.cache.lpush(&key, &raw).await?;
            }
        }
        state.cache.ltrim(&key, 0, HISTORY_MESSAGES - 1).await?;
        state.cache.expire(&key, HISTORY_TTL).await?;
    }

    Ok(Json(ChatReply {
        reply,
        provider,
        model,
        rule: decision.rule,
        fallback,
        analysis: decision.analysis,
        rate_limit,
    }))
}
