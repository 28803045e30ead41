//! Turning an inbound HTTP delivery into a [`WebhookEvent`].

use std::collections::HashMap;

use axum::http::HeaderMap;
use serde_json::Value;

use super::types::{WebhookEvent, WebhookSource};
use super::verify::{GITHUB_SIGNATURE_HEADER, verify_github_signature};
use crate::error::WebhookError;

const GITHUB_EVENT_HEADER: &str = "x-github-event";
const GITHUB_DELIVERY_HEADER: &str = "x-github-delivery";
const GITHUB_HOOK_ID_HEADER: &str = "x-github-hook-id";
const GENERIC_EVENT_HEADER: &str = "x-webhook-event";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn string_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// Validate and parse one inbound delivery.
///
/// For GitHub the signature is checked before the body is parsed, and only
/// when a secret is configured.
pub fn parse_delivery(
    source: WebhookSource,
    headers: &HeaderMap,
    body: &[u8],
    github_secret: Option<&str>,
) -> Result<WebhookEvent, WebhookError> {
    if source == WebhookSource::Github
        && let Some(secret) = github_secret
    {
        verify_github_signature(secret, body, header(headers, GITHUB_SIGNATURE_HEADER))?;
    }

    let data: Value =
        serde_json::from_slice(body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

    let mut metadata = HashMap::new();
    if let Some(agent) = header(headers, "user-agent") {
        metadata.insert("user_agent".to_string(), agent.to_string());
    }

    let event = match source {
        WebhookSource::Github => {
            let event_type = header(headers, GITHUB_EVENT_HEADER).unwrap_or("unknown");
            let id = header(headers, GITHUB_DELIVERY_HEADER).map(str::to_string);
            if let Some(hook_id) = header(headers, GITHUB_HOOK_ID_HEADER) {
                metadata.insert("hook_id".to_string(), hook_id.to_string());
            }
            if let Some(repo) = string_at(&data, "/repository/full_name") {
                metadata.insert("repository".to_string(), repo.to_string());
            }
            if let Some(sender) = string_at(&data, "/sender/login") {
                metadata.insert("sender".to_string(), sender.to_string());
            }
            WebhookEvent::new(id, event_type, source, data)
        }
        WebhookSource::Vercel => {
            let event_type = string_at(&data, "/type").unwrap_or("unknown").to_string();
            let id = string_at(&data, "/id").map(str::to_string);
            if let Some(project) = string_at(&data, "/payload/project/id") {
                metadata.insert("project".to_string(), project.to_string());
            }
            WebhookEvent::new(id, event_type, source, data)
        }
        WebhookSource::Generic | WebhookSource::Unknown => {
            let event_type = string_at(&data, "/type")
                .or_else(|| header(headers, GENERIC_EVENT_HEADER))
                .unwrap_or("generic")
                .to_string();
            WebhookEvent::new(None, event_type, source, data)
        }
    };

    Ok(event.with_metadata(metadata))
}
