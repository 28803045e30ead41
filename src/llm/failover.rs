//! Provider failover and cooldown management.
//!
//! Routes a [`ModelSelection`] to the selected provider and, when that
//! provider fails or is cooling down, retries once on the other provider
//! with its general-purpose model.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use super::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, ProviderKind,
};
use super::selector::{GROQ_LARGE_MODEL, ModelSelection, TOGETHER_LARGE_MODEL};
use crate::error::LlmError;

/// Longest cooldown applied after repeated failures.
const MAX_COOLDOWN: Duration = Duration::from_secs(300);

/// State tracking for a single provider.
#[derive(Debug)]
struct ProviderState {
    consecutive_failures: u32,
    cooldown_until: Option<Instant>,
    total_requests: u64,
    total_errors: u64,
}

impl ProviderState {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            cooldown_until: None,
            total_requests: 0,
            total_errors: 0,
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.cooldown_until = None;
        self.total_requests += 1;
    }

    fn record_failure(&mut self, cooldown: Duration) {
        self.consecutive_failures += 1;
        self.total_requests += 1;
        self.total_errors += 1;

        // cooldown * 2^(failures-1), capped
        let multiplier = 2u32.saturating_pow(self.consecutive_failures.saturating_sub(1));
        let actual_cooldown = cooldown
            .checked_mul(multiplier)
            .unwrap_or(MAX_COOLDOWN)
            .min(MAX_COOLDOWN);

        self.cooldown_until = Some(Instant::now() + actual_cooldown);
    }

    fn is_available(&self) -> bool {
        match self.cooldown_until {
            Some(until) => Instant::now() >= until,
            None => true,
        }
    }
}

/// Request/error counters for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ProviderStats {
    pub total_requests: u64,
    pub total_errors: u64,
    pub available: bool,
}

/// A completion plus the provider that produced it.
#[derive(Debug, Clone)]
pub struct RoutedCompletion {
    pub provider: ProviderKind,
    pub response: CompletionResponse,
}

/// Model used when a request is moved to `kind` as a fallback.
pub fn fallback_model(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Groq => GROQ_LARGE_MODEL,
        ProviderKind::Together => TOGETHER_LARGE_MODEL,
    }
}

/// Failover-capable router over the configured providers.
pub struct FailoverRouter {
    providers: HashMap<ProviderKind, Arc<dyn LlmProvider>>,
    states: Arc<RwLock<HashMap<ProviderKind, ProviderState>>>,
    base_cooldown: Duration,
}

impl FailoverRouter {
    /// Create a router with no providers.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            states: Arc::new(RwLock::new(HashMap::new())),
            base_cooldown: Duration::from_secs(30),
        }
    }

    /// Register the backend for a provider kind.
    pub fn add_provider(&mut self, kind: ProviderKind, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(kind, provider);
    }

    /// Set the base cooldown duration.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.base_cooldown = cooldown;
        self
    }

    /// Whether any provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Per-provider statistics.
    pub async fn provider_stats(&self) -> HashMap<ProviderKind, ProviderStats> {
        let states = self.states.read().await;
        self.providers
            .keys()
            .map(|kind| {
                let state = states.get(kind);
                let stats = ProviderStats {
                    total_requests: state.map(|s| s.total_requests).unwrap_or(0),
                    total_errors: state.map(|s| s.total_errors).unwrap_or(0),
                    available: state.is_none_or(|s| s.is_available()),
                };
                (*kind, stats)
            })
            .collect()
    }

    async fn is_available(&self, kind: ProviderKind) -> bool {
        self.states
            .read()
            .await
            .get(&kind)
            .is_none_or(|s| s.is_available())
    }

    async fn record_success(&self, kind: ProviderKind) {
        self.states
            .write()
            .await
            .entry(kind)
            .or_insert_with(ProviderState::new)
            .record_success();
    }

    async fn record_failure(&self, kind: ProviderKind) {
        self.states
            .write()
            .await
            .entry(kind)
            .or_insert_with(ProviderState::new)
            .record_failure(self.base_cooldown);
    }

    /// Generate a completion for `messages` using `selection`, falling back
    /// to the other provider on failure.
    pub async fn complete(
        &self,
        selection: &ModelSelection,
        messages: Vec<ChatMessage>,
    ) -> Result<RoutedCompletion, LlmError> {
        let fallback = selection.provider.fallback();
        let attempts = [
            (selection.provider, selection.model.clone()),
            (fallback, fallback_model(fallback).to_string()),
        ];

        let mut last_error = None;

        for (kind, model) in attempts {
            let Some(provider) = self.providers.get(&kind) else {
                continue;
            };
            if !self.is_available(kind).await {
                tracing::debug!(provider = %kind, "Provider cooling down, skipping");
                continue;
            }

            tracing::debug!(provider = %kind, model = %model, "Attempting completion");

            let request = CompletionRequest {
                model,
                messages: messages.clone(),
                temperature: Some(selection.temperature),
                max_tokens: Some(selection.max_tokens),
            };

            match provider.complete(request).await {
                Ok(response) => {
                    self.record_success(kind).await;
                    return Ok(RoutedCompletion {
                        provider: kind,
                        response,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %kind,
                        error = %e,
                        "Provider failed, trying next"
                    );
                    self.record_failure(kind).await;
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(LlmError::NotConfigured {
            provider: selection.provider.to_string(),
        }))
    }
}

impl Default for FailoverRouter {
    fn default() -> Self {
        Self::new()
    }
}
