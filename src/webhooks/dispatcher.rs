//! Outbound webhook delivery.
//!
//! Sends a JSON payload to one configured endpoint, retrying with
//! exponential backoff until a 2xx response or the attempt budget runs
//! out. Delivery failure is reported, never raised.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::retry::{RetryOutcome, RetryPolicy};
use super::types::WebhookConfig;
use super::verify::sign_payload;

pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Headers the dispatcher always sets; callers cannot override them.
const RESERVED_HEADERS: [&str; 3] = ["Content-Type", TIMESTAMP_HEADER, SIGNATURE_HEADER];

fn is_reserved(name: &str) -> bool {
    RESERVED_HEADERS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name.trim()))
}

/// One HTTP POST as handed to a transport.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl OutboundRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Performs the actual POST. Returns the response status code.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, request: OutboundRequest) -> Result<u16, AttemptError>;
}

/// reqwest-backed transport.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(&self, request: OutboundRequest) -> Result<u16, AttemptError> {
        let mut builder = self.client.post(&request.url).body(request.body);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// Delivery counters shared across dispatchers.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    pub total_attempts: AtomicU64,
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
    pub retried: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> DispatchSnapshot {
        let delivered = self.delivered.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let total = delivered + failed;

        DispatchSnapshot {
            total_attempts: self.total_attempts.load(Ordering::Relaxed),
            delivered,
            failed,
            retried: self.retried.load(Ordering::Relaxed),
            success_rate: if total > 0 {
                delivered as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

/// Point-in-time copy of [`DispatchMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSnapshot {
    pub total_attempts: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Dispatches that needed more than one attempt.
    pub retried: u64,
    pub success_rate: f64,
}

/// Result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub delivered: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Sends payloads to a single configured endpoint.
pub struct WebhookDispatcher {
    config: WebhookConfig,
    transport: Arc<dyn WebhookTransport>,
    metrics: Arc<DispatchMetrics>,
}

impl WebhookDispatcher {
    /// Dispatcher using the HTTP transport.
    pub fn new(config: WebhookConfig) -> Self {
        Self::with_transport(config, Arc::new(HttpTransport::new()))
    }

    pub fn with_transport(config: WebhookConfig, transport: Arc<dyn WebhookTransport>) -> Self {
        Self {
            config,
            transport,
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }

    /// Record into a shared metrics sink instead of a private one.
    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    pub fn metrics(&self) -> DispatchSnapshot {
        self.metrics.snapshot()
    }

    /// Deliver `payload`, returning whether any attempt got a 2xx.
    pub async fn send(
        &self,
        payload: &serde_json::Value,
        extra_headers: &HashMap<String, String>,
    ) -> bool {
        self.send_with_report(payload, extra_headers).await.delivered
    }

    /// Deliver `payload` and report how it went.
    pub async fn send_with_report(
        &self,
        payload: &serde_json::Value,
        extra_headers: &HashMap<String, String>,
    ) -> DispatchReport {
        let body = payload.to_string();
        let signature = sign_payload(
            &body,
            self.config.secret(),
            self.config.signature_scheme(),
        );
        let policy = RetryPolicy::exponential_seconds(self.config.retry_attempts());

        let outcome = policy
            .run(|attempt| self.attempt(attempt, &body, &signature, extra_headers))
            .await;

        let report = match outcome {
            RetryOutcome::Succeeded { attempts, .. } => {
                self.metrics.delivered.fetch_add(1, Ordering::Relaxed);
                DispatchReport {
                    delivered: true,
                    attempts,
                    last_error: None,
                }
            }
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    url = %self.config.url(),
                    attempts,
                    last_error = %last_error,
                    "Webhook delivery failed after all attempts"
                );
                DispatchReport {
                    delivered: false,
                    attempts,
                    last_error: Some(last_error.to_string()),
                }
            }
        };

        if report.attempts > 1 {
            self.metrics.retried.fetch_add(1, Ordering::Relaxed);
        }
        report
    }

    async fn attempt(
        &self,
        attempt: u32,
        body: &str,
        signature: &str,
        extra_headers: &HashMap<String, String>,
    ) -> Result<u16, AttemptError> {
        self.metrics.total_attempts.fetch_add(1, Ordering::Relaxed);

        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            (
                TIMESTAMP_HEADER.to_string(),
                chrono::Utc::now().timestamp_millis().to_string(),
            ),
            (SIGNATURE_HEADER.to_string(), signature.to_string()),
        ];
        for (name, value) in extra_headers {
            if is_reserved(name) {
                tracing::debug!(header = %name, "Ignoring caller-supplied reserved header");
                continue;
            }
            headers.push((name.clone(), value.clone()));
        }

        let request = OutboundRequest {
            url: self.config.url().to_string(),
            headers,
            body: body.to_string(),
        };

        let timeout = self.config.timeout();
        let status = tokio::time::timeout(timeout, self.transport.post(request))
            .await
            .map_err(|_| AttemptError::Timeout(timeout))??;

        if (200..300).contains(&status) {
            tracing::debug!(url = %self.config.url(), attempt, status, "Webhook delivered");
            Ok(status)
        } else {
            Err(AttemptError::Status(status))
        }
    }
}
