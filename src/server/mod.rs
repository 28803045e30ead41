//! HTTP API.
//!
//! [`AppState`] holds the shared services; [`router`] wires every route
//! onto it; [`HttpServer`] binds, serves and shuts down gracefully.

mod auth;
mod chat;
pub mod error;
mod webhooks;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use secrecy::SecretString;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cache::{KeyValueStore, MemoryStore, RateLimiter};
use crate::config::Config;
use crate::error::ServerError;
use crate::llm::{FailoverRouter, ModelSelector, OpenAiCompatProvider};
use crate::oauth::GitHubOAuth;
use crate::webhooks::{DispatchMetrics, EventLog, HttpTransport, WebhookTransport};

pub use chat::FALLBACK_REPLY;

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub events: Arc<EventLog>,
    pub selector: Arc<ModelSelector>,
    pub llm: Arc<FailoverRouter>,
    pub cache: Arc<dyn KeyValueStore>,
    pub chat_limiter: RateLimiter,
    pub oauth: Option<Arc<GitHubOAuth>>,
    pub github_webhook_secret: Option<SecretString>,
    pub transport: Arc<dyn WebhookTransport>,
    pub dispatch_metrics: Arc<DispatchMetrics>,
    pub trust_forwarded_for: bool,
}

impl AppState {
    /// Build every service from configuration.
    pub fn from_config(config: &Config) -> Self {
        let cache: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let mut llm = FailoverRouter::new();
        for provider in [&config.groq, &config.together].into_iter().flatten() {
            tracing::info!(provider = %provider.kind, "AI provider enabled");
            llm.add_provider(
                provider.kind,
                Arc::new(OpenAiCompatProvider::new(provider.clone())),
            );
        }
        if llm.is_empty() {
            tracing::warn!("No AI provider configured; chat will answer with the fallback reply");
        }

        let oauth = config
            .github_oauth
            .clone()
            .map(|c| Arc::new(GitHubOAuth::new(c, Arc::clone(&cache))));

        Self {
            events: Arc::new(EventLog::new(config.event_log_capacity)),
            selector: Arc::new(ModelSelector::new()),
            llm: Arc::new(llm),
            chat_limiter: RateLimiter::new(
                Arc::clone(&cache),
                config.chat_rate_limit,
                Duration::from_secs(config.chat_rate_window_secs),
            )
            .with_prefix("ratelimit:chat"),
            cache,
            oauth,
            github_webhook_secret: config.github_webhook_secret.clone(),
            transport: Arc::new(HttpTransport::new()),
            dispatch_metrics: Arc::new(DispatchMetrics::new()),
            trust_forwarded_for: config.trust_forwarded_for,
        }
    }

    /// Replace the LLM router.
    pub fn with_llm(mut self, llm: FailoverRouter) -> Self {
        self.llm = Arc::new(llm);
        self
    }

    /// Replace the outbound webhook transport.
    pub fn with_transport(mut self, transport: Arc<dyn WebhookTransport>) -> Self {
        self.transport = transport;
        self
    }
}

async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "events": state.events.len(),
        "providers": state.llm.provider_stats().await,
    }))
}

/// All routes with tracing and CORS applied.
///
/// Serve it with peer addresses attached, as [`HttpServer`] does; the chat
/// route keys its rate limit on them.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(webhooks::routes())
        .merge(chat::routes())
        .merge(auth::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The bound HTTP listener and its serving task.
pub struct HttpServer {
    addr: SocketAddr,
    app: Option<Router>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, app: Router) -> Self {
        Self {
            addr,
            app: Some(app),
            local_addr: None,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Bind the listener and spawn the server task.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        let addr = self.addr;
        let startup_failed = move |reason: String| ServerError::StartupFailed {
            addr: addr.to_string(),
            reason,
        };

        let app = self
            .app
            .take()
            .ok_or_else(|| startup_failed("server already started".to_string()))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| startup_failed(format!("Failed to bind: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| startup_failed(e.to_string()))?;

        tracing::info!("HTTP server listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("HTTP server shutting down");
                })
                .await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.handle = Some(handle);
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Signal graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
