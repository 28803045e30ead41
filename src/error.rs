//! Error types for chatbridge.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Inbound and outbound webhook errors.
///
/// Outbound delivery failures are not represented here: the dispatcher
/// reports them through its return value.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Webhook signature mismatch for source {source_name}")]
    SignatureMismatch { source_name: String },

    #[error("Missing signature header {header}")]
    MissingSignature { header: String },

    #[error("Unknown webhook source: {0}")]
    UnknownSource(String),

    #[error("Webhook event {id} not found")]
    NotFound { id: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("No provider configured for {provider}")]
    NotConfigured { provider: String },
}

/// Key-value cache errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Key {key} holds a {actual} value, expected {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Value at {key} is not an integer")]
    NotAnInteger { key: String },

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

/// OAuth flow errors.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("Invalid or expired OAuth state parameter")]
    InvalidState,

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Profile fetch failed: {0}")]
    ProfileFetch(String),

    #[error("State storage failed: {0}")]
    Store(#[from] CacheError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// HTTP server lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to start server on {addr}: {reason}")]
    StartupFailed { addr: String, reason: String },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
