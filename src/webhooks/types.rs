use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, WebhookError};

/// Where an inbound webhook came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookSource {
    Github,
    Vercel,
    Generic,
    Unknown,
}

impl WebhookSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Vercel => "vercel",
            Self::Generic => "generic",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for WebhookSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookSource {
    type Err = WebhookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Self::Github),
            "vercel" => Ok(Self::Vercel),
            "generic" => Ok(Self::Generic),
            "unknown" => Ok(Self::Unknown),
            other => Err(WebhookError::UnknownSource(other.to_string())),
        }
    }
}

/// An inbound webhook as recorded in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// RFC 3339 timestamp of receipt.
    pub timestamp: String,
    pub source: WebhookSource,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl WebhookEvent {
    /// Create an event stamped with the current time.
    ///
    /// A missing `id` is replaced with a fresh UUID.
    pub fn new(
        id: Option<String>,
        event_type: impl Into<String>,
        source: WebhookSource,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            event_type: event_type.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            source,
            data,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = if metadata.is_empty() {
            None
        } else {
            Some(metadata)
        };
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        self
    }

    /// Parsed receipt time, if the stored timestamp is valid RFC 3339.
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// How outbound payloads are signed when a secret is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureScheme {
    /// `sha256=<hex HMAC-SHA256(secret, body)>`.
    #[default]
    HmacSha256,
    /// `base64(body ++ secret)`. Not a MAC; kept for receivers that still
    /// expect the old header format.
    LegacyBase64,
}

/// Destination settings for the outbound dispatcher.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    url: String,
    secret: Option<String>,
    retry_attempts: u32,
    timeout_ms: u64,
    signature_scheme: SignatureScheme,
}

impl WebhookConfig {
    pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
    /// Ten attempts sleep 1022 s in total between them.
    pub const MAX_RETRY_ATTEMPTS: u32 = 10;
    pub const MAX_TIMEOUT_MS: u64 = 60_000;

    /// Validate and build a destination config.
    pub fn new(
        url: impl Into<String>,
        secret: Option<String>,
        retry_attempts: u32,
        timeout_ms: u64,
    ) -> Result<Self, ConfigError> {
        let url = url.into();
        let parsed = url::Url::parse(&url).map_err(|e| ConfigError::InvalidValue {
            key: "url".to_string(),
            message: format!("{url}: {e}"),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                key: "url".to_string(),
                message: format!("unsupported scheme {}", parsed.scheme()),
            });
        }
        if !(1..=Self::MAX_RETRY_ATTEMPTS).contains(&retry_attempts) {
            return Err(ConfigError::InvalidValue {
                key: "retry_attempts".to_string(),
                message: format!("must be between 1 and {}", Self::MAX_RETRY_ATTEMPTS),
            });
        }
        if !(1..=Self::MAX_TIMEOUT_MS).contains(&timeout_ms) {
            return Err(ConfigError::InvalidValue {
                key: "timeout_ms".to_string(),
                message: format!("must be between 1 and {}", Self::MAX_TIMEOUT_MS),
            });
        }

        Ok(Self {
            url,
            secret: secret.filter(|s| !s.is_empty()),
            retry_attempts,
            timeout_ms,
            signature_scheme: SignatureScheme::default(),
        })
    }

    /// Config with default retry attempts and timeout.
    pub fn for_url(url: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(
            url,
            None,
            Self::DEFAULT_RETRY_ATTEMPTS,
            Self::DEFAULT_TIMEOUT_MS,
        )
    }

    pub fn with_signature_scheme(mut self, scheme: SignatureScheme) -> Self {
        self.signature_scheme = scheme;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn signature_scheme(&self) -> SignatureScheme {
        self.signature_scheme
    }
}
