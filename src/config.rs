//! Service configuration loaded from environment variables.
//!
//! `.env` files are honored via `dotenvy` by the binary before calling
//! [`Config::from_env`].

use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::ProviderKind;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 1000;
pub const DEFAULT_CHAT_RATE_LIMIT: u32 = 20;
pub const DEFAULT_CHAT_RATE_WINDOW_SECS: u64 = 60;

/// Connection settings for one OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: SecretString,
    pub base_url: String,
}

/// GitHub OAuth application settings.
#[derive(Debug, Clone)]
pub struct GitHubOAuthConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub groq: Option<ProviderConfig>,
    pub together: Option<ProviderConfig>,
    pub github_webhook_secret: Option<SecretString>,
    pub github_oauth: Option<GitHubOAuthConfig>,
    pub event_log_capacity: usize,
    pub chat_rate_limit: u32,
    pub chat_rate_window_secs: u64,
    /// Key chat rate limits on `X-Forwarded-For` instead of the peer address.
    /// Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: DEFAULT_PORT,
            groq: None,
            together: None,
            github_webhook_secret: None,
            github_oauth: None,
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
            chat_rate_limit: DEFAULT_CHAT_RATE_LIMIT,
            chat_rate_window_secs: DEFAULT_CHAT_RATE_WINDOW_SECS,
            trust_forwarded_for: false,
        }
    }
}

impl Config {
    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let host = match get("CHATBRIDGE_HOST") {
            Some(raw) => raw.parse::<IpAddr>().map_err(|e| ConfigError::InvalidValue {
                key: "CHATBRIDGE_HOST".to_string(),
                message: format!("{e}"),
            })?,
            None => defaults.host,
        };

        let provider = |kind: ProviderKind, key_var: &str, url_var: &str| {
            get(key_var).map(|key| ProviderConfig {
                kind,
                api_key: SecretString::from(key),
                base_url: get(url_var).unwrap_or_else(|| kind.default_base_url().to_string()),
            })
        };

        let github_oauth = match (get("GITHUB_CLIENT_ID"), get("GITHUB_CLIENT_SECRET")) {
            (Some(client_id), Some(secret)) => Some(GitHubOAuthConfig {
                client_id,
                client_secret: SecretString::from(secret),
                redirect_uri: get("GITHUB_REDIRECT_URI").ok_or_else(|| {
                    ConfigError::MissingRequired {
                        key: "GITHUB_REDIRECT_URI".to_string(),
                        hint: "Required when GITHUB_CLIENT_ID is set".to_string(),
                    }
                })?,
            }),
            _ => None,
        };

        let event_log_capacity: usize =
            parse_or(&get, "WEBHOOK_LOG_CAPACITY", defaults.event_log_capacity)?;
        if event_log_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "WEBHOOK_LOG_CAPACITY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            host,
            port: parse_or(&get, "CHATBRIDGE_PORT", defaults.port)?,
            groq: provider(ProviderKind::Groq, "GROQ_API_KEY", "GROQ_BASE_URL"),
            together: provider(ProviderKind::Together, "TOGETHER_API_KEY", "TOGETHER_BASE_URL"),
            github_webhook_secret: get("GITHUB_WEBHOOK_SECRET").map(SecretString::from),
            github_oauth,
            event_log_capacity,
            chat_rate_limit: parse_or(&get, "CHAT_RATE_LIMIT", defaults.chat_rate_limit)?,
            chat_rate_window_secs: parse_or(
                &get,
                "CHAT_RATE_WINDOW_SECS",
                defaults.chat_rate_window_secs,
            )?,
            trust_forwarded_for: parse_or(
                &get,
                "CHATBRIDGE_TRUST_FORWARDED_FOR",
                defaults.trust_forwarded_for,
            )?,
        })
    }

    /// Socket address the HTTP server binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_empty() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.groq.is_none());
        assert!(config.together.is_none());
        assert!(config.github_oauth.is_none());
        assert_eq!(config.event_log_capacity, DEFAULT_EVENT_LOG_CAPACITY);
        assert_eq!(config.bind_addr().to_string(), "127.0.0.1:3000");
        assert!(!config.trust_forwarded_for);
    }

    #[test]
    fn test_trust_forwarded_for() {
        let config =
            Config::from_lookup(lookup(&[("CHATBRIDGE_TRUST_FORWARDED_FOR", "true")])).unwrap();
        assert!(config.trust_forwarded_for);

        let err = Config::from_lookup(lookup(&[("CHATBRIDGE_TRUST_FORWARDED_FOR", "yes")]))
            .unwrap_err();
        assert!(err.to_string().contains("CHATBRIDGE_TRUST_FORWARDED_FOR"));
    }

    #[test]
    fn test_provider_keys_enable_providers() {
        let config = Config::from_lookup(lookup(&[
            ("GROQ_API_KEY", "gsk_test"),
            ("TOGETHER_API_KEY", "tg_test"),
            ("TOGETHER_BASE_URL", "http://localhost:9999/v1"),
        ]))
        .unwrap();

        let groq = config.groq.unwrap();
        assert_eq!(groq.api_key.expose_secret(), "gsk_test");
        assert_eq!(groq.base_url, ProviderKind::Groq.default_base_url());

        let together = config.together.unwrap();
        assert_eq!(together.base_url, "http://localhost:9999/v1");
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let err = Config::from_lookup(lookup(&[("CHATBRIDGE_PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("CHATBRIDGE_PORT"));
    }

    #[test]
    fn test_zero_log_capacity_is_rejected() {
        let err = Config::from_lookup(lookup(&[("WEBHOOK_LOG_CAPACITY", "0")])).unwrap_err();
        assert!(err.to_string().contains("WEBHOOK_LOG_CAPACITY"));
    }

    #[test]
    fn test_oauth_requires_redirect_uri() {
        let err = Config::from_lookup(lookup(&[
            ("GITHUB_CLIENT_ID", "id"),
            ("GITHUB_CLIENT_SECRET", "secret"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("GITHUB_REDIRECT_URI"));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = Config::from_lookup(lookup(&[("GROQ_API_KEY", "  ")])).unwrap();
        assert!(config.groq.is_none());
    }
}
