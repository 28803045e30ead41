//! GitHub OAuth sign-in.
//!
//! 1. [`GitHubOAuth::start`] mints a CSRF `state`, parks it in the cache with
//!    a TTL and returns the GitHub authorize URL.
//! 2. [`GitHubOAuth::complete`] consumes the state, exchanges the `code`
//!    for an access token and fetches the user's profile.
//!
//! The access token is held as `SecretString` and never leaves this module.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::cache::KeyValueStore;
use crate::config::GitHubOAuthConfig;
use crate::error::OAuthError;

pub const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
pub const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
pub const GITHUB_API_URL: &str = "https://api.github.com";

const SCOPES: &str = "read:user user:email";
const STATE_TTL: Duration = Duration::from_secs(600);
const USER_AGENT: &str = concat!("chatbridge/", env!("CARGO_PKG_VERSION"));

/// Set of every login that has signed in.
pub const USERS_KEY: &str = "users";

/// Cache key holding the stored profile hash for `login`.
pub fn user_key(login: &str) -> String {
    format!("user:{login}")
}

fn state_key(state: &str) -> String {
    format!("oauth:state:{state}")
}

/// Profile returned by `GET /user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl GitHubUser {
    fn to_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("id", self.id.to_string()), ("login", self.login.clone())];
        for (name, value) in [
            ("name", &self.name),
            ("email", &self.email),
            ("avatar_url", &self.avatar_url),
        ] {
            if let Some(value) = value {
                fields.push((name, value.clone()));
            }
        }
        fields
    }
}

/// Token endpoint reply. GitHub answers 200 with `error` set on failure.
#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// GitHub OAuth client for one registered application.
pub struct GitHubOAuth {
    client: reqwest::Client,
    config: GitHubOAuthConfig,
    store: Arc<dyn KeyValueStore>,
    authorize_url: String,
    token_url: String,
    api_url: String,
}

impl GitHubOAuth {
    pub fn new(config: GitHubOAuthConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            store,
            authorize_url: GITHUB_AUTHORIZE_URL.to_string(),
            token_url: GITHUB_TOKEN_URL.to_string(),
            api_url: GITHUB_API_URL.to_string(),
        }
    }

    /// Point the client at different GitHub endpoints.
    pub fn with_endpoints(
        mut self,
        authorize_url: impl Into<String>,
        token_url: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        self.authorize_url = authorize_url.into();
        self.token_url = token_url.into();
        self.api_url = api_url.into();
        self
    }

    /// Begin a sign-in. Returns the URL to redirect the browser to.
    pub async fn start(&self) -> Result<String, OAuthError> {
        let state: String = OsRng
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        self.store
            .set(&state_key(&state), "pending", Some(STATE_TTL))
            .await?;

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", SCOPES),
            ("state", state.as_str()),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        tracing::info!("GitHub OAuth flow started");

        Ok(format!("{}?{}", self.authorize_url, query))
    }

    /// Finish a sign-in: validate `state`, exchange `code`, fetch and
    /// record the user's profile.
    pub async fn complete(&self, state: &str, code: &str) -> Result<GitHubUser, OAuthError> {
        // Single use: delete reports whether the state was live.
        if state.is_empty() || !self.store.delete(&state_key(state)).await? {
            return Err(OAuthError::InvalidState);
        }

        let token = self.exchange_code(code).await?;
        let user = self.fetch_user(&token).await?;

        let key = user_key(&user.login);
        for (field, value) in user.to_fields() {
            self.store.hset(&key, field, &value).await?;
        }
        self.store.sadd(USERS_KEY, &user.login).await?;

        tracing::info!(login = %user.login, "GitHub sign-in completed");

        Ok(user)
    }

    async fn exchange_code(&self, code: &str) -> Result<SecretString, OAuthError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::TokenExchange(format!("HTTP {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::TokenExchange(format!("invalid token response: {e}")))?;

        match (token.access_token, token.error) {
            (Some(access_token), None) => Ok(SecretString::from(access_token)),
            (_, error) => Err(OAuthError::TokenExchange(
                token
                    .error_description
                    .or(error)
                    .unwrap_or_else(|| "no access token returned".to_string()),
            )),
        }
    }

    async fn fetch_user(&self, token: &SecretString) -> Result<GitHubUser, OAuthError> {
        let url = format!("{}/user", self.api_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .bearer_auth(token.expose_secret())
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OAuthError::ProfileFetch(format!("HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| OAuthError::ProfileFetch(e.to_string()))
    }

    /// Stored profile fields for `login`, if that user has signed in.
    pub async fn stored_profile(
        &self,
        login: &str,
    ) -> Result<Option<HashMap<String, String>>, OAuthError> {
        let fields = self.store.hgetall(&user_key(login)).await?;
        Ok((!fields.is_empty()).then_some(fields))
    }

    /// Logins of every user that has signed in, sorted.
    pub async fn known_users(&self) -> Result<Vec<String>, OAuthError> {
        Ok(self.store.smembers(USERS_KEY).await?)
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::Form;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    use super::*;
    use crate::cache::MemoryStore;

    fn config() -> GitHubOAuthConfig {
        GitHubOAuthConfig {
            client_id: "Iv1.abc".to_string(),
            client_secret: SecretString::from("shh".to_string()),
            redirect_uri: "http://localhost:3000/auth/github/callback".to_string(),
        }
    }

    fn state_from(url: &str) -> String {
        let parsed = url::Url::parse(url).unwrap();
        parsed
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    /// Serves the token and user endpoints on an ephemeral port.
    async fn fake_github() -> String {
        async fn token(Form(form): Form<HashMap<String, String>>) -> Json<serde_json::Value> {
            if form.get("code").map(String::as_str) == Some("good-code")
                && form.get("client_secret").map(String::as_str) == Some("shh")
            {
                Json(serde_json::json!({"access_token": "gho_123", "token_type": "bearer"}))
            } else {
                Json(serde_json::json!({
                    "error": "bad_verification_code",
                    "error_description": "The code passed is incorrect or expired."
                }))
            }
        }

        async fn user(headers: HeaderMap) -> Json<serde_json::Value> {
            assert_eq!(
                headers.get("authorization").unwrap().to_str().unwrap(),
                "Bearer gho_123"
            );
            Json(serde_json::json!({"id": 583231, "login": "octocat", "name": "The Octocat"}))
        }

        let app = Router::new()
            .route("/login/oauth/access_token", post(token))
            .route("/user", get(user));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn oauth_against_fake() -> GitHubOAuth {
        let base = fake_github().await;
        GitHubOAuth::new(config(), Arc::new(MemoryStore::new())).with_endpoints(
            format!("{base}/login/oauth/authorize"),
            format!("{base}/login/oauth/access_token"),
            base,
        )
    }

    #[tokio::test]
    async fn test_authorize_url_contains_parameters() {
        let oauth = GitHubOAuth::new(config(), Arc::new(MemoryStore::new()));
        let url = oauth.start().await.unwrap();

        assert!(url.starts_with(GITHUB_AUTHORIZE_URL));
        assert!(url.contains("client_id=Iv1.abc"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fgithub%2Fcallback"));
        assert!(url.contains("scope=read%3Auser%20user%3Aemail"));
        assert_eq!(state_from(&url).len(), 32);
    }

    #[tokio::test]
    async fn test_states_are_unique() {
        let oauth = GitHubOAuth::new(config(), Arc::new(MemoryStore::new()));
        let a = state_from(&oauth.start().await.unwrap());
        let b = state_from(&oauth.start().await.unwrap());
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_unknown_state_rejected() {
        let oauth = GitHubOAuth::new(config(), Arc::new(MemoryStore::new()));
        assert!(matches!(
            oauth.complete("forged", "code").await,
            Err(OAuthError::InvalidState)
        ));
        assert!(matches!(
            oauth.complete("", "code").await,
            Err(OAuthError::InvalidState)
        ));
    }

    #[tokio::test]
    async fn test_full_flow_records_user() {
        let oauth = oauth_against_fake().await;
        let state = state_from(&oauth.start().await.unwrap());

        let user = oauth.complete(&state, "good-code").await.unwrap();
        assert_eq!(user.login, "octocat");
        assert_eq!(user.id, 583231);

        let profile = oauth.stored_profile("octocat").await.unwrap().unwrap();
        assert_eq!(profile["name"], "The Octocat");
        assert!(!profile.contains_key("email"));
        assert_eq!(oauth.known_users().await.unwrap(), vec!["octocat"]);

        // The state cannot be replayed.
        assert!(matches!(
            oauth.complete(&state, "good-code").await,
            Err(OAuthError::InvalidState)
        ));
    }

    #[tokio::test]
    async fn test_rejected_code_is_token_exchange_error() {
        let oauth = oauth_against_fake().await;
        let state = state_from(&oauth.start().await.unwrap());

        let err = oauth.complete(&state, "bad-code").await.unwrap_err();
        match err {
            OAuthError::TokenExchange(msg) => assert!(msg.contains("incorrect or expired")),
            other => panic!("expected TokenExchange, got {other:?}"),
        }
        assert!(oauth.stored_profile("octocat").await.unwrap().is_none());
    }
}
