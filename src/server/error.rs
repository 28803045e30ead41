//! Mapping service errors onto HTTP responses.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::{CacheError, Error, LlmError, OAuthError, WebhookError};

/// Response envelope for API errors.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Error returned from handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request outside any service error type.
    BadRequest(String),
    NotFound(String),
    /// A required integration has no configuration.
    Unavailable(&'static str),
    Service(Error),
}

impl<E: Into<Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self::Service(err.into())
    }
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Unavailable(what) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("{what} is not configured"),
            ),
            Self::Service(err) => match err {
                Error::Webhook(e) => match e {
                    WebhookError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, e.to_string()),
                    WebhookError::SignatureMismatch { .. } | WebhookError::MissingSignature { .. } => {
                        (StatusCode::UNAUTHORIZED, e.to_string())
                    }
                    WebhookError::UnknownSource(_) | WebhookError::NotFound { .. } => {
                        (StatusCode::NOT_FOUND, e.to_string())
                    }
                },
                Error::Cache(CacheError::RateLimited { .. }) => {
                    (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded".to_string())
                }
                Error::Config(e) => (StatusCode::BAD_REQUEST, e.to_string()),
                Error::OAuth(OAuthError::InvalidState) => {
                    (StatusCode::BAD_REQUEST, OAuthError::InvalidState.to_string())
                }
                Error::Llm(LlmError::NotConfigured { .. }) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "No AI provider is configured".to_string(),
                ),
                Error::Llm(_) | Error::OAuth(_) => {
                    (StatusCode::BAD_GATEWAY, "Upstream service error".to_string())
                }
                Error::Cache(_) | Error::Server(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                ),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = ?self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %message, "Request rejected");
        }

        let mut response = (status, Json(ApiResponse::<()>::err(message))).into_response();
        if let Self::Service(Error::Cache(CacheError::RateLimited { retry_after_secs })) = &self
            && let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}
