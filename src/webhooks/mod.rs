//! Webhook delivery, intake and journaling.
//!
//! Outbound: [`WebhookDispatcher`] posts signed payloads under a
//! [`RetryPolicy`]. Inbound: [`parse_delivery`] verifies and normalizes a
//! delivery into a [`WebhookEvent`], which is kept in an [`EventLog`] and
//! read back through [`EventQuery`].

pub mod dispatcher;
pub mod event_log;
pub mod inbound;
pub mod query;
pub mod retry;
pub mod types;
pub mod verify;

pub use dispatcher::{
    DispatchMetrics, DispatchReport, DispatchSnapshot, HttpTransport, WebhookDispatcher,
    WebhookTransport,
};
pub use event_log::EventLog;
pub use inbound::parse_delivery;
pub use query::{EventPage, EventQuery};
pub use retry::{Backoff, RetryOutcome, RetryPolicy};
pub use types::{SignatureScheme, WebhookConfig, WebhookEvent, WebhookSource};
pub use verify::{sign_payload, verify_github_signature, verify_hmac_sha256};
