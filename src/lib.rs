//! chatbridge: a chat backend that routes queries to Groq or Together,
//! fails over between them, and runs a webhook console with signed
//! outbound delivery and an inbound event log.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod oauth;
pub mod server;
pub mod webhooks;

pub use config::Config;
pub use error::{Error, Result};
