//! CLI command handling.
//!
//! Provides subcommands for:
//! - Running the HTTP API (`serve`, the default)
//! - Previewing model selection for a query (`select`)
//! - Sending, signing and verifying webhooks (`webhooks send|sign|verify`)

mod webhooks;

pub use webhooks::{WebhooksCommand, run_webhooks_command, signature_for};

use std::net::IpAddr;

use clap::{Parser, Subcommand};

use crate::llm::ModelSelector;

#[derive(Parser, Debug)]
#[command(name = "chatbridge")]
#[command(about = "Chat backend with model routing, AI provider failover and a webhook console")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API (default if no subcommand given)
    Serve {
        /// Address to bind, overriding CHATBRIDGE_HOST
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port to bind, overriding CHATBRIDGE_PORT
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show which model a query would be routed to
    Select {
        /// Query text
        query: String,
    },

    /// Send, sign and verify webhooks
    #[command(subcommand)]
    Webhooks(WebhooksCommand),
}

/// Print the routing decision for `query` as JSON.
pub fn run_select_command(query: &str) -> anyhow::Result<()> {
    let decision = ModelSelector::new().select_with_hints(query, &Default::default());
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}
