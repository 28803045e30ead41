//! chatbridge binary.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chatbridge::cli::{Cli, Command, run_select_command, run_webhooks_command};
use chatbridge::config::Config;
use chatbridge::server::{AppState, HttpServer, router};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chatbridge=info,tower_http=info"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Some(Command::Select { query }) => run_select_command(&query),
        Some(Command::Webhooks(cmd)) => run_webhooks_command(cmd).await,
        Some(Command::Serve { host, port }) => serve(host, port).await,
        None => serve(None, None).await,
    }
}

async fn serve(host: Option<std::net::IpAddr>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    let state = AppState::from_config(&config);
    tracing::info!(
        oauth = config.github_oauth.is_some(),
        webhook_secret = config.github_webhook_secret.is_some(),
        event_log_capacity = config.event_log_capacity,
        "Starting chatbridge"
    );

    let mut server = HttpServer::new(config.bind_addr(), router(state));
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    server.shutdown().await;

    Ok(())
}
