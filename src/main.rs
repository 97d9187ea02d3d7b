mod analytics;
mod api;
mod auth;
mod config;
mod db;
mod livekit;
mod models;
mod payments;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::db::Database;

/// Fitness coaching API: workout logging, analytics, voice-agent
/// session tokens and subscription entitlement.
#[derive(Parser)]
#[command(name = "repcoach", version)]
struct Cli {
    /// Override the configured bind address (host:port).
    #[arg(long)]
    bind: Option<String>,
    /// Override the configured SQLite database path.
    #[arg(long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("repcoach=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load().context("failed to load configuration")?;
    if let Some(bind) = cli.bind {
        config.api_bind_addr = bind;
    }
    if let Some(database_url) = cli.database {
        config.database_url = database_url;
    }

    let database = Database::new(&config.database_url)
        .with_context(|| format!("failed to open database at {}", config.database_url))?;
    info!(database = %config.database_url, "database ready");

    api::run_server(config, Arc::new(Mutex::new(database))).await
}
