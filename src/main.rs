//! Smartmark Server
//!
//! Run with: cargo run --bin smartmark -- [--config path/to/config.toml]
//!
//! # Configuration
//!
//! Read from `--config`, or the first of `~/.config/smartmark/config.toml`,
//! `/etc/smartmark/config.toml` and `./config.toml` that exists. `SMARTMARK_*`
//! environment variables override file settings (see `smartmark-cli config`).
//! `RUST_LOG` takes precedence over the configured log level.

use anyhow::Context;
use clap::Parser;
use smartmark::api::{serve, AppState};
use smartmark::auth::OAuthClient;
use smartmark::config::{Config, LoggingConfig};
use smartmark::storage::Store;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "smartmark")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Smart Bookmark App server")]
struct Args {
    /// Config file (default: search the standard locations)
    #[arg(short, long, env = "SMARTMARK_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    init_tracing(&config.logging);

    tracing::info!("Starting Smartmark v{}", env!("CARGO_PKG_VERSION"));

    if config.auth.client_id.is_empty() {
        tracing::warn!("No OAuth client id configured; sign-in will fail until SMARTMARK_OAUTH_CLIENT_ID is set");
    }

    // Storage
    let store = Store::open(config.store_config())
        .await
        .context("opening bookmark store")?;
    let sweeper = store.start_session_sweeper(config.session_sweep_interval());

    // OAuth provider
    let identity = OAuthClient::new(config.oauth_config()).context("building OAuth client")?;
    tracing::info!(provider = %config.auth.provider, "OAuth provider configured");

    let api_config = config.api_config();
    let state = AppState::new(
        store,
        Arc::new(identity),
        api_config.clone(),
        config.hub_config(),
    )?;

    serve(state, &api_config).await?;

    sweeper.abort();
    tracing::info!("Smartmark server stopped");

    Ok(())
}

/// Install the global subscriber, JSON or human-readable
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("smartmark={},tower_http=info", logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
