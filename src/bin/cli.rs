//! Smartmark CLI
//!
//! Command-line client for a running Smartmark server:
//! - Show the signed-in account
//! - List, add and delete bookmarks
//! - Watch the list update live
//! - Check server health

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use smartmark::client::{
    ApiClient, BookmarkForm, BookmarkList, BookmarkRemote, ClientConfig, RealtimeFeed,
    Reconciler, SubmitOutcome,
};
use smartmark::storage::Bookmark;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "smartmark")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Personal bookmarks with live updates")]
#[command(long_about = "Client for a Smartmark server.\nSign in through the web page, then pass the smartmark_session cookie value with --session.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Server URL
    #[arg(long, default_value = "http://localhost:3000", global = true)]
    pub api_url: String,

    /// Session token (the smartmark_session cookie)
    #[arg(long, env = "SMARTMARK_SESSION", default_value = "", hide_env_values = true, global = true)]
    pub session: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the signed-in account
    Whoami,

    /// List bookmarks, newest first
    List,

    /// Add a bookmark
    Add {
        /// Link address
        url: String,
        /// Display title
        title: String,
    },

    /// Delete a bookmark by id
    Delete {
        id: Uuid,
    },

    /// Print the list every time it changes, until Ctrl+C
    Watch,

    /// Show server status
    Status,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smartmark=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Status => return status(&cli.api_url).await,
        Commands::Config { output } => {
            let config = smartmark::config::generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", config),
            }
            return Ok(());
        }
        _ => {}
    }

    if cli.session.is_empty() {
        bail!("no session token; pass --session or set SMARTMARK_SESSION");
    }
    let client = ApiClient::new(ClientConfig::new(&cli.api_url, &cli.session))?;

    match cli.command {
        Commands::Whoami => {
            let me = client.me().await.context("fetching account")?;
            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&me)?);
            } else {
                println!("Signed in as {}", me.email.as_deref().or(me.name.as_deref()).unwrap_or("-"));
                println!("  Provider: {}", me.provider);
                println!("  User id:  {}", me.id);
            }
        }

        Commands::List => {
            let bookmarks = client.list().await.context("listing bookmarks")?;
            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&bookmarks)?);
            } else {
                print_table(&BookmarkList::new(bookmarks));
            }
        }

        Commands::Add { url, title } => {
            let me = client.me().await.context("fetching account")?;
            let mut form = BookmarkForm::new(me.id);
            form.url = url;
            form.title = title;

            match form.submit(&client).await {
                SubmitOutcome::Created(bookmark) => {
                    println!("Added {} ({})", bookmark.title, bookmark.id);
                }
                SubmitOutcome::Skipped => bail!("url and title must not be blank"),
                SubmitOutcome::Failed => bail!("the server rejected the bookmark"),
            }
        }

        Commands::Delete { id } => {
            client.delete(id).await.context("deleting bookmark")?;
            println!("Deleted {}", id);
        }

        Commands::Watch => watch(&client).await?,

        Commands::Status | Commands::Config { .. } => {}
    }

    Ok(())
}

async fn watch(client: &ApiClient) -> anyhow::Result<()> {
    let me = client.me().await.context("fetching account")?;
    let reconciler = Reconciler::spawn(client.list().await.context("listing bookmarks")?);
    let mut snapshots = reconciler.subscribe();

    let feed = RealtimeFeed::for_client(client)?;
    let mut subscription = feed
        .subscribe("bookmarks-channel", me.id, reconciler.sender())
        .await
        .context("opening realtime feed")?;
    subscription.subscribed().await?;

    eprintln!("Watching bookmarks (Ctrl+C to stop)");
    print_table(&snapshots.borrow_and_update());

    let mut status = subscription.watch_status();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                println!();
                print_table(&snapshots.borrow_and_update());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    eprintln!("Realtime feed closed");
                    break;
                }
            }
        }
    }

    subscription.unsubscribe().await;
    reconciler.shutdown().await;
    Ok(())
}

async fn status(api_url: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", api_url.trim_end_matches('/'));
    let response = match reqwest::get(&url).await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("Cannot connect to Smartmark at {}", api_url);
            eprintln!("Error: {}", e);
            eprintln!();
            eprintln!("Make sure the server is running:");
            eprintln!("  cargo run --bin smartmark");
            std::process::exit(1);
        }
    };

    let health: serde_json::Value = response.json().await?;
    println!("Smartmark v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Server:   {}", health["status"].as_str().unwrap_or("unknown"));
    println!("Storage:  {}", health["storage"].as_str().unwrap_or("unknown"));
    println!(
        "Realtime: {} connection(s)",
        health["realtime_connections"].as_u64().unwrap_or(0)
    );
    if let Some(uptime) = health["uptime_seconds"].as_u64() {
        println!("Uptime:   {}", format_duration(uptime));
    }
    Ok(())
}

fn print_table(list: &BookmarkList) {
    if let Some(message) = list.empty_message() {
        println!("{}", message);
        return;
    }

    println!("{:<36}  {:<16}  {:<30}  {}", "ID", "Added", "Title", "URL");
    println!("{}", "-".repeat(110));
    for bookmark in list.items() {
        print_row(bookmark);
    }
}

fn print_row(bookmark: &Bookmark) {
    println!(
        "{:<36}  {:<16}  {:<30}  {}",
        bookmark.id,
        bookmark.created_at.format("%Y-%m-%d %H:%M"),
        truncate(&bookmark.title, 30),
        bookmark.url
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 3).collect();
        format!("{}...", cut)
    }
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}
