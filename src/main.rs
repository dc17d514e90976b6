//! # POS Sync CLI (`possync`)
//!
//! ## Usage
//!
//! ```bash
//! possync --config ./config/possync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `possync init` | Create the SQLite database and run schema migrations |
//! | `possync seed --at <instant>` | Append an initial watermark |
//! | `possync sync` | Pull new customers and receipts from the POS API |
//! | `possync status` | Show the latest watermark (and optionally history) |
//! | `possync serve` | Start the HTTP server |
//!
//! The POS bearer token is read from `POS_API_TOKEN`; a `.env` file in the
//! working directory is loaded first if present.

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pos_sync::{config, migrate, server, status, sync};

/// POS Sync — incremental point-of-sale sync into SQLite.
#[derive(Parser)]
#[command(
    name = "possync",
    about = "POS Sync — incremental point-of-sale sync into SQLite",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/possync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the customers, receipts,
    /// line_items and sync_log tables. Safe to run repeatedly.
    Init,

    /// Append an initial watermark (provisioning).
    ///
    /// Accepts an RFC 3339 instant or a `YYYY-MM-DD` date (midnight UTC).
    /// Refuses to seed behind the current watermark.
    Seed {
        #[arg(long, value_parser = parse_instant_arg)]
        at: DateTime<Utc>,
    },

    /// Pull customers and receipts created since the last watermark.
    Sync {
        /// Fetch and count the pending window without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the latest watermark.
    Status {
        /// Also list the last N watermark log entries.
        #[arg(long)]
        history: Option<i64>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

/// Parse `--at` as RFC 3339 or as a plain date at midnight UTC.
fn parse_instant_arg(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid instant '{}': expected RFC 3339 or YYYY-MM-DD", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Seed { at } => {
            status::run_seed(&cfg, at).await?;
        }
        Commands::Sync { dry_run } => {
            sync::run_sync(&cfg, dry_run).await?;
        }
        Commands::Status { history } => {
            status::run_status(&cfg, history).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
