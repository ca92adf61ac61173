//! `insightfy` server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) and `INSIGHTFY_*`
//! environment variables, opens the SQLite store and either serves HTTP or
//! runs a single sync job and prints its report.
//!
//! # Usage
//!
//! ```
//! insightfy serve
//! insightfy sync campaign-insights --since 2024-03-01 --until 2024-03-31
//! insightfy sync leads --account 6f1c… --dry-run
//! insightfy hash-password
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use insightfy_meta::GraphClient;
use insightfy_server::{AppState, ServerConfig, auth::hash_password, sync::{SyncJob, SyncKind}};
use insightfy_store_sqlite::SqliteStore;
use insightfy_sync::SyncEngine;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "insightfy", author, version, about = "Insightfy ads analytics and CRM server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API and webhooks.
  Serve,

  /// Run one sync job and print its report as JSON.
  Sync {
    kind: SyncKind,

    /// First day of the window (YYYY-MM-DD).
    #[arg(long)]
    since: Option<NaiveDate>,

    /// Last day of the window (YYYY-MM-DD).
    #[arg(long)]
    until: Option<NaiveDate>,

    /// Restrict to these ad accounts; repeatable.
    #[arg(long = "account", value_name = "UUID")]
    accounts: Vec<Uuid>,

    /// Fetch and count without writing.
    #[arg(long)]
    dry_run: bool,
  },

  /// Print the argon2 hash for a password entered on stdin.
  HashPassword,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if let Command::HashPassword = cli.command {
    let password = rpassword_or_stdin()?;
    let hash = hash_password(&password).map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;
    println!("{hash}");
    return Ok(());
  }

  let config = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

  let store_path = expand_tilde(&config.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let graph = GraphClient::new(&config.meta).context("failed to build Graph API client")?;

  match cli.command {
    Command::Serve => serve(store, graph, config).await,
    Command::Sync { kind, since, until, accounts, dry_run } => {
      let engine = SyncEngine::new(store, graph, config.sync_config());
      let outcome = SyncJob::from_cli(kind, since, until, accounts, dry_run)
        .run(&engine)
        .await
        .with_context(|| format!("{kind} sync failed"))?;
      println!("{}", serde_json::to_string_pretty(&outcome)?);
      if outcome.rate_limited() {
        tracing::warn!(%kind, "some Graph requests were rate limited; rerun later to fill the gaps");
      }
      Ok(())
    }
    Command::HashPassword => Ok(()),
  }
}

async fn serve(store: SqliteStore, graph: GraphClient, config: ServerConfig) -> anyhow::Result<()> {
  if config.auth_password_hash.trim().is_empty() {
    bail!("auth_password_hash is not set; generate one with `insightfy hash-password`");
  }
  let address = format!("{}:{}", config.host, config.port);

  let app = insightfy_server::router(AppState::new(store, graph, config));

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin (no echo).
fn rpassword_or_stdin() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  let stdin = io::stdin();
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_owned())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
