//! drivebook server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) overlaid with
//! `DRIVEBOOK_*` environment variables (`__` separates nested keys, as in
//! `DRIVEBOOK_STRIPE__SECRET_KEY`), opens the SQLite store, and serves
//! the booking API over HTTP.
//!
//! # Seeding an administrator
//!
//! Generate the argon2 PHC string for `[bootstrap_admin] password_hash`:
//!
//! ```
//! cargo run -p drivebook-server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use clap::Parser;
use drivebook_api::ApiState;
use drivebook_core::{context::ServiceContext, directory::Directory, identity::Role};
use drivebook_server::{AppState, BootstrapAdmin, ServerConfig, auth, stripe::StripeClient};
use drivebook_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Driving-school booking server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
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

  if cli.hash_password {
    let password = read_password()?;
    let hash = auth::hash_password(&password).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("DRIVEBOOK").prefix_separator("_").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  server_cfg.schedule.validate().context("invalid lesson schedule")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let ctx = ServiceContext::new(Arc::new(store))
    .with_timeout(Duration::from_millis(server_cfg.upstream_timeout_ms));

  if let Some(admin) = &server_cfg.bootstrap_admin {
    seed_admin(&Directory::new(ctx.clone()), admin).await?;
  }

  let stripe = StripeClient::new(server_cfg.stripe.clone()).context("failed to build Stripe client")?;
  let api = ApiState::new(
    ctx,
    server_cfg.schedule,
    Arc::new(stripe),
    server_cfg.currency.clone(),
  );
  let state = AppState { api: Arc::new(api) };

  let app = drivebook_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Create the configured administrator unless the email is already taken.
async fn seed_admin(directory: &Directory<SqliteStore>, admin: &BootstrapAdmin) -> anyhow::Result<()> {
  if directory.credentials(&admin.email).await?.is_some() {
    tracing::debug!(email = %admin.email, "bootstrap admin already present");
    return Ok(());
  }
  let profile = directory
    .register_with_role(
      &admin.email,
      &admin.first_name,
      &admin.last_name,
      admin.password_hash.clone(),
      Role::Admin,
    )
    .await
    .context("failed to create bootstrap admin")?;
  tracing::info!(user_id = %profile.id, email = %profile.email, "bootstrap admin created");
  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
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
