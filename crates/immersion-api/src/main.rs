//! immersion-server binary.
//!
//! Loads [`ServerConfig`] from `config.toml` (or `--config`) layered with
//! `IMMERSION_*` environment variables, opens the SQLite directory and
//! serves the JSON API.
//!
//! Consumer entries carry argon2 hashes, never plaintext keys:
//!
//! ```
//! cargo run -p immersion-api --bin immersion-server -- --hash-key
//! ```

use std::{
  io::{self, BufRead, Write},
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, ensure};
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use immersion_api::{AppState, ServerConfig};
use immersion_store_sqlite::SqliteStore;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Immersion establishment directory server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Read an API consumer key on stdin, print its argon2 hash and exit.
  #[arg(long)]
  hash_key: bool,
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
  if cli.hash_key {
    println!("{}", hash_consumer_key(&prompt_consumer_key()?)?);
    return Ok(());
  }

  let config = load_config(&cli.config)?;
  serve(config).await
}

/// Layer the TOML file and `IMMERSION_*` variables, then check the values
/// the engines rely on.
fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
  let config: ServerConfig = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("IMMERSION"))
    .build()
    .with_context(|| format!("failed to read configuration from {}", path.display()))?
    .try_deserialize()
    .context("invalid server configuration")?;

  ensure!(config.default_max_results > 0, "default_max_results must be at least 1");
  for consumer in &config.consumers {
    argon2::PasswordHash::new(&consumer.key_hash).map_err(|e| {
      anyhow::anyhow!("consumer {:?} has an invalid key_hash: {e}", consumer.name)
    })?;
  }
  Ok(config)
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
  if config.consumers.is_empty() {
    warn!("no API consumers configured; writes will answer 401 and searches omit contacts");
  } else {
    let names: Vec<&str> = config.consumers.iter().map(|c| c.name.as_str()).collect();
    info!(consumers = ?names, "API consumers loaded");
  }

  let store_path = expand_home(&config.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open establishment directory at {store_path:?}"))?;

  let app = immersion_api::router(AppState::new(Arc::new(store), &config));
  let address = format!("{}:{}", config.host, config.port);
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  info!(%address, default_max_results = config.default_max_results, "serving immersion API");
  axum::serve(listener, app).await.context("server error")
}

fn prompt_consumer_key() -> anyhow::Result<String> {
  eprint!("API key: ");
  io::stderr().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  let key = line.trim_end_matches(['\n', '\r']).to_string();
  ensure!(!key.is_empty(), "empty API key");
  Ok(key)
}

fn hash_consumer_key(key: &str) -> anyhow::Result<String> {
  let salt = SaltString::generate(&mut OsRng);
  Ok(
    Argon2::default()
      .hash_password(key.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string(),
  )
}

/// `~/dir/file.db` → `$HOME/dir/file.db`.
fn expand_home(path: &Path) -> PathBuf {
  match (path.strip_prefix("~"), std::env::var_os("HOME")) {
    (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
    _ => path.to_path_buf(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hashed_keys_verify() {
    use argon2::{PasswordHash, PasswordVerifier};
    let hash = hash_consumer_key("s3cret").unwrap();
    let parsed = PasswordHash::new(&hash).unwrap();
    assert!(Argon2::default().verify_password(b"s3cret", &parsed).is_ok());
  }

  #[test]
  fn home_prefix_is_expanded_only_at_the_start() {
    let plain = Path::new("/var/lib/immersion.db");
    assert_eq!(expand_home(plain), plain.to_path_buf());
    if let Some(home) = std::env::var_os("HOME") {
      assert_eq!(expand_home(Path::new("~/immersion.db")), PathBuf::from(home).join("immersion.db"));
    }
  }
}
