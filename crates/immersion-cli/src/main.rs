//! `immersion`: command-line client for the immersion directory API.
//!
//! # Usage
//!
//! ```
//! immersion --url http://localhost:8080 search --lat 43.29 --lon 5.37 --distance-km 10 --rome D1102
//! immersion --config ~/.config/immersion/config.toml sync feed.json
//! ```

mod client;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client::{ApiClient, ApiConfig, SearchQuery};
use immersion_core::{
  Siret,
  establishment::{EstablishmentAggregate, RegistryUpdate},
  search::SearchResult,
};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "immersion", about = "Client for the immersion establishment directory")]
struct Args {
  /// Path to a TOML config file (url, consumer, key).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the server (default: http://localhost:8080).
  #[arg(long, env = "IMMERSION_URL")]
  url: Option<String>,

  /// API consumer name.
  #[arg(long, env = "IMMERSION_CONSUMER")]
  consumer: Option<String>,

  /// API consumer key (plaintext).
  #[arg(long, env = "IMMERSION_KEY")]
  key: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Find establishments around a point.
  Search {
    #[arg(long, allow_hyphen_values = true)]
    lat:            f64,
    #[arg(long, allow_hyphen_values = true)]
    lon:            f64,
    #[arg(long)]
    distance_km:    f64,
    /// Occupation code; repeat or comma-separate for several.
    #[arg(long, value_delimiter = ',')]
    rome:           Vec<String>,
    #[arg(long)]
    max_results:    Option<usize>,
    #[arg(long)]
    voluntary_only: bool,
    #[arg(long)]
    siret:          Option<Siret>,
  },
  /// Print one establishment aggregate as JSON.
  Show { siret: Siret },
  /// Submit a form aggregate read from a JSON file.
  Upsert {
    file: PathBuf,
    /// Edit the existing listing instead of creating it.
    #[arg(long)]
    edit: bool,
  },
  /// Push a JSON array of feed aggregates.
  Sync { file: PathBuf },
  /// Delete an establishment with its contact and offers.
  Remove { siret: Siret },
  /// Apply a legal-registry refresh read from a JSON file.
  Registry { siret: Siret, file: PathBuf },
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:      String,
  #[serde(default)]
  consumer: String,
  #[serde(default)]
  key:      String,
}

fn non_empty(s: &str) -> Option<String> { (!s.is_empty()).then(|| s.to_owned()) }

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading {}", path.display()))?;
  serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn print_results(results: &[SearchResult]) {
  for r in results {
    let name = r.customized_name.as_deref().unwrap_or(&r.name);
    let rome = r.rome_code.as_deref().unwrap_or("-");
    let mark = if r.voluntary_to_immersion { "*" } else { " " };
    println!(
      "{mark} {siret}  {rome:<6} {distance:>7} m  {name}, {city}",
      siret = r.siret,
      distance = r.distance_m,
      city = r.address.city,
    );
    if let Some(contact) = &r.contact_details {
      println!(
        "    {} {} <{}> {}",
        contact.first_name, contact.last_name, contact.email, contact.phone
      );
    }
  }
  println!("{} result(s)", results.len());
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let api_config = ApiConfig {
    base_url: args
      .url
      .or_else(|| non_empty(&file_cfg.url))
      .unwrap_or_else(|| "http://localhost:8080".to_string()),
    consumer: args
      .consumer
      .or_else(|| non_empty(&file_cfg.consumer))
      .unwrap_or_default(),
    key:      args
      .key
      .or_else(|| non_empty(&file_cfg.key))
      .unwrap_or_default(),
  };
  tracing::debug!(url = %api_config.base_url, consumer = %api_config.consumer, "client configured");

  let client = ApiClient::new(api_config)?;

  match args.command {
    Command::Search { lat, lon, distance_km, rome, max_results, voluntary_only, siret } => {
      let query = SearchQuery { rome, lat, lon, distance_km, max_results, voluntary_only, siret };
      print_results(&client.search(&query).await?);
    }
    Command::Show { siret } => print_json(&client.get(&siret).await?)?,
    Command::Upsert { file, edit } => {
      let aggregate: EstablishmentAggregate = read_json(&file)?;
      let stored = if edit {
        client.edit(&aggregate).await?
      } else {
        client.create(&aggregate).await?
      };
      println!(
        "{} {} ({} offer(s))",
        if edit { "updated" } else { "created" },
        stored.establishment.display_name(),
        stored.offers.len()
      );
    }
    Command::Sync { file } => {
      let aggregates: Vec<EstablishmentAggregate> = read_json(&file)?;
      let report = client.sync(&aggregates).await?;
      println!(
        "inserted {}, updated {}, skipped {}, failed {}",
        report.inserted, report.updated, report.skipped, report.failed
      );
      for failure in &report.failures {
        println!("  {}: {}", failure.siret, failure.message);
      }
    }
    Command::Remove { siret } => {
      client.remove(&siret).await?;
      println!("removed {siret}");
    }
    Command::Registry { siret, file } => {
      let update: RegistryUpdate = read_json(&file)?;
      print_json(&client.refresh_registry(&siret, &update).await?)?;
    }
  }

  Ok(())
}
