//! Async HTTP client wrapping the immersion JSON API.

use anyhow::{Context, Result, anyhow};
use immersion_core::{
  Siret,
  establishment::{EstablishmentAggregate, RegistryUpdate},
  merge::BulkSyncReport,
  search::SearchResult,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Connection settings for the immersion API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  /// Consumer name; empty means anonymous.
  pub consumer: String,
  pub key:      String,
}

/// Query for `GET /api/search`.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
  pub rome:           Vec<String>,
  pub lat:            f64,
  pub lon:            f64,
  pub distance_km:    f64,
  pub max_results:    Option<usize>,
  pub voluntary_only: bool,
  pub siret:          Option<Siret>,
}

impl SearchQuery {
  fn pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
      ("lat", self.lat.to_string()),
      ("lon", self.lon.to_string()),
      ("distance_km", self.distance_km.to_string()),
    ];
    if !self.rome.is_empty() {
      pairs.push(("rome", self.rome.join(",")));
    }
    if let Some(max) = self.max_results {
      pairs.push(("max_results", max.to_string()));
    }
    if self.voluntary_only {
      pairs.push(("voluntary_only", "true".to_string()));
    }
    if let Some(siret) = &self.siret {
      pairs.push(("siret", siret.to_string()));
    }
    pairs
  }
}

/// Async HTTP client for the immersion JSON REST API.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!(
      "{}/api{}",
      self.config.base_url.trim_end_matches('/'),
      path
    )
  }

  fn auth(&self, req: RequestBuilder) -> RequestBuilder {
    if self.config.consumer.is_empty() {
      req
    } else {
      req.basic_auth(&self.config.consumer, Some(&self.config.key))
    }
  }

  /// Send `req` and turn a non-2xx answer into an error carrying the
  /// server's `{"error": ..}` message.
  async fn send(&self, req: RequestBuilder, what: &str) -> Result<Response> {
    let resp = self
      .auth(req)
      .send()
      .await
      .with_context(|| format!("{what} failed"))?;

    if resp.status().is_success() {
      return Ok(resp);
    }
    let status = resp.status();
    let message = resp
      .json::<serde_json::Value>()
      .await
      .ok()
      .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
      .unwrap_or_default();
    Err(anyhow!("{what} → {status} {message}"))
  }

  async fn json<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
    self
      .send(req, what)
      .await?
      .json()
      .await
      .with_context(|| format!("deserialising {what} response"))
  }

  // ── Search ────────────────────────────────────────────────────────────────

  /// `GET /api/search`
  pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
    let req = self.client.get(self.url("/search")).query(&query.pairs());
    self.json(req, "GET /search").await
  }

  // ── Establishments ────────────────────────────────────────────────────────

  /// `GET /api/establishments/{siret}`
  pub async fn get(&self, siret: &Siret) -> Result<EstablishmentAggregate> {
    let req = self.client.get(self.url(&format!("/establishments/{siret}")));
    self.json(req, "GET /establishments").await
  }

  /// `POST /api/establishments`
  pub async fn create(&self, aggregate: &EstablishmentAggregate) -> Result<EstablishmentAggregate> {
    let req = self.client.post(self.url("/establishments")).json(aggregate);
    self.json(req, "POST /establishments").await
  }

  /// `PUT /api/establishments/{siret}`
  pub async fn edit(&self, aggregate: &EstablishmentAggregate) -> Result<EstablishmentAggregate> {
    let path = format!("/establishments/{}", aggregate.siret());
    let req = self.client.put(self.url(&path)).json(aggregate);
    self.json(req, "PUT /establishments").await
  }

  /// `DELETE /api/establishments/{siret}`
  pub async fn remove(&self, siret: &Siret) -> Result<()> {
    let req = self.client.delete(self.url(&format!("/establishments/{siret}")));
    self.send(req, "DELETE /establishments").await?;
    Ok(())
  }

  /// `POST /api/establishments/{siret}/registry`
  pub async fn refresh_registry(
    &self,
    siret: &Siret,
    update: &RegistryUpdate,
  ) -> Result<EstablishmentAggregate> {
    let req = self
      .client
      .post(self.url(&format!("/establishments/{siret}/registry")))
      .json(update);
    self.json(req, "POST /establishments/registry").await
  }

  // ── Feed ──────────────────────────────────────────────────────────────────

  /// `POST /api/sync`
  pub async fn sync(&self, aggregates: &[EstablishmentAggregate]) -> Result<BulkSyncReport> {
    let req = self.client.post(self.url("/sync")).json(aggregates);
    self.json(req, "POST /sync").await
  }
}
