//! JSON REST API for the immersion establishment directory.
//!
//! Exposes an axum [`Router`] backed by any
//! [`immersion_core::store::EstablishmentStore`]. TLS and geocoding are the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = immersion_api::router(state);
//! ```

pub mod auth;
pub mod error;
pub mod establishments;
pub mod search;
pub mod sync;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use immersion_core::{
  merge::AggregateMergeEngine,
  search::{SearchQueryEngine, SearchSettings},
  store::EstablishmentStore,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

use auth::{ApiConsumer, AuthConfig};

// ─── Configuration ────────────────────────────────────────────────────────────

fn default_max_results() -> usize { SearchSettings::default().default_max_results }

/// Runtime server configuration, deserialised from `config.toml` and
/// `IMMERSION_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  pub store_path:          PathBuf,
  /// Result cap for searches that set no `max_results`.
  #[serde(default = "default_max_results")]
  pub default_max_results: usize,
  #[serde(default)]
  pub consumers:           Vec<ApiConsumer>,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub merge:  AggregateMergeEngine<S>,
  pub search: SearchQueryEngine<S>,
  pub auth:   Arc<AuthConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      merge:  self.merge.clone(),
      search: self.search.clone(),
      auth:   Arc::clone(&self.auth),
    }
  }
}

impl<S: EstablishmentStore> AppState<S> {
  pub fn new(store: Arc<S>, config: &ServerConfig) -> Self {
    let settings = SearchSettings { default_max_results: config.default_max_results };
    Self {
      merge:  AggregateMergeEngine::new(Arc::clone(&store)),
      search: SearchQueryEngine::new(store, settings),
      auth:   Arc::new(AuthConfig { consumers: config.consumers.clone() }),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API routes for `state`, without the `/api` prefix.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: EstablishmentStore + 'static,
{
  Router::new()
    // Search
    .route("/search", get(search::handler::<S>))
    // Establishments
    .route("/establishments", post(establishments::create::<S>))
    .route(
      "/establishments/{siret}",
      get(establishments::get_one::<S>)
        .put(establishments::edit::<S>)
        .delete(establishments::remove::<S>),
    )
    .route("/establishments/{siret}/registry", post(establishments::refresh_registry::<S>))
    // Feed
    .route("/sync", post(sync::handler::<S>))
    .with_state(state)
}

/// The full application: API under `/api` plus request tracing.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: EstablishmentStore + 'static,
{
  Router::new()
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http())
}
