//! The `EstablishmentStore` persistence port and its query/write types.
//!
//! The trait is implemented by storage backends (e.g.
//! `immersion-store-sqlite`). The engines in this crate depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  Siret,
  audit::SearchMade,
  establishment::{
    Contact, DataSource, Establishment, EstablishmentAggregate, Offer, RegistryUpdate,
  },
  geo::GeoPosition,
};

// ─── Write type ──────────────────────────────────────────────────────────────

/// One atomic change to a single siret's aggregate.
///
/// Backends must apply each value inside a single transaction so a
/// concurrent reader never sees an establishment without its offers or the
/// other way round.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateWrite {
  /// First ingestion: establishment, contact (if any) and every offer.
  Insert(EstablishmentAggregate),
  /// Delete the siret's establishment, contact and offers, then insert the
  /// aggregate as given.
  Replace(EstablishmentAggregate),
  /// Incremental merge. `establishment` overwrites the row when present,
  /// `contact` replaces the stored contact when present, `offers` are
  /// appended without removing any existing ones.
  Merge {
    siret:         Siret,
    establishment: Option<Establishment>,
    contact:       Option<Contact>,
    offers:        Vec<Offer>,
  },
  /// Registry refresh of the administrative subset only.
  Administrative {
    siret:      Siret,
    update:     RegistryUpdate,
    updated_at: DateTime<Utc>,
  },
}

impl AggregateWrite {
  pub fn siret(&self) -> &Siret {
    match self {
      Self::Insert(aggregate) | Self::Replace(aggregate) => aggregate.siret(),
      Self::Merge { siret, .. } | Self::Administrative { siret, .. } => siret,
    }
  }
}

/// What a guarded [`EstablishmentStore::write`] did.
///
/// A write carries the `data_source` the engine read before deciding on it.
/// The backend compares it with the stored one inside the write's own
/// transaction and applies nothing when they differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
  Applied,
  /// The stored source is no longer the expected one (`None`: no row).
  SourceChanged { current: Option<DataSource> },
}

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`EstablishmentStore::query_within_distance`].
#[derive(Debug, Clone, PartialEq)]
pub struct GeoQuery {
  pub position:         GeoPosition,
  pub distance_km:      f64,
  /// Keep establishments with at least one offer in this set. Empty means
  /// no occupation filter.
  pub occupation_codes: Vec<String>,
  pub siret:            Option<Siret>,
  /// Keep form-sourced establishments only.
  pub voluntary_only:   bool,
}

/// An active, searchable establishment inside the query radius.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  pub aggregate:  EstablishmentAggregate,
  /// Unrounded great-circle distance from the query position.
  pub distance_m: f64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an establishment directory backend.
///
/// Geospatial filtering and transactional writes are the only capabilities
/// the engines rely on. All methods return `Send` futures so the trait can
/// be used in multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait EstablishmentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read the whole aggregate for `siret`. Returns `None` if not found.
  fn get_aggregate<'a>(
    &'a self,
    siret: &'a Siret,
  ) -> impl Future<Output = Result<Option<EstablishmentAggregate>, Self::Error>> + Send + 'a;

  /// Apply one aggregate write atomically, provided the stored
  /// `data_source` still equals `expected_source` (`None`: no row yet).
  fn write(
    &self,
    write: AggregateWrite,
    expected_source: Option<DataSource>,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + '_;

  /// Delete the establishment, its contact and its offers. Returns `false`
  /// if nothing was stored for `siret`.
  fn delete<'a>(
    &'a self,
    siret: &'a Siret,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Return active, searchable establishments within `query.distance_km`
  /// (inclusive, see [`crate::geo::within_radius`]) that satisfy the
  /// query's filters, each with its contact and offers.
  fn query_within_distance<'a>(
    &'a self,
    query: &'a GeoQuery,
  ) -> impl Future<Output = Result<Vec<Candidate>, Self::Error>> + Send + 'a;

  /// Append a search to the audit log.
  fn record_search(
    &self,
    search: SearchMade,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
