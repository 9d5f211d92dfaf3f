//! `SearchQueryEngine`: geospatial, occupation-filtered establishment search.
//!
//! The store narrows the directory down to candidates in range; this module
//! re-applies the filters, splits each establishment into one row per rome
//! code, ranks, truncates and applies contact disclosure. Nothing is cached:
//! every search reads the current store state.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::Arc,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
  Error, Result, Siret,
  audit::{SearchMade, SortMode},
  disclosure::ContactDisclosurePolicy,
  establishment::{Address, Contact, DataSource, Naf},
  geo::{self, GeoPosition},
  store::{Candidate, EstablishmentStore, GeoQuery},
};

/// Largest radius a search may cover.
pub const MAX_DISTANCE_KM: f64 = 100.0;

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSettings {
  /// Result cap applied when a request sets no `max_results`.
  pub default_max_results: usize,
}

impl Default for SearchSettings {
  fn default() -> Self { Self { default_max_results: 100 } }
}

// ─── Request / result ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
  /// Rome codes to match. Empty means no occupation filter.
  pub occupation_codes:        Vec<String>,
  pub position:                GeoPosition,
  pub distance_km:             f64,
  pub max_results:             Option<usize>,
  pub voluntary_only:          bool,
  /// Direct-link lookup of a single establishment.
  pub siret:                   Option<Siret>,
  pub include_contact_details: bool,
  /// Authenticated API consumer, recorded in the search log.
  pub consumer:                Option<String>,
}

impl SearchRequest {
  pub fn new(position: GeoPosition, distance_km: f64) -> Self {
    Self {
      occupation_codes: Vec::new(),
      position,
      distance_km,
      max_results: None,
      voluntary_only: false,
      siret: None,
      include_contact_details: false,
      consumer: None,
    }
  }

  fn validate(&self) -> Result<()> {
    self.position.validate()?;
    if !self.distance_km.is_finite()
      || self.distance_km <= 0.0
      || self.distance_km > MAX_DISTANCE_KM
    {
      return Err(Error::InvalidDistance(self.distance_km));
    }
    Ok(())
  }

  fn geo_query(&self) -> GeoQuery {
    GeoQuery {
      position:         self.position,
      distance_km:      self.distance_km,
      occupation_codes: self.occupation_codes.clone(),
      siret:            self.siret.clone(),
      voluntary_only:   self.voluntary_only,
    }
  }
}

/// One `(establishment, rome code)` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
  pub siret:                    Siret,
  pub name:                     String,
  pub customized_name:          Option<String>,
  /// `None` for an establishment without offers, listed only when the
  /// search has no occupation filter.
  pub rome_code:                Option<String>,
  /// Distinct appellations offered under `rome_code` at this establishment.
  pub appellation_codes:        BTreeSet<String>,
  pub appellation_labels:       BTreeSet<String>,
  pub naf:                      Naf,
  pub number_employees_range:   String,
  pub address:                  Address,
  pub position:                 GeoPosition,
  pub distance_m:               u64,
  pub data_source:              DataSource,
  pub voluntary_to_immersion:   bool,
  pub fit_for_disabled_workers: Option<bool>,
  pub is_committed:             Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub contact_details:          Option<Contact>,
}

// ─── Assembly ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Appellations {
  codes:  BTreeSet<String>,
  labels: BTreeSet<String>,
}

fn candidate_matches(candidate: &Candidate, request: &SearchRequest, codes: &BTreeSet<&str>) -> bool {
  let establishment = &candidate.aggregate.establishment;
  establishment.is_active
    && establishment.is_searchable
    && geo::within_radius(candidate.distance_m, request.distance_km)
    && request.siret.as_ref().is_none_or(|s| *s == establishment.siret)
    && (!request.voluntary_only || establishment.is_voluntary_to_immersion())
    && (codes.is_empty()
      || candidate
        .aggregate
        .offers
        .iter()
        .any(|o| codes.contains(o.rome_code.as_str())))
}

/// Turn store candidates into ranked, truncated, disclosure-filtered rows.
pub fn assemble_results(
  candidates: Vec<Candidate>,
  request: &SearchRequest,
  default_max_results: usize,
) -> Vec<SearchResult> {
  let codes: BTreeSet<&str> = request
    .occupation_codes
    .iter()
    .map(String::as_str)
    .filter(|c| !c.is_empty())
    .collect();

  let mut rows: Vec<(SearchResult, f64)> = Vec::new();

  for candidate in candidates.iter().filter(|c| candidate_matches(c, request, &codes)) {
    let aggregate = &candidate.aggregate;

    // Group by rome code, absorbing duplicate offers.
    let mut by_rome: BTreeMap<&str, Appellations> = BTreeMap::new();
    for offer in &aggregate.offers {
      if !codes.is_empty() && !codes.contains(offer.rome_code.as_str()) {
        continue;
      }
      let group = by_rome.entry(offer.rome_code.as_str()).or_default();
      if let Some(code) = offer.appellation_code.as_ref().filter(|c| !c.is_empty()) {
        group.codes.insert(code.clone());
      }
      if let Some(label) = offer.appellation_label.as_ref().filter(|l| !l.is_empty()) {
        group.labels.insert(label.clone());
      }
    }

    let groups: Vec<(Option<String>, Appellations)> = if by_rome.is_empty() {
      vec![(None, Appellations::default())]
    } else {
      by_rome
        .into_iter()
        .map(|(rome, appellations)| (Some(rome.to_owned()), appellations))
        .collect()
    };

    let establishment = &aggregate.establishment;
    for (rome_code, appellations) in groups {
      let row = SearchResult {
        siret: establishment.siret.clone(),
        name: establishment.name.clone(),
        customized_name: establishment.customized_name.clone(),
        rome_code,
        appellation_codes: appellations.codes,
        appellation_labels: appellations.labels,
        naf: establishment.naf.clone(),
        number_employees_range: establishment.number_employees_range.clone(),
        address: establishment.address.clone(),
        position: establishment.position,
        distance_m: geo::round_meters(candidate.distance_m),
        data_source: establishment.data_source,
        voluntary_to_immersion: establishment.is_voluntary_to_immersion(),
        fit_for_disabled_workers: establishment.fit_for_disabled_workers,
        is_committed: establishment.is_committed,
        contact_details: aggregate.contact.clone(),
      };
      rows.push((row, candidate.distance_m));
    }
  }

  rows.sort_by(|(a, da), (b, db)| {
    b.voluntary_to_immersion
      .cmp(&a.voluntary_to_immersion)
      .then(da.total_cmp(db))
  });
  rows.truncate(request.max_results.unwrap_or(default_max_results));

  let policy = ContactDisclosurePolicy::new(request.include_contact_details);
  rows.into_iter().map(|(row, _)| policy.apply(row)).collect()
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Executes searches against an [`EstablishmentStore`].
pub struct SearchQueryEngine<S> {
  store:    Arc<S>,
  settings: SearchSettings,
}

impl<S> Clone for SearchQueryEngine<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), settings: self.settings }
  }
}

impl<S: EstablishmentStore> SearchQueryEngine<S> {
  pub fn new(store: Arc<S>, settings: SearchSettings) -> Self { Self { store, settings } }

  pub fn settings(&self) -> &SearchSettings { &self.settings }

  /// Run `request` and log it as a [`SearchMade`].
  ///
  /// A siret lookup that matches nothing is [`Error::NotFound`].
  pub async fn search(&self, mut request: SearchRequest) -> Result<Vec<SearchResult>> {
    request.occupation_codes.retain(|c| !c.trim().is_empty());
    request.validate()?;

    let query = request.geo_query();
    let candidates = self
      .store
      .query_within_distance(&query)
      .await
      .map_err(Error::store)?;
    let candidate_count = candidates.len();

    let results = assemble_results(candidates, &request, self.settings.default_max_results);
    debug!(candidates = candidate_count, results = results.len(), "search executed");

    self.record(&request, results.len()).await;

    if let Some(siret) = request.siret
      && results.is_empty()
    {
      return Err(Error::NotFound(siret));
    }
    Ok(results)
  }

  async fn record(&self, request: &SearchRequest, result_count: usize) {
    let search = SearchMade {
      id: Uuid::new_v4(),
      occupation_codes: request.occupation_codes.clone(),
      position: request.position,
      distance_km: request.distance_km,
      sort_mode: SortMode::Distance,
      voluntary_only: request.voluntary_only,
      siret: request.siret.clone(),
      needs_to_be_searched: !request.occupation_codes.is_empty() && !request.voluntary_only,
      result_count,
      consumer: request.consumer.clone(),
      searched_at: Utc::now(),
    };
    if let Err(e) = self.store.record_search(search).await {
      warn!(error = %e, "failed to record search");
    }
  }
}
