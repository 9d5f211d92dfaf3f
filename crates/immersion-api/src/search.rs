//! Handler for `GET /search`.
//!
//! `rome` is accepted as a comma-separated list. Authenticated consumers get
//! contact details; anonymous callers never see a `contact_details` key.

use axum::{
  Json,
  extract::{Query, State},
};
use immersion_core::{
  Siret,
  geo::GeoPosition,
  search::{SearchRequest, SearchResult},
  store::EstablishmentStore,
};
use serde::Deserialize;

use crate::{AppState, auth::MaybeConsumer, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
  /// Comma-separated rome codes, e.g. `A1101,D1102`. Absent or empty means
  /// every occupation.
  pub rome:           Option<String>,
  pub lat:            f64,
  pub lon:            f64,
  pub distance_km:    f64,
  pub max_results:    Option<usize>,
  #[serde(default)]
  pub voluntary_only: bool,
  pub siret:          Option<String>,
}

/// `GET /search?lat=..&lon=..&distance_km=..[&rome=..][&max_results=..][&voluntary_only=true][&siret=..]`
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  MaybeConsumer(consumer): MaybeConsumer,
  Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchResult>>, ApiError>
where
  S: EstablishmentStore + 'static,
{
  let siret = params
    .siret
    .as_deref()
    .map(str::parse::<Siret>)
    .transpose()?;

  let request = SearchRequest {
    occupation_codes:        params
      .rome
      .map(|s| s.split(',').map(|t| t.trim().to_owned()).collect())
      .unwrap_or_default(),
    position:                GeoPosition { lat: params.lat, lon: params.lon },
    distance_km:             params.distance_km,
    max_results:             params.max_results,
    voluntary_only:          params.voluntary_only,
    siret,
    include_contact_details: consumer.is_some(),
    consumer,
  };

  let results = state.search.search(request).await?;
  Ok(Json(results))
}
