//! Handler for `POST /sync`: one automated-feed synchronisation run.

use axum::{Json, extract::State};
use immersion_core::{
  establishment::EstablishmentAggregate,
  merge::BulkSyncReport,
  store::EstablishmentStore,
};
use tracing::info;

use crate::{AppState, auth::Consumer, error::ApiError};

/// `POST /sync`: body: array of feed aggregates; returns the run's tally.
///
/// Always 200 once the body parses: per-siret failures are listed in the
/// report instead of failing the request.
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  Consumer(consumer): Consumer,
  Json(aggregates): Json<Vec<EstablishmentAggregate>>,
) -> Result<Json<BulkSyncReport>, ApiError>
where
  S: EstablishmentStore + 'static,
{
  info!(%consumer, count = aggregates.len(), "feed sync requested");
  Ok(Json(state.merge.sync_bulk_feed(aggregates).await))
}
