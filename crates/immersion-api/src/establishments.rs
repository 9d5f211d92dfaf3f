//! Handlers for `/establishments` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/establishments/{siret}` | Whole aggregate; 404 if not found |
//! | `POST`   | `/establishments` | Form creation; 409 if already form-sourced |
//! | `PUT`    | `/establishments/{siret}` | Form edit; full snapshot replace |
//! | `DELETE` | `/establishments/{siret}` | Cascades to contact and offers |
//! | `POST`   | `/establishments/{siret}/registry` | Legal-registry refresh |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use immersion_core::{
  Siret,
  establishment::{EstablishmentAggregate, RegistryUpdate},
  merge::{FormContext, FormSubmission},
  store::EstablishmentStore,
};
use tracing::info;

use crate::{AppState, auth::Consumer, error::ApiError};

fn parse_siret(raw: &str) -> Result<Siret, ApiError> { Ok(raw.parse::<Siret>()?) }

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /establishments/{siret}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Consumer(_): Consumer,
  Path(siret): Path<String>,
) -> Result<Json<EstablishmentAggregate>, ApiError>
where
  S: EstablishmentStore + 'static,
{
  let siret = parse_siret(&siret)?;
  Ok(Json(state.merge.get_aggregate(&siret).await?))
}

// ─── Form upserts ─────────────────────────────────────────────────────────────

/// `POST /establishments`: returns 201 + the stored aggregate.
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Consumer(consumer): Consumer,
  Json(mut aggregate): Json<EstablishmentAggregate>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EstablishmentStore + 'static,
{
  let siret = aggregate.siret().clone();
  if aggregate.establishment.source_provider.is_none() {
    aggregate.establishment.source_provider = Some(consumer);
  }
  state
    .merge
    .upsert_from_form(FormSubmission { aggregate, context: FormContext::Creation })
    .await?;
  let stored = state.merge.get_aggregate(&siret).await?;
  Ok((StatusCode::CREATED, Json(stored)))
}

/// `PUT /establishments/{siret}`: the body must describe the same siret.
pub async fn edit<S>(
  State(state): State<AppState<S>>,
  Consumer(consumer): Consumer,
  Path(siret): Path<String>,
  Json(mut aggregate): Json<EstablishmentAggregate>,
) -> Result<Json<EstablishmentAggregate>, ApiError>
where
  S: EstablishmentStore + 'static,
{
  let siret = parse_siret(&siret)?;
  if *aggregate.siret() != siret {
    return Err(ApiError::BadRequest(format!(
      "body siret {} does not match path siret {siret}",
      aggregate.siret()
    )));
  }
  if aggregate.establishment.source_provider.is_none() {
    aggregate.establishment.source_provider = Some(consumer);
  }
  state
    .merge
    .upsert_from_form(FormSubmission { aggregate, context: FormContext::Edit })
    .await?;
  Ok(Json(state.merge.get_aggregate(&siret).await?))
}

// ─── Remove ───────────────────────────────────────────────────────────────────

/// `DELETE /establishments/{siret}`: 204 on success.
pub async fn remove<S>(
  State(state): State<AppState<S>>,
  Consumer(consumer): Consumer,
  Path(siret): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: EstablishmentStore + 'static,
{
  let siret = parse_siret(&siret)?;
  state.merge.remove_establishment(&siret).await?;
  info!(%siret, %consumer, "establishment removed through the API");
  Ok(StatusCode::NO_CONTENT)
}

// ─── Registry refresh ─────────────────────────────────────────────────────────

/// `POST /establishments/{siret}/registry`: body: [`RegistryUpdate`].
pub async fn refresh_registry<S>(
  State(state): State<AppState<S>>,
  Consumer(_): Consumer,
  Path(siret): Path<String>,
  Json(update): Json<RegistryUpdate>,
) -> Result<Json<EstablishmentAggregate>, ApiError>
where
  S: EstablishmentStore + 'static,
{
  let siret = parse_siret(&siret)?;
  state.merge.refresh_from_legal_registry(&siret, update).await?;
  Ok(Json(state.merge.get_aggregate(&siret).await?))
}
