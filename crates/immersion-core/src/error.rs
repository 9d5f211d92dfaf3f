//! Error types for `immersion-core`.

use thiserror::Error;

use crate::Siret;

#[derive(Debug, Error)]
pub enum Error {
  /// A form creation targeted a siret that is already form-sourced.
  #[error("establishment {0} is already registered through the form")]
  Conflict(Siret),

  #[error("establishment not found: {0}")]
  NotFound(Siret),

  #[error("invalid siret: {0:?}")]
  InvalidSiret(String),

  #[error("invalid position: lat={lat}, lon={lon}")]
  InvalidPosition { lat: f64, lon: f64 },

  #[error("invalid search distance: {0} km")]
  InvalidDistance(f64),

  #[error("establishment {siret} is missing {field}")]
  MissingEnrichment { siret: Siret, field: &'static str },

  /// Concurrent writers kept changing the establishment's source between
  /// the read and the guarded write.
  #[error("establishment {0} kept changing during the write")]
  Contention(Siret),

  #[error("invalid ingestion: {0}")]
  InvalidIngestion(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Box a backend error coming out of an [`EstablishmentStore`](crate::store::EstablishmentStore).
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
