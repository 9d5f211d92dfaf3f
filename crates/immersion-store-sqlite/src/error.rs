//! Error type for `immersion-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] immersion_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum column holds a value no variant maps to.
  #[error("unknown {kind}: {value:?}")]
  UnknownVariant { kind: &'static str, value: String },

  /// A merge or registry refresh targeted a siret with no establishment row.
  #[error("establishment not found: {0}")]
  EstablishmentNotFound(immersion_core::Siret),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
