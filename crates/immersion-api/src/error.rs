//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized")]
  Unauthorized,

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<immersion_core::Error> for ApiError {
  fn from(err: immersion_core::Error) -> Self {
    use immersion_core::Error as E;

    match err {
      E::Conflict(_) | E::Contention(_) => Self::Conflict(err.to_string()),
      E::NotFound(_) => Self::NotFound(err.to_string()),
      E::InvalidSiret(_)
      | E::InvalidPosition { .. }
      | E::InvalidDistance(_)
      | E::MissingEnrichment { .. }
      | E::InvalidIngestion(_) => Self::BadRequest(err.to_string()),
      E::Store(inner) => Self::Store(inner),
      E::Serialization(inner) => Self::Store(Box::new(inner)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };

    let mut res = (status, Json(json!({ "error": message }))).into_response();
    if status == StatusCode::UNAUTHORIZED {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"immersion\""),
      );
    }
    res
  }
}
