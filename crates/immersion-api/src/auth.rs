//! API-consumer authentication.
//!
//! Consumers send HTTP Basic credentials `name:key`; keys are checked against
//! argon2 PHC hashes from the server config. Search accepts anonymous
//! callers, every write endpoint requires a consumer.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use immersion_core::store::EstablishmentStore;
use serde::Deserialize;

use crate::{AppState, error::ApiError};

/// One API consumer allowed to see contact details and write data.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConsumer {
  pub name:     String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub key_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
  pub consumers: Vec<ApiConsumer>,
}

/// Verify credentials from headers.
///
/// Returns `Ok(None)` when no `Authorization` header is present and the
/// consumer name when the credentials are valid. A header that is present
/// but wrong is always an error, never a silent downgrade to anonymous.
pub fn verify_consumer(headers: &HeaderMap, config: &AuthConfig) -> Result<Option<String>, ApiError> {
  let Some(header_val) = headers.get(axum::http::header::AUTHORIZATION) else {
    return Ok(None);
  };
  let header_val = header_val.to_str().map_err(|_| ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds   = std::str::from_utf8(&decoded).map_err(|_| ApiError::Unauthorized)?;

  let (name, key) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;

  let consumer = config
    .consumers
    .iter()
    .find(|c| c.name == name)
    .ok_or(ApiError::Unauthorized)?;

  let parsed_hash = PasswordHash::new(&consumer.key_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Argon2::default()
    .verify_password(key.as_bytes(), &parsed_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Ok(Some(consumer.name.clone()))
}

/// The authenticated consumer, if any. Rejects only invalid credentials.
pub struct MaybeConsumer(pub Option<String>);

/// An authenticated consumer. Rejects anonymous requests.
pub struct Consumer(pub String);

impl<S> FromRequestParts<AppState<S>> for MaybeConsumer
where
  S: EstablishmentStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    Ok(MaybeConsumer(verify_consumer(&parts.headers, &state.auth)?))
  }
}

impl<S> FromRequestParts<AppState<S>> for Consumer
where
  S: EstablishmentStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    verify_consumer(&parts.headers, &state.auth)?
      .map(Consumer)
      .ok_or(ApiError::Unauthorized)
  }
}
