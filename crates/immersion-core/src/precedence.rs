//! Source precedence: which ingestion may overwrite which.
//!
//! A pure decision over the `(existing, incoming)` [`DataSource`] pair. The
//! match is exhaustive, so a new source variant will not compile until the
//! table below says how it ranks.

use serde::Serialize;

use crate::establishment::DataSource;

/// The fields an incoming write may touch on an existing establishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Precedence {
  /// Name, address, naf, employee range, position and the rest of the row.
  pub establishment_fields:  bool,
  /// The registry-owned subset: naf, employee range, closure flag.
  pub administrative_fields: bool,
}

impl Precedence {
  const ALLOW: Self = Self { establishment_fields: true, administrative_fields: true };
  const DENY: Self = Self { establishment_fields: false, administrative_fields: false };
  const ADMINISTRATIVE_ONLY: Self =
    Self { establishment_fields: false, administrative_fields: true };

  pub fn allows_establishment_field_update(&self) -> bool { self.establishment_fields }
}

/// Decide what `incoming` may overwrite, given the source of the row already
/// stored for the siret (`None` when there is none).
pub fn decide(existing: Option<DataSource>, incoming: DataSource) -> Precedence {
  use DataSource::*;

  match (existing, incoming) {
    (None, _) => Precedence::ALLOW,
    // Registry data is administrative truth, whoever owns the row.
    (Some(_), LegalRegistry) => Precedence::ADMINISTRATIVE_ONLY,
    // A second form for the same siret is the upsert use case's call to
    // reject; the table itself allows it.
    (Some(Form), Form) => Precedence::ALLOW,
    (Some(Form), AutomatedFeed) => Precedence::DENY,
    (Some(AutomatedFeed), Form | AutomatedFeed) => Precedence::ALLOW,
    (Some(LegalRegistry), Form | AutomatedFeed) => Precedence::ALLOW,
  }
}
