//! `SearchMade`: the append-only log of performed searches.
//!
//! Not authoritative state. The `needs_to_be_searched` flag is consumed by an
//! external scheduler that re-runs the query against the automated feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Siret, geo::GeoPosition};

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortMode {
  /// Voluntary establishments first, then by ascending distance.
  #[default]
  Distance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMade {
  pub id:                   Uuid,
  pub occupation_codes:     Vec<String>,
  pub position:             GeoPosition,
  pub distance_km:          f64,
  pub sort_mode:            SortMode,
  pub voluntary_only:       bool,
  pub siret:                Option<Siret>,
  pub needs_to_be_searched: bool,
  pub result_count:         usize,
  /// API consumer that ran the search, if authenticated.
  pub consumer:             Option<String>,
  pub searched_at:          DateTime<Utc>,
}
