//! Establishment aggregate: the unit the directory reads and writes.
//!
//! An aggregate bundles one [`Establishment`] row with its optional
//! [`Contact`] and its [`Offer`]s. The three are always persisted together
//! for a given siret; no caller ever writes one part on its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, Siret, geo::GeoPosition};

// ─── Provenance ──────────────────────────────────────────────────────────────

/// Where an establishment's data came from.
///
/// Adding a variant breaks the exhaustive match in the precedence
/// table in [`crate::precedence`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DataSource {
  /// Submitted by the business itself through the self-service form.
  Form,
  /// Pushed by the third-party job-matching feed.
  AutomatedFeed,
  /// Refreshed from the legal business registry.
  LegalRegistry,
}

// ─── Establishment fields ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
  pub street_number_and_address: String,
  pub postcode:                  String,
  pub city:                      String,
  pub department_code:           String,
}

/// Industry classification code and the nomenclature it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Naf {
  pub code:         String,
  pub nomenclature: String,
}

fn default_true() -> bool { true }

fn default_max_contacts_per_week() -> u32 { 10 }

/// The directory's knowledge of one business, keyed by siret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Establishment {
  pub siret:                    Siret,
  pub name:                     String,
  #[serde(default)]
  pub customized_name:          Option<String>,
  pub address:                  Address,
  pub position:                 GeoPosition,
  pub naf:                      Naf,
  pub number_employees_range:   String,
  pub data_source:              DataSource,
  /// Who filled in the form, when `data_source` is [`DataSource::Form`].
  #[serde(default)]
  pub source_provider:          Option<String>,
  #[serde(default = "default_true")]
  pub is_active:                bool,
  #[serde(default = "default_true")]
  pub is_searchable:            bool,
  #[serde(default)]
  pub fit_for_disabled_workers: Option<bool>,
  #[serde(default = "default_max_contacts_per_week")]
  pub max_contacts_per_week:    u32,
  /// Stamped by the merge engine on every establishment-field write.
  #[serde(default = "Utc::now")]
  pub updated_at:               DateTime<Utc>,
  /// Network-membership flag.
  #[serde(default)]
  pub is_committed:             Option<bool>,
}

impl Establishment {
  /// Form-sourced establishments rank ahead of everything else in search.
  pub fn is_voluntary_to_immersion(&self) -> bool {
    self.data_source == DataSource::Form
  }

  /// The name shown to job seekers.
  pub fn display_name(&self) -> &str {
    self.customized_name.as_deref().unwrap_or(&self.name)
  }
}

// ─── Contact ─────────────────────────────────────────────────────────────────

/// How a job seeker should reach the establishment.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ContactMethod {
  Email,
  Phone,
  InPerson,
}

/// The person to contact at an establishment. Owned by its establishment and
/// replaced with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
  #[serde(default = "Uuid::new_v4")]
  pub id:             Uuid,
  pub first_name:     String,
  pub last_name:      String,
  pub email:          String,
  pub phone:          String,
  pub job:            String,
  pub contact_method: ContactMethod,
  #[serde(default)]
  pub copy_emails:    Vec<String>,
}

// ─── Offer ───────────────────────────────────────────────────────────────────

/// One occupation an establishment accepts placements for.
///
/// Offers are not unique per `(siret, rome_code)`; readers de-duplicate by
/// aggregating appellations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
  pub rome_code:         String,
  #[serde(default)]
  pub appellation_code:  Option<String>,
  #[serde(default)]
  pub appellation_label: Option<String>,
  #[serde(default)]
  pub score:             f64,
  #[serde(default = "Utc::now")]
  pub created_at:        DateTime<Utc>,
}

impl Offer {
  pub fn new(rome_code: impl Into<String>) -> Self {
    Self {
      rome_code:         rome_code.into(),
      appellation_code:  None,
      appellation_label: None,
      score:             0.0,
      created_at:        Utc::now(),
    }
  }

  pub fn with_appellation(mut self, code: impl Into<String>) -> Self {
    self.appellation_code = Some(code.into());
    self
  }
}

// ─── Aggregate ───────────────────────────────────────────────────────────────

/// The transactional unit: an establishment with its contact and offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstablishmentAggregate {
  pub establishment: Establishment,
  #[serde(default)]
  pub contact:       Option<Contact>,
  #[serde(default)]
  pub offers:        Vec<Offer>,
}

impl EstablishmentAggregate {
  pub fn siret(&self) -> &Siret { &self.establishment.siret }

  /// Caller-side checks required before a siret is ingested for the first
  /// time. Failures are never retried by the engines.
  pub fn validate(&self) -> Result<()> {
    let establishment = &self.establishment;
    establishment.position.validate()?;

    if establishment.naf.code.trim().is_empty() {
      return Err(Error::MissingEnrichment {
        siret: establishment.siret.clone(),
        field: "naf code",
      });
    }
    if establishment.number_employees_range.trim().is_empty() {
      return Err(Error::MissingEnrichment {
        siret: establishment.siret.clone(),
        field: "number of employees range",
      });
    }
    Ok(())
  }
}

// ─── Registry refresh ────────────────────────────────────────────────────────

/// The administrative subset a legal-registry refresh may touch. Fields left
/// `None` keep their stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryUpdate {
  #[serde(default)]
  pub naf:                    Option<Naf>,
  #[serde(default)]
  pub number_employees_range: Option<String>,
  /// `false` once the registry reports the business as closed; a closed
  /// establishment is deactivated.
  #[serde(default = "default_true")]
  pub is_open:                bool,
}

impl Default for RegistryUpdate {
  fn default() -> Self {
    Self { naf: None, number_employees_range: None, is_open: true }
  }
}
