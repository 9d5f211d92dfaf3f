//! Encoding and decoding helpers between domain types and the plain values
//! stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, enums use their stable string forms and
//! string lists are compact JSON arrays.

use chrono::{DateTime, Utc};
use immersion_core::{
  Siret,
  establishment::{
    Address, Contact, ContactMethod, DataSource, Establishment, Naf, Offer,
  },
  geo::GeoPosition,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_data_source(s: &str) -> Result<DataSource> {
  s.parse().map_err(|_| Error::UnknownVariant { kind: "data source", value: s.to_owned() })
}

pub fn decode_contact_method(s: &str) -> Result<ContactMethod> {
  s.parse().map_err(|_| Error::UnknownVariant { kind: "contact method", value: s.to_owned() })
}

pub fn decode_siret(s: &str) -> Result<Siret> { Ok(s.parse()?) }

// ─── String lists ────────────────────────────────────────────────────────────

pub fn encode_list(items: &[String]) -> Result<String> { Ok(serde_json::to_string(items)?) }

pub fn decode_list(s: &str) -> Result<Vec<String>> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const ESTABLISHMENT_COLUMNS: &str = "siret, name, customized_name,
  street_number_and_address, postcode, city, department_code, lat, lon,
  naf_code, naf_nomenclature, number_employees_range, data_source,
  source_provider, is_active, is_searchable, fit_for_disabled_workers,
  max_contacts_per_week, updated_at, is_committed";

/// Raw values read directly from an `establishments` row.
pub struct RawEstablishment {
  pub siret:                     String,
  pub name:                      String,
  pub customized_name:           Option<String>,
  pub street_number_and_address: String,
  pub postcode:                  String,
  pub city:                      String,
  pub department_code:           String,
  pub lat:                       f64,
  pub lon:                       f64,
  pub naf_code:                  String,
  pub naf_nomenclature:          String,
  pub number_employees_range:    String,
  pub data_source:               String,
  pub source_provider:           Option<String>,
  pub is_active:                 bool,
  pub is_searchable:             bool,
  pub fit_for_disabled_workers:  Option<bool>,
  pub max_contacts_per_week:     u32,
  pub updated_at:                String,
  pub is_committed:              Option<bool>,
}

impl RawEstablishment {
  /// Map a row selected with [`ESTABLISHMENT_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      siret:                     row.get(0)?,
      name:                      row.get(1)?,
      customized_name:           row.get(2)?,
      street_number_and_address: row.get(3)?,
      postcode:                  row.get(4)?,
      city:                      row.get(5)?,
      department_code:           row.get(6)?,
      lat:                       row.get(7)?,
      lon:                       row.get(8)?,
      naf_code:                  row.get(9)?,
      naf_nomenclature:          row.get(10)?,
      number_employees_range:    row.get(11)?,
      data_source:               row.get(12)?,
      source_provider:           row.get(13)?,
      is_active:                 row.get(14)?,
      is_searchable:             row.get(15)?,
      fit_for_disabled_workers:  row.get(16)?,
      max_contacts_per_week:     row.get(17)?,
      updated_at:                row.get(18)?,
      is_committed:              row.get(19)?,
    })
  }

  pub fn into_establishment(self) -> Result<Establishment> {
    Ok(Establishment {
      siret:                    decode_siret(&self.siret)?,
      name:                     self.name,
      customized_name:          self.customized_name,
      address:                  Address {
        street_number_and_address: self.street_number_and_address,
        postcode:                  self.postcode,
        city:                      self.city,
        department_code:           self.department_code,
      },
      position:                 GeoPosition { lat: self.lat, lon: self.lon },
      naf:                      Naf {
        code:         self.naf_code,
        nomenclature: self.naf_nomenclature,
      },
      number_employees_range:   self.number_employees_range,
      data_source:              decode_data_source(&self.data_source)?,
      source_provider:          self.source_provider,
      is_active:                self.is_active,
      is_searchable:            self.is_searchable,
      fit_for_disabled_workers: self.fit_for_disabled_workers,
      max_contacts_per_week:    self.max_contacts_per_week,
      updated_at:               decode_dt(&self.updated_at)?,
      is_committed:             self.is_committed,
    })
  }
}

pub const CONTACT_COLUMNS: &str =
  "contact_id, first_name, last_name, email, phone, job, contact_method, copy_emails";

/// Raw values read directly from a `contacts` row.
pub struct RawContact {
  pub contact_id:     String,
  pub first_name:     String,
  pub last_name:      String,
  pub email:          String,
  pub phone:          String,
  pub job:            String,
  pub contact_method: String,
  pub copy_emails:    String,
}

impl RawContact {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      contact_id:     row.get(0)?,
      first_name:     row.get(1)?,
      last_name:      row.get(2)?,
      email:          row.get(3)?,
      phone:          row.get(4)?,
      job:            row.get(5)?,
      contact_method: row.get(6)?,
      copy_emails:    row.get(7)?,
    })
  }

  pub fn into_contact(self) -> Result<Contact> {
    Ok(Contact {
      id:             uuid::Uuid::parse_str(&self.contact_id)?,
      first_name:     self.first_name,
      last_name:      self.last_name,
      email:          self.email,
      phone:          self.phone,
      job:            self.job,
      contact_method: decode_contact_method(&self.contact_method)?,
      copy_emails:    decode_list(&self.copy_emails)?,
    })
  }
}

pub const OFFER_COLUMNS: &str =
  "rome_code, appellation_code, appellation_label, score, created_at";

/// Raw values read directly from an `offers` row.
pub struct RawOffer {
  pub rome_code:         String,
  pub appellation_code:  Option<String>,
  pub appellation_label: Option<String>,
  pub score:             f64,
  pub created_at:        String,
}

impl RawOffer {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      rome_code:         row.get(0)?,
      appellation_code:  row.get(1)?,
      appellation_label: row.get(2)?,
      score:             row.get(3)?,
      created_at:        row.get(4)?,
    })
  }

  pub fn into_offer(self) -> Result<Offer> {
    Ok(Offer {
      rome_code:         self.rome_code,
      appellation_code:  self.appellation_code,
      appellation_label: self.appellation_label,
      score:             self.score,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

/// An establishment row with everything it owns, still undecoded.
pub struct RawAggregate {
  pub establishment: RawEstablishment,
  pub contact:       Option<RawContact>,
  pub offers:        Vec<RawOffer>,
}

impl RawAggregate {
  pub fn into_aggregate(self) -> Result<immersion_core::establishment::EstablishmentAggregate> {
    Ok(immersion_core::establishment::EstablishmentAggregate {
      establishment: self.establishment.into_establishment()?,
      contact:       self.contact.map(RawContact::into_contact).transpose()?,
      offers:        self
        .offers
        .into_iter()
        .map(RawOffer::into_offer)
        .collect::<Result<_>>()?,
    })
  }
}
