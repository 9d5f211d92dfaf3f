//! [`SqliteStore`]: the SQLite implementation of [`EstablishmentStore`].

use std::path::Path;

use rusqlite::{OptionalExtension as _, types::Value};
use tracing::debug;

use immersion_core::{
  Siret,
  audit::SearchMade,
  establishment::{Contact, DataSource, Establishment, EstablishmentAggregate, Offer, RegistryUpdate},
  geo::{self, BoundingBox},
  store::{AggregateWrite, Candidate, EstablishmentStore, GeoQuery, WriteOutcome},
};

use crate::{
  Error, Result,
  encode::{
    CONTACT_COLUMNS, ESTABLISHMENT_COLUMNS, OFFER_COLUMNS, RawAggregate, RawContact,
    RawEstablishment, RawOffer, decode_data_source, encode_dt, encode_list,
  },
  schema::SCHEMA,
};

// ─── Row helpers ─────────────────────────────────────────────────────────────
//
// Plain functions over a borrowed connection so they compose inside a single
// transaction opened by the caller.

fn insert_establishment(conn: &rusqlite::Connection, e: &Establishment) -> rusqlite::Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO establishments ({ESTABLISHMENT_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
               ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
    ),
    rusqlite::params![
      e.siret.as_str(),
      e.name,
      e.customized_name,
      e.address.street_number_and_address,
      e.address.postcode,
      e.address.city,
      e.address.department_code,
      e.position.lat,
      e.position.lon,
      e.naf.code,
      e.naf.nomenclature,
      e.number_employees_range,
      e.data_source.as_ref(),
      e.source_provider,
      e.is_active,
      e.is_searchable,
      e.fit_for_disabled_workers,
      e.max_contacts_per_week,
      encode_dt(e.updated_at),
      e.is_committed,
    ],
  )?;
  Ok(())
}

/// Overwrite every establishment field. Returns `false` if the row is gone.
fn update_establishment(conn: &rusqlite::Connection, e: &Establishment) -> rusqlite::Result<bool> {
  let changed = conn.execute(
    "UPDATE establishments SET
       name = ?2, customized_name = ?3, street_number_and_address = ?4,
       postcode = ?5, city = ?6, department_code = ?7, lat = ?8, lon = ?9,
       naf_code = ?10, naf_nomenclature = ?11, number_employees_range = ?12,
       data_source = ?13, source_provider = ?14, is_active = ?15,
       is_searchable = ?16, fit_for_disabled_workers = ?17,
       max_contacts_per_week = ?18, updated_at = ?19, is_committed = ?20
     WHERE siret = ?1",
    rusqlite::params![
      e.siret.as_str(),
      e.name,
      e.customized_name,
      e.address.street_number_and_address,
      e.address.postcode,
      e.address.city,
      e.address.department_code,
      e.position.lat,
      e.position.lon,
      e.naf.code,
      e.naf.nomenclature,
      e.number_employees_range,
      e.data_source.as_ref(),
      e.source_provider,
      e.is_active,
      e.is_searchable,
      e.fit_for_disabled_workers,
      e.max_contacts_per_week,
      encode_dt(e.updated_at),
      e.is_committed,
    ],
  )?;
  Ok(changed > 0)
}

fn replace_contact(
  conn: &rusqlite::Connection,
  siret: &str,
  contact: &Contact,
  copy_emails: &str,
) -> rusqlite::Result<()> {
  conn.execute("DELETE FROM contacts WHERE siret = ?1", rusqlite::params![siret])?;
  conn.execute(
    &format!(
      "INSERT INTO contacts (siret, {CONTACT_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
    ),
    rusqlite::params![
      siret,
      contact.id.hyphenated().to_string(),
      contact.first_name,
      contact.last_name,
      contact.email,
      contact.phone,
      contact.job,
      contact.contact_method.as_ref(),
      copy_emails,
    ],
  )?;
  Ok(())
}

fn insert_offers(conn: &rusqlite::Connection, siret: &str, offers: &[Offer]) -> rusqlite::Result<()> {
  let mut stmt = conn.prepare_cached(&format!(
    "INSERT INTO offers (siret, {OFFER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
  ))?;
  for offer in offers {
    stmt.execute(rusqlite::params![
      siret,
      offer.rome_code,
      offer.appellation_code,
      offer.appellation_label,
      offer.score,
      encode_dt(offer.created_at),
    ])?;
  }
  Ok(())
}

/// Delete everything stored for `siret`. Returns `true` if an establishment
/// row existed.
fn delete_aggregate(conn: &rusqlite::Connection, siret: &str) -> rusqlite::Result<bool> {
  conn.execute("DELETE FROM offers WHERE siret = ?1", rusqlite::params![siret])?;
  conn.execute("DELETE FROM contacts WHERE siret = ?1", rusqlite::params![siret])?;
  let removed =
    conn.execute("DELETE FROM establishments WHERE siret = ?1", rusqlite::params![siret])?;
  Ok(removed > 0)
}

fn load_owned(conn: &rusqlite::Connection, establishment: RawEstablishment) -> rusqlite::Result<RawAggregate> {
  let contact = conn
    .query_row(
      &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE siret = ?1 LIMIT 1"),
      rusqlite::params![establishment.siret],
      RawContact::from_row,
    )
    .optional()?;

  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {OFFER_COLUMNS} FROM offers WHERE siret = ?1 ORDER BY offer_id"
  ))?;
  let offers = stmt
    .query_map(rusqlite::params![establishment.siret], RawOffer::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(RawAggregate { establishment, contact, offers })
}

fn load_aggregate(conn: &rusqlite::Connection, siret: &str) -> rusqlite::Result<Option<RawAggregate>> {
  let establishment = conn
    .query_row(
      &format!("SELECT {ESTABLISHMENT_COLUMNS} FROM establishments WHERE siret = ?1"),
      rusqlite::params![siret],
      RawEstablishment::from_row,
    )
    .optional()?;

  establishment.map(|e| load_owned(conn, e)).transpose()
}

/// The stored `data_source` column for `siret`, undecoded.
fn stored_source(conn: &rusqlite::Connection, siret: &str) -> rusqlite::Result<Option<String>> {
  conn
    .query_row(
      "SELECT data_source FROM establishments WHERE siret = ?1",
      rusqlite::params![siret],
      |row| row.get(0),
    )
    .optional()
}

/// What happened on the connection thread during a guarded write.
enum Applied {
  Yes,
  SourceChanged(Option<String>),
  /// A merge or registry refresh found no row to update.
  Missing,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An establishment directory backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store: useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Number of logged searches, optionally only those still waiting for the
  /// automated-feed scheduler.
  pub async fn count_searches_made(&self, pending_only: bool) -> Result<usize> {
    let count: i64 = self
      .conn
      .call(move |conn| {
        let sql = if pending_only {
          "SELECT COUNT(*) FROM searches_made WHERE needs_to_be_searched = 1"
        } else {
          "SELECT COUNT(*) FROM searches_made"
        };
        Ok(conn.query_row(sql, [], |r| r.get(0))?)
      })
      .await?;
    Ok(count as usize)
  }
}

// ─── EstablishmentStore impl ─────────────────────────────────────────────────

impl EstablishmentStore for SqliteStore {
  type Error = Error;

  async fn get_aggregate(&self, siret: &Siret) -> Result<Option<EstablishmentAggregate>> {
    let siret_str = siret.as_str().to_owned();

    let raw: Option<RawAggregate> = self
      .conn
      .call(move |conn| {
        // Read inside a transaction so the three tables form one snapshot.
        let tx = conn.transaction()?;
        let raw = load_aggregate(&tx, &siret_str)?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawAggregate::into_aggregate).transpose()
  }

  async fn write(
    &self,
    write: AggregateWrite,
    expected_source: Option<DataSource>,
  ) -> Result<WriteOutcome> {
    let siret = write.siret().clone();
    let siret_str = siret.as_str().to_owned();
    let expected = expected_source.map(|source| source.as_ref().to_owned());

    // Serialise JSON columns before moving onto the connection thread.
    let copy_emails = match &write {
      AggregateWrite::Insert(a) | AggregateWrite::Replace(a) => {
        a.contact.as_ref().map(|c| encode_list(&c.copy_emails)).transpose()?
      }
      AggregateWrite::Merge { contact, .. } => {
        contact.as_ref().map(|c| encode_list(&c.copy_emails)).transpose()?
      }
      AggregateWrite::Administrative { .. } => None,
    };

    let applied: Applied = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // The guard is read in the same transaction as the write it protects.
        let current = stored_source(&tx, &siret_str)?;
        if current != expected {
          return Ok(Applied::SourceChanged(current));
        }

        let found = match &write {
          AggregateWrite::Insert(aggregate) => {
            insert_establishment(&tx, &aggregate.establishment)?;
            if let (Some(contact), Some(emails)) = (&aggregate.contact, &copy_emails) {
              replace_contact(&tx, &siret_str, contact, emails)?;
            }
            insert_offers(&tx, &siret_str, &aggregate.offers)?;
            true
          }
          AggregateWrite::Replace(aggregate) => {
            delete_aggregate(&tx, &siret_str)?;
            insert_establishment(&tx, &aggregate.establishment)?;
            if let (Some(contact), Some(emails)) = (&aggregate.contact, &copy_emails) {
              replace_contact(&tx, &siret_str, contact, emails)?;
            }
            insert_offers(&tx, &siret_str, &aggregate.offers)?;
            true
          }
          AggregateWrite::Merge { establishment, contact, offers, .. } => {
            let found = match establishment {
              Some(e) => update_establishment(&tx, e)?,
              None => current.is_some(),
            };
            if found {
              if let (Some(contact), Some(emails)) = (contact, &copy_emails) {
                replace_contact(&tx, &siret_str, contact, emails)?;
              }
              insert_offers(&tx, &siret_str, offers)?;
            }
            found
          }
          AggregateWrite::Administrative { update, updated_at, .. } => {
            apply_registry_update(&tx, &siret_str, update, encode_dt(*updated_at))?
          }
        };

        if !found {
          return Ok(Applied::Missing);
        }
        tx.commit()?;
        Ok(Applied::Yes)
      })
      .await?;

    match applied {
      Applied::Yes => {
        debug!(%siret, "aggregate written");
        Ok(WriteOutcome::Applied)
      }
      Applied::SourceChanged(current) => {
        let current = current.as_deref().map(decode_data_source).transpose()?;
        Ok(WriteOutcome::SourceChanged { current })
      }
      Applied::Missing => Err(Error::EstablishmentNotFound(siret)),
    }
  }

  async fn delete(&self, siret: &Siret) -> Result<bool> {
    let siret_str = siret.as_str().to_owned();

    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let removed = delete_aggregate(&tx, &siret_str)?;
        tx.commit()?;
        Ok(removed)
      })
      .await?;
    Ok(removed)
  }

  async fn query_within_distance(&self, query: &GeoQuery) -> Result<Vec<Candidate>> {
    let bbox = BoundingBox::around(&query.position, query.distance_km);

    let lon_filter = if bbox.crosses_antimeridian() {
      "(e.lon >= ?3 OR e.lon <= ?4)"
    } else {
      "e.lon BETWEEN ?3 AND ?4"
    };

    // Build WHERE clause dynamically.
    let mut sql = format!(
      "SELECT {ESTABLISHMENT_COLUMNS} FROM establishments e
       WHERE e.is_active = 1 AND e.is_searchable = 1
         AND e.lat BETWEEN ?1 AND ?2
         AND {lon_filter}"
    );
    let mut params: Vec<Value> = vec![
      Value::Real(bbox.min_lat),
      Value::Real(bbox.max_lat),
      Value::Real(bbox.min_lon),
      Value::Real(bbox.max_lon),
    ];

    if let Some(siret) = &query.siret {
      params.push(Value::Text(siret.as_str().to_owned()));
      sql.push_str(&format!(" AND e.siret = ?{}", params.len()));
    }
    if query.voluntary_only {
      params.push(Value::Text(DataSource::Form.as_ref().to_owned()));
      sql.push_str(&format!(" AND e.data_source = ?{}", params.len()));
    }
    if !query.occupation_codes.is_empty() {
      let placeholders: Vec<String> = query
        .occupation_codes
        .iter()
        .map(|code| {
          params.push(Value::Text(code.clone()));
          format!("?{}", params.len())
        })
        .collect();
      sql.push_str(&format!(
        " AND EXISTS (SELECT 1 FROM offers o WHERE o.siret = e.siret AND o.rome_code IN ({}))",
        placeholders.join(", ")
      ));
    }
    sql.push_str(" ORDER BY e.siret");

    let raws: Vec<RawAggregate> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let establishments = {
          let mut stmt = tx.prepare(&sql)?;
          stmt
            .query_map(rusqlite::params_from_iter(params), RawEstablishment::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        let raws = establishments
          .into_iter()
          .map(|e| load_owned(&tx, e))
          .collect::<rusqlite::Result<Vec<_>>>()?;
        tx.commit()?;
        Ok(raws)
      })
      .await?;

    let mut candidates = Vec::with_capacity(raws.len());
    for raw in raws {
      let aggregate = raw.into_aggregate()?;
      let distance_m = query.position.distance_m(&aggregate.establishment.position);
      if geo::within_radius(distance_m, query.distance_km) {
        candidates.push(Candidate { aggregate, distance_m });
      }
    }
    Ok(candidates)
  }

  async fn record_search(&self, search: SearchMade) -> Result<()> {
    let codes = encode_list(&search.occupation_codes)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO searches_made (
             search_id, occupation_codes, lat, lon, distance_km, sort_mode,
             voluntary_only, siret, needs_to_be_searched, result_count,
             consumer, searched_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
          rusqlite::params![
            search.id.hyphenated().to_string(),
            codes,
            search.position.lat,
            search.position.lon,
            search.distance_km,
            search.sort_mode.as_ref(),
            search.voluntary_only,
            search.siret.as_ref().map(Siret::as_str),
            search.needs_to_be_searched,
            search.result_count as i64,
            search.consumer,
            encode_dt(search.searched_at),
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Registry refresh: naf and employee range when supplied, closure flag,
/// `updated_at`. Nothing else on the row changes.
fn apply_registry_update(
  conn: &rusqlite::Connection,
  siret: &str,
  update: &RegistryUpdate,
  updated_at: String,
) -> rusqlite::Result<bool> {
  let (naf_code, naf_nomenclature) = match &update.naf {
    Some(naf) => (Some(naf.code.as_str()), Some(naf.nomenclature.as_str())),
    None => (None, None),
  };
  let changed = conn.execute(
    "UPDATE establishments SET
       naf_code               = COALESCE(?2, naf_code),
       naf_nomenclature       = COALESCE(?3, naf_nomenclature),
       number_employees_range = COALESCE(?4, number_employees_range),
       is_active              = CASE WHEN ?5 THEN is_active ELSE 0 END,
       updated_at             = ?6
     WHERE siret = ?1",
    rusqlite::params![
      siret,
      naf_code,
      naf_nomenclature,
      update.number_employees_range,
      update.is_open,
      updated_at,
    ],
  )?;
  Ok(changed > 0)
}
