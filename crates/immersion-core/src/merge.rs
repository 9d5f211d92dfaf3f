//! `AggregateMergeEngine`: reconciles establishments arriving from the
//! form, the automated feed and the legal registry.
//!
//! The two ingestion pathways replace data differently:
//!
//! | Pathway | Establishment row | Contact | Offers |
//! |---------|-------------------|---------|--------|
//! | bulk feed | overwritten when precedence allows | replaced when allowed and supplied | always appended |
//! | form upsert | replaced | replaced | replaced by exactly the submitted set |
//!
//! Every call ends in at most one applied [`AggregateWrite`], so each siret
//! changes atomically. The write is guarded by the `data_source` the
//! decision was made against; if a concurrent ingestion changed it in the
//! meantime the store applies nothing and the engine decides again on fresh
//! state.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
  Error, Result, Siret,
  establishment::{DataSource, EstablishmentAggregate, RegistryUpdate},
  precedence,
  store::{AggregateWrite, EstablishmentStore, WriteOutcome},
};

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Why a bulk merge left the establishment row untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
  /// The stored row is owned by a source that outranks the incoming one.
  /// Offers were still appended.
  SourcePrecedence { existing: DataSource },
}

/// Result of merging one aggregate from the bulk feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
  Inserted,
  Updated,
  Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
  pub siret:   Siret,
  pub message: String,
}

/// Tally of a bulk run. A failing siret never aborts the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSyncReport {
  pub inserted: usize,
  pub updated:  usize,
  pub skipped:  usize,
  pub failed:   usize,
  pub failures: Vec<SyncFailure>,
}

impl BulkSyncReport {
  pub fn total(&self) -> usize { self.inserted + self.updated + self.skipped + self.failed }

  fn record(&mut self, siret: Siret, result: Result<MergeOutcome>) {
    match result {
      Ok(MergeOutcome::Inserted) => self.inserted += 1,
      Ok(MergeOutcome::Updated) => self.updated += 1,
      Ok(MergeOutcome::Skipped { .. }) => self.skipped += 1,
      Err(e) => {
        warn!(%siret, error = %e, "bulk merge failed");
        self.failed += 1;
        self.failures.push(SyncFailure { siret, message: e.to_string() });
      }
    }
  }
}

// ─── Form submissions ────────────────────────────────────────────────────────

/// Whether a form submission creates a listing or edits the business's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormContext {
  Creation,
  Edit,
}

/// A full snapshot of an establishment as declared by the business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSubmission {
  pub aggregate: EstablishmentAggregate,
  pub context:   FormContext,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Ingestion use cases over an [`EstablishmentStore`].
///
/// Cloning is cheap: the store is reference-counted.
pub struct AggregateMergeEngine<S> {
  store: Arc<S>,
}

impl<S> Clone for AggregateMergeEngine<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

/// Guarded writes attempted per call before giving up with
/// [`Error::Contention`].
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Decide what a feed aggregate does to a siret whose stored source is
/// `existing`.
fn plan_bulk_merge(
  aggregate: &EstablishmentAggregate,
  existing: Option<DataSource>,
) -> Result<(AggregateWrite, MergeOutcome)> {
  let Some(existing) = existing else {
    aggregate.validate()?;
    let mut aggregate = aggregate.clone();
    aggregate.establishment.updated_at = Utc::now();
    return Ok((AggregateWrite::Insert(aggregate), MergeOutcome::Inserted));
  };

  let precedence = precedence::decide(Some(existing), aggregate.establishment.data_source);
  if !precedence.allows_establishment_field_update() {
    let write = AggregateWrite::Merge {
      siret:         aggregate.siret().clone(),
      establishment: None,
      contact:       None,
      offers:        aggregate.offers.clone(),
    };
    let reason = SkipReason::SourcePrecedence { existing };
    return Ok((write, MergeOutcome::Skipped { reason }));
  }

  aggregate.validate()?;
  let mut establishment = aggregate.establishment.clone();
  establishment.updated_at = Utc::now();
  let write = AggregateWrite::Merge {
    siret:         aggregate.siret().clone(),
    establishment: Some(establishment),
    contact:       aggregate.contact.clone(),
    offers:        aggregate.offers.clone(),
  };
  Ok((write, MergeOutcome::Updated))
}

impl<S: EstablishmentStore> AggregateMergeEngine<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  async fn existing(&self, siret: &Siret) -> Result<Option<EstablishmentAggregate>> {
    self.store.get_aggregate(siret).await.map_err(Error::store)
  }

  async fn existing_source(&self, siret: &Siret) -> Result<Option<DataSource>> {
    Ok(self.existing(siret).await?.map(|a| a.establishment.data_source))
  }

  /// Write `write` only if the stored source is still `expected`. Returns
  /// `false` when it changed and the caller must decide again.
  async fn write_guarded(&self, write: AggregateWrite, expected: Option<DataSource>) -> Result<bool> {
    let siret = write.siret().clone();
    match self.store.write(write, expected).await.map_err(Error::store)? {
      WriteOutcome::Applied => Ok(true),
      WriteOutcome::SourceChanged { current } => {
        debug!(%siret, ?expected, ?current, "source changed before write, deciding again");
        Ok(false)
      }
    }
  }

  // ── Bulk pathway ──────────────────────────────────────────────────────────

  /// Merge one aggregate coming from the automated feed.
  ///
  /// Offers are appended in every branch, even when they duplicate stored
  /// ones; search aggregates appellations at read time.
  pub async fn merge_from_bulk_feed(&self, aggregate: EstablishmentAggregate) -> Result<MergeOutcome> {
    let incoming = aggregate.establishment.data_source;
    if incoming != DataSource::AutomatedFeed {
      return Err(Error::InvalidIngestion(format!(
        "bulk feed cannot carry {incoming} aggregates ({})",
        aggregate.siret()
      )));
    }

    let siret = aggregate.siret().clone();
    for _ in 0..MAX_WRITE_ATTEMPTS {
      let existing = self.existing_source(&siret).await?;
      let (write, outcome) = plan_bulk_merge(&aggregate, existing)?;
      if self.write_guarded(write, existing).await? {
        debug!(%siret, ?existing, ?outcome, appended = aggregate.offers.len(), "feed aggregate merged");
        return Ok(outcome);
      }
    }
    warn!(%siret, "gave up merging feed aggregate under contention");
    Err(Error::Contention(siret))
  }

  /// Run a whole feed synchronisation, one transaction per siret.
  pub async fn sync_bulk_feed<I>(&self, aggregates: I) -> BulkSyncReport
  where
    I: IntoIterator<Item = EstablishmentAggregate>,
  {
    let mut report = BulkSyncReport::default();
    for aggregate in aggregates {
      let siret = aggregate.siret().clone();
      let result = self.merge_from_bulk_feed(aggregate).await;
      report.record(siret, result);
    }
    info!(
      inserted = report.inserted,
      updated = report.updated,
      skipped = report.skipped,
      failed = report.failed,
      "bulk feed sync finished"
    );
    report
  }

  // ── Form pathway ──────────────────────────────────────────────────────────

  /// Replace everything stored for the siret with the submitted snapshot.
  ///
  /// A creation against a siret that is already form-sourced is a conflict:
  /// two unrelated submissions are never merged. An edit requires the
  /// establishment to exist.
  pub async fn upsert_from_form(&self, submission: FormSubmission) -> Result<()> {
    let FormSubmission { mut aggregate, context } = submission;
    aggregate.establishment.data_source = DataSource::Form;
    aggregate.validate()?;

    let siret = aggregate.siret().clone();
    for _ in 0..MAX_WRITE_ATTEMPTS {
      let existing = self.existing_source(&siret).await?;
      match (context, existing) {
        (FormContext::Creation, Some(DataSource::Form)) => {
          warn!(%siret, "form creation for an establishment already registered by form");
          return Err(Error::Conflict(siret));
        }
        (FormContext::Edit, None) => return Err(Error::NotFound(siret)),
        _ => {}
      }

      let mut snapshot = aggregate.clone();
      snapshot.establishment.updated_at = Utc::now();
      if self.write_guarded(AggregateWrite::Replace(snapshot), existing).await? {
        let offers = aggregate.offers.len();
        info!(%siret, ?context, ?existing, offers, "establishment saved from form");
        return Ok(());
      }
    }
    warn!(%siret, "gave up saving form submission under contention");
    Err(Error::Contention(siret))
  }

  // ── Registry pathway ──────────────────────────────────────────────────────

  /// Apply a legal-registry refresh to the administrative subset.
  pub async fn refresh_from_legal_registry(
    &self,
    siret: &Siret,
    update: RegistryUpdate,
  ) -> Result<()> {
    if !update.is_open {
      info!(%siret, "registry reports establishment closed");
    }
    for _ in 0..MAX_WRITE_ATTEMPTS {
      let existing = self
        .existing_source(siret)
        .await?
        .ok_or_else(|| Error::NotFound(siret.clone()))?;
      // The registry may always touch the administrative subset.
      debug_assert!(precedence::decide(Some(existing), DataSource::LegalRegistry).administrative_fields);

      let write = AggregateWrite::Administrative {
        siret:      siret.clone(),
        update:     update.clone(),
        updated_at: Utc::now(),
      };
      if self.write_guarded(write, Some(existing)).await? {
        return Ok(());
      }
    }
    Err(Error::Contention(siret.clone()))
  }

  // ── Removal and reads ─────────────────────────────────────────────────────

  /// Delete the establishment with its contact and offers.
  pub async fn remove_establishment(&self, siret: &Siret) -> Result<()> {
    let removed = self.store.delete(siret).await.map_err(Error::store)?;
    if !removed {
      return Err(Error::NotFound(siret.clone()));
    }
    info!(%siret, "establishment removed");
    Ok(())
  }

  pub async fn get_aggregate(&self, siret: &Siret) -> Result<EstablishmentAggregate> {
    self
      .existing(siret)
      .await?
      .ok_or_else(|| Error::NotFound(siret.clone()))
  }
}
