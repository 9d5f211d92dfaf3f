//! Integration tests for `SqliteStore` and the core engines against an
//! in-memory database.

use std::sync::Arc;

use chrono::Utc;
use immersion_core::{
  Error as CoreError, Siret,
  establishment::{
    Address, Contact, ContactMethod, DataSource, Establishment, EstablishmentAggregate, Naf,
    Offer, RegistryUpdate,
  },
  geo::GeoPosition,
  merge::{AggregateMergeEngine, FormContext, FormSubmission, MergeOutcome, SkipReason},
  search::{SearchQueryEngine, SearchRequest, SearchSettings},
  store::{AggregateWrite, EstablishmentStore, WriteOutcome},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

const MARSEILLE: GeoPosition = GeoPosition { lat: 43.2965, lon: 5.3698 };

async fn store() -> Arc<SqliteStore> {
  Arc::new(
    SqliteStore::open_in_memory()
      .await
      .expect("in-memory store"),
  )
}

fn engines(store: &Arc<SqliteStore>) -> (AggregateMergeEngine<SqliteStore>, SearchQueryEngine<SqliteStore>) {
  (
    AggregateMergeEngine::new(Arc::clone(store)),
    SearchQueryEngine::new(Arc::clone(store), SearchSettings::default()),
  )
}

fn siret(s: &str) -> Siret { s.parse().unwrap() }

fn establishment(siret_str: &str, source: DataSource, position: GeoPosition) -> Establishment {
  Establishment {
    siret:                    siret(siret_str),
    name:                     "Garage Central".into(),
    customized_name:          None,
    address:                  Address {
      street_number_and_address: "12 rue de Rome".into(),
      postcode:                  "13001".into(),
      city:                      "Marseille".into(),
      department_code:           "13".into(),
    },
    position,
    naf:                      Naf { code: "4520A".into(), nomenclature: "NAFRev2".into() },
    number_employees_range:   "10-19".into(),
    data_source:              source,
    source_provider:          None,
    is_active:                true,
    is_searchable:            true,
    fit_for_disabled_workers: Some(true),
    max_contacts_per_week:    5,
    updated_at:               Utc::now(),
    is_committed:             None,
  }
}

fn contact(first_name: &str) -> Contact {
  Contact {
    id:             Uuid::new_v4(),
    first_name:     first_name.into(),
    last_name:      "Durand".into(),
    email:          format!("{}@garage.example", first_name.to_lowercase()),
    phone:          "+33491000000".into(),
    job:            "Chef d'atelier".into(),
    contact_method: ContactMethod::Phone,
    copy_emails:    vec!["rh@garage.example".into()],
  }
}

fn feed(siret_str: &str, offers: Vec<Offer>) -> EstablishmentAggregate {
  EstablishmentAggregate {
    establishment: establishment(siret_str, DataSource::AutomatedFeed, MARSEILLE),
    contact: None,
    offers,
  }
}

fn form(siret_str: &str, offers: Vec<Offer>, context: FormContext) -> FormSubmission {
  FormSubmission {
    aggregate: EstablishmentAggregate {
      establishment: establishment(siret_str, DataSource::Form, MARSEILLE),
      contact: Some(contact("Lea")),
      offers,
    },
    context,
  }
}

fn search_for(codes: &[&str]) -> SearchRequest {
  let mut request = SearchRequest::new(MARSEILLE, 10.0);
  request.occupation_codes = codes.iter().map(|c| c.to_string()).collect();
  request
}

// ─── Store round-trips ───────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_get_aggregate() {
  let s = store().await;
  let mut aggregate = feed("11111111111111", vec![Offer::new("A1101").with_appellation("11987")]);
  aggregate.contact = Some(contact("Paul"));

  let outcome = s.write(AggregateWrite::Insert(aggregate.clone()), None).await.unwrap();
  assert_eq!(outcome, WriteOutcome::Applied);

  let fetched = s.get_aggregate(&siret("11111111111111")).await.unwrap().unwrap();
  assert_eq!(fetched.establishment.name, "Garage Central");
  assert_eq!(fetched.establishment.data_source, DataSource::AutomatedFeed);
  assert_eq!(fetched.establishment.fit_for_disabled_workers, Some(true));
  assert_eq!(fetched.contact.as_ref().unwrap().copy_emails, ["rh@garage.example"]);
  assert_eq!(fetched.contact.unwrap().contact_method, ContactMethod::Phone);
  assert_eq!(fetched.offers.len(), 1);
  assert_eq!(fetched.offers[0].appellation_code.as_deref(), Some("11987"));
}

#[tokio::test]
async fn get_missing_aggregate_returns_none() {
  let s = store().await;
  assert!(s.get_aggregate(&siret("99999999999999")).await.unwrap().is_none());
}

#[tokio::test]
async fn merge_into_missing_row_is_rejected_and_rolled_back() {
  let s = store().await;
  let result = s
    .write(AggregateWrite::Merge {
      siret:         siret("11111111111111"),
      establishment: None,
      contact:       None,
      offers:        vec![Offer::new("A1101")],
    }, None)
    .await;
  assert!(matches!(result, Err(Error::EstablishmentNotFound(_))));
}

#[tokio::test]
async fn stale_insert_is_not_applied() {
  let s = store().await;
  s.write(AggregateWrite::Insert(feed("11111111111111", vec![Offer::new("A1101")])), None)
    .await
    .unwrap();

  let second = s
    .write(AggregateWrite::Insert(feed("11111111111111", vec![Offer::new("B1201")])), None)
    .await
    .unwrap();
  assert_eq!(
    second,
    WriteOutcome::SourceChanged { current: Some(DataSource::AutomatedFeed) }
  );

  let stored = s.get_aggregate(&siret("11111111111111")).await.unwrap().unwrap();
  assert_eq!(stored.offers.len(), 1);
  assert_eq!(stored.offers[0].rome_code, "A1101");
}

#[tokio::test]
async fn write_against_a_changed_source_leaves_the_row_untouched() {
  let s = store().await;
  let mut registered = form("11111111111111", vec![Offer::new("A1101")], FormContext::Creation).aggregate;
  registered.establishment.name = "Garage Lea".into();
  s.write(AggregateWrite::Insert(registered), None).await.unwrap();

  // Decided while the row was still believed to come from the feed.
  let mut from_feed = feed("11111111111111", vec![Offer::new("B1201")]).establishment;
  from_feed.name = "Feed name".into();
  let outcome = s
    .write(
      AggregateWrite::Merge {
        siret:         siret("11111111111111"),
        establishment: Some(from_feed),
        contact:       None,
        offers:        vec![Offer::new("B1201")],
      },
      Some(DataSource::AutomatedFeed),
    )
    .await
    .unwrap();
  assert_eq!(outcome, WriteOutcome::SourceChanged { current: Some(DataSource::Form) });

  let stored = s.get_aggregate(&siret("11111111111111")).await.unwrap().unwrap();
  assert_eq!(stored.establishment.name, "Garage Lea");
  assert_eq!(stored.establishment.data_source, DataSource::Form);
  assert_eq!(stored.offers.len(), 1);
}

// ─── Bulk pathway ────────────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_merge_inserts_then_updates() {
  let s = store().await;
  let (merge, _) = engines(&s);

  let first = merge.merge_from_bulk_feed(feed("11111111111111", vec![Offer::new("A1101")])).await;
  assert_eq!(first.unwrap(), MergeOutcome::Inserted);

  let mut renamed = feed("11111111111111", vec![]);
  renamed.establishment.name = "Garage du Centre".into();
  let second = merge.merge_from_bulk_feed(renamed).await;
  assert_eq!(second.unwrap(), MergeOutcome::Updated);

  let stored = merge.get_aggregate(&siret("11111111111111")).await.unwrap();
  assert_eq!(stored.establishment.name, "Garage du Centre");
  assert_eq!(stored.offers.len(), 1);
}

#[tokio::test]
async fn bulk_merges_accumulate_offers() {
  let s = store().await;
  let (merge, search) = engines(&s);

  merge.merge_from_bulk_feed(feed("11111111111111", vec![Offer::new("A1101")])).await.unwrap();
  merge
    .merge_from_bulk_feed(feed("11111111111111", vec![Offer::new("A1101").with_appellation("X")]))
    .await
    .unwrap();

  let stored = merge.get_aggregate(&siret("11111111111111")).await.unwrap();
  assert_eq!(stored.offers.len(), 2);

  let rows = search.search(search_for(&["A1101"])).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].appellation_codes.iter().collect::<Vec<_>>(), ["X"]);
}

#[tokio::test]
async fn feed_never_overwrites_form_fields_but_appends_offers() {
  let s = store().await;
  let (merge, _) = engines(&s);

  merge.upsert_from_form(form("22222222222222", vec![Offer::new("D1102")], FormContext::Creation))
    .await
    .unwrap();
  let before = merge.get_aggregate(&siret("22222222222222")).await.unwrap();

  for round in 0..3 {
    let mut incoming = feed("22222222222222", vec![Offer::new("D1102")]);
    incoming.establishment.name = format!("Feed name {round}");
    incoming.establishment.address.city = "Aubagne".into();
    incoming.establishment.naf.code = "9999Z".into();
    incoming.establishment.number_employees_range = "200-249".into();
    incoming.establishment.position = GeoPosition { lat: 43.29, lon: 5.57 };
    incoming.contact = Some(contact("Feed"));

    let outcome = merge.merge_from_bulk_feed(incoming).await.unwrap();
    assert_eq!(
      outcome,
      MergeOutcome::Skipped { reason: SkipReason::SourcePrecedence { existing: DataSource::Form } }
    );
  }

  let after = merge.get_aggregate(&siret("22222222222222")).await.unwrap();
  assert_eq!(after.establishment, before.establishment);
  assert_eq!(after.contact, before.contact);
  assert_eq!(after.offers.len(), 4);
}

#[tokio::test]
async fn bulk_rejects_form_sourced_aggregates() {
  let s = store().await;
  let (merge, _) = engines(&s);
  let mut aggregate = feed("11111111111111", vec![]);
  aggregate.establishment.data_source = DataSource::Form;
  let result = merge.merge_from_bulk_feed(aggregate).await;
  assert!(matches!(result, Err(CoreError::InvalidIngestion(_))));
}

#[tokio::test]
async fn bulk_sync_reports_a_tally_and_continues_past_failures() {
  let s = store().await;
  let (merge, _) = engines(&s);

  merge.upsert_from_form(form("33333333333333", vec![], FormContext::Creation)).await.unwrap();
  merge.merge_from_bulk_feed(feed("22222222222222", vec![])).await.unwrap();

  let mut invalid = feed("44444444444444", vec![]);
  invalid.establishment.naf.code = String::new();

  let report = merge
    .sync_bulk_feed(vec![
      feed("11111111111111", vec![Offer::new("A1101")]),
      feed("22222222222222", vec![Offer::new("A1101")]),
      feed("33333333333333", vec![Offer::new("A1101")]),
      invalid,
      feed("55555555555555", vec![Offer::new("A1101")]),
    ])
    .await;

  assert_eq!(report.inserted, 2);
  assert_eq!(report.updated, 1);
  assert_eq!(report.skipped, 1);
  assert_eq!(report.failed, 1);
  assert_eq!(report.failures[0].siret, siret("44444444444444"));
  assert!(merge.get_aggregate(&siret("55555555555555")).await.is_ok());
}

// ─── Form pathway ────────────────────────────────────────────────────────────

#[tokio::test]
async fn form_upsert_replaces_all_offers() {
  let s = store().await;
  let (merge, _) = engines(&s);

  for _ in 0..3 {
    merge
      .merge_from_bulk_feed(feed("22222222222222", vec![Offer::new("A1101"), Offer::new("B1201")]))
      .await
      .unwrap();
  }
  assert_eq!(merge.get_aggregate(&siret("22222222222222")).await.unwrap().offers.len(), 6);

  merge
    .upsert_from_form(form("22222222222222", vec![Offer::new("G1602")], FormContext::Creation))
    .await
    .unwrap();

  let stored = merge.get_aggregate(&siret("22222222222222")).await.unwrap();
  assert_eq!(stored.establishment.data_source, DataSource::Form);
  assert_eq!(stored.offers.len(), 1);
  assert_eq!(stored.offers[0].rome_code, "G1602");
  assert_eq!(stored.contact.unwrap().first_name, "Lea");
}

#[tokio::test]
async fn form_edit_keeps_exactly_the_submitted_offers() {
  let s = store().await;
  let (merge, _) = engines(&s);

  merge
    .upsert_from_form(form(
      "22222222222222",
      vec![Offer::new("A1101"), Offer::new("D1102"), Offer::new("G1602")],
      FormContext::Creation,
    ))
    .await
    .unwrap();
  merge.merge_from_bulk_feed(feed("22222222222222", vec![Offer::new("A1101")])).await.unwrap();

  let mut edit = form("22222222222222", vec![Offer::new("D1102")], FormContext::Edit);
  edit.aggregate.contact = Some(contact("Hugo"));
  merge.upsert_from_form(edit).await.unwrap();

  let stored = merge.get_aggregate(&siret("22222222222222")).await.unwrap();
  assert_eq!(stored.offers.len(), 1);
  assert_eq!(stored.contact.unwrap().first_name, "Hugo");
}

#[tokio::test]
async fn second_form_creation_is_a_conflict() {
  let s = store().await;
  let (merge, _) = engines(&s);

  merge.upsert_from_form(form("22222222222222", vec![], FormContext::Creation)).await.unwrap();
  let again = merge
    .upsert_from_form(form("22222222222222", vec![Offer::new("A1101")], FormContext::Creation))
    .await;
  assert!(matches!(again, Err(CoreError::Conflict(_))));

  let stored = merge.get_aggregate(&siret("22222222222222")).await.unwrap();
  assert!(stored.offers.is_empty());
}

#[tokio::test]
async fn editing_an_unknown_establishment_is_not_found() {
  let s = store().await;
  let (merge, _) = engines(&s);
  let result = merge.upsert_from_form(form("22222222222222", vec![], FormContext::Edit)).await;
  assert!(matches!(result, Err(CoreError::NotFound(_))));
}

// ─── Concurrent ingestion ────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_form_creations_let_exactly_one_win() {
  let s = store().await;
  let (merge, _) = engines(&s);

  let mut first = form("22222222222222", vec![Offer::new("A1101")], FormContext::Creation);
  first.aggregate.establishment.name = "First submitter".into();
  let mut second = form("22222222222222", vec![Offer::new("D1102")], FormContext::Creation);
  second.aggregate.establishment.name = "Second submitter".into();

  let (a, b) = tokio::join!(merge.upsert_from_form(first), merge.upsert_from_form(second));

  let winner = match (&a, &b) {
    (Ok(()), Err(CoreError::Conflict(_))) => "First submitter",
    (Err(CoreError::Conflict(_)), Ok(())) => "Second submitter",
    other => panic!("expected one creation and one conflict, got {other:?}"),
  };
  let stored = merge.get_aggregate(&siret("22222222222222")).await.unwrap();
  assert_eq!(stored.establishment.name, winner);
  assert_eq!(stored.offers.len(), 1);
}

#[tokio::test]
async fn concurrent_feed_merge_never_overwrites_a_form_creation() {
  let s = store().await;
  let (merge, _) = engines(&s);
  merge.merge_from_bulk_feed(feed("22222222222222", vec![])).await.unwrap();

  let mut submission = form("22222222222222", vec![Offer::new("A1101")], FormContext::Creation);
  submission.aggregate.establishment.name = "Garage Lea".into();
  let mut from_feed = feed("22222222222222", vec![Offer::new("D1102")]);
  from_feed.establishment.name = "Feed name".into();

  let (form_result, feed_result) =
    tokio::join!(merge.upsert_from_form(submission), merge.merge_from_bulk_feed(from_feed));
  form_result.unwrap();
  assert!(matches!(
    feed_result.unwrap(),
    MergeOutcome::Skipped { .. } | MergeOutcome::Updated
  ));

  let stored = merge.get_aggregate(&siret("22222222222222")).await.unwrap();
  assert_eq!(stored.establishment.data_source, DataSource::Form);
  assert_eq!(stored.establishment.name, "Garage Lea");
}

#[tokio::test]
async fn form_with_invalid_position_is_rejected() {
  let s = store().await;
  let (merge, _) = engines(&s);
  let mut submission = form("22222222222222", vec![], FormContext::Creation);
  submission.aggregate.establishment.position = GeoPosition { lat: 0.0, lon: 200.0 };
  let result = merge.upsert_from_form(submission).await;
  assert!(matches!(result, Err(CoreError::InvalidPosition { .. })));
  assert!(s.get_aggregate(&siret("22222222222222")).await.unwrap().is_none());
}

// ─── Removal and registry ────────────────────────────────────────────────────

#[tokio::test]
async fn remove_cascades_and_missing_is_not_found() {
  let s = store().await;
  let (merge, search) = engines(&s);

  merge.upsert_from_form(form("22222222222222", vec![Offer::new("A1101")], FormContext::Creation))
    .await
    .unwrap();
  merge.remove_establishment(&siret("22222222222222")).await.unwrap();

  assert!(s.get_aggregate(&siret("22222222222222")).await.unwrap().is_none());
  assert!(search.search(search_for(&["A1101"])).await.unwrap().is_empty());

  let again = merge.remove_establishment(&siret("22222222222222")).await;
  assert!(matches!(again, Err(CoreError::NotFound(_))));

  // A fresh insert starts from an empty offer list.
  merge.merge_from_bulk_feed(feed("22222222222222", vec![Offer::new("B1201")])).await.unwrap();
  assert_eq!(merge.get_aggregate(&siret("22222222222222")).await.unwrap().offers.len(), 1);
}

#[tokio::test]
async fn registry_refresh_updates_only_administrative_fields() {
  let s = store().await;
  let (merge, search) = engines(&s);

  merge.upsert_from_form(form("22222222222222", vec![Offer::new("A1101")], FormContext::Creation))
    .await
    .unwrap();
  let before = merge.get_aggregate(&siret("22222222222222")).await.unwrap();

  merge
    .refresh_from_legal_registry(&siret("22222222222222"), RegistryUpdate {
      naf:                    Some(Naf { code: "4511Z".into(), nomenclature: "NAFRev2".into() }),
      number_employees_range: Some("20-49".into()),
      is_open:                true,
    })
    .await
    .unwrap();

  let after = merge.get_aggregate(&siret("22222222222222")).await.unwrap();
  assert_eq!(after.establishment.naf.code, "4511Z");
  assert_eq!(after.establishment.number_employees_range, "20-49");
  assert_eq!(after.establishment.name, before.establishment.name);
  assert_eq!(after.establishment.address, before.establishment.address);
  assert_eq!(after.establishment.data_source, DataSource::Form);
  assert!(after.establishment.is_active);
  assert_eq!(after.offers, before.offers);

  merge
    .refresh_from_legal_registry(&siret("22222222222222"), RegistryUpdate {
      is_open: false,
      ..RegistryUpdate::default()
    })
    .await
    .unwrap();
  let closed = merge.get_aggregate(&siret("22222222222222")).await.unwrap();
  assert!(!closed.establishment.is_active);
  assert_eq!(closed.establishment.naf.code, "4511Z");
  assert!(search.search(search_for(&[])).await.unwrap().is_empty());
}

#[tokio::test]
async fn registry_refresh_of_unknown_siret_is_not_found() {
  let s = store().await;
  let (merge, _) = engines(&s);
  let result = merge
    .refresh_from_legal_registry(&siret("22222222222222"), RegistryUpdate::default())
    .await;
  assert!(matches!(result, Err(CoreError::NotFound(_))));
}

// ─── Search ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn form_sourced_ranks_before_feed_at_equal_distance() {
  let s = store().await;
  let (merge, search) = engines(&s);

  merge.merge_from_bulk_feed(feed("11111111111111", vec![Offer::new("A1101")])).await.unwrap();
  merge.upsert_from_form(form("22222222222222", vec![Offer::new("A1101")], FormContext::Creation))
    .await
    .unwrap();

  let rows = search.search(search_for(&["A1101"])).await.unwrap();
  assert_eq!(rows.len(), 2);
  assert_eq!(rows[0].siret, siret("22222222222222"));
  assert!(rows[0].voluntary_to_immersion);
  assert_eq!(rows[0].distance_m, rows[1].distance_m);
}

#[tokio::test]
async fn geofilter_boundary_is_inclusive() {
  let s = store().await;
  let (merge, search) = engines(&s);

  let north = GeoPosition { lat: MARSEILLE.lat + 0.02, lon: MARSEILLE.lon };
  let mut aggregate = feed("11111111111111", vec![Offer::new("A1101")]);
  aggregate.establishment.position = north;
  merge.merge_from_bulk_feed(aggregate).await.unwrap();

  let exact_m = MARSEILLE.distance_m(&north).round();

  let mut at_boundary = search_for(&["A1101"]);
  at_boundary.distance_km = exact_m / 1000.0;
  let rows = search.search(at_boundary).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].distance_m as f64, exact_m);

  let mut one_meter_short = search_for(&["A1101"]);
  one_meter_short.distance_km = (exact_m - 1.0) / 1000.0;
  assert!(search.search(one_meter_short).await.unwrap().is_empty());
}

#[tokio::test]
async fn far_establishments_are_excluded() {
  let s = store().await;
  let (merge, search) = engines(&s);

  let mut paris = feed("11111111111111", vec![Offer::new("A1101")]);
  paris.establishment.position = GeoPosition { lat: 48.8566, lon: 2.3522 };
  merge.merge_from_bulk_feed(paris).await.unwrap();
  merge.merge_from_bulk_feed(feed("22222222222222", vec![Offer::new("A1101")])).await.unwrap();

  let rows = search.search(search_for(&["A1101"])).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].siret, siret("22222222222222"));
}

#[tokio::test]
async fn search_reaches_across_the_antimeridian() {
  let s = store().await;
  let (merge, search) = engines(&s);

  let mut fiji = feed("11111111111111", vec![Offer::new("A1101")]);
  fiji.establishment.position = GeoPosition { lat: -16.5, lon: -179.95 };
  merge.merge_from_bulk_feed(fiji).await.unwrap();

  let request = SearchRequest::new(GeoPosition { lat: -16.5, lon: 179.95 }, 50.0);
  let rows = search.search(request).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert!(rows[0].distance_m < 11_000, "got {}", rows[0].distance_m);
}

#[tokio::test]
async fn empty_occupation_list_is_no_filter() {
  let s = store().await;
  let (merge, search) = engines(&s);

  merge.merge_from_bulk_feed(feed("11111111111111", vec![])).await.unwrap();
  merge.merge_from_bulk_feed(feed("22222222222222", vec![Offer::new("A1101")])).await.unwrap();

  let all = search.search(search_for(&[])).await.unwrap();
  assert_eq!(all.len(), 2);

  let filtered = search.search(search_for(&["A1101"])).await.unwrap();
  assert_eq!(filtered.len(), 1);
}

#[tokio::test]
async fn voluntary_only_filters_to_form_sourced() {
  let s = store().await;
  let (merge, search) = engines(&s);

  merge.merge_from_bulk_feed(feed("11111111111111", vec![Offer::new("A1101")])).await.unwrap();
  merge.upsert_from_form(form("22222222222222", vec![Offer::new("A1101")], FormContext::Creation))
    .await
    .unwrap();

  let mut request = search_for(&["A1101"]);
  request.voluntary_only = true;
  let rows = search.search(request).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].data_source, DataSource::Form);
}

#[tokio::test]
async fn siret_lookup_returns_one_establishment_or_not_found() {
  let s = store().await;
  let (merge, search) = engines(&s);

  merge.merge_from_bulk_feed(feed("11111111111111", vec![Offer::new("A1101")])).await.unwrap();
  merge.merge_from_bulk_feed(feed("22222222222222", vec![Offer::new("A1101")])).await.unwrap();

  let mut request = search_for(&[]);
  request.siret = Some(siret("22222222222222"));
  let rows = search.search(request).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].siret, siret("22222222222222"));

  let mut missing = search_for(&[]);
  missing.siret = Some(siret("33333333333333"));
  assert!(matches!(search.search(missing).await, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn contacts_are_redacted_for_anonymous_searches() {
  let s = store().await;
  let (merge, search) = engines(&s);

  merge.upsert_from_form(form("22222222222222", vec![Offer::new("A1101")], FormContext::Creation))
    .await
    .unwrap();

  let anonymous = search.search(search_for(&["A1101"])).await.unwrap();
  let json = serde_json::to_value(&anonymous).unwrap();
  assert!(json.as_array().unwrap().iter().all(|row| row.get("contact_details").is_none()));

  let mut authorized = search_for(&["A1101"]);
  authorized.include_contact_details = true;
  let rows = search.search(authorized).await.unwrap();
  assert_eq!(rows[0].contact_details.as_ref().unwrap().first_name, "Lea");
}

#[tokio::test]
async fn searches_are_logged() {
  let s = store().await;
  let (_, search) = engines(&s);

  search.search(search_for(&["A1101"])).await.unwrap();
  let mut voluntary = search_for(&["A1101"]);
  voluntary.voluntary_only = true;
  search.search(voluntary).await.unwrap();
  search.search(search_for(&[])).await.unwrap();

  assert_eq!(s.count_searches_made(false).await.unwrap(), 3);
  assert_eq!(s.count_searches_made(true).await.unwrap(), 1);
}

#[tokio::test]
async fn invalid_search_distance_is_rejected() {
  let s = store().await;
  let (_, search) = engines(&s);
  let mut request = search_for(&[]);
  request.distance_km = -1.0;
  assert!(matches!(search.search(request).await, Err(CoreError::InvalidDistance(_))));
}
