//! SQL schema for the immersion SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per siret, whichever source wrote it.
CREATE TABLE IF NOT EXISTS establishments (
    siret                     TEXT PRIMARY KEY,
    name                      TEXT NOT NULL,
    customized_name           TEXT,
    street_number_and_address TEXT NOT NULL,
    postcode                  TEXT NOT NULL,
    city                      TEXT NOT NULL,
    department_code           TEXT NOT NULL,
    lat                       REAL NOT NULL,
    lon                       REAL NOT NULL,
    naf_code                  TEXT NOT NULL,
    naf_nomenclature          TEXT NOT NULL,
    number_employees_range    TEXT NOT NULL,
    data_source               TEXT NOT NULL,   -- 'form' | 'automated-feed' | 'legal-registry'
    source_provider           TEXT,
    is_active                 INTEGER NOT NULL DEFAULT 1,
    is_searchable             INTEGER NOT NULL DEFAULT 1,
    fit_for_disabled_workers  INTEGER,
    max_contacts_per_week     INTEGER NOT NULL,
    updated_at                TEXT NOT NULL,   -- ISO 8601 UTC
    is_committed              INTEGER
);

CREATE TABLE IF NOT EXISTS contacts (
    contact_id     TEXT PRIMARY KEY,
    siret          TEXT NOT NULL REFERENCES establishments(siret) ON DELETE CASCADE,
    first_name     TEXT NOT NULL,
    last_name      TEXT NOT NULL,
    email          TEXT NOT NULL,
    phone          TEXT NOT NULL,
    job            TEXT NOT NULL,
    contact_method TEXT NOT NULL,               -- 'EMAIL' | 'PHONE' | 'IN_PERSON'
    copy_emails    TEXT NOT NULL DEFAULT '[]'   -- JSON array
);

-- Not unique per (siret, rome_code): the feed appends, readers aggregate.
CREATE TABLE IF NOT EXISTS offers (
    offer_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    siret             TEXT NOT NULL REFERENCES establishments(siret) ON DELETE CASCADE,
    rome_code         TEXT NOT NULL,
    appellation_code  TEXT,
    appellation_label TEXT,
    score             REAL NOT NULL DEFAULT 0,
    created_at        TEXT NOT NULL
);

-- Append-only search log.
CREATE TABLE IF NOT EXISTS searches_made (
    search_id            TEXT PRIMARY KEY,
    occupation_codes     TEXT NOT NULL,   -- JSON array
    lat                  REAL NOT NULL,
    lon                  REAL NOT NULL,
    distance_km          REAL NOT NULL,
    sort_mode            TEXT NOT NULL,
    voluntary_only       INTEGER NOT NULL,
    siret                TEXT,
    needs_to_be_searched INTEGER NOT NULL,
    result_count         INTEGER NOT NULL,
    consumer             TEXT,
    searched_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS establishments_position_idx ON establishments(lat, lon);
CREATE INDEX IF NOT EXISTS contacts_siret_idx          ON contacts(siret);
CREATE INDEX IF NOT EXISTS offers_siret_idx            ON offers(siret);
CREATE INDEX IF NOT EXISTS offers_rome_idx             ON offers(rome_code);
CREATE INDEX IF NOT EXISTS searches_pending_idx        ON searches_made(needs_to_be_searched);

PRAGMA user_version = 1;
";
