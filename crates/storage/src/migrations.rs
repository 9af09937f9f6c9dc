//! SQL migration definitions for the tenderscan database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as a batch.
//!
//! The named CHECK constraints on `tenders` double as the declared table of
//! recoverable upsert violations: the store matches constraint names in
//! error messages to decide between skip and sanitize-and-retry.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: sites, tenders, scan_jobs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- School registry (populated by the external importer)
CREATE TABLE IF NOT EXISTS sites (
    id           INTEGER PRIMARY KEY,
    display_name TEXT NOT NULL,
    declared_url TEXT NOT NULL
);

-- Discovered tender announcements. UNIQUE(site_id, url) is the natural key
-- that makes the scan upsert idempotent. date() silently normalizes day
-- overflow ('2025-02-31' becomes '2025-03-03'), so the date CHECKs compare
-- the round-trip against the stored text: noncalendar values that pass the
-- extractor's range validation fail equality and are rejected here. The
-- IS NOT NULL leg keeps unparseable text from sliding through as a NULL
-- comparison (a NULL CHECK result counts as passing in SQLite).
CREATE TABLE IF NOT EXISTS tenders (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id      INTEGER NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
    title        TEXT NOT NULL,
    type         TEXT NOT NULL,
    deadline     TEXT,
    publish_date TEXT,
    url          TEXT NOT NULL,
    summary      TEXT NOT NULL,
    last_checked TEXT NOT NULL,
    UNIQUE(site_id, url),
    CONSTRAINT tenders_title_len CHECK (length(title) <= 499),
    CONSTRAINT tenders_url_len CHECK (length(url) <= 2048),
    CONSTRAINT tenders_summary_len CHECK (length(summary) <= 253),
    CONSTRAINT tenders_deadline_date
        CHECK (deadline IS NULL
               OR (date(deadline) IS NOT NULL AND date(deadline) = deadline)),
    CONSTRAINT tenders_publish_date_date
        CHECK (publish_date IS NULL
               OR (date(publish_date) IS NOT NULL AND date(publish_date) = publish_date))
);

CREATE INDEX IF NOT EXISTS idx_tenders_site_id ON tenders(site_id);
CREATE INDEX IF NOT EXISTS idx_tenders_deadline ON tenders(deadline);

-- Batch scan history
CREATE TABLE IF NOT EXISTS scan_jobs (
    id          TEXT PRIMARY KEY,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
