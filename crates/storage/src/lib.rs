//! libSQL storage layer for the tender catalog.
//!
//! The [`Storage`] struct wraps a libSQL database holding the school
//! registry, the discovered tenders, and scan-job history. The scanner is
//! the sole writer and opens via [`Storage::open`]; reader collaborators
//! (listing API, frontend backend) use [`Storage::open_readonly`].
//!
//! The tender upsert is keyed by `UNIQUE(site_id, url)`, which makes scans
//! idempotent and arrival order irrelevant under concurrent writers.

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use tracing::warn;
use uuid::Uuid;

use tenderscan_shared::{Result, Site, TenderRecord, TenderScanError};

/// Primary storage handle wrapping a libSQL database.
///
/// Opened once and shared (typically as `Arc<Storage>`); no per-operation
/// connection churn.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

// ---------------------------------------------------------------------------
// Recoverable violations
// ---------------------------------------------------------------------------

/// Recovery policy for a named CHECK constraint violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    /// The record cannot be sanitized; drop it and move on.
    Skip,
    /// Retry once with `deadline` forced to NULL.
    NullDeadline,
    /// Retry once with `publish_date` forced to NULL.
    NullPublishDate,
}

/// The declared table of recoverable upsert violations: schema constraint
/// name → recovery policy. Anything not listed here is an ordinary storage
/// error (still skipped per record, but never retried).
const RECOVERABLE_CONSTRAINTS: &[(&str, Recovery)] = &[
    ("tenders_title_len", Recovery::Skip),
    ("tenders_url_len", Recovery::Skip),
    ("tenders_summary_len", Recovery::Skip),
    ("tenders_deadline_date", Recovery::NullDeadline),
    ("tenders_publish_date_date", Recovery::NullPublishDate),
];

/// Match a storage error message against the declared constraint table.
fn classify_violation(message: &str) -> Option<Recovery> {
    RECOVERABLE_CONSTRAINTS
        .iter()
        .find(|(name, _)| message.contains(name))
        .map(|(_, recovery)| *recovery)
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TenderScanError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| TenderScanError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| TenderScanError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode (for reader collaborators).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| TenderScanError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| TenderScanError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    TenderScanError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(TenderScanError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Site operations
    // -----------------------------------------------------------------------

    /// Insert a site from the registry.
    pub async fn insert_site(&self, site: &Site) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO sites (id, display_name, declared_url) VALUES (?1, ?2, ?3)",
                params![
                    site.id,
                    site.display_name.as_str(),
                    site.declared_url.as_str()
                ],
            )
            .await
            .map_err(|e| TenderScanError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a site by id.
    pub async fn get_site(&self, id: i64) -> Result<Option<Site>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, display_name, declared_url FROM sites WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| TenderScanError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_site(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(TenderScanError::Storage(e.to_string())),
        }
    }

    /// List all sites, ordered by display name.
    pub async fn list_sites(&self) -> Result<Vec<Site>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, display_name, declared_url FROM sites ORDER BY display_name",
                params![],
            )
            .await
            .map_err(|e| TenderScanError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_site(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Tender operations
    // -----------------------------------------------------------------------

    /// Upsert a single tender (insert or update on conflict by `site_id + url`).
    ///
    /// Only the mutable fields are overwritten on conflict; the row itself
    /// is never deleted by the scanner.
    pub async fn upsert_tender(&self, record: &TenderRecord) -> Result<()> {
        self.check_writable()?;
        let last_checked = record.last_checked.to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO tenders (site_id, title, type, deadline, publish_date, url, summary, last_checked)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(site_id, url) DO UPDATE SET
                   title = excluded.title,
                   type = excluded.type,
                   deadline = excluded.deadline,
                   publish_date = excluded.publish_date,
                   summary = excluded.summary,
                   last_checked = excluded.last_checked",
                params![
                    record.site_id,
                    record.title.as_str(),
                    record.tender_type.as_str(),
                    record.deadline.as_deref(),
                    record.publish_date.as_deref(),
                    record.url.as_str(),
                    record.summary.as_str(),
                    last_checked.as_str(),
                ],
            )
            .await
            .map_err(|e| TenderScanError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Upsert a batch of extracted records for one site.
    ///
    /// Per-record failures never abort the remaining sequence: a violation
    /// listed in the recoverable-constraint table is skipped or sanitized
    /// and retried once, anything else is skipped and logged. Returns the
    /// count of records that landed (inserted or updated).
    pub async fn store_tenders(&self, records: &[TenderRecord]) -> Result<usize> {
        self.check_writable()?;

        let mut stored = 0;
        for record in records {
            match self.upsert_tender(record).await {
                Ok(()) => stored += 1,
                Err(e) => match classify_violation(&e.to_string()) {
                    Some(Recovery::Skip) => {
                        warn!(url = %record.url, error = %e, "oversized field, skipping tender");
                    }
                    Some(recovery) => {
                        let mut sanitized = record.clone();
                        match recovery {
                            Recovery::NullDeadline => sanitized.deadline = None,
                            Recovery::NullPublishDate => sanitized.publish_date = None,
                            Recovery::Skip => unreachable!(),
                        }
                        match self.upsert_tender(&sanitized).await {
                            Ok(()) => {
                                warn!(url = %record.url, error = %e, "stored after nulling invalid date");
                                stored += 1;
                            }
                            Err(retry_err) => {
                                warn!(url = %record.url, error = %retry_err, "retry failed, skipping tender");
                            }
                        }
                    }
                    None => {
                        warn!(url = %record.url, error = %e, "storage error, skipping tender");
                    }
                },
            }
        }
        Ok(stored)
    }

    /// List the tenders recorded for a site, soonest deadline first.
    pub async fn tenders_for_site(&self, site_id: i64) -> Result<Vec<TenderRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT site_id, title, type, deadline, publish_date, url, summary, last_checked
                 FROM tenders WHERE site_id = ?1 ORDER BY deadline",
                params![site_id],
            )
            .await
            .map_err(|e| TenderScanError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_tender(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Scan job operations
    // -----------------------------------------------------------------------

    /// Insert a new scan job. Returns the generated job id.
    pub async fn insert_scan_job(&self) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO scan_jobs (id, started_at) VALUES (?1, ?2)",
                params![id.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| TenderScanError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Mark a scan job finished, attaching aggregate stats.
    pub async fn finish_scan_job(&self, job_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE scan_jobs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, job_id],
            )
            .await
            .map_err(|e| TenderScanError::Storage(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

/// Convert a database row to a [`Site`].
fn row_to_site(row: &libsql::Row) -> Result<Site> {
    Ok(Site {
        id: row
            .get::<i64>(0)
            .map_err(|e| TenderScanError::Storage(e.to_string()))?,
        display_name: row
            .get::<String>(1)
            .map_err(|e| TenderScanError::Storage(e.to_string()))?,
        declared_url: row
            .get::<String>(2)
            .map_err(|e| TenderScanError::Storage(e.to_string()))?,
    })
}

/// Convert a database row to a [`TenderRecord`].
fn row_to_tender(row: &libsql::Row) -> Result<TenderRecord> {
    Ok(TenderRecord {
        site_id: row
            .get::<i64>(0)
            .map_err(|e| TenderScanError::Storage(e.to_string()))?,
        title: row
            .get::<String>(1)
            .map_err(|e| TenderScanError::Storage(e.to_string()))?,
        tender_type: row
            .get::<String>(2)
            .map_err(|e| TenderScanError::Storage(e.to_string()))?
            .parse()?,
        deadline: row.get::<String>(3).ok(),
        publish_date: row.get::<String>(4).ok(),
        url: row
            .get::<String>(5)
            .map_err(|e| TenderScanError::Storage(e.to_string()))?,
        summary: row
            .get::<String>(6)
            .map_err(|e| TenderScanError::Storage(e.to_string()))?,
        last_checked: {
            let s: String = row
                .get(7)
                .map_err(|e| TenderScanError::Storage(e.to_string()))?;
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .map_err(|e| TenderScanError::Storage(format!("invalid timestamp: {e}")))?
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tenderscan_shared::TenderType;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("tenderscan_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn sample_site(id: i64) -> Site {
        Site {
            id,
            display_name: format!("IC Test {id}"),
            declared_url: "https://www.ictest.edu.it".into(),
        }
    }

    fn sample_tender(site_id: i64, url: &str) -> TenderRecord {
        TenderRecord {
            site_id,
            title: "Bando di gara per il servizio mensa".into(),
            tender_type: TenderType::Bando,
            deadline: Some("2025-06-15".into()),
            publish_date: Some("2025-01-10".into()),
            url: url.into(),
            summary: "Dettagli in allegato".into(),
            last_checked: Utc::now(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("tenderscan_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn site_crud() {
        let storage = test_storage().await;
        storage.insert_site(&sample_site(1)).await.expect("insert");

        let site = storage.get_site(1).await.expect("get").expect("exists");
        assert_eq!(site.display_name, "IC Test 1");
        assert_eq!(site.declared_url, "https://www.ictest.edu.it");

        assert!(storage.get_site(99).await.expect("get missing").is_none());

        storage.insert_site(&sample_site(2)).await.expect("insert");
        let sites = storage.list_sites().await.expect("list");
        assert_eq!(sites.len(), 2);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_keeps_latest_values() {
        let storage = test_storage().await;
        storage.insert_site(&sample_site(1)).await.unwrap();

        let url = "https://www.ictest.edu.it/bando1.pdf";
        for n in 0..3 {
            let mut record = sample_tender(1, url);
            record.title = format!("Bando mensa rev {n}");
            record.tender_type = TenderType::Gara;
            storage.upsert_tender(&record).await.expect("upsert");
        }

        let tenders = storage.tenders_for_site(1).await.expect("list");
        assert_eq!(tenders.len(), 1);
        assert_eq!(tenders[0].title, "Bando mensa rev 2");
        assert_eq!(tenders[0].tender_type, TenderType::Gara);
    }

    #[tokio::test]
    async fn store_tenders_counts_every_landed_record() {
        let storage = test_storage().await;
        storage.insert_site(&sample_site(1)).await.unwrap();

        let records = vec![
            sample_tender(1, "https://www.ictest.edu.it/a.pdf"),
            sample_tender(1, "https://www.ictest.edu.it/b.pdf"),
        ];
        let stored = storage.store_tenders(&records).await.expect("store");
        assert_eq!(stored, 2);

        // A second pass updates in place: still counted, still one row each.
        let stored = storage.store_tenders(&records).await.expect("store again");
        assert_eq!(stored, 2);
        assert_eq!(storage.tenders_for_site(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn oversized_title_is_skipped() {
        let storage = test_storage().await;
        storage.insert_site(&sample_site(1)).await.unwrap();

        let mut bad = sample_tender(1, "https://www.ictest.edu.it/a.pdf");
        bad.title = "x".repeat(600);
        let good = sample_tender(1, "https://www.ictest.edu.it/b.pdf");

        let stored = storage.store_tenders(&[bad, good]).await.expect("store");
        assert_eq!(stored, 1);

        let tenders = storage.tenders_for_site(1).await.unwrap();
        assert_eq!(tenders.len(), 1);
        assert_eq!(tenders[0].url, "https://www.ictest.edu.it/b.pdf");
    }

    #[tokio::test]
    async fn noncalendar_deadline_is_nulled_on_retry() {
        let storage = test_storage().await;
        storage.insert_site(&sample_site(1)).await.unwrap();

        // Passes the normalizer's range check but is not a real date.
        let mut record = sample_tender(1, "https://www.ictest.edu.it/a.pdf");
        record.deadline = Some("2025-02-31".into());

        let stored = storage.store_tenders(&[record]).await.expect("store");
        assert_eq!(stored, 1);

        let tenders = storage.tenders_for_site(1).await.unwrap();
        assert_eq!(tenders.len(), 1);
        assert_eq!(tenders[0].deadline, None);
        assert_eq!(tenders[0].publish_date.as_deref(), Some("2025-01-10"));
    }

    #[tokio::test]
    async fn noncalendar_publish_date_is_nulled_on_retry() {
        let storage = test_storage().await;
        storage.insert_site(&sample_site(1)).await.unwrap();

        let mut record = sample_tender(1, "https://www.ictest.edu.it/a.pdf");
        record.publish_date = Some("2025-04-31".into());

        let stored = storage.store_tenders(&[record]).await.expect("store");
        assert_eq!(stored, 1);

        let tenders = storage.tenders_for_site(1).await.unwrap();
        assert_eq!(tenders[0].publish_date, None);
        assert_eq!(tenders[0].deadline.as_deref(), Some("2025-06-15"));
    }

    #[tokio::test]
    async fn unparseable_deadline_is_nulled_on_retry() {
        let storage = test_storage().await;
        storage.insert_site(&sample_site(1)).await.unwrap();

        // date() yields NULL here rather than a normalized date; the CHECK
        // must still reject it instead of passing on the NULL comparison.
        let mut record = sample_tender(1, "https://www.ictest.edu.it/a.pdf");
        record.deadline = Some("entro domani".into());

        let stored = storage.store_tenders(&[record]).await.expect("store");
        assert_eq!(stored, 1);

        let tenders = storage.tenders_for_site(1).await.unwrap();
        assert_eq!(tenders[0].deadline, None);
    }

    #[tokio::test]
    async fn both_dates_invalid_exhausts_the_single_retry() {
        let storage = test_storage().await;
        storage.insert_site(&sample_site(1)).await.unwrap();

        let mut record = sample_tender(1, "https://www.ictest.edu.it/a.pdf");
        record.deadline = Some("2025-02-31".into());
        record.publish_date = Some("2025-04-31".into());

        // One retry only: nulling one field still trips the other CHECK.
        let stored = storage.store_tenders(&[record]).await.expect("store");
        assert_eq!(stored, 0);
        assert!(storage.tenders_for_site(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tenders_ordered_by_deadline() {
        let storage = test_storage().await;
        storage.insert_site(&sample_site(1)).await.unwrap();

        let mut late = sample_tender(1, "https://www.ictest.edu.it/late.pdf");
        late.deadline = Some("2025-12-01".into());
        let mut early = sample_tender(1, "https://www.ictest.edu.it/early.pdf");
        early.deadline = Some("2025-03-01".into());

        storage.store_tenders(&[late, early]).await.unwrap();

        let tenders = storage.tenders_for_site(1).await.unwrap();
        assert_eq!(tenders[0].deadline.as_deref(), Some("2025-03-01"));
        assert_eq!(tenders[1].deadline.as_deref(), Some("2025-12-01"));
    }

    #[tokio::test]
    async fn scan_job_lifecycle() {
        let storage = test_storage().await;

        let job_id = storage.insert_scan_job().await.expect("insert job");
        assert!(!job_id.is_empty());

        storage
            .finish_scan_job(&job_id, r#"{"sites": 3, "tenders_found": 7}"#)
            .await
            .expect("finish job");
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("tenderscan_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_site(&sample_site(1)).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.get_site(1).await.unwrap().unwrap().id, 1);

        let result = ro.insert_site(&sample_site(2)).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));

        let result = ro
            .store_tenders(&[sample_tender(1, "https://www.ictest.edu.it/a.pdf")])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn violation_table_classification() {
        assert_eq!(
            classify_violation("CHECK constraint failed: tenders_title_len"),
            Some(Recovery::Skip)
        );
        assert_eq!(
            classify_violation("CHECK constraint failed: tenders_deadline_date"),
            Some(Recovery::NullDeadline)
        );
        assert_eq!(
            classify_violation("CHECK constraint failed: tenders_publish_date_date"),
            Some(Recovery::NullPublishDate)
        );
        assert_eq!(classify_violation("disk I/O error"), None);
    }
}
