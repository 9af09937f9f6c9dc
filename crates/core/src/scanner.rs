//! Per-site scan orchestrator and batch driver.
//!
//! One site runs `Validating → Generating → (Fetching → Extracting →
//! Storing)* → Done`; every failure along the way is converted into the
//! site's [`ScanResult`], never propagated. A batch spawns sites behind a
//! semaphore and returns one result per input site, in input order, so one
//! broken school site can never poison its siblings.

use std::sync::Arc;

use reqwest::Client;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use tenderscan_crawler::{FetchOutcome, build_client, extract_tenders, fetch_listing};
use tenderscan_discovery::candidate_urls;
use tenderscan_shared::{Result, ScanConfig, ScanResult, ScanStatus, Site, TenderScanError};
use tenderscan_storage::Storage;

/// Drives the crawl-extract-persist pipeline over sites from the registry.
///
/// Holds the shared HTTP client and the injected storage handle; cheap to
/// clone, stateless across runs. Re-running a batch reprocesses every site
/// and converges to the same stored state by upsert idempotence.
#[derive(Clone)]
pub struct Scanner {
    config: ScanConfig,
    client: Client,
    storage: Arc<Storage>,
}

impl Scanner {
    /// Create a scanner with the given configuration and storage handle.
    pub fn new(config: ScanConfig, storage: Arc<Storage>) -> Result<Self> {
        let client = build_client(config.fetch_timeout_secs, config.user_agent.as_deref())?;
        Ok(Self {
            config,
            client,
            storage,
        })
    }

    /// Scan one site, returning its terminal [`ScanResult`].
    ///
    /// Never fails: anything the pipeline did not anticipate ends up as
    /// `status: error` with a message. Zero tenders found is `success`.
    #[instrument(skip_all, fields(site_id = site.id, site = %site.display_name))]
    pub async fn scan_one(&self, site: &Site) -> ScanResult {
        match self.scan_site(site).await {
            Ok(found) => {
                info!(found, "scan finished");
                ScanResult::success(site, found)
            }
            Err(e) => {
                warn!(error = %e, "scan failed");
                ScanResult::error(site, e.to_string())
            }
        }
    }

    /// Scan a batch of sites with bounded concurrency.
    ///
    /// Returns exactly one result per input site, in input order. Sites
    /// without a declared URL are skipped before any network work; a panic
    /// inside one site's task becomes that site's error result. The run is
    /// recorded in scan-job history, but a failure to record never fails
    /// the batch.
    #[instrument(skip_all, fields(sites = sites.len()))]
    pub async fn scan_batch(&self, sites: &[Site]) -> Vec<ScanResult> {
        let job_id = match self.storage.insert_scan_job().await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "could not record scan job");
                None
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.config.site_concurrency.max(1)));
        let mut tasks: Vec<SiteTask> = Vec::with_capacity(sites.len());

        for site in sites {
            // Registry holds schools without websites; not worth a task.
            if site.declared_url.trim().is_empty() {
                debug!(site_id = site.id, "no declared URL, skipping site");
                tasks.push(SiteTask::Ready(ScanResult::skipped(
                    site,
                    "declared URL missing",
                )));
                continue;
            }

            let scanner = self.clone();
            let sem = semaphore.clone();
            let site = site.clone();
            tasks.push(SiteTask::Spawned(
                site.clone(),
                tokio::spawn(async move {
                    let _permit = sem.acquire().await.expect("semaphore closed");
                    scanner.scan_one(&site).await
                }),
            ));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task {
                SiteTask::Ready(result) => results.push(result),
                SiteTask::Spawned(site, handle) => {
                    results.push(join_site_task(site, handle).await);
                }
            }
        }

        if let Some(job_id) = job_id {
            let stats = batch_stats(&results);
            if let Err(e) = self.storage.finish_scan_job(&job_id, &stats).await {
                warn!(error = %e, "could not finish scan job record");
            }
        }

        results
    }

    /// The fallible per-site pipeline behind [`Scanner::scan_one`].
    async fn scan_site(&self, site: &Site) -> Result<usize> {
        if site.id <= 0 {
            return Err(TenderScanError::validation("site id must be positive"));
        }
        if site.declared_url.trim().is_empty() {
            return Err(TenderScanError::validation("site has no declared URL"));
        }

        let candidates = candidate_urls(&site.declared_url, &self.config.listing_paths)?;
        debug!(candidates = candidates.len(), "probing candidate URLs");

        let semaphore = Arc::new(Semaphore::new(self.config.url_concurrency.max(1)));
        let mut handles: Vec<JoinHandle<Result<usize>>> = Vec::with_capacity(candidates.len());

        for url in candidates {
            let client = self.client.clone();
            let storage = self.storage.clone();
            let sem = semaphore.clone();
            let site_id = site.id;

            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore closed");

                let body = match fetch_listing(&client, &url).await {
                    FetchOutcome::Content(body) => body,
                    // Classified and logged by the fetcher; just move on.
                    FetchOutcome::Unavailable(_) => return Ok(0),
                };

                // Parsing and extraction stay on this side of the await:
                // the parsed document is not Send.
                let records = extract_tenders(&body, &url, site_id);
                if records.is_empty() {
                    return Ok(0);
                }
                storage.store_tenders(&records).await
            }));
        }

        let mut found = 0;
        let mut first_error: Option<TenderScanError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(stored)) => found += stored,
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(TenderScanError::Unexpected(format!(
                        "candidate task failed: {e}"
                    )));
                }
            }
        }

        // Storage-level failures (not per-record ones, those are absorbed
        // by the store) make the whole site an error.
        match first_error {
            Some(e) => Err(e),
            None => Ok(found),
        }
    }
}

/// Fold a finished site task back into its result. A task that panicked
/// becomes that site's error result instead of poisoning the batch.
async fn join_site_task(site: Site, handle: JoinHandle<ScanResult>) -> ScanResult {
    match handle.await {
        Ok(result) => result,
        Err(e) => ScanResult::error(&site, format!("scan task failed: {e}")),
    }
}

/// Task slot keeping batch output aligned with batch input.
enum SiteTask {
    /// Resolved without spawning (skipped site).
    Ready(ScanResult),
    /// In flight; the site is kept for error reporting on join failure.
    Spawned(Site, JoinHandle<ScanResult>),
}

/// Aggregate stats JSON recorded on the scan job.
fn batch_stats(results: &[ScanResult]) -> String {
    let count = |status: ScanStatus| results.iter().filter(|r| r.status == status).count();
    serde_json::json!({
        "sites": results.len(),
        "success": count(ScanStatus::Success),
        "error": count(ScanStatus::Error),
        "skipped": count(ScanStatus::Skipped),
        "tenders_found": results.iter().map(|r| r.found_tenders).sum::<usize>(),
    })
    .to_string()
}
