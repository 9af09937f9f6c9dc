//! Candidate page fetching with per-URL failure isolation.
//!
//! A scan probes many candidate URLs and most of them are dead: wrong
//! scheme, missing section, school site down. A failed fetch is therefore an
//! ordinary [`FetchOutcome::Unavailable`] value, classified for logging,
//! never an error returned to the caller. Only building the shared HTTP
//! client can fail.

use std::time::Duration;

use reqwest::Client;
use tenderscan_shared::{Result, TenderScanError};
use tracing::{debug, warn};
use url::Url;

/// User-Agent sent with every scan request unless config overrides it.
const USER_AGENT: &str = concat!("tenderscan/", env!("CARGO_PKG_VERSION"));

/// Redirect chains on school sites are short; anything longer is a loop.
const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Result of probing one candidate URL.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The page body, ready for extraction.
    Content(String),
    /// No content; the failure class is only used for logging.
    Unavailable(FetchFailure),
}

/// Why a candidate URL yielded no content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// The request exceeded the configured timeout.
    Timeout,
    /// The server answered with a non-2xx status.
    Status(u16),
    /// Connection, DNS, or TLS failure.
    Connection,
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Status(code) => write!(f, "HTTP {code}"),
            Self::Connection => write!(f, "connection failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Client construction
// ---------------------------------------------------------------------------

/// Build the HTTP client shared by all fetches of a scanner.
pub fn build_client(timeout_secs: u64, user_agent: Option<&str>) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent.unwrap_or(USER_AGENT))
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| TenderScanError::Network(format!("failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Fetch one candidate URL.
///
/// Every failure mode folds into [`FetchOutcome::Unavailable`] so that one
/// dead candidate never stops evaluation of the remaining ones.
pub async fn fetch_listing(client: &Client, url: &Url) -> FetchOutcome {
    debug!(%url, "fetching candidate page");

    let response = match client.get(url.as_str()).send().await {
        Ok(response) => response,
        Err(e) => {
            let failure = if e.is_timeout() {
                FetchFailure::Timeout
            } else {
                FetchFailure::Connection
            };
            warn!(%url, %failure, error = %e, "candidate fetch failed");
            return FetchOutcome::Unavailable(failure);
        }
    };

    let status = response.status();
    if !status.is_success() {
        warn!(%url, status = status.as_u16(), "candidate returned non-success status");
        return FetchOutcome::Unavailable(FetchFailure::Status(status.as_u16()));
    }

    match response.text().await {
        Ok(body) => FetchOutcome::Content(body),
        Err(e) => {
            let failure = if e.is_timeout() {
                FetchFailure::Timeout
            } else {
                FetchFailure::Connection
            };
            warn!(%url, %failure, error = %e, "candidate body read failed");
            FetchOutcome::Unavailable(failure)
        }
    }
}
