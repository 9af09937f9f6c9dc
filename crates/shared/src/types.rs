//! Core domain types for the tender scanning pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TenderScanError;

// ---------------------------------------------------------------------------
// Site
// ---------------------------------------------------------------------------

/// An organization whose website is scanned for tender announcements.
///
/// Rows come from the external school registry; this pipeline only reads
/// them. `declared_url` is whatever the registry holds and may lack a scheme
/// or be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    /// Registry identifier.
    pub id: i64,
    /// Human-readable name (school denomination).
    pub display_name: String,
    /// Website URL as declared in the registry, possibly scheme-less.
    pub declared_url: String,
}

// ---------------------------------------------------------------------------
// TenderType
// ---------------------------------------------------------------------------

/// Announcement category, stored under its Italian display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TenderType {
    Bando,
    Avviso,
    Concorso,
    Determina,
    Gara,
}

impl TenderType {
    /// Stable string form used in the database and in JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bando => "Bando",
            Self::Avviso => "Avviso",
            Self::Concorso => "Concorso",
            Self::Determina => "Determina",
            Self::Gara => "Gara",
        }
    }
}

impl std::fmt::Display for TenderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TenderType {
    type Err = TenderScanError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Bando" => Ok(Self::Bando),
            "Avviso" => Ok(Self::Avviso),
            "Concorso" => Ok(Self::Concorso),
            "Determina" => Ok(Self::Determina),
            "Gara" => Ok(Self::Gara),
            other => Err(TenderScanError::validation(format!(
                "unknown tender type: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// TenderRecord
// ---------------------------------------------------------------------------

/// One extracted announcement, as upserted into and read back from storage.
///
/// The extractor guarantees a non-empty title and an absolute `url` before a
/// record is created. `deadline` and `publish_date` hold canonical
/// `YYYY-MM-DD` text rather than a calendar type: the date normalizer does
/// not check days-per-month, so values like `2025-02-31` must survive until
/// the store rejects them (see the upsert recovery policy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderRecord {
    /// Owning site.
    pub site_id: i64,
    /// Announcement title, at most 499 characters.
    pub title: String,
    /// Classified category.
    #[serde(rename = "type")]
    pub tender_type: TenderType,
    /// Submission deadline in `YYYY-MM-DD`, when one was recognized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    /// Publication date in `YYYY-MM-DD`, when one was recognized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<String>,
    /// Absolute URL of the announcement (or its listing entry).
    pub url: String,
    /// Surrounding text, at most 250 characters plus an ellipsis marker.
    pub summary: String,
    /// When the scanner last saw this announcement.
    pub last_checked: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ScanResult
// ---------------------------------------------------------------------------

/// Terminal status of one site's scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Success,
    Error,
    Skipped,
}

/// Per-site outcome returned by the orchestrator. Returned to the caller,
/// never persisted. Zero tenders found is still `Success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Site the result belongs to.
    pub site_id: i64,
    /// Site display name, echoed for report readability.
    pub name: String,
    /// Terminal status.
    pub status: ScanStatus,
    /// Human-readable detail, set for `error` and `skipped`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Number of tender records inserted or refreshed during this scan.
    pub found_tenders: usize,
}

impl ScanResult {
    /// Successful scan, including the zero-findings case.
    pub fn success(site: &Site, found_tenders: usize) -> Self {
        Self {
            site_id: site.id,
            name: site.display_name.clone(),
            status: ScanStatus::Success,
            message: None,
            found_tenders,
        }
    }

    /// Failed scan; `message` explains what went wrong.
    pub fn error(site: &Site, message: impl Into<String>) -> Self {
        Self {
            site_id: site.id,
            name: site.display_name.clone(),
            status: ScanStatus::Error,
            message: Some(message.into()),
            found_tenders: 0,
        }
    }

    /// Site was not scanned at all (e.g. no declared URL in the registry).
    pub fn skipped(site: &Site, message: impl Into<String>) -> Self {
        Self {
            site_id: site.id,
            name: site.display_name.clone(),
            status: ScanStatus::Skipped,
            message: Some(message.into()),
            found_tenders: 0,
        }
    }
}
