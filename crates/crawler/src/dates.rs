//! Italian date recognition and normalization.
//!
//! Announcement pages write dates as `15/06/2025` or `3-9-24` behind a small
//! set of recurring labels ("scade il", "data pubblicazione", ...). Each
//! label becomes a [`LabeledPattern`]; [`first_date`] walks a pattern list in
//! order and returns the first match that passes numeric validation,
//! canonicalized to `YYYY-MM-DD`.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

/// Day/month/year capture shared by every pattern: 1-2 digit day and month,
/// 2 or 4 digit year, `/` or `-` separators.
const DMY: &str = r"(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})";

// ---------------------------------------------------------------------------
// LabeledPattern
// ---------------------------------------------------------------------------

/// A named date pattern tried against free text.
#[derive(Debug)]
pub struct LabeledPattern {
    /// The Italian phrase anchoring the date, for logging.
    pub label: &'static str,
    /// Compiled pattern with day/month/year capture groups.
    pub pattern: Regex,
}

impl LabeledPattern {
    fn new(label: &'static str, prefix: &str) -> Self {
        let pattern = Regex::new(&format!("(?i){prefix}{DMY}")).expect("date regex");
        Self { label, pattern }
    }
}

/// Deadline phrases, in recognition order. Labels that usually carry a colon
/// also appear without one in the wild, so the colon is optional.
pub static DEADLINE_PATTERNS: LazyLock<Vec<LabeledPattern>> = LazyLock::new(|| {
    vec![
        LabeledPattern::new("scade il", r"scade\s+il\s+"),
        LabeledPattern::new("scadenza", r"scadenza:?\s*"),
        LabeledPattern::new(
            "termine presentazione domande",
            r"termine\s+presentazione\s+domande:?\s*",
        ),
        LabeledPattern::new("data scadenza", r"data\s+scadenza:?\s*"),
    ]
});

/// Publication phrases, in recognition order.
pub static PUBLISH_PATTERNS: LazyLock<Vec<LabeledPattern>> = LazyLock::new(|| {
    vec![
        LabeledPattern::new("pubblicato il", r"pubblicato\s+il\s+"),
        LabeledPattern::new("data pubblicazione", r"data\s+pubblicazione:?\s*"),
    ]
});

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Scan `text` against `patterns` in order; return the first structurally
/// matching date that also passes numeric validation, as `YYYY-MM-DD`.
///
/// A pattern whose match fails validation (day 0, month 14, ...) is treated
/// as non-matching and the next pattern is tried. Exhausting the list yields
/// `None`, which is a valid outcome, not an error.
pub fn first_date(text: &str, patterns: &[LabeledPattern]) -> Option<String> {
    for lp in patterns {
        if let Some(caps) = lp.pattern.captures(text) {
            if let Some(date) = normalize_dmy(&caps[1], &caps[2], &caps[3]) {
                trace!(label = lp.label, %date, "date pattern matched");
                return Some(date);
            }
        }
    }
    None
}

/// Validate and canonicalize captured day/month/year text.
///
/// Two-digit years map into 2000-2099. Day and month are range-checked
/// ([1,31] and [1,12]); days-per-month is deliberately not checked here, the
/// storage layer has the final word on calendar validity.
fn normalize_dmy(day: &str, month: &str, year: &str) -> Option<String> {
    let day: u32 = day.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let mut year: u32 = year.parse().ok()?;

    if year < 100 {
        year += 2000;
    }
    if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
        return None;
    }

    Some(format!("{year:04}-{month:02}-{day:02}"))
}
