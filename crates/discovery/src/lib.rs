//! Candidate URL generation for tender scans.
//!
//! Registries rarely record the exact page where a school publishes its
//! announcements, so a scan probes a whole family of URLs derived from the
//! declared site: both scheme variants of the bare host, every well-known
//! listing path on both variants, and the declared URL itself when it is not
//! already one of those. Generation is pure; nothing here touches the
//! network.

use std::collections::HashSet;

use tenderscan_shared::{Result, TenderScanError};
use tracing::debug;
use url::Url;

/// Scheme prefixed to declared URLs that lack one.
const DEFAULT_SCHEME: &str = "http";

// ---------------------------------------------------------------------------
// Candidate generation
// ---------------------------------------------------------------------------

/// Build the deduplicated list of URLs to probe for one site.
///
/// The result preserves insertion order: scheme variants of the bare host
/// first, then each listing path under both schemes, then the declared URL
/// if it normalizes to something new. Variants are derived from the hostname
/// alone, so a port in the declared URL survives only on the declared URL.
///
/// Fails with a config error when the declared URL cannot be parsed even
/// after prefixing the default scheme, or when it has no host.
pub fn candidate_urls(declared_url: &str, listing_paths: &[String]) -> Result<Vec<Url>> {
    let declared = parse_declared(declared_url)?;
    let host = declared
        .host_str()
        .ok_or_else(|| {
            TenderScanError::config(format!("declared URL has no host: {declared_url:?}"))
        })?
        .to_string();

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for scheme in ["https", "http"] {
        if let Ok(url) = Url::parse(&format!("{scheme}://{host}")) {
            push_unique(&mut candidates, &mut seen, url);
        }
    }

    for path in listing_paths {
        let path = path.trim();
        if path.is_empty() {
            continue;
        }
        let suffix = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        for scheme in ["https", "http"] {
            if let Ok(url) = Url::parse(&format!("{scheme}://{host}{suffix}")) {
                push_unique(&mut candidates, &mut seen, url);
            }
        }
    }

    // The declared URL itself, unless normalization collapsed it into one of
    // the variants above.
    push_unique(&mut candidates, &mut seen, declared);

    debug!(host = %host, total = candidates.len(), "generated candidate URLs");
    Ok(candidates)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a registry-declared URL, prefixing the default scheme when absent.
fn parse_declared(declared_url: &str) -> Result<Url> {
    let trimmed = declared_url.trim();
    if trimmed.is_empty() {
        return Err(TenderScanError::config("declared URL is empty"));
    }

    let with_scheme = if trimmed.starts_with("http") {
        trimmed.to_string()
    } else {
        format!("{DEFAULT_SCHEME}://{trimmed}")
    };

    Url::parse(&with_scheme).map_err(|e| {
        TenderScanError::config(format!("cannot parse declared URL {declared_url:?}: {e}"))
    })
}

fn push_unique(candidates: &mut Vec<Url>, seen: &mut HashSet<String>, url: Url) {
    if seen.insert(url.to_string()) {
        candidates.push(url);
    }
}
