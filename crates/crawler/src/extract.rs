//! Heuristic tender extraction from uncontrolled school-site HTML.
//!
//! School sites run a zoo of CMSes, so extraction works on loose structural
//! conventions rather than a fixed template: anchors and common "news item"
//! containers are walked in DOM order, gated on Italian procurement keywords,
//! and turned into [`TenderRecord`]s. Elements that fail the gates are
//! silently dropped; that is a filtering decision, not an error.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, trace};
use url::Url;

use tenderscan_shared::{TenderRecord, TenderType};

use crate::dates::{DEADLINE_PATTERNS, PUBLISH_PATTERNS, first_date};

/// Stored title cap, matching the schema constraint.
const MAX_TITLE_CHARS: usize = 499;

/// Stored summary cap before the ellipsis marker.
const MAX_SUMMARY_CHARS: usize = 250;

// ---------------------------------------------------------------------------
// Static selectors and patterns (compiled once)
// ---------------------------------------------------------------------------

/// Elements worth inspecting: plain links plus the container class names
/// most school CMSes use for announcement listings.
static CANDIDATE_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a, article, .item, .post, .entry, .news-item, .avviso, .bando")
        .expect("candidate selector")
});

/// Nested elements that carry a container's title.
static HEADING_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, .title, .entry-title").expect("heading selector"));

/// First nested link of a container.
static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("link selector"));

/// An element qualifies when its title or text matches any of these.
static KEYWORD_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        "bando",
        "gara",
        "avviso",
        "concorso",
        r"determina\s+a\s+contrarre",
        "selezione",
        "affidamento",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).expect("keyword regex"))
    .collect()
});

/// Title keywords deciding the announcement category, highest priority
/// first. No match defaults to [`TenderType::Bando`].
static TYPE_RULES: LazyLock<Vec<(Regex, TenderType)>> = LazyLock::new(|| {
    [
        ("avviso", TenderType::Avviso),
        ("concorso", TenderType::Concorso),
        ("determina", TenderType::Determina),
        ("gara", TenderType::Gara),
    ]
    .iter()
    .map(|(p, t)| (Regex::new(&format!("(?i){p}")).expect("type regex"), *t))
    .collect()
});

/// Document extensions stripped when deriving a title from a filename.
static DOC_EXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(pdf|docx?|zip|p7m)$").expect("extension regex"));

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Extract tender candidates from a fetched page.
///
/// Pure: reads `html`, resolves links against `base_url`, touches nothing
/// else. Returns records in DOM order; an empty result is a normal outcome
/// for pages that simply hold no announcements.
pub fn extract_tenders(html: &str, base_url: &Url, site_id: i64) -> Vec<TenderRecord> {
    let doc = Html::parse_document(html);

    let mut records = Vec::new();
    for element in doc.select(&CANDIDATE_SEL) {
        if let Some(record) = extract_one(&element, base_url, site_id) {
            records.push(record);
        }
    }

    debug!(site_id, url = %base_url, count = records.len(), "extracted tender candidates");
    records
}

/// Apply the per-element heuristics; `None` means the element was filtered.
fn extract_one(element: &ElementRef, base_url: &Url, site_id: i64) -> Option<TenderRecord> {
    let is_anchor = element.value().name() == "a";

    // Title and link resolution. An anchor is its own link and carries no
    // surrounding text; a container prefers a nested heading, then falls
    // back to its first link's text.
    let (mut title, href, element_text) = if is_anchor {
        (
            collapse_ws(&element.text().collect::<String>()),
            element.value().attr("href").map(str::to_string),
            String::new(),
        )
    } else {
        let title = element
            .select(&HEADING_SEL)
            .next()
            .map(|h| collapse_ws(&h.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .or_else(|| {
                element
                    .select(&LINK_SEL)
                    .next()
                    .map(|a| collapse_ws(&a.text().collect::<String>()))
            })
            .unwrap_or_default();
        let href = element
            .select(&LINK_SEL)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string);
        (
            title,
            href,
            collapse_ws(&element.text().collect::<String>()),
        )
    };

    let href = href?;
    if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
        return None;
    }
    let url = base_url.join(&href).ok()?;

    // Last resort for bare document links: title from the filename.
    if title.is_empty() {
        title = title_from_url(&url)?;
    }

    if !matches_keyword(&title) && !matches_keyword(&element_text) {
        trace!(%title, "no tender keyword, dropping element");
        return None;
    }

    let tender_type = classify(&title);

    // Dates may sit in the visible text or in attribute markup (title=,
    // data-*), so the raw inner HTML joins the haystack.
    let haystack = format!("{title} {element_text} {}", element.inner_html());
    let deadline = first_date(&haystack, &DEADLINE_PATTERNS);
    let publish_date = first_date(&haystack, &PUBLISH_PATTERNS);

    let (title, _) = truncate_chars(&title, MAX_TITLE_CHARS);
    let (summary, truncated) = truncate_chars(&element_text, MAX_SUMMARY_CHARS);
    let summary = if truncated {
        format!("{summary}...")
    } else {
        summary
    };

    Some(TenderRecord {
        site_id,
        title,
        tender_type,
        deadline,
        publish_date,
        url: url.to_string(),
        summary,
        last_checked: Utc::now(),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn matches_keyword(text: &str) -> bool {
    !text.is_empty() && KEYWORD_RES.iter().any(|re| re.is_match(text))
}

/// First matching title keyword wins; default is `Bando`.
fn classify(title: &str) -> TenderType {
    TYPE_RULES
        .iter()
        .find(|(re, _)| re.is_match(title))
        .map(|(_, t)| *t)
        .unwrap_or(TenderType::Bando)
}

/// Derive a title from the last path segment of a document link:
/// percent-decoded, extension stripped, underscores to spaces.
fn title_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).next_back()?;
    let decoded = urlencoding::decode(segment).ok()?;
    let stem = DOC_EXT_RE.replace(&decoded, "");
    let title = collapse_ws(&stem.replace('_', " "));
    (!title.is_empty()).then_some(title)
}

/// Collapse runs of whitespace; CMS markup is full of stray newlines.
fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Character-based truncation; the flag reports whether anything was cut.
fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    if text.chars().count() <= max {
        (text.to_string(), false)
    } else {
        (text.chars().take(max).collect(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.edu.it/albo").expect("base url")
    }

    #[test]
    fn anchor_with_deadline_scenario() {
        let html = r#"<html><body>
            <a href="bando1.pdf">Avviso pubblico scadenza 15/06/2025</a>
        </body></html>"#;

        let records = extract_tenders(html, &base(), 7);
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.site_id, 7);
        assert_eq!(record.title, "Avviso pubblico scadenza 15/06/2025");
        assert_eq!(record.tender_type, TenderType::Avviso);
        assert_eq!(record.deadline.as_deref(), Some("2025-06-15"));
        assert_eq!(record.publish_date, None);
        assert_eq!(record.url, "https://example.edu.it/bando1.pdf");
        assert_eq!(record.summary, "");
    }

    #[test]
    fn container_prefers_nested_heading() {
        let html = r#"<article>
            <h2>Bando di gara per il servizio mensa</h2>
            <p>Pubblicato il 10/01/2025. Dettagli in allegato.</p>
            <a href="/documenti/mensa.pdf">scarica</a>
        </article>"#;

        let records = extract_tenders(html, &base(), 1);
        // The article itself; the nested anchor alone has no keyword.
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.title, "Bando di gara per il servizio mensa");
        assert_eq!(record.url, "https://example.edu.it/documenti/mensa.pdf");
        assert_eq!(record.publish_date.as_deref(), Some("2025-01-10"));
        assert!(record.summary.contains("Dettagli in allegato"));
    }

    #[test]
    fn container_falls_back_to_link_text() {
        let html = r#"<div class="news-item">
            <a href="avviso42.html">Avviso di selezione esperto madrelingua</a>
        </div>"#;

        let records = extract_tenders(html, &base(), 1);
        // Container plus the nested anchor, both pointing at the same URL.
        assert!(!records.is_empty());
        assert_eq!(records[0].title, "Avviso di selezione esperto madrelingua");
        assert_eq!(records[0].url, "https://example.edu.it/avviso42.html");
    }

    #[test]
    fn title_derived_from_filename() {
        let html = r#"<a href="docs/Bando_selezione%20esperti.pdf"></a>"#;

        let records = extract_tenders(html, &base(), 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Bando selezione esperti");
    }

    #[test]
    fn keyword_gate_drops_unrelated_links() {
        let html = r#"<body>
            <a href="/orario.html">Orario delle lezioni</a>
            <a href="/mensa.html">Menu della settimana</a>
        </body>"#;

        assert!(extract_tenders(html, &base(), 1).is_empty());
    }

    #[test]
    fn anchors_without_usable_href_are_dropped() {
        let html = r##"<body>
            <a href="#top">Bando in evidenza</a>
            <a href="mailto:segreteria@example.edu.it">Avviso contatti</a>
            <a href="javascript:void(0)">Gara interna</a>
        </body>"##;

        assert!(extract_tenders(html, &base(), 1).is_empty());
    }

    #[test]
    fn type_priority_order() {
        let cases = [
            ("Avviso di gara europea", TenderType::Avviso),
            ("Concorso per collaboratore", TenderType::Concorso),
            ("Determina a contrarre n. 5", TenderType::Determina),
            ("Gara d'appalto pulizie", TenderType::Gara),
            ("Selezione di personale ATA", TenderType::Bando),
        ];

        for (title, expected) in cases {
            let html = format!(r#"<a href="x.html">{title}</a>"#);
            let records = extract_tenders(&html, &base(), 1);
            assert_eq!(records.len(), 1, "missing record for {title:?}");
            assert_eq!(records[0].tender_type, expected, "wrong type for {title:?}");
        }
    }

    #[test]
    fn long_title_truncates_to_limit() {
        let title = format!("Bando {}", "a".repeat(594));
        assert_eq!(title.chars().count(), 600);

        let html = format!(r#"<a href="b.html">{title}</a>"#);
        let records = extract_tenders(&html, &base(), 1);
        assert_eq!(records[0].title.chars().count(), 499);
    }

    #[test]
    fn long_summary_truncates_with_ellipsis() {
        let filler = "parola ".repeat(50);
        let html = format!(
            r#"<div class="item"><h3>Bando lavori palestra</h3><p>{filler}</p><a href="b.pdf">dettagli</a></div>"#
        );

        let records = extract_tenders(&html, &base(), 1);
        let summary = &records[0].summary;
        assert_eq!(summary.chars().count(), 253);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn date_in_attribute_markup_is_found() {
        let html = r#"<div class="item">
            <a href="b.pdf" title="scadenza: 01/09/2025">Bando mensa scolastica</a>
        </div>"#;

        let records = extract_tenders(html, &base(), 1);
        assert!(!records.is_empty());
        assert_eq!(records[0].deadline.as_deref(), Some("2025-09-01"));
    }

    #[test]
    fn records_come_out_in_dom_order() {
        let html = r#"<body>
            <a href="/uno.html">Bando numero uno</a>
            <a href="/due.html">Bando numero due</a>
            <a href="/tre.html">Bando numero tre</a>
        </body>"#;

        let records = extract_tenders(html, &base(), 1);
        let urls: Vec<_> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            [
                "https://example.edu.it/uno.html",
                "https://example.edu.it/due.html",
                "https://example.edu.it/tre.html",
            ]
        );
    }

    #[test]
    fn empty_page_yields_no_records() {
        assert!(extract_tenders("", &base(), 1).is_empty());
        assert!(extract_tenders("<html><body></body></html>", &base(), 1).is_empty());
    }
}
