//! Fetching and heuristic extraction of tender announcements.
//!
//! Three pure-ish pieces, wired together by the orchestrator:
//! - [`fetch`]: retrieve one candidate URL, folding every failure into an
//!   "unavailable" outcome
//! - [`extract`]: turn uncontrolled listing HTML into [`TenderRecord`]s
//! - [`dates`]: recognize Italian date phrases and canonicalize them
//!
//! [`TenderRecord`]: tenderscan_shared::TenderRecord

pub mod dates;
pub mod extract;
pub mod fetch;

pub use extract::extract_tenders;
pub use fetch::{FetchFailure, FetchOutcome, build_client, fetch_listing};
