//! Scan orchestration: candidate generation → fetch → extract → upsert,
//! with per-site and per-URL failure isolation.

pub mod scanner;

pub use scanner::Scanner;
