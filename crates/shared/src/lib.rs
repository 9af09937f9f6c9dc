//! Shared types, error model, and configuration for tenderscan.
//!
//! This crate is the foundation depended on by all other tenderscan crates.
//! It provides:
//! - [`TenderScanError`]: the unified error type
//! - Domain types ([`Site`], [`TenderRecord`], [`ScanResult`], [`TenderType`])
//! - Configuration ([`AppConfig`], [`ScanConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, ScanConfig, ScanPoliciesConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{Result, TenderScanError};
pub use types::{ScanResult, ScanStatus, Site, TenderRecord, TenderType};
