//! Application configuration for tenderscan.
//!
//! User config lives at `~/.tenderscan/tenderscan.toml`.
//! Entry-point flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TenderScanError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tenderscan.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tenderscan";

// ---------------------------------------------------------------------------
// Config structs (matching tenderscan.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Scan policies.
    #[serde(default)]
    pub scan_policies: ScanPoliciesConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default database path.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Sites scanned concurrently within a batch.
    #[serde(default = "default_site_concurrency")]
    pub site_concurrency: usize,

    /// Candidate URLs fetched concurrently per site.
    #[serde(default = "default_url_concurrency")]
    pub url_concurrency: usize,

    /// Per-request fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            site_concurrency: default_site_concurrency(),
            url_concurrency: default_url_concurrency(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_db_path() -> String {
    "~/.tenderscan/tenderscan.db".into()
}
fn default_site_concurrency() -> usize {
    4
}
fn default_url_concurrency() -> usize {
    5
}
fn default_fetch_timeout_secs() -> u64 {
    15
}

/// `[scan_policies]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPoliciesConfig {
    /// Path suffixes probed on every host in addition to the declared URL.
    /// Italian school sites publish tenders under a small set of well-known
    /// sections (albo pretorio, bandi di gara, avvisi, ...).
    #[serde(default = "default_listing_paths")]
    pub listing_paths: Vec<String>,

    /// User-Agent override; when absent the built-in identifier is sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for ScanPoliciesConfig {
    fn default() -> Self {
        Self {
            listing_paths: default_listing_paths(),
            user_agent: None,
        }
    }
}

fn default_listing_paths() -> Vec<String> {
    [
        "/albo-pretorio",
        "/bandi-gara",
        "/gare",
        "/avvisi",
        "/concorsi",
        "/determine-a-contrarre",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// ---------------------------------------------------------------------------
// Scan config (runtime, merged from config + caller overrides)
// ---------------------------------------------------------------------------

/// Runtime scan configuration, merged from the config file and whatever the
/// calling entry point overrides.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Maximum sites scanned concurrently in a batch.
    pub site_concurrency: usize,
    /// Maximum candidate URLs fetched concurrently per site.
    pub url_concurrency: usize,
    /// Per-request fetch timeout in seconds.
    pub fetch_timeout_secs: u64,
    /// Listing path suffixes probed on every host.
    pub listing_paths: Vec<String>,
    /// User-Agent override.
    pub user_agent: Option<String>,
}

impl From<&AppConfig> for ScanConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            site_concurrency: config.defaults.site_concurrency,
            url_concurrency: config.defaults.url_concurrency,
            fetch_timeout_secs: config.defaults.fetch_timeout_secs,
            listing_paths: config.scan_policies.listing_paths.clone(),
            user_agent: config.scan_policies.user_agent.clone(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tenderscan/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TenderScanError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tenderscan/tenderscan.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TenderScanError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| TenderScanError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TenderScanError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TenderScanError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TenderScanError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
