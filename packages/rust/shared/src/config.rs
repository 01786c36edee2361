//! Application configuration for SiteScout.
//!
//! User config lives at `~/.sitescout/sitescout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteScoutError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sitescout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sitescout";

// ---------------------------------------------------------------------------
// Config structs (matching sitescout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Crawl defaults.
    #[serde(default)]
    pub crawl: CrawlSection,

    /// Stream aggregation settings.
    #[serde(default)]
    pub stream: StreamSection,
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSection {
    /// Maximum simultaneous in-flight page extractions.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Per-page extraction timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum links retained per page.
    #[serde(default = "default_max_links")]
    pub max_links_per_page: usize,

    /// Probe each site root for an `llms.txt` manifest.
    #[serde(default = "default_true")]
    pub discover_manifests: bool,

    /// Override for the HTTP User-Agent header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for CrawlSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            max_links_per_page: default_max_links(),
            discover_manifests: true,
            user_agent: None,
        }
    }
}

fn default_concurrency() -> u32 {
    4
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_links() -> usize {
    50
}
fn default_true() -> bool {
    true
}

/// `[stream]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSection {
    /// Capacity of the bounded channel feeding the client transport.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    32
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum concurrent extractions.
    pub concurrency: u32,
    /// Per-page timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum links retained per page.
    pub max_links_per_page: usize,
    /// Whether to probe site roots for manifests.
    pub discover_manifests: bool,
    /// User-Agent override.
    pub user_agent: Option<String>,
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.crawl.concurrency,
            timeout_secs: config.crawl.timeout_secs,
            max_links_per_page: config.crawl.max_links_per_page,
            discover_manifests: config.crawl.discover_manifests,
            user_agent: config.crawl.user_agent.clone(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl CrawlConfig {
    /// Reject settings the orchestrator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(SiteScoutError::config("crawl.concurrency must be at least 1"));
        }
        if self.timeout_secs == 0 {
            return Err(SiteScoutError::config("crawl.timeout_secs must be at least 1"));
        }
        if self.max_links_per_page == 0 {
            return Err(SiteScoutError::config(
                "crawl.max_links_per_page must be at least 1",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sitescout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SiteScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sitescout/sitescout.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| SiteScoutError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SiteScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SiteScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SiteScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SiteScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
