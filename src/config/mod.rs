//! Configuration management for dircrawl using the prefer crate.

pub mod browser;
pub mod site;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::QuotaSplit;

pub use browser::BrowserEngineConfig;
pub use site::SiteProfile;

/// Name prefer uses to discover config files (`dircrawl.toml`, `dircrawl.yaml`, ...).
pub const CONFIG_NAME: &str = "dircrawl";

/// Crawl pacing and output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, prefer::FromValue)]
pub struct CrawlSettings {
    /// Bound on every wait-for-element step, in seconds.
    #[serde(default = "default_wait_timeout_secs")]
    #[prefer(default = "10")]
    pub wait_timeout_secs: u64,
    /// Pause after UI-affecting actions so the page can settle, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    #[prefer(default = "1000")]
    pub settle_delay_ms: u64,
    /// Maximum entries processed per list page.
    #[serde(default = "default_page_batch_size")]
    #[prefer(default = "10")]
    pub page_batch_size: usize,
    /// How the total quota is divided between the two directions.
    #[serde(default)]
    #[prefer(default)]
    pub quota_split: QuotaSplit,
    /// Directory for output spreadsheets.
    #[serde(default = "default_output_dir")]
    #[prefer(default = ".")]
    pub output_dir: String,
    /// Output file prefix: `{prefix}_in_{city}_filtered.csv`.
    #[serde(default = "default_output_prefix")]
    #[prefer(default = "dentists")]
    pub output_prefix: String,
}

fn default_wait_timeout_secs() -> u64 {
    10
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_page_batch_size() -> usize {
    10
}

fn default_output_dir() -> String {
    ".".to_string()
}

fn default_output_prefix() -> String {
    "dentists".to_string()
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            wait_timeout_secs: default_wait_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            page_batch_size: default_page_batch_size(),
            quota_split: QuotaSplit::default(),
            output_dir: default_output_dir(),
            output_prefix: default_output_prefix(),
        }
    }
}

impl CrawlSettings {
    /// Apply environment variable overrides.
    ///
    /// - `DIRCRAWL_SETTLE_DELAY_MS` - settle delay in milliseconds
    /// - `DIRCRAWL_WAIT_TIMEOUT_SECS` - element wait timeout in seconds
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ms) = env_u64("DIRCRAWL_SETTLE_DELAY_MS") {
            self.settle_delay_ms = ms;
        }
        if let Some(secs) = env_u64("DIRCRAWL_WAIT_TIMEOUT_SECS") {
            self.wait_timeout_secs = secs;
        }
        self
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Output directory with `~` expanded.
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.output_dir).as_ref())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a non-negative integer", key, raw);
            None
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, prefer::FromValue)]
pub struct Config {
    /// Target directory site.
    #[serde(default)]
    #[prefer(skip)]
    pub site: SiteProfile,
    /// Pacing and output.
    #[serde(default)]
    #[prefer(default)]
    pub crawl: CrawlSettings,
    /// Browser session settings.
    #[serde(default)]
    #[prefer(skip)]
    pub browser: BrowserEngineConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    #[prefer(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to defaults (with env overrides) when no file is found.
    pub async fn load() -> Self {
        match prefer::load(CONFIG_NAME).await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            warn!("Ignoring config {}: {}", path.display(), e);
                            Self::default_with_env()
                        }
                    }
                } else {
                    Self::default_with_env()
                }
            }
            Err(e) => {
                debug!("No config file discovered: {}", e);
                Self::default_with_env()
            }
        }
    }

    /// Defaults with environment variable overrides applied.
    pub fn default_with_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load configuration from a specific file path.
    /// Supports TOML, YAML and JSON based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config.with_env_overrides())
    }

    /// Parse config text in the given format (`toml`, `yaml`/`yml`, otherwise JSON).
    pub fn parse(contents: &str, ext: &str) -> Result<Self, String> {
        let config: Config = match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };
        config.site.validate()?;
        Ok(config)
    }

    fn with_env_overrides(mut self) -> Self {
        self.crawl = self.crawl.with_env_overrides();
        self.browser = self.browser.with_env_overrides();
        self
    }

    /// Directory that relative output paths are resolved against:
    /// the config file's directory, or the working directory.
    pub fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolved output directory.
    pub fn output_dir(&self) -> PathBuf {
        let path = self.crawl.output_path();
        if path.is_absolute() {
            path
        } else {
            self.base_dir().join(path)
        }
    }

    /// Effective config rendered as TOML.
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to render config: {}", e))
    }
}
