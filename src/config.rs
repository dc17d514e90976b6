use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable holding the POS API bearer token.
pub const POS_TOKEN_ENV: &str = "POS_API_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub pos: PosConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PosConfig {
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_page_size() -> usize {
    250
}
fn default_max_pages() -> usize {
    40
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 30,
        }
    }
}

impl IndexingConfig {
    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Used as the window start when the watermark log is empty.
    #[serde(default)]
    pub initial_watermark: Option<DateTime<Utc>>,
    #[serde(default = "default_sync_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_stub_customer_name")]
    pub stub_customer_name: String,
}

fn default_sync_timeout_secs() -> u64 {
    300
}
fn default_stub_customer_name() -> String {
    "Unknown Customer".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            initial_watermark: None,
            timeout_secs: default_sync_timeout_secs(),
            stub_customer_name: default_stub_customer_name(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_analysis_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_analysis_timeout_secs() -> u64 {
    60
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_analysis_timeout_secs(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate POS source
    if config.pos.base_url.trim().is_empty() {
        anyhow::bail!("pos.base_url must not be empty");
    }
    if !(1..=250).contains(&config.pos.page_size) {
        anyhow::bail!("pos.page_size must be in [1, 250]");
    }
    if config.pos.max_pages == 0 {
        anyhow::bail!("pos.max_pages must be >= 1");
    }

    // Validate timeouts
    if config.pos.timeout_secs == 0
        || config.indexing.timeout_secs == 0
        || config.sync.timeout_secs == 0
        || config.analysis.timeout_secs == 0
    {
        anyhow::bail!("timeout_secs values must be > 0");
    }

    if config.sync.stub_customer_name.trim().is_empty() {
        anyhow::bail!("sync.stub_customer_name must not be empty");
    }

    Ok(())
}

/// Reads the POS bearer token from the environment.
pub fn pos_token() -> Result<String> {
    std::env::var(POS_TOKEN_ENV)
        .with_context(|| format!("{} environment variable not set", POS_TOKEN_ENV))
}
