use crate::core::market::{Session, default_sessions, hhmm, hm};
use anyhow::{Context, Result};
use chrono::NaiveTime;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct EastmoneyProviderConfig {
    pub quote_base_url: String,
    /// Daily index klines.
    pub history_base_url: String,
    pub fund_base_url: String,
    pub archive_base_url: String,
    /// Per-request timeout. Slow answers are treated as no data.
    pub timeout_secs: u64,
    /// Extra attempts after a failed request.
    pub retries: usize,
}

impl Default for EastmoneyProviderConfig {
    fn default() -> Self {
        EastmoneyProviderConfig {
            quote_base_url: "https://push2.eastmoney.com".to_string(),
            history_base_url: "https://push2his.eastmoney.com".to_string(),
            fund_base_url: "https://fund.eastmoney.com".to_string(),
            archive_base_url: "https://fundf10.eastmoney.com".to_string(),
            timeout_secs: 5,
            retries: 1,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ProvidersConfig {
    pub eastmoney: EastmoneyProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub quote_ttl_secs: u64,
    pub estimate_ttl_secs: u64,
    pub nav_history_ttl_secs: u64,
    pub trading_day_ttl_secs: u64,
    /// A "closed" verdict is rechecked sooner than an open one.
    pub closed_day_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            quote_ttl_secs: 60,
            estimate_ttl_secs: 30,
            nav_history_ttl_secs: 3600,
            trading_day_ttl_secs: 600,
            closed_day_ttl_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub quote_refresh_secs: u64,
    pub sessions: Vec<Session>,
    #[serde(with = "hhmm")]
    pub snapshot_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub nav_reconcile_time: NaiveTime,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            quote_refresh_secs: 30,
            sessions: default_sessions(),
            snapshot_time: hm(15, 30),
            nav_reconcile_time: hm(21, 30),
        }
    }
}

impl SchedulerConfig {
    pub fn quote_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.quote_refresh_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub providers: ProvidersConfig,
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    /// Loads the default config file, or built-in defaults when none exists.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "fundmon", "fundmon")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("org", "fundmon", "fundmon")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        // An empty document deserializes to unit, not to an empty mapping
        if config_str.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
