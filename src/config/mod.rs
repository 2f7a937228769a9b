use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::association::AssociationMode;
use crate::cache::Lifetime;
use crate::error::{CallerIdError, Result};
use crate::identity::CopyMode;
use crate::manager::LockingStrategy;

/// File name looked up when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "callerid.toml";

/// Process configuration (callerid.toml), read once at start-up.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub association: AssociationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub subject: SubjectConfig,
    #[serde(default)]
    pub manager: ManagerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AssociationConfig {
    #[serde(default)]
    pub mode: AssociationMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds; negative never expires, 0 disables caching.
    #[serde(default = "default_lifetime_secs")]
    pub default_lifetime_secs: i64,
    /// Maximum entries before LRU eviction; 0 is unbounded.
    #[serde(default)]
    pub capacity: usize,
    /// Background expiry sweep, e.g. "60s". "0s" disables the sweeper.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_lifetime_secs: default_lifetime_secs(),
            capacity: 0,
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl CacheConfig {
    pub fn lifetime(&self) -> Lifetime {
        Lifetime::from_secs(self.default_lifetime_secs)
    }

    pub fn sweep_interval(&self) -> Result<Duration> {
        parse_interval(&self.sweep_interval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectConfig {
    /// Deep-copy cached subjects into the caller's frame.
    #[serde(default = "default_true")]
    pub deep_copy: bool,
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self { deep_copy: true }
    }
}

impl SubjectConfig {
    pub fn copy_mode(&self) -> CopyMode {
        CopyMode::from_deep_flag(self.deep_copy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default)]
    pub locking: LockingStrategy,
    /// Security domain name, used in log output.
    #[serde(default = "default_domain")]
    pub domain: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            locking: LockingStrategy::default(),
            domain: default_domain(),
        }
    }
}

fn default_lifetime_secs() -> i64 {
    1800
}

fn default_sweep_interval() -> String {
    "60s".to_string()
}

fn default_domain() -> String {
    "other".to_string()
}

fn default_true() -> bool {
    true
}

/// Parse a humantime interval such as "90s" or "5m".
pub fn parse_interval(value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim())
        .map_err(|e| CallerIdError::Config(format!("invalid interval '{}': {}", value, e)))
}

/// `callerid.toml` under the user's config directory, falling back to the
/// working directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("callerid").join(DEFAULT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

impl Config {
    /// Load config from a path. Returns default config if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| CallerIdError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CallerIdError::Config(format!("serialize error: {}", e)))?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.cache.sweep_interval()?;
        if self.manager.domain.trim().is_empty() {
            return Err(CallerIdError::Config("manager.domain must not be empty".into()));
        }
        Ok(())
    }
}
