//! Configuration for toolgate
//!
//! TOML file at `~/.toolgate/config.toml`, created with defaults on first
//! load. Every field has a default, so partial files are accepted.

use crate::tools::security::{GuardOptions, DEFAULT_MAX_SYMLINK_HOPS, DEFAULT_PROTECTED_PATTERNS};
use crate::tools::types::{BatchMode, ExecuteOptions, DEFAULT_TIMEOUT};
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub guard: GuardConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Per-call budget in milliseconds
    pub default_timeout_ms: u64,
    pub batch_mode: BatchMode,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            batch_mode: BatchMode::Sequential,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Boundary-relative globs denied to every tool
    pub protected_patterns: Vec<String>,
    pub audit_log: bool,
    pub max_symlink_hops: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            protected_patterns: DEFAULT_PROTECTED_PATTERNS.iter().map(|p| p.to_string()).collect(),
            audit_log: true,
            max_symlink_hops: DEFAULT_MAX_SYMLINK_HOPS,
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, creating a default file if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, toml_string).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;

        Ok(home.join(".toolgate").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.executor.default_timeout_ms > 0,
            "executor.default_timeout_ms must be positive"
        );
        ensure!(
            self.guard.max_symlink_hops > 0,
            "guard.max_symlink_hops must be positive"
        );
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.executor.default_timeout_ms)
    }

    pub fn guard_options(&self) -> GuardOptions {
        GuardOptions::default()
            .with_protected_patterns(&self.guard.protected_patterns)
            .with_audit_log(self.guard.audit_log)
            .with_max_symlink_hops(self.guard.max_symlink_hops)
    }

    pub fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions::default()
            .with_timeout(self.default_timeout())
            .with_batch_mode(self.executor.batch_mode)
    }
}
