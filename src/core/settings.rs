//! Automation settings management

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use super::error::{Error, Result};
use super::miner::ScoringMode;
use super::TICK_SECS;

/// SMTP settings for change and failure notices
///
/// `port`, `user` and `password` are carried for the mail transport; the
/// built-in notifier only logs the addressing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub server: String,
    pub port: String,
    pub user: String,
    pub password: String,
    pub from: String,
    pub to: String,
}

impl EmailSettings {
    /// Email is considered configured once a server is set
    pub fn is_configured(&self) -> bool {
        !self.server.trim().is_empty()
    }
}

/// Automation settings, loaded once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    // Database
    /// SQLite file shared with the statistics collectors
    pub database: PathBuf,

    // Miner
    /// Name of the mining hardware in the catalog
    pub miner_name: String,
    /// Password field for the pool
    pub pool_password: String,
    /// Wallet to mine into
    pub wallet: String,
    /// Rank by pool estimates instead of 24 hour actual profit
    #[serde(deserialize_with = "flag")]
    pub use_estimates: bool,
    /// Read for compatibility; host reboots are not performed
    #[serde(deserialize_with = "flag")]
    pub reboot_on_failure: bool,
    /// Seconds between optimization checks
    pub optimization_check_time: u64,

    // Notifications
    pub email: EmailSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: Self::default_directory().join("automate.db"),
            miner_name: String::new(),
            pool_password: "x".to_string(),
            wallet: String::new(),
            use_estimates: true,
            reboot_on_failure: false,
            optimization_check_time: 600,
            email: EmailSettings::default(),
        }
    }
}

/// Accept the 0/1 integers used by existing configuration files as well as booleans
fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(u8),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n != 0,
    })
}

impl Config {
    /// Directory holding the default configuration and database
    pub fn default_directory() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Automate")
    }

    /// Default configuration file location
    pub fn default_path() -> PathBuf {
        Self::default_directory().join("automate.json")
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Parse and validate configuration text
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: Config = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate settings and fix any out-of-range values
    ///
    /// The optimization period is rounded up to a whole number of ticks and is
    /// never shorter than one tick.
    pub fn validate(&mut self) -> Result<()> {
        if self.miner_name.trim().is_empty() {
            return Err(Error::Config("minerName is required".to_string()));
        }
        if self.wallet.trim().is_empty() {
            return Err(Error::Config("wallet is required".to_string()));
        }
        let period = self.optimization_check_time;
        self.optimization_check_time = period
            .max(TICK_SECS)
            .div_ceil(TICK_SECS)
            .checked_mul(TICK_SECS)
            .ok_or_else(|| {
                Error::Config(format!("optimizationCheckTime {} is too large", period))
            })?;
        Ok(())
    }

    pub fn scoring_mode(&self) -> ScoringMode {
        ScoringMode::from_use_estimates(self.use_estimates)
    }
}
