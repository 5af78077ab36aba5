//! # Configuration
//!
//! TOML configuration for the guildvault binary and for embedding applications.
//!
//! - [`StorageConfig`] - which persistence backend to use and where it keeps data
//! - [`LoggingConfig`] - log level plus optional general and security log files
//! - [`EconomyConfig`] - defaults applied by the economy core (check-in reward, currency
//!   glyph, canned messages, shop limits)
//!
//! ```rust,no_run
//! use guildvault::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("guildvault.toml").await?;
//!     let config = Config::load("guildvault.toml").await?;
//!     let store = config.open_store()?;
//!     let economy = guildvault::economy::Economy::new(store, config.economy.clone());
//!     println!("{} currencies", economy.currencies().list(&"guild".into())?.len());
//!     Ok(())
//! }
//! ```
//!
//! Every field has a serde default, so a partial file (or an empty one) is valid:
//!
//! ```toml
//! [storage]
//! backend = "sled"
//! data_dir = "/var/lib/guildvault"
//!
//! [economy]
//! default_checkin_amount = 250
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::storage::{JsonFileStore, MemoryStore, PersistenceProvider, SledStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub economy: EconomyConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON document per collection and guild under `data_dir`.
    Json,
    /// Embedded sled database at `<data_dir>/sled`.
    Sled,
    /// Nothing is persisted; useful for demos and tests.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Json
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
    /// Destination for `target: "security"` records (admin checks, grants, currency changes).
    #[serde(default)]
    pub security_file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: Some("guildvault.log".to_string()),
            security_file: Some("guildvault-security.log".to_string()),
        }
    }
}

/// Defaults used by the economy core.
///
/// Message templates accept `{amount}`, `{streak}`, `{symbol}` and `{currency}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomyConfig {
    #[serde(default = "default_checkin_amount")]
    pub default_checkin_amount: i64,
    #[serde(default = "default_currency_symbol")]
    pub default_currency_symbol: String,
    #[serde(default = "default_currency_description")]
    pub default_currency_description: String,
    #[serde(default = "default_checkin_success_message")]
    pub checkin_success_message: String,
    #[serde(default = "default_checkin_already_claimed_message")]
    pub checkin_already_claimed_message: String,
    #[serde(default = "default_max_items_per_shop")]
    pub max_items_per_shop: usize,
    #[serde(default = "default_max_shops_per_owner")]
    pub max_shops_per_owner: usize,
}

fn default_checkin_amount() -> i64 {
    100
}

fn default_currency_symbol() -> String {
    "🪙".to_string()
}

fn default_currency_description() -> String {
    "A guild currency".to_string()
}

fn default_checkin_success_message() -> String {
    "Check-in complete! You received {amount} {symbol}.".to_string()
}

fn default_checkin_already_claimed_message() -> String {
    "You already checked in today. Come back tomorrow!".to_string()
}

fn default_max_items_per_shop() -> usize {
    50
}

fn default_max_shops_per_owner() -> usize {
    10
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            default_checkin_amount: default_checkin_amount(),
            default_currency_symbol: default_currency_symbol(),
            default_currency_description: default_currency_description(),
            checkin_success_message: default_checkin_success_message(),
            checkin_already_claimed_message: default_checkin_already_claimed_message(),
            max_items_per_shop: default_max_items_per_shop(),
            max_shops_per_owner: default_max_shops_per_owner(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;
        config.validate()?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.economy.default_checkin_amount < 0 {
            return Err(anyhow!(
                "economy.default_checkin_amount cannot be negative (got {})",
                self.economy.default_checkin_amount
            ));
        }
        if self.economy.max_items_per_shop == 0 || self.economy.max_shops_per_owner == 0 {
            return Err(anyhow!("economy shop limits must be at least 1"));
        }
        if self.storage.backend != StorageBackend::Memory && self.storage.data_dir.trim().is_empty() {
            return Err(anyhow!("storage.data_dir cannot be empty"));
        }
        Ok(())
    }

    /// Build the configured persistence provider.
    pub fn open_store(&self) -> Result<Arc<dyn PersistenceProvider>> {
        let data_dir = Path::new(&self.storage.data_dir);
        let store: Arc<dyn PersistenceProvider> = match self.storage.backend {
            StorageBackend::Json => Arc::new(
                JsonFileStore::open(data_dir)
                    .map_err(|e| anyhow!("Failed to open JSON store {}: {}", data_dir.display(), e))?,
            ),
            StorageBackend::Sled => {
                let path = data_dir.join("sled");
                Arc::new(
                    SledStore::open(&path)
                        .map_err(|e| anyhow!("Failed to open sled store {}: {}", path.display(), e))?,
                )
            }
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(store)
    }
}
