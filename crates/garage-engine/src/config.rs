//! # Engine Configuration
//!
//! Configuration management for the garage ledger engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     GARAGE_DB_PATH=/var/lib/garage/garage.db                           │
//! │     GARAGE_STOCK_POLICY=strict                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/garage-ledger/engine.toml (Linux)                        │
//! │     ~/Library/Application Support/com.garage.ledger/engine.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     prefix INV, best-effort stock, payments recorded in the cash book  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # engine.toml
//! [database]
//! path = "garage.db"
//! max_connections = 5
//! busy_timeout_secs = 5
//!
//! [invoicing]
//! prefix = "INV"
//! default_due_days = 15
//! record_invoice_payments = true
//!
//! [inventory]
//! stock_policy = "best_effort"  # best_effort | strict
//!
//! [logging]
//! filter = "info,garage=debug,sqlx=warn"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use garage_core::DEFAULT_INVOICE_PREFIX;
use garage_db::{DbConfig, StockPolicy};

use crate::error::ConfigError;

/// Default `EnvFilter` directive when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info,garage=debug,sqlx=warn";

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path. `:memory:` opens a private in-memory database.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on SQLite's lock before failing (seconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("garage.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

impl DatabaseSettings {
    pub fn db_config(&self) -> DbConfig {
        if self.path.as_os_str() == ":memory:" {
            return DbConfig::in_memory();
        }
        DbConfig::new(&self.path)
            .max_connections(self.max_connections)
            .busy_timeout(Duration::from_secs(self.busy_timeout_secs))
    }
}

// =============================================================================
// Invoicing Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicingSettings {
    /// First segment of generated invoice numbers.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Applied to new invoices that carry neither a due date nor due days.
    #[serde(default)]
    pub default_due_days: Option<u32>,

    /// Append a CREDIT INVOICE_PAYMENT cash book entry for each invoice
    /// payment, in the payment's transaction.
    #[serde(default = "default_true")]
    pub record_invoice_payments: bool,
}

fn default_prefix() -> String {
    DEFAULT_INVOICE_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for InvoicingSettings {
    fn default() -> Self {
        InvoicingSettings {
            prefix: default_prefix(),
            default_due_days: None,
            record_invoice_payments: true,
        }
    }
}

// =============================================================================
// Inventory & Logging Settings
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySettings {
    #[serde(default)]
    pub stock_policy: StockPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings { filter: default_filter() }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub invoicing: InvoicingSettings,

    #[serde(default)]
    pub inventory: InventorySettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with a private in-memory database. Used by tests.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.database.path = PathBuf::from(":memory:");
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> Result<(), ConfigError> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| ConfigError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = self.invoicing.prefix.trim();
        if prefix.is_empty() {
            return Err(ConfigError::InvalidConfig("invoicing.prefix must not be empty".into()));
        }
        if prefix.contains('-') {
            return Err(ConfigError::InvalidConfig(format!(
                "invoicing.prefix must not contain '-', got: {}",
                prefix
            )));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if let Some(days) = self.invoicing.default_due_days {
            if days > 365 {
                return Err(ConfigError::InvalidConfig(format!(
                    "invoicing.default_due_days must be at most 365, got: {}",
                    days
                )));
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("GARAGE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("GARAGE_DB_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse::<u32>() {
                self.database.max_connections = n;
            }
        }

        if let Ok(policy) = std::env::var("GARAGE_STOCK_POLICY") {
            match policy.parse::<StockPolicy>() {
                Ok(parsed) => {
                    debug!(policy = %parsed, "Overriding stock policy from environment");
                    self.inventory.stock_policy = parsed;
                }
                Err(e) => warn!(policy = %policy, "Ignoring stock policy from environment: {}", e),
            }
        }

        if let Ok(days) = std::env::var("GARAGE_DEFAULT_DUE_DAYS") {
            if let Ok(d) = days.parse::<u32>() {
                self.invoicing.default_due_days = Some(d);
            }
        }

        if let Ok(filter) = std::env::var("GARAGE_LOG_FILTER") {
            self.logging.filter = filter;
        }

        if let Ok(record) = std::env::var("GARAGE_RECORD_INVOICE_PAYMENTS") {
            match record.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.invoicing.record_invoice_payments = true,
                "0" | "false" | "no" | "off" => self.invoicing.record_invoice_payments = false,
                _ => warn!(value = %record, "Unknown GARAGE_RECORD_INVOICE_PAYMENTS value"),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "garage", "ledger").map(|dirs| dirs.config_dir().join("engine.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn stock_policy(&self) -> StockPolicy {
        self.inventory.stock_policy
    }

    pub fn invoice_prefix(&self) -> &str {
        self.invoicing.prefix.trim()
    }
}
