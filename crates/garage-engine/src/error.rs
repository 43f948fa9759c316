//! # Engine Error Types
//!
//! The error callers of the engine see.
//!
//! ## Error Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Engine Error Sources                              │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Business Rules │  │    Storage      │  │   Configuration         │ │
//! │  │  (garage-core)  │  │   (garage-db)   │  │   (this crate)          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  NotFound       │  │  NotFound       │  │  InvalidConfig          │ │
//! │  │  Mismatch       │  │  VersionConflict│  │  ConfigLoadFailed       │ │
//! │  │  InvalidTrans.. │  │  Insufficient.. │  │  ConfigSaveFailed       │ │
//! │  │  Validation     │  │  QueryFailed    │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  kind() → NotFound | Validation | Mismatch | Conflict | Storage        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use garage_core::{CoreError, ErrorKind, ValidationError};
use garage_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A business rule rejected the operation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The storage layer failed or detected a conflict.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Engine configuration is invalid or could not be read/written.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Returns the caller-facing classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Core(e) => e.kind(),
            EngineError::Db(e) => e.kind(),
            EngineError::Config(_) => ErrorKind::Validation,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::ConfigSaveFailed(err.to_string())
    }
}
