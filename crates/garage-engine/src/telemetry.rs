//! # Tracing Setup
//!
//! Installs the global `tracing` subscriber for binaries embedding the engine.
//!
//! ## Filter Resolution
//! ```text
//! RUST_LOG set?  ──yes──► EnvFilter from RUST_LOG
//!      │
//!      no
//!      ▼
//! EnvFilter::new(config.logging.filter)   default "info,garage=debug,sqlx=warn"
//! ```

use tracing_subscriber::EnvFilter;

use crate::config::DEFAULT_LOG_FILTER;

/// Builds the filter: `RUST_LOG` wins, then `configured`, then the default.
pub fn env_filter(configured: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs a `fmt` subscriber. Returns false if one was already installed.
pub fn init_tracing(configured: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(configured))
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_refused() {
        init_tracing(DEFAULT_LOG_FILTER);
        assert!(!init_tracing("debug"));
    }

    #[test]
    fn test_invalid_filter_falls_back() {
        // Garbage directives must not panic; either RUST_LOG or the default applies.
        let _ = env_filter("info,[[[");
    }
}
