//! # garage-engine: Lifecycle Services for the Garage Ledger
//!
//! The entry point for callers: job cards, invoices, the cash book, and the
//! payment and expense records that feed it, behind one [`GarageEngine`].
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Garage Ledger Engine                             │
//! │                                                                         │
//! │  caller (HTTP handler, desktop command, batch job)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 garage-engine (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   engine.job_cards()   engine.invoices()   engine.cash_book()   │   │
//! │  │   engine.payments()    engine.expenses()                        │   │
//! │  │          │                    │                    │            │   │
//! │  │          └──────── EngineContext (Arc) ────────────┘            │   │
//! │  │                 Database · KeyedLocks · Clock · Config          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                     │                          │
//! │       ▼                                     ▼                          │
//! │  garage-core (rules, no I/O)         garage-db (SQLite, sqlx)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use garage_engine::{EngineConfig, GarageEngine};
//!
//! let config = EngineConfig::load(None)?;
//! garage_engine::telemetry::init_tracing(&config.logging.filter);
//!
//! let engine = GarageEngine::open(config).await?;
//! let outcome = engine.job_cards().complete(&job_card_id, request).await?;
//! if let Some(invoice) = outcome.invoice {
//!     engine.invoices().add_payment(&invoice.id, PaymentRequest::new(invoice.due())).await?;
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod config;
pub mod error;
pub mod locks;
pub mod service;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use error::{ConfigError, EngineError, EngineResult};
pub use service::cash_book::CashBookService;
pub use service::expense::ExpenseService;
pub use service::invoice::{InvoiceService, PaymentOutcome};
pub use service::job_card::{CompletionOutcome, JobCardService};
pub use service::payment::PaymentService;

use std::sync::Arc;
use tracing::info;

use garage_db::Database;

use service::EngineContext;

// =============================================================================
// Engine
// =============================================================================

/// Handle to the garage ledger. Cheap to clone; clones share the pool, the
/// locks and the clock.
#[derive(Debug, Clone)]
pub struct GarageEngine {
    ctx: Arc<EngineContext>,
}

impl GarageEngine {
    /// Validates `config`, opens the database and runs migrations.
    pub async fn open(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let db = Database::new(config.database.db_config()).await?;
        Ok(Self::from_database(db, config))
    }

    /// Wraps an already open database, using the system clock.
    pub fn from_database(db: Database, config: EngineConfig) -> Self {
        Self::with_clock(db, config, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            stock_policy = %config.stock_policy(),
            invoice_prefix = %config.invoice_prefix(),
            record_invoice_payments = config.invoicing.record_invoice_payments,
            "Garage engine ready"
        );
        GarageEngine {
            ctx: Arc::new(EngineContext::new(db, config, clock)),
        }
    }

    pub fn job_cards(&self) -> JobCardService {
        JobCardService::new(self.ctx.clone())
    }

    pub fn invoices(&self) -> InvoiceService {
        InvoiceService::new(self.ctx.clone())
    }

    pub fn cash_book(&self) -> CashBookService {
        CashBookService::new(self.ctx.clone())
    }

    pub fn payments(&self) -> PaymentService {
        PaymentService::new(self.ctx.clone())
    }

    pub fn expenses(&self) -> ExpenseService {
        ExpenseService::new(self.ctx.clone())
    }

    /// Direct repository access (garages, stock, raw reads).
    pub fn database(&self) -> &Database {
        &self.ctx.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.ctx.clock
    }

    pub async fn close(&self) {
        self.ctx.db.close().await;
    }
}

// =============================================================================
// Test Fixtures
// =============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let engine = GarageEngine::open(EngineConfig::in_memory()).await.unwrap();
        assert!(engine.database().health_check().await);
        assert!(engine.database().garages().list().await.unwrap().is_empty());
        engine.close().await;
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let mut config = EngineConfig::in_memory();
        config.invoicing.prefix = String::new();
        let err = GarageEngine::open(config).await.unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[tokio::test]
    async fn test_fixture_clock() {
        let engine = test_support::engine().await;
        assert_eq!(engine.clock().today(), test_support::today());
    }
}
