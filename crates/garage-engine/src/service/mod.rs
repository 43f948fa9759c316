//! # Services
//!
//! One service per aggregate. Each is a cheap handle over the shared
//! [`EngineContext`].
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Service Write Path                              │
//! │                                                                         │
//! │  1. take key lock(s)          locks.lock(job_card_key(id))             │
//! │  2. load aggregate            db.job_cards().require(id)               │
//! │  3. apply rule (pure)         card.add_item(&spec, clock.now())        │
//! │           │                         │                                   │
//! │           │ Err → return,           └─► Vec<StockMovement>             │
//! │           │ nothing written                                             │
//! │  4. one storage transaction   db.job_cards().save(&card, &moves, pol)  │
//! │  5. log + return the reloaded aggregate                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod cash_book;
pub mod expense;
pub mod invoice;
pub mod job_card;
pub mod payment;

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use garage_db::{Database, StockPolicy};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::locks::KeyedLocks;

/// State shared by every service of one engine.
#[derive(Debug)]
pub struct EngineContext {
    pub(crate) db: Database,
    pub(crate) locks: KeyedLocks,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: EngineConfig,
}

impl EngineContext {
    pub(crate) fn new(db: Database, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        EngineContext {
            db,
            locks: KeyedLocks::new(),
            clock,
            config,
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub(crate) fn stock_policy(&self) -> StockPolicy {
        self.config.stock_policy()
    }
}
