//! # garage-db: SQLite Storage for the Garage Ledger
//!
//! Repositories for garages, stock, job cards, invoices, the cash book and
//! the payment and expense records that feed it.
//! Queries are built at runtime (`query_as` + `FromRow`), so the crate
//! compiles without a live database or offline query data.
//!
//! ## Transaction Units
//! ```text
//!   JobCardRepository::save          card row (version CAS) + items + stock deltas
//!   JobCardRepository::save_with_invoice
//!                                    the above + invoice header + invoice items
//!   InvoiceRepository::next_number   one upsert on invoice_sequences, outside any tx
//!   InvoiceRepository::save_with_entry
//!                                    invoice row (version CAS) + ledger append
//!   CashBookRepository::append       bump garages.ledger_version, read prior
//!                                    balance and max position, insert entry
//!   CashBookRepository::update/delete
//!                                    rewrite or remove, then rebalance the tail
//!   PaymentRepository / ExpenseRepository insert/update/delete
//!                                    record row + its linked entry (append,
//!                                    correct or remove with rebalance)
//! ```
//!
//! Anything that fails inside one of these units rolls the whole unit back.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use garage_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("garage.db")).await?;
//!
//! let card = db.job_cards().require(&job_card_id).await?;
//! let balance = db.cash_book().latest_balance(&card.garage_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::cash_book::CashBookRepository;
pub use repository::expense::ExpenseRepository;
pub use repository::garage::GarageRepository;
pub use repository::invoice::InvoiceRepository;
pub use repository::job_card::JobCardRepository;
pub use repository::payment::PaymentRepository;
pub use repository::stock::{StockPolicy, StockRepository};
