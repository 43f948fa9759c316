//! # Repository Module
//!
//! Database repository implementations for the garage ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and Write Units                         │
//! │                                                                         │
//! │  garage-engine service                                                 │
//! │       │                                                                 │
//! │       │  db.job_cards().save(&card, &movements, policy)                │
//! │       ▼                                                                 │
//! │  JobCardRepository                                                     │
//! │  ├── get_by_id / list_* / search_*      (pool reads)                   │
//! │  └── insert / save / delete             (one transaction each)         │
//! │            │                                                            │
//! │            │  pub(crate) helpers over &mut SqliteConnection             │
//! │            ▼                                                            │
//! │  stock::apply_movements · invoice::insert_invoice ·                    │
//! │  cash_book::append_entry / correct_entry / remove_entry ·              │
//! │  line_items::replace_items                                             │
//! │                                                                         │
//! │  Cross-aggregate writes (completion + invoice, payment + ledger entry) │
//! │  compose the helpers inside a single transaction.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`GarageRepository`](garage::GarageRepository) - Garage lookup
//! - [`StockRepository`](stock::StockRepository) - Quantity on hand, stock policy
//! - [`JobCardRepository`](job_card::JobCardRepository) - Job cards and items
//! - [`InvoiceRepository`](invoice::InvoiceRepository) - Invoices, items, numbering
//! - [`CashBookRepository`](cash_book::CashBookRepository) - Ledger entries and balances
//! - [`PaymentRepository`](payment::PaymentRepository) - Payment records with their entries
//! - [`ExpenseRepository`](expense::ExpenseRepository) - Expense records with their entries

pub mod cash_book;
pub mod expense;
pub mod garage;
pub mod invoice;
pub mod job_card;
pub mod payment;
pub mod stock;

mod line_items;

/// `%query%` for a `LIKE ?n ESCAPE '\'` clause, with the query's own `%`,
/// `_` and `\` matched literally.
pub(crate) fn contains_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
