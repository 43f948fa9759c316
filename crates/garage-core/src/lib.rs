//! # garage-core: Pure Business Logic for the Garage Ledger
//!
//! This crate holds the financial lifecycle of a garage: job cards, the
//! invoices generated from them, and the cash book that records every money
//! movement. Everything here is pure computation with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Garage Ledger Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │           External callers (HTTP / CRUD layer, not here)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        garage-engine (services, locks, config, tracing)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ garage-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌───────┐ │   │
//! │  │  │  money   │ │line_item │ │ job_card │ │ invoice  │ │ledger │ │   │
//! │  │  │  Money   │ │ LineItem │ │ JobCard  │ │ Invoice  │ │Entries│ │   │
//! │  │  │  Rate    │ │ totals   │ │ states   │ │ payments │ │balance│ │   │
//! │  │  └──────────┘ └──────────┘ └──────────┘ └──────────┘ └───────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  garage-db (SQLite via sqlx)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - `Money` (integer minor units) and `Rate` (basis points)
//! - [`line_item`] - Line-item calculator shared by job cards and invoices
//! - [`job_card`] - Job card aggregate and its state machine
//! - [`invoice`] - Invoice aggregate, payment status derivation
//! - [`numbering`] - Invoice number format
//! - [`ledger`] - Cash book entries and running-balance arithmetic
//! - [`payment`] - Payments outside the invoice flow, revenue report
//! - [`expense`] - Expenses, expense and cash flow reports
//! - [`summary`] - Invoice summary aggregation
//! - [`types`] - Shared value types (vehicle, customer, stock, dates)
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Derived values are private**: totals, payment status and running
//!    balances can only change through methods that recompute them
//! 2. **No I/O**: callers pass `now` / `today` explicitly
//! 3. **Integer Money**: all monetary values are minor units (i64)
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use garage_core::line_item::compute_line_total;
//! use garage_core::Money;
//!
//! // 2 × 100.00 − 10.00 discount + 5.00 tax
//! let total = compute_line_total(
//!     Some(2),
//!     Some(Money::from_major(100)),
//!     Some(Money::from_major(10)),
//!     Some(Money::from_major(5)),
//! );
//! assert_eq!(total, Money::from_major(195));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod expense;
pub mod invoice;
pub mod job_card;
pub mod ledger;
pub mod line_item;
pub mod money;
pub mod numbering;
pub mod payment;
pub mod summary;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use expense::{CashFlowReport, CategoryTotal, Expense, ExpenseCategory, ExpenseReport, NewExpense};
pub use invoice::{
    FromJobCardOptions, Invoice, InvoiceCustomer, InvoiceStatus, InvoiceUpdate, NewInvoice, PaymentApplied,
    PaymentRequest, PaymentStatus,
};
pub use job_card::{CompleteJobCard, JobCard, JobCardStatus, JobCardUpdate, NewJobCard, PricingUpdate};
pub use ledger::{
    CashBookEntry, CashBookSummary, EntryDetails, EntryLinks, ExpenseIncurred, InvoicePaymentReceived,
    LedgerTotals, NewCashBookEntry, PaymentReceived, TransactionType,
};
pub use line_item::{ItemKind, LineAmounts, LineItem, LineItemSpec};
pub use money::{Money, Rate};
pub use numbering::InvoiceNumber;
pub use payment::{MethodTotal, NewPayment, Payment, PaymentType, RevenueReport, TypeTotal};
pub use summary::{InvoiceSummary, PeriodTotals};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity on a single line item.
///
/// ## Business Reason
/// Catches typing mistakes (9999 instead of 9) before they move stock.
pub const MAX_ITEM_QUANTITY: i64 = 9_999;

/// Largest single amount accepted on input (prices, discounts, tax, labour,
/// payments), in minor units: 10 000 000 000.00.
///
/// With `MAX_ITEM_QUANTITY` and `MAX_LINE_ITEMS` this keeps every total of a
/// card or invoice far inside `i64`.
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000_000;

/// Maximum number of items on a single job card or invoice.
pub const MAX_LINE_ITEMS: usize = 200;

/// Default prefix of generated invoice numbers (`INV-{garage}-{date}-{seq}`).
pub const DEFAULT_INVOICE_PREFIX: &str = "INV";

/// Name of the synthetic labour line appended to invoices built from job cards.
pub const LABOUR_ITEM_NAME: &str = "Labour Charges";

/// Description of the synthetic labour line.
pub const LABOUR_ITEM_DESCRIPTION: &str = "Labour charges for service";
