//! # Cash Book
//!
//! Entry types and running-balance arithmetic for the per-garage cash book.
//!
//! ## Running Balance
//! ```text
//! position  type    amount   running_balance
//! ────────  ──────  ───────  ───────────────
//!    1      CREDIT   500.00        500.00
//!    2      DEBIT    200.00        300.00
//!    3      CREDIT    50.00        350.00   = Σ signed amounts of 1..=3
//! ```
//!
//! A balance is a snapshot taken when the entry is written. Corrections and
//! deletions call [`rebalance`] over every later entry so the snapshots keep
//! matching the prefix sums.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::invoice::PaymentApplied;
use crate::money::Money;
use crate::types::{DateRange, PaymentMethod};
use crate::validation::{normalize_optional, validate_positive_amount, validate_required, ValidationResult};

// =============================================================================
// Transaction Type & Categories
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Credit,
    Debit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Credit => "CREDIT",
            TransactionType::Debit => "DEBIT",
        }
    }

    /// `amount` for credits, `-amount` for debits.
    pub fn signed(&self, amount: Money) -> Money {
        match self {
            TransactionType::Credit => amount,
            TransactionType::Debit => -amount,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CREDIT" => Ok(TransactionType::Credit),
            "DEBIT" => Ok(TransactionType::Debit),
            _ => Err(ValidationError::NotAllowed {
                field: "transaction_type".to_string(),
                allowed: vec!["CREDIT".to_string(), "DEBIT".to_string()],
            }),
        }
    }
}

/// Conventional category names. Categories are free-form; these are the
/// ones the engine writes itself or that callers are expected to use.
pub mod category {
    pub const INVOICE_PAYMENT: &str = "INVOICE_PAYMENT";
    pub const SERVICE_PAYMENT: &str = "SERVICE_PAYMENT";
    pub const SPARE_PART_SALE: &str = "SPARE_PART_SALE";
    pub const LUBE_SALE: &str = "LUBE_SALE";
    pub const OTHER_INCOME: &str = "OTHER_INCOME";

    pub const EXPENSE: &str = "EXPENSE";
    pub const SALARY: &str = "SALARY";
    pub const RENT: &str = "RENT";
    pub const UTILITIES: &str = "UTILITIES";
    pub const MAINTENANCE: &str = "MAINTENANCE";
    pub const INVENTORY_PURCHASE: &str = "INVENTORY_PURCHASE";
    pub const FUEL: &str = "FUEL";
    pub const TOOLS: &str = "TOOLS";
    pub const MARKETING: &str = "MARKETING";
    pub const INSURANCE: &str = "INSURANCE";
    pub const TAX: &str = "TAX";
    pub const OTHER_EXPENSE: &str = "OTHER_EXPENSE";

    pub const CREDIT: [&str; 5] = [INVOICE_PAYMENT, SERVICE_PAYMENT, SPARE_PART_SALE, LUBE_SALE, OTHER_INCOME];

    pub const DEBIT: [&str; 12] = [
        EXPENSE,
        SALARY,
        RENT,
        UTILITIES,
        MAINTENANCE,
        INVENTORY_PURCHASE,
        FUEL,
        TOOLS,
        MARKETING,
        INSURANCE,
        TAX,
        OTHER_EXPENSE,
    ];
}

/// Trims and upper-cases a category. Blank is rejected.
pub fn normalize_category(raw: &str) -> ValidationResult<String> {
    validate_required("category", raw, 50).map(|c| c.to_uppercase())
}

// =============================================================================
// Requests
// =============================================================================

/// Optional links from an entry to whatever caused it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct EntryLinks {
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub expense_id: Option<String>,
    #[serde(default)]
    pub job_card_id: Option<String>,
}

/// A cash book entry as requested by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCashBookEntry {
    pub garage_id: String,
    pub transaction_type: TransactionType,
    pub category: String,
    pub amount: Money,
    pub description: String,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub party_name: Option<String>,
    #[serde(default)]
    pub party_phone: Option<String>,
    #[serde(default)]
    pub links: EntryLinks,
    /// Defaults to today.
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub transaction_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewCashBookEntry {
    pub fn new(
        garage_id: impl Into<String>,
        transaction_type: TransactionType,
        category: impl Into<String>,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        NewCashBookEntry {
            garage_id: garage_id.into(),
            transaction_type,
            category: category.into(),
            amount,
            description: description.into(),
            payment_method: None,
            reference_number: None,
            party_name: None,
            party_phone: None,
            links: EntryLinks::default(),
            transaction_date: None,
            notes: None,
        }
    }

    pub fn credit(
        garage_id: impl Into<String>,
        category: impl Into<String>,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        NewCashBookEntry::new(garage_id, TransactionType::Credit, category, amount, description)
    }

    pub fn debit(
        garage_id: impl Into<String>,
        category: impl Into<String>,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        NewCashBookEntry::new(garage_id, TransactionType::Debit, category, amount, description)
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.transaction_date = Some(date);
        self
    }

    /// Validates and normalizes the request.
    ///
    /// ## Rules
    /// - amount > 0
    /// - category and description required; category upper-cased
    /// - transaction date defaults to `today`
    pub fn validate(&self, today: NaiveDate) -> ValidationResult<EntryDetails> {
        validate_required("garage_id", &self.garage_id, 64)?;
        validate_positive_amount("amount", self.amount)?;

        Ok(EntryDetails {
            transaction_type: self.transaction_type,
            category: normalize_category(&self.category)?,
            amount: self.amount,
            description: validate_required("description", &self.description, 500)?,
            payment_method: self.payment_method,
            reference_number: normalize_optional(self.reference_number.clone()),
            party_name: normalize_optional(self.party_name.clone()),
            party_phone: normalize_optional(self.party_phone.clone()),
            links: self.links.clone(),
            transaction_date: self.transaction_date.unwrap_or(today),
            notes: normalize_optional(self.notes.clone()),
        })
    }
}

// =============================================================================
// Entry
// =============================================================================

/// Validated, normalized contents of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct EntryDetails {
    pub transaction_type: TransactionType,
    pub category: String,
    pub amount: Money,
    pub description: String,
    pub payment_method: Option<PaymentMethod>,
    pub reference_number: Option<String>,
    pub party_name: Option<String>,
    pub party_phone: Option<String>,
    pub links: EntryLinks,
    #[ts(as = "String")]
    pub transaction_date: NaiveDate,
    pub notes: Option<String>,
}

impl EntryDetails {
    pub fn signed_amount(&self) -> Money {
        self.transaction_type.signed(self.amount)
    }
}

/// Stored state of an entry.
#[derive(Debug, Clone)]
pub struct CashBookEntryParts {
    pub id: String,
    pub garage_id: String,
    pub details: EntryDetails,
    pub position: i64,
    pub running_balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct CashBookEntry {
    pub id: String,
    pub garage_id: String,
    pub details: EntryDetails,
    position: i64,
    running_balance: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CashBookEntry {
    /// A new entry appended after `prior_balance` at `position`.
    pub fn append(
        id: String,
        garage_id: &str,
        details: EntryDetails,
        position: i64,
        prior_balance: Money,
        now: DateTime<Utc>,
    ) -> CashBookEntry {
        let running_balance = next_balance(prior_balance, details.transaction_type, details.amount);
        CashBookEntry {
            id,
            garage_id: garage_id.to_string(),
            details,
            position,
            running_balance,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn restore(parts: CashBookEntryParts) -> CashBookEntry {
        CashBookEntry {
            id: parts.id,
            garage_id: parts.garage_id,
            details: parts.details,
            position: parts.position,
            running_balance: parts.running_balance,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn running_balance(&self) -> Money {
        self.running_balance
    }

    pub fn signed_amount(&self) -> Money {
        self.details.signed_amount()
    }

    /// Replaces the contents. The caller must [`rebalance`] from here on.
    pub fn revise(&mut self, details: EntryDetails, now: DateTime<Utc>) {
        self.details = details;
        self.updated_at = now;
    }
}

/// `prior ± amount`.
pub fn next_balance(prior: Money, transaction_type: TransactionType, amount: Money) -> Money {
    prior + transaction_type.signed(amount)
}

/// Rewrites running balances of `entries` (in position order) starting from
/// `opening`. Returns the closing balance.
pub fn rebalance(opening: Money, entries: &mut [CashBookEntry]) -> Money {
    let mut balance = opening;
    for entry in entries.iter_mut() {
        balance = balance + entry.signed_amount();
        entry.running_balance = balance;
    }
    balance
}

// =============================================================================
// Events
// =============================================================================

/// A payment recorded outside the invoice flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentReceived {
    pub garage_id: String,
    pub payment_id: String,
    pub amount: Money,
    pub description: String,
    #[serde(default)]
    pub party_name: Option<String>,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub job_card_id: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub date: Option<NaiveDate>,
}

/// An expense paid by the garage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExpenseIncurred {
    pub garage_id: String,
    pub expense_id: String,
    pub amount: Money,
    pub description: String,
    /// Becomes the entry category; EXPENSE when blank.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub vendor_name: Option<String>,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub date: Option<NaiveDate>,
}

/// A payment applied to an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoicePaymentReceived {
    pub garage_id: String,
    pub invoice_id: String,
    pub invoice_number: String,
    pub amount: Money,
    pub customer_name: Option<String>,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub date: Option<NaiveDate>,
}

impl InvoicePaymentReceived {
    pub fn from_applied(garage_id: &str, applied: &PaymentApplied) -> Self {
        InvoicePaymentReceived {
            garage_id: garage_id.to_string(),
            invoice_id: applied.invoice_id.clone(),
            invoice_number: applied.invoice_number.clone(),
            amount: applied.amount,
            customer_name: Some(applied.customer_name.clone()),
            method: applied.method,
            date: Some(applied.date),
        }
    }
}

impl From<&PaymentReceived> for NewCashBookEntry {
    fn from(event: &PaymentReceived) -> Self {
        let category = if event.invoice_id.is_some() {
            category::INVOICE_PAYMENT
        } else {
            category::SERVICE_PAYMENT
        };
        let mut entry = NewCashBookEntry::credit(&event.garage_id, category, event.amount, &event.description);
        entry.payment_method = event.method;
        entry.party_name = event.party_name.clone();
        entry.links = EntryLinks {
            invoice_id: event.invoice_id.clone(),
            payment_id: Some(event.payment_id.clone()),
            expense_id: None,
            job_card_id: event.job_card_id.clone(),
        };
        entry.transaction_date = event.date;
        entry
    }
}

impl From<&ExpenseIncurred> for NewCashBookEntry {
    fn from(event: &ExpenseIncurred) -> Self {
        let category = event
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(category::EXPENSE);
        let mut entry = NewCashBookEntry::debit(&event.garage_id, category, event.amount, &event.description);
        entry.payment_method = event.method;
        entry.party_name = event.vendor_name.clone();
        entry.links.expense_id = Some(event.expense_id.clone());
        entry.transaction_date = event.date;
        entry
    }
}

impl From<&InvoicePaymentReceived> for NewCashBookEntry {
    fn from(event: &InvoicePaymentReceived) -> Self {
        let mut entry = NewCashBookEntry::credit(
            &event.garage_id,
            category::INVOICE_PAYMENT,
            event.amount,
            format!("Payment received for Invoice #{}", event.invoice_number),
        );
        entry.payment_method = event.method;
        entry.reference_number = Some(event.invoice_number.clone());
        entry.party_name = event.customer_name.clone();
        entry.links.invoice_id = Some(event.invoice_id.clone());
        entry.transaction_date = event.date;
        entry
    }
}

// =============================================================================
// Summaries
// =============================================================================

/// Credit and debit totals with their entry counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct LedgerTotals {
    pub credit: Money,
    pub debit: Money,
    pub net: Money,
    pub credit_count: i64,
    pub debit_count: i64,
}

impl LedgerTotals {
    pub fn new(credit: Money, debit: Money, credit_count: i64, debit_count: i64) -> Self {
        LedgerTotals {
            credit,
            debit,
            net: credit - debit,
            credit_count,
            debit_count,
        }
    }

    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a CashBookEntry>) -> Self {
        let mut totals = LedgerTotals::default();
        for entry in entries {
            match entry.details.transaction_type {
                TransactionType::Credit => {
                    totals.credit += entry.details.amount;
                    totals.credit_count += 1;
                }
                TransactionType::Debit => {
                    totals.debit += entry.details.amount;
                    totals.debit_count += 1;
                }
            }
        }
        totals.net = totals.credit - totals.debit;
        totals
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct CashBookSummary {
    pub garage_id: String,
    pub garage_name: String,
    /// Absent for all-time summaries.
    pub range: Option<DateRange>,
    pub totals: LedgerTotals,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn entries(specs: &[(TransactionType, i64)]) -> Vec<CashBookEntry> {
        let mut balance = Money::zero();
        specs
            .iter()
            .enumerate()
            .map(|(i, (ty, amount))| {
                let details = NewCashBookEntry::new("g1", *ty, "misc", Money::from_major(*amount), "entry")
                    .validate(today())
                    .unwrap();
                let entry = CashBookEntry::append(format!("e{i}"), "g1", details, i as i64 + 1, balance, now());
                balance = entry.running_balance();
                entry
            })
            .collect()
    }

    #[test]
    fn test_running_balance_is_prefix_sum() {
        use TransactionType::*;
        let list = entries(&[(Credit, 500), (Debit, 200), (Credit, 50)]);
        let balances: Vec<i64> = list.iter().map(|e| e.running_balance().major()).collect();
        assert_eq!(balances, vec![500, 300, 350]);
        assert_eq!(LedgerTotals::from_entries(&list).net, Money::from_major(350));
    }

    #[test]
    fn test_rebalance_after_correction() {
        use TransactionType::*;
        let mut list = entries(&[(Credit, 500), (Debit, 200), (Credit, 50)]);

        let corrected = NewCashBookEntry::debit("g1", "rent", Money::from_major(100), "rent")
            .validate(today())
            .unwrap();
        list[1].revise(corrected, now());
        let closing = rebalance(list[0].running_balance(), &mut list[1..]);

        assert_eq!(closing, Money::from_major(450));
        assert_eq!(list[1].running_balance(), Money::from_major(400));
        assert_eq!(list[1].details.category, "RENT");
    }

    #[test]
    fn test_validation() {
        let zero = NewCashBookEntry::credit("g1", "OTHER_INCOME", Money::zero(), "x");
        assert!(zero.validate(today()).is_err());

        let blank = NewCashBookEntry::credit("g1", "  ", Money::from_major(1), "x");
        assert!(blank.validate(today()).is_err());

        let no_desc = NewCashBookEntry::credit("g1", "OTHER_INCOME", Money::from_major(1), " ");
        assert!(no_desc.validate(today()).is_err());

        let ok = NewCashBookEntry::credit("g1", " lube_sale ", Money::from_major(1), "Oil")
            .validate(today())
            .unwrap();
        assert_eq!(ok.category, category::LUBE_SALE);
        assert_eq!(ok.transaction_date, today());
    }

    #[test]
    fn test_transaction_type_parsing() {
        assert_eq!("credit".parse::<TransactionType>().unwrap(), TransactionType::Credit);
        assert_eq!(" Debit ".parse::<TransactionType>().unwrap(), TransactionType::Debit);
        assert!("refund".parse::<TransactionType>().is_err());
    }

    #[test]
    fn test_event_entries() {
        let payment = PaymentReceived {
            garage_id: "g1".into(),
            payment_id: "p1".into(),
            amount: Money::from_major(80),
            description: "Wash".into(),
            party_name: None,
            method: Some(PaymentMethod::Upi),
            invoice_id: None,
            job_card_id: Some("jc1".into()),
            date: None,
        };
        let entry = NewCashBookEntry::from(&payment);
        assert_eq!(entry.category, category::SERVICE_PAYMENT);
        assert_eq!(entry.links.payment_id.as_deref(), Some("p1"));

        let expense = ExpenseIncurred {
            garage_id: "g1".into(),
            expense_id: "x1".into(),
            amount: Money::from_major(30),
            description: "Diesel".into(),
            category: Some("".into()),
            vendor_name: Some("Pump".into()),
            method: None,
            date: None,
        };
        let entry = NewCashBookEntry::from(&expense);
        assert_eq!(entry.transaction_type, TransactionType::Debit);
        assert_eq!(entry.category, category::EXPENSE);
        assert_eq!(entry.party_name.as_deref(), Some("Pump"));

        let invoice = InvoicePaymentReceived {
            garage_id: "g1".into(),
            invoice_id: "i1".into(),
            invoice_number: "INV-g1-20250301-0001".into(),
            amount: Money::from_major(100),
            customer_name: Some("Asha".into()),
            method: None,
            date: None,
        };
        let entry = NewCashBookEntry::from(&invoice);
        assert_eq!(entry.description, "Payment received for Invoice #INV-g1-20250301-0001");
        assert_eq!(entry.reference_number.as_deref(), Some("INV-g1-20250301-0001"));
    }
}
