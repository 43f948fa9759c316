//! # Expenses
//!
//! Money the garage spends. Every expense raises one DEBIT cash book entry,
//! written with it, and feeds the expense and cash flow reports.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::ledger::{category, NewCashBookEntry};
use crate::money::Money;
use crate::payment::{add_to_method, method_rows, MethodTotal, Payment};
use crate::summary::PeriodTotals;
use crate::types::{new_id, DateRange, PaymentMethod};
use crate::validation::{normalize_optional, validate_positive_amount, validate_required, ValidationResult};

// =============================================================================
// Category
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseCategory {
    Rent,
    Salary,
    Utilities,
    Maintenance,
    Inventory,
    Fuel,
    Tools,
    Marketing,
    Insurance,
    Tax,
    Other,
}

impl ExpenseCategory {
    pub const ALL: [ExpenseCategory; 11] = [
        ExpenseCategory::Rent,
        ExpenseCategory::Salary,
        ExpenseCategory::Utilities,
        ExpenseCategory::Maintenance,
        ExpenseCategory::Inventory,
        ExpenseCategory::Fuel,
        ExpenseCategory::Tools,
        ExpenseCategory::Marketing,
        ExpenseCategory::Insurance,
        ExpenseCategory::Tax,
        ExpenseCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::Rent => "RENT",
            ExpenseCategory::Salary => "SALARY",
            ExpenseCategory::Utilities => "UTILITIES",
            ExpenseCategory::Maintenance => "MAINTENANCE",
            ExpenseCategory::Inventory => "INVENTORY",
            ExpenseCategory::Fuel => "FUEL",
            ExpenseCategory::Tools => "TOOLS",
            ExpenseCategory::Marketing => "MARKETING",
            ExpenseCategory::Insurance => "INSURANCE",
            ExpenseCategory::Tax => "TAX",
            ExpenseCategory::Other => "OTHER",
        }
    }

    /// Cash book category of an expense in this category.
    pub fn ledger_category(&self) -> &'static str {
        match self {
            ExpenseCategory::Rent => category::RENT,
            ExpenseCategory::Salary => category::SALARY,
            ExpenseCategory::Utilities => category::UTILITIES,
            ExpenseCategory::Maintenance => category::MAINTENANCE,
            ExpenseCategory::Inventory => category::INVENTORY_PURCHASE,
            ExpenseCategory::Fuel => category::FUEL,
            ExpenseCategory::Tools => category::TOOLS,
            ExpenseCategory::Marketing => category::MARKETING,
            ExpenseCategory::Insurance => category::INSURANCE,
            ExpenseCategory::Tax => category::TAX,
            ExpenseCategory::Other => category::OTHER_EXPENSE,
        }
    }
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpenseCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        ExpenseCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "category".to_string(),
                allowed: ExpenseCategory::ALL.iter().map(|c| c.as_str().to_string()).collect(),
            })
    }
}

// =============================================================================
// Request
// =============================================================================

/// An expense as requested by a caller. Also the full replacement on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewExpense {
    pub garage_id: String,
    pub title: String,
    pub amount: Money,
    pub category: ExpenseCategory,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    #[serde(default)]
    pub vendor_name: Option<String>,
    #[serde(default)]
    pub receipt_number: Option<String>,
    /// Defaults to today.
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub date: Option<NaiveDate>,
}

impl NewExpense {
    pub fn new(garage_id: impl Into<String>, title: impl Into<String>, amount: Money, category: ExpenseCategory) -> Self {
        NewExpense {
            garage_id: garage_id.into(),
            title: title.into(),
            amount,
            category,
            description: None,
            method: None,
            vendor_name: None,
            receipt_number: None,
            date: None,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn paid_by(mut self, method: PaymentMethod) -> Self {
        self.method = Some(method);
        self
    }
}

// =============================================================================
// Expense
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Expense {
    pub id: String,
    pub garage_id: String,
    pub title: String,
    pub description: Option<String>,
    pub amount: Money,
    pub category: ExpenseCategory,
    pub method: Option<PaymentMethod>,
    pub vendor_name: Option<String>,
    pub receipt_number: Option<String>,
    #[ts(as = "String")]
    pub date: NaiveDate,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    pub fn record(request: &NewExpense, today: NaiveDate, now: DateTime<Utc>) -> ValidationResult<Expense> {
        validate_required("garage_id", &request.garage_id, 64)?;
        let mut expense = Expense {
            id: new_id(),
            garage_id: request.garage_id.trim().to_string(),
            title: String::new(),
            description: None,
            amount: Money::zero(),
            category: request.category,
            method: None,
            vendor_name: None,
            receipt_number: None,
            date: today,
            created_at: now,
            updated_at: now,
        };
        expense.apply(request, today)?;
        Ok(expense)
    }

    /// Replaces every field from `request`. The garage cannot change; an
    /// absent date keeps the current one.
    pub fn revise(&mut self, request: &NewExpense, now: DateTime<Utc>) -> CoreResult<()> {
        if request.garage_id.trim() != self.garage_id {
            return Err(CoreError::mismatch("Expense", &self.id, "garage", request.garage_id.trim()));
        }
        let date = self.date;
        self.apply(request, date)?;
        self.updated_at = now;
        Ok(())
    }

    fn apply(&mut self, request: &NewExpense, default_date: NaiveDate) -> ValidationResult<()> {
        let title = validate_required("title", &request.title, 200)?;
        validate_positive_amount("amount", request.amount)?;

        self.title = title;
        self.description = normalize_optional(request.description.clone());
        self.amount = request.amount;
        self.category = request.category;
        self.method = request.method;
        self.vendor_name = normalize_optional(request.vendor_name.clone());
        self.receipt_number = normalize_optional(request.receipt_number.clone());
        self.date = request.date.unwrap_or(default_date);
        Ok(())
    }

    /// The DEBIT entry this expense raises.
    pub fn ledger_entry(&self) -> NewCashBookEntry {
        let mut entry =
            NewCashBookEntry::debit(&self.garage_id, self.category.ledger_category(), self.amount, &self.title);
        entry.payment_method = self.method;
        entry.reference_number = self.receipt_number.clone();
        entry.party_name = self.vendor_name.clone();
        entry.links.expense_id = Some(self.id.clone());
        entry.transaction_date = Some(self.date);
        entry.notes = self.description.clone();
        entry
    }
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct CategoryTotal {
    pub category: ExpenseCategory,
    pub amount: Money,
    pub count: i64,
}

/// Spending from expense records, by period, category and method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct ExpenseReport {
    pub garage_id: String,
    pub garage_name: String,
    /// Absent for all-time reports.
    pub range: Option<DateRange>,
    pub total: Money,
    pub transactions: i64,
    pub today_transactions: i64,
    pub periods: PeriodTotals,
    /// Every category, zero rows included.
    pub by_category: Vec<CategoryTotal>,
    /// Every method, zero rows included. Expenses without a method are
    /// counted only in the totals.
    pub by_method: Vec<MethodTotal>,
}

impl ExpenseReport {
    /// Reports `expenses` as of `today`, restricted to expenses dated in
    /// `range` when one is given. Every figure honours the range.
    pub fn compute(
        garage_id: &str,
        garage_name: &str,
        expenses: &[Expense],
        today: NaiveDate,
        range: Option<DateRange>,
    ) -> ExpenseReport {
        let mut report = ExpenseReport {
            garage_id: garage_id.to_string(),
            garage_name: garage_name.to_string(),
            range,
            total: Money::zero(),
            transactions: 0,
            today_transactions: 0,
            periods: PeriodTotals::default(),
            by_category: ExpenseCategory::ALL
                .into_iter()
                .map(|category| CategoryTotal {
                    category,
                    amount: Money::zero(),
                    count: 0,
                })
                .collect(),
            by_method: method_rows(),
        };

        let selected = expenses
            .iter()
            .filter(|e| e.garage_id == garage_id)
            .filter(|e| range.map_or(true, |r| r.contains(e.date)));

        for expense in selected {
            report.total += expense.amount;
            report.transactions += 1;
            if expense.date == today {
                report.today_transactions += 1;
            }
            report.periods.add(expense.date, today, expense.amount);

            if let Some(row) = report.by_category.iter_mut().find(|r| r.category == expense.category) {
                row.amount += expense.amount;
                row.count += 1;
            }
            if let Some(method) = expense.method {
                add_to_method(&mut report.by_method, method, expense.amount);
            }
        }
        report
    }

    pub fn for_category(&self, category: ExpenseCategory) -> Money {
        self.by_category
            .iter()
            .find(|r| r.category == category)
            .map_or(Money::zero(), |r| r.amount)
    }
}

/// Income from payment records against expense records.
///
/// Invoice payments and manual cash book entries are not part of it; the
/// cash book summary covers the whole ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct CashFlowReport {
    pub garage_id: String,
    pub garage_name: String,
    pub range: Option<DateRange>,
    pub income: PeriodTotals,
    pub income_total: Money,
    pub income_transactions: i64,
    pub expenses: PeriodTotals,
    pub expense_total: Money,
    pub expense_transactions: i64,
    /// `income_total − expense_total`.
    pub net: Money,
}

impl CashFlowReport {
    pub fn compute(
        garage_id: &str,
        garage_name: &str,
        payments: &[Payment],
        expenses: &[Expense],
        today: NaiveDate,
        range: Option<DateRange>,
    ) -> CashFlowReport {
        let mut report = CashFlowReport {
            garage_id: garage_id.to_string(),
            garage_name: garage_name.to_string(),
            range,
            income: PeriodTotals::default(),
            income_total: Money::zero(),
            income_transactions: 0,
            expenses: PeriodTotals::default(),
            expense_total: Money::zero(),
            expense_transactions: 0,
            net: Money::zero(),
        };
        let in_range = |date: NaiveDate| range.map_or(true, |r| r.contains(date));

        for payment in payments.iter().filter(|p| p.garage_id == garage_id && in_range(p.date)) {
            report.income_total += payment.amount;
            report.income_transactions += 1;
            report.income.add(payment.date, today, payment.amount);
        }
        for expense in expenses.iter().filter(|e| e.garage_id == garage_id && in_range(e.date)) {
            report.expense_total += expense.amount;
            report.expense_transactions += 1;
            report.expenses.add(expense.date, today, expense.amount);
        }
        report.net = report.income_total - report.expense_total;
        report
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TransactionType;
    use crate::payment::{NewPayment, PaymentType};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-10T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn expense(title: &str, amount: i64, category: ExpenseCategory, date: NaiveDate) -> Expense {
        let request = NewExpense::new("g1", title, Money::from_major(amount), category).on(date);
        Expense::record(&request, day(10), now()).unwrap()
    }

    #[test]
    fn test_record_validates() {
        let blank = NewExpense::new("g1", "  ", Money::from_major(10), ExpenseCategory::Fuel);
        assert!(matches!(
            Expense::record(&blank, day(10), now()),
            Err(ValidationError::Required { .. })
        ));

        let free = NewExpense::new("g1", "Diesel", Money::zero(), ExpenseCategory::Fuel);
        assert!(Expense::record(&free, day(10), now()).is_err());

        let ok = Expense::record(
            &NewExpense::new("g1", " Diesel ", Money::from_major(30), ExpenseCategory::Fuel),
            day(10),
            now(),
        )
        .unwrap();
        assert_eq!(ok.title, "Diesel");
        assert_eq!(ok.date, day(10));
    }

    #[test]
    fn test_ledger_entry() {
        let mut rent = expense("March rent", 200, ExpenseCategory::Rent, day(1));
        rent.vendor_name = Some("Landlord".into());
        let entry = rent.ledger_entry();
        assert_eq!(entry.transaction_type, TransactionType::Debit);
        assert_eq!(entry.category, category::RENT);
        assert_eq!(entry.party_name.as_deref(), Some("Landlord"));
        assert_eq!(entry.links.expense_id.as_deref(), Some(rent.id.as_str()));

        let stock = expense("Brake pads", 90, ExpenseCategory::Inventory, day(2));
        assert_eq!(stock.ledger_entry().category, category::INVENTORY_PURCHASE);
    }

    #[test]
    fn test_revise_rejects_other_garage() {
        let mut fuel = expense("Diesel", 30, ExpenseCategory::Fuel, day(2));
        let moved = NewExpense::new("g2", "Diesel", Money::from_major(30), ExpenseCategory::Fuel);
        assert!(matches!(fuel.revise(&moved, now()), Err(CoreError::Mismatch { .. })));

        let bigger = NewExpense::new("g1", "Diesel", Money::from_major(45), ExpenseCategory::Fuel);
        fuel.revise(&bigger, now()).unwrap();
        assert_eq!(fuel.amount, Money::from_major(45));
        assert_eq!(fuel.date, day(2));
    }

    #[test]
    fn test_expense_report() {
        let mut fuel = expense("Diesel", 30, ExpenseCategory::Fuel, day(10));
        fuel.method = Some(PaymentMethod::Cash);
        let expenses = vec![
            fuel,
            expense("Rent", 200, ExpenseCategory::Rent, day(1)),
            expense("Rent", 200, ExpenseCategory::Rent, NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()),
        ];

        let report = ExpenseReport::compute("g1", "Main", &expenses, day(10), None);
        assert_eq!(report.total, Money::from_major(430));
        assert_eq!(report.transactions, 3);
        assert_eq!(report.today_transactions, 1);
        assert_eq!(report.for_category(ExpenseCategory::Rent), Money::from_major(400));
        assert_eq!(report.for_category(ExpenseCategory::Tax), Money::zero());
        assert_eq!(report.periods.month_to_date, Money::from_major(230));
        assert_eq!(report.by_category.len(), ExpenseCategory::ALL.len());

        let range = DateRange::month(2025, 3).unwrap();
        let march = ExpenseReport::compute("g1", "Main", &expenses, day(10), Some(range));
        assert_eq!(march.for_category(ExpenseCategory::Rent), Money::from_major(200));
    }

    #[test]
    fn test_cash_flow() {
        let payments = vec![Payment::record(
            &NewPayment::new("g1", Money::from_major(500), PaymentMethod::Upi, PaymentType::Service).on(day(10)),
            day(10),
            now(),
        )
        .unwrap()];
        let expenses = vec![
            expense("Rent", 200, ExpenseCategory::Rent, day(1)),
            expense("Diesel", 30, ExpenseCategory::Fuel, day(10)),
        ];

        let flow = CashFlowReport::compute("g1", "Main", &payments, &expenses, day(10), None);
        assert_eq!(flow.income_total, Money::from_major(500));
        assert_eq!(flow.expense_total, Money::from_major(230));
        assert_eq!(flow.net, Money::from_major(270));
        assert_eq!(flow.expenses.today, Money::from_major(30));

        let today_only = CashFlowReport::compute("g1", "Main", &payments, &expenses, day(10), Some(DateRange::single(day(10))));
        assert_eq!(today_only.net, Money::from_major(470));
        assert_eq!(today_only.expense_transactions, 1);
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!(" fuel ".parse::<ExpenseCategory>().unwrap(), ExpenseCategory::Fuel);
        assert!("snacks".parse::<ExpenseCategory>().is_err());
    }
}
