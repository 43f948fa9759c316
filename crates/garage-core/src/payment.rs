//! # Payments
//!
//! Money received outside the invoice flow: counter sales of parts and
//! lubricants, walk-in services, anything not billed on an invoice. Every
//! payment raises one CREDIT cash book entry, written with it.
//!
//! ```text
//! NewPayment ──validate──► Payment ──ledger_entry()──► NewCashBookEntry
//!                             │                          CREDIT, category by type,
//!                             │                          links.payment_id = id
//!                             ▼
//!                     RevenueReport::compute(&[Payment], today, range)
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::ledger::{category, EntryLinks, NewCashBookEntry};
use crate::money::Money;
use crate::summary::PeriodTotals;
use crate::types::{new_id, DateRange, PaymentMethod};
use crate::validation::{normalize_optional, validate_positive_amount, validate_required, ValidationResult};

// =============================================================================
// Payment Type
// =============================================================================

/// What a payment was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Service,
    SparePart,
    Lube,
    Other,
}

impl PaymentType {
    pub const ALL: [PaymentType; 4] = [
        PaymentType::Service,
        PaymentType::SparePart,
        PaymentType::Lube,
        PaymentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Service => "SERVICE",
            PaymentType::SparePart => "SPARE_PART",
            PaymentType::Lube => "LUBE",
            PaymentType::Other => "OTHER",
        }
    }

    /// Cash book category of a payment of this type.
    pub fn ledger_category(&self) -> &'static str {
        match self {
            PaymentType::Service => category::SERVICE_PAYMENT,
            PaymentType::SparePart => category::SPARE_PART_SALE,
            PaymentType::Lube => category::LUBE_SALE,
            PaymentType::Other => category::OTHER_INCOME,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            PaymentType::Service => "Service payment",
            PaymentType::SparePart => "Spare part sale",
            PaymentType::Lube => "Lube sale",
            PaymentType::Other => "Other income",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentType {
    type Err = ValidationError;

    /// Case-insensitive; `spare part` and `spare-part` are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace([' ', '-'], "_");
        PaymentType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "payment_type".to_string(),
                allowed: PaymentType::ALL.iter().map(|t| t.as_str().to_string()).collect(),
            })
    }
}

// =============================================================================
// Request
// =============================================================================

/// A payment as requested by a caller. Also the full replacement on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewPayment {
    pub garage_id: String,
    pub amount: Money,
    pub method: PaymentMethod,
    pub payment_type: PaymentType,
    #[serde(default)]
    pub job_card_id: Option<String>,
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub vehicle_number: Option<String>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    /// Defaults to today.
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub date: Option<NaiveDate>,
}

impl NewPayment {
    pub fn new(garage_id: impl Into<String>, amount: Money, method: PaymentMethod, payment_type: PaymentType) -> Self {
        NewPayment {
            garage_id: garage_id.into(),
            amount,
            method,
            payment_type,
            job_card_id: None,
            invoice_id: None,
            description: None,
            customer_name: None,
            customer_phone: None,
            vehicle_number: None,
            invoice_number: None,
            date: None,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn for_job_card(mut self, job_card_id: impl Into<String>) -> Self {
        self.job_card_id = Some(job_card_id.into());
        self
    }

    pub fn validate(&self) -> ValidationResult<()> {
        validate_required("garage_id", &self.garage_id, 64)?;
        validate_positive_amount("amount", self.amount)?;
        if let Some(description) = &self.description {
            if description.len() > 500 {
                return Err(ValidationError::TooLong {
                    field: "description".to_string(),
                    max: 500,
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Payment
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub garage_id: String,
    pub job_card_id: Option<String>,
    pub invoice_id: Option<String>,
    pub amount: Money,
    pub method: PaymentMethod,
    pub payment_type: PaymentType,
    pub description: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub vehicle_number: Option<String>,
    pub invoice_number: Option<String>,
    #[ts(as = "String")]
    pub date: NaiveDate,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Validates `request` into a new payment dated `today` unless it names a date.
    pub fn record(request: &NewPayment, today: NaiveDate, now: DateTime<Utc>) -> ValidationResult<Payment> {
        request.validate()?;
        let mut payment = Payment {
            id: new_id(),
            garage_id: request.garage_id.trim().to_string(),
            job_card_id: None,
            invoice_id: None,
            amount: Money::zero(),
            method: request.method,
            payment_type: request.payment_type,
            description: None,
            customer_name: None,
            customer_phone: None,
            vehicle_number: None,
            invoice_number: None,
            date: today,
            created_at: now,
            updated_at: now,
        };
        payment.apply(request, today);
        Ok(payment)
    }

    /// Replaces every field from `request`. The garage cannot change; an
    /// absent date keeps the current one.
    pub fn revise(&mut self, request: &NewPayment, now: DateTime<Utc>) -> CoreResult<()> {
        request.validate()?;
        if request.garage_id.trim() != self.garage_id {
            return Err(CoreError::mismatch("Payment", &self.id, "garage", request.garage_id.trim()));
        }
        let date = self.date;
        self.apply(request, date);
        self.updated_at = now;
        Ok(())
    }

    fn apply(&mut self, request: &NewPayment, default_date: NaiveDate) {
        self.job_card_id = normalize_optional(request.job_card_id.clone());
        self.invoice_id = normalize_optional(request.invoice_id.clone());
        self.amount = request.amount;
        self.method = request.method;
        self.payment_type = request.payment_type;
        self.description = normalize_optional(request.description.clone());
        self.customer_name = normalize_optional(request.customer_name.clone());
        self.customer_phone = normalize_optional(request.customer_phone.clone());
        self.vehicle_number = normalize_optional(request.vehicle_number.clone()).map(|v| v.to_uppercase());
        self.invoice_number = normalize_optional(request.invoice_number.clone());
        self.date = request.date.unwrap_or(default_date);
    }

    /// The CREDIT entry this payment raises. Invoice-linked payments are
    /// booked as INVOICE_PAYMENT, the rest by payment type.
    pub fn ledger_entry(&self) -> NewCashBookEntry {
        let category = if self.invoice_id.is_some() {
            category::INVOICE_PAYMENT
        } else {
            self.payment_type.ledger_category()
        };
        let description = self
            .description
            .clone()
            .unwrap_or_else(|| self.payment_type.label().to_string());

        let mut entry = NewCashBookEntry::credit(&self.garage_id, category, self.amount, description);
        entry.payment_method = Some(self.method);
        entry.reference_number = self.invoice_number.clone();
        entry.party_name = self.customer_name.clone();
        entry.party_phone = self.customer_phone.clone();
        entry.links = EntryLinks {
            invoice_id: self.invoice_id.clone(),
            payment_id: Some(self.id.clone()),
            expense_id: None,
            job_card_id: self.job_card_id.clone(),
        };
        entry.transaction_date = Some(self.date);
        entry
    }
}

// =============================================================================
// Breakdowns
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct TypeTotal {
    pub payment_type: PaymentType,
    pub amount: Money,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct MethodTotal {
    pub method: PaymentMethod,
    pub amount: Money,
    pub count: i64,
}

/// One zeroed row per payment method, in [`PaymentMethod::ALL`] order.
pub(crate) fn method_rows() -> Vec<MethodTotal> {
    PaymentMethod::ALL
        .into_iter()
        .map(|method| MethodTotal {
            method,
            amount: Money::zero(),
            count: 0,
        })
        .collect()
}

pub(crate) fn add_to_method(rows: &mut [MethodTotal], method: PaymentMethod, amount: Money) {
    if let Some(row) = rows.iter_mut().find(|r| r.method == method) {
        row.amount += amount;
        row.count += 1;
    }
}

// =============================================================================
// Revenue Report
// =============================================================================

/// Revenue from payment records, by period, type and method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct RevenueReport {
    pub garage_id: String,
    pub garage_name: String,
    /// Absent for all-time reports.
    pub range: Option<DateRange>,
    pub total: Money,
    pub transactions: i64,
    pub today_transactions: i64,
    pub periods: PeriodTotals,
    /// Every type, zero rows included.
    pub by_type: Vec<TypeTotal>,
    /// Every method, zero rows included.
    pub by_method: Vec<MethodTotal>,
}

impl RevenueReport {
    /// Reports `payments` as of `today`, restricted to payments dated in
    /// `range` when one is given. Every figure honours the range.
    pub fn compute(
        garage_id: &str,
        garage_name: &str,
        payments: &[Payment],
        today: NaiveDate,
        range: Option<DateRange>,
    ) -> RevenueReport {
        let mut report = RevenueReport {
            garage_id: garage_id.to_string(),
            garage_name: garage_name.to_string(),
            range,
            total: Money::zero(),
            transactions: 0,
            today_transactions: 0,
            periods: PeriodTotals::default(),
            by_type: PaymentType::ALL
                .into_iter()
                .map(|payment_type| TypeTotal {
                    payment_type,
                    amount: Money::zero(),
                    count: 0,
                })
                .collect(),
            by_method: method_rows(),
        };

        let selected = payments
            .iter()
            .filter(|p| p.garage_id == garage_id)
            .filter(|p| range.map_or(true, |r| r.contains(p.date)));

        for payment in selected {
            report.total += payment.amount;
            report.transactions += 1;
            if payment.date == today {
                report.today_transactions += 1;
            }
            report.periods.add(payment.date, today, payment.amount);

            if let Some(row) = report.by_type.iter_mut().find(|r| r.payment_type == payment.payment_type) {
                row.amount += payment.amount;
                row.count += 1;
            }
            add_to_method(&mut report.by_method, payment.method, payment.amount);
        }
        report
    }

    pub fn for_type(&self, payment_type: PaymentType) -> Money {
        self.by_type
            .iter()
            .find(|r| r.payment_type == payment_type)
            .map_or(Money::zero(), |r| r.amount)
    }

    pub fn for_method(&self, method: PaymentMethod) -> Money {
        self.by_method
            .iter()
            .find(|r| r.method == method)
            .map_or(Money::zero(), |r| r.amount)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
