//! # Invoices
//!
//! The invoice aggregate and its payment arithmetic.
//!
//! ## Two Statuses
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  status (workflow, set by callers and payments)                         │
//! │    DRAFT ─► SENT ─► PARTIALLY_PAID ─► PAID        OVERDUE   CANCELLED   │
//! │                                                                         │
//! │  payment_status (derived, never set)                                    │
//! │    paid == 0          → UNPAID                                          │
//! │    paid >= total      → PAID      (due forced to 0)                     │
//! │    otherwise          → PARTIAL                                         │
//! │                                                                         │
//! │  subtotal = Σ item.total                                                │
//! │  total    = subtotal − discount + tax                                   │
//! │  due      = max(0, total − paid)                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! PAID and PARTIALLY_PAID are reachable only through [`Invoice::add_payment`]
//! and [`Invoice::mark_paid`].

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::job_card::JobCard;
use crate::line_item::{ItemKind, LineAmounts, LineItem, LineItemSpec};
use crate::money::{Money, Rate};
use crate::numbering::InvoiceNumber;
use crate::types::{new_id, CustomerDetails, PaymentMethod, VehicleSnapshot};
use crate::validation::{
    normalize_optional, validate_due_days, validate_optional_non_negative, validate_positive_amount,
    validate_rate, validate_required, ValidationResult,
};
use crate::{LABOUR_ITEM_DESCRIPTION, LABOUR_ITEM_NAME, MAX_LINE_ITEMS};

// =============================================================================
// Statuses
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    PartiallyPaid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 6] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::Paid,
        InvoiceStatus::PartiallyPaid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Sent => "SENT",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::PartiallyPaid => "PARTIALLY_PAID",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }

    /// Statuses that only payments may set.
    pub fn is_payment_driven(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::PartiallyPaid)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace([' ', '-'], "_");
        InvoiceStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == normalized)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: InvoiceStatus::ALL.iter().map(|st| st.as_str().to_string()).collect(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 3] = [PaymentStatus::Unpaid, PaymentStatus::Partial, PaymentStatus::Paid];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Partial => "PARTIAL",
            PaymentStatus::Paid => "PAID",
        }
    }

    /// Derives the payment status and the amount still due.
    pub fn derive(total: Money, paid: Money) -> (PaymentStatus, Money) {
        if paid.is_zero() {
            (PaymentStatus::Unpaid, (total - paid).floor_zero())
        } else if paid >= total {
            (PaymentStatus::Paid, Money::zero())
        } else {
            (PaymentStatus::Partial, total - paid)
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        PaymentStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == normalized)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "payment_status".to_string(),
                allowed: PaymentStatus::ALL.iter().map(|st| st.as_str().to_string()).collect(),
            })
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Customer snapshot held by an invoice. Unlike a job card, the name is
/// required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceCustomer {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl InvoiceCustomer {
    pub fn named(name: impl Into<String>) -> Self {
        InvoiceCustomer {
            name: name.into(),
            ..Default::default()
        }
    }

    fn validated(&self) -> ValidationResult<InvoiceCustomer> {
        Ok(InvoiceCustomer {
            name: validate_required("customer_name", &self.name, 200)?,
            phone: normalize_optional(self.phone.clone()),
            email: normalize_optional(self.email.clone()),
            address: normalize_optional(self.address.clone()),
        })
    }
}

impl From<&CustomerDetails> for InvoiceCustomer {
    fn from(customer: &CustomerDetails) -> Self {
        InvoiceCustomer {
            name: customer.name.clone().unwrap_or_default(),
            phone: customer.phone.clone(),
            email: customer.email.clone(),
            address: customer.address.clone(),
        }
    }
}

/// A standalone invoice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewInvoice {
    pub garage_id: String,
    #[serde(default)]
    pub job_card_id: Option<String>,
    pub customer: InvoiceCustomer,
    #[serde(default)]
    pub vehicle: VehicleSnapshot,
    #[serde(default)]
    pub items: Vec<LineItemSpec>,
    #[serde(default)]
    pub discount: Option<Money>,
    #[serde(default)]
    pub discount_rate: Option<Rate>,
    #[serde(default)]
    pub tax: Option<Money>,
    #[serde(default)]
    pub tax_rate: Option<Rate>,
    /// Defaults to today.
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub invoice_date: Option<NaiveDate>,
    /// Wins over `due_days`.
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_days: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub terms: Option<String>,
}

/// Partial edit of an invoice. `items`, when present, replaces every line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceUpdate {
    #[serde(default)]
    pub customer: Option<InvoiceCustomer>,
    #[serde(default)]
    pub vehicle: Option<VehicleSnapshot>,
    #[serde(default)]
    pub items: Option<Vec<LineItemSpec>>,
    #[serde(default)]
    pub discount: Option<Money>,
    #[serde(default)]
    pub discount_rate: Option<Rate>,
    #[serde(default)]
    pub tax: Option<Money>,
    #[serde(default)]
    pub tax_rate: Option<Rate>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub invoice_date: Option<NaiveDate>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub terms: Option<String>,
}

/// Overrides when billing a job card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FromJobCardOptions {
    /// Replaces the job card's discount when given.
    #[serde(default)]
    pub discount: Option<Money>,
    /// Recorded on the invoice; the tax amount comes from the job card.
    #[serde(default)]
    pub tax_rate: Option<Rate>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub terms: Option<String>,
    #[serde(default)]
    pub due_days: Option<u32>,
}

impl FromJobCardOptions {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_optional_non_negative("discount", self.discount)?;
        if let Some(rate) = self.tax_rate {
            validate_rate("tax_rate", rate)?;
        }
        if let Some(days) = self.due_days {
            validate_due_days(days)?;
        }
        Ok(())
    }
}

impl From<&crate::job_card::CompleteJobCard> for FromJobCardOptions {
    fn from(request: &crate::job_card::CompleteJobCard) -> Self {
        FromJobCardOptions {
            discount: request.invoice_discount,
            tax_rate: request.invoice_tax_rate,
            notes: request.invoice_notes.clone(),
            terms: request.terms.clone(),
            due_days: request.due_days,
        }
    }
}

/// A payment against an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentRequest {
    pub amount: Money,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    /// Defaults to today.
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

impl PaymentRequest {
    pub fn new(amount: Money) -> Self {
        PaymentRequest {
            amount,
            method: None,
            date: None,
            description: None,
            reference: None,
        }
    }

    pub fn with_method(mut self, method: PaymentMethod) -> Self {
        self.method = Some(method);
        self
    }
}

/// What a successful payment did to an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct PaymentApplied {
    pub invoice_id: String,
    pub invoice_number: String,
    pub amount: Money,
    pub method: Option<PaymentMethod>,
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub customer_name: String,
    pub payment_status: PaymentStatus,
    pub due: Money,
}

// =============================================================================
// Invoice
// =============================================================================

/// Stored, non-derived state of an invoice.
#[derive(Debug, Clone)]
pub struct InvoiceParts {
    pub id: String,
    pub invoice_number: String,
    pub garage_id: String,
    pub job_card_id: Option<String>,
    pub customer: InvoiceCustomer,
    pub vehicle: VehicleSnapshot,
    pub discount: Money,
    pub discount_rate: Rate,
    pub tax: Money,
    pub tax_rate: Rate,
    pub paid: Money,
    pub status: InvoiceStatus,
    pub invoice_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub paid_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    pub garage_id: String,
    pub job_card_id: Option<String>,
    pub customer: InvoiceCustomer,
    pub vehicle: VehicleSnapshot,
    items: Vec<LineItem>,
    subtotal: Money,
    discount: Money,
    discount_rate: Rate,
    tax: Money,
    tax_rate: Rate,
    total: Money,
    paid: Money,
    due: Money,
    status: InvoiceStatus,
    payment_status: PaymentStatus,
    #[ts(as = "String")]
    pub invoice_date: NaiveDate,
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    paid_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    version: i64,
}

impl Invoice {
    /// Builds a DRAFT invoice from a standalone request.
    pub fn draft(
        number: &InvoiceNumber,
        request: &NewInvoice,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> CoreResult<Invoice> {
        let customer = request.customer.validated()?;
        for spec in &request.items {
            spec.validate()?;
        }
        ensure_capacity(request.items.len())?;
        validate_adjustments(request.discount, request.discount_rate, request.tax, request.tax_rate)?;
        if let Some(days) = request.due_days {
            validate_due_days(days)?;
        }

        let items = build_items(&request.items, now)?;
        let invoice_date = request.invoice_date.unwrap_or(today);
        let due_date = request
            .due_date
            .or_else(|| request.due_days.map(|d| invoice_date + Duration::days(d as i64)));

        let mut invoice = Invoice::empty(number, &request.garage_id, customer, now);
        invoice.job_card_id = request.job_card_id.clone();
        invoice.vehicle = request.vehicle.clone();
        invoice.items = items;
        invoice.invoice_date = invoice_date;
        invoice.due_date = due_date;
        invoice.notes = normalize_optional(request.notes.clone());
        invoice.terms = normalize_optional(request.terms.clone());
        invoice.recalculate();

        invoice.discount = request.discount.unwrap_or_default();
        invoice.discount_rate = request.discount_rate.unwrap_or_default();
        invoice.tax = request.tax.unwrap_or_default();
        invoice.tax_rate = request.tax_rate.unwrap_or_default();
        invoice.recalculate();
        Ok(invoice)
    }

    /// Bills a job card in any status as a DRAFT.
    pub fn from_job_card(
        number: &InvoiceNumber,
        card: &JobCard,
        options: &FromJobCardOptions,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> CoreResult<Invoice> {
        Invoice::bill(number, card, options, InvoiceStatus::Draft, today, now)
    }

    /// Bills a COMPLETED job card as a SENT invoice.
    pub fn from_completed_job_card(
        number: &InvoiceNumber,
        card: &JobCard,
        options: &FromJobCardOptions,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> CoreResult<Invoice> {
        if !card.is_completed() {
            return Err(CoreError::JobCardNotCompleted { id: card.id.clone() });
        }
        Invoice::bill(number, card, options, InvoiceStatus::Sent, today, now)
    }

    fn bill(
        number: &InvoiceNumber,
        card: &JobCard,
        options: &FromJobCardOptions,
        status: InvoiceStatus,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> CoreResult<Invoice> {
        options.validate()?;
        let customer = InvoiceCustomer::from(&card.customer).validated()?;

        let mut items: Vec<LineItem> = card.items().iter().map(|i| i.copy_as(new_id(), now)).collect();
        if card.labour().is_positive() {
            items.push(LineItem {
                id: new_id(),
                kind: ItemKind::Labour,
                name: LABOUR_ITEM_NAME.to_string(),
                code: None,
                description: Some(LABOUR_ITEM_DESCRIPTION.to_string()),
                amounts: LineAmounts::flat(card.labour()),
                stock: None,
                created_at: now,
            });
        }
        ensure_capacity(items.len())?;

        let mut invoice = Invoice::empty(number, &card.garage_id, customer, now);
        invoice.job_card_id = Some(card.id.clone());
        invoice.vehicle = VehicleSnapshot::from(&card.vehicle);
        invoice.items = items;
        invoice.discount = options.discount.unwrap_or(card.discount());
        invoice.tax = card.tax();
        invoice.tax_rate = options.tax_rate.unwrap_or_default();
        invoice.status = status;
        invoice.invoice_date = today;
        invoice.due_date = options.due_days.map(|d| today + Duration::days(d as i64));
        invoice.notes = normalize_optional(options.notes.clone());
        invoice.terms = normalize_optional(options.terms.clone());
        invoice.recalculate();
        Ok(invoice)
    }

    fn empty(number: &InvoiceNumber, garage_id: &str, customer: InvoiceCustomer, now: DateTime<Utc>) -> Invoice {
        Invoice {
            id: new_id(),
            invoice_number: number.to_string(),
            garage_id: garage_id.to_string(),
            job_card_id: None,
            customer,
            vehicle: VehicleSnapshot::default(),
            items: Vec::new(),
            subtotal: Money::zero(),
            discount: Money::zero(),
            discount_rate: Rate::zero(),
            tax: Money::zero(),
            tax_rate: Rate::zero(),
            total: Money::zero(),
            paid: Money::zero(),
            due: Money::zero(),
            status: InvoiceStatus::Draft,
            payment_status: PaymentStatus::Unpaid,
            invoice_date: now.date_naive(),
            due_date: None,
            paid_date: None,
            notes: None,
            terms: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Rebuilds an invoice from storage, recomputing every derived field.
    pub fn restore(parts: InvoiceParts, items: Vec<LineItem>) -> Invoice {
        let mut invoice = Invoice {
            id: parts.id,
            invoice_number: parts.invoice_number,
            garage_id: parts.garage_id,
            job_card_id: parts.job_card_id,
            customer: parts.customer,
            vehicle: parts.vehicle,
            items,
            subtotal: Money::zero(),
            discount: parts.discount,
            discount_rate: parts.discount_rate,
            tax: parts.tax,
            tax_rate: parts.tax_rate,
            total: Money::zero(),
            paid: parts.paid,
            due: Money::zero(),
            status: parts.status,
            payment_status: PaymentStatus::Unpaid,
            invoice_date: parts.invoice_date,
            due_date: parts.due_date,
            paid_date: parts.paid_date,
            notes: parts.notes,
            terms: parts.terms,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            version: parts.version,
        };
        invoice.recalculate();
        invoice
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn discount_rate(&self) -> Rate {
        self.discount_rate
    }

    pub fn tax(&self) -> Money {
        self.tax
    }

    pub fn tax_rate(&self) -> Rate {
        self.tax_rate
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn paid(&self) -> Money {
        self.paid
    }

    pub fn due(&self) -> Money {
        self.due
    }

    /// Amount received beyond the total.
    pub fn overpaid(&self) -> Money {
        (self.paid - self.total).floor_zero()
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn paid_date(&self) -> Option<NaiveDate> {
        self.paid_date
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// Past its due date and not fully paid.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.payment_status != PaymentStatus::Paid && self.due_date.is_some_and(|d| d < today)
    }

    // -------------------------------------------------------------------------
    // Edits
    // -------------------------------------------------------------------------

    /// Applies a partial edit. Rates are recorded as given and never turned
    /// into amounts. Cancelled invoices are closed to edits.
    pub fn apply_update(&mut self, update: &InvoiceUpdate, now: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_not_cancelled()?;
        let customer = match &update.customer {
            Some(customer) => Some(customer.validated()?),
            None => None,
        };
        validate_adjustments(update.discount, update.discount_rate, update.tax, update.tax_rate)?;
        let items = match &update.items {
            Some(specs) => {
                for spec in specs {
                    spec.validate()?;
                }
                ensure_capacity(specs.len())?;
                Some(build_items(specs, now)?)
            }
            None => None,
        };

        if let Some(customer) = customer {
            self.customer = customer;
        }
        if let Some(vehicle) = &update.vehicle {
            self.vehicle = vehicle.clone();
        }
        if let Some(items) = items {
            self.items = items;
        }
        if let Some(discount) = update.discount {
            self.discount = discount;
        }
        if let Some(rate) = update.discount_rate {
            self.discount_rate = rate;
        }
        if let Some(tax) = update.tax {
            self.tax = tax;
        }
        if let Some(rate) = update.tax_rate {
            self.tax_rate = rate;
        }
        if let Some(date) = update.invoice_date {
            self.invoice_date = date;
        }
        if update.due_date.is_some() {
            self.due_date = update.due_date;
        }
        if update.notes.is_some() {
            self.notes = normalize_optional(update.notes.clone());
        }
        if update.terms.is_some() {
            self.terms = normalize_optional(update.terms.clone());
        }

        self.recalculate();
        if self.status == InvoiceStatus::Paid && self.paid_date.is_none() {
            self.paid_date = Some(now.date_naive());
        }
        self.updated_at = now;
        Ok(())
    }

    /// Direct workflow status change. Totals are untouched.
    pub fn set_status(&mut self, status: InvoiceStatus, now: DateTime<Utc>) -> CoreResult<()> {
        if status.is_payment_driven() {
            return Err(ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: InvoiceStatus::ALL
                    .iter()
                    .filter(|s| !s.is_payment_driven())
                    .map(|s| s.as_str().to_string())
                    .collect(),
            }
            .into());
        }
        self.status = status;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_sent(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.set_status(InvoiceStatus::Sent, now)
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.set_status(InvoiceStatus::Cancelled, now)
    }

    /// Settles the invoice in full. Returns `false` when it already was PAID,
    /// in which case nothing changes.
    pub fn mark_paid(&mut self, today: NaiveDate, now: DateTime<Utc>) -> CoreResult<bool> {
        self.ensure_not_cancelled()?;
        if self.status == InvoiceStatus::Paid && self.payment_status == PaymentStatus::Paid {
            return Ok(false);
        }
        if self.paid < self.total {
            self.paid = self.total;
        }
        self.status = InvoiceStatus::Paid;
        self.paid_date = self.paid_date.or(Some(today));
        self.recalculate();
        self.updated_at = now;
        Ok(true)
    }

    /// Records a payment.
    ///
    /// The paid date is stamped only on the transition into PAID; later
    /// payments on a settled invoice raise `overpaid()` instead.
    pub fn add_payment(
        &mut self,
        payment: &PaymentRequest,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> CoreResult<PaymentApplied> {
        validate_positive_amount("amount", payment.amount)?;
        self.ensure_not_cancelled()?;

        let date = payment.date.unwrap_or(today);
        let was_paid = self.payment_status == PaymentStatus::Paid;

        self.paid += payment.amount;
        self.recalculate();

        if self.payment_status == PaymentStatus::Paid {
            self.status = InvoiceStatus::Paid;
            if !was_paid {
                self.paid_date = Some(date);
            }
        } else {
            self.status = InvoiceStatus::PartiallyPaid;
        }
        self.updated_at = now;

        Ok(PaymentApplied {
            invoice_id: self.id.clone(),
            invoice_number: self.invoice_number.clone(),
            amount: payment.amount,
            method: payment.method,
            date,
            reference: normalize_optional(payment.reference.clone()),
            description: normalize_optional(payment.description.clone()),
            customer_name: self.customer.name.clone(),
            payment_status: self.payment_status,
            due: self.due,
        })
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn recalculate(&mut self) {
        self.subtotal = self.items.iter().map(LineItem::total).sum();
        self.total = self.subtotal - self.discount + self.tax;
        let (payment_status, due) = PaymentStatus::derive(self.total, self.paid);
        self.payment_status = payment_status;
        self.due = due;

        // A payment-driven workflow status follows the money.
        if self.status.is_payment_driven() {
            match payment_status {
                PaymentStatus::Paid => self.status = InvoiceStatus::Paid,
                PaymentStatus::Partial => {
                    self.status = InvoiceStatus::PartiallyPaid;
                    self.paid_date = None;
                }
                PaymentStatus::Unpaid => {}
            }
        }
    }

    fn ensure_not_cancelled(&self) -> CoreResult<()> {
        if self.status == InvoiceStatus::Cancelled {
            return Err(CoreError::InvoiceClosed {
                id: self.id.clone(),
                status: self.status.to_string(),
            });
        }
        Ok(())
    }
}

fn build_items(specs: &[LineItemSpec], now: DateTime<Utc>) -> ValidationResult<Vec<LineItem>> {
    specs.iter().map(|s| LineItem::from_spec(new_id(), s, now)).collect()
}

fn ensure_capacity(count: usize) -> ValidationResult<()> {
    if count > MAX_LINE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 0,
            max: MAX_LINE_ITEMS as i64,
        });
    }
    Ok(())
}

fn validate_adjustments(
    discount: Option<Money>,
    discount_rate: Option<Rate>,
    tax: Option<Money>,
    tax_rate: Option<Rate>,
) -> ValidationResult<()> {
    validate_optional_non_negative("discount", discount)?;
    validate_optional_non_negative("tax", tax)?;
    if let Some(rate) = discount_rate {
        validate_rate("discount_rate", rate)?;
    }
    if let Some(rate) = tax_rate {
        validate_rate("tax_rate", rate)?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
