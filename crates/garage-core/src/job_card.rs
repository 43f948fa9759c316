//! # Job Cards
//!
//! The job card aggregate: one unit of work for one vehicle, its items, and
//! the totals derived from them.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Job Card Lifecycle                                │
//! │                                                                         │
//! │   open()                                                                │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  PENDING ──start()──► IN_PROGRESS ──complete()──► COMPLETED             │
//! │     │                                                ▲    │             │
//! │     └──────────────────complete()────────────────────┘    │             │
//! │                                                           │             │
//! │                   IN_PROGRESS ◄──────reopen()─────────────┘             │
//! │                                                                         │
//! │  While not COMPLETED:  add_item / update_item / remove_item / pricing   │
//! │  Every mutation recomputes: subtotal = Σ item.total                     │
//! │                             total    = subtotal + labour − discount     │
//! │                                        + tax                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stock Side Effects
//! Item operations never touch inventory directly. They return the
//! [`StockMovement`]s they imply and the storage layer applies them in the
//! same transaction that saves the job card.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::line_item::{LineItem, LineItemSpec};
use crate::money::{Money, Rate};
use crate::types::{new_id, CustomerDetails, StockMovement, VehicleDetails};
use crate::validation::{
    normalize_optional, validate_due_days, validate_number_plate, validate_optional_non_negative,
    validate_rate, ValidationResult,
};
use crate::MAX_LINE_ITEMS;

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobCardStatus {
    Pending,
    InProgress,
    Completed,
}

impl JobCardStatus {
    pub const ALL: [JobCardStatus; 3] = [
        JobCardStatus::Pending,
        JobCardStatus::InProgress,
        JobCardStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobCardStatus::Pending => "PENDING",
            JobCardStatus::InProgress => "IN_PROGRESS",
            JobCardStatus::Completed => "COMPLETED",
        }
    }

    /// Forward-only transition table. Leaving COMPLETED requires `reopen`.
    pub fn can_transition_to(self, next: JobCardStatus) -> bool {
        use JobCardStatus::*;
        matches!(
            (self, next),
            (Pending, Pending)
                | (Pending, InProgress)
                | (Pending, Completed)
                | (InProgress, InProgress)
                | (InProgress, Completed)
        )
    }
}

impl fmt::Display for JobCardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobCardStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace([' ', '-'], "_");
        JobCardStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == normalized)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: JobCardStatus::ALL.iter().map(|st| st.as_str().to_string()).collect(),
            })
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Fields for opening a job card.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewJobCard {
    pub vehicle: VehicleDetails,
    #[serde(default)]
    pub customer: CustomerDetails,
    #[serde(default)]
    pub notes: Option<String>,
    /// Triage marker; false unless given.
    #[serde(default)]
    pub flag: Option<bool>,
    #[serde(default)]
    pub labour: Option<Money>,
    #[serde(default)]
    pub discount: Option<Money>,
    #[serde(default)]
    pub tax: Option<Money>,
}

/// Card-level pricing changes. Absent fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricingUpdate {
    #[serde(default)]
    pub labour: Option<Money>,
    #[serde(default)]
    pub discount: Option<Money>,
    #[serde(default)]
    pub tax: Option<Money>,
}

impl PricingUpdate {
    pub fn is_empty(&self) -> bool {
        self.labour.is_none() && self.discount.is_none() && self.tax.is_none()
    }

    pub fn validate(&self) -> ValidationResult<()> {
        validate_optional_non_negative("labour", self.labour)?;
        validate_optional_non_negative("discount", self.discount)?;
        validate_optional_non_negative("tax", self.tax)
    }
}

/// General edit of a job card. Absent fields are left as they are.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct JobCardUpdate {
    #[serde(default)]
    pub vehicle: Option<VehicleDetails>,
    #[serde(default)]
    pub customer: Option<CustomerDetails>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub flag: Option<bool>,
    #[serde(default)]
    pub pricing: PricingUpdate,
}

/// Final step of a job card, optionally generating its invoice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CompleteJobCard {
    /// Final items appended before completion.
    #[serde(default)]
    pub items: Vec<LineItemSpec>,
    #[serde(default)]
    pub labour: Option<Money>,
    #[serde(default)]
    pub discount: Option<Money>,
    #[serde(default)]
    pub tax: Option<Money>,
    /// Informational. An absent `tax` counts as zero whatever the rate.
    #[serde(default)]
    pub tax_rate: Option<Rate>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub generate_invoice: bool,
    #[serde(default)]
    pub invoice_discount: Option<Money>,
    #[serde(default)]
    pub invoice_tax_rate: Option<Rate>,
    #[serde(default)]
    pub invoice_notes: Option<String>,
    #[serde(default)]
    pub terms: Option<String>,
    #[serde(default)]
    pub due_days: Option<u32>,
}

impl CompleteJobCard {
    pub fn validate(&self) -> ValidationResult<()> {
        for spec in &self.items {
            spec.validate()?;
        }
        self.pricing().validate()?;
        if let Some(rate) = self.tax_rate {
            validate_rate("tax_rate", rate)?;
        }
        validate_optional_non_negative("invoice_discount", self.invoice_discount)?;
        if let Some(rate) = self.invoice_tax_rate {
            validate_rate("invoice_tax_rate", rate)?;
        }
        if let Some(days) = self.due_days {
            validate_due_days(days)?;
        }
        Ok(())
    }

    pub fn pricing(&self) -> PricingUpdate {
        PricingUpdate {
            labour: self.labour,
            discount: self.discount,
            tax: self.tax,
        }
    }
}

// =============================================================================
// Job Card
// =============================================================================

/// Stored, non-derived state of a job card, used to rebuild it from storage.
#[derive(Debug, Clone)]
pub struct JobCardParts {
    pub id: String,
    pub garage_id: String,
    pub vehicle: VehicleDetails,
    pub customer: CustomerDetails,
    pub notes: Option<String>,
    pub flag: bool,
    pub status: JobCardStatus,
    pub labour: Money,
    pub discount: Money,
    pub tax: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

/// A work order for one vehicle.
///
/// Status, items, pricing and totals are private: they only change through
/// methods that validate first and recompute afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct JobCard {
    pub id: String,
    pub garage_id: String,
    pub vehicle: VehicleDetails,
    pub customer: CustomerDetails,
    pub notes: Option<String>,
    pub flag: bool,
    status: JobCardStatus,
    items: Vec<LineItem>,
    labour: Money,
    discount: Money,
    tax: Money,
    subtotal: Money,
    total: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    completed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency counter, bumped by storage on every write.
    version: i64,
}

impl JobCard {
    /// Opens a new job card in PENDING with no items.
    pub fn open(garage_id: &str, request: NewJobCard, now: DateTime<Utc>) -> CoreResult<JobCard> {
        let number_plate = validate_number_plate(&request.vehicle.number_plate)?;
        let pricing = PricingUpdate {
            labour: request.labour,
            discount: request.discount,
            tax: request.tax,
        };
        pricing.validate()?;

        let mut card = JobCard {
            id: new_id(),
            garage_id: garage_id.to_string(),
            vehicle: VehicleDetails {
                number_plate,
                ..request.vehicle
            },
            customer: request.customer,
            notes: normalize_optional(request.notes),
            flag: request.flag.unwrap_or(false),
            status: JobCardStatus::Pending,
            items: Vec::new(),
            labour: pricing.labour.unwrap_or_default(),
            discount: pricing.discount.unwrap_or_default(),
            tax: pricing.tax.unwrap_or_default(),
            subtotal: Money::zero(),
            total: Money::zero(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            version: 0,
        };
        card.recalculate();
        Ok(card)
    }

    /// Rebuilds a job card from storage. Totals are recomputed, not trusted.
    pub fn restore(parts: JobCardParts, items: Vec<LineItem>) -> JobCard {
        let mut card = JobCard {
            id: parts.id,
            garage_id: parts.garage_id,
            vehicle: parts.vehicle,
            customer: parts.customer,
            notes: parts.notes,
            flag: parts.flag,
            status: parts.status,
            items,
            labour: parts.labour,
            discount: parts.discount,
            tax: parts.tax,
            subtotal: Money::zero(),
            total: Money::zero(),
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            completed_at: parts.completed_at,
            version: parts.version,
        };
        card.recalculate();
        card
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn status(&self) -> JobCardStatus {
        self.status
    }

    pub fn is_completed(&self) -> bool {
        self.status == JobCardStatus::Completed
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn item(&self, item_id: &str) -> Option<&LineItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn labour(&self) -> Money {
        self.labour
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn tax(&self) -> Money {
        self.tax
    }

    /// Σ item totals.
    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    /// subtotal + labour − discount + tax.
    pub fn total(&self) -> Money {
        self.total
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    // -------------------------------------------------------------------------
    // Item operations
    // -------------------------------------------------------------------------

    /// Appends one item. Returns the stock it consumes.
    pub fn add_item(&mut self, spec: &LineItemSpec, now: DateTime<Utc>) -> CoreResult<Vec<StockMovement>> {
        self.ensure_open()?;
        self.ensure_capacity(1)?;

        let item = LineItem::from_spec(new_id(), spec, now)?;
        let movements: Vec<StockMovement> = item
            .tracked_stock()
            .map(|stock| StockMovement::consume(stock, item.quantity()))
            .into_iter()
            .collect();

        self.items.push(item);
        self.recalculate();
        self.updated_at = now;
        Ok(StockMovement::merge(movements))
    }

    /// Appends several items and applies pricing, all or nothing.
    pub fn add_items(
        &mut self,
        specs: &[LineItemSpec],
        pricing: &PricingUpdate,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<StockMovement>> {
        self.ensure_open()?;
        for spec in specs {
            spec.validate()?;
        }
        pricing.validate()?;
        self.ensure_capacity(specs.len())?;

        let movements = self.append_validated(specs, now)?;
        self.apply_pricing(pricing);
        self.recalculate();
        self.updated_at = now;
        Ok(movements)
    }

    /// Replaces an item's contents, keeping its id.
    ///
    /// The previous quantity is restored and the new one consumed, so the net
    /// stock delta is `old − new` for an unchanged stock reference.
    pub fn update_item(
        &mut self,
        item_id: &str,
        spec: &LineItemSpec,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<StockMovement>> {
        self.ensure_open()?;
        let index = self.item_index(item_id)?;

        let previous = &self.items[index];
        let mut replacement = LineItem::from_spec(previous.id.clone(), spec, now)?;
        replacement.created_at = previous.created_at;

        let mut movements = Vec::new();
        if let Some(stock) = previous.tracked_stock() {
            movements.push(StockMovement::restore(stock, previous.quantity()));
        }
        if let Some(stock) = replacement.tracked_stock() {
            movements.push(StockMovement::consume(stock, replacement.quantity()));
        }

        self.items[index] = replacement;
        self.recalculate();
        self.updated_at = now;
        Ok(StockMovement::merge(movements))
    }

    /// Removes an item. Returns it with the stock it gives back.
    pub fn remove_item(
        &mut self,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<(LineItem, Vec<StockMovement>)> {
        self.ensure_open()?;
        let index = self.item_index(item_id)?;

        let removed = self.items.remove(index);
        let movements: Vec<StockMovement> = removed
            .tracked_stock()
            .map(|stock| StockMovement::restore(stock, removed.quantity()))
            .into_iter()
            .collect();

        self.recalculate();
        self.updated_at = now;
        Ok((removed, StockMovement::merge(movements)))
    }

    /// Stock to hand back when an unfinished job card is deleted.
    /// A completed card keeps its parts consumed.
    pub fn stock_release(&self) -> Vec<StockMovement> {
        if self.is_completed() {
            return Vec::new();
        }
        StockMovement::merge(
            self.items
                .iter()
                .filter_map(|i| i.tracked_stock().map(|s| StockMovement::restore(s, i.quantity()))),
        )
    }

    // -------------------------------------------------------------------------
    // Card-level edits
    // -------------------------------------------------------------------------

    /// Applies a general edit. Descriptive fields stay editable after
    /// completion; pricing does not.
    pub fn apply_update(&mut self, update: &JobCardUpdate, now: DateTime<Utc>) -> CoreResult<()> {
        if !update.pricing.is_empty() {
            self.ensure_open()?;
        }
        update.pricing.validate()?;

        let vehicle = match &update.vehicle {
            Some(vehicle) => Some(VehicleDetails {
                number_plate: validate_number_plate(&vehicle.number_plate)?,
                ..vehicle.clone()
            }),
            None => None,
        };

        if let Some(vehicle) = vehicle {
            self.vehicle = vehicle;
        }
        if let Some(customer) = &update.customer {
            self.customer = customer.clone();
        }
        if update.notes.is_some() {
            self.notes = normalize_optional(update.notes.clone());
        }
        if let Some(flag) = update.flag {
            self.flag = flag;
        }
        self.apply_pricing(&update.pricing);
        self.recalculate();
        self.updated_at = now;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // State machine
    // -------------------------------------------------------------------------

    /// Strict status change. Entering COMPLETED stamps `completed_at` once.
    pub fn transition_to(&mut self, next: JobCardStatus, now: DateTime<Utc>) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(self.invalid_transition(next));
        }
        if next == JobCardStatus::Completed && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// PENDING → IN_PROGRESS.
    pub fn start(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.transition_to(JobCardStatus::InProgress, now)
    }

    /// COMPLETED → IN_PROGRESS, clearing the completion timestamp.
    pub fn reopen(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != JobCardStatus::Completed {
            return Err(self.invalid_transition(JobCardStatus::InProgress));
        }
        self.status = JobCardStatus::InProgress;
        self.completed_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Appends final items, applies pricing and notes, then completes.
    ///
    /// Rejected with `JobCardCompleted` when already completed, so a repeated
    /// call neither duplicates items nor moves the completion timestamp.
    pub fn complete(&mut self, request: &CompleteJobCard, now: DateTime<Utc>) -> CoreResult<Vec<StockMovement>> {
        self.ensure_open()?;
        request.validate()?;
        self.ensure_capacity(request.items.len())?;

        let movements = self.append_validated(&request.items, now)?;
        self.apply_pricing(&request.pricing());
        self.recalculate();

        if request.notes.is_some() {
            self.notes = normalize_optional(request.notes.clone());
        }

        self.status = JobCardStatus::Completed;
        self.completed_at = Some(now);
        self.recalculate();
        self.updated_at = now;
        Ok(movements)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn recalculate(&mut self) {
        self.subtotal = self.items.iter().map(LineItem::total).sum();
        self.total = self.subtotal + self.labour - self.discount + self.tax;
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_completed() {
            return Err(CoreError::JobCardCompleted { id: self.id.clone() });
        }
        Ok(())
    }

    fn ensure_capacity(&self, additional: usize) -> CoreResult<()> {
        if self.items.len() + additional > MAX_LINE_ITEMS {
            return Err(ValidationError::OutOfRange {
                field: "items".to_string(),
                min: 0,
                max: MAX_LINE_ITEMS as i64,
            }
            .into());
        }
        Ok(())
    }

    fn item_index(&self, item_id: &str) -> CoreResult<usize> {
        self.items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| CoreError::mismatch("Job card item", item_id, "job card", &self.id))
    }

    fn append_validated(&mut self, specs: &[LineItemSpec], now: DateTime<Utc>) -> CoreResult<Vec<StockMovement>> {
        let mut built = Vec::with_capacity(specs.len());
        for spec in specs {
            built.push(LineItem::from_spec(new_id(), spec, now)?);
        }

        let movements: Vec<StockMovement> = built
            .iter()
            .filter_map(|i| i.tracked_stock().map(|s| StockMovement::consume(s, i.quantity())))
            .collect();
        self.items.extend(built);
        Ok(StockMovement::merge(movements))
    }

    fn apply_pricing(&mut self, pricing: &PricingUpdate) {
        if let Some(labour) = pricing.labour {
            self.labour = labour;
        }
        if let Some(discount) = pricing.discount {
            self.discount = discount;
        }
        if let Some(tax) = pricing.tax {
            self.tax = tax;
        }
    }

    fn invalid_transition(&self, next: JobCardStatus) -> CoreError {
        CoreError::InvalidTransition {
            entity: "Job card".to_string(),
            id: self.id.clone(),
            from: self.status.to_string(),
            to: next.to_string(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
