//! # Domain Types
//!
//! Value types shared by the job card, invoice and cash book modules.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Shared Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ VehicleDetails  │   │ CustomerDetails │   │ PaymentMethod   │       │
//! │  │  number_plate   │   │  name, phone    │   │  Cash, Card     │       │
//! │  │  make, model    │   │  email, address │   │  Upi, ...       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   StockRef      │──►│ StockMovement   │   │   DateRange     │       │
//! │  │  catalog + id   │   │  signed delta   │   │  from ..= to    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every entity id is a UUID v4 string generated by [`new_id`]. Business
//! identifiers (invoice numbers, number plates) live alongside it.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::ValidationError;

/// Generates a fresh entity id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Garage
// =============================================================================

/// A business location. Owned by the external CRUD layer; the engine only
/// looks garages up and scopes every job card, invoice and ledger entry to one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Garage {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Vehicle / Customer
// =============================================================================

/// Vehicle being serviced on a job card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VehicleDetails {
    /// Registration plate, required. Searches match on a substring of it.
    pub number_plate: String,
    pub vehicle_type: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub variant: Option<String>,
    pub km_reading: Option<i64>,
    pub fuel_level: Option<String>,
}

/// The subset of vehicle details an invoice keeps as its own snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VehicleSnapshot {
    pub number: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
}

impl From<&VehicleDetails> for VehicleSnapshot {
    fn from(vehicle: &VehicleDetails) -> Self {
        VehicleSnapshot {
            number: Some(vehicle.number_plate.clone()),
            make: vehicle.make.clone(),
            model: vehicle.model.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustomerDetails {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

// =============================================================================
// Payment Method
// =============================================================================

/// How money changed hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    Upi,
    BankTransfer,
    Cheque,
    Other,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 6] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Upi,
        PaymentMethod::BankTransfer,
        PaymentMethod::Cheque,
        PaymentMethod::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Card => "CARD",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::Cheque => "CHEQUE",
            PaymentMethod::Other => "OTHER",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    /// Case-insensitive; accepts `bank transfer` and `bank-transfer` too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace([' ', '-'], "_");
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "payment_method".to_string(),
                allowed: PaymentMethod::ALL.iter().map(|m| m.as_str().to_string()).collect(),
            })
    }
}

// =============================================================================
// Stock
// =============================================================================

/// Which stock catalog a line item draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockCatalog {
    SparePart,
    Lube,
    /// Service catalog entries are priced offerings, not counted stock.
    Service,
}

impl StockCatalog {
    /// Whether items from this catalog move quantity on hand.
    pub fn tracks_quantity(&self) -> bool {
        matches!(self, StockCatalog::SparePart | StockCatalog::Lube)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockCatalog::SparePart => "SPARE_PART",
            StockCatalog::Lube => "LUBE",
            StockCatalog::Service => "SERVICE",
        }
    }
}

/// Reference from a line item to a stock catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockRef {
    pub catalog: StockCatalog,
    pub stock_id: String,
}

impl StockRef {
    pub fn new(catalog: StockCatalog, stock_id: impl Into<String>) -> Self {
        StockRef {
            catalog,
            stock_id: stock_id.into(),
        }
    }
}

/// A stock catalog entry with quantity on hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockItem {
    pub id: String,
    pub garage_id: String,
    pub catalog: StockCatalog,
    pub name: String,
    pub code: Option<String>,
    pub quantity: i64,
    pub unit_price: crate::money::Money,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Signed change of quantity on hand produced by a job card item operation.
///
/// ```text
/// add_item(qty 3)        → delta -3   (consume)
/// remove_item(qty 3)     → delta +3   (restore)
/// update_item(3 → 5)     → delta -2   (old − new)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct StockMovement {
    pub stock: StockRef,
    pub delta: i64,
}

impl StockMovement {
    pub fn consume(stock: &StockRef, quantity: i64) -> Self {
        StockMovement {
            stock: stock.clone(),
            delta: -quantity,
        }
    }

    pub fn restore(stock: &StockRef, quantity: i64) -> Self {
        StockMovement {
            stock: stock.clone(),
            delta: quantity,
        }
    }

    /// Folds movements against the same stock entry into one, dropping
    /// untracked catalogs and zero deltas. Order of first appearance is kept.
    pub fn merge(movements: impl IntoIterator<Item = StockMovement>) -> Vec<StockMovement> {
        let mut merged: Vec<StockMovement> = Vec::new();
        for movement in movements {
            if !movement.stock.catalog.tracks_quantity() {
                continue;
            }
            match merged.iter_mut().find(|m| m.stock == movement.stock) {
                Some(existing) => existing.delta += movement.delta,
                None => merged.push(movement),
            }
        }
        merged.retain(|m| m.delta != 0);
        merged
    }
}

// =============================================================================
// Date Range
// =============================================================================

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DateRange {
    #[ts(as = "String")]
    pub from: NaiveDate,
    #[ts(as = "String")]
    pub to: NaiveDate,
}

impl DateRange {
    /// Creates a range, rejecting `from > to`.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, ValidationError> {
        if from > to {
            return Err(ValidationError::InvalidFormat {
                field: "date_range".to_string(),
                reason: format!("start {} is after end {}", from, to),
            });
        }
        Ok(DateRange { from, to })
    }

    pub fn single(day: NaiveDate) -> Self {
        DateRange { from: day, to: day }
    }

    /// The whole calendar month containing `year`/`month`.
    pub fn month(year: i32, month: u32) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::OutOfRange {
            field: "month".to_string(),
            min: 1,
            max: 12,
        };
        let from = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(invalid)?;
        let to = next.pred_opt().ok_or_else(invalid)?;
        Ok(DateRange { from, to })
    }

    /// From the first day of `day`'s year through `day`.
    pub fn year_to_date(day: NaiveDate) -> Self {
        let from = NaiveDate::from_ymd_opt(day.year(), 1, 1).unwrap_or(day);
        DateRange { from, to: day }
    }

    /// From the first day of `day`'s month through `day`.
    pub fn month_to_date(day: NaiveDate) -> Self {
        let from = day.with_day(1).unwrap_or(day);
        DateRange { from, to: day }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.from <= day && day <= self.to
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!("cash".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
        assert_eq!("UPI".parse::<PaymentMethod>().unwrap(), PaymentMethod::Upi);
        assert_eq!(
            "bank transfer".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::BankTransfer
        );
        assert!("barter".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_merge_movements() {
        let filter = StockRef::new(StockCatalog::SparePart, "filter");
        let oil = StockRef::new(StockCatalog::Lube, "oil");
        let wash = StockRef::new(StockCatalog::Service, "wash");

        let merged = StockMovement::merge(vec![
            StockMovement::restore(&filter, 3),
            StockMovement::consume(&wash, 1),
            StockMovement::consume(&filter, 5),
            StockMovement::consume(&oil, 2),
            StockMovement::restore(&oil, 2),
        ]);

        assert_eq!(merged, vec![StockMovement { stock: filter, delta: -2 }]);
    }

    #[test]
    fn test_month_range() {
        let feb = DateRange::month(2024, 2).unwrap();
        assert_eq!(feb.to, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        let dec = DateRange::month(2025, 12).unwrap();
        assert_eq!(dec.to, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert!(DateRange::month(2025, 13).is_err());
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        let a = NaiveDate::from_ymd_opt(2025, 5, 2).unwrap();
        let b = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        assert!(DateRange::new(a, b).is_err());
        assert!(DateRange::new(b, a).unwrap().contains(a));
    }
}
