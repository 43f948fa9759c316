//! # Line Items
//!
//! The line-item calculator and the item type shared by job cards and
//! invoices.
//!
//! ## Line Arithmetic
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   quantity × unit_price  −  discount  +  tax   =  total                 │
//! │                                                                         │
//! │   2 × 100.00             −  10.00     +  5.00  =  195.00                │
//! │                                                                         │
//! │   tax absent, tax_rate 18%:                                             │
//! │   2 × 100.00             −  10.00     +  0     =  190.00                │
//! │   (the rate is recorded on the line, never applied)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `LineAmounts::new` is the only way to obtain a `LineAmounts`, and it always
//! runs [`compute_line_total`]. A stored total therefore cannot drift from
//! its components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{Money, Rate};
use crate::types::StockRef;
use crate::validation::{
    normalize_optional, validate_non_negative, validate_optional_non_negative, validate_quantity,
    validate_rate, validate_required, ValidationResult,
};

// =============================================================================
// Calculator
// =============================================================================

/// Computes `quantity × unit_price − discount + tax`.
///
/// Absent monetary inputs count as zero and an absent quantity defaults to 1.
/// There are no error conditions; a negative result is returned as-is and
/// left to the caller's validation.
///
/// ## Example
/// ```rust
/// use garage_core::line_item::compute_line_total;
/// use garage_core::Money;
///
/// assert_eq!(compute_line_total(None, Some(Money::from_major(40)), None, None), Money::from_major(40));
/// assert_eq!(compute_line_total(Some(3), None, None, None), Money::zero());
/// ```
pub fn compute_line_total(
    quantity: Option<i64>,
    unit_price: Option<Money>,
    discount: Option<Money>,
    tax: Option<Money>,
) -> Money {
    let quantity = quantity.unwrap_or(1);
    unit_price.unwrap_or_default().multiply_quantity(quantity) - discount.unwrap_or_default()
        + tax.unwrap_or_default()
}

// =============================================================================
// Item Kind
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemKind {
    SparePart,
    Lube,
    Service,
    Labour,
    Other,
}

impl ItemKind {
    pub const ALL: [ItemKind; 5] = [
        ItemKind::SparePart,
        ItemKind::Lube,
        ItemKind::Service,
        ItemKind::Labour,
        ItemKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::SparePart => "SPARE_PART",
            ItemKind::Lube => "LUBE",
            ItemKind::Service => "SERVICE",
            ItemKind::Labour => "LABOUR",
            ItemKind::Other => "OTHER",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace([' ', '-'], "_");
        ItemKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "item_type".to_string(),
                allowed: ItemKind::ALL.iter().map(|k| k.as_str().to_string()).collect(),
            })
    }
}

// =============================================================================
// Line Amounts
// =============================================================================

/// The monetary components of one line, with the total they imply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct LineAmounts {
    quantity: i64,
    unit_price: Money,
    discount: Money,
    tax_rate: Rate,
    tax: Money,
    total: Money,
}

impl LineAmounts {
    /// Builds the amounts of a line and computes its total.
    ///
    /// An absent `tax` counts as zero. `tax_rate` is kept for display only.
    pub fn new(
        quantity: i64,
        unit_price: Money,
        discount: Money,
        tax_rate: Option<Rate>,
        tax: Option<Money>,
    ) -> Self {
        let tax_rate = tax_rate.unwrap_or_default();
        let tax = tax.unwrap_or_default();
        let total = compute_line_total(Some(quantity), Some(unit_price), Some(discount), Some(tax));

        LineAmounts {
            quantity,
            unit_price,
            discount,
            tax_rate,
            tax,
            total,
        }
    }

    /// A single-unit line at `price` with no discount or tax.
    pub fn flat(price: Money) -> Self {
        LineAmounts::new(1, price, Money::zero(), None, None)
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn tax_rate(&self) -> Rate {
        self.tax_rate
    }

    pub fn tax(&self) -> Money {
        self.tax
    }

    pub fn total(&self) -> Money {
        self.total
    }

    /// `quantity × unit_price`, before discount and tax.
    pub fn gross(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Line Item Spec
// =============================================================================

/// Requested contents of a job card or invoice line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItemSpec {
    pub kind: ItemKind,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to 1 when absent.
    #[serde(default)]
    pub quantity: Option<i64>,
    pub unit_price: Option<Money>,
    #[serde(default)]
    pub discount: Option<Money>,
    #[serde(default)]
    pub tax_rate: Option<Rate>,
    #[serde(default)]
    pub tax: Option<Money>,
    #[serde(default)]
    pub stock: Option<StockRef>,
}

impl LineItemSpec {
    /// A spec with just kind, name, quantity and price.
    pub fn new(kind: ItemKind, name: impl Into<String>, quantity: i64, unit_price: Money) -> Self {
        LineItemSpec {
            kind,
            name: name.into(),
            code: None,
            description: None,
            quantity: Some(quantity),
            unit_price: Some(unit_price),
            discount: None,
            tax_rate: None,
            tax: None,
            stock: None,
        }
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn with_tax(mut self, tax: Money) -> Self {
        self.tax = Some(tax);
        self
    }

    pub fn with_tax_rate(mut self, rate: Rate) -> Self {
        self.tax_rate = Some(rate);
        self
    }

    pub fn with_stock(mut self, stock: StockRef) -> Self {
        self.stock = Some(stock);
        self
    }

    /// Quantity after applying the default of 1.
    pub fn effective_quantity(&self) -> i64 {
        self.quantity.unwrap_or(1)
    }

    /// Checks the business rules of a line.
    ///
    /// ## Rules
    /// - name required (≤ 200 chars)
    /// - quantity > 0 and ≤ MAX_ITEM_QUANTITY
    /// - unit price present and ≥ 0
    /// - discount ≥ 0 and ≤ quantity × unit price
    /// - tax ≥ 0, tax rate ≤ 100%
    /// - stock id non-empty when a stock reference is given
    pub fn validate(&self) -> ValidationResult<()> {
        validate_required("name", &self.name, 200)?;
        validate_quantity(self.effective_quantity())?;

        let unit_price = self
            .unit_price
            .ok_or_else(|| ValidationError::required("unit_price"))?;
        validate_non_negative("unit_price", unit_price)?;

        validate_optional_non_negative("discount", self.discount)?;
        let gross = unit_price.multiply_quantity(self.effective_quantity());
        if let Some(discount) = self.discount {
            if discount > gross {
                return Err(ValidationError::Exceeds {
                    field: "discount".to_string(),
                    limit: gross.to_string(),
                });
            }
        }

        validate_optional_non_negative("tax", self.tax)?;
        if let Some(rate) = self.tax_rate {
            validate_rate("tax_rate", rate)?;
        }

        if let Some(stock) = &self.stock {
            validate_required("stock_id", &stock.stock_id, 64)?;
        }

        Ok(())
    }

    /// The line amounts this spec describes.
    pub fn amounts(&self) -> LineAmounts {
        LineAmounts::new(
            self.effective_quantity(),
            self.unit_price.unwrap_or_default(),
            self.discount.unwrap_or_default(),
            self.tax_rate,
            self.tax,
        )
    }
}

// =============================================================================
// Line Item
// =============================================================================

/// One billable line of a job card (`JobCardItem`) or an invoice
/// (`InvoiceItem`). The parent aggregate owns its lines; the parent id lives
/// in storage, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct LineItem {
    pub id: String,
    pub kind: ItemKind,
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
    pub amounts: LineAmounts,
    pub stock: Option<StockRef>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A line on a job card.
pub type JobCardItem = LineItem;

/// A line on an invoice.
pub type InvoiceItem = LineItem;

impl LineItem {
    /// Validates `spec` and builds a line from it.
    pub fn from_spec(id: String, spec: &LineItemSpec, now: DateTime<Utc>) -> ValidationResult<Self> {
        spec.validate()?;

        Ok(LineItem {
            id,
            kind: spec.kind,
            name: spec.name.trim().to_string(),
            code: normalize_optional(spec.code.clone()),
            description: normalize_optional(spec.description.clone()),
            amounts: spec.amounts(),
            stock: spec.stock.clone(),
            created_at: now,
        })
    }

    pub fn total(&self) -> Money {
        self.amounts.total()
    }

    pub fn quantity(&self) -> i64 {
        self.amounts.quantity()
    }

    /// The stock reference of this line if its catalog tracks quantity.
    pub fn tracked_stock(&self) -> Option<&StockRef> {
        self.stock.as_ref().filter(|s| s.catalog.tracks_quantity())
    }

    /// A verbatim copy under a new id (job card line → invoice line).
    pub fn copy_as(&self, id: String, now: DateTime<Utc>) -> Self {
        LineItem {
            id,
            created_at: now,
            ..self.clone()
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StockCatalog;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_compute_line_total() {
        let total = compute_line_total(
            Some(2),
            Some(Money::from_major(100)),
            Some(Money::from_major(10)),
            Some(Money::from_major(5)),
        );
        assert_eq!(total, Money::from_major(195));
    }

    #[test]
    fn test_compute_line_total_defaults() {
        assert_eq!(compute_line_total(None, None, None, None), Money::zero());
        assert_eq!(
            compute_line_total(None, Some(Money::from_major(7)), None, None),
            Money::from_major(7)
        );
        // Negative results are allowed at this level
        assert_eq!(
            compute_line_total(Some(1), Some(Money::from_major(1)), Some(Money::from_major(3)), None),
            Money::from_major(-2)
        );
    }

    #[test]
    fn test_tax_rate_alone_adds_nothing() {
        let amounts = LineAmounts::new(
            2,
            Money::from_major(100),
            Money::from_major(10),
            Some(Rate::from_percent(18)),
            None,
        );
        assert_eq!(amounts.tax(), Money::zero());
        assert_eq!(amounts.tax_rate(), Rate::from_percent(18));
        assert_eq!(amounts.total(), Money::from_major(190));
    }

    #[test]
    fn test_explicit_tax_is_kept_beside_rate() {
        let amounts = LineAmounts::new(
            1,
            Money::from_major(100),
            Money::zero(),
            Some(Rate::from_percent(18)),
            Some(Money::from_major(5)),
        );
        assert_eq!(amounts.tax(), Money::from_major(5));
        assert_eq!(amounts.tax_rate(), Rate::from_percent(18));
    }

    #[test]
    fn test_spec_validation() {
        let ok = LineItemSpec::new(ItemKind::SparePart, "Brake pad", 2, Money::from_major(100))
            .with_discount(Money::from_major(10));
        assert!(ok.validate().is_ok());

        let mut no_price = ok.clone();
        no_price.unit_price = None;
        assert!(matches!(no_price.validate(), Err(ValidationError::Required { .. })));

        let mut zero_qty = ok.clone();
        zero_qty.quantity = Some(0);
        assert!(zero_qty.validate().is_err());

        let big_discount = ok.clone().with_discount(Money::from_major(201));
        assert!(matches!(big_discount.validate(), Err(ValidationError::Exceeds { .. })));

        let mut huge_price = ok.clone();
        huge_price.unit_price = Some(Money::from_cents(i64::MAX / 2));
        assert!(matches!(huge_price.validate(), Err(ValidationError::OutOfRange { .. })));

        let negative_tax = ok.with_tax(Money::from_cents(-1));
        assert!(negative_tax.validate().is_err());
    }

    #[test]
    fn test_from_spec_trims_and_copies() {
        let mut spec = LineItemSpec::new(ItemKind::Lube, "  Engine oil ", 4, Money::from_major(350))
            .with_stock(StockRef::new(StockCatalog::Lube, "oil-5w30"));
        spec.code = Some("  ".into());

        let item = LineItem::from_spec("a".into(), &spec, now()).unwrap();
        assert_eq!(item.name, "Engine oil");
        assert_eq!(item.code, None);
        assert_eq!(item.total(), Money::from_major(1400));
        assert!(item.tracked_stock().is_some());

        let copy = item.copy_as("b".into(), now());
        assert_eq!(copy.id, "b");
        assert_eq!(copy.amounts, item.amounts);
    }

    #[test]
    fn test_item_kind_parsing() {
        assert_eq!("spare part".parse::<ItemKind>().unwrap(), ItemKind::SparePart);
        assert_eq!("labour".parse::<ItemKind>().unwrap(), ItemKind::Labour);
        assert!("widget".parse::<ItemKind>().is_err());
    }
}
