//! # Validation Module
//!
//! Input validation utilities.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (HTTP / CRUD layer, outside this workspace)           │
//! │  ├── Deserialization, basic shape                                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: garage-core (THIS MODULE)                                    │
//! │  ├── Business rules: quantity > 0, discount ≤ line subtotal,           │
//! │  │   amounts > 0, required names and plates                            │
//! │  └── Runs BEFORE any aggregate mutation                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                        │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── UNIQUE (invoice_number), foreign keys                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::{Money, Rate};
use crate::{MAX_AMOUNT_CENTS, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a required free-text field and returns it trimmed.
///
/// ## Example
/// ```rust
/// use garage_core::validation::validate_required;
///
/// assert_eq!(validate_required("name", "  Oil filter ", 200).unwrap(), "Oil filter");
/// assert!(validate_required("name", "   ", 200).is_err());
/// ```
pub fn validate_required(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(value.to_string())
}

/// Validates a vehicle number plate.
///
/// ## Rules
/// - Must not be empty
/// - At most 20 characters
/// - Stored upper-cased, so searches are case-insensitive
pub fn validate_number_plate(plate: &str) -> ValidationResult<String> {
    validate_required("number_plate", plate, 20).map(|p| p.to_uppercase())
}

/// Validates a substring search query and returns it trimmed.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    validate_required("query", query, 100)
}

/// Normalizes an optional text field: trims it, and treats blank as absent.
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line-item quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if quantity > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates that an amount is strictly positive (payments, ledger entries).
pub fn validate_positive_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    validate_amount_cap(field, amount)
}

/// Validates that an amount is zero or more (prices, discounts, tax, labour).
pub fn validate_non_negative(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    validate_amount_cap(field, amount)
}

fn validate_amount_cap(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.cents() > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT_CENTS,
        });
    }
    Ok(())
}

/// Validates an optional non-negative amount.
pub fn validate_optional_non_negative(field: &str, amount: Option<Money>) -> ValidationResult<()> {
    match amount {
        Some(amount) => validate_non_negative(field, amount),
        None => Ok(()),
    }
}

/// Validates a percentage rate (0% to 100%).
pub fn validate_rate(field: &str, rate: Rate) -> ValidationResult<()> {
    if rate.bps() > Rate::FULL_BPS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: Rate::FULL_BPS as i64,
        });
    }
    Ok(())
}

/// Validates the number of days until an invoice falls due.
pub fn validate_due_days(days: u32) -> ValidationResult<()> {
    if days > 365 {
        return Err(ValidationError::OutOfRange {
            field: "due_days".to_string(),
            min: 0,
            max: 365,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-2).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_number_plate_is_upper_cased() {
        assert_eq!(validate_number_plate(" ka01ab1234 ").unwrap(), "KA01AB1234");
        assert!(validate_number_plate("").is_err());
        assert!(validate_number_plate(&"X".repeat(21)).is_err());
    }

    #[test]
    fn test_amounts() {
        assert!(validate_positive_amount("amount", Money::from_cents(1)).is_ok());
        assert!(validate_positive_amount("amount", Money::zero()).is_err());
        assert!(validate_non_negative("discount", Money::zero()).is_ok());
        assert!(validate_non_negative("discount", Money::from_cents(-1)).is_err());
        assert!(validate_non_negative("unit_price", Money::from_cents(MAX_AMOUNT_CENTS)).is_ok());
        assert!(matches!(
            validate_non_negative("unit_price", Money::from_cents(MAX_AMOUNT_CENTS + 1)),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(validate_positive_amount("amount", Money::from_cents(i64::MAX)).is_err());
    }

    #[test]
    fn test_rate_bounds() {
        assert!(validate_rate("tax_rate", Rate::from_percent(100)).is_ok());
        assert!(validate_rate("tax_rate", Rate::from_bps(10_001)).is_err());
    }

    #[test]
    fn test_normalize_optional() {
        assert_eq!(normalize_optional(Some("  ".into())), None);
        assert_eq!(normalize_optional(Some(" x ".into())), Some("x".into()));
        assert_eq!(normalize_optional(None), None);
    }
}
