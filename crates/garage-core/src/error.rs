//! # Error Types
//!
//! Domain-specific error types for garage-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  garage-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  garage-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  garage-engine errors                                                  │
//! │  └── EngineError      - What callers see                               │
//! │                                                                         │
//! │  Every layer answers `kind()` with the same ErrorKind taxonomy:        │
//! │  NotFound | Validation | Mismatch | Conflict | Storage                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Error Kind
// =============================================================================

/// Caller-facing classification shared by every error type in the workspace.
///
/// None of these are retried automatically; the kind tells a caller how to
/// report the failure (404 vs 400 vs 409 in an HTTP layer, for instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A referenced garage, job card, invoice, item or entry does not exist.
    NotFound,
    /// Missing required field, non-positive amount, malformed enum value.
    Validation,
    /// An item id exists but belongs to a different parent.
    Mismatch,
    /// The operation collides with current state (illegal transition,
    /// concurrent modification, duplicate invoice number).
    Conflict,
    /// The storage layer failed.
    Storage,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Referenced entity cannot be found.
    ///
    /// ## When This Occurs
    /// - Job card item id is not on the job card and nowhere else
    /// - Garage lookup fails before creating a job card or invoice
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// An item exists but belongs to a different parent.
    ///
    /// ## When This Occurs
    /// - `update_item(job_card_a, item_of_job_card_b)`
    /// - Creating an invoice for a job card of another garage
    #[error("{entity} {id} does not belong to {parent} {parent_id}")]
    Mismatch {
        entity: String,
        id: String,
        parent: String,
        parent_id: String,
    },

    /// Requested status change is not a legal transition.
    ///
    /// ## Legal Job Card Transitions
    /// ```text
    /// PENDING ──► IN_PROGRESS ──► COMPLETED
    ///    │                            ▲
    ///    └────────────────────────────┘
    ///
    /// COMPLETED ──reopen()──► IN_PROGRESS   (explicit path only)
    /// ```
    #[error("{entity} {id} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: String,
        id: String,
        from: String,
        to: String,
    },

    /// Job card is completed; items and pricing are frozen.
    ///
    /// ## When This Occurs
    /// - Adding, updating or removing items after completion
    /// - Calling `complete` a second time
    #[error("Job card {id} is already completed")]
    JobCardCompleted { id: String },

    /// Job card must be completed before it can be invoiced this way.
    #[error("Job card {id} is not completed")]
    JobCardNotCompleted { id: String },

    /// Invoice is cancelled: no payments, no edits.
    #[error("Invoice {id} is {status} and closed to payments and edits")]
    InvoiceClosed { id: String, status: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a Mismatch error for a child that belongs elsewhere.
    pub fn mismatch(
        entity: impl Into<String>,
        id: impl Into<String>,
        parent: impl Into<String>,
        parent_id: impl Into<String>,
    ) -> Self {
        CoreError::Mismatch {
            entity: entity.into(),
            id: id.into(),
            parent: parent.into(),
            parent_id: parent_id.into(),
        }
    }

    /// Returns the caller-facing classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::Mismatch { .. } => ErrorKind::Mismatch,
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::InvalidTransition { .. }
            | CoreError::JobCardCompleted { .. }
            | CoreError::JobCardNotCompleted { .. }
            | CoreError::InvoiceClosed { .. } => ErrorKind::Conflict,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These are raised before any aggregate is touched, so a rejected request
/// never leaves partial state behind.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Value exceeds another value it is bounded by.
    ///
    /// ## When This Occurs
    /// - Line discount larger than quantity × unit price
    #[error("{field} must not exceed {limit}")]
    Exceeds { field: String, limit: String },

    /// Invalid format (e.g., malformed invoice number, bad date range).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::mismatch("Job card item", "item-1", "job card", "jc-2");
        assert_eq!(
            err.to_string(),
            "Job card item item-1 does not belong to job card jc-2"
        );

        let err = CoreError::InvoiceClosed {
            id: "inv-1".to_string(),
            status: "CANCELLED".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invoice inv-1 is CANCELLED and closed to payments and edits"
        );
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(CoreError::not_found("Invoice", "x").kind(), ErrorKind::NotFound);
        assert_eq!(
            CoreError::mismatch("item", "i", "job card", "j").kind(),
            ErrorKind::Mismatch
        );
        assert_eq!(
            CoreError::JobCardCompleted { id: "j".into() }.kind(),
            ErrorKind::Conflict
        );
        let validation: CoreError = ValidationError::required("name").into();
        assert_eq!(validation.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_validation_error_messages() {
        assert_eq!(ValidationError::required("amount").to_string(), "amount is required");
        let err = ValidationError::Exceeds {
            field: "discount".into(),
            limit: "200.00".into(),
        };
        assert_eq!(err.to_string(), "discount must not exceed 200.00");
    }
}
