//! # Storage Errors
//!
//! Everything the repositories can fail with, classified so the engine can
//! report a stable [`ErrorKind`].
//!
//! ```text
//! sqlx::Error ──► DbError ──► EngineError::Db ──► ErrorKind
//!                  │
//!                  ├─ NotFound / ForeignKeyViolation        → NotFound
//!                  ├─ UniqueViolation / VersionConflict /
//!                  │  InsufficientStock                     → Conflict
//!                  └─ connection, migration, query, pool    → Storage
//! ```

use garage_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// A garage, job card, invoice, ledger entry or (strict policy) stock id
    /// that does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Duplicate invoice number, or two ledger appends claiming one position.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// A row referencing a garage or job card that is gone.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// The row's `version` moved between load and save: someone outside this
    /// process's locks wrote it.
    #[error("{entity} {id} was modified concurrently (expected version {expected})")]
    VersionConflict {
        entity: String,
        id: String,
        expected: i64,
    },

    /// Strict stock policy refused a consumption.
    #[error("Insufficient stock for {stock_id}: available {available}, requested {requested}")]
    InsufficientStock {
        stock_id: String,
        available: i64,
        requested: i64,
    },

    /// The ledger file could not be opened or created.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Every pooled connection stayed busy past the acquire timeout.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn version_conflict(entity: impl Into<String>, id: impl Into<String>, expected: i64) -> Self {
        DbError::VersionConflict {
            entity: entity.into(),
            id: id.into(),
            expected,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::NotFound { .. } | DbError::ForeignKeyViolation { .. } => ErrorKind::NotFound,
            DbError::UniqueViolation { .. }
            | DbError::VersionConflict { .. }
            | DbError::InsufficientStock { .. } => ErrorKind::Conflict,
            DbError::ConnectionFailed(_)
            | DbError::MigrationFailed(_)
            | DbError::QueryFailed(_)
            | DbError::TransactionFailed(_)
            | DbError::PoolExhausted
            | DbError::Internal(_) => ErrorKind::Storage,
        }
    }
}

/// Maps SQLite constraint messages onto ledger-level variants.
///
/// SQLite reports `UNIQUE constraint failed: <table>.<col>[, <table>.<col>]`
/// and a bare `FOREIGN KEY constraint failed`; everything else from the
/// database is a failed query.
fn classify_database_message(msg: &str) -> DbError {
    if let Some(columns) = msg.strip_prefix("UNIQUE constraint failed: ") {
        let field = match columns {
            "invoices.invoice_number" => "invoice number",
            "cash_book_entries.garage_id, cash_book_entries.position" => "ledger position",
            other => other,
        };
        return DbError::duplicate(field, "unknown");
    }
    if msg.contains("FOREIGN KEY constraint failed") {
        return DbError::ForeignKeyViolation {
            message: msg.to_string(),
        };
    }
    DbError::QueryFailed(msg.to_string())
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Row", "unknown"),
            sqlx::Error::Database(db_err) => classify_database_message(db_err.message()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("ledger pool is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(DbError::not_found("Invoice", "x").kind(), ErrorKind::NotFound);
        assert_eq!(DbError::duplicate("invoice number", "INV-1").kind(), ErrorKind::Conflict);
        assert_eq!(DbError::version_conflict("Job card", "j", 3).kind(), ErrorKind::Conflict);
        assert_eq!(DbError::PoolExhausted.kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_constraint_messages() {
        match classify_database_message("UNIQUE constraint failed: invoices.invoice_number") {
            DbError::UniqueViolation { field, .. } => assert_eq!(field, "invoice number"),
            other => panic!("unexpected {:?}", other),
        }
        match classify_database_message(
            "UNIQUE constraint failed: cash_book_entries.garage_id, cash_book_entries.position",
        ) {
            DbError::UniqueViolation { field, .. } => assert_eq!(field, "ledger position"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            classify_database_message("FOREIGN KEY constraint failed").kind(),
            ErrorKind::NotFound
        );
        assert!(matches!(
            classify_database_message("no such table: nope"),
            DbError::QueryFailed(_)
        ));
    }

    #[test]
    fn test_messages() {
        let err = DbError::InsufficientStock {
            stock_id: "oil-5w30".to_string(),
            available: 1,
            requested: 4,
        };
        assert_eq!(err.to_string(), "Insufficient stock for oil-5w30: available 1, requested 4");
    }
}
