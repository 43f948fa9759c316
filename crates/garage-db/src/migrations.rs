//! Embedded schema for the garage ledger (`migrations/sqlite/NNN_*.sql`).
//!
//! Files are applied in name order, each in its own transaction. Shipped
//! files are immutable: schema changes go into a new numbered file.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static LEDGER_SCHEMA: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Brings the ledger schema up to date. A no-op when nothing is pending.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let (known, applied) = migration_status(pool).await.unwrap_or((LEDGER_SCHEMA.migrations.len(), 0));
    debug!(known, applied, "Ledger schema status");

    LEDGER_SCHEMA.run(pool).await?;

    if applied < known {
        info!(pending = known - applied, "Ledger schema migrated");
    }
    Ok(())
}

/// `(known, applied)` migration counts. Fails before the first run, when the
/// bookkeeping table does not exist yet.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await?;

    Ok((LEDGER_SCHEMA.migrations.len(), applied as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_rerun_is_noop() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        run_migrations(db.pool()).await.unwrap();

        let (known, applied) = migration_status(db.pool()).await.unwrap();
        assert_eq!(known, applied);

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name")
                .fetch_all(db.pool())
                .await
                .unwrap();
        for table in [
            "cash_book_entries",
            "expenses",
            "garages",
            "invoice_sequences",
            "invoices",
            "job_cards",
            "payments",
            "stock_items",
        ] {
            assert!(tables.iter().any(|t| t == table), "missing {}", table);
        }
    }
}
