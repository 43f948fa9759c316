//! # Ledger Database Handle
//!
//! Opens the garage ledger's SQLite file and hands out repositories that
//! share one pool.
//!
//! ## Who Writes What
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Ledger Database                                │
//! │                                                                         │
//! │  Database::new(DbConfig) ── WAL, foreign keys, busy_timeout, migrate   │
//! │       │                                                                 │
//! │       ├── garages()    garage rows + ledger_version (append fence)     │
//! │       ├── stock()      delta updates only: quantity = quantity + ?     │
//! │       ├── job_cards()  card + items + stock movements, one transaction │
//! │       ├── invoices()   numbering counter, invoice + items (+ entry)    │
//! │       ├── cash_book()  append / correct / delete with rebalance        │
//! │       ├── payments()   payment record + its CREDIT entry               │
//! │       └── expenses()   expense record + its DEBIT entry                │
//! │                                                                         │
//! │  Many readers run side by side. A second writer blocks on SQLite's     │
//! │  write lock for up to `busy_timeout` before giving up.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::cash_book::CashBookRepository;
use crate::repository::expense::ExpenseRepository;
use crate::repository::garage::GarageRepository;
use crate::repository::invoice::InvoiceRepository;
use crate::repository::job_card::JobCardRepository;
use crate::repository::payment::PaymentRepository;
use crate::repository::stock::StockRepository;

const MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Where the ledger lives and how hard writers wait for each other.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/garage/ledger.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Ledger file, or `:memory:` for a throwaway database.
    pub database_path: PathBuf,

    pub max_connections: u32,

    /// How long `acquire()` waits for a free connection.
    pub acquire_timeout: Duration,

    /// How long a writer waits on SQLite's lock before failing.
    pub busy_timeout: Duration,

    /// `None` keeps idle connections forever.
    pub idle_timeout: Option<Duration>,

    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(600)),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Skips migrations, for tools that open a ledger read-only.
    pub fn without_migrations(mut self) -> Self {
        self.run_migrations = false;
        self
    }

    /// A private ledger for tests.
    ///
    /// Each connection to `:memory:` opens a separate database, so the pool is
    /// pinned to a single connection that is never idled out or recycled.
    /// Callers must not hold that connection while issuing other queries.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(MEMORY_PATH),
            max_connections: 1,
            idle_timeout: None,
            ..DbConfig::new(MEMORY_PATH)
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_PATH
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let url = if self.is_in_memory() {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", self.database_path.display())
        };

        Ok(SqliteConnectOptions::from_str(&url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // invoice -> job card links rely on ON DELETE SET NULL
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout)
            .create_if_missing(true))
    }
}

// =============================================================================
// Database
// =============================================================================

/// Pool handle. Clones share the pool; repositories are created per call.
///
/// ```rust,ignore
/// let db = Database::new(DbConfig::in_memory()).await?;
/// let garage = db.garages().require("garage-1").await?;
/// let cards = db.job_cards().list_by_garage(&garage.id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the ledger and applies pending migrations.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            busy_timeout_ms = config.busy_timeout.as_millis() as u64,
            "Opening ledger database"
        );

        let mut options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout);
        if config.is_in_memory() {
            options = options.max_lifetime(None);
        }

        let pool = options
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        debug!("Ledger pool connected");

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Raw pool, for ad-hoc queries and tests.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn garages(&self) -> GarageRepository {
        GarageRepository::new(self.pool.clone())
    }

    /// The inventory collaborator.
    pub fn stock(&self) -> StockRepository {
        StockRepository::new(self.pool.clone())
    }

    pub fn job_cards(&self) -> JobCardRepository {
        JobCardRepository::new(self.pool.clone())
    }

    pub fn invoices(&self) -> InvoiceRepository {
        InvoiceRepository::new(self.pool.clone())
    }

    pub fn cash_book(&self) -> CashBookRepository {
        CashBookRepository::new(self.pool.clone())
    }

    pub fn payments(&self) -> PaymentRepository {
        PaymentRepository::new(self.pool.clone())
    }

    pub fn expenses(&self) -> ExpenseRepository {
        ExpenseRepository::new(self.pool.clone())
    }

    pub async fn close(&self) {
        info!("Closing ledger database");
        self.pool.close().await;
    }

    /// `true` when a trivial query succeeds.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_ledger_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert!(total > 0);
        assert_eq!(total, applied);

        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys").fetch_one(db.pool()).await.unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/garage.db")
            .max_connections(10)
            .busy_timeout(Duration::from_secs(2))
            .without_migrations();

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.busy_timeout, Duration::from_secs(2));
        assert!(!config.run_migrations);
        assert!(!config.is_in_memory());

        let memory = DbConfig::in_memory();
        assert!(memory.is_in_memory());
        assert_eq!(memory.max_connections, 1);
        assert_eq!(memory.idle_timeout, None);
    }
}
