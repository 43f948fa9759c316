//! # Stock Repository
//!
//! Quantity on hand for spare parts and lubricants.
//!
//! ## Stock Movements
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Job Card → Stock                                    │
//! │                                                                         │
//! │  JobCard::add_item(qty 3)  ──► StockMovement { oil, -3 }               │
//! │                                      │                                  │
//! │                                      ▼                                  │
//! │  JobCardRepository::save ──► apply_movements(tx, garage, moves, policy)│
//! │                                      │                                  │
//! │                                      ▼                                  │
//! │  UPDATE stock_items SET quantity = quantity + ?   (delta, never a read-│
//! │         WHERE id = ? AND garage_id = ?             modify-write)        │
//! │                                                                         │
//! │  BestEffort: unknown id → warn!, skip;  quantity may go negative       │
//! │  Strict:     unknown id → NotFound;     short stock → InsufficientStock│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use garage_core::{Money, StockCatalog, StockItem, StockMovement};

// =============================================================================
// Policy
// =============================================================================

/// How job card transactions treat stock they cannot fully satisfy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockPolicy {
    /// Skip unknown stock ids with a warning; allow negative quantities.
    #[default]
    BestEffort,
    /// Fail the whole operation on unknown ids or insufficient quantity.
    Strict,
}

impl StockPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockPolicy::BestEffort => "best_effort",
            StockPolicy::Strict => "strict",
        }
    }
}

impl fmt::Display for StockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "best_effort" => Ok(StockPolicy::BestEffort),
            "strict" => Ok(StockPolicy::Strict),
            other => Err(format!("unknown stock policy '{}'", other)),
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, FromRow)]
struct StockRow {
    id: String,
    garage_id: String,
    catalog: StockCatalog,
    name: String,
    code: Option<String>,
    quantity: i64,
    unit_price_cents: i64,
    updated_at: DateTime<Utc>,
}

impl From<StockRow> for StockItem {
    fn from(row: StockRow) -> Self {
        StockItem {
            id: row.id,
            garage_id: row.garage_id,
            catalog: row.catalog,
            name: row.name,
            code: row.code,
            quantity: row.quantity,
            unit_price: Money::from_cents(row.unit_price_cents),
            updated_at: row.updated_at,
        }
    }
}

const STOCK_COLUMNS: &str = "id, garage_id, catalog, name, code, quantity, unit_price_cents, updated_at";

/// Repository for the stock catalog (the inventory collaborator).
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    pub async fn insert(&self, item: &StockItem) -> DbResult<()> {
        debug!(id = %item.id, catalog = %item.catalog.as_str(), "Inserting stock item");

        sqlx::query(
            r#"
            INSERT INTO stock_items (id, garage_id, catalog, name, code, quantity, unit_price_cents, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&item.id)
        .bind(&item.garage_id)
        .bind(item.catalog)
        .bind(&item.name)
        .bind(&item.code)
        .bind(item.quantity)
        .bind(item.unit_price.cents())
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<StockItem>> {
        let sql = format!("SELECT {} FROM stock_items WHERE id = ?1", STOCK_COLUMNS);
        let row: Option<StockRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(StockItem::from))
    }

    pub async fn list_by_garage(&self, garage_id: &str) -> DbResult<Vec<StockItem>> {
        let sql = format!(
            "SELECT {} FROM stock_items WHERE garage_id = ?1 ORDER BY catalog ASC, name ASC",
            STOCK_COLUMNS
        );
        let rows: Vec<StockRow> = sqlx::query_as(&sql).bind(garage_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(StockItem::from).collect())
    }

    /// Quantity on hand, `None` for an unknown id.
    pub async fn quantity(&self, id: &str) -> DbResult<Option<i64>> {
        let quantity: Option<i64> = sqlx::query_scalar("SELECT quantity FROM stock_items WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(quantity)
    }

    /// Decrements quantity on hand. Returns `false` for an unknown id.
    pub async fn decrement_stock(&self, id: &str, quantity: i64) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        adjust_quantity(&mut conn, id, -quantity).await
    }

    /// Increments quantity on hand. Returns `false` for an unknown id.
    pub async fn increment_stock(&self, id: &str, quantity: i64) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        adjust_quantity(&mut conn, id, quantity).await
    }

    pub async fn count_by_garage(&self, garage_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_items WHERE garage_id = ?1")
            .bind(garage_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Transactional helpers
// =============================================================================

async fn adjust_quantity(conn: &mut SqliteConnection, id: &str, delta: i64) -> DbResult<bool> {
    let result = sqlx::query("UPDATE stock_items SET quantity = quantity + ?1, updated_at = ?2 WHERE id = ?3")
        .bind(delta)
        .bind(Utc::now())
        .bind(id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

async fn adjust_garage_quantity(
    conn: &mut SqliteConnection,
    garage_id: &str,
    id: &str,
    delta: i64,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE stock_items SET quantity = quantity + ?1, updated_at = ?2 WHERE id = ?3 AND garage_id = ?4",
    )
    .bind(delta)
    .bind(Utc::now())
    .bind(id)
    .bind(garage_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Applies job card stock movements inside the caller's transaction.
///
/// Only `garage_id`'s own stock is touched: an id belonging to another garage
/// counts as unknown. Movements for untracked catalogs are ignored. Under [`StockPolicy::Strict`]
/// an error leaves earlier movements applied only until the caller's
/// transaction rolls back.
pub(crate) async fn apply_movements(
    conn: &mut SqliteConnection,
    garage_id: &str,
    movements: &[StockMovement],
    policy: StockPolicy,
) -> DbResult<()> {
    for movement in movements {
        if !movement.stock.catalog.tracks_quantity() || movement.delta == 0 {
            continue;
        }
        let stock_id = movement.stock.stock_id.as_str();

        if policy == StockPolicy::Strict {
            let available: Option<i64> =
                sqlx::query_scalar("SELECT quantity FROM stock_items WHERE id = ?1 AND garage_id = ?2")
                    .bind(stock_id)
                    .bind(garage_id)
                    .fetch_optional(&mut *conn)
                    .await?;
            let available = available.ok_or_else(|| DbError::not_found("Stock item", stock_id))?;

            if movement.delta < 0 && available < -movement.delta {
                return Err(DbError::InsufficientStock {
                    stock_id: stock_id.to_string(),
                    available,
                    requested: -movement.delta,
                });
            }
        }

        if adjust_garage_quantity(&mut *conn, garage_id, stock_id, movement.delta).await? {
            debug!(stock_id = %stock_id, delta = movement.delta, "Stock adjusted");
        } else {
            warn!(
                garage_id = %garage_id,
                stock_id = %stock_id,
                delta = movement.delta,
                "Unknown stock id, movement skipped"
            );
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
