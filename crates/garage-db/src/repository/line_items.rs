//! Line item persistence shared by job cards and invoices.
//!
//! Both item tables have identical columns and differ only in the name of
//! the table and of the parent column, so one row type and one set of
//! statements serve both.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use crate::error::DbResult;
use garage_core::{ItemKind, LineAmounts, LineItem, Money, Rate, StockCatalog, StockRef};

const ITEM_COLUMNS: &str = "id, position, item_type, name, code, description, \
     quantity, unit_price_cents, discount_cents, tax_rate_bps, tax_cents, total_cents, \
     stock_catalog, stock_id, created_at";

/// Which parent an item table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemTable {
    JobCard,
    Invoice,
}

impl ItemTable {
    fn table(self) -> &'static str {
        match self {
            ItemTable::JobCard => "job_card_items",
            ItemTable::Invoice => "invoice_items",
        }
    }

    fn parent_column(self) -> &'static str {
        match self {
            ItemTable::JobCard => "job_card_id",
            ItemTable::Invoice => "invoice_id",
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct LineItemRow {
    id: String,
    item_type: ItemKind,
    name: String,
    code: Option<String>,
    description: Option<String>,
    quantity: i64,
    unit_price_cents: i64,
    discount_cents: i64,
    tax_rate_bps: u32,
    tax_cents: i64,
    stock_catalog: Option<StockCatalog>,
    stock_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl LineItemRow {
    /// Stored totals are ignored; `LineAmounts::new` recomputes them.
    fn into_item(self) -> LineItem {
        let stock = match (self.stock_catalog, self.stock_id) {
            (Some(catalog), Some(stock_id)) => Some(StockRef::new(catalog, stock_id)),
            _ => None,
        };

        LineItem {
            id: self.id,
            kind: self.item_type,
            name: self.name,
            code: self.code,
            description: self.description,
            amounts: LineAmounts::new(
                self.quantity,
                Money::from_cents(self.unit_price_cents),
                Money::from_cents(self.discount_cents),
                Some(Rate::from_bps(self.tax_rate_bps)),
                Some(Money::from_cents(self.tax_cents)),
            ),
            stock,
            created_at: self.created_at,
        }
    }
}

/// Loads the items of one parent in position order.
pub(crate) async fn load_items(
    conn: &mut SqliteConnection,
    table: ItemTable,
    parent_id: &str,
) -> DbResult<Vec<LineItem>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1 ORDER BY position ASC",
        ITEM_COLUMNS,
        table.table(),
        table.parent_column()
    );

    let rows: Vec<LineItemRow> = sqlx::query_as(&sql).bind(parent_id).fetch_all(conn).await?;

    Ok(rows.into_iter().map(LineItemRow::into_item).collect())
}

/// Inserts `items` under `parent_id`, numbering positions from 0.
pub(crate) async fn insert_items(
    conn: &mut SqliteConnection,
    table: ItemTable,
    parent_id: &str,
    items: &[LineItem],
) -> DbResult<()> {
    let sql = format!(
        "INSERT INTO {} ({}, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        table.table(),
        ITEM_COLUMNS,
        table.parent_column()
    );

    for (position, item) in items.iter().enumerate() {
        let amounts = &item.amounts;
        sqlx::query(&sql)
            .bind(&item.id)
            .bind(position as i64)
            .bind(item.kind)
            .bind(&item.name)
            .bind(&item.code)
            .bind(&item.description)
            .bind(amounts.quantity())
            .bind(amounts.unit_price().cents())
            .bind(amounts.discount().cents())
            .bind(amounts.tax_rate().bps())
            .bind(amounts.tax().cents())
            .bind(amounts.total().cents())
            .bind(item.stock.as_ref().map(|s| s.catalog))
            .bind(item.stock.as_ref().map(|s| s.stock_id.as_str()))
            .bind(item.created_at)
            .bind(parent_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Replaces the full item list of a parent.
pub(crate) async fn replace_items(
    conn: &mut SqliteConnection,
    table: ItemTable,
    parent_id: &str,
    items: &[LineItem],
) -> DbResult<()> {
    let sql = format!("DELETE FROM {} WHERE {} = ?1", table.table(), table.parent_column());
    sqlx::query(&sql).bind(parent_id).execute(&mut *conn).await?;

    insert_items(conn, table, parent_id, items).await
}
