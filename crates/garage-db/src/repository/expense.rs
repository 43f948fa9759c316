//! # Expense Repository
//!
//! Expense records and the DEBIT cash book entry each one raises.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::cash_book;
use garage_core::{CashBookEntry, DateRange, EntryDetails, Expense, ExpenseCategory, Money, PaymentMethod};

const EXPENSE_COLUMNS: &str = "id, garage_id, title, description, amount_cents, category, payment_method, \
     vendor_name, receipt_number, expense_date, created_at, updated_at";

#[derive(Debug, FromRow)]
struct ExpenseRow {
    id: String,
    garage_id: String,
    title: String,
    description: Option<String>,
    amount_cents: i64,
    category: ExpenseCategory,
    payment_method: Option<PaymentMethod>,
    vendor_name: Option<String>,
    receipt_number: Option<String>,
    expense_date: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ExpenseRow> for Expense {
    fn from(row: ExpenseRow) -> Self {
        Expense {
            id: row.id,
            garage_id: row.garage_id,
            title: row.title,
            description: row.description,
            amount: Money::from_cents(row.amount_cents),
            category: row.category,
            method: row.payment_method,
            vendor_name: row.vendor_name,
            receipt_number: row.receipt_number,
            date: row.expense_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for expense records.
#[derive(Debug, Clone)]
pub struct ExpenseRepository {
    pool: SqlitePool,
}

impl ExpenseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ExpenseRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Inserts the expense and appends its ledger entry in one transaction.
    pub async fn insert(
        &self,
        expense: &Expense,
        entry: EntryDetails,
        now: DateTime<Utc>,
    ) -> DbResult<(Expense, CashBookEntry)> {
        let mut tx = self.pool.begin().await?;
        insert_expense(&mut tx, expense).await?;
        let appended = cash_book::append_entry(&mut tx, &expense.garage_id, entry, now).await?;
        let stored = load_required(&mut tx, &expense.id).await?;
        tx.commit().await?;

        info!(
            id = %stored.id,
            garage_id = %stored.garage_id,
            amount = %stored.amount,
            category = %stored.category,
            "Expense recorded"
        );
        Ok((stored, appended))
    }

    /// Rewrites the expense and corrects its ledger entry in place.
    pub async fn update(
        &self,
        expense: &Expense,
        entry: EntryDetails,
        now: DateTime<Utc>,
    ) -> DbResult<(Expense, CashBookEntry)> {
        let mut tx = self.pool.begin().await?;
        update_expense(&mut tx, expense).await?;

        let linked = cash_book::entries_for_expense(&mut tx, &expense.id).await?;
        let corrected = match linked.first() {
            Some(entry_id) => cash_book::correct_entry(&mut tx, entry_id, entry, now).await?,
            None => cash_book::append_entry(&mut tx, &expense.garage_id, entry, now).await?,
        };
        let stored = load_required(&mut tx, &expense.id).await?;
        tx.commit().await?;

        info!(id = %stored.id, amount = %stored.amount, "Expense updated");
        Ok((stored, corrected))
    }

    /// Deletes the expense and every ledger entry it raised.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let linked = cash_book::entries_for_expense(&mut tx, id).await?;
        for entry_id in &linked {
            cash_book::remove_entry(&mut tx, entry_id).await?;
        }

        let result = sqlx::query("DELETE FROM expenses WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Expense", id));
        }
        tx.commit().await?;

        info!(id = %id, entries = linked.len(), "Expense deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Expense>> {
        let mut conn = self.pool.acquire().await?;
        load(&mut conn, id).await
    }

    pub async fn require(&self, id: &str) -> DbResult<Expense> {
        self.get_by_id(id).await?.ok_or_else(|| DbError::not_found("Expense", id))
    }

    pub async fn list_by_garage(&self, garage_id: &str) -> DbResult<Vec<Expense>> {
        self.fetch("garage_id = ?1", &[garage_id]).await
    }

    pub async fn list_by_date_range(&self, garage_id: &str, range: DateRange) -> DbResult<Vec<Expense>> {
        let (from, to) = (range.from.to_string(), range.to.to_string());
        self.fetch(
            "garage_id = ?1 AND expense_date >= ?2 AND expense_date <= ?3",
            &[garage_id, from.as_str(), to.as_str()],
        )
        .await
    }

    pub async fn list_by_category(&self, garage_id: &str, category: ExpenseCategory) -> DbResult<Vec<Expense>> {
        self.fetch("garage_id = ?1 AND category = ?2", &[garage_id, category.as_str()])
            .await
    }

    async fn fetch(&self, filter: &str, args: &[&str]) -> DbResult<Vec<Expense>> {
        let sql = format!(
            "SELECT {} FROM expenses WHERE {} ORDER BY expense_date DESC, created_at DESC",
            EXPENSE_COLUMNS, filter
        );
        debug!(filter = %filter, "Listing expenses");

        let mut query = sqlx::query_as::<_, ExpenseRow>(&sql);
        for arg in args {
            query = query.bind(*arg);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Expense::from).collect())
    }
}

// =============================================================================
// Transactional helpers
// =============================================================================

async fn insert_expense(conn: &mut SqliteConnection, expense: &Expense) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO expenses (
            id, garage_id, title, description, amount_cents, category, payment_method,
            vendor_name, receipt_number, expense_date, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&expense.id)
    .bind(&expense.garage_id)
    .bind(&expense.title)
    .bind(&expense.description)
    .bind(expense.amount.cents())
    .bind(expense.category)
    .bind(expense.method)
    .bind(&expense.vendor_name)
    .bind(&expense.receipt_number)
    .bind(expense.date)
    .bind(expense.created_at)
    .bind(expense.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn update_expense(conn: &mut SqliteConnection, expense: &Expense) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE expenses SET
            title = ?1, description = ?2, amount_cents = ?3, category = ?4, payment_method = ?5,
            vendor_name = ?6, receipt_number = ?7, expense_date = ?8, updated_at = ?9
        WHERE id = ?10 AND garage_id = ?11
        "#,
    )
    .bind(&expense.title)
    .bind(&expense.description)
    .bind(expense.amount.cents())
    .bind(expense.category)
    .bind(expense.method)
    .bind(&expense.vendor_name)
    .bind(&expense.receipt_number)
    .bind(expense.date)
    .bind(expense.updated_at)
    .bind(&expense.id)
    .bind(&expense.garage_id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Expense", &expense.id));
    }
    Ok(())
}

async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Expense>> {
    let sql = format!("SELECT {} FROM expenses WHERE id = ?1", EXPENSE_COLUMNS);
    let row: Option<ExpenseRow> = sqlx::query_as(&sql).bind(id).fetch_optional(conn).await?;
    Ok(row.map(Expense::from))
}

async fn load_required(conn: &mut SqliteConnection, id: &str) -> DbResult<Expense> {
    load(conn, id).await?.ok_or_else(|| DbError::not_found("Expense", id))
}

// =============================================================================
// Unit Tests
// =============================================================================
