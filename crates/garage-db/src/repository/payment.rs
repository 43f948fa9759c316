//! # Payment Repository
//!
//! Payment records and the CREDIT cash book entry each one raises. A record
//! and its entry are always written, corrected and removed together.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::cash_book;
use garage_core::{CashBookEntry, DateRange, EntryDetails, Money, Payment, PaymentMethod, PaymentType};

const PAYMENT_COLUMNS: &str = "id, garage_id, job_card_id, invoice_id, amount_cents, payment_method, \
     payment_type, description, customer_name, customer_phone, vehicle_number, invoice_number, \
     payment_date, created_at, updated_at";

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: String,
    garage_id: String,
    job_card_id: Option<String>,
    invoice_id: Option<String>,
    amount_cents: i64,
    payment_method: PaymentMethod,
    payment_type: PaymentType,
    description: Option<String>,
    customer_name: Option<String>,
    customer_phone: Option<String>,
    vehicle_number: Option<String>,
    invoice_number: Option<String>,
    payment_date: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Payment {
            id: row.id,
            garage_id: row.garage_id,
            job_card_id: row.job_card_id,
            invoice_id: row.invoice_id,
            amount: Money::from_cents(row.amount_cents),
            method: row.payment_method,
            payment_type: row.payment_type,
            description: row.description,
            customer_name: row.customer_name,
            customer_phone: row.customer_phone,
            vehicle_number: row.vehicle_number,
            invoice_number: row.invoice_number,
            date: row.payment_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for payment records.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Inserts the payment and appends its ledger entry in one transaction.
    pub async fn insert(
        &self,
        payment: &Payment,
        entry: EntryDetails,
        now: DateTime<Utc>,
    ) -> DbResult<(Payment, CashBookEntry)> {
        let mut tx = self.pool.begin().await?;
        insert_payment(&mut tx, payment).await?;
        let appended = cash_book::append_entry(&mut tx, &payment.garage_id, entry, now).await?;
        let stored = load_required(&mut tx, &payment.id).await?;
        tx.commit().await?;

        info!(
            id = %stored.id,
            garage_id = %stored.garage_id,
            amount = %stored.amount,
            payment_type = %stored.payment_type,
            "Payment recorded"
        );
        Ok((stored, appended))
    }

    /// Rewrites the payment and corrects its ledger entry in place. A payment
    /// whose entry was removed from the cash book gets a fresh one.
    pub async fn update(
        &self,
        payment: &Payment,
        entry: EntryDetails,
        now: DateTime<Utc>,
    ) -> DbResult<(Payment, CashBookEntry)> {
        let mut tx = self.pool.begin().await?;
        update_payment(&mut tx, payment).await?;

        let linked = cash_book::entries_for_payment(&mut tx, &payment.id).await?;
        let corrected = match linked.first() {
            Some(entry_id) => cash_book::correct_entry(&mut tx, entry_id, entry, now).await?,
            None => cash_book::append_entry(&mut tx, &payment.garage_id, entry, now).await?,
        };
        let stored = load_required(&mut tx, &payment.id).await?;
        tx.commit().await?;

        info!(id = %stored.id, amount = %stored.amount, "Payment updated");
        Ok((stored, corrected))
    }

    /// Deletes the payment and every ledger entry it raised.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let linked = cash_book::entries_for_payment(&mut tx, id).await?;
        for entry_id in &linked {
            cash_book::remove_entry(&mut tx, entry_id).await?;
        }

        let result = sqlx::query("DELETE FROM payments WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Payment", id));
        }
        tx.commit().await?;

        info!(id = %id, entries = linked.len(), "Payment deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Payment>> {
        let mut conn = self.pool.acquire().await?;
        load(&mut conn, id).await
    }

    pub async fn require(&self, id: &str) -> DbResult<Payment> {
        self.get_by_id(id).await?.ok_or_else(|| DbError::not_found("Payment", id))
    }

    /// The garage's payments, most recent first.
    pub async fn list_by_garage(&self, garage_id: &str) -> DbResult<Vec<Payment>> {
        self.fetch("garage_id = ?1", &[garage_id]).await
    }

    /// Payments dated within `range`, inclusive.
    pub async fn list_by_date_range(&self, garage_id: &str, range: DateRange) -> DbResult<Vec<Payment>> {
        let (from, to) = (range.from.to_string(), range.to.to_string());
        self.fetch(
            "garage_id = ?1 AND payment_date >= ?2 AND payment_date <= ?3",
            &[garage_id, from.as_str(), to.as_str()],
        )
        .await
    }

    pub async fn list_by_type(&self, garage_id: &str, payment_type: PaymentType) -> DbResult<Vec<Payment>> {
        self.fetch("garage_id = ?1 AND payment_type = ?2", &[garage_id, payment_type.as_str()])
            .await
    }

    pub async fn list_by_method(&self, garage_id: &str, method: PaymentMethod) -> DbResult<Vec<Payment>> {
        self.fetch("garage_id = ?1 AND payment_method = ?2", &[garage_id, method.as_str()])
            .await
    }

    pub async fn list_by_job_card(&self, job_card_id: &str) -> DbResult<Vec<Payment>> {
        self.fetch("job_card_id = ?1", &[job_card_id]).await
    }

    async fn fetch(&self, filter: &str, args: &[&str]) -> DbResult<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE {} ORDER BY payment_date DESC, created_at DESC",
            PAYMENT_COLUMNS, filter
        );
        debug!(filter = %filter, "Listing payments");

        let mut query = sqlx::query_as::<_, PaymentRow>(&sql);
        for arg in args {
            query = query.bind(*arg);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Payment::from).collect())
    }
}

// =============================================================================
// Transactional helpers
// =============================================================================

async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, garage_id, job_card_id, invoice_id, amount_cents, payment_method,
            payment_type, description, customer_name, customer_phone, vehicle_number, invoice_number,
            payment_date, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.garage_id)
    .bind(&payment.job_card_id)
    .bind(&payment.invoice_id)
    .bind(payment.amount.cents())
    .bind(payment.method)
    .bind(payment.payment_type)
    .bind(&payment.description)
    .bind(&payment.customer_name)
    .bind(&payment.customer_phone)
    .bind(&payment.vehicle_number)
    .bind(&payment.invoice_number)
    .bind(payment.date)
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn update_payment(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE payments SET
            job_card_id = ?1, invoice_id = ?2, amount_cents = ?3, payment_method = ?4,
            payment_type = ?5, description = ?6, customer_name = ?7, customer_phone = ?8,
            vehicle_number = ?9, invoice_number = ?10, payment_date = ?11, updated_at = ?12
        WHERE id = ?13 AND garage_id = ?14
        "#,
    )
    .bind(&payment.job_card_id)
    .bind(&payment.invoice_id)
    .bind(payment.amount.cents())
    .bind(payment.method)
    .bind(payment.payment_type)
    .bind(&payment.description)
    .bind(&payment.customer_name)
    .bind(&payment.customer_phone)
    .bind(&payment.vehicle_number)
    .bind(&payment.invoice_number)
    .bind(payment.date)
    .bind(payment.updated_at)
    .bind(&payment.id)
    .bind(&payment.garage_id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Payment", &payment.id));
    }
    Ok(())
}

async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Payment>> {
    let sql = format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLUMNS);
    let row: Option<PaymentRow> = sqlx::query_as(&sql).bind(id).fetch_optional(conn).await?;
    Ok(row.map(Payment::from))
}

async fn load_required(conn: &mut SqliteConnection, id: &str) -> DbResult<Payment> {
    load(conn, id).await?.ok_or_else(|| DbError::not_found("Payment", id))
}

// =============================================================================
// Unit Tests
// =============================================================================
