//! # Invoice Repository
//!
//! Persistence for invoices, their items and the invoice number counter.
//!
//! ## Numbering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  next_number(garage, day)                                               │
//! │                                                                         │
//! │  INSERT INTO invoice_sequences (garage_id, day, last_seq)              │
//! │  VALUES (?, ?, 1)                                                       │
//! │  ON CONFLICT (garage_id, day) DO UPDATE SET last_seq = last_seq + 1    │
//! │  RETURNING last_seq                                                     │
//! │                                                                         │
//! │  One statement, so two callers can never read the same value. The     │
//! │  number is taken before the invoice is written: an invoice that later  │
//! │  fails to insert leaves a gap, never a duplicate.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::cash_book;
use crate::repository::contains_pattern;
use crate::repository::line_items::{self, ItemTable};
use garage_core::invoice::InvoiceParts;
use garage_core::{
    CashBookEntry, DateRange, EntryDetails, Invoice, InvoiceCustomer, InvoiceNumber, InvoiceStatus, Money,
    PaymentStatus, Rate, VehicleSnapshot,
};

const INVOICE_COLUMNS: &str = "id, invoice_number, garage_id, job_card_id, \
     customer_name, customer_phone, customer_email, customer_address, \
     vehicle_number, vehicle_make, vehicle_model, \
     discount_cents, discount_rate_bps, tax_cents, tax_rate_bps, paid_cents, status, \
     invoice_date, due_date, paid_date, notes, terms, created_at, updated_at, version";

const NEWEST_FIRST: &str = "invoice_date DESC, created_at DESC, rowid DESC";

#[derive(Debug, FromRow)]
struct InvoiceRow {
    id: String,
    invoice_number: String,
    garage_id: String,
    job_card_id: Option<String>,
    customer_name: String,
    customer_phone: Option<String>,
    customer_email: Option<String>,
    customer_address: Option<String>,
    vehicle_number: Option<String>,
    vehicle_make: Option<String>,
    vehicle_model: Option<String>,
    discount_cents: i64,
    discount_rate_bps: u32,
    tax_cents: i64,
    tax_rate_bps: u32,
    paid_cents: i64,
    status: InvoiceStatus,
    invoice_date: NaiveDate,
    due_date: Option<NaiveDate>,
    paid_date: Option<NaiveDate>,
    notes: Option<String>,
    terms: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl InvoiceRow {
    fn into_parts(self) -> InvoiceParts {
        InvoiceParts {
            id: self.id,
            invoice_number: self.invoice_number,
            garage_id: self.garage_id,
            job_card_id: self.job_card_id,
            customer: InvoiceCustomer {
                name: self.customer_name,
                phone: self.customer_phone,
                email: self.customer_email,
                address: self.customer_address,
            },
            vehicle: VehicleSnapshot {
                number: self.vehicle_number,
                make: self.vehicle_make,
                model: self.vehicle_model,
            },
            discount: Money::from_cents(self.discount_cents),
            discount_rate: Rate::from_bps(self.discount_rate_bps),
            tax: Money::from_cents(self.tax_cents),
            tax_rate: Rate::from_bps(self.tax_rate_bps),
            paid: Money::from_cents(self.paid_cents),
            status: self.status,
            invoice_date: self.invoice_date,
            due_date: self.due_date,
            paid_date: self.paid_date,
            notes: self.notes,
            terms: self.terms,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }
}

/// Repository for invoice database operations.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Numbering
    // -------------------------------------------------------------------------

    /// Allocates the next invoice number for `garage_id` on `date`.
    ///
    /// ## Errors
    /// - `ForeignKeyViolation` when the garage does not exist
    pub async fn next_number(&self, prefix: &str, garage_id: &str, date: NaiveDate) -> DbResult<InvoiceNumber> {
        let day = InvoiceNumber::day_key(date);
        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO invoice_sequences (garage_id, day, last_seq) VALUES (?1, ?2, 1)
            ON CONFLICT (garage_id, day) DO UPDATE SET last_seq = last_seq + 1
            RETURNING last_seq
            "#,
        )
        .bind(garage_id)
        .bind(&day)
        .fetch_one(&self.pool)
        .await?;

        let sequence = u32::try_from(seq)
            .map_err(|_| DbError::Internal(format!("invoice sequence {} out of range", seq)))?;
        debug!(garage_id = %garage_id, day = %day, sequence = sequence, "Invoice number allocated");

        Ok(InvoiceNumber::new(prefix, garage_id, date, sequence))
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Inserts a new invoice with its items and returns the stored state.
    pub async fn insert(&self, invoice: &Invoice) -> DbResult<Invoice> {
        let mut tx = self.pool.begin().await?;
        insert_invoice(&mut tx, invoice).await?;
        let stored = load_required(&mut tx, &invoice.id).await?;
        tx.commit().await?;

        info!(
            id = %stored.id,
            invoice_number = %stored.invoice_number,
            total = %stored.total(),
            "Invoice created"
        );
        Ok(stored)
    }

    /// Persists a modified invoice (header CAS on `version`, items replaced).
    pub async fn save(&self, invoice: &Invoice) -> DbResult<Invoice> {
        let mut tx = self.pool.begin().await?;
        write_invoice(&mut tx, invoice).await?;
        let stored = load_required(&mut tx, &invoice.id).await?;
        tx.commit().await?;

        debug!(id = %stored.id, version = stored.version(), "Invoice saved");
        Ok(stored)
    }

    /// Persists a paid-into invoice and appends its cash book entry in the
    /// same transaction.
    pub async fn save_with_entry(
        &self,
        invoice: &Invoice,
        entry: EntryDetails,
        now: DateTime<Utc>,
    ) -> DbResult<(Invoice, CashBookEntry)> {
        let mut tx = self.pool.begin().await?;
        write_invoice(&mut tx, invoice).await?;
        let appended = cash_book::append_entry(&mut tx, &invoice.garage_id, entry, now).await?;
        let stored = load_required(&mut tx, &invoice.id).await?;
        tx.commit().await?;

        Ok((stored, appended))
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Invoice", id));
        }
        info!(id = %id, "Invoice deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        load(&mut conn, "id", id).await
    }

    pub async fn require(&self, id: &str) -> DbResult<Invoice> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", id))
    }

    pub async fn get_by_number(&self, invoice_number: &str) -> DbResult<Option<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        load(&mut conn, "invoice_number", invoice_number).await
    }

    pub async fn list_all(&self) -> DbResult<Vec<Invoice>> {
        self.fetch("1 = 1", &[]).await
    }

    pub async fn list_by_garage(&self, garage_id: &str) -> DbResult<Vec<Invoice>> {
        self.fetch("garage_id = ?1", &[garage_id]).await
    }

    pub async fn list_by_status(&self, garage_id: &str, status: InvoiceStatus) -> DbResult<Vec<Invoice>> {
        self.fetch("garage_id = ?1 AND status = ?2", &[garage_id, status.as_str()])
            .await
    }

    pub async fn list_by_payment_status(&self, garage_id: &str, status: PaymentStatus) -> DbResult<Vec<Invoice>> {
        self.fetch("garage_id = ?1 AND payment_status = ?2", &[garage_id, status.as_str()])
            .await
    }

    /// Invoices dated within `range`, inclusive.
    pub async fn list_by_date_range(&self, garage_id: &str, range: DateRange) -> DbResult<Vec<Invoice>> {
        let (from, to) = (range.from.to_string(), range.to.to_string());
        self.fetch(
            "garage_id = ?1 AND invoice_date >= ?2 AND invoice_date <= ?3",
            &[garage_id, from.as_str(), to.as_str()],
        )
        .await
    }

    /// Due before `today` and not fully paid, cancelled invoices included.
    pub async fn list_overdue(&self, garage_id: &str, today: NaiveDate) -> DbResult<Vec<Invoice>> {
        let today = today.to_string();
        self.fetch(
            "garage_id = ?1 AND due_date IS NOT NULL AND due_date < ?2 AND payment_status != 'PAID'",
            &[garage_id, today.as_str()],
        )
        .await
    }

    pub async fn list_by_job_card(&self, job_card_id: &str) -> DbResult<Vec<Invoice>> {
        self.fetch("job_card_id = ?1", &[job_card_id]).await
    }

    /// Case-insensitive substring match on name, phone or email.
    pub async fn search_by_customer(&self, garage_id: &str, query: &str) -> DbResult<Vec<Invoice>> {
        let pattern = contains_pattern(query);
        self.fetch(
            "garage_id = ?1 AND (customer_name LIKE ?2 ESCAPE '\\' OR customer_phone LIKE ?2 ESCAPE '\\' \
             OR customer_email LIKE ?2 ESCAPE '\\')",
            &[garage_id, pattern.as_str()],
        )
        .await
    }

    /// Case-insensitive substring match on the vehicle number.
    pub async fn search_by_vehicle(&self, garage_id: &str, query: &str) -> DbResult<Vec<Invoice>> {
        let pattern = contains_pattern(query);
        self.fetch("garage_id = ?1 AND vehicle_number LIKE ?2 ESCAPE '\\'", &[garage_id, pattern.as_str()])
            .await
    }

    async fn fetch(&self, filter: &str, args: &[&str]) -> DbResult<Vec<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE {} ORDER BY {}",
            INVOICE_COLUMNS, filter, NEWEST_FIRST
        );
        debug!(filter = %filter, "Listing invoices");

        let mut conn = self.pool.acquire().await?;
        let mut query = sqlx::query_as::<_, InvoiceRow>(&sql);
        for arg in args {
            query = query.bind(*arg);
        }
        let rows = query.fetch_all(&mut *conn).await?;

        let mut invoices = Vec::with_capacity(rows.len());
        for row in rows {
            let items = line_items::load_items(&mut conn, ItemTable::Invoice, &row.id).await?;
            invoices.push(Invoice::restore(row.into_parts(), items));
        }
        Ok(invoices)
    }
}

// =============================================================================
// Transactional helpers
// =============================================================================

/// `key` is a fixed column name (`id` or `invoice_number`).
async fn load(conn: &mut SqliteConnection, key: &str, value: &str) -> DbResult<Option<Invoice>> {
    let sql = format!("SELECT {} FROM invoices WHERE {} = ?1", INVOICE_COLUMNS, key);
    let row: Option<InvoiceRow> = sqlx::query_as(&sql).bind(value).fetch_optional(&mut *conn).await?;

    match row {
        Some(row) => {
            let items = line_items::load_items(conn, ItemTable::Invoice, &row.id).await?;
            Ok(Some(Invoice::restore(row.into_parts(), items)))
        }
        None => Ok(None),
    }
}

pub(crate) async fn load_required(conn: &mut SqliteConnection, id: &str) -> DbResult<Invoice> {
    load(conn, "id", id)
        .await?
        .ok_or_else(|| DbError::not_found("Invoice", id))
}

/// Inserts header and items inside the caller's transaction.
pub(crate) async fn insert_invoice(conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<()> {
    debug!(id = %invoice.id, invoice_number = %invoice.invoice_number, "Inserting invoice");

    let result = sqlx::query(
        r#"
        INSERT INTO invoices (
            id, invoice_number, garage_id, job_card_id,
            customer_name, customer_phone, customer_email, customer_address,
            vehicle_number, vehicle_make, vehicle_model,
            subtotal_cents, discount_cents, discount_rate_bps, tax_cents, tax_rate_bps,
            total_cents, paid_cents, due_cents, status, payment_status,
            invoice_date, due_date, paid_date, notes, terms,
            created_at, updated_at, version
        ) VALUES (
            ?1, ?2, ?3, ?4,
            ?5, ?6, ?7, ?8,
            ?9, ?10, ?11,
            ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19, ?20, ?21,
            ?22, ?23, ?24, ?25, ?26,
            ?27, ?28, ?29
        )
        "#,
    )
    .bind(&invoice.id)
    .bind(&invoice.invoice_number)
    .bind(&invoice.garage_id)
    .bind(&invoice.job_card_id)
    .bind(&invoice.customer.name)
    .bind(&invoice.customer.phone)
    .bind(&invoice.customer.email)
    .bind(&invoice.customer.address)
    .bind(&invoice.vehicle.number)
    .bind(&invoice.vehicle.make)
    .bind(&invoice.vehicle.model)
    .bind(invoice.subtotal().cents())
    .bind(invoice.discount().cents())
    .bind(invoice.discount_rate().bps())
    .bind(invoice.tax().cents())
    .bind(invoice.tax_rate().bps())
    .bind(invoice.total().cents())
    .bind(invoice.paid().cents())
    .bind(invoice.due().cents())
    .bind(invoice.status())
    .bind(invoice.payment_status())
    .bind(invoice.invoice_date)
    .bind(invoice.due_date)
    .bind(invoice.paid_date())
    .bind(&invoice.notes)
    .bind(&invoice.terms)
    .bind(invoice.created_at)
    .bind(invoice.updated_at)
    .bind(invoice.version())
    .execute(&mut *conn)
    .await;

    match result {
        Err(sqlx::Error::Database(e)) if e.message().contains("invoices.invoice_number") => {
            return Err(DbError::duplicate("invoice_number", &invoice.invoice_number));
        }
        other => {
            other?;
        }
    }

    line_items::insert_items(conn, ItemTable::Invoice, &invoice.id, invoice.items()).await
}

async fn write_invoice(conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE invoices SET
            customer_name = ?1, customer_phone = ?2, customer_email = ?3, customer_address = ?4,
            vehicle_number = ?5, vehicle_make = ?6, vehicle_model = ?7,
            subtotal_cents = ?8, discount_cents = ?9, discount_rate_bps = ?10,
            tax_cents = ?11, tax_rate_bps = ?12, total_cents = ?13,
            paid_cents = ?14, due_cents = ?15, status = ?16, payment_status = ?17,
            invoice_date = ?18, due_date = ?19, paid_date = ?20, notes = ?21, terms = ?22,
            updated_at = ?23, version = version + 1
        WHERE id = ?24 AND version = ?25
        "#,
    )
    .bind(&invoice.customer.name)
    .bind(&invoice.customer.phone)
    .bind(&invoice.customer.email)
    .bind(&invoice.customer.address)
    .bind(&invoice.vehicle.number)
    .bind(&invoice.vehicle.make)
    .bind(&invoice.vehicle.model)
    .bind(invoice.subtotal().cents())
    .bind(invoice.discount().cents())
    .bind(invoice.discount_rate().bps())
    .bind(invoice.tax().cents())
    .bind(invoice.tax_rate().bps())
    .bind(invoice.total().cents())
    .bind(invoice.paid().cents())
    .bind(invoice.due().cents())
    .bind(invoice.status())
    .bind(invoice.payment_status())
    .bind(invoice.invoice_date)
    .bind(invoice.due_date)
    .bind(invoice.paid_date())
    .bind(&invoice.notes)
    .bind(&invoice.terms)
    .bind(invoice.updated_at)
    .bind(&invoice.id)
    .bind(invoice.version())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let exists: Option<i64> = sqlx::query_scalar("SELECT version FROM invoices WHERE id = ?1")
            .bind(&invoice.id)
            .fetch_optional(&mut *conn)
            .await?;
        return Err(match exists {
            Some(_) => DbError::version_conflict("Invoice", &invoice.id, invoice.version()),
            None => DbError::not_found("Invoice", &invoice.id),
        });
    }

    line_items::replace_items(conn, ItemTable::Invoice, &invoice.id, invoice.items()).await
}

// =============================================================================
// Unit Tests
// =============================================================================
