//! # Cash Book Repository
//!
//! The per-garage ledger with running balances.
//!
//! ## Append Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   append_entry(garage, details)                         │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   1. UPDATE garages SET ledger_version = ledger_version + 1            │
//! │        └── first write: takes SQLite's write lock, so no other         │
//! │            connection can append until we commit                       │
//! │   2. prior    = Σ signed amounts of the garage                          │
//! │   3. position = MAX(position) + 1                                       │
//! │   4. INSERT entry { running_balance = prior ± amount }                 │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Corrections (update / delete) take the same lock and rewrite the      │
//! │  running balance of every later entry before committing.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::contains_pattern;
use crate::repository::garage;
use garage_core::ledger::{rebalance, CashBookEntryParts};
use garage_core::{
    new_id, CashBookEntry, DateRange, EntryDetails, EntryLinks, LedgerTotals, Money, PaymentMethod,
    TransactionType,
};

const ENTRY_COLUMNS: &str = "id, garage_id, position, transaction_type, category, amount_cents, \
     description, payment_method, reference_number, party_name, party_phone, \
     invoice_id, payment_id, expense_id, job_card_id, \
     transaction_date, running_balance_cents, notes, created_at, updated_at";

const SIGNED_AMOUNT: &str = "CASE WHEN transaction_type = 'CREDIT' THEN amount_cents ELSE -amount_cents END";

#[derive(Debug, FromRow)]
struct CashBookRow {
    id: String,
    garage_id: String,
    position: i64,
    transaction_type: TransactionType,
    category: String,
    amount_cents: i64,
    description: String,
    payment_method: Option<PaymentMethod>,
    reference_number: Option<String>,
    party_name: Option<String>,
    party_phone: Option<String>,
    invoice_id: Option<String>,
    payment_id: Option<String>,
    expense_id: Option<String>,
    job_card_id: Option<String>,
    transaction_date: NaiveDate,
    running_balance_cents: i64,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CashBookRow> for CashBookEntry {
    fn from(row: CashBookRow) -> Self {
        CashBookEntry::restore(CashBookEntryParts {
            id: row.id,
            garage_id: row.garage_id,
            details: EntryDetails {
                transaction_type: row.transaction_type,
                category: row.category,
                amount: Money::from_cents(row.amount_cents),
                description: row.description,
                payment_method: row.payment_method,
                reference_number: row.reference_number,
                party_name: row.party_name,
                party_phone: row.party_phone,
                links: EntryLinks {
                    invoice_id: row.invoice_id,
                    payment_id: row.payment_id,
                    expense_id: row.expense_id,
                    job_card_id: row.job_card_id,
                },
                transaction_date: row.transaction_date,
                notes: row.notes,
            },
            position: row.position,
            running_balance: Money::from_cents(row.running_balance_cents),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TotalsRow {
    credit_cents: i64,
    debit_cents: i64,
    credit_count: i64,
    debit_count: i64,
}

/// Repository for cash book entries.
#[derive(Debug, Clone)]
pub struct CashBookRepository {
    pool: SqlitePool,
}

impl CashBookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CashBookRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Appends one entry at the end of the garage's ledger.
    pub async fn append(&self, garage_id: &str, details: EntryDetails, now: DateTime<Utc>) -> DbResult<CashBookEntry> {
        let mut tx = self.pool.begin().await?;
        let entry = append_entry(&mut tx, garage_id, details, now).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Rewrites an entry and recomputes the running balance of it and of
    /// every later entry of the same garage.
    pub async fn update(&self, id: &str, details: EntryDetails, now: DateTime<Utc>) -> DbResult<CashBookEntry> {
        let mut tx = self.pool.begin().await?;
        let entry = correct_entry(&mut tx, id, details, now).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Removes an entry and recomputes every later running balance.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        remove_entry(&mut tx, id).await?;
        tx.commit().await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CashBookEntry>> {
        let mut conn = self.pool.acquire().await?;
        load(&mut conn, id).await
    }

    pub async fn require(&self, id: &str) -> DbResult<CashBookEntry> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Cash book entry", id))
    }

    /// Every entry of every garage, most recent transaction date first.
    pub async fn list_all(&self) -> DbResult<Vec<CashBookEntry>> {
        self.fetch("1 = 1", "transaction_date DESC, created_at DESC", &[]).await
    }

    /// The garage's ledger in append order.
    pub async fn list_by_garage(&self, garage_id: &str) -> DbResult<Vec<CashBookEntry>> {
        self.fetch("garage_id = ?1", "position ASC", &[garage_id]).await
    }

    pub async fn list_by_type(&self, garage_id: &str, transaction_type: TransactionType) -> DbResult<Vec<CashBookEntry>> {
        self.fetch_recent(
            "garage_id = ?1 AND transaction_type = ?2",
            &[garage_id, transaction_type.as_str()],
        )
        .await
    }

    /// Category match after the same upper-case normalisation as writes.
    pub async fn list_by_category(&self, garage_id: &str, category: &str) -> DbResult<Vec<CashBookEntry>> {
        let category = category.trim().to_uppercase();
        self.fetch_recent("garage_id = ?1 AND category = ?2", &[garage_id, category.as_str()])
            .await
    }

    /// Entries dated within `range`, inclusive.
    pub async fn list_by_date_range(&self, garage_id: &str, range: DateRange) -> DbResult<Vec<CashBookEntry>> {
        let (from, to) = (range.from.to_string(), range.to.to_string());
        self.fetch_recent(
            "garage_id = ?1 AND transaction_date >= ?2 AND transaction_date <= ?3",
            &[garage_id, from.as_str(), to.as_str()],
        )
        .await
    }

    pub async fn search_by_party(&self, garage_id: &str, query: &str) -> DbResult<Vec<CashBookEntry>> {
        let pattern = contains_pattern(query);
        self.fetch_recent("garage_id = ?1 AND party_name LIKE ?2 ESCAPE '\\'", &[garage_id, pattern.as_str()])
            .await
    }

    pub async fn search_by_description(&self, garage_id: &str, query: &str) -> DbResult<Vec<CashBookEntry>> {
        let pattern = contains_pattern(query);
        self.fetch_recent("garage_id = ?1 AND description LIKE ?2 ESCAPE '\\'", &[garage_id, pattern.as_str()])
            .await
    }

    pub async fn list_by_invoice(&self, invoice_id: &str) -> DbResult<Vec<CashBookEntry>> {
        self.fetch_recent("invoice_id = ?1", &[invoice_id]).await
    }

    pub async fn list_by_payment(&self, payment_id: &str) -> DbResult<Vec<CashBookEntry>> {
        self.fetch_recent("payment_id = ?1", &[payment_id]).await
    }

    pub async fn list_by_expense(&self, expense_id: &str) -> DbResult<Vec<CashBookEntry>> {
        self.fetch_recent("expense_id = ?1", &[expense_id]).await
    }

    pub async fn list_by_job_card(&self, job_card_id: &str) -> DbResult<Vec<CashBookEntry>> {
        self.fetch_recent("job_card_id = ?1", &[job_card_id]).await
    }

    /// Running balance of the garage's last entry, zero for an empty ledger.
    pub async fn latest_balance(&self, garage_id: &str) -> DbResult<Money> {
        let balance: Option<i64> = sqlx::query_scalar(
            "SELECT running_balance_cents FROM cash_book_entries WHERE garage_id = ?1 ORDER BY position DESC LIMIT 1",
        )
        .bind(garage_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(Money::from_cents(balance.unwrap_or(0)))
    }

    /// Credit and debit sums with counts, optionally restricted to entries
    /// dated within `range`. Always computed from the entries.
    pub async fn totals(&self, garage_id: &str, range: Option<DateRange>) -> DbResult<LedgerTotals> {
        let row: TotalsRow = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN transaction_type = 'CREDIT' THEN amount_cents END), 0) AS credit_cents,
                COALESCE(SUM(CASE WHEN transaction_type = 'DEBIT' THEN amount_cents END), 0) AS debit_cents,
                COUNT(CASE WHEN transaction_type = 'CREDIT' THEN 1 END) AS credit_count,
                COUNT(CASE WHEN transaction_type = 'DEBIT' THEN 1 END) AS debit_count
            FROM cash_book_entries
            WHERE garage_id = ?1
              AND (?2 IS NULL OR transaction_date >= ?2)
              AND (?3 IS NULL OR transaction_date <= ?3)
            "#,
        )
        .bind(garage_id)
        .bind(range.map(|r| r.from))
        .bind(range.map(|r| r.to))
        .fetch_one(&self.pool)
        .await?;

        Ok(LedgerTotals::new(
            Money::from_cents(row.credit_cents),
            Money::from_cents(row.debit_cents),
            row.credit_count,
            row.debit_count,
        ))
    }

    async fn fetch_recent(&self, filter: &str, args: &[&str]) -> DbResult<Vec<CashBookEntry>> {
        self.fetch(filter, "transaction_date DESC, position DESC", args).await
    }

    async fn fetch(&self, filter: &str, order: &str, args: &[&str]) -> DbResult<Vec<CashBookEntry>> {
        let sql = format!(
            "SELECT {} FROM cash_book_entries WHERE {} ORDER BY {}",
            ENTRY_COLUMNS, filter, order
        );
        debug!(filter = %filter, "Listing cash book entries");

        let mut query = sqlx::query_as::<_, CashBookRow>(&sql);
        for arg in args {
            query = query.bind(*arg);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(CashBookEntry::from).collect())
    }
}

// =============================================================================
// Transactional helpers
// =============================================================================

/// Appends an entry inside the caller's transaction. See the module docs
/// for the locking protocol.
pub(crate) async fn append_entry(
    conn: &mut SqliteConnection,
    garage_id: &str,
    details: EntryDetails,
    now: DateTime<Utc>,
) -> DbResult<CashBookEntry> {
    garage::bump_ledger_version(&mut *conn, garage_id).await?;

    let sql = format!(
        "SELECT COALESCE(SUM({}), 0) FROM cash_book_entries WHERE garage_id = ?1",
        SIGNED_AMOUNT
    );
    let prior: i64 = sqlx::query_scalar(&sql).bind(garage_id).fetch_one(&mut *conn).await?;

    let position: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(position), 0) + 1 FROM cash_book_entries WHERE garage_id = ?1")
            .bind(garage_id)
            .fetch_one(&mut *conn)
            .await?;

    let entry = CashBookEntry::append(new_id(), garage_id, details, position, Money::from_cents(prior), now);
    insert_entry(conn, &entry).await?;

    info!(
        id = %entry.id,
        garage_id = %garage_id,
        position = position,
        transaction_type = %entry.details.transaction_type,
        amount = %entry.details.amount,
        running_balance = %entry.running_balance(),
        "Cash book entry appended"
    );
    Ok(entry)
}

/// Rewrites an entry inside the caller's transaction and rebalances the
/// rest of its garage's ledger.
pub(crate) async fn correct_entry(
    conn: &mut SqliteConnection,
    id: &str,
    details: EntryDetails,
    now: DateTime<Utc>,
) -> DbResult<CashBookEntry> {
    let existing = load_required(&mut *conn, id).await?;
    garage::bump_ledger_version(&mut *conn, &existing.garage_id).await?;

    let opening = balance_before(&mut *conn, &existing.garage_id, existing.position()).await?;
    let mut tail = load_from(&mut *conn, &existing.garage_id, existing.position()).await?;
    let Some(first) = tail.first_mut() else {
        return Err(DbError::not_found("Cash book entry", id));
    };
    first.revise(details, now);
    let closing = rebalance(opening, &mut tail);

    update_details(&mut *conn, &tail[0]).await?;
    for entry in &tail {
        update_balance(&mut *conn, entry).await?;
    }

    info!(
        id = %id,
        garage_id = %existing.garage_id,
        rebalanced = tail.len(),
        closing = %closing,
        "Cash book entry corrected"
    );
    Ok(tail.swap_remove(0))
}

/// Deletes an entry inside the caller's transaction and rebalances the
/// rest of its garage's ledger.
pub(crate) async fn remove_entry(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    let existing = load_required(&mut *conn, id).await?;
    garage::bump_ledger_version(&mut *conn, &existing.garage_id).await?;

    sqlx::query("DELETE FROM cash_book_entries WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let opening = balance_before(&mut *conn, &existing.garage_id, existing.position()).await?;
    let mut tail = load_from(&mut *conn, &existing.garage_id, existing.position()).await?;
    let closing = rebalance(opening, &mut tail);
    for entry in &tail {
        update_balance(&mut *conn, entry).await?;
    }

    info!(
        id = %id,
        garage_id = %existing.garage_id,
        rebalanced = tail.len(),
        closing = %closing,
        "Cash book entry deleted"
    );
    Ok(())
}

/// Ids of the entries raised by a payment record.
pub(crate) async fn entries_for_payment(conn: &mut SqliteConnection, payment_id: &str) -> DbResult<Vec<String>> {
    let ids = sqlx::query_scalar("SELECT id FROM cash_book_entries WHERE payment_id = ?1 ORDER BY position ASC")
        .bind(payment_id)
        .fetch_all(conn)
        .await?;
    Ok(ids)
}

/// Ids of the entries raised by an expense record.
pub(crate) async fn entries_for_expense(conn: &mut SqliteConnection, expense_id: &str) -> DbResult<Vec<String>> {
    let ids = sqlx::query_scalar("SELECT id FROM cash_book_entries WHERE expense_id = ?1 ORDER BY position ASC")
        .bind(expense_id)
        .fetch_all(conn)
        .await?;
    Ok(ids)
}

async fn insert_entry(conn: &mut SqliteConnection, entry: &CashBookEntry) -> DbResult<()> {
    let d = &entry.details;
    sqlx::query(
        r#"
        INSERT INTO cash_book_entries (
            id, garage_id, position, transaction_type, category, amount_cents,
            description, payment_method, reference_number, party_name, party_phone,
            invoice_id, payment_id, expense_id, job_card_id,
            transaction_date, running_balance_cents, notes, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9, ?10, ?11,
            ?12, ?13, ?14, ?15,
            ?16, ?17, ?18, ?19, ?20
        )
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.garage_id)
    .bind(entry.position())
    .bind(d.transaction_type)
    .bind(&d.category)
    .bind(d.amount.cents())
    .bind(&d.description)
    .bind(d.payment_method)
    .bind(&d.reference_number)
    .bind(&d.party_name)
    .bind(&d.party_phone)
    .bind(&d.links.invoice_id)
    .bind(&d.links.payment_id)
    .bind(&d.links.expense_id)
    .bind(&d.links.job_card_id)
    .bind(d.transaction_date)
    .bind(entry.running_balance().cents())
    .bind(&d.notes)
    .bind(entry.created_at)
    .bind(entry.updated_at)
    .execute(conn)
    .await?;

    Ok(())
}

async fn update_details(conn: &mut SqliteConnection, entry: &CashBookEntry) -> DbResult<()> {
    let d = &entry.details;
    sqlx::query(
        r#"
        UPDATE cash_book_entries SET
            transaction_type = ?1, category = ?2, amount_cents = ?3, description = ?4,
            payment_method = ?5, reference_number = ?6, party_name = ?7, party_phone = ?8,
            invoice_id = ?9, payment_id = ?10, expense_id = ?11, job_card_id = ?12,
            transaction_date = ?13, notes = ?14, updated_at = ?15
        WHERE id = ?16
        "#,
    )
    .bind(d.transaction_type)
    .bind(&d.category)
    .bind(d.amount.cents())
    .bind(&d.description)
    .bind(d.payment_method)
    .bind(&d.reference_number)
    .bind(&d.party_name)
    .bind(&d.party_phone)
    .bind(&d.links.invoice_id)
    .bind(&d.links.payment_id)
    .bind(&d.links.expense_id)
    .bind(&d.links.job_card_id)
    .bind(d.transaction_date)
    .bind(&d.notes)
    .bind(entry.updated_at)
    .bind(&entry.id)
    .execute(conn)
    .await?;

    Ok(())
}

async fn update_balance(conn: &mut SqliteConnection, entry: &CashBookEntry) -> DbResult<()> {
    sqlx::query("UPDATE cash_book_entries SET running_balance_cents = ?1 WHERE id = ?2")
        .bind(entry.running_balance().cents())
        .bind(&entry.id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<CashBookEntry>> {
    let sql = format!("SELECT {} FROM cash_book_entries WHERE id = ?1", ENTRY_COLUMNS);
    let row: Option<CashBookRow> = sqlx::query_as(&sql).bind(id).fetch_optional(conn).await?;
    Ok(row.map(CashBookEntry::from))
}

async fn load_required(conn: &mut SqliteConnection, id: &str) -> DbResult<CashBookEntry> {
    load(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Cash book entry", id))
}

/// Entries at or after `position`, in append order.
async fn load_from(conn: &mut SqliteConnection, garage_id: &str, position: i64) -> DbResult<Vec<CashBookEntry>> {
    let sql = format!(
        "SELECT {} FROM cash_book_entries WHERE garage_id = ?1 AND position >= ?2 ORDER BY position ASC",
        ENTRY_COLUMNS
    );
    let rows: Vec<CashBookRow> = sqlx::query_as(&sql)
        .bind(garage_id)
        .bind(position)
        .fetch_all(conn)
        .await?;
    Ok(rows.into_iter().map(CashBookEntry::from).collect())
}

/// Running balance of the last entry before `position`.
async fn balance_before(conn: &mut SqliteConnection, garage_id: &str, position: i64) -> DbResult<Money> {
    let balance: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT running_balance_cents FROM cash_book_entries
        WHERE garage_id = ?1 AND position < ?2
        ORDER BY position DESC LIMIT 1
        "#,
    )
    .bind(garage_id)
    .bind(position)
    .fetch_optional(conn)
    .await?;
    Ok(Money::from_cents(balance.unwrap_or(0)))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use garage_core::{Garage, NewCashBookEntry};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for id in ["g-1", "g-2"] {
            db.garages()
                .insert(&Garage {
                    id: id.to_string(),
                    name: format!("Garage {}", id),
                    address: None,
                    phone: None,
                    email: None,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        db
    }

    fn details(entry: NewCashBookEntry) -> EntryDetails {
        entry.validate(day(10)).unwrap()
    }

    async fn seed_three(repo: &CashBookRepository) -> Vec<CashBookEntry> {
        let mut out = Vec::new();
        for entry in [
            NewCashBookEntry::credit("g-1", "service_payment", Money::from_major(500), "Service").on(day(1)),
            NewCashBookEntry::debit("g-1", "rent", Money::from_major(200), "March rent").on(day(2)),
            NewCashBookEntry::credit("g-1", "lube_sale", Money::from_major(50), "Oil top-up").on(day(3)),
        ] {
            out.push(repo.append("g-1", details(entry), Utc::now()).await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_running_balances() {
        let db = setup().await;
        let repo = db.cash_book();
        let entries = seed_three(&repo).await;

        let balances: Vec<Money> = entries.iter().map(|e| e.running_balance()).collect();
        assert_eq!(
            balances,
            vec![Money::from_major(500), Money::from_major(300), Money::from_major(350)]
        );
        assert_eq!(entries[2].position(), 3);
        assert_eq!(entries[1].details.category, "RENT");

        let totals = repo.totals("g-1", None).await.unwrap();
        assert_eq!(totals.net, Money::from_major(350));
        assert_eq!(totals.credit_count, 2);
        assert_eq!(totals.debit_count, 1);
        assert_eq!(repo.latest_balance("g-1").await.unwrap(), Money::from_major(350));

        // Other garages are independent
        assert_eq!(repo.latest_balance("g-2").await.unwrap(), Money::zero());
    }

    #[tokio::test]
    async fn test_update_rebalances_later_entries() {
        let db = setup().await;
        let repo = db.cash_book();
        let entries = seed_three(&repo).await;

        let corrected = NewCashBookEntry::debit("g-1", "rent", Money::from_major(250), "March rent").on(day(2));
        let updated = repo.update(&entries[1].id, details(corrected), Utc::now()).await.unwrap();
        assert_eq!(updated.running_balance(), Money::from_major(250));

        let ledger = repo.list_by_garage("g-1").await.unwrap();
        let balances: Vec<Money> = ledger.iter().map(|e| e.running_balance()).collect();
        assert_eq!(
            balances,
            vec![Money::from_major(500), Money::from_major(250), Money::from_major(300)]
        );
    }

    #[tokio::test]
    async fn test_delete_rebalances_and_keeps_positions_monotonic() {
        let db = setup().await;
        let repo = db.cash_book();
        let entries = seed_three(&repo).await;

        repo.delete(&entries[0].id).await.unwrap();
        let ledger = repo.list_by_garage("g-1").await.unwrap();
        let balances: Vec<Money> = ledger.iter().map(|e| e.running_balance()).collect();
        assert_eq!(balances, vec![Money::from_major(-200), Money::from_major(-150)]);

        let next = repo
            .append(
                "g-1",
                details(NewCashBookEntry::credit("g-1", "other_income", Money::from_major(150), "Scrap")),
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(next.position(), 4);
        assert_eq!(next.running_balance(), Money::zero());

        assert!(matches!(repo.delete(&entries[0].id).await, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_filters_and_ranges() {
        let db = setup().await;
        let repo = db.cash_book();
        seed_three(&repo).await;

        assert_eq!(repo.list_by_type("g-1", TransactionType::Credit).await.unwrap().len(), 2);
        assert_eq!(repo.list_by_category("g-1", " Rent ").await.unwrap().len(), 1);
        assert_eq!(repo.search_by_description("g-1", "oil").await.unwrap().len(), 1);

        let range = DateRange::new(day(2), day(3)).unwrap();
        let in_range = repo.list_by_date_range("g-1", range).await.unwrap();
        assert_eq!(in_range.len(), 2);
        assert_eq!(in_range[0].details.transaction_date, day(3));

        let totals = repo.totals("g-1", Some(range)).await.unwrap();
        assert_eq!(totals.credit, Money::from_major(50));
        assert_eq!(totals.debit, Money::from_major(200));
        assert_eq!(totals.net, Money::from_major(-150));
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally() {
        let db = setup().await;
        let repo = db.cash_book();
        seed_three(&repo).await;
        repo.append(
            "g-1",
            details(NewCashBookEntry::credit("g-1", "other_income", Money::from_major(20), "10% off_cut").on(day(4))),
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(repo.search_by_description("g-1", "%").await.unwrap().len(), 1);
        assert_eq!(repo.search_by_description("g-1", "_").await.unwrap().len(), 1);
        assert_eq!(repo.search_by_description("g-1", "0% o").await.unwrap().len(), 1);
        assert!(repo.search_by_description("g-1", "M_rch").await.unwrap().is_empty());
        assert!(repo.search_by_party("g-1", "%").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_to_unknown_garage() {
        let db = setup().await;
        let err = db
            .cash_book()
            .append(
                "ghost",
                details(NewCashBookEntry::credit("ghost", "other_income", Money::from_major(1), "x")),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
