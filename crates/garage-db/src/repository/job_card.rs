//! # Job Card Repository
//!
//! Persistence for job cards and their items.
//!
//! ## Write Unit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 JobCardRepository::save(card, movements)                │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   ├── apply_movements(stock deltas, policy)                            │
//! │   ├── UPDATE job_cards ... WHERE id = ? AND version = ?   (CAS)        │
//! │   │       0 rows → NotFound or VersionConflict                         │
//! │   ├── DELETE + INSERT job_card_items (positions 0..n)                  │
//! │   └── (optional) INSERT invoice + invoice_items                        │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any error drops the transaction: stock, header and items roll back    │
//! │  together.                                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::contains_pattern;
use crate::repository::invoice;
use crate::repository::line_items::{self, ItemTable};
use crate::repository::stock::{self, StockPolicy};
use garage_core::job_card::JobCardParts;
use garage_core::{CustomerDetails, Invoice, JobCard, JobCardStatus, Money, StockMovement, VehicleDetails};

const JOB_CARD_COLUMNS: &str = "id, garage_id, number_plate, vehicle_type, make, model, variant, \
     km_reading, fuel_level, customer_name, customer_phone, customer_email, customer_address, \
     notes, flag, status, labour_cents, discount_cents, tax_cents, \
     created_at, updated_at, completed_at, version";

#[derive(Debug, FromRow)]
struct JobCardRow {
    id: String,
    garage_id: String,
    number_plate: String,
    vehicle_type: Option<String>,
    make: Option<String>,
    model: Option<String>,
    variant: Option<String>,
    km_reading: Option<i64>,
    fuel_level: Option<String>,
    customer_name: Option<String>,
    customer_phone: Option<String>,
    customer_email: Option<String>,
    customer_address: Option<String>,
    notes: Option<String>,
    flag: bool,
    status: JobCardStatus,
    labour_cents: i64,
    discount_cents: i64,
    tax_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    version: i64,
}

impl JobCardRow {
    fn into_parts(self) -> JobCardParts {
        JobCardParts {
            id: self.id,
            garage_id: self.garage_id,
            vehicle: VehicleDetails {
                number_plate: self.number_plate,
                vehicle_type: self.vehicle_type,
                make: self.make,
                model: self.model,
                variant: self.variant,
                km_reading: self.km_reading,
                fuel_level: self.fuel_level,
            },
            customer: CustomerDetails {
                name: self.customer_name,
                phone: self.customer_phone,
                email: self.customer_email,
                address: self.customer_address,
            },
            notes: self.notes,
            flag: self.flag,
            status: self.status,
            labour: Money::from_cents(self.labour_cents),
            discount: Money::from_cents(self.discount_cents),
            tax: Money::from_cents(self.tax_cents),
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            version: self.version,
        }
    }
}

/// Repository for job card database operations.
#[derive(Debug, Clone)]
pub struct JobCardRepository {
    pool: SqlitePool,
}

impl JobCardRepository {
    pub fn new(pool: SqlitePool) -> Self {
        JobCardRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<JobCard>> {
        let mut conn = self.pool.acquire().await?;
        load(&mut conn, id).await
    }

    pub async fn require(&self, id: &str) -> DbResult<JobCard> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Job card", id))
    }

    /// Every job card, newest first.
    pub async fn list_all(&self) -> DbResult<Vec<JobCard>> {
        self.fetch("1 = 1", &[]).await
    }

    pub async fn list_by_garage(&self, garage_id: &str) -> DbResult<Vec<JobCard>> {
        self.fetch("garage_id = ?1", &[garage_id]).await
    }

    pub async fn list_by_status(&self, garage_id: &str, status: JobCardStatus) -> DbResult<Vec<JobCard>> {
        self.fetch("garage_id = ?1 AND status = ?2", &[garage_id, status.as_str()])
            .await
    }

    pub async fn list_flagged(&self, garage_id: &str, flag: bool) -> DbResult<Vec<JobCard>> {
        let filter = format!("garage_id = ?1 AND flag = {}", i64::from(flag));
        self.fetch(&filter, &[garage_id]).await
    }

    /// Case-insensitive substring match on the number plate, across garages.
    pub async fn search_by_vehicle(&self, query: &str) -> DbResult<Vec<JobCard>> {
        let pattern = contains_pattern(query);
        self.fetch("number_plate LIKE ?1 ESCAPE '\\'", &[pattern.as_str()]).await
    }

    /// The job card an item belongs to, if the item exists.
    pub async fn find_item_owner(&self, item_id: &str) -> DbResult<Option<String>> {
        let owner: Option<String> = sqlx::query_scalar("SELECT job_card_id FROM job_card_items WHERE id = ?1")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner)
    }

    async fn fetch(&self, filter: &str, args: &[&str]) -> DbResult<Vec<JobCard>> {
        let sql = format!(
            "SELECT {} FROM job_cards WHERE {} ORDER BY created_at DESC, rowid DESC",
            JOB_CARD_COLUMNS, filter
        );
        debug!(filter = %filter, "Listing job cards");

        let mut conn = self.pool.acquire().await?;
        let mut query = sqlx::query_as::<_, JobCardRow>(&sql);
        for arg in args {
            query = query.bind(*arg);
        }
        let rows = query.fetch_all(&mut *conn).await?;

        let mut cards = Vec::with_capacity(rows.len());
        for row in rows {
            let items = line_items::load_items(&mut conn, ItemTable::JobCard, &row.id).await?;
            cards.push(JobCard::restore(row.into_parts(), items));
        }
        Ok(cards)
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Inserts a new job card with its items.
    pub async fn insert(&self, card: &JobCard) -> DbResult<()> {
        debug!(id = %card.id, garage_id = %card.garage_id, "Inserting job card");

        let mut tx = self.pool.begin().await?;
        insert_header(&mut tx, card).await?;
        line_items::insert_items(&mut tx, ItemTable::JobCard, &card.id, card.items()).await?;
        tx.commit().await?;

        Ok(())
    }

    /// Persists a modified card together with the stock movements its
    /// change produced, and returns the stored state.
    pub async fn save(&self, card: &JobCard, movements: &[StockMovement], policy: StockPolicy) -> DbResult<JobCard> {
        let mut tx = self.pool.begin().await?;
        write_card(&mut tx, card, movements, policy).await?;
        let saved = load_required(&mut tx, &card.id).await?;
        tx.commit().await?;

        info!(
            id = %saved.id,
            version = saved.version(),
            movements = movements.len(),
            "Job card saved"
        );
        Ok(saved)
    }

    /// Like [`save`](Self::save), and inserts `invoice` in the same
    /// transaction (completion with invoice generation).
    pub async fn save_with_invoice(
        &self,
        card: &JobCard,
        movements: &[StockMovement],
        policy: StockPolicy,
        new_invoice: &Invoice,
    ) -> DbResult<(JobCard, Invoice)> {
        let mut tx = self.pool.begin().await?;
        write_card(&mut tx, card, movements, policy).await?;
        invoice::insert_invoice(&mut tx, new_invoice).await?;
        let saved = load_required(&mut tx, &card.id).await?;
        let stored_invoice = invoice::load_required(&mut tx, &new_invoice.id).await?;
        tx.commit().await?;

        info!(
            id = %saved.id,
            invoice_id = %stored_invoice.id,
            invoice_number = %stored_invoice.invoice_number,
            "Job card saved with invoice"
        );
        Ok((saved, stored_invoice))
    }

    /// Deletes a card and its items, applying `release` (stock held by the
    /// items) in the same transaction.
    pub async fn delete(&self, id: &str, release: &[StockMovement], policy: StockPolicy) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let garage_id: Option<String> = sqlx::query_scalar("SELECT garage_id FROM job_cards WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let garage_id = garage_id.ok_or_else(|| DbError::not_found("Job card", id))?;
        stock::apply_movements(&mut tx, &garage_id, release, policy).await?;

        let result = sqlx::query("DELETE FROM job_cards WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Job card", id));
        }
        tx.commit().await?;

        info!(id = %id, released = release.len(), "Job card deleted");
        Ok(())
    }
}

// =============================================================================
// Transactional helpers
// =============================================================================

async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<JobCard>> {
    let sql = format!("SELECT {} FROM job_cards WHERE id = ?1", JOB_CARD_COLUMNS);
    let row: Option<JobCardRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&mut *conn).await?;

    match row {
        Some(row) => {
            let items = line_items::load_items(conn, ItemTable::JobCard, &row.id).await?;
            Ok(Some(JobCard::restore(row.into_parts(), items)))
        }
        None => Ok(None),
    }
}

async fn load_required(conn: &mut SqliteConnection, id: &str) -> DbResult<JobCard> {
    load(conn, id).await?.ok_or_else(|| DbError::not_found("Job card", id))
}

async fn write_card(
    conn: &mut SqliteConnection,
    card: &JobCard,
    movements: &[StockMovement],
    policy: StockPolicy,
) -> DbResult<()> {
    stock::apply_movements(&mut *conn, &card.garage_id, movements, policy).await?;
    update_header(&mut *conn, card).await?;
    line_items::replace_items(conn, ItemTable::JobCard, &card.id, card.items()).await
}

async fn insert_header(conn: &mut SqliteConnection, card: &JobCard) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO job_cards (
            id, garage_id,
            number_plate, vehicle_type, make, model, variant, km_reading, fuel_level,
            customer_name, customer_phone, customer_email, customer_address,
            notes, flag, status,
            labour_cents, discount_cents, tax_cents, subtotal_cents, total_cents,
            created_at, updated_at, completed_at, version
        ) VALUES (
            ?1, ?2,
            ?3, ?4, ?5, ?6, ?7, ?8, ?9,
            ?10, ?11, ?12, ?13,
            ?14, ?15, ?16,
            ?17, ?18, ?19, ?20, ?21,
            ?22, ?23, ?24, ?25
        )
        "#,
    )
    .bind(&card.id)
    .bind(&card.garage_id)
    .bind(&card.vehicle.number_plate)
    .bind(&card.vehicle.vehicle_type)
    .bind(&card.vehicle.make)
    .bind(&card.vehicle.model)
    .bind(&card.vehicle.variant)
    .bind(card.vehicle.km_reading)
    .bind(&card.vehicle.fuel_level)
    .bind(&card.customer.name)
    .bind(&card.customer.phone)
    .bind(&card.customer.email)
    .bind(&card.customer.address)
    .bind(&card.notes)
    .bind(card.flag)
    .bind(card.status())
    .bind(card.labour().cents())
    .bind(card.discount().cents())
    .bind(card.tax().cents())
    .bind(card.subtotal().cents())
    .bind(card.total().cents())
    .bind(card.created_at)
    .bind(card.updated_at)
    .bind(card.completed_at())
    .bind(card.version())
    .execute(conn)
    .await?;

    Ok(())
}

/// Compare-and-swap on `version`.
async fn update_header(conn: &mut SqliteConnection, card: &JobCard) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE job_cards SET
            number_plate = ?1, vehicle_type = ?2, make = ?3, model = ?4, variant = ?5,
            km_reading = ?6, fuel_level = ?7,
            customer_name = ?8, customer_phone = ?9, customer_email = ?10, customer_address = ?11,
            notes = ?12, flag = ?13, status = ?14,
            labour_cents = ?15, discount_cents = ?16, tax_cents = ?17,
            subtotal_cents = ?18, total_cents = ?19,
            updated_at = ?20, completed_at = ?21,
            version = version + 1
        WHERE id = ?22 AND version = ?23
        "#,
    )
    .bind(&card.vehicle.number_plate)
    .bind(&card.vehicle.vehicle_type)
    .bind(&card.vehicle.make)
    .bind(&card.vehicle.model)
    .bind(&card.vehicle.variant)
    .bind(card.vehicle.km_reading)
    .bind(&card.vehicle.fuel_level)
    .bind(&card.customer.name)
    .bind(&card.customer.phone)
    .bind(&card.customer.email)
    .bind(&card.customer.address)
    .bind(&card.notes)
    .bind(card.flag)
    .bind(card.status())
    .bind(card.labour().cents())
    .bind(card.discount().cents())
    .bind(card.tax().cents())
    .bind(card.subtotal().cents())
    .bind(card.total().cents())
    .bind(card.updated_at)
    .bind(card.completed_at())
    .bind(&card.id)
    .bind(card.version())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let exists: Option<i64> = sqlx::query_scalar("SELECT version FROM job_cards WHERE id = ?1")
            .bind(&card.id)
            .fetch_optional(conn)
            .await?;
        return Err(match exists {
            Some(_) => DbError::version_conflict("Job card", &card.id, card.version()),
            None => DbError::not_found("Job card", &card.id),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use garage_core::{
        Garage, ItemKind, LineItemSpec, NewJobCard, StockCatalog, StockItem, StockRef,
    };

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.garages()
            .insert(&Garage {
                id: "g-1".to_string(),
                name: "Apex Auto".to_string(),
                address: None,
                phone: None,
                email: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        db.stock()
            .insert(&StockItem {
                id: "pad".to_string(),
                garage_id: "g-1".to_string(),
                catalog: StockCatalog::SparePart,
                name: "Brake pad".to_string(),
                code: None,
                quantity: 10,
                unit_price: Money::from_major(100),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        db
    }

    fn new_card(plate: &str) -> JobCard {
        card_in("g-1", plate)
    }

    fn card_in(garage_id: &str, plate: &str) -> JobCard {
        let request = NewJobCard {
            vehicle: VehicleDetails {
                number_plate: plate.to_string(),
                ..Default::default()
            },
            customer: CustomerDetails {
                name: Some("Ravi Kumar".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        JobCard::open(garage_id, request, Utc::now()).unwrap()
    }

    fn pads(quantity: i64) -> LineItemSpec {
        LineItemSpec::new(ItemKind::SparePart, "Brake pad", quantity, Money::from_major(100))
            .with_discount(Money::from_major(10))
            .with_tax(Money::from_major(5))
            .with_stock(StockRef::new(StockCatalog::SparePart, "pad"))
    }

    #[tokio::test]
    async fn test_insert_and_reload() {
        let db = setup().await;
        let repo = db.job_cards();
        let card = new_card("ka01ab1234");
        repo.insert(&card).await.unwrap();

        let loaded = repo.require(&card.id).await.unwrap();
        assert_eq!(loaded, card);
        assert_eq!(loaded.vehicle.number_plate, "KA01AB1234");
        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_applies_movements_and_bumps_version() {
        let db = setup().await;
        let repo = db.job_cards();
        let mut card = new_card("KA01AB1234");
        repo.insert(&card).await.unwrap();

        let movements = card.add_item(&pads(2), Utc::now()).unwrap();
        let saved = repo.save(&card, &movements, StockPolicy::BestEffort).await.unwrap();

        assert_eq!(saved.version(), 1);
        assert_eq!(saved.items().len(), 1);
        assert_eq!(saved.subtotal(), Money::from_major(195));
        assert_eq!(db.stock().quantity("pad").await.unwrap(), Some(8));

        let item_id = saved.items()[0].id.clone();
        assert_eq!(repo.find_item_owner(&item_id).await.unwrap(), Some(card.id.clone()));
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let db = setup().await;
        let repo = db.job_cards();
        let card = new_card("KA01AB1234");
        repo.insert(&card).await.unwrap();

        let mut first = card.clone();
        first.notes = Some("first".to_string());
        repo.save(&first, &[], StockPolicy::BestEffort).await.unwrap();

        let mut stale = card.clone();
        stale.notes = Some("stale".to_string());
        let err = repo.save(&stale, &[], StockPolicy::BestEffort).await.unwrap_err();
        assert!(matches!(err, DbError::VersionConflict { expected: 0, .. }));
    }

    #[tokio::test]
    async fn test_strict_shortfall_rolls_back_everything() {
        let db = setup().await;
        let repo = db.job_cards();
        let mut card = new_card("KA01AB1234");
        repo.insert(&card).await.unwrap();

        let movements = card.add_item(&pads(11), Utc::now()).unwrap();
        let err = repo.save(&card, &movements, StockPolicy::Strict).await.unwrap_err();
        assert!(matches!(err, DbError::InsufficientStock { .. }));

        let stored = repo.require(&card.id).await.unwrap();
        assert!(stored.items().is_empty());
        assert_eq!(stored.version(), 0);
        assert_eq!(db.stock().quantity("pad").await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_delete_restores_stock() {
        let db = setup().await;
        let repo = db.job_cards();
        let mut card = new_card("KA01AB1234");
        repo.insert(&card).await.unwrap();
        let movements = card.add_item(&pads(3), Utc::now()).unwrap();
        let saved = repo.save(&card, &movements, StockPolicy::BestEffort).await.unwrap();
        assert_eq!(db.stock().quantity("pad").await.unwrap(), Some(7));

        repo.delete(&saved.id, &saved.stock_release(), StockPolicy::BestEffort)
            .await
            .unwrap();

        assert_eq!(db.stock().quantity("pad").await.unwrap(), Some(10));
        assert!(repo.get_by_id(&saved.id).await.unwrap().is_none());
        let err = repo.delete(&saved.id, &[], StockPolicy::BestEffort).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_card_cannot_move_another_garages_stock() {
        let db = setup().await;
        db.garages()
            .insert(&Garage {
                id: "g-2".to_string(),
                name: "Other Motors".to_string(),
                address: None,
                phone: None,
                email: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let repo = db.job_cards();
        let mut card = card_in("g-2", "KA05MN0001");
        repo.insert(&card).await.unwrap();

        let movements = card.add_item(&pads(4), Utc::now()).unwrap();
        let err = repo.save(&card, &movements, StockPolicy::Strict).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        let saved = repo.save(&card, &movements, StockPolicy::BestEffort).await.unwrap();
        assert_eq!(db.stock().quantity("pad").await.unwrap(), Some(10));

        repo.delete(&saved.id, &saved.stock_release(), StockPolicy::BestEffort)
            .await
            .unwrap();
        assert_eq!(db.stock().quantity("pad").await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_queries() {
        let db = setup().await;
        let repo = db.job_cards();

        let first = new_card("KA01AB1234");
        repo.insert(&first).await.unwrap();
        let mut second = new_card("MH12XY9876");
        second.flag = true;
        repo.insert(&second).await.unwrap();

        let all = repo.list_by_garage("g-1").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);

        assert_eq!(repo.list_flagged("g-1", true).await.unwrap().len(), 1);
        assert_eq!(repo.list_flagged("g-1", false).await.unwrap().len(), 1);
        assert_eq!(
            repo.list_by_status("g-1", JobCardStatus::Pending).await.unwrap().len(),
            2
        );
        assert!(repo
            .list_by_status("g-1", JobCardStatus::Completed)
            .await
            .unwrap()
            .is_empty());

        let found = repo.search_by_vehicle("xy98").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, second.id);
        assert_eq!(repo.list_all().await.unwrap().len(), 2);
    }
}
