//! # Garage Repository
//!
//! Minimal garage lookup and insert. Garage master data is owned by the
//! external CRUD layer; the engine only needs to resolve ids and names.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use garage_core::Garage;

#[derive(Debug, FromRow)]
struct GarageRow {
    id: String,
    name: String,
    address: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<GarageRow> for Garage {
    fn from(row: GarageRow) -> Self {
        Garage {
            id: row.id,
            name: row.name,
            address: row.address,
            phone: row.phone,
            email: row.email,
            created_at: row.created_at,
        }
    }
}

/// Repository for garage lookups.
#[derive(Debug, Clone)]
pub struct GarageRepository {
    pool: SqlitePool,
}

impl GarageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        GarageRepository { pool }
    }

    pub async fn insert(&self, garage: &Garage) -> DbResult<()> {
        debug!(id = %garage.id, name = %garage.name, "Inserting garage");

        sqlx::query(
            "INSERT INTO garages (id, name, address, phone, email, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&garage.id)
        .bind(&garage.name)
        .bind(&garage.address)
        .bind(&garage.phone)
        .bind(&garage.email)
        .bind(garage.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Garage>> {
        let row: Option<GarageRow> = sqlx::query_as(
            "SELECT id, name, address, phone, email, created_at FROM garages WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Garage::from))
    }

    /// Like [`get_by_id`](Self::get_by_id), but a missing garage is an error.
    pub async fn require(&self, id: &str) -> DbResult<Garage> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Garage", id))
    }

    pub async fn list(&self) -> DbResult<Vec<Garage>> {
        let rows: Vec<GarageRow> = sqlx::query_as(
            "SELECT id, name, address, phone, email, created_at FROM garages ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Garage::from).collect())
    }
}

/// Takes the garage's ledger write lock inside the caller's transaction.
///
/// Must be the first write of a cash book transaction: once it runs, SQLite
/// holds the database write lock until commit, so balances read afterwards
/// cannot be changed by another connection.
pub(crate) async fn bump_ledger_version(conn: &mut SqliteConnection, garage_id: &str) -> DbResult<()> {
    let result = sqlx::query("UPDATE garages SET ledger_version = ledger_version + 1 WHERE id = ?1")
        .bind(garage_id)
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Garage", garage_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn garage(id: &str, name: &str) -> Garage {
        Garage {
            id: id.to_string(),
            name: name.to_string(),
            address: None,
            phone: Some("+91 98450 00000".to_string()),
            email: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_require() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.garages();

        repo.insert(&garage("g-2", "Zen Motors")).await.unwrap();
        repo.insert(&garage("g-1", "Apex Auto")).await.unwrap();

        let found = repo.require("g-1").await.unwrap();
        assert_eq!(found.name, "Apex Auto");
        assert_eq!(found.phone.as_deref(), Some("+91 98450 00000"));

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["Apex Auto", "Zen Motors"]);

        assert!(matches!(repo.require("missing").await, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_garage_is_unique_violation() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.garages().insert(&garage("g-1", "Apex Auto")).await.unwrap();

        let err = db.garages().insert(&garage("g-1", "Again")).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_bump_ledger_version_unknown_garage() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let err = bump_ledger_version(&mut conn, "nope").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
