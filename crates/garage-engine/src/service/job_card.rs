//! # Job Card Service
//!
//! Job card lifecycle: items with stock side effects, pricing, the status
//! machine and completion (optionally generating an invoice).
//!
//! ## Status Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   PENDING ──start()──► IN_PROGRESS ──complete()──► COMPLETED           │
//! │      │                                                 │               │
//! │      └──────────────complete()─────────────────────────┤               │
//! │                                                        │               │
//! │                    IN_PROGRESS ◄──────reopen()─────────┘               │
//! │                                                                         │
//! │  COMPLETED freezes items and pricing (JobCardCompleted).               │
//! │  Descriptive fields (vehicle, customer, notes, flag) stay editable.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Completion With Invoice
//! ```text
//! lock job_card:{id} ─► card.complete(req) ─► lock garage:{garage}
//!        ─► next_number ─► Invoice::from_completed_job_card
//!        ─► save_with_invoice (stock + card + invoice, one transaction)
//! ```

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use garage_core::validation::validate_search_query;
use garage_core::{
    CompleteJobCard, CoreError, Invoice, JobCard, JobCardStatus, JobCardUpdate, LineItemSpec, NewJobCard,
    PricingUpdate,
};

use super::invoice;
use super::EngineContext;
use crate::error::EngineResult;
use crate::locks::{garage_key, job_card_key};

/// What `complete` produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionOutcome {
    pub job_card: JobCard,
    pub invoice: Option<Invoice>,
}

#[derive(Debug, Clone)]
pub struct JobCardService {
    ctx: Arc<EngineContext>,
}

impl JobCardService {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        JobCardService { ctx }
    }

    // =========================================================================
    // Create / Edit
    // =========================================================================

    /// Opens a PENDING job card for an existing garage.
    pub async fn create(&self, garage_id: &str, request: NewJobCard) -> EngineResult<JobCard> {
        let garage = self.ctx.db.garages().require(garage_id).await?;
        let card = JobCard::open(&garage.id, request, self.ctx.now())?;

        self.ctx.db.job_cards().insert(&card).await?;

        info!(
            job_card_id = %card.id,
            garage_id = %garage.id,
            number_plate = %card.vehicle.number_plate,
            "Job card created"
        );
        Ok(self.ctx.db.job_cards().require(&card.id).await?)
    }

    pub async fn add_item(&self, job_card_id: &str, spec: LineItemSpec) -> EngineResult<JobCard> {
        let _guard = self.ctx.locks.lock(job_card_key(job_card_id)).await;
        let mut card = self.ctx.db.job_cards().require(job_card_id).await?;

        let movements = card.add_item(&spec, self.ctx.now())?;
        let saved = self
            .ctx
            .db
            .job_cards()
            .save(&card, &movements, self.ctx.stock_policy())
            .await?;

        info!(
            job_card_id = %saved.id,
            item = %spec.name,
            movements = movements.len(),
            total = %saved.total(),
            "Job card item added"
        );
        Ok(saved)
    }

    /// Adds several items at once. Every spec is validated before any change.
    pub async fn add_items(
        &self,
        job_card_id: &str,
        specs: Vec<LineItemSpec>,
        pricing: PricingUpdate,
    ) -> EngineResult<JobCard> {
        let _guard = self.ctx.locks.lock(job_card_key(job_card_id)).await;
        let mut card = self.ctx.db.job_cards().require(job_card_id).await?;

        let movements = card.add_items(&specs, &pricing, self.ctx.now())?;
        let saved = self
            .ctx
            .db
            .job_cards()
            .save(&card, &movements, self.ctx.stock_policy())
            .await?;

        info!(
            job_card_id = %saved.id,
            added = specs.len(),
            movements = movements.len(),
            total = %saved.total(),
            "Job card items added"
        );
        Ok(saved)
    }

    /// Replaces one item. Stock moves by the net difference per stock ref.
    pub async fn update_item(&self, job_card_id: &str, item_id: &str, spec: LineItemSpec) -> EngineResult<JobCard> {
        let _guard = self.ctx.locks.lock(job_card_key(job_card_id)).await;
        let mut card = self.ctx.db.job_cards().require(job_card_id).await?;
        self.ensure_item_on(&card, item_id).await?;

        let movements = card.update_item(item_id, &spec, self.ctx.now())?;
        let saved = self
            .ctx
            .db
            .job_cards()
            .save(&card, &movements, self.ctx.stock_policy())
            .await?;

        info!(
            job_card_id = %saved.id,
            item_id = %item_id,
            movements = movements.len(),
            total = %saved.total(),
            "Job card item updated"
        );
        Ok(saved)
    }

    /// Removes one item and restores the stock it held.
    pub async fn remove_item(&self, job_card_id: &str, item_id: &str) -> EngineResult<JobCard> {
        let _guard = self.ctx.locks.lock(job_card_key(job_card_id)).await;
        let mut card = self.ctx.db.job_cards().require(job_card_id).await?;
        self.ensure_item_on(&card, item_id).await?;

        let (removed, movements) = card.remove_item(item_id, self.ctx.now())?;
        let saved = self
            .ctx
            .db
            .job_cards()
            .save(&card, &movements, self.ctx.stock_policy())
            .await?;

        info!(
            job_card_id = %saved.id,
            item_id = %removed.id,
            restored = removed.tracked_stock().map(|_| removed.quantity()).unwrap_or(0),
            total = %saved.total(),
            "Job card item removed"
        );
        Ok(saved)
    }

    /// Edits descriptive fields and, while the card is open, pricing.
    pub async fn update(&self, job_card_id: &str, update: JobCardUpdate) -> EngineResult<JobCard> {
        let _guard = self.ctx.locks.lock(job_card_key(job_card_id)).await;
        let mut card = self.ctx.db.job_cards().require(job_card_id).await?;

        card.apply_update(&update, self.ctx.now())?;
        let saved = self.ctx.db.job_cards().save(&card, &[], self.ctx.stock_policy()).await?;

        info!(job_card_id = %saved.id, total = %saved.total(), "Job card updated");
        Ok(saved)
    }

    /// Deletes the card and its items. Stock is restored unless the card was
    /// completed. Invoices keep their snapshot and lose the link.
    pub async fn delete(&self, job_card_id: &str) -> EngineResult<()> {
        let _guard = self.ctx.locks.lock(job_card_key(job_card_id)).await;
        let card = self.ctx.db.job_cards().require(job_card_id).await?;

        let release = card.stock_release();
        self.ctx
            .db
            .job_cards()
            .delete(job_card_id, &release, self.ctx.stock_policy())
            .await?;

        info!(
            job_card_id = %job_card_id,
            status = %card.status(),
            restored_movements = release.len(),
            "Job card deleted"
        );
        Ok(())
    }

    // =========================================================================
    // Status Machine
    // =========================================================================

    pub async fn start(&self, job_card_id: &str) -> EngineResult<JobCard> {
        self.update_status(job_card_id, JobCardStatus::InProgress).await
    }

    /// Strict transition. Entering COMPLETED stamps `completed_at` once.
    pub async fn update_status(&self, job_card_id: &str, status: JobCardStatus) -> EngineResult<JobCard> {
        let _guard = self.ctx.locks.lock(job_card_key(job_card_id)).await;
        let mut card = self.ctx.db.job_cards().require(job_card_id).await?;
        let from = card.status();

        card.transition_to(status, self.ctx.now())?;
        if from == status {
            debug!(job_card_id = %job_card_id, status = %status, "Job card status unchanged");
            return Ok(card);
        }
        let saved = self.ctx.db.job_cards().save(&card, &[], self.ctx.stock_policy()).await?;

        info!(job_card_id = %saved.id, from = %from, to = %status, "Job card status changed");
        Ok(saved)
    }

    /// COMPLETED → IN_PROGRESS, clearing the completion timestamp.
    pub async fn reopen(&self, job_card_id: &str) -> EngineResult<JobCard> {
        let _guard = self.ctx.locks.lock(job_card_key(job_card_id)).await;
        let mut card = self.ctx.db.job_cards().require(job_card_id).await?;

        card.reopen(self.ctx.now())?;
        let saved = self.ctx.db.job_cards().save(&card, &[], self.ctx.stock_policy()).await?;

        info!(job_card_id = %saved.id, "Job card reopened");
        Ok(saved)
    }

    /// Appends the final items, settles pricing and marks the card COMPLETED.
    ///
    /// With `generate_invoice` the invoice is built from the completed card and
    /// written in the same transaction as the card and its stock movements.
    pub async fn complete(&self, job_card_id: &str, request: CompleteJobCard) -> EngineResult<CompletionOutcome> {
        let _guard = self.ctx.locks.lock(job_card_key(job_card_id)).await;
        let mut card = self.ctx.db.job_cards().require(job_card_id).await?;

        let now = self.ctx.now();
        let movements = card.complete(&request, now)?;
        let policy = self.ctx.stock_policy();

        if !request.generate_invoice {
            let saved = self.ctx.db.job_cards().save(&card, &movements, policy).await?;
            info!(job_card_id = %saved.id, total = %saved.total(), "Job card completed");
            return Ok(CompletionOutcome {
                job_card: saved,
                invoice: None,
            });
        }

        let _garage_guard = self.ctx.locks.lock(garage_key(&card.garage_id)).await;
        let today = self.ctx.today();
        let options = invoice::with_default_due_days(&self.ctx, (&request).into());
        let number = invoice::allocate_number(&self.ctx, &card.garage_id, today).await?;
        let new_invoice = Invoice::from_completed_job_card(&number, &card, &options, today, now)?;

        let (saved, stored) = self
            .ctx
            .db
            .job_cards()
            .save_with_invoice(&card, &movements, policy, &new_invoice)
            .await?;

        info!(
            job_card_id = %saved.id,
            invoice_id = %stored.id,
            invoice_number = %stored.invoice_number,
            total = %saved.total(),
            "Job card completed with invoice"
        );
        Ok(CompletionOutcome {
            job_card: saved,
            invoice: Some(stored),
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get(&self, job_card_id: &str) -> EngineResult<JobCard> {
        Ok(self.ctx.db.job_cards().require(job_card_id).await?)
    }

    pub async fn list_all(&self) -> EngineResult<Vec<JobCard>> {
        Ok(self.ctx.db.job_cards().list_all().await?)
    }

    pub async fn list_by_garage(&self, garage_id: &str) -> EngineResult<Vec<JobCard>> {
        Ok(self.ctx.db.job_cards().list_by_garage(garage_id).await?)
    }

    pub async fn list_by_status(&self, garage_id: &str, status: JobCardStatus) -> EngineResult<Vec<JobCard>> {
        Ok(self.ctx.db.job_cards().list_by_status(garage_id, status).await?)
    }

    pub async fn list_flagged(&self, garage_id: &str, flag: bool) -> EngineResult<Vec<JobCard>> {
        Ok(self.ctx.db.job_cards().list_flagged(garage_id, flag).await?)
    }

    /// Case-insensitive number plate substring search across garages.
    pub async fn search_by_vehicle(&self, query: &str) -> EngineResult<Vec<JobCard>> {
        let query = validate_search_query(query)?;
        debug!(query = %query, "Searching job cards by vehicle");
        Ok(self.ctx.db.job_cards().search_by_vehicle(&query).await?)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// NotFound for an unknown item, Mismatch for an item of another card.
    async fn ensure_item_on(&self, card: &JobCard, item_id: &str) -> EngineResult<()> {
        if card.item(item_id).is_some() {
            return Ok(());
        }
        match self.ctx.db.job_cards().find_item_owner(item_id).await? {
            Some(_) => Err(CoreError::mismatch("Job card item", item_id, "job card", &card.id).into()),
            None => Err(CoreError::not_found("Job card item", item_id).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{engine, part, GARAGE, OIL};
    use garage_core::{CustomerDetails, ErrorKind, ItemKind, Money, VehicleDetails};

    fn new_card() -> NewJobCard {
        NewJobCard {
            vehicle: VehicleDetails {
                number_plate: "ka01ab1234".to_string(),
                ..Default::default()
            },
            customer: CustomerDetails {
                name: Some("Asha Rao".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_requires_garage() {
        let engine = engine().await;

        let card = engine.job_cards().create(GARAGE, new_card()).await.unwrap();
        assert_eq!(card.status(), JobCardStatus::Pending);
        assert!(!card.flag);
        assert_eq!(card.total(), Money::zero());

        let err = engine.job_cards().create("nope", new_card()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_add_item_moves_stock_and_totals() {
        let engine = engine().await;
        let card = engine.job_cards().create(GARAGE, new_card()).await.unwrap();

        let spec = LineItemSpec::new(ItemKind::SparePart, "Brake pad", 2, Money::from_major(100))
            .with_discount(Money::from_major(10))
            .with_tax(Money::from_major(5));
        let card = engine.job_cards().add_item(&card.id, spec).await.unwrap();
        assert_eq!(card.items()[0].total(), Money::from_major(195));
        assert_eq!(card.subtotal(), Money::from_major(195));

        let card = engine.job_cards().add_item(&card.id, part(3)).await.unwrap();
        assert_eq!(card.items().len(), 2);
        assert_eq!(engine.database().stock().quantity(OIL).await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_update_item_distinguishes_unknown_and_foreign() {
        let engine = engine().await;
        let a = engine.job_cards().create(GARAGE, new_card()).await.unwrap();
        let b = engine.job_cards().create(GARAGE, new_card()).await.unwrap();
        let b = engine.job_cards().add_item(&b.id, part(1)).await.unwrap();
        let foreign = b.items()[0].id.clone();

        let err = engine.job_cards().update_item(&a.id, &foreign, part(2)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Mismatch);

        let err = engine.job_cards().update_item(&a.id, "missing", part(2)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let b = engine.job_cards().update_item(&b.id, &foreign, part(4)).await.unwrap();
        assert_eq!(b.items()[0].quantity(), 4);
        assert_eq!(engine.database().stock().quantity(OIL).await.unwrap(), Some(6));
    }

    #[tokio::test]
    async fn test_remove_item_restores_stock() {
        let engine = engine().await;
        let card = engine.job_cards().create(GARAGE, new_card()).await.unwrap();
        let card = engine.job_cards().add_item(&card.id, part(3)).await.unwrap();
        assert_eq!(engine.database().stock().quantity(OIL).await.unwrap(), Some(7));

        let item_id = card.items()[0].id.clone();
        let card = engine.job_cards().remove_item(&card.id, &item_id).await.unwrap();
        assert!(card.items().is_empty());
        assert_eq!(card.total(), Money::zero());
        assert_eq!(engine.database().stock().quantity(OIL).await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_status_machine() {
        let engine = engine().await;
        let card = engine.job_cards().create(GARAGE, new_card()).await.unwrap();

        let card = engine.job_cards().start(&card.id).await.unwrap();
        assert_eq!(card.status(), JobCardStatus::InProgress);

        let card = engine
            .job_cards()
            .update_status(&card.id, JobCardStatus::Completed)
            .await
            .unwrap();
        let stamped = card.completed_at();
        assert!(stamped.is_some());

        let err = engine
            .job_cards()
            .update_status(&card.id, JobCardStatus::Pending)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = engine.job_cards().add_item(&card.id, part(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let card = engine.job_cards().reopen(&card.id).await.unwrap();
        assert_eq!(card.status(), JobCardStatus::InProgress);
        assert!(card.completed_at().is_none());
    }

    #[tokio::test]
    async fn test_complete_twice_changes_nothing() {
        let engine = engine().await;
        let card = engine.job_cards().create(GARAGE, new_card()).await.unwrap();

        let request = CompleteJobCard {
            items: vec![part(2)],
            labour: Some(Money::from_major(50)),
            ..Default::default()
        };
        let outcome = engine.job_cards().complete(&card.id, request.clone()).await.unwrap();
        assert!(outcome.invoice.is_none());
        let done = outcome.job_card;
        assert_eq!(engine.database().stock().quantity(OIL).await.unwrap(), Some(8));

        let err = engine.job_cards().complete(&card.id, request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let reloaded = engine.job_cards().get(&card.id).await.unwrap();
        assert_eq!(reloaded, done);
        assert_eq!(engine.database().stock().quantity(OIL).await.unwrap(), Some(8));
    }

    #[tokio::test]
    async fn test_delete_restores_open_card_stock_only() {
        let engine = engine().await;

        let open = engine.job_cards().create(GARAGE, new_card()).await.unwrap();
        engine.job_cards().add_item(&open.id, part(4)).await.unwrap();
        engine.job_cards().delete(&open.id).await.unwrap();
        assert_eq!(engine.database().stock().quantity(OIL).await.unwrap(), Some(10));

        let done = engine.job_cards().create(GARAGE, new_card()).await.unwrap();
        engine.job_cards().add_item(&done.id, part(4)).await.unwrap();
        engine
            .job_cards()
            .complete(&done.id, CompleteJobCard::default())
            .await
            .unwrap();
        engine.job_cards().delete(&done.id).await.unwrap();
        assert_eq!(engine.database().stock().quantity(OIL).await.unwrap(), Some(6));

        let err = engine.job_cards().get(&done.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_queries() {
        let engine = engine().await;
        let first = engine.job_cards().create(GARAGE, new_card()).await.unwrap();
        let mut flagged = new_card();
        flagged.flag = Some(true);
        flagged.vehicle.number_plate = "MH12XY9999".to_string();
        let second = engine.job_cards().create(GARAGE, flagged).await.unwrap();
        engine.job_cards().start(&first.id).await.unwrap();

        let in_progress = engine
            .job_cards()
            .list_by_status(GARAGE, JobCardStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(in_progress.len(), 1);
        assert_eq!(in_progress[0].id, first.id);

        let flagged = engine.job_cards().list_flagged(GARAGE, true).await.unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].id, second.id);

        let found = engine.job_cards().search_by_vehicle("xy99").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, second.id);
        assert!(engine.job_cards().search_by_vehicle("").await.is_err());

        assert_eq!(engine.job_cards().list_by_garage(GARAGE).await.unwrap().len(), 2);
        assert_eq!(engine.job_cards().list_all().await.unwrap().len(), 2);
    }
}
