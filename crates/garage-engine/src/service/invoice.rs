//! # Invoice Service
//!
//! Invoice creation (direct or from a job card), edits, status changes,
//! payments and the invoice summary.
//!
//! ## Payment Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          add_payment                                    │
//! │                                                                         │
//! │  lock invoice:{id}                                                     │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  invoice.add_payment(req) ──► paid += amount, due / status derived     │
//! │     │                          (Validation / InvoiceClosed → abort)    │
//! │     ▼                                                                   │
//! │  record_invoice_payments?                                              │
//! │     ├── yes: lock garage:{g} ─► save_with_entry                        │
//! │     │        (invoice CAS + CREDIT INVOICE_PAYMENT entry, one tx)      │
//! │     └── no:  save (invoice CAS only)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Numbers come from the per-(garage, day) counter; a rolled-back creation
//! leaves a gap in the sequence, never a duplicate.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use garage_core::validation::validate_search_query;
use garage_core::{
    CashBookEntry, CoreError, DateRange, FromJobCardOptions, Invoice, InvoiceNumber, InvoicePaymentReceived,
    InvoiceStatus, InvoiceSummary, InvoiceUpdate, NewCashBookEntry, NewInvoice, PaymentApplied, PaymentRequest,
    PaymentStatus,
};

use super::EngineContext;
use crate::error::EngineResult;
use crate::locks::{garage_key, invoice_key};

/// What `add_payment` produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentOutcome {
    pub invoice: Invoice,
    pub payment: PaymentApplied,
    /// The cash book entry, when invoice payments are recorded.
    pub entry: Option<CashBookEntry>,
}

#[derive(Debug, Clone)]
pub struct InvoiceService {
    ctx: Arc<EngineContext>,
}

impl InvoiceService {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        InvoiceService { ctx }
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Creates a DRAFT invoice from explicit fields.
    pub async fn create(&self, mut request: NewInvoice) -> EngineResult<Invoice> {
        let garage = self.ctx.db.garages().require(&request.garage_id).await?;
        if let Some(job_card_id) = &request.job_card_id {
            let card = self.ctx.db.job_cards().require(job_card_id).await?;
            if card.garage_id != garage.id {
                return Err(CoreError::mismatch("Job card", job_card_id, "garage", &garage.id).into());
            }
        }
        if request.due_date.is_none() && request.due_days.is_none() {
            request.due_days = self.ctx.config.invoicing.default_due_days;
        }

        let _guard = self.ctx.locks.lock(garage_key(&garage.id)).await;
        let today = self.ctx.today();
        let number = allocate_number(&self.ctx, &garage.id, today).await?;
        let invoice = Invoice::draft(&number, &request, today, self.ctx.now())?;

        let stored = self.ctx.db.invoices().insert(&invoice).await?;
        info!(
            invoice_id = %stored.id,
            invoice_number = %stored.invoice_number,
            garage_id = %stored.garage_id,
            total = %stored.total(),
            "Invoice created"
        );
        Ok(stored)
    }

    /// DRAFT invoice billing a job card in any status.
    pub async fn create_from_job_card(&self, job_card_id: &str, options: FromJobCardOptions) -> EngineResult<Invoice> {
        self.bill_job_card(job_card_id, options, false).await
    }

    /// SENT invoice billing a COMPLETED job card.
    pub async fn create_from_completed_job_card(
        &self,
        job_card_id: &str,
        options: FromJobCardOptions,
    ) -> EngineResult<Invoice> {
        self.bill_job_card(job_card_id, options, true).await
    }

    async fn bill_job_card(
        &self,
        job_card_id: &str,
        options: FromJobCardOptions,
        completed_only: bool,
    ) -> EngineResult<Invoice> {
        let card = self.ctx.db.job_cards().require(job_card_id).await?;
        if completed_only && !card.is_completed() {
            return Err(CoreError::JobCardNotCompleted { id: card.id.clone() }.into());
        }
        let options = with_default_due_days(&self.ctx, options);
        options.validate()?;

        let _guard = self.ctx.locks.lock(garage_key(&card.garage_id)).await;
        let (today, now) = (self.ctx.today(), self.ctx.now());
        let number = allocate_number(&self.ctx, &card.garage_id, today).await?;
        let invoice = if completed_only {
            Invoice::from_completed_job_card(&number, &card, &options, today, now)?
        } else {
            Invoice::from_job_card(&number, &card, &options, today, now)?
        };

        let stored = self.ctx.db.invoices().insert(&invoice).await?;
        info!(
            invoice_id = %stored.id,
            invoice_number = %stored.invoice_number,
            job_card_id = %card.id,
            status = %stored.status(),
            total = %stored.total(),
            "Invoice created from job card"
        );
        Ok(stored)
    }

    // =========================================================================
    // Edit / Status
    // =========================================================================

    /// Header fields, adjustments and an optional replacement item list.
    pub async fn update(&self, invoice_id: &str, update: InvoiceUpdate) -> EngineResult<Invoice> {
        let _guard = self.ctx.locks.lock(invoice_key(invoice_id)).await;
        let mut invoice = self.ctx.db.invoices().require(invoice_id).await?;

        invoice.apply_update(&update, self.ctx.now())?;
        let saved = self.ctx.db.invoices().save(&invoice).await?;

        info!(invoice_id = %saved.id, total = %saved.total(), due = %saved.due(), "Invoice updated");
        Ok(saved)
    }

    pub async fn delete(&self, invoice_id: &str) -> EngineResult<()> {
        let _guard = self.ctx.locks.lock(invoice_key(invoice_id)).await;
        self.ctx.db.invoices().delete(invoice_id).await?;

        info!(invoice_id = %invoice_id, "Invoice deleted");
        Ok(())
    }

    /// Direct status change. PAID and PARTIALLY_PAID only come from payments.
    pub async fn update_status(&self, invoice_id: &str, status: InvoiceStatus) -> EngineResult<Invoice> {
        let _guard = self.ctx.locks.lock(invoice_key(invoice_id)).await;
        let mut invoice = self.ctx.db.invoices().require(invoice_id).await?;
        let from = invoice.status();

        invoice.set_status(status, self.ctx.now())?;
        let saved = self.ctx.db.invoices().save(&invoice).await?;

        info!(invoice_id = %saved.id, from = %from, to = %status, "Invoice status changed");
        Ok(saved)
    }

    pub async fn mark_as_sent(&self, invoice_id: &str) -> EngineResult<Invoice> {
        self.update_status(invoice_id, InvoiceStatus::Sent).await
    }

    pub async fn cancel(&self, invoice_id: &str) -> EngineResult<Invoice> {
        self.update_status(invoice_id, InvoiceStatus::Cancelled).await
    }

    /// Settles the invoice in full. A second call is a no-op that keeps the
    /// original paid date.
    pub async fn mark_as_paid(&self, invoice_id: &str) -> EngineResult<Invoice> {
        let _guard = self.ctx.locks.lock(invoice_key(invoice_id)).await;
        let mut invoice = self.ctx.db.invoices().require(invoice_id).await?;

        if !invoice.mark_paid(self.ctx.today(), self.ctx.now())? {
            debug!(invoice_id = %invoice_id, "Invoice already paid");
            return Ok(invoice);
        }
        let saved = self.ctx.db.invoices().save(&invoice).await?;

        info!(invoice_id = %saved.id, paid = %saved.paid(), "Invoice marked as paid");
        Ok(saved)
    }

    /// Records a payment; with `record_invoice_payments` the matching cash
    /// book credit is written in the same transaction.
    pub async fn add_payment(&self, invoice_id: &str, payment: PaymentRequest) -> EngineResult<PaymentOutcome> {
        let _guard = self.ctx.locks.lock(invoice_key(invoice_id)).await;
        let mut invoice = self.ctx.db.invoices().require(invoice_id).await?;

        let (today, now) = (self.ctx.today(), self.ctx.now());
        let applied = invoice.add_payment(&payment, today, now)?;

        if !self.ctx.config.invoicing.record_invoice_payments {
            let saved = self.ctx.db.invoices().save(&invoice).await?;
            log_payment(&saved, &applied);
            return Ok(PaymentOutcome {
                invoice: saved,
                payment: applied,
                entry: None,
            });
        }

        let event = InvoicePaymentReceived::from_applied(&invoice.garage_id, &applied);
        let mut request = NewCashBookEntry::from(&event);
        request.links.job_card_id = invoice.job_card_id.clone();
        let details = request.validate(today)?;

        let _garage_guard = self.ctx.locks.lock(garage_key(&invoice.garage_id)).await;
        let (saved, entry) = self.ctx.db.invoices().save_with_entry(&invoice, details, now).await?;

        log_payment(&saved, &applied);
        Ok(PaymentOutcome {
            invoice: saved,
            payment: applied,
            entry: Some(entry),
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get(&self, invoice_id: &str) -> EngineResult<Invoice> {
        Ok(self.ctx.db.invoices().require(invoice_id).await?)
    }

    pub async fn get_by_number(&self, invoice_number: &str) -> EngineResult<Invoice> {
        self.ctx
            .db
            .invoices()
            .get_by_number(invoice_number)
            .await?
            .ok_or_else(|| CoreError::not_found("Invoice", invoice_number).into())
    }

    pub async fn list_all(&self) -> EngineResult<Vec<Invoice>> {
        Ok(self.ctx.db.invoices().list_all().await?)
    }

    pub async fn list_by_garage(&self, garage_id: &str) -> EngineResult<Vec<Invoice>> {
        Ok(self.ctx.db.invoices().list_by_garage(garage_id).await?)
    }

    pub async fn list_by_status(&self, garage_id: &str, status: InvoiceStatus) -> EngineResult<Vec<Invoice>> {
        Ok(self.ctx.db.invoices().list_by_status(garage_id, status).await?)
    }

    pub async fn list_by_payment_status(&self, garage_id: &str, status: PaymentStatus) -> EngineResult<Vec<Invoice>> {
        Ok(self.ctx.db.invoices().list_by_payment_status(garage_id, status).await?)
    }

    pub async fn list_by_date(&self, garage_id: &str, date: NaiveDate) -> EngineResult<Vec<Invoice>> {
        Ok(self
            .ctx
            .db
            .invoices()
            .list_by_date_range(garage_id, DateRange::single(date))
            .await?)
    }

    /// Invoices dated within `from..=to`.
    pub async fn list_by_date_range(&self, garage_id: &str, from: NaiveDate, to: NaiveDate) -> EngineResult<Vec<Invoice>> {
        let range = DateRange::new(from, to)?;
        Ok(self.ctx.db.invoices().list_by_date_range(garage_id, range).await?)
    }

    pub async fn list_today(&self, garage_id: &str) -> EngineResult<Vec<Invoice>> {
        self.list_by_date(garage_id, self.ctx.today()).await
    }

    /// Due date before today and not fully paid.
    pub async fn list_overdue(&self, garage_id: &str) -> EngineResult<Vec<Invoice>> {
        Ok(self.ctx.db.invoices().list_overdue(garage_id, self.ctx.today()).await?)
    }

    pub async fn list_by_job_card(&self, job_card_id: &str) -> EngineResult<Vec<Invoice>> {
        Ok(self.ctx.db.invoices().list_by_job_card(job_card_id).await?)
    }

    /// Case-insensitive substring over customer name, phone and email.
    pub async fn search_by_customer(&self, garage_id: &str, query: &str) -> EngineResult<Vec<Invoice>> {
        let query = validate_search_query(query)?;
        Ok(self.ctx.db.invoices().search_by_customer(garage_id, &query).await?)
    }

    pub async fn search_by_vehicle(&self, garage_id: &str, query: &str) -> EngineResult<Vec<Invoice>> {
        let query = validate_search_query(query)?;
        Ok(self.ctx.db.invoices().search_by_vehicle(garage_id, &query).await?)
    }

    // =========================================================================
    // Summary
    // =========================================================================

    pub async fn summary(&self, garage_id: &str) -> EngineResult<InvoiceSummary> {
        let garage = self.ctx.db.garages().require(garage_id).await?;
        let invoices = self.ctx.db.invoices().list_by_garage(&garage.id).await?;
        debug!(garage_id = %garage.id, invoices = invoices.len(), "Computing invoice summary");
        Ok(InvoiceSummary::compute(
            &garage.id,
            &garage.name,
            &invoices,
            self.ctx.today(),
            None,
        ))
    }

    /// Every figure restricted to invoices dated within `from..=to`.
    pub async fn summary_by_date_range(
        &self,
        garage_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<InvoiceSummary> {
        let range = DateRange::new(from, to)?;
        let garage = self.ctx.db.garages().require(garage_id).await?;
        let invoices = self.ctx.db.invoices().list_by_date_range(&garage.id, range).await?;
        Ok(InvoiceSummary::compute(
            &garage.id,
            &garage.name,
            &invoices,
            self.ctx.today(),
            Some(range),
        ))
    }
}

// =============================================================================
// Shared with the job card service
// =============================================================================

pub(crate) async fn allocate_number(ctx: &EngineContext, garage_id: &str, today: NaiveDate) -> EngineResult<InvoiceNumber> {
    let number = ctx
        .db
        .invoices()
        .next_number(ctx.config.invoice_prefix(), garage_id, today)
        .await?;
    debug!(garage_id = %garage_id, invoice_number = %number, "Invoice number allocated");
    Ok(number)
}

pub(crate) fn with_default_due_days(ctx: &EngineContext, mut options: FromJobCardOptions) -> FromJobCardOptions {
    if options.due_days.is_none() {
        options.due_days = ctx.config.invoicing.default_due_days;
    }
    options
}

fn log_payment(invoice: &Invoice, applied: &PaymentApplied) {
    info!(
        invoice_id = %invoice.id,
        invoice_number = %invoice.invoice_number,
        amount = %applied.amount,
        payment_status = %invoice.payment_status(),
        due = %invoice.due(),
        overpaid = %invoice.overpaid(),
        "Invoice payment recorded"
    );
}
