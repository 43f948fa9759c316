//! # Payment Service
//!
//! Money received outside the invoice flow. Each payment is stored with the
//! CREDIT cash book entry it raises, under the garage's ledger lock, so the
//! record and the ledger never disagree.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

use garage_core::{CashBookEntry, CoreError, DateRange, NewPayment, Payment, PaymentMethod, PaymentType, RevenueReport};

use super::EngineContext;
use crate::error::EngineResult;
use crate::locks::garage_key;

#[derive(Debug, Clone)]
pub struct PaymentService {
    ctx: Arc<EngineContext>,
}

impl PaymentService {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        PaymentService { ctx }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Records a payment and its ledger entry.
    pub async fn create(&self, request: NewPayment) -> EngineResult<(Payment, CashBookEntry)> {
        let garage = self.ctx.db.garages().require(request.garage_id.trim()).await?;
        let today = self.ctx.today();
        let payment = Payment::record(&request, today, self.ctx.now())?;
        self.check_links(&payment).await?;
        let entry = payment.ledger_entry().validate(today)?;

        let _guard = self.ctx.locks.lock(garage_key(&garage.id)).await;
        let (payment, entry) = self.ctx.db.payments().insert(&payment, entry, self.ctx.now()).await?;

        info!(
            payment_id = %payment.id,
            garage_id = %garage.id,
            payment_type = %payment.payment_type,
            method = %payment.method,
            amount = %payment.amount,
            balance = %entry.running_balance(),
            "Payment created"
        );
        Ok((payment, entry))
    }

    /// Replaces a payment and corrects its ledger entry.
    pub async fn update(&self, payment_id: &str, request: NewPayment) -> EngineResult<(Payment, CashBookEntry)> {
        let mut payment = self.ctx.db.payments().require(payment_id).await?;
        let previous = payment.amount;
        payment.revise(&request, self.ctx.now())?;
        self.check_links(&payment).await?;
        let entry = payment.ledger_entry().validate(self.ctx.today())?;

        let _guard = self.ctx.locks.lock(garage_key(&payment.garage_id)).await;
        let (payment, entry) = self.ctx.db.payments().update(&payment, entry, self.ctx.now()).await?;

        info!(
            payment_id = %payment.id,
            garage_id = %payment.garage_id,
            previous_amount = %previous,
            amount = %payment.amount,
            "Payment updated"
        );
        Ok((payment, entry))
    }

    /// Deletes a payment and the ledger entry it raised.
    pub async fn delete(&self, payment_id: &str) -> EngineResult<()> {
        let payment = self.ctx.db.payments().require(payment_id).await?;

        let _guard = self.ctx.locks.lock(garage_key(&payment.garage_id)).await;
        self.ctx.db.payments().delete(payment_id).await?;

        info!(payment_id = %payment_id, garage_id = %payment.garage_id, amount = %payment.amount, "Payment deleted");
        Ok(())
    }

    /// Linked job cards and invoices must exist in the payment's garage.
    async fn check_links(&self, payment: &Payment) -> EngineResult<()> {
        if let Some(job_card_id) = &payment.job_card_id {
            let card = self.ctx.db.job_cards().require(job_card_id).await?;
            if card.garage_id != payment.garage_id {
                return Err(CoreError::mismatch("Job card", job_card_id, "garage", &payment.garage_id).into());
            }
        }
        if let Some(invoice_id) = &payment.invoice_id {
            let invoice = self.ctx.db.invoices().require(invoice_id).await?;
            if invoice.garage_id != payment.garage_id {
                return Err(CoreError::mismatch("Invoice", invoice_id, "garage", &payment.garage_id).into());
            }
        }
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get(&self, payment_id: &str) -> EngineResult<Payment> {
        Ok(self.ctx.db.payments().require(payment_id).await?)
    }

    pub async fn list_by_garage(&self, garage_id: &str) -> EngineResult<Vec<Payment>> {
        Ok(self.ctx.db.payments().list_by_garage(garage_id).await?)
    }

    pub async fn list_by_date_range(&self, garage_id: &str, from: NaiveDate, to: NaiveDate) -> EngineResult<Vec<Payment>> {
        let range = DateRange::new(from, to)?;
        Ok(self.ctx.db.payments().list_by_date_range(garage_id, range).await?)
    }

    pub async fn list_today(&self, garage_id: &str) -> EngineResult<Vec<Payment>> {
        let today = DateRange::single(self.ctx.today());
        Ok(self.ctx.db.payments().list_by_date_range(garage_id, today).await?)
    }

    pub async fn list_by_type(&self, garage_id: &str, payment_type: PaymentType) -> EngineResult<Vec<Payment>> {
        Ok(self.ctx.db.payments().list_by_type(garage_id, payment_type).await?)
    }

    pub async fn list_by_method(&self, garage_id: &str, method: PaymentMethod) -> EngineResult<Vec<Payment>> {
        Ok(self.ctx.db.payments().list_by_method(garage_id, method).await?)
    }

    pub async fn list_by_job_card(&self, job_card_id: &str) -> EngineResult<Vec<Payment>> {
        Ok(self.ctx.db.payments().list_by_job_card(job_card_id).await?)
    }

    // =========================================================================
    // Reports
    // =========================================================================

    pub async fn revenue_report(&self, garage_id: &str) -> EngineResult<RevenueReport> {
        self.report(garage_id, None).await
    }

    pub async fn revenue_report_by_date_range(
        &self,
        garage_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<RevenueReport> {
        self.report(garage_id, Some(DateRange::new(from, to)?)).await
    }

    async fn report(&self, garage_id: &str, range: Option<DateRange>) -> EngineResult<RevenueReport> {
        let garage = self.ctx.db.garages().require(garage_id).await?;
        let payments = self.ctx.db.payments().list_by_garage(&garage.id).await?;
        let report = RevenueReport::compute(&garage.id, &garage.name, &payments, self.ctx.today(), range);

        debug!(
            garage_id = %garage.id,
            total = %report.total,
            transactions = report.transactions,
            "Revenue report computed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{engine, today, GARAGE, OTHER_GARAGE};
    use chrono::Duration;
    use garage_core::ledger::category;
    use garage_core::{ErrorKind, Money, NewJobCard, TransactionType, VehicleDetails};

    fn cash(amount: i64, payment_type: PaymentType) -> NewPayment {
        NewPayment::new(GARAGE, Money::from_major(amount), PaymentMethod::Cash, payment_type)
    }

    #[tokio::test]
    async fn test_payment_raises_linked_credit() {
        let engine = engine().await;
        let (payment, entry) = engine.payments().create(cash(300, PaymentType::SparePart)).await.unwrap();

        assert_eq!(payment.date, today());
        assert_eq!(entry.details.transaction_type, TransactionType::Credit);
        assert_eq!(entry.details.category, category::SPARE_PART_SALE);
        assert_eq!(entry.details.links.payment_id.as_deref(), Some(payment.id.as_str()));
        assert_eq!(engine.cash_book().net_balance(GARAGE, None).await.unwrap(), Money::from_major(300));
    }

    #[tokio::test]
    async fn test_update_and_delete_follow_the_ledger() {
        let engine = engine().await;
        let payments = engine.payments();
        let (first, _) = payments.create(cash(300, PaymentType::Service)).await.unwrap();
        payments.create(cash(100, PaymentType::Lube)).await.unwrap();

        let (updated, entry) = payments.update(&first.id, cash(250, PaymentType::Service)).await.unwrap();
        assert_eq!(updated.amount, Money::from_major(250));
        assert_eq!(entry.running_balance(), Money::from_major(250));
        assert_eq!(engine.cash_book().net_balance(GARAGE, None).await.unwrap(), Money::from_major(350));

        let moved = NewPayment::new(OTHER_GARAGE, Money::from_major(1), PaymentMethod::Cash, PaymentType::Service);
        let err = payments.update(&first.id, moved).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Mismatch);

        payments.delete(&first.id).await.unwrap();
        let ledger = engine.cash_book().list_by_garage(GARAGE).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].running_balance(), Money::from_major(100));
        assert_eq!(payments.get(&first.id).await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_rejects_bad_payments() {
        let engine = engine().await;
        let payments = engine.payments();

        let err = payments.create(cash(0, PaymentType::Other)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let nowhere = NewPayment::new("missing", Money::from_major(5), PaymentMethod::Cash, PaymentType::Other);
        assert_eq!(payments.create(nowhere).await.unwrap_err().kind(), ErrorKind::NotFound);

        let card = engine
            .job_cards()
            .create(
                OTHER_GARAGE,
                NewJobCard {
                    vehicle: VehicleDetails {
                        number_plate: "KA01AB1234".to_string(),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let foreign = cash(50, PaymentType::Service).for_job_card(&card.id);
        assert_eq!(payments.create(foreign).await.unwrap_err().kind(), ErrorKind::Mismatch);
        assert!(engine.cash_book().list_by_garage(GARAGE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revenue_report_and_filters() {
        let engine = engine().await;
        let payments = engine.payments();
        let last_month = today() - Duration::days(40);

        payments.create(cash(300, PaymentType::Service)).await.unwrap();
        payments
            .create(NewPayment::new(GARAGE, Money::from_major(80), PaymentMethod::Upi, PaymentType::Lube))
            .await
            .unwrap();
        payments.create(cash(500, PaymentType::Service).on(last_month)).await.unwrap();

        let report = payments.revenue_report(GARAGE).await.unwrap();
        assert_eq!(report.garage_name, "Garage One");
        assert_eq!(report.total, Money::from_major(880));
        assert_eq!(report.today_transactions, 2);
        assert_eq!(report.for_type(PaymentType::Service), Money::from_major(800));
        assert_eq!(report.for_method(PaymentMethod::Upi), Money::from_major(80));

        let recent = payments.revenue_report_by_date_range(GARAGE, today(), today()).await.unwrap();
        assert_eq!(recent.for_type(PaymentType::Service), Money::from_major(300));

        assert_eq!(payments.list_today(GARAGE).await.unwrap().len(), 2);
        assert_eq!(payments.list_by_type(GARAGE, PaymentType::Lube).await.unwrap().len(), 1);
        assert_eq!(payments.list_by_method(GARAGE, PaymentMethod::Cash).await.unwrap().len(), 2);
        assert_eq!(payments.list_by_date_range(GARAGE, last_month, last_month).await.unwrap().len(), 1);
    }
}
