//! # Cash Book Service
//!
//! The per-garage ledger: manual entries, entries raised by payments and
//! expenses, corrections, and SUM-based aggregates.
//!
//! ## Append Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Ledger Append                                    │
//! │                                                                         │
//! │  validate request (category upper-cased, amount > 0, date ← today)     │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  lock garage:{id}             in-process writers queue here            │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  BEGIN                                                                  │
//! │    UPDATE garages SET ledger_version + 1    other processes queue here │
//! │    prior    = Σ signed amounts                                         │
//! │    position = MAX(position) + 1                                        │
//! │    INSERT entry (running_balance = prior ± amount)                     │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Corrections (`update_entry`, `delete_entry`) take the same lock and
//! rebalance every later entry in their transaction.

use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use tracing::{debug, info};

use garage_core::validation::validate_search_query;
use garage_core::{
    CashBookEntry, CashBookSummary, CoreError, DateRange, ExpenseIncurred, InvoicePaymentReceived, LedgerTotals, Money,
    NewCashBookEntry, PaymentReceived, TransactionType,
};

use super::EngineContext;
use crate::error::EngineResult;
use crate::locks::garage_key;

#[derive(Debug, Clone)]
pub struct CashBookService {
    ctx: Arc<EngineContext>,
}

impl CashBookService {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        CashBookService { ctx }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub async fn create_entry(&self, request: NewCashBookEntry) -> EngineResult<CashBookEntry> {
        let garage = self.ctx.db.garages().require(request.garage_id.trim()).await?;
        let details = request.validate(self.ctx.today())?;

        let _guard = self.ctx.locks.lock(garage_key(&garage.id)).await;
        let entry = self.ctx.db.cash_book().append(&garage.id, details, self.ctx.now()).await?;

        info!(
            entry_id = %entry.id,
            garage_id = %garage.id,
            transaction_type = %entry.details.transaction_type,
            category = %entry.details.category,
            amount = %entry.details.amount,
            balance = %entry.running_balance(),
            "Cash book entry created"
        );
        Ok(entry)
    }

    /// Rewrites an entry and every later running balance. The garage of an
    /// entry never changes.
    pub async fn update_entry(&self, entry_id: &str, request: NewCashBookEntry) -> EngineResult<CashBookEntry> {
        let existing = self.ctx.db.cash_book().require(entry_id).await?;
        if request.garage_id.trim() != existing.garage_id {
            return Err(CoreError::mismatch("Cash book entry", entry_id, "garage", request.garage_id.trim()).into());
        }
        let details = request.validate(self.ctx.today())?;

        let _guard = self.ctx.locks.lock(garage_key(&existing.garage_id)).await;
        let entry = self.ctx.db.cash_book().update(entry_id, details, self.ctx.now()).await?;

        info!(
            entry_id = %entry.id,
            garage_id = %entry.garage_id,
            previous_amount = %existing.details.amount,
            amount = %entry.details.amount,
            balance = %entry.running_balance(),
            "Cash book entry corrected"
        );
        Ok(entry)
    }

    pub async fn delete_entry(&self, entry_id: &str) -> EngineResult<()> {
        let existing = self.ctx.db.cash_book().require(entry_id).await?;

        let _guard = self.ctx.locks.lock(garage_key(&existing.garage_id)).await;
        self.ctx.db.cash_book().delete(entry_id).await?;

        info!(
            entry_id = %entry_id,
            garage_id = %existing.garage_id,
            position = existing.position(),
            "Cash book entry deleted"
        );
        Ok(())
    }

    pub async fn add_credit(
        &self,
        garage_id: &str,
        category: &str,
        amount: Money,
        description: &str,
    ) -> EngineResult<CashBookEntry> {
        self.create_entry(NewCashBookEntry::credit(garage_id, category, amount, description))
            .await
    }

    pub async fn add_debit(
        &self,
        garage_id: &str,
        category: &str,
        amount: Money,
        description: &str,
    ) -> EngineResult<CashBookEntry> {
        self.create_entry(NewCashBookEntry::debit(garage_id, category, amount, description))
            .await
    }

    // -------------------------------------------------------------------------
    // Entries raised by other parts of the business
    // -------------------------------------------------------------------------

    pub async fn record_payment(&self, event: &PaymentReceived) -> EngineResult<CashBookEntry> {
        debug!(payment_id = %event.payment_id, garage_id = %event.garage_id, "Recording payment");
        self.create_entry(NewCashBookEntry::from(event)).await
    }

    pub async fn record_expense(&self, event: &ExpenseIncurred) -> EngineResult<CashBookEntry> {
        debug!(expense_id = %event.expense_id, garage_id = %event.garage_id, "Recording expense");
        self.create_entry(NewCashBookEntry::from(event)).await
    }

    /// Ledger side of an invoice payment made outside `InvoiceService::add_payment`.
    pub async fn record_invoice_payment(&self, event: &InvoicePaymentReceived) -> EngineResult<CashBookEntry> {
        debug!(invoice_id = %event.invoice_id, garage_id = %event.garage_id, "Recording invoice payment");
        self.create_entry(NewCashBookEntry::from(event)).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get(&self, entry_id: &str) -> EngineResult<CashBookEntry> {
        Ok(self.ctx.db.cash_book().require(entry_id).await?)
    }

    pub async fn list_all(&self) -> EngineResult<Vec<CashBookEntry>> {
        Ok(self.ctx.db.cash_book().list_all().await?)
    }

    /// Entries of one garage in ledger (position) order.
    pub async fn list_by_garage(&self, garage_id: &str) -> EngineResult<Vec<CashBookEntry>> {
        Ok(self.ctx.db.cash_book().list_by_garage(garage_id).await?)
    }

    pub async fn list_by_type(&self, garage_id: &str, transaction_type: TransactionType) -> EngineResult<Vec<CashBookEntry>> {
        Ok(self.ctx.db.cash_book().list_by_type(garage_id, transaction_type).await?)
    }

    pub async fn list_by_category(&self, garage_id: &str, category: &str) -> EngineResult<Vec<CashBookEntry>> {
        Ok(self.ctx.db.cash_book().list_by_category(garage_id, category).await?)
    }

    pub async fn list_by_date(&self, garage_id: &str, date: NaiveDate) -> EngineResult<Vec<CashBookEntry>> {
        Ok(self
            .ctx
            .db
            .cash_book()
            .list_by_date_range(garage_id, DateRange::single(date))
            .await?)
    }

    pub async fn list_by_date_range(
        &self,
        garage_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<CashBookEntry>> {
        let range = DateRange::new(from, to)?;
        Ok(self.ctx.db.cash_book().list_by_date_range(garage_id, range).await?)
    }

    pub async fn list_today(&self, garage_id: &str) -> EngineResult<Vec<CashBookEntry>> {
        self.list_by_date(garage_id, self.ctx.today()).await
    }

    pub async fn search_by_party(&self, garage_id: &str, query: &str) -> EngineResult<Vec<CashBookEntry>> {
        let query = validate_search_query(query)?;
        Ok(self.ctx.db.cash_book().search_by_party(garage_id, &query).await?)
    }

    pub async fn search_by_description(&self, garage_id: &str, query: &str) -> EngineResult<Vec<CashBookEntry>> {
        let query = validate_search_query(query)?;
        Ok(self.ctx.db.cash_book().search_by_description(garage_id, &query).await?)
    }

    pub async fn list_by_invoice(&self, invoice_id: &str) -> EngineResult<Vec<CashBookEntry>> {
        Ok(self.ctx.db.cash_book().list_by_invoice(invoice_id).await?)
    }

    pub async fn list_by_payment(&self, payment_id: &str) -> EngineResult<Vec<CashBookEntry>> {
        Ok(self.ctx.db.cash_book().list_by_payment(payment_id).await?)
    }

    pub async fn list_by_expense(&self, expense_id: &str) -> EngineResult<Vec<CashBookEntry>> {
        Ok(self.ctx.db.cash_book().list_by_expense(expense_id).await?)
    }

    pub async fn list_by_job_card(&self, job_card_id: &str) -> EngineResult<Vec<CashBookEntry>> {
        Ok(self.ctx.db.cash_book().list_by_job_card(job_card_id).await?)
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    pub async fn total_credit(&self, garage_id: &str, range: Option<DateRange>) -> EngineResult<Money> {
        Ok(self.ctx.db.cash_book().totals(garage_id, range).await?.credit)
    }

    pub async fn total_debit(&self, garage_id: &str, range: Option<DateRange>) -> EngineResult<Money> {
        Ok(self.ctx.db.cash_book().totals(garage_id, range).await?.debit)
    }

    /// Credits minus debits; over the whole ledger this is the last running balance.
    pub async fn net_balance(&self, garage_id: &str, range: Option<DateRange>) -> EngineResult<Money> {
        Ok(self.ctx.db.cash_book().totals(garage_id, range).await?.net)
    }

    pub async fn summary(&self, garage_id: &str) -> EngineResult<CashBookSummary> {
        self.summarize(garage_id, None).await
    }

    pub async fn summary_by_date_range(
        &self,
        garage_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<CashBookSummary> {
        self.summarize(garage_id, Some(DateRange::new(from, to)?)).await
    }

    pub async fn today_summary(&self, garage_id: &str) -> EngineResult<CashBookSummary> {
        self.summarize(garage_id, Some(DateRange::single(self.ctx.today()))).await
    }

    /// Whole calendar month `year`/`month` (1-12).
    pub async fn monthly_summary(&self, garage_id: &str, year: i32, month: u32) -> EngineResult<CashBookSummary> {
        self.summarize(garage_id, Some(DateRange::month(year, month)?)).await
    }

    /// The current calendar month through today.
    pub async fn current_month_summary(&self, garage_id: &str) -> EngineResult<CashBookSummary> {
        let today = self.ctx.today();
        self.monthly_summary(garage_id, today.year(), today.month()).await
    }

    async fn summarize(&self, garage_id: &str, range: Option<DateRange>) -> EngineResult<CashBookSummary> {
        let garage = self.ctx.db.garages().require(garage_id).await?;
        let totals: LedgerTotals = self.ctx.db.cash_book().totals(&garage.id, range).await?;

        debug!(
            garage_id = %garage.id,
            credit = %totals.credit,
            debit = %totals.debit,
            net = %totals.net,
            "Cash book summary computed"
        );
        Ok(CashBookSummary {
            garage_id: garage.id,
            garage_name: garage.name,
            range,
            totals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{engine, today, GARAGE, OTHER_GARAGE};
    use chrono::Duration;
    use garage_core::ledger::category;
    use garage_core::{ErrorKind, PaymentMethod};

    #[tokio::test]
    async fn test_running_balances() {
        let engine = engine().await;
        let book = engine.cash_book();

        let a = book.add_credit(GARAGE, "service_payment", Money::from_major(500), "Service").await.unwrap();
        let b = book.add_debit(GARAGE, category::RENT, Money::from_major(200), "Rent").await.unwrap();
        let c = book.add_credit(GARAGE, category::LUBE_SALE, Money::from_major(50), "Oil").await.unwrap();

        assert_eq!(a.details.category, "SERVICE_PAYMENT");
        assert_eq!(
            [a.running_balance(), b.running_balance(), c.running_balance()],
            [Money::from_major(500), Money::from_major(300), Money::from_major(350)]
        );
        assert_eq!(book.net_balance(GARAGE, None).await.unwrap(), Money::from_major(350));
        assert_eq!(book.total_credit(GARAGE, None).await.unwrap(), Money::from_major(550));
        assert_eq!(book.total_debit(GARAGE, None).await.unwrap(), Money::from_major(200));

        let summary = book.summary(GARAGE).await.unwrap();
        assert_eq!(summary.garage_name, "Garage One");
        assert_eq!(summary.totals.credit_count, 2);
        assert_eq!(summary.totals.debit_count, 1);
    }

    #[tokio::test]
    async fn test_rejects_bad_entries() {
        let engine = engine().await;
        let book = engine.cash_book();

        let err = book.add_credit(GARAGE, "X", Money::zero(), "Nothing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = book.add_credit(GARAGE, "  ", Money::from_major(5), "Blank").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = book.add_credit("missing", "X", Money::from_major(5), "Nowhere").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_corrections_rebalance_later_entries() {
        let engine = engine().await;
        let book = engine.cash_book();

        book.add_credit(GARAGE, "OTHER_INCOME", Money::from_major(500), "Opening").await.unwrap();
        let rent = book.add_debit(GARAGE, "RENT", Money::from_major(200), "Rent").await.unwrap();
        book.add_credit(GARAGE, "LUBE_SALE", Money::from_major(50), "Oil").await.unwrap();

        let fixed = book
            .update_entry(&rent.id, NewCashBookEntry::debit(GARAGE, "RENT", Money::from_major(250), "Rent"))
            .await
            .unwrap();
        assert_eq!(fixed.running_balance(), Money::from_major(250));

        let balances: Vec<Money> = book
            .list_by_garage(GARAGE)
            .await
            .unwrap()
            .iter()
            .map(|e| e.running_balance())
            .collect();
        assert_eq!(balances, vec![Money::from_major(500), Money::from_major(250), Money::from_major(300)]);

        let err = book
            .update_entry(&rent.id, NewCashBookEntry::debit(OTHER_GARAGE, "RENT", Money::from_major(1), "x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Mismatch);

        book.delete_entry(&rent.id).await.unwrap();
        let entries = book.list_by_garage(GARAGE).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].running_balance(), Money::from_major(550));

        let err = book.get(&rent.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_events_become_tagged_entries() {
        let engine = engine().await;
        let book = engine.cash_book();

        let walk_in = book
            .record_payment(&PaymentReceived {
                garage_id: GARAGE.to_string(),
                payment_id: "pay-1".to_string(),
                amount: Money::from_major(300),
                description: "Walk-in wash".to_string(),
                party_name: Some("Walk-in".to_string()),
                method: Some(PaymentMethod::Cash),
                invoice_id: None,
                job_card_id: None,
                date: None,
            })
            .await
            .unwrap();
        assert_eq!(walk_in.details.category, category::SERVICE_PAYMENT);
        assert_eq!(walk_in.details.transaction_date, today());

        let expense = book
            .record_expense(&ExpenseIncurred {
                garage_id: GARAGE.to_string(),
                expense_id: "exp-1".to_string(),
                amount: Money::from_major(120),
                description: "Diesel for tow truck".to_string(),
                category: None,
                vendor_name: Some("City Fuels".to_string()),
                method: None,
                date: None,
            })
            .await
            .unwrap();
        assert_eq!(expense.details.transaction_type, TransactionType::Debit);
        assert_eq!(expense.details.category, category::EXPENSE);

        let invoice_payment = book
            .record_invoice_payment(&InvoicePaymentReceived {
                garage_id: GARAGE.to_string(),
                invoice_id: "inv-1".to_string(),
                invoice_number: "INV-g-1-20250301-0001".to_string(),
                amount: Money::from_major(20),
                customer_name: Some("Asha".to_string()),
                method: None,
                date: None,
            })
            .await
            .unwrap();
        assert_eq!(invoice_payment.running_balance(), Money::from_major(200));

        assert_eq!(book.list_by_payment("pay-1").await.unwrap()[0].id, walk_in.id);
        assert_eq!(book.list_by_expense("exp-1").await.unwrap()[0].id, expense.id);
        assert_eq!(book.list_by_invoice("inv-1").await.unwrap()[0].id, invoice_payment.id);
        assert_eq!(book.search_by_party(GARAGE, "fuels").await.unwrap().len(), 1);
        assert_eq!(book.search_by_description(GARAGE, "tow").await.unwrap().len(), 1);
        assert_eq!(book.list_by_type(GARAGE, TransactionType::Credit).await.unwrap().len(), 2);
        assert_eq!(book.list_by_category(GARAGE, "expense").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dated_summaries() {
        let engine = engine().await;
        let book = engine.cash_book();
        let yesterday = today() - Duration::days(1);
        let last_month = today() - Duration::days(40);

        book.create_entry(NewCashBookEntry::credit(GARAGE, "OTHER_INCOME", Money::from_major(100), "Old").on(last_month))
            .await
            .unwrap();
        book.create_entry(NewCashBookEntry::credit(GARAGE, "OTHER_INCOME", Money::from_major(70), "Yesterday").on(yesterday))
            .await
            .unwrap();
        book.add_debit(GARAGE, "TOOLS", Money::from_major(30), "Spanner").await.unwrap();

        let today_summary = book.today_summary(GARAGE).await.unwrap();
        assert_eq!(today_summary.totals.debit, Money::from_major(30));
        assert_eq!(today_summary.totals.credit, Money::zero());

        let ranged = book.summary_by_date_range(GARAGE, yesterday, today()).await.unwrap();
        assert_eq!(ranged.totals.net, Money::from_major(40));

        let old = book
            .monthly_summary(GARAGE, last_month.year(), last_month.month())
            .await
            .unwrap();
        assert_eq!(old.totals.credit, Money::from_major(100));
        assert_eq!(old.totals.credit_count, 1);

        let current = book.current_month_summary(GARAGE).await.unwrap();
        assert_eq!(current.range, Some(DateRange::month(today().year(), today().month()).unwrap()));

        assert_eq!(book.list_today(GARAGE).await.unwrap().len(), 1);
        assert_eq!(book.list_by_date(GARAGE, yesterday).await.unwrap().len(), 1);
        assert_eq!(book.list_by_date_range(GARAGE, last_month, today()).await.unwrap().len(), 3);

        let err = book.monthly_summary(GARAGE, 2025, 13).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
