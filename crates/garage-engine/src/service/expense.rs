//! # Expense Service
//!
//! Money the garage spends, stored with its DEBIT cash book entry, plus the
//! expense and cash flow reports.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

use garage_core::{CashBookEntry, CashFlowReport, DateRange, Expense, ExpenseCategory, ExpenseReport, NewExpense};

use super::EngineContext;
use crate::error::EngineResult;
use crate::locks::garage_key;

#[derive(Debug, Clone)]
pub struct ExpenseService {
    ctx: Arc<EngineContext>,
}

impl ExpenseService {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        ExpenseService { ctx }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub async fn create(&self, request: NewExpense) -> EngineResult<(Expense, CashBookEntry)> {
        let garage = self.ctx.db.garages().require(request.garage_id.trim()).await?;
        let today = self.ctx.today();
        let expense = Expense::record(&request, today, self.ctx.now())?;
        let entry = expense.ledger_entry().validate(today)?;

        let _guard = self.ctx.locks.lock(garage_key(&garage.id)).await;
        let (expense, entry) = self.ctx.db.expenses().insert(&expense, entry, self.ctx.now()).await?;

        info!(
            expense_id = %expense.id,
            garage_id = %garage.id,
            category = %expense.category,
            amount = %expense.amount,
            balance = %entry.running_balance(),
            "Expense created"
        );
        Ok((expense, entry))
    }

    pub async fn update(&self, expense_id: &str, request: NewExpense) -> EngineResult<(Expense, CashBookEntry)> {
        let mut expense = self.ctx.db.expenses().require(expense_id).await?;
        let previous = expense.amount;
        expense.revise(&request, self.ctx.now())?;
        let entry = expense.ledger_entry().validate(self.ctx.today())?;

        let _guard = self.ctx.locks.lock(garage_key(&expense.garage_id)).await;
        let (expense, entry) = self.ctx.db.expenses().update(&expense, entry, self.ctx.now()).await?;

        info!(
            expense_id = %expense.id,
            garage_id = %expense.garage_id,
            previous_amount = %previous,
            amount = %expense.amount,
            "Expense updated"
        );
        Ok((expense, entry))
    }

    pub async fn delete(&self, expense_id: &str) -> EngineResult<()> {
        let expense = self.ctx.db.expenses().require(expense_id).await?;

        let _guard = self.ctx.locks.lock(garage_key(&expense.garage_id)).await;
        self.ctx.db.expenses().delete(expense_id).await?;

        info!(expense_id = %expense_id, garage_id = %expense.garage_id, amount = %expense.amount, "Expense deleted");
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get(&self, expense_id: &str) -> EngineResult<Expense> {
        Ok(self.ctx.db.expenses().require(expense_id).await?)
    }

    pub async fn list_by_garage(&self, garage_id: &str) -> EngineResult<Vec<Expense>> {
        Ok(self.ctx.db.expenses().list_by_garage(garage_id).await?)
    }

    pub async fn list_by_date_range(&self, garage_id: &str, from: NaiveDate, to: NaiveDate) -> EngineResult<Vec<Expense>> {
        let range = DateRange::new(from, to)?;
        Ok(self.ctx.db.expenses().list_by_date_range(garage_id, range).await?)
    }

    pub async fn list_today(&self, garage_id: &str) -> EngineResult<Vec<Expense>> {
        let today = DateRange::single(self.ctx.today());
        Ok(self.ctx.db.expenses().list_by_date_range(garage_id, today).await?)
    }

    pub async fn list_by_category(&self, garage_id: &str, category: ExpenseCategory) -> EngineResult<Vec<Expense>> {
        Ok(self.ctx.db.expenses().list_by_category(garage_id, category).await?)
    }

    // =========================================================================
    // Reports
    // =========================================================================

    pub async fn expense_summary(&self, garage_id: &str) -> EngineResult<ExpenseReport> {
        self.report(garage_id, None).await
    }

    pub async fn expense_summary_by_date_range(
        &self,
        garage_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<ExpenseReport> {
        self.report(garage_id, Some(DateRange::new(from, to)?)).await
    }

    /// Payment records against expense records, optionally within a range.
    pub async fn cash_flow(&self, garage_id: &str, range: Option<DateRange>) -> EngineResult<CashFlowReport> {
        let garage = self.ctx.db.garages().require(garage_id).await?;
        let payments = self.ctx.db.payments().list_by_garage(&garage.id).await?;
        let expenses = self.ctx.db.expenses().list_by_garage(&garage.id).await?;
        let report = CashFlowReport::compute(&garage.id, &garage.name, &payments, &expenses, self.ctx.today(), range);

        debug!(
            garage_id = %garage.id,
            income = %report.income_total,
            expenses = %report.expense_total,
            net = %report.net,
            "Cash flow computed"
        );
        Ok(report)
    }

    async fn report(&self, garage_id: &str, range: Option<DateRange>) -> EngineResult<ExpenseReport> {
        let garage = self.ctx.db.garages().require(garage_id).await?;
        let expenses = self.ctx.db.expenses().list_by_garage(&garage.id).await?;
        let report = ExpenseReport::compute(&garage.id, &garage.name, &expenses, self.ctx.today(), range);

        debug!(
            garage_id = %garage.id,
            total = %report.total,
            transactions = report.transactions,
            "Expense report computed"
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
    use garage_core::{ErrorKind, Money, NewPayment, PaymentMethod, PaymentType, TransactionType};

    fn spend(title: &str, amount: i64, category: ExpenseCategory) -> NewExpense {
        NewExpense::new(GARAGE, title, Money::from_major(amount), category)
    }

    #[tokio::test]
    async fn test_expense_raises_linked_debit() {
        let engine = engine().await;
        let mut request = spend("Spanner set", 70, ExpenseCategory::Tools).paid_by(PaymentMethod::Card);
        request.vendor_name = Some("Tool Mart".to_string());
        let (expense, entry) = engine.expenses().create(request).await.unwrap();

        assert_eq!(entry.details.transaction_type, TransactionType::Debit);
        assert_eq!(entry.details.category, category::TOOLS);
        assert_eq!(entry.details.party_name.as_deref(), Some("Tool Mart"));
        assert_eq!(entry.details.links.expense_id.as_deref(), Some(expense.id.as_str()));
        assert_eq!(engine.cash_book().net_balance(GARAGE, None).await.unwrap(), Money::from_major(-70));
    }

    #[tokio::test]
    async fn test_update_and_delete_follow_the_ledger() {
        let engine = engine().await;
        let expenses = engine.expenses();
        let (fuel, _) = expenses.create(spend("Diesel", 30, ExpenseCategory::Fuel)).await.unwrap();
        expenses.create(spend("Rent", 200, ExpenseCategory::Rent)).await.unwrap();

        let (updated, _) = expenses.update(&fuel.id, spend("Diesel", 45, ExpenseCategory::Fuel)).await.unwrap();
        assert_eq!(updated.amount, Money::from_major(45));
        assert_eq!(engine.cash_book().net_balance(GARAGE, None).await.unwrap(), Money::from_major(-245));

        let moved = NewExpense::new(OTHER_GARAGE, "Diesel", Money::from_major(45), ExpenseCategory::Fuel);
        assert_eq!(expenses.update(&fuel.id, moved).await.unwrap_err().kind(), ErrorKind::Mismatch);

        expenses.delete(&fuel.id).await.unwrap();
        let ledger = engine.cash_book().list_by_garage(GARAGE).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].running_balance(), Money::from_major(-200));

        let err = expenses.create(spend("  ", 10, ExpenseCategory::Other)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_expense_summary_and_cash_flow() {
        let engine = engine().await;
        let expenses = engine.expenses();
        let last_month = today() - Duration::days(40);

        expenses.create(spend("Diesel", 30, ExpenseCategory::Fuel)).await.unwrap();
        expenses.create(spend("Rent", 200, ExpenseCategory::Rent).on(last_month)).await.unwrap();
        engine
            .payments()
            .create(NewPayment::new(GARAGE, Money::from_major(500), PaymentMethod::Upi, PaymentType::Service))
            .await
            .unwrap();

        let summary = expenses.expense_summary(GARAGE).await.unwrap();
        assert_eq!(summary.total, Money::from_major(230));
        assert_eq!(summary.for_category(ExpenseCategory::Rent), Money::from_major(200));
        assert_eq!(summary.periods.today, Money::from_major(30));

        let recent = expenses.expense_summary_by_date_range(GARAGE, today(), today()).await.unwrap();
        assert_eq!(recent.total, Money::from_major(30));
        assert_eq!(recent.for_category(ExpenseCategory::Rent), Money::zero());

        let flow = expenses.cash_flow(GARAGE, None).await.unwrap();
        assert_eq!(flow.income_total, Money::from_major(500));
        assert_eq!(flow.net, Money::from_major(270));
        let today_flow = expenses.cash_flow(GARAGE, Some(DateRange::single(today()))).await.unwrap();
        assert_eq!(today_flow.net, Money::from_major(470));

        assert_eq!(expenses.list_today(GARAGE).await.unwrap().len(), 1);
        assert_eq!(expenses.list_by_category(GARAGE, ExpenseCategory::Rent).await.unwrap().len(), 1);
        assert_eq!(expenses.list_by_date_range(GARAGE, last_month, today()).await.unwrap().len(), 2);
    }
}
