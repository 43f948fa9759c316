//! Invoice summary aggregation, and the period buckets shared with the
//! revenue and expense reports.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use ts_rs::TS;

use crate::invoice::{Invoice, InvoiceStatus, PaymentStatus};
use crate::money::Money;
use crate::types::DateRange;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct InvoiceCounts {
    pub total: i64,
    pub draft: i64,
    pub sent: i64,
    /// By payment status, not workflow status.
    pub paid: i64,
    pub partially_paid: i64,
    pub overdue: i64,
    pub cancelled: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct InvoiceAmounts {
    pub invoiced: Money,
    pub collected: Money,
    pub outstanding: Money,
    pub overdue: Money,
}

/// Totals by period, ending today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct PeriodTotals {
    pub today: Money,
    pub last_7_days: Money,
    pub month_to_date: Money,
    pub year_to_date: Money,
}

impl PeriodTotals {
    /// Adds `amount` dated `date` to every period of `today` it falls in.
    pub fn add(&mut self, date: NaiveDate, today: NaiveDate, amount: Money) {
        let week = DateRange {
            from: today - Duration::days(6),
            to: today,
        };
        if date == today {
            self.today += amount;
        }
        if week.contains(date) {
            self.last_7_days += amount;
        }
        if DateRange::month_to_date(today).contains(date) {
            self.month_to_date += amount;
        }
        if DateRange::year_to_date(today).contains(date) {
            self.year_to_date += amount;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct InvoiceSummary {
    pub garage_id: String,
    pub garage_name: String,
    pub range: Option<DateRange>,
    pub counts: InvoiceCounts,
    pub amounts: InvoiceAmounts,
    pub periods: PeriodTotals,
}

impl InvoiceSummary {
    /// Summarizes `invoices` as of `today`, restricted to invoices dated in
    /// `range` when one is given.
    pub fn compute(
        garage_id: &str,
        garage_name: &str,
        invoices: &[Invoice],
        today: NaiveDate,
        range: Option<DateRange>,
    ) -> InvoiceSummary {
        let mut counts = InvoiceCounts::default();
        let mut amounts = InvoiceAmounts::default();
        let mut periods = PeriodTotals::default();

        let selected = invoices
            .iter()
            .filter(|i| range.map_or(true, |r| r.contains(i.invoice_date)));

        for invoice in selected {
            counts.total += 1;
            match invoice.status() {
                InvoiceStatus::Draft => counts.draft += 1,
                InvoiceStatus::Sent => counts.sent += 1,
                InvoiceStatus::Cancelled => counts.cancelled += 1,
                _ => {}
            }
            match invoice.payment_status() {
                PaymentStatus::Paid => counts.paid += 1,
                PaymentStatus::Partial => counts.partially_paid += 1,
                PaymentStatus::Unpaid => {}
            }

            amounts.invoiced += invoice.total();
            amounts.collected += invoice.paid();
            amounts.outstanding += invoice.due();
            if invoice.is_overdue(today) {
                counts.overdue += 1;
                amounts.overdue += invoice.due();
            }

            periods.add(invoice.invoice_date, today, invoice.total());
        }

        InvoiceSummary {
            garage_id: garage_id.to_string(),
            garage_name: garage_name.to_string(),
            range,
            counts,
            amounts,
            periods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::{InvoiceCustomer, NewInvoice, PaymentRequest};
    use crate::line_item::{ItemKind, LineItemSpec};
    use crate::numbering::InvoiceNumber;
    use chrono::{DateTime, Utc};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-10T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn invoice(date: NaiveDate, price: i64, due: Option<NaiveDate>) -> Invoice {
        let request = NewInvoice {
            garage_id: "g1".into(),
            customer: InvoiceCustomer::named("Ravi"),
            items: vec![LineItemSpec::new(ItemKind::Service, "Service", 1, Money::from_major(price))],
            invoice_date: Some(date),
            due_date: due,
            ..Default::default()
        };
        Invoice::draft(&InvoiceNumber::new("INV", "g1", date, 1), &request, date, now()).unwrap()
    }

    #[test]
    fn test_summary_counts_and_amounts() {
        let today = day(10);
        let mut paid = invoice(day(10), 100, None);
        paid.add_payment(&PaymentRequest::new(Money::from_major(100)), today, now())
            .unwrap();
        let mut partial = invoice(day(2), 200, Some(day(5)));
        partial
            .add_payment(&PaymentRequest::new(Money::from_major(50)), today, now())
            .unwrap();
        let mut cancelled = invoice(NaiveDate::from_ymd_opt(2025, 1, 20).unwrap(), 40, None);
        cancelled.cancel(now()).unwrap();

        let all = vec![paid, partial, cancelled];
        let summary = InvoiceSummary::compute("g1", "Main", &all, today, None);

        assert_eq!(summary.counts.total, 3);
        assert_eq!(summary.counts.paid, 1);
        assert_eq!(summary.counts.partially_paid, 1);
        assert_eq!(summary.counts.overdue, 1);
        assert_eq!(summary.counts.cancelled, 1);
        assert_eq!(summary.amounts.invoiced, Money::from_major(340));
        assert_eq!(summary.amounts.collected, Money::from_major(150));
        assert_eq!(summary.amounts.outstanding, Money::from_major(190));
        assert_eq!(summary.amounts.overdue, Money::from_major(150));
        assert_eq!(summary.periods.today, Money::from_major(100));
        assert_eq!(summary.periods.last_7_days, Money::from_major(100));
        assert_eq!(summary.periods.month_to_date, Money::from_major(300));
        assert_eq!(summary.periods.year_to_date, Money::from_major(340));
    }

    #[test]
    fn test_summary_restricted_to_range() {
        let all = vec![invoice(day(1), 10, None), invoice(day(9), 20, None)];
        let range = DateRange::new(day(5), day(10)).unwrap();
        let summary = InvoiceSummary::compute("g1", "Main", &all, day(10), Some(range));
        assert_eq!(summary.counts.total, 1);
        assert_eq!(summary.counts.draft, 1);
        assert_eq!(summary.amounts.invoiced, Money::from_major(20));
    }
}
