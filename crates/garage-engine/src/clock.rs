//! # Clock
//!
//! garage-core never reads the time; the engine passes `now` and `today`
//! from a [`Clock`]. Tests swap in a [`FixedClock`].

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::fmt::Debug;
use std::sync::Mutex;

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar date used for invoice dates, due dates and ledger dates.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        FixedClock { now: Mutex::new(now) }
    }

    /// Midnight UTC of `day`.
    pub fn on(day: NaiveDate) -> Self {
        FixedClock::new(day.and_time(chrono::NaiveTime::MIN).and_utc())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_moves_on_request() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let clock = FixedClock::on(day);
        assert_eq!(clock.today(), day);

        clock.advance(Duration::days(2));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());

        let later = DateTime::parse_from_rfc3339("2025-12-31T23:59:00Z")
            .unwrap()
            .with_timezone(&Utc);
        clock.set(later);
        assert_eq!(clock.now(), later);
    }
}
