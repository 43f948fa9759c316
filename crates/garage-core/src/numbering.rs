//! # Invoice Numbers
//!
//! ```text
//! INV-{garageId}-{yyyyMMdd}-{seq}
//!  │      │          │        └── per (garage, day) counter, ≥ 4 digits, never wraps
//!  │      │          └── issue date
//!  │      └── garage id (may itself contain '-')
//!  └── configurable prefix (no '-')
//! ```
//!
//! Allocation of `seq` is storage's job (an atomic counter row per garage
//! and day); this module only formats and parses.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

const DATE_FORMAT: &str = "%Y%m%d";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceNumber {
    pub prefix: String,
    pub garage_id: String,
    pub date: NaiveDate,
    pub sequence: u32,
}

impl InvoiceNumber {
    pub fn new(prefix: impl Into<String>, garage_id: impl Into<String>, date: NaiveDate, sequence: u32) -> Self {
        InvoiceNumber {
            prefix: prefix.into(),
            garage_id: garage_id.into(),
            date,
            sequence,
        }
    }

    /// The `yyyyMMdd` day key used by the sequence table.
    pub fn day_key(date: NaiveDate) -> String {
        date.format(DATE_FORMAT).to_string()
    }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{:04}",
            self.prefix,
            self.garage_id,
            self.date.format(DATE_FORMAT),
            self.sequence
        )
    }
}

impl FromStr for InvoiceNumber {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "invoice_number".to_string(),
            reason: reason.to_string(),
        };

        let (prefix, rest) = s.split_once('-').ok_or_else(|| invalid("missing prefix"))?;
        let mut tail = rest.rsplitn(3, '-');
        let sequence = tail.next().ok_or_else(|| invalid("missing sequence"))?;
        let date = tail.next().ok_or_else(|| invalid("missing date"))?;
        let garage_id = tail.next().ok_or_else(|| invalid("missing garage id"))?;

        if prefix.is_empty() || garage_id.is_empty() {
            return Err(invalid("empty component"));
        }
        if sequence.len() < 4 || !sequence.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("sequence must be at least 4 digits"));
        }
        let sequence: u32 = sequence.parse().map_err(|_| invalid("sequence out of range"))?;
        let date = NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|_| invalid("date must be yyyyMMdd"))?;

        Ok(InvoiceNumber {
            prefix: prefix.to_string(),
            garage_id: garage_id.to_string(),
            date,
            sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    #[test]
    fn test_format_pads_to_four_digits() {
        assert_eq!(InvoiceNumber::new("INV", "7", day(), 1).to_string(), "INV-7-20250115-0001");
        assert_eq!(InvoiceNumber::new("INV", "7", day(), 10000).to_string(), "INV-7-20250115-10000");
    }

    #[test]
    fn test_parse_garage_id_with_dashes() {
        let garage = "3f2c9a1e-0b6d-4c55-9e1a-2d7b8c9d0e1f";
        let number = InvoiceNumber::new("INV", garage, day(), 42);
        let parsed: InvoiceNumber = number.to_string().parse().unwrap();
        assert_eq!(parsed, number);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("INV".parse::<InvoiceNumber>().is_err());
        assert!("INV-7-2025-0001".parse::<InvoiceNumber>().is_err());
        assert!("INV-7-20250115-01".parse::<InvoiceNumber>().is_err());
        assert!("INV--20250115-0001".parse::<InvoiceNumber>().is_err());
    }

    #[test]
    fn test_day_key() {
        assert_eq!(InvoiceNumber::day_key(day()), "20250115");
    }
}
