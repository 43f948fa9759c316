//! # Keyed Locks
//!
//! In-process write serialization per garage, job card and invoice.
//!
//! ## Lock Keys and Ordering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Keyed Locks                                    │
//! │                                                                         │
//! │  job_card:{id}  read-modify-write of one job card                      │
//! │  invoice:{id}   payments and other read-modify-write of one invoice    │
//! │  garage:{id}    ledger appends/corrections, invoice creation           │
//! │                                                                         │
//! │  Acquisition order is always  job_card → invoice → garage.             │
//! │  A task never takes a key of an earlier rank while holding a later one.│
//! │                                                                         │
//! │  Different keys never contend; two garages never coordinate.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The locks only order writers inside this process. Writers elsewhere are
//! caught by the version compare-and-swap and the garage-row write in the
//! storage layer.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Idle entries are pruned once the map grows past this many keys.
const PRUNE_THRESHOLD: usize = 256;

pub fn garage_key(garage_id: &str) -> String {
    format!("garage:{}", garage_id)
}

pub fn job_card_key(job_card_id: &str) -> String {
    format!("job_card:{}", job_card_id)
}

pub fn invoice_key(invoice_id: &str) -> String {
    format!("invoice:{}", invoice_id)
}

/// Map of key → async mutex. Cheap to clone; clones share the map.
#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

/// Held lock on one key. Released on drop.
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the lock on `key`.
    pub async fn lock(&self, key: impl Into<String>) -> KeyGuard {
        let key = key.into();
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };

        KeyGuard {
            key,
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of keys currently tracked, held or idle.
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_key_format() {
        assert_eq!(garage_key("g-1"), "garage:g-1");
        assert_eq!(job_card_key("jc"), "job_card:jc");
        assert_eq!(invoice_key("inv"), "invoice:inv");
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = KeyedLocks::new();
        let first = locks.lock(garage_key("g-1")).await;

        let contender = locks.clone();
        let handle = tokio::spawn(async move {
            let guard = contender.lock(garage_key("g-1")).await;
            guard.key().to_string()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        drop(first);
        assert_eq!(handle.await.unwrap(), "garage:g-1");
    }

    #[tokio::test]
    async fn test_different_keys_do_not_contend() {
        let locks = KeyedLocks::new();
        let _a = locks.lock(garage_key("g-1")).await;
        let _b = locks.lock(garage_key("g-2")).await;
        let _c = locks.lock(invoice_key("g-1")).await;
        assert_eq!(locks.tracked().await, 3);
    }
}
