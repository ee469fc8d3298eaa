//! Per-component failure ledger (spec §4.10, §7). Independent of the
//! RetryQueue's own per-entry attempt counter: this one counts *every*
//! failure for a component regardless of which mechanism (delayed add or
//! retry add) observed it, and is consulted before either mechanism
//! accepts a new entry.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

pub struct FailureLedger {
    max_count: u32,
    ttl: Duration,
    entries: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl FailureLedger {
    pub fn new(max_count: u32) -> Self {
        Self { max_count, ttl: Duration::hours(24), entries: Mutex::new(HashMap::new()) }
    }

    /// Records a failure for `key`, purging entries older than 24h first,
    /// and returns the count afterward.
    pub fn record_failure(&self, key: &str) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        let list = entries.entry(key.to_string()).or_default();
        list.retain(|at| now - *at < self.ttl);
        list.push(now);
        list.len()
    }

    /// `true` once `key` has reached `max_retry_count` failures within the
    /// last 24h — callers should suppress further delayed/retry adds.
    pub fn is_suppressed(&self, key: &str) -> bool {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        let Some(list) = entries.get_mut(key) else { return false };
        list.retain(|at| now - *at < self.ttl);
        list.len() as u32 >= self.max_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_after_max_count_failures() {
        let ledger = FailureLedger::new(3);
        assert!(!ledger.is_suppressed("C1"));
        ledger.record_failure("C1");
        ledger.record_failure("C1");
        assert!(!ledger.is_suppressed("C1"));
        ledger.record_failure("C1");
        assert!(ledger.is_suppressed("C1"));
    }

    #[test]
    fn ledger_is_per_component() {
        let ledger = FailureLedger::new(1);
        ledger.record_failure("C1");
        assert!(ledger.is_suppressed("C1"));
        assert!(!ledger.is_suppressed("C2"));
    }
}
