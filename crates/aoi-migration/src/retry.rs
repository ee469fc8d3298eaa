//! RetryQueue (spec §4.10, §8 invariant 11, scenario S7): a keyed set of
//! failed moves with exponential backoff, persisted write-through to
//! `data/retry_tasks.json` the way the teacher's `CheckpointManager`
//! persists after every mutation rather than on a separate flush cycle.

use aoi_model::{FileType, RetryEntry};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn component_key(lot_id: &str, station: &str, component_id: &str) -> String {
    format!("{lot_id}\u{1f}{station}\u{1f}{component_id}")
}

const INITIAL_BACKOFF_SECS: i64 = 300;
const MAX_BACKOFF_SECS: i64 = 3600;
const PRUNE_AFTER: Duration = Duration::hours(24);

fn backoff_secs(attempt: u32) -> i64 {
    let doubled = INITIAL_BACKOFF_SECS.saturating_mul(1i64 << attempt.saturating_sub(1).min(16));
    doubled.min(MAX_BACKOFF_SECS)
}

pub struct RetryQueue {
    path: PathBuf,
    entries: Mutex<HashMap<String, RetryEntry>>,
}

impl RetryQueue {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::read_from_disk(&path).unwrap_or_default();
        Self { path, entries: Mutex::new(entries) }
    }

    fn read_from_disk(path: &Path) -> Option<HashMap<String, RetryEntry>> {
        let text = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&text) {
            Ok(entries) => Some(entries),
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "retry-state file corrupt, starting empty");
                None
            }
        }
    }

    fn persist(&self, entries: &HashMap<String, RetryEntry>) {
        if let Some(parent) = self.path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %err, "failed to create retry-state directory");
                return;
            }
        }
        match serde_json::to_string_pretty(entries) {
            Ok(text) => {
                if let Err(err) = std::fs::write(&self.path, text) {
                    tracing::warn!(error = %err, path = %self.path.display(), "failed to persist retry state");
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to serialize retry state"),
        }
    }

    pub fn add(
        &self,
        component_id: impl Into<String>,
        lot_id: impl Into<String>,
        original_lot_id: impl Into<String>,
        station: impl Into<String>,
        source_product: impl Into<String>,
        target_product: impl Into<String>,
        file_types: Vec<FileType>,
        reason: impl Into<String>,
        max_retries: u32,
    ) {
        let component_id = component_id.into();
        let lot_id = lot_id.into();
        let station = station.into();
        let now = Utc::now();
        let key = component_key(&lot_id, &station, &component_id);

        let mut entries = self.entries.lock();
        entries.insert(
            key,
            RetryEntry {
                component_id,
                lot_id,
                original_lot_id: original_lot_id.into(),
                station,
                source_product: source_product.into(),
                target_product: target_product.into(),
                file_types,
                reason: reason.into(),
                attempt: 1,
                next_attempt_time: now + Duration::seconds(backoff_secs(1)),
                first_failure_time: now,
                max_retries,
            },
        );
        self.persist(&entries);
    }

    /// Entries whose `next_attempt_time` has arrived, cloned out for the
    /// caller to attempt a move without holding the lock across the I/O.
    pub fn due_entries(&self, now: DateTime<Utc>) -> Vec<RetryEntry> {
        self.entries.lock().values().filter(|e| e.next_attempt_time <= now).cloned().collect()
    }

    pub fn record_success(&self, lot_id: &str, station: &str, component_id: &str) {
        let key = component_key(lot_id, station, component_id);
        let mut entries = self.entries.lock();
        if entries.remove(&key).is_some() {
            self.persist(&entries);
        }
    }

    /// Increments the attempt counter and reschedules, or removes the
    /// entry once `max_retries` is exceeded. Returns `true` if the entry
    /// was removed (retry budget exhausted).
    pub fn record_failure(&self, lot_id: &str, station: &str, component_id: &str) -> bool {
        let key = component_key(lot_id, station, component_id);
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&key) else { return false };

        entry.attempt += 1;
        let now = Utc::now();
        let removed = if entry.attempt >= entry.max_retries {
            tracing::warn!(lot_id, station, component_id, attempt = entry.attempt, "retry budget exhausted, dropping entry");
            entries.remove(&key);
            true
        } else {
            entry.next_attempt_time = now + Duration::seconds(backoff_secs(entry.attempt));
            false
        };
        self.persist(&entries);
        removed
    }

    pub fn prune_expired(&self, now: DateTime<Utc>) {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| now - e.first_failure_time < PRUNE_AFTER);
        if entries.len() != before {
            self.persist(&entries);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_secs(1), 300);
        assert_eq!(backoff_secs(2), 600);
        assert_eq!(backoff_secs(3), 1200);
        assert_eq!(backoff_secs(4), 2400);
        assert_eq!(backoff_secs(5), 3600);
        assert_eq!(backoff_secs(6), 3600);
    }

    #[test]
    fn exhausting_retry_budget_removes_after_five_failures() {
        let dir = tempfile::tempdir().unwrap();
        let queue = RetryQueue::load(dir.path().join("retry_tasks.json"));
        queue.add("C1", "L1", "L1", "MT", "P1", "P2", vec![FileType::Org], "path absent", 5);
        assert_eq!(queue.len(), 1);

        for _ in 0..3 {
            assert!(!queue.record_failure("L1", "MT", "C1"));
        }
        assert!(queue.record_failure("L1", "MT", "C1"));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn persisted_state_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retry_tasks.json");
        {
            let queue = RetryQueue::load(&path);
            queue.add("C1", "L1", "L1", "MT", "P1", "P2", vec![FileType::Org], "path absent", 5);
        }
        let reloaded = RetryQueue::load(&path);
        assert_eq!(reloaded.len(), 1);
    }
}
