//! DelayedMoveQueue's wall-clock scheduling (S6) and RetryQueue's
//! backoff sweep (S7), exercised through their public APIs the way
//! `MigrationEngine`'s background loops drive them.

use aoi_config::Schedule;
use aoi_migration::delayed::DelayedMoveQueue;
use aoi_migration::RetryQueue;
use aoi_model::{DelayedMoveEntry, FileType};
use chrono::{Local, TimeZone};

#[test]
fn s6_delayed_batch_fires_at_next_scheduled_time_in_fifo_order() {
    let schedule = Schedule { time: "02:00".to_string(), days: vec![] };
    let queue = DelayedMoveQueue::new(Some(&schedule));

    let enqueued_at = Local.with_ymd_and_hms(2026, 3, 2, 23, 55, 0).unwrap();
    for component_id in ["C1", "C2", "C3"] {
        queue.enqueue(DelayedMoveEntry {
            component_id: component_id.to_string(),
            lot_id: "L1".to_string(),
            original_lot_id: "L1".to_string(),
            station: "MT".to_string(),
            source_product: "P1".to_string(),
            target_product: "P2".to_string(),
            enqueued_at: enqueued_at.with_timezone(&chrono::Utc),
        });
    }
    assert_eq!(queue.len(), 3);

    let fire_at = queue.next_fire_time(enqueued_at);
    assert_eq!(fire_at.date_naive(), Local.with_ymd_and_hms(2026, 3, 3, 2, 0, 0).unwrap().date_naive());
    assert_eq!(fire_at.time(), chrono::NaiveTime::from_hms_opt(2, 0, 0).unwrap());

    let groups = queue.drain(vec![FileType::Org, FileType::Roi]);
    assert_eq!(groups.len(), 1);
    let (source, target, entries) = &groups[0];
    assert_eq!(source, "P1");
    assert_eq!(target, "P2");
    assert_eq!(entries.iter().map(|e| e.component_id.as_str()).collect::<Vec<_>>(), vec!["C1", "C2", "C3"]);
    assert_eq!(queue.len(), 0);

    // Rescheduled for the following day at the same time.
    let next = queue.next_fire_time(fire_at);
    assert_eq!(next.date_naive(), Local.with_ymd_and_hms(2026, 3, 4, 2, 0, 0).unwrap().date_naive());
}

#[test]
fn s7_retry_sweep_drops_entry_after_exactly_five_failures() {
    let dir = tempfile::tempdir().unwrap();
    let queue = RetryQueue::load(dir.path().join("retry_tasks.json"));
    // `add` itself represents the first of the five failures that
    // eventually exhaust the budget; the sweep below supplies the rest.
    queue.add("C1", "L1", "L1", "MT", "P1", "P2", vec![FileType::Org], "path absent", 5);

    let mut sweep_failures = 0;
    loop {
        let due = queue.due_entries(chrono::Utc::now() + chrono::Duration::hours(2));
        if due.is_empty() {
            break;
        }
        sweep_failures += 1;
        let exhausted = queue.record_failure("L1", "MT", "C1");
        if exhausted {
            break;
        }
    }
    assert_eq!(sweep_failures, 4, "expected the 5th total failure (1 initial + 4 swept) to exhaust the budget");
    assert_eq!(queue.len(), 0);
}
