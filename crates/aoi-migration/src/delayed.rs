//! DelayedMoveQueue (spec §4.10): an in-memory FIFO of components awaiting
//! a daily batch move, drained by a wall-clock scheduler. Enqueues are
//! deduplicated per component (Design Notes §9's stated improvement over
//! the source, which does not dedup).

use aoi_config::Schedule;
use aoi_model::{DelayedMoveEntry, FileType};
use chrono::{Datelike, Local, NaiveTime, TimeZone, Weekday};
use parking_lot::Mutex;
use std::collections::VecDeque;

fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.to_ascii_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tues" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thur" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

const DEFAULT_DAYS: [Weekday; 5] = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];
const DEFAULT_TIME: &str = "02:00";

pub(crate) fn allowed_days(schedule: Option<&Schedule>) -> Vec<Weekday> {
    let Some(schedule) = schedule else { return DEFAULT_DAYS.to_vec() };
    if schedule.days.is_empty() {
        return DEFAULT_DAYS.to_vec();
    }
    schedule.days.iter().filter_map(|d| parse_weekday(d)).collect()
}

pub(crate) fn scheduled_time(schedule: Option<&Schedule>) -> NaiveTime {
    let raw = schedule.map(|s| s.time.as_str()).unwrap_or(DEFAULT_TIME);
    NaiveTime::parse_from_str(raw, "%H:%M").unwrap_or_else(|_| NaiveTime::parse_from_str(DEFAULT_TIME, "%H:%M").unwrap())
}

/// Next fire time strictly after `from`, honoring `days`/`time`. Looks up
/// to 7 days ahead; always terminates because `days` is non-empty by the
/// time this is called.
pub(crate) fn next_fire_after(from: chrono::DateTime<Local>, time: NaiveTime, days: &[Weekday]) -> chrono::DateTime<Local> {
    for offset in 0..=7 {
        let candidate_date = (from + chrono::Duration::days(offset)).date_naive();
        if !days.contains(&candidate_date.weekday()) {
            continue;
        }
        let candidate = Local.from_local_datetime(&candidate_date.and_time(time)).single();
        if let Some(candidate) = candidate {
            if candidate > from {
                return candidate;
            }
        }
    }
    from + chrono::Duration::days(1)
}

pub struct DelayedMoveQueue {
    queue: Mutex<VecDeque<DelayedMoveEntry>>,
    schedule_time: NaiveTime,
    schedule_days: Vec<Weekday>,
}

impl DelayedMoveQueue {
    pub fn new(schedule: Option<&Schedule>) -> Self {
        Self { queue: Mutex::new(VecDeque::new()), schedule_time: scheduled_time(schedule), schedule_days: allowed_days(schedule) }
    }

    pub fn next_fire_time(&self, from: chrono::DateTime<Local>) -> chrono::DateTime<Local> {
        next_fire_after(from, self.schedule_time, &self.schedule_days)
    }

    /// Adds an entry unless one for the same `(lot_id, station, component_id)`
    /// is already queued.
    pub fn enqueue(&self, entry: DelayedMoveEntry) {
        let mut queue = self.queue.lock();
        let already_queued = queue.iter().any(|e| e.lot_id == entry.lot_id && e.station == entry.station && e.component_id == entry.component_id);
        if !already_queued {
            queue.push_back(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Drains the whole queue, grouped by `(source_product, target_product, file_types)`
    /// so each group becomes one `batch_move_files` task. The delayed-move
    /// file_types are uniform across entries (configured once), so in
    /// practice this yields at most one group per distinct product pair.
    pub fn drain(&self, file_types: Vec<FileType>) -> Vec<(String, String, Vec<aoi_model::BatchMoveEntry>)> {
        let mut queue = self.queue.lock();
        let mut groups: Vec<(String, String, Vec<aoi_model::BatchMoveEntry>)> = Vec::new();
        for entry in queue.drain(..) {
            let group = groups.iter_mut().find(|(src, tgt, _)| *src == entry.source_product && *tgt == entry.target_product);
            let batch_entry = aoi_model::BatchMoveEntry {
                component_id: entry.component_id,
                lot_id: entry.lot_id,
                original_lot_id: entry.original_lot_id,
                station: entry.station,
                source_product: entry.source_product.clone(),
            };
            match group {
                Some((_, _, entries)) => entries.push(batch_entry),
                None => groups.push((entry.source_product, entry.target_product, vec![batch_entry])),
            }
        }
        let _ = &file_types;
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_enqueue_for_same_component_is_ignored() {
        let queue = DelayedMoveQueue::new(None);
        let make = || DelayedMoveEntry {
            component_id: "C1".into(),
            lot_id: "L1".into(),
            original_lot_id: "L1".into(),
            station: "MT".into(),
            source_product: "P1".into(),
            target_product: "P2".into(),
            enqueued_at: epoch(),
        };
        queue.enqueue(make());
        queue.enqueue(make());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn drain_groups_by_product_pair() {
        let queue = DelayedMoveQueue::new(None);
        queue.enqueue(DelayedMoveEntry {
            component_id: "C1".into(),
            lot_id: "L1".into(),
            original_lot_id: "L1".into(),
            station: "MT".into(),
            source_product: "P1".into(),
            target_product: "P2".into(),
            enqueued_at: epoch(),
        });
        queue.enqueue(DelayedMoveEntry {
            component_id: "C2".into(),
            lot_id: "L1".into(),
            original_lot_id: "L1".into(),
            station: "AOI".into(),
            source_product: "P1".into(),
            target_product: "P2".into(),
            enqueued_at: epoch(),
        });
        let groups = queue.drain(vec![FileType::Org, FileType::Roi]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].2.len(), 2);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn default_schedule_picks_weekday_at_2am() {
        let queue = DelayedMoveQueue::new(None);
        assert_eq!(queue.schedule_time, NaiveTime::parse_from_str("02:00", "%H:%M").unwrap());
        assert_eq!(queue.schedule_days.len(), 5);
    }

    fn epoch() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::<chrono::Utc>::from_timestamp(0, 0).unwrap()
    }
}
