//! Latest reading per factor.
//!
//! Each factor owns one slot with its own lock; the slot table itself is
//! fixed at construction from the registry, so writers to different factors
//! never contend and readers never see a half-written reading. A snapshot is
//! a best-effort union of independently timestamped slots.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::registry::FactorRegistry;
use super::Score;
use crate::logging::{log_eviction, log_factor_rejected, log_factor_update};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Reading {
    score: Score,
    ts: DateTime<Utc>,
}

#[derive(Debug)]
struct Slot {
    id: String,
    ttl: Duration,
    reading: RwLock<Option<Reading>>,
}

impl Slot {
    fn is_stale(&self, reading: &Reading, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(reading.ts) > self.ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Stored,
    /// Value was out of range or non-finite and was recorded as unknown
    StoredAsUnknown,
    /// Factor id is not registered; nothing stored
    UnknownFactor,
}

/// What a snapshot saw in one slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReadingState {
    Fresh { value: f64, ts: DateTime<Utc> },
    /// Producer reported an explicit unknown within the freshness window
    Unknown { ts: DateTime<Utc> },
    /// Past its TTL; evicted during the snapshot
    Stale { ts: DateTime<Utc> },
    /// Never written, or evicted earlier
    Missing,
}

impl ReadingState {
    pub fn value(&self) -> Option<f64> {
        match self {
            ReadingState::Fresh { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReadingState::Fresh { .. } => "fresh",
            ReadingState::Unknown { .. } => "unknown",
            ReadingState::Stale { .. } => "stale",
            ReadingState::Missing => "missing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    pub factor_id: String,
    #[serde(flatten)]
    pub state: ReadingState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    /// One entry per registered factor, in registration order
    pub entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub fn get(&self, factor_id: &str) -> Option<&ReadingState> {
        self.entries.iter().find(|e| e.factor_id == factor_id).map(|e| &e.state)
    }
}

#[derive(Debug)]
pub struct ReadingStore {
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
}

impl ReadingStore {
    pub fn new(registry: &FactorRegistry) -> Self {
        let slots: Vec<Slot> = registry
            .factors()
            .iter()
            .map(|f| Slot { id: f.id.clone(), ttl: f.ttl, reading: RwLock::new(None) })
            .collect();
        let index = slots.iter().enumerate().map(|(i, s)| (s.id.clone(), i)).collect();
        Self { slots, index }
    }

    /// Last write wins. Out-of-range values are kept as an explicit unknown so
    /// a bad reading also displaces the previous good one.
    pub fn update(&self, factor_id: &str, score: Score, ts: DateTime<Utc>) -> UpdateOutcome {
        let Some(&i) = self.index.get(factor_id) else {
            log_factor_rejected(factor_id, "unregistered", score.value());
            return UpdateOutcome::UnknownFactor;
        };
        let (score, outcome) = if score.is_in_range() {
            (score, UpdateOutcome::Stored)
        } else {
            log_factor_rejected(factor_id, "out_of_range", score.value());
            (Score::Unknown, UpdateOutcome::StoredAsUnknown)
        };
        *self.slots[i].reading.write() = Some(Reading { score, ts });
        log_factor_update(factor_id, score.value(), &ts.to_rfc3339());
        outcome
    }

    /// Read every slot as of `now`. Stale readings are reported as such and
    /// removed from their slot.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Snapshot {
        let entries = self
            .slots
            .iter()
            .map(|slot| SnapshotEntry { factor_id: slot.id.clone(), state: self.read_slot(slot, now) })
            .collect();
        Snapshot { taken_at: now, entries }
    }

    fn read_slot(&self, slot: &Slot, now: DateTime<Utc>) -> ReadingState {
        let current = *slot.reading.read();
        match current {
            None => ReadingState::Missing,
            Some(r) if slot.is_stale(&r, now) => {
                evict_if_unchanged(slot, r, now);
                ReadingState::Stale { ts: r.ts }
            }
            Some(Reading { score: Score::Value(value), ts }) => ReadingState::Fresh { value, ts },
            Some(Reading { score: Score::Unknown, ts }) => ReadingState::Unknown { ts },
        }
    }

    /// Explicit eviction pass. Returns the evicted factor ids.
    pub fn evict_stale(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut evicted = Vec::new();
        for slot in &self.slots {
            let current = *slot.reading.read();
            if let Some(r) = current {
                if slot.is_stale(&r, now) && evict_if_unchanged(slot, r, now) {
                    evicted.push(slot.id.clone());
                }
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Clear the slot unless a producer overwrote it since it was read.
fn evict_if_unchanged(slot: &Slot, seen: Reading, now: DateTime<Utc>) -> bool {
    let mut guard = slot.reading.write();
    if *guard == Some(seen) {
        *guard = None;
        let age = now.signed_duration_since(seen.ts);
        log_eviction(&slot.id, age.num_seconds(), slot.ttl.num_seconds());
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factor::{Factor, Horizon};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap()
    }

    fn store() -> ReadingStore {
        let reg = FactorRegistry::from_factors(
            vec![
                Factor::new("fast", Horizon::Short, 0.5, Duration::hours(4)),
                Factor::new("slow", Horizon::Long, 0.5, Duration::hours(1080)),
            ],
            1e-6,
        )
        .unwrap();
        ReadingStore::new(&reg)
    }

    #[test]
    fn test_last_write_wins() {
        let s = store();
        s.update("fast", Score::Value(0.2), t0());
        s.update("fast", Score::Value(-0.4), t0() + Duration::minutes(5));
        let snap = s.snapshot(t0() + Duration::minutes(10));
        assert_eq!(snap.get("fast").unwrap().value(), Some(-0.4));
    }

    #[test]
    fn test_unregistered_factor_dropped() {
        let s = store();
        assert_eq!(s.update("ghost", Score::Value(0.1), t0()), UpdateOutcome::UnknownFactor);
        assert!(s.snapshot(t0()).get("ghost").is_none());
    }

    #[test]
    fn test_out_of_range_becomes_unknown() {
        let s = store();
        s.update("fast", Score::Value(0.3), t0());
        assert_eq!(s.update("fast", Score::Value(1.7), t0()), UpdateOutcome::StoredAsUnknown);
        assert!(matches!(s.snapshot(t0()).get("fast"), Some(ReadingState::Unknown { .. })));
    }

    #[test]
    fn test_stale_reading_reported_then_evicted() {
        let s = store();
        s.update("fast", Score::Value(0.5), t0());
        let later = t0() + Duration::hours(5);
        assert!(matches!(s.snapshot(later).get("fast"), Some(ReadingState::Stale { .. })));
        // The ghost value is gone on the next read
        assert_eq!(s.snapshot(later).get("fast"), Some(&ReadingState::Missing));
    }

    #[test]
    fn test_ttl_is_per_factor() {
        let s = store();
        s.update("fast", Score::Value(0.5), t0());
        s.update("slow", Score::Value(0.5), t0());
        let snap = s.snapshot(t0() + Duration::hours(100));
        assert!(matches!(snap.get("fast"), Some(ReadingState::Stale { .. })));
        assert!(matches!(snap.get("slow"), Some(ReadingState::Fresh { .. })));
    }

    #[test]
    fn test_reading_exactly_at_ttl_is_fresh() {
        let s = store();
        s.update("fast", Score::Value(0.5), t0());
        let snap = s.snapshot(t0() + Duration::hours(4));
        assert!(matches!(snap.get("fast"), Some(ReadingState::Fresh { .. })));
    }

    #[test]
    fn test_evict_stale_pass() {
        let s = store();
        s.update("fast", Score::Value(0.5), t0());
        s.update("slow", Score::Unknown, t0());
        let evicted = s.evict_stale(t0() + Duration::hours(6));
        assert_eq!(evicted, vec!["fast".to_string()]);
        assert!(s.evict_stale(t0() + Duration::hours(6)).is_empty());
    }

    #[test]
    fn test_eviction_skips_overwritten_slot() {
        let s = store();
        let old = Reading { score: Score::Value(0.1), ts: t0() };
        s.update("fast", Score::Value(0.9), t0() + Duration::hours(5));
        assert!(!evict_if_unchanged(&s.slots[0], old, t0() + Duration::hours(6)));
        assert!(matches!(s.snapshot(t0() + Duration::hours(6)).get("fast"), Some(ReadingState::Fresh { .. })));
    }
}
