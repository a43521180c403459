//! All categories behind one handle. Each category has its own mutex, so
//! transitions within a category apply one at a time in arrival order while
//! categories never block each other.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::condition::ConditionCheck;
use super::machine::{CategoryBreaker, Transition};
use super::notify::{NotificationSink, TransitionNotice};
use super::policy::BreakerPolicy;
use super::{BreakerEvent, Category, Decision, DecisionRecord, Outcome, Override, Status};
use crate::logging::{log_transition, log_transition_dropped, ProfileScope};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerStatusView {
    pub category: Category,
    pub status: Status,
    pub event: Option<BreakerEvent>,
    /// `None` until the category's first trigger
    pub status_since: Option<DateTime<Utc>>,
    pub secs_in_status: Option<i64>,
    pub pending_since: Option<DateTime<Utc>>,
    pub outcome: Option<DecisionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveOverride {
    pub category: Category,
    pub status: Status,
    pub trigger_id: String,
    pub severity: u8,
    pub effect: Override,
}

pub struct BreakerBoard {
    /// Indexed by `Category::index`; `None` until first trigger
    slots: [Mutex<Option<CategoryBreaker>>; 3],
    policy: BreakerPolicy,
    condition: Arc<dyn ConditionCheck>,
    sink: Arc<dyn NotificationSink>,
}

impl BreakerBoard {
    pub fn new(
        policy: BreakerPolicy,
        condition: Arc<dyn ConditionCheck>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            slots: [Mutex::new(None), Mutex::new(None), Mutex::new(None)],
            policy,
            condition,
            sink,
        }
    }

    fn slot(&self, category: Category) -> &Mutex<Option<CategoryBreaker>> {
        &self.slots[category.index()]
    }

    fn publish(&self, category: Category, transition: Transition, at: DateTime<Utc>) -> Outcome {
        match transition {
            Transition::Changed { from, to, reason, event } => {
                log_transition(
                    category.as_str(),
                    from.as_str(),
                    to.as_str(),
                    event.as_ref().map(|e| e.trigger_id.as_str()),
                    reason,
                );
                self.sink.notify(&TransitionNotice { category, from, to, reason, event, at });
                Outcome::Applied { from, to }
            }
            Transition::Ignored(reason) => {
                log_transition_dropped(category.as_str(), reason, "transition ignored");
                Outcome::Ignored(reason)
            }
            Transition::Unchanged => Outcome::Ignored("unchanged"),
        }
    }

    fn parse_category(raw: &str) -> Result<Category, Outcome> {
        raw.parse::<Category>().map_err(|err| {
            log_transition_dropped(raw, "unknown_category", &err);
            Outcome::Dropped("unknown_category")
        })
    }

    /// External trigger. Unknown categories are logged and dropped.
    pub fn trigger(&self, category: &str, severity: u8, trigger_id: &str, ts: DateTime<Utc>) -> Outcome {
        match Self::parse_category(category) {
            Ok(c) => self.trigger_category(c, severity, trigger_id, ts),
            Err(dropped) => dropped,
        }
    }

    pub fn trigger_category(
        &self,
        category: Category,
        severity: u8,
        trigger_id: &str,
        ts: DateTime<Utc>,
    ) -> Outcome {
        let Some(event) = self.policy.event(category, severity, trigger_id, ts) else {
            log_transition_dropped(category.as_str(), "no_policy", trigger_id);
            return Outcome::Dropped("no_policy");
        };
        let mut slot = self.slot(category).lock();
        let breaker = slot.get_or_insert_with(|| CategoryBreaker::new(category, ts));
        let transition = breaker.on_trigger(event, ts);
        self.publish(category, transition, ts)
    }

    /// Operator accept/reject. Only meaningful in PendingReset.
    pub fn decide(&self, category: &str, decision: Decision, by: &str, now: DateTime<Utc>) -> Outcome {
        let category = match Self::parse_category(category) {
            Ok(c) => c,
            Err(dropped) => return dropped,
        };
        let mut slot = self.slot(category).lock();
        let Some(breaker) = slot.as_mut() else {
            log_transition_dropped(category.as_str(), "not_pending_reset", "category never triggered");
            return Outcome::Ignored("not_pending_reset");
        };
        let transition = breaker.on_decision(decision, by, now);
        self.publish(category, transition, now)
    }

    /// Re-evaluate decay for every category.
    pub fn poll(&self, now: DateTime<Utc>) -> Vec<Outcome> {
        let _profile = ProfileScope::new("breaker_poll");
        let mut applied = Vec::new();
        for category in Category::ALL {
            let mut slot = self.slot(category).lock();
            let Some(breaker) = slot.as_mut() else { continue };
            let condition = &self.condition;
            let transition =
                breaker.poll_decay(now, |event| condition.cleared(&event.trigger_id, category, now));
            if matches!(transition, Transition::Changed { .. }) {
                applied.push(self.publish(category, transition, now));
            }
        }
        applied
    }

    /// Per-category status, after polling decay.
    pub fn status(&self, now: DateTime<Utc>) -> Vec<BreakerStatusView> {
        self.poll(now);
        Category::ALL
            .iter()
            .map(|&category| match self.slot(category).lock().as_ref() {
                Some(b) => BreakerStatusView {
                    category,
                    status: b.status,
                    event: b.event.clone(),
                    status_since: Some(b.status_since),
                    secs_in_status: Some(now.signed_duration_since(b.status_since).num_seconds()),
                    pending_since: b.pending_since,
                    outcome: b.outcome.clone(),
                },
                None => BreakerStatusView {
                    category,
                    status: Status::Inactive,
                    event: None,
                    status_since: None,
                    secs_in_status: None,
                    pending_since: None,
                    outcome: None,
                },
            })
            .collect()
    }

    /// Overrides currently in force, after polling decay.
    pub fn overrides(&self, now: DateTime<Utc>) -> Vec<ActiveOverride> {
        self.poll(now);
        Category::ALL
            .iter()
            .filter_map(|&category| {
                let slot = self.slot(category).lock();
                let breaker = slot.as_ref()?;
                let event = breaker.active_event()?;
                Some(ActiveOverride {
                    category,
                    status: breaker.status,
                    trigger_id: event.trigger_id.clone(),
                    severity: event.severity,
                    effect: event.effect,
                })
            })
            .collect()
    }
}

/// Scale by every active scoring modifier, then bound by the tightest floor
/// and the tightest cap. The cap is applied last, so it wins a conflict.
pub fn apply_overrides(value: f64, overrides: &[ActiveOverride]) -> f64 {
    let scaled = overrides.iter().fold(value, |v, o| v * o.effect.scoring_modifier);
    let floor = overrides.iter().filter_map(|o| o.effect.floor).reduce(f64::max);
    let cap = overrides.iter().filter_map(|o| o.effect.cap).reduce(f64::min);
    let mut v = scaled;
    if let Some(f) = floor {
        v = v.max(f);
    }
    if let Some(c) = cap {
        v = v.min(c);
    }
    v.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::notify::MemorySink;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap()
    }

    fn board(cleared: Arc<AtomicBool>) -> (BreakerBoard, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new(64));
        let check = move |_: &str, _: Category, _: DateTime<Utc>| Some(cleared.load(Ordering::SeqCst));
        (BreakerBoard::new(BreakerPolicy::default(), Arc::new(check), sink.clone()), sink)
    }

    #[test]
    fn test_unknown_category_dropped() {
        let (b, sink) = board(Arc::new(AtomicBool::new(false)));
        assert_eq!(b.trigger("sideways", 1, "x", t0()), Outcome::Dropped("unknown_category"));
        assert_eq!(b.decide("sideways", Decision::Accept, "ops", t0()), Outcome::Dropped("unknown_category"));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_full_lifecycle_notifies_each_transition() {
        let cleared = Arc::new(AtomicBool::new(false));
        let (b, sink) = board(cleared.clone());
        assert!(b.trigger("downside", 1, "index_down_minor", t0()).is_applied());
        assert!(b.poll(t0() + Duration::hours(3)).is_empty());
        cleared.store(true, Ordering::SeqCst);
        let status = b.status(t0() + Duration::hours(3));
        assert_eq!(status[0].status, Status::PendingReset);
        assert!(b.decide("downside", Decision::Accept, "ops", t0() + Duration::hours(4)).is_applied());
        let seen: Vec<Status> = sink.notices().iter().map(|n| n.to).collect();
        assert_eq!(seen, vec![Status::Active, Status::PendingReset, Status::Inactive]);
        assert!(sink.notices().iter().all(|n| n.category == Category::Downside));
    }

    #[test]
    fn test_downgrade_is_not_notified() {
        let (b, sink) = board(Arc::new(AtomicBool::new(false)));
        b.trigger("volatility", 2, "vol_extreme", t0());
        assert_eq!(b.trigger("volatility", 1, "vol_spike", t0()), Outcome::Ignored("no_downgrade"));
        assert_eq!(sink.len(), 1);
        assert_eq!(b.overrides(t0())[0].trigger_id, "vol_extreme");
    }

    #[test]
    fn test_decision_on_untriggered_category_ignored() {
        let (b, _) = board(Arc::new(AtomicBool::new(true)));
        assert_eq!(b.decide("upside", Decision::Reject, "ops", t0()), Outcome::Ignored("not_pending_reset"));
    }

    #[test]
    fn test_status_for_untouched_categories() {
        let (b, _) = board(Arc::new(AtomicBool::new(false)));
        b.trigger("upside", 1, "index_up_minor", t0());
        let status = b.status(t0() + Duration::minutes(10));
        assert_eq!(status.len(), 3);
        assert_eq!(status[1].status, Status::Active);
        assert_eq!(status[1].secs_in_status, Some(600));
        assert_eq!(status[0].status_since, None);
    }

    #[test]
    fn test_no_policy_dropped() {
        let policy = BreakerPolicy::new(vec![]).unwrap();
        let b = BreakerBoard::new(
            policy,
            Arc::new(|_: &str, _: Category, _: DateTime<Utc>| -> Option<bool> { None }),
            Arc::new(MemorySink::new(4)),
        );
        assert_eq!(b.trigger("downside", 1, "x", t0()), Outcome::Dropped("no_policy"));
    }

    fn ov(cap: Option<f64>, floor: Option<f64>, m: f64) -> ActiveOverride {
        ActiveOverride {
            category: Category::Downside,
            status: Status::Active,
            trigger_id: "t".into(),
            severity: 1,
            effect: Override { cap, floor, scoring_modifier: m },
        }
    }

    #[test]
    fn test_apply_overrides_scales_then_caps() {
        let v = apply_overrides(0.8, &[ov(Some(0.4), None, 0.9)]);
        assert!((v - 0.4).abs() < 1e-12);
        let v = apply_overrides(0.3, &[ov(Some(0.4), None, 0.9)]);
        assert!((v - 0.27).abs() < 1e-12);
    }

    #[test]
    fn test_apply_overrides_floor() {
        let v = apply_overrides(-0.7, &[ov(None, Some(0.0), 0.8)]);
        assert_eq!(v, 0.0);
    }

    #[test]
    fn test_cap_wins_conflict_with_floor() {
        let v = apply_overrides(0.5, &[ov(Some(-0.2), None, 1.0), ov(None, Some(0.0), 1.0)]);
        assert_eq!(v, -0.2);
    }

    #[test]
    fn test_no_overrides_passthrough() {
        assert_eq!(apply_overrides(0.42, &[]), 0.42);
    }
}
