//! Decay conditions. Whether the market condition behind a trigger has
//! cleared is re-derived from live data on every poll, never cached inside
//! the breaker.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use super::Category;

pub trait ConditionCheck: Send + Sync {
    /// `Some(true)` cleared, `Some(false)` still present, `None` unknown.
    fn cleared(&self, trigger_id: &str, category: Category, now: DateTime<Utc>) -> Option<bool>;
}

impl<F> ConditionCheck for F
where
    F: Fn(&str, Category, DateTime<Utc>) -> Option<bool> + Send + Sync,
{
    fn cleared(&self, trigger_id: &str, category: Category, now: DateTime<Utc>) -> Option<bool> {
        self(trigger_id, category, now)
    }
}

#[derive(Debug, Clone, Copy)]
struct ConditionReport {
    cleared: bool,
    ts: DateTime<Utc>,
}

/// Condition flags reported by collaborators, keyed by trigger id. Reports
/// older than `max_age` count as unknown.
#[derive(Debug)]
pub struct ConditionBoard {
    max_age: Duration,
    reports: RwLock<HashMap<String, ConditionReport>>,
}

impl ConditionBoard {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age, reports: RwLock::new(HashMap::new()) }
    }

    pub fn report(&self, trigger_id: &str, cleared: bool, ts: DateTime<Utc>) {
        let mut reports = self.reports.write();
        let newer = reports.get(trigger_id).map_or(true, |r| ts >= r.ts);
        if newer {
            reports.insert(trigger_id.to_string(), ConditionReport { cleared, ts });
        }
    }
}

impl ConditionCheck for ConditionBoard {
    fn cleared(&self, trigger_id: &str, _category: Category, now: DateTime<Utc>) -> Option<bool> {
        let report = *self.reports.read().get(trigger_id)?;
        if now.signed_duration_since(report.ts) > self.max_age {
            return None;
        }
        Some(report.cleared)
    }
}
