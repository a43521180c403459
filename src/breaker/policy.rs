//! Severity table: what each (category, severity) does to the composite and
//! how long it must stay active at minimum.

use chrono::{DateTime, Duration, Utc};

use super::{BreakerEvent, Category, Override};
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq)]
pub struct SeverityPolicy {
    pub category: Category,
    pub severity: u8,
    pub label: &'static str,
    pub effect: Override,
    pub min_active: Duration,
}

impl SeverityPolicy {
    fn validate(&self) -> Result<(), ConfigError> {
        let fail = |reason: String| ConfigError::InvalidPolicy {
            category: self.category.to_string(),
            severity: self.severity,
            reason,
        };
        for bound in [self.effect.cap, self.effect.floor].into_iter().flatten() {
            if !bound.is_finite() || !(-1.0..=1.0).contains(&bound) {
                return Err(fail(format!("bound {} outside [-1, 1]", bound)));
            }
        }
        if let (Some(cap), Some(floor)) = (self.effect.cap, self.effect.floor) {
            if floor > cap {
                return Err(fail(format!("floor {} above cap {}", floor, cap)));
            }
        }
        let m = self.effect.scoring_modifier;
        if !(m.is_finite() && m > 0.0) {
            return Err(fail(format!("scoring modifier {} must be positive", m)));
        }
        if self.min_active < Duration::zero() {
            return Err(fail("negative minimum duration".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BreakerPolicy {
    entries: Vec<SeverityPolicy>,
}

impl BreakerPolicy {
    pub fn new(entries: Vec<SeverityPolicy>) -> Result<Self, ConfigError> {
        for (i, e) in entries.iter().enumerate() {
            e.validate()?;
            if entries[..i].iter().any(|p| p.category == e.category && p.severity == e.severity) {
                return Err(ConfigError::InvalidPolicy {
                    category: e.category.to_string(),
                    severity: e.severity,
                    reason: "duplicate entry".to_string(),
                });
            }
        }
        Ok(Self { entries })
    }

    /// Policy for `severity`, falling back to the highest defined severity
    /// below it, then to the lowest defined one. `None` only when the
    /// category has no entries at all.
    pub fn resolve(&self, category: Category, severity: u8) -> Option<&SeverityPolicy> {
        let in_cat = || self.entries.iter().filter(move |p| p.category == category);
        in_cat()
            .filter(|p| p.severity <= severity)
            .max_by_key(|p| p.severity)
            .or_else(|| in_cat().min_by_key(|p| p.severity))
    }

    /// Build the event a trigger produces under this policy.
    pub fn event(
        &self,
        category: Category,
        severity: u8,
        trigger_id: &str,
        ts: DateTime<Utc>,
    ) -> Option<BreakerEvent> {
        self.resolve(category, severity).map(|p| BreakerEvent {
            trigger_id: trigger_id.to_string(),
            category,
            severity,
            activated_at: ts,
            min_active: p.min_active,
            effect: p.effect,
        })
    }

    pub fn entries(&self) -> &[SeverityPolicy] {
        &self.entries
    }
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        let p = |category, severity, label, cap, floor, scoring_modifier, hours| SeverityPolicy {
            category,
            severity,
            label,
            effect: Override { cap, floor, scoring_modifier },
            min_active: Duration::hours(hours),
        };
        Self {
            entries: vec![
                p(Category::Downside, 1, "index_down_minor", Some(0.40), None, 0.90, 2),
                p(Category::Downside, 2, "index_down_major", Some(0.0), None, 0.75, 4),
                p(Category::Downside, 3, "index_crash", Some(-0.20), None, 0.60, 8),
                p(Category::Upside, 1, "index_up_minor", None, Some(-0.40), 0.90, 2),
                p(Category::Upside, 2, "index_up_major", None, Some(0.0), 0.80, 4),
                p(Category::Volatility, 1, "vol_spike", Some(0.40), None, 0.85, 2),
                p(Category::Volatility, 2, "vol_extreme", Some(0.0), None, 0.70, 6),
            ],
        }
    }
}
