//! Volatility-driven conviction modifier.
//!
//! The same composite means more in a high-volume tape than in a quiet one.
//! The modifier scales composite magnitude by the relative-volume regime:
//!
//! | regime   | bearish composite | bullish composite |
//! |----------|-------------------|-------------------|
//! | elevated | × bear_mult       | × bull_mult       |
//! | low      | × low_mult        | × low_mult        |
//! | normal   | × 1.0             | × 1.0             |
//!
//! The elevated regime uses hysteresis: it switches on above
//! `activate_above` and off only below `deactivate_below`. Readings in
//! between keep whatever state was last active.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::invalid;
use crate::error::ConfigError;
use crate::logging::log_conviction_change;

#[derive(Debug, Clone, PartialEq)]
pub struct ConvictionConfig {
    pub activate_above: f64,
    pub deactivate_below: f64,
    pub low_below: f64,
    pub bear_mult: f64,
    pub bull_mult: f64,
    pub low_mult: f64,
    /// Composites with |value| below this are never scaled
    pub dead_zone: f64,
    /// How long an evaluation is reused when no new reading arrives
    pub cache_window: Duration,
    /// Readings older than this close the confidence gate
    pub max_reading_age: Duration,
}

impl Default for ConvictionConfig {
    fn default() -> Self {
        Self {
            activate_above: 1.5,
            deactivate_below: 1.2,
            low_below: 0.8,
            bear_mult: 1.20,
            bull_mult: 1.10,
            low_mult: 0.85,
            dead_zone: 0.05,
            cache_window: Duration::minutes(60),
            max_reading_age: Duration::minutes(120),
        }
    }
}

impl ConvictionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.activate_above.is_finite() && self.activate_above > 0.0) {
            return Err(invalid("CONVICTION_ACTIVATE_ABOVE", format!("{} must be positive", self.activate_above)));
        }
        if !(self.deactivate_below < self.activate_above) {
            return Err(invalid(
                "CONVICTION_DEACTIVATE_BELOW",
                format!("{} must be strictly below {}", self.deactivate_below, self.activate_above),
            ));
        }
        if !(self.low_below <= self.deactivate_below) {
            return Err(invalid(
                "CONVICTION_LOW_BELOW",
                format!("{} must not exceed {}", self.low_below, self.deactivate_below),
            ));
        }
        for (key, m) in [
            ("CONVICTION_BEAR_MULT", self.bear_mult),
            ("CONVICTION_BULL_MULT", self.bull_mult),
            ("CONVICTION_LOW_MULT", self.low_mult),
        ] {
            if !(m.is_finite() && m > 0.0) {
                return Err(invalid(key, format!("{} must be positive", m)));
            }
        }
        if !(0.0..1.0).contains(&self.dead_zone) {
            return Err(invalid("CONVICTION_DEAD_ZONE", format!("{} not in [0, 1)", self.dead_zone)));
        }
        if self.cache_window <= Duration::zero() {
            return Err(invalid("VOL_CACHE_MINS", "must be positive".to_string()));
        }
        if self.max_reading_age <= Duration::zero() {
            return Err(invalid("VOL_MAX_AGE_MINS", "must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolatilityReading {
    pub value: f64,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VolRegime {
    Elevated,
    Normal,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "gate", content = "reason", rename_all = "snake_case")]
pub enum Gate {
    Open,
    Closed(&'static str),
}

/// Hysteresis state. Mutated only by `ConvictionModifier::observe`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConvictionState {
    pub active: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub activate_above: f64,
    pub deactivate_below: f64,
}

#[derive(Debug, Clone, Copy)]
struct Evaluation {
    at: DateTime<Utc>,
    reading_ts: DateTime<Utc>,
    regime: VolRegime,
}

#[derive(Debug)]
struct Inner {
    latest: Option<VolatilityReading>,
    state: ConvictionState,
    evaluated: Option<Evaluation>,
}

/// What the modifier did to one composite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConvictionOutcome {
    pub gate: Gate,
    pub regime: Option<VolRegime>,
    pub reading: Option<f64>,
    pub multiplier: f64,
    pub dead_zone: bool,
    pub state: ConvictionState,
}

#[derive(Debug)]
pub struct ConvictionModifier {
    cfg: ConvictionConfig,
    inner: Mutex<Inner>,
}

impl ConvictionModifier {
    pub fn new(cfg: ConvictionConfig) -> Self {
        let state = ConvictionState {
            active: false,
            activated_at: None,
            activate_above: cfg.activate_above,
            deactivate_below: cfg.deactivate_below,
        };
        Self {
            cfg,
            inner: Mutex::new(Inner { latest: None, state, evaluated: None }),
        }
    }

    /// Record a volatility reading and run the hysteresis step on it. Every
    /// reading is stepped, so a crossing is seen regardless of read cadence.
    /// Readings older than the latest one are ignored.
    pub fn observe(&self, value: f64, ts: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        if inner.latest.is_some_and(|r| ts < r.ts) {
            return;
        }
        inner.latest = Some(VolatilityReading { value, ts });
        inner.evaluated = None;
        if !is_valid(value) {
            return;
        }
        let state = &mut inner.state;
        if !state.active && value > self.cfg.activate_above {
            state.active = true;
            state.activated_at = Some(ts);
            log_conviction_change(true, value, self.cfg.activate_above);
        } else if state.active && value < self.cfg.deactivate_below {
            state.active = false;
            state.activated_at = None;
            log_conviction_change(false, value, self.cfg.deactivate_below);
        }
    }

    pub fn state(&self) -> ConvictionState {
        self.inner.lock().state
    }

    /// Gate and regime for the latest reading, reusing the cached evaluation
    /// while it is recent and no newer reading arrived.
    pub fn evaluate(&self, now: DateTime<Utc>) -> (Gate, Option<VolRegime>) {
        self.evaluate_locked(&mut self.inner.lock(), now)
    }

    fn evaluate_locked(&self, inner: &mut Inner, now: DateTime<Utc>) -> (Gate, Option<VolRegime>) {
        let Some(reading) = inner.latest else {
            return (Gate::Closed("no_reading"), None);
        };
        if !is_valid(reading.value) {
            return (Gate::Closed("invalid_reading"), None);
        }
        if now.signed_duration_since(reading.ts) > self.cfg.max_reading_age {
            return (Gate::Closed("stale_reading"), None);
        }
        if let Some(ev) = inner.evaluated {
            if ev.reading_ts == reading.ts && now.signed_duration_since(ev.at) < self.cfg.cache_window {
                return (Gate::Open, Some(ev.regime));
            }
        }

        let regime = if inner.state.active {
            VolRegime::Elevated
        } else if reading.value < self.cfg.low_below {
            VolRegime::Low
        } else {
            VolRegime::Normal
        };
        inner.evaluated = Some(Evaluation { at: now, reading_ts: reading.ts, regime });
        (Gate::Open, Some(regime))
    }

    /// Scale `composite` by the current regime. Returns the new value and a
    /// description of what was applied.
    pub fn apply(&self, composite: f64, now: DateTime<Utc>) -> (f64, ConvictionOutcome) {
        let mut inner = self.inner.lock();
        let (gate, regime) = self.evaluate_locked(&mut inner, now);
        let dead_zone = composite.abs() < self.cfg.dead_zone;
        let multiplier = match (gate, regime) {
            _ if dead_zone => 1.0,
            (Gate::Open, Some(VolRegime::Elevated)) if composite < 0.0 => self.cfg.bear_mult,
            (Gate::Open, Some(VolRegime::Elevated)) => self.cfg.bull_mult,
            (Gate::Open, Some(VolRegime::Low)) => self.cfg.low_mult,
            _ => 1.0,
        };
        let outcome = ConvictionOutcome {
            gate,
            regime,
            reading: inner.latest.map(|r| r.value),
            multiplier,
            dead_zone,
            state: inner.state,
        };
        ((composite * multiplier).clamp(-1.0, 1.0), outcome)
    }
}

fn is_valid(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap()
    }

    fn modifier() -> ConvictionModifier {
        ConvictionModifier::new(ConvictionConfig::default())
    }

    #[test]
    fn test_hysteresis_sequence() {
        let m = modifier();
        let steps = [(1.0, false), (1.6, true), (1.3, true), (1.1, false)];
        for (i, (value, expect_active)) in steps.iter().enumerate() {
            let ts = t0() + Duration::minutes(i as i64);
            m.observe(*value, ts);
            m.evaluate(ts);
            assert_eq!(m.state().active, *expect_active, "after reading {}", value);
        }
    }

    #[test]
    fn test_band_does_not_activate_from_inactive() {
        let m = modifier();
        m.observe(1.4, t0());
        assert_eq!(m.evaluate(t0()), (Gate::Open, Some(VolRegime::Normal)));
        assert!(!m.state().active);
    }

    #[test]
    fn test_elevated_is_asymmetric() {
        let m = modifier();
        m.observe(2.0, t0());
        let (bear, _) = m.apply(-0.5, t0());
        let (bull, _) = m.apply(0.5, t0());
        assert!((bear + 0.6).abs() < 1e-12);
        assert!((bull - 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_low_volatility_dampens() {
        let m = modifier();
        m.observe(0.5, t0());
        let (v, outcome) = m.apply(0.4, t0());
        assert!((v - 0.34).abs() < 1e-12);
        assert_eq!(outcome.regime, Some(VolRegime::Low));
    }

    #[test]
    fn test_dead_zone_untouched() {
        let m = modifier();
        m.observe(2.0, t0());
        let (v, outcome) = m.apply(0.03, t0());
        assert_eq!(v, 0.03);
        assert!(outcome.dead_zone);
        assert_eq!(outcome.multiplier, 1.0);
    }

    #[test]
    fn test_gate_closed_without_reading() {
        let m = modifier();
        let (v, outcome) = m.apply(-0.5, t0());
        assert_eq!(v, -0.5);
        assert_eq!(outcome.gate, Gate::Closed("no_reading"));
    }

    #[test]
    fn test_gate_closed_on_stale_reading() {
        let m = modifier();
        m.observe(2.0, t0());
        let (v, outcome) = m.apply(-0.5, t0() + Duration::hours(3));
        assert_eq!(v, -0.5);
        assert_eq!(outcome.gate, Gate::Closed("stale_reading"));
    }

    #[test]
    fn test_gate_closed_on_nan() {
        let m = modifier();
        m.observe(f64::NAN, t0());
        assert_eq!(m.evaluate(t0()).0, Gate::Closed("invalid_reading"));
    }

    #[test]
    fn test_evaluation_cached_within_window() {
        let m = modifier();
        m.observe(1.6, t0());
        m.evaluate(t0());
        {
            // Flip the hysteresis state off behind the cache's back
            let mut inner = m.inner.lock();
            inner.state.active = false;
        }
        assert_eq!(m.evaluate(t0() + Duration::minutes(30)).1, Some(VolRegime::Elevated));
        // Past the window the regime is rebuilt from the current state
        assert_eq!(m.evaluate(t0() + Duration::minutes(61)).1, Some(VolRegime::Normal));
    }

    #[test]
    fn test_crossing_seen_without_read_between_readings() {
        let m = modifier();
        m.observe(1.0, t0());
        m.evaluate(t0());
        m.observe(1.6, t0() + Duration::minutes(5));
        m.observe(1.3, t0() + Duration::minutes(10));
        assert!(m.state().active);
        let (v, outcome) = m.apply(-0.5, t0() + Duration::minutes(10));
        assert_eq!(outcome.regime, Some(VolRegime::Elevated));
        assert!((v + 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_older_reading_ignored() {
        let m = modifier();
        m.observe(1.6, t0() + Duration::minutes(10));
        m.observe(1.0, t0());
        assert!(m.state().active);
        assert_eq!(m.evaluate(t0() + Duration::minutes(10)).1, Some(VolRegime::Elevated));
    }

    #[test]
    fn test_outcome_matches_applied_multiplier() {
        let m = modifier();
        m.observe(2.0, t0());
        let (_, outcome) = m.apply(-0.5, t0());
        assert!(outcome.state.active);
        assert_eq!(outcome.reading, Some(2.0));
        assert_eq!(outcome.multiplier, 1.20);
    }

    #[test]
    fn test_result_clamped() {
        let m = modifier();
        m.observe(3.0, t0());
        let (v, _) = m.apply(-0.95, t0());
        assert_eq!(v, -1.0);
    }

    #[test]
    fn test_activation_timestamp_recorded() {
        let m = modifier();
        m.observe(1.7, t0());
        m.evaluate(t0());
        assert_eq!(m.state().activated_at, Some(t0()));
    }
}
