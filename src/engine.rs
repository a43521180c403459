//! The composite pipeline:
//!
//! ```text
//! ReadingStore ─► composite::compute ─► ConvictionModifier ─► breaker overrides ─► BiasThresholds
//!   snapshot        renormalized avg       volatility scale      scale, floor, cap      level / unknown
//! ```
//!
//! All state is owned by [`BiasEngine`]; share it behind an `Arc`.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bias::{BiasReading, BiasThresholds};
use crate::breaker::board::{apply_overrides, ActiveOverride, BreakerBoard, BreakerStatusView};
use crate::breaker::condition::ConditionCheck;
use crate::breaker::notify::NotificationSink;
use crate::breaker::policy::BreakerPolicy;
use crate::breaker::{Decision, Outcome};
use crate::composite::{self, Composite, Exclusion};
use crate::config::EngineConfig;
use crate::conviction::{ConvictionModifier, ConvictionOutcome, ConvictionState};
use crate::error::ConfigError;
use crate::factor::catalog::{default_factors, load_factors};
use crate::factor::registry::FactorRegistry;
use crate::factor::store::{ReadingStore, UpdateOutcome};
use crate::factor::Score;
use crate::logging::{log, log_composite, log_config_error, obj, v_str, Domain, Level, ProfileScope};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeReading {
    pub computed_at: DateTime<Utc>,
    /// Renormalized average before any modifier
    pub base: Composite,
    pub excluded: Vec<Exclusion>,
    /// `None` when there was no composite to modify
    pub conviction: Option<ConvictionOutcome>,
    pub overrides: Vec<ActiveOverride>,
    pub final_value: Option<f64>,
    pub level: BiasReading,
    pub fingerprint: String,
}

pub struct BiasEngine {
    registry: FactorRegistry,
    store: ReadingStore,
    conviction: ConvictionModifier,
    breakers: BreakerBoard,
    bias: BiasThresholds,
}

impl BiasEngine {
    pub fn new(
        cfg: &EngineConfig,
        registry: FactorRegistry,
        policy: BreakerPolicy,
        condition: Arc<dyn ConditionCheck>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, ConfigError> {
        if let Err(err) = cfg.validate() {
            log_config_error("engine", &err.to_string());
            return Err(err);
        }
        let store = ReadingStore::new(&registry);
        Ok(Self {
            registry,
            store,
            conviction: ConvictionModifier::new(cfg.conviction.clone()),
            breakers: BreakerBoard::new(policy, condition, sink),
            bias: cfg.bias,
        })
    }

    /// Build from config: factor file if `factors_path` is set, otherwise the
    /// built-in catalog; default breaker policy.
    pub fn from_config(
        cfg: &EngineConfig,
        condition: Arc<dyn ConditionCheck>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let factors = match &cfg.factors_path {
            Some(path) => load_factors(path)?,
            None => default_factors(),
        };
        let registry = FactorRegistry::from_factors(factors, cfg.weight_tolerance)?;
        let engine = Self::new(cfg, registry, BreakerPolicy::default(), condition, sink)?;
        log(
            Level::Info,
            Domain::System,
            "engine_ready",
            obj(&[
                ("factors", serde_json::json!(engine.registry.len())),
                ("source", v_str(cfg.factors_path.as_deref().unwrap_or("builtin"))),
            ]),
        );
        Ok(engine)
    }

    pub fn registry(&self) -> &FactorRegistry {
        &self.registry
    }

    pub fn update_factor(&self, factor_id: &str, score: Score, ts: DateTime<Utc>) -> UpdateOutcome {
        self.store.update(factor_id, score, ts)
    }

    pub fn update_volatility(&self, value: f64, ts: DateTime<Utc>) {
        self.conviction.observe(value, ts);
    }

    pub fn trigger(&self, category: &str, severity: u8, trigger_id: &str, ts: DateTime<Utc>) -> Outcome {
        self.breakers.trigger(category, severity, trigger_id, ts)
    }

    pub fn decide(&self, category: &str, decision: Decision, by: &str, now: DateTime<Utc>) -> Outcome {
        self.breakers.decide(category, decision, by, now)
    }

    pub fn breaker_status(&self, now: DateTime<Utc>) -> Vec<BreakerStatusView> {
        self.breakers.status(now)
    }

    pub fn poll_breakers(&self, now: DateTime<Utc>) -> Vec<Outcome> {
        self.breakers.poll(now)
    }

    pub fn conviction_state(&self) -> ConvictionState {
        self.conviction.state()
    }

    pub fn evict_stale(&self, now: DateTime<Utc>) -> Vec<String> {
        self.store.evict_stale(now)
    }

    /// Compute the composite from whatever is visible at `now`.
    pub fn read_composite(&self, now: DateTime<Utc>) -> CompositeReading {
        let _profile =
            ProfileScope::with_context("read_composite", &[("factors", serde_json::json!(self.registry.len()))]);
        let snapshot = self.store.snapshot(now);
        let result = composite::compute(&snapshot, self.registry.weights());
        let overrides = self.breakers.overrides(now);

        let (final_value, conviction) = match result.composite.value() {
            Some(base) => {
                let (scaled, outcome) = self.conviction.apply(base, now);
                (Some(apply_overrides(scaled, &overrides)), Some(outcome))
            }
            None => (None, None),
        };
        let level = self.bias.map(final_value);

        log_composite(
            result.composite.value(),
            final_value,
            level.as_str(),
            result.composite.contributors().len(),
            result.excluded.len(),
            &result.fingerprint,
        );

        CompositeReading {
            computed_at: now,
            base: result.composite,
            excluded: result.excluded,
            conviction,
            overrides,
            final_value,
            level,
            fingerprint: result.fingerprint,
        }
    }
}
