//! Factors: the registry of weighted signals and the store of their latest
//! readings.

pub mod catalog;
pub mod registry;
pub mod store;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A factor score. Absence is explicit; there is no numeric stand-in for
/// "no data".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Score {
    Value(f64),
    Unknown,
}

impl Score {
    pub fn value(&self) -> Option<f64> {
        match self {
            Score::Value(v) => Some(*v),
            Score::Unknown => None,
        }
    }

    /// A value is usable only if finite and inside [-1, 1].
    pub fn is_in_range(&self) -> bool {
        match self {
            Score::Value(v) => v.is_finite() && (-1.0..=1.0).contains(v),
            Score::Unknown => true,
        }
    }
}

impl From<Option<f64>> for Score {
    fn from(v: Option<f64>) -> Self {
        v.map(Score::Value).unwrap_or(Score::Unknown)
    }
}

/// Time horizon a factor speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Horizon {
    #[serde(rename = "short_horizon")]
    Short,
    #[serde(rename = "medium_horizon")]
    Medium,
    #[serde(rename = "long_horizon")]
    Long,
}

impl Horizon {
    pub fn as_str(&self) -> &'static str {
        match self {
            Horizon::Short => "short_horizon",
            Horizon::Medium => "medium_horizon",
            Horizon::Long => "long_horizon",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    pub id: String,
    pub horizon: Horizon,
    pub weight: f64,
    /// Freshness window; readings older than this are treated as unknown
    pub ttl: Duration,
}

impl Factor {
    pub fn new(id: impl Into<String>, horizon: Horizon, weight: f64, ttl: Duration) -> Self {
        Self { id: id.into(), horizon, weight, ttl }
    }
}

/// On-disk shape of a factor definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorSpec {
    pub id: String,
    pub category: Horizon,
    pub weight: f64,
    pub ttl_hours: f64,
}

impl TryFrom<FactorSpec> for Factor {
    type Error = ConfigError;

    /// Fails when `ttl_hours` is not finite or does not fit a `Duration`.
    fn try_from(spec: FactorSpec) -> Result<Self, Self::Error> {
        let secs = spec.ttl_hours * 3600.0;
        let ttl = if secs.is_finite() && secs.abs() < i64::MAX as f64 {
            Duration::try_seconds(secs as i64)
        } else {
            None
        };
        match ttl {
            Some(ttl) => Ok(Factor::new(spec.id, spec.category, spec.weight, ttl)),
            None => Err(ConfigError::InvalidTtl { id: spec.id }),
        }
    }
}
