//! Composite → discrete bias level.
//!
//! Both sides of zero are cut by the same two magnitudes, so a boundary on
//! the bearish side is always the exact mirror of the bullish one.

use serde::Serialize;

use crate::config::invalid;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasLevel {
    StrongBearish = 1,
    Bearish = 2,
    Neutral = 3,
    Bullish = 4,
    StrongBullish = 5,
}

impl BiasLevel {
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BiasLevel::StrongBearish => "strong_bearish",
            BiasLevel::Bearish => "bearish",
            BiasLevel::Neutral => "neutral",
            BiasLevel::Bullish => "bullish",
            BiasLevel::StrongBullish => "strong_bullish",
        }
    }

    /// Signed distance from neutral: -2..=2
    pub fn offset(&self) -> i8 {
        self.rank() as i8 - 3
    }
}

/// Level or an explicit absence of one. `Unknown` is never folded into
/// `Neutral`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "level", rename_all = "snake_case")]
pub enum BiasReading {
    Level(BiasLevel),
    Unknown,
}

impl BiasReading {
    pub fn as_str(&self) -> &'static str {
        match self {
            BiasReading::Level(l) => l.as_str(),
            BiasReading::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiasThresholds {
    /// |composite| at which a mild bias begins
    pub mild: f64,
    /// |composite| at which a strong bias begins
    pub strong: f64,
}

impl Default for BiasThresholds {
    fn default() -> Self {
        Self { mild: 0.20, strong: 0.60 }
    }
}

impl BiasThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.mild > 0.0 && self.mild < self.strong && self.strong <= 1.0) {
            return Err(invalid(
                "BIAS_MILD",
                format!("need 0 < mild ({}) < strong ({}) <= 1", self.mild, self.strong),
            ));
        }
        Ok(())
    }

    /// ≤ -strong → 1, ≤ -mild → 2, < mild → 3, < strong → 4, else 5.
    pub fn level(&self, composite: f64) -> BiasLevel {
        if composite <= -self.strong {
            BiasLevel::StrongBearish
        } else if composite <= -self.mild {
            BiasLevel::Bearish
        } else if composite < self.mild {
            BiasLevel::Neutral
        } else if composite < self.strong {
            BiasLevel::Bullish
        } else {
            BiasLevel::StrongBullish
        }
    }

    /// Level for a composite, or `Unknown` when there is none.
    pub fn map(&self, composite: Option<f64>) -> BiasReading {
        match composite {
            Some(v) if v.is_finite() => BiasReading::Level(self.level(v)),
            _ => BiasReading::Unknown,
        }
    }
}
