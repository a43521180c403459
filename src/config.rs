use std::str::FromStr;

use chrono::Duration;

use crate::bias::BiasThresholds;
use crate::conviction::ConvictionConfig;
use crate::error::ConfigError;

pub const DEFAULT_WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub weight_tolerance: f64,
    pub conviction: ConvictionConfig,
    pub bias: BiasThresholds,
    /// How long a reported "condition cleared" flag stays trustworthy
    pub condition_max_age: Duration,
    pub factors_path: Option<String>,
    pub journal_path: Option<String>,
    /// Breaker decay poll interval for the driver loop
    pub poll_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weight_tolerance: DEFAULT_WEIGHT_TOLERANCE,
            conviction: ConvictionConfig::default(),
            bias: BiasThresholds::default(),
            condition_max_age: Duration::minutes(30),
            factors_path: None,
            journal_path: None,
            poll_secs: 30,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Minutes from `key`, rejecting values a `Duration` cannot hold.
fn env_minutes(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    minutes(key, env_or(key, default.num_minutes()))
}

fn minutes(key: &'static str, value: i64) -> Result<Duration, ConfigError> {
    Duration::try_minutes(value).ok_or_else(|| invalid(key, format!("{} minutes out of range", value)))
}

impl EngineConfig {
    /// Read every knob from the environment, falling back to defaults for
    /// unset or unparsable values. Durations that overflow are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let c = d.conviction.clone();
        Ok(Self {
            weight_tolerance: env_or("WEIGHT_TOLERANCE", d.weight_tolerance),
            conviction: ConvictionConfig {
                activate_above: env_or("CONVICTION_ACTIVATE_ABOVE", c.activate_above),
                deactivate_below: env_or("CONVICTION_DEACTIVATE_BELOW", c.deactivate_below),
                low_below: env_or("CONVICTION_LOW_BELOW", c.low_below),
                bear_mult: env_or("CONVICTION_BEAR_MULT", c.bear_mult),
                bull_mult: env_or("CONVICTION_BULL_MULT", c.bull_mult),
                low_mult: env_or("CONVICTION_LOW_MULT", c.low_mult),
                dead_zone: env_or("CONVICTION_DEAD_ZONE", c.dead_zone),
                cache_window: env_minutes("VOL_CACHE_MINS", c.cache_window)?,
                max_reading_age: env_minutes("VOL_MAX_AGE_MINS", c.max_reading_age)?,
            },
            bias: BiasThresholds {
                mild: env_or("BIAS_MILD", d.bias.mild),
                strong: env_or("BIAS_STRONG", d.bias.strong),
            },
            condition_max_age: env_minutes("CONDITION_MAX_AGE_MINS", d.condition_max_age)?,
            factors_path: std::env::var("FACTORS_PATH").ok(),
            journal_path: std::env::var("JOURNAL_PATH").ok(),
            poll_secs: env_or("POLL_SECS", d.poll_secs),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.weight_tolerance > 0.0 && self.weight_tolerance < 0.01) {
            return Err(invalid("WEIGHT_TOLERANCE", format!("{} not in (0, 0.01)", self.weight_tolerance)));
        }
        self.conviction.validate()?;
        self.bias.validate()?;
        if self.condition_max_age <= Duration::zero() {
            return Err(invalid("CONDITION_MAX_AGE_MINS", "must be positive".to_string()));
        }
        if self.poll_secs == 0 {
            return Err(invalid("POLL_SECS", "must be positive".to_string()));
        }
        Ok(())
    }
}

pub(crate) fn invalid(key: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidSetting { key, reason }
}
