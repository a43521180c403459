use thiserror::Error;

/// Configuration errors. These are fatal: an engine is never built from a
/// registry or config that produced one.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("duplicate factor id: {0}")]
    DuplicateFactor(String),
    #[error("factor {id}: weight {weight} outside [0, 1]")]
    WeightOutOfRange { id: String, weight: f64 },
    #[error("factor {id}: freshness window must be positive")]
    InvalidTtl { id: String },
    #[error("factor weights sum to {sum:.6}, expected 1.0 (tolerance {tolerance:e})")]
    WeightSum { sum: f64, tolerance: f64 },
    #[error("no factors registered")]
    EmptyRegistry,
    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },
    #[error("breaker policy for {category} severity {severity}: {reason}")]
    InvalidPolicy {
        category: String,
        severity: u8,
        reason: String,
    },
}
