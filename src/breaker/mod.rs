//! Circuit breakers: per-category override state machines.
//!
//! ```text
//!            trigger (any severity)
//!  Inactive ───────────────────────► Active ◄──┐ higher severity
//!     ▲                                │  └────┘ (timer reset)
//!     │ accept          min duration   │
//!     │                 AND condition  ▼
//!     └──────────────────────────── PendingReset
//!                   reject (timer reset) ──► Active
//! ```
//!
//! Lower or equal severity triggers never weaken an active override. Decay
//! is polled on every read; there are no timers to cancel.

pub mod board;
pub mod condition;
pub mod machine;
pub mod notify;
pub mod policy;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Downside,
    Upside,
    Volatility,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Downside, Category::Upside, Category::Volatility];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Downside => "downside",
            Category::Upside => "upside",
            Category::Volatility => "volatility",
        }
    }

    fn index(&self) -> usize {
        match self {
            Category::Downside => 0,
            Category::Upside => 1,
            Category::Volatility => 2,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "downside" => Ok(Category::Downside),
            "upside" => Ok(Category::Upside),
            "volatility" => Ok(Category::Volatility),
            other => Err(format!("unknown breaker category: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Inactive,
    Active,
    PendingReset,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Inactive => "inactive",
            Status::Active => "active",
            Status::PendingReset => "pending_reset",
        }
    }

    /// Overrides stay in force until an operator accepts the reset.
    pub fn applies_override(&self) -> bool {
        matches!(self, Status::Active | Status::PendingReset)
    }
}

/// How an active breaker bends the composite. The scoring modifier scales
/// first; cap and floor bound the result last.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Override {
    pub cap: Option<f64>,
    pub floor: Option<f64>,
    pub scoring_modifier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerEvent {
    pub trigger_id: String,
    pub category: Category,
    pub severity: u8,
    pub activated_at: DateTime<Utc>,
    #[serde(rename = "min_active_secs", serialize_with = "ser_secs")]
    pub min_active: Duration,
    pub effect: Override,
}

impl BreakerEvent {
    pub fn min_duration_elapsed(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.activated_at) >= self.min_active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept" | "accepted" => Ok(Decision::Accept),
            "reject" | "rejected" => Ok(Decision::Reject),
            other => Err(format!("unknown decision: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRecord {
    pub decision: Decision,
    pub by: String,
    pub at: DateTime<Utc>,
}

/// Result of an externally requested transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied { from: Status, to: Status },
    /// Valid input that the state machine declined (downgrade, wrong state)
    Ignored(&'static str),
    /// Input that could not be interpreted (unknown category, no policy)
    Dropped(&'static str),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied { .. })
    }
}

pub(crate) fn ser_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(d.num_seconds())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!("Downside".parse::<Category>(), Ok(Category::Downside));
        assert_eq!(" volatility ".parse::<Category>(), Ok(Category::Volatility));
        assert!("sideways".parse::<Category>().is_err());
    }

    #[test]
    fn test_decision_parse() {
        assert_eq!("accept".parse::<Decision>(), Ok(Decision::Accept));
        assert_eq!("REJECTED".parse::<Decision>(), Ok(Decision::Reject));
        assert!("maybe".parse::<Decision>().is_err());
    }

    #[test]
    fn test_pending_reset_keeps_override() {
        assert!(Status::Active.applies_override());
        assert!(Status::PendingReset.applies_override());
        assert!(!Status::Inactive.applies_override());
    }

    #[test]
    fn test_event_serializes_duration_as_secs() {
        let ev = BreakerEvent {
            trigger_id: "t".into(),
            category: Category::Upside,
            severity: 1,
            activated_at: DateTime::<Utc>::UNIX_EPOCH,
            min_active: Duration::hours(2),
            effect: Override { cap: None, floor: Some(0.0), scoring_modifier: 0.9 },
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["min_active_secs"], 7200);
        assert_eq!(v["category"], "upside");
    }
}
