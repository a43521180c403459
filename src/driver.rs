//! JSON-lines command protocol used by the `biasengine` binary.
//!
//! One command per line on input, one JSON result per line on output:
//!
//! ```text
//! {"type":"factor","id":"index_trend","value":0.4}
//! {"type":"factor","id":"credit_spreads","value":null}
//! {"type":"volatility","value":1.7}
//! {"type":"trigger","category":"downside","severity":2,"trigger_id":"index_down_major"}
//! {"type":"condition","trigger_id":"index_down_major","cleared":true}
//! {"type":"decision","category":"downside","decision":"accept","by":"desk"}
//! {"type":"read"}
//! {"type":"status"}
//! ```
//!
//! Timestamps are optional RFC3339 strings; missing ones default to `now`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::breaker::condition::ConditionBoard;
use crate::breaker::{Decision, Outcome};
use crate::engine::BiasEngine;
use crate::factor::store::UpdateOutcome;
use crate::factor::Score;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Factor {
        id: String,
        value: Option<f64>,
        ts: Option<DateTime<Utc>>,
    },
    Volatility {
        value: f64,
        ts: Option<DateTime<Utc>>,
    },
    Trigger {
        category: String,
        severity: u8,
        trigger_id: String,
        ts: Option<DateTime<Utc>>,
    },
    Condition {
        trigger_id: String,
        cleared: bool,
        ts: Option<DateTime<Utc>>,
    },
    Decision {
        category: String,
        decision: Decision,
        by: String,
    },
    Read,
    Status,
}

pub fn parse_command(line: &str) -> Result<Command, serde_json::Error> {
    serde_json::from_str(line)
}

fn outcome_json(outcome: Outcome) -> Value {
    match outcome {
        Outcome::Applied { from, to } => json!({"result": "applied", "from": from, "to": to}),
        Outcome::Ignored(reason) => json!({"result": "ignored", "reason": reason}),
        Outcome::Dropped(reason) => json!({"result": "dropped", "reason": reason}),
    }
}

fn update_json(outcome: UpdateOutcome) -> Value {
    let result = match outcome {
        UpdateOutcome::Stored => "stored",
        UpdateOutcome::StoredAsUnknown => "stored_as_unknown",
        UpdateOutcome::UnknownFactor => "unknown_factor",
    };
    json!({ "result": result })
}

/// Apply one command. Every command yields a JSON reply.
pub fn handle(engine: &BiasEngine, conditions: &ConditionBoard, cmd: Command, now: DateTime<Utc>) -> Value {
    match cmd {
        Command::Factor { id, value, ts } => {
            update_json(engine.update_factor(&id, Score::from(value), ts.unwrap_or(now)))
        }
        Command::Volatility { value, ts } => {
            engine.update_volatility(value, ts.unwrap_or(now));
            json!({ "result": "stored" })
        }
        Command::Trigger { category, severity, trigger_id, ts } => {
            outcome_json(engine.trigger(&category, severity, &trigger_id, ts.unwrap_or(now)))
        }
        Command::Condition { trigger_id, cleared, ts } => {
            conditions.report(&trigger_id, cleared, ts.unwrap_or(now));
            json!({ "result": "stored" })
        }
        Command::Decision { category, decision, by } => {
            outcome_json(engine.decide(&category, decision, &by, now))
        }
        Command::Read => json!({ "type": "composite", "reading": engine.read_composite(now) }),
        Command::Status => json!({ "type": "status", "breakers": engine.breaker_status(now) }),
    }
}
