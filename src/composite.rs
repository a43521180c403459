//! Renormalized weighted average over the factors that actually reported.

use std::collections::HashMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::factor::store::{ReadingState, Snapshot};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Composite {
    Value { value: f64, contributors: Vec<String> },
    /// No factor was usable. Distinct from a neutral 0.0.
    InsufficientData,
}

impl Composite {
    pub fn value(&self) -> Option<f64> {
        match self {
            Composite::Value { value, .. } => Some(*value),
            Composite::InsufficientData => None,
        }
    }

    pub fn contributors(&self) -> &[String] {
        match self {
            Composite::Value { contributors, .. } => contributors,
            Composite::InsufficientData => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exclusion {
    pub factor_id: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeResult {
    pub composite: Composite,
    pub excluded: Vec<Exclusion>,
    /// SHA-256 over the contributing (id, value, weight) triples
    pub fingerprint: String,
}

/// composite = Σ(value·weight) / Σ(weight) over contributing factors only.
pub fn compute(snapshot: &Snapshot, weights: &HashMap<String, f64>) -> CompositeResult {
    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    let mut contributors = Vec::new();
    let mut excluded = Vec::new();
    let mut hasher = Sha256::new();

    for entry in &snapshot.entries {
        let weight = weights.get(&entry.factor_id).copied();
        match (entry.state, weight) {
            (ReadingState::Fresh { value, .. }, Some(w)) if w > 0.0 => {
                weighted_sum += value * w;
                weight_sum += w;
                contributors.push(entry.factor_id.clone());
                hasher.update(entry.factor_id.as_bytes());
                hasher.update(value.to_le_bytes());
                hasher.update(w.to_le_bytes());
            }
            (ReadingState::Fresh { .. }, _) => excluded.push(Exclusion {
                factor_id: entry.factor_id.clone(),
                reason: "zero_weight",
            }),
            (state, _) => excluded.push(Exclusion {
                factor_id: entry.factor_id.clone(),
                reason: state.label(),
            }),
        }
    }

    let composite = if contributors.is_empty() || weight_sum <= 0.0 {
        Composite::InsufficientData
    } else {
        Composite::Value {
            value: (weighted_sum / weight_sum).clamp(-1.0, 1.0),
            contributors,
        }
    };

    CompositeResult {
        composite,
        excluded,
        fingerprint: hex::encode(hasher.finalize()),
    }
}
