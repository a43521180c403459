//! Factor registry with the weight-sum invariant.
//!
//! Factors are registered once through a [`RegistryBuilder`]; only a sealed
//! [`FactorRegistry`] (weights summing to 1.0 within tolerance) can back an
//! engine.

use std::collections::HashMap;

use chrono::Duration;

use super::Factor;
use crate::error::ConfigError;
use crate::logging::log_config_error;

#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    factors: Vec<Factor>,
    tolerance: f64,
}

impl RegistryBuilder {
    pub fn new(tolerance: f64) -> Self {
        Self { factors: Vec::new(), tolerance }
    }

    pub fn register(&mut self, factor: Factor) -> Result<(), ConfigError> {
        if self.factors.iter().any(|f| f.id == factor.id) {
            return Err(ConfigError::DuplicateFactor(factor.id));
        }
        if !factor.weight.is_finite() || !(0.0..=1.0).contains(&factor.weight) {
            return Err(ConfigError::WeightOutOfRange { id: factor.id, weight: factor.weight });
        }
        if factor.ttl <= Duration::zero() {
            return Err(ConfigError::InvalidTtl { id: factor.id });
        }
        self.factors.push(factor);
        Ok(())
    }

    pub fn total_weight(&self) -> f64 {
        self.factors.iter().map(|f| f.weight).sum()
    }

    /// Validate the full set and freeze it.
    pub fn seal(self) -> Result<FactorRegistry, ConfigError> {
        if self.factors.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }
        let sum = self.total_weight();
        if (sum - 1.0).abs() > self.tolerance {
            return Err(ConfigError::WeightSum { sum, tolerance: self.tolerance });
        }
        let weights = self.factors.iter().map(|f| (f.id.clone(), f.weight)).collect();
        Ok(FactorRegistry { factors: self.factors, weights })
    }
}

/// Immutable, validated factor table.
#[derive(Debug, Clone)]
pub struct FactorRegistry {
    factors: Vec<Factor>,
    weights: HashMap<String, f64>,
}

impl FactorRegistry {
    /// Register every factor and seal. Errors are logged before returning so
    /// a failed boot leaves a record.
    pub fn from_factors<I>(factors: I, tolerance: f64) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = Factor>,
    {
        let mut builder = RegistryBuilder::new(tolerance);
        let result = factors
            .into_iter()
            .try_for_each(|f| builder.register(f))
            .and_then(|_| builder.seal());
        if let Err(err) = &result {
            log_config_error("registry", &err.to_string());
        }
        result
    }

    pub fn weights(&self) -> &HashMap<String, f64> {
        &self.weights
    }

    pub fn get(&self, id: &str) -> Option<&Factor> {
        self.factors.iter().find(|f| f.id == id)
    }

    /// Factors in registration order.
    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}
