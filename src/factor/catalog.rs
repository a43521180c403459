//! Built-in factor table and JSON loading.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Duration;

use super::{Factor, FactorSpec, Horizon};

/// Default factor set. Weights sum to 1.0.
pub fn default_factors() -> Vec<Factor> {
    vec![
        // Short horizon: intraday flow and positioning
        Factor::new("tick_breadth", Horizon::Short, 0.08, Duration::hours(4)),
        Factor::new("vix_term_structure", Horizon::Short, 0.07, Duration::hours(4)),
        Factor::new("gamma_positioning", Horizon::Short, 0.07, Duration::hours(8)),
        Factor::new("options_flow", Horizon::Short, 0.08, Duration::hours(8)),
        // Medium horizon: trend and rotation
        Factor::new("index_trend", Horizon::Medium, 0.10, Duration::hours(48)),
        Factor::new("sector_rotation", Horizon::Medium, 0.08, Duration::hours(72)),
        Factor::new("credit_spreads", Horizon::Medium, 0.08, Duration::hours(72)),
        Factor::new("put_call_ratio", Horizon::Medium, 0.09, Duration::hours(48)),
        // Long horizon: macro, updated weekly to monthly
        Factor::new("yield_curve", Horizon::Long, 0.10, Duration::hours(1080)),
        Factor::new("liquidity", Horizon::Long, 0.08, Duration::hours(720)),
        Factor::new("valuation_excess", Horizon::Long, 0.07, Duration::hours(1440)),
        Factor::new("manufacturing_momentum", Horizon::Long, 0.10, Duration::hours(1080)),
    ]
}

/// Load factor definitions from a JSON array of [`FactorSpec`].
pub fn load_factors(path: impl AsRef<Path>) -> Result<Vec<Factor>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading factor file {}", path.display()))?;
    parse_factors(&content).with_context(|| format!("parsing factor file {}", path.display()))
}

pub fn parse_factors(content: &str) -> Result<Vec<Factor>> {
    let specs: Vec<FactorSpec> = serde_json::from_str(content)?;
    let factors = specs.into_iter().map(Factor::try_from).collect::<Result<Vec<_>, _>>()?;
    Ok(factors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_WEIGHT_TOLERANCE;
    use crate::error::ConfigError;
    use crate::factor::registry::FactorRegistry;

    #[test]
    fn test_default_catalog_is_valid() {
        let reg = FactorRegistry::from_factors(default_factors(), DEFAULT_WEIGHT_TOLERANCE).unwrap();
        assert_eq!(reg.len(), 12);
    }

    #[test]
    fn test_default_catalog_covers_all_horizons() {
        let factors = default_factors();
        for h in [Horizon::Short, Horizon::Medium, Horizon::Long] {
            assert!(factors.iter().any(|f| f.horizon == h), "missing {:?}", h);
        }
    }

    #[test]
    fn test_parse_factors() {
        let json = r#"[
            {"id": "a", "category": "short_horizon", "weight": 0.6, "ttl_hours": 4},
            {"id": "b", "category": "long_horizon", "weight": 0.4, "ttl_hours": 1080}
        ]"#;
        let factors = parse_factors(json).unwrap();
        assert_eq!(factors.len(), 2);
        assert_eq!(factors[1].ttl, Duration::hours(1080));
    }

    #[test]
    fn test_parse_rejects_unknown_category() {
        let json = r#"[{"id": "a", "category": "weekly", "weight": 1.0, "ttl_hours": 4}]"#;
        assert!(parse_factors(json).is_err());
    }

    #[test]
    fn test_parse_rejects_huge_ttl() {
        let json = r#"[{"id": "a", "category": "long_horizon", "weight": 1.0, "ttl_hours": 1e13}]"#;
        let err = parse_factors(json).unwrap_err();
        assert_eq!(err.downcast_ref::<ConfigError>(), Some(&ConfigError::InvalidTtl { id: "a".into() }));
    }

    #[test]
    fn test_load_factors_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factors.json");
        std::fs::write(&path, r#"[{"id": "only", "category": "medium_horizon", "weight": 1.0, "ttl_hours": 24}]"#)
            .unwrap();
        let factors = load_factors(&path).unwrap();
        assert_eq!(factors[0].id, "only");
    }
}
