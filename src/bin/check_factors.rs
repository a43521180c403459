//! Validate a factor table before deploying it.
//!
//! Usage: check_factors [path]   (defaults to $FACTORS_PATH, then the built-in table)

use anyhow::{anyhow, Result};
use biasengine::config::EngineConfig;
use biasengine::factor::catalog::{default_factors, load_factors};
use biasengine::factor::registry::FactorRegistry;

fn main() -> Result<()> {
    let cfg = EngineConfig::from_env()?;
    let path = std::env::args().nth(1).or(cfg.factors_path.clone());
    let factors = match &path {
        Some(p) => load_factors(p)?,
        None => default_factors(),
    };

    let registry = FactorRegistry::from_factors(factors, cfg.weight_tolerance)
        .map_err(|err| anyhow!("{}: {}", path.as_deref().unwrap_or("builtin"), err))?;

    println!("{:<28} {:<16} {:>8} {:>10}", "factor", "category", "weight", "ttl_hours");
    for f in registry.factors() {
        println!(
            "{:<28} {:<16} {:>8.4} {:>10}",
            f.id,
            f.horizon.as_str(),
            f.weight,
            f.ttl.num_hours()
        );
    }
    let total: f64 = registry.weights().values().sum();
    println!("{} factors, total weight {:.6}", registry.len(), total);
    Ok(())
}
