//! Composite bias engine.
//!
//! Independent, unreliable factor readings are reduced to one directional
//! composite in [-1, 1] and a five-step bias level. Missing data stays
//! explicit all the way through: a composite with no usable inputs is
//! "insufficient data" and its level is "unknown", never a neutral 0.0.
//!
//! Stages, in order:
//! - [`factor`]: registry (weights sum to 1.0) and per-factor reading store
//! - [`composite`]: renormalized weighted average
//! - [`conviction`]: volatility regime scaling with hysteresis
//! - [`breaker`]: per-category circuit breakers that scale, floor and cap
//! - [`bias`]: level mapping
//!
//! [`engine::BiasEngine`] wires the stages together.

pub mod bias;
pub mod breaker;
pub mod composite;
pub mod config;
pub mod conviction;
pub mod driver;
pub mod engine;
pub mod error;
pub mod factor;
pub mod logging;
pub mod storage;
