//! Random-variable configuration and sampling.
//!
//! A scenario describes stochastic quantities (edge latency, active users,
//! per-user request rate) as an [`RVConfig`]: a distribution family plus a
//! mean and optional variance. [`RvSampler`] resolves the configuration
//! into a concrete `rand_distr` distribution once, at build time, so the
//! hot path samples without re-validating parameters.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rng::SimRng;

/// Supported distribution families, serialized as canonical snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionFamily {
    Poisson,
    Normal,
    LogNormal,
    Exponential,
    Uniform,
}

impl DistributionFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionFamily::Poisson => "poisson",
            DistributionFamily::Normal => "normal",
            DistributionFamily::LogNormal => "log_normal",
            DistributionFamily::Exponential => "exponential",
            DistributionFamily::Uniform => "uniform",
        }
    }
}

/// Configuration of a scalar random variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RVConfig {
    pub distribution: DistributionFamily,
    pub mean: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variance: Option<f64>,
}

impl RVConfig {
    pub fn new(distribution: DistributionFamily, mean: f64) -> Self {
        Self {
            distribution,
            mean,
            variance: None,
        }
    }

    pub fn with_variance(mut self, variance: f64) -> Self {
        self.variance = Some(variance);
        self
    }

    /// Spread parameter handed to the underlying distribution; absent
    /// variance means a degenerate (zero-spread) draw.
    pub fn spread(&self) -> f64 {
        self.variance.unwrap_or(0.0)
    }
}

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("distribution `{family}` rejects mean={mean}, variance={variance:?}: {message}")]
    InvalidParameters {
        family: &'static str,
        mean: f64,
        variance: Option<f64>,
        message: String,
    },
}

/// A resolved sampler for one [`RVConfig`].
#[derive(Debug, Clone)]
pub enum RvSampler {
    Poisson(rand_distr::Poisson<f64>),
    /// Normal draws are floored at zero on sampling.
    Normal(rand_distr::Normal<f64>),
    LogNormal(rand_distr::LogNormal<f64>),
    Exponential(rand_distr::Exp<f64>),
    /// Unit uniform over `[0, 1)`.
    Uniform,
}

impl RvSampler {
    pub fn build(rv: &RVConfig) -> Result<Self, SamplerError> {
        let invalid = |message: String| SamplerError::InvalidParameters {
            family: rv.distribution.as_str(),
            mean: rv.mean,
            variance: rv.variance,
            message,
        };

        match rv.distribution {
            DistributionFamily::Poisson => rand_distr::Poisson::new(rv.mean)
                .map(RvSampler::Poisson)
                .map_err(|e| invalid(e.to_string())),
            DistributionFamily::Normal => rand_distr::Normal::new(rv.mean, rv.spread())
                .map(RvSampler::Normal)
                .map_err(|e| invalid(e.to_string())),
            DistributionFamily::LogNormal => rand_distr::LogNormal::new(rv.mean, rv.spread())
                .map(RvSampler::LogNormal)
                .map_err(|e| invalid(e.to_string())),
            DistributionFamily::Exponential => {
                if rv.mean <= 0.0 {
                    return Err(invalid("exponential mean must be positive".into()));
                }
                rand_distr::Exp::new(1.0 / rv.mean)
                    .map(RvSampler::Exponential)
                    .map_err(|e| invalid(e.to_string()))
            }
            DistributionFamily::Uniform => Ok(RvSampler::Uniform),
        }
    }

    /// Draw one value. Never negative.
    pub fn sample(&self, rng: &SimRng) -> f64 {
        match self {
            RvSampler::Poisson(dist) => rng.sample(dist),
            RvSampler::Normal(dist) => {
                let value: f64 = rng.sample(dist);
                value.max(0.0)
            }
            RvSampler::LogNormal(dist) => rng.sample(dist),
            RvSampler::Exponential(dist) => rng.sample(dist),
            RvSampler::Uniform => rng.uniform_unit(),
        }
    }
}

/// Inverse-CDF exponential gap for a process of rate `lambda` (events/s).
///
/// The unit-uniform draw is floored at [`crate::rng::UNIFORM_EPSILON`] so
/// the logarithm stays finite.
pub fn exponential_gap(rng: &SimRng, lambda: f64) -> f64 {
    debug_assert!(lambda > 0.0, "rate must be positive");
    let u = rng.uniform_unit();
    -(1.0 - u).ln() / lambda
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> SimRng {
        SimRng::seed_from_u64(2024)
    }

    #[test]
    fn canonical_names_round_trip() {
        for (family, name) in [
            (DistributionFamily::Poisson, "\"poisson\""),
            (DistributionFamily::Normal, "\"normal\""),
            (DistributionFamily::LogNormal, "\"log_normal\""),
            (DistributionFamily::Exponential, "\"exponential\""),
            (DistributionFamily::Uniform, "\"uniform\""),
        ] {
            let json = serde_json::to_string(&family).unwrap();
            assert_eq!(json, name);
            let back: DistributionFamily = serde_json::from_str(&json).unwrap();
            assert_eq!(back, family);
        }
    }

    #[test]
    fn normal_sampler_truncates_at_zero() {
        let rv = RVConfig::new(DistributionFamily::Normal, 0.001).with_variance(1.0);
        let sampler = RvSampler::build(&rv).unwrap();
        let rng = rng();
        for _ in 0..2_000 {
            assert!(sampler.sample(&rng) >= 0.0);
        }
    }

    #[test]
    fn exponential_sampler_matches_mean() {
        let rv = RVConfig::new(DistributionFamily::Exponential, 0.25);
        let sampler = RvSampler::build(&rv).unwrap();
        let rng = rng();
        let n = 50_000;
        let sum: f64 = (0..n).map(|_| sampler.sample(&rng)).sum();
        let mean = sum / n as f64;
        assert!((mean - 0.25).abs() < 0.01, "empirical mean {mean}");
    }

    #[test]
    fn exponential_gap_has_rate_mean() {
        let rng = rng();
        let lambda = 20.0;
        let n = 50_000;
        let sum: f64 = (0..n).map(|_| exponential_gap(&rng, lambda)).sum();
        let mean = sum / n as f64;
        assert!((mean - 1.0 / lambda).abs() < 0.005, "empirical mean {mean}");
    }

    #[test]
    fn degenerate_parameters_are_rejected() {
        let rv = RVConfig::new(DistributionFamily::Exponential, 0.0);
        assert!(RvSampler::build(&rv).is_err());

        let rv = RVConfig::new(DistributionFamily::Normal, 1.0).with_variance(-1.0);
        assert!(RvSampler::build(&rv).is_err());
    }
}
