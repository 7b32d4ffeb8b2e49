//! Hierarchical inter-arrival sampling for the traffic generator.
//!
//! Two stages: every `user_sampling_window` seconds the active user count
//! `U` is redrawn (Poisson, or Normal floored at zero), fixing the
//! aggregate rate `Λ = U · rpm / 60`; within the window, gaps are
//! exponential at rate `Λ` via the inverse CDF. A gap that would cross the
//! window boundary is discarded and the clock jumps to the boundary, where
//! `U` is resampled. Windows with no users fast-forward the same way, so
//! an idle population costs nothing.

use asyncflow_core::{RvSampler, SimError, SimRng, UNIFORM_EPSILON};

use crate::scenario::RqsGenerator;

const SECONDS_PER_MINUTE: f64 = 60.0;

/// Incremental sampler producing absolute arrival times in seconds.
pub struct WorkloadSampler {
    users: RvSampler,
    rate_per_user_s: f64,
    window_s: f64,
    horizon_s: f64,
    rng: SimRng,
    now: f64,
    window_end: f64,
    lambda: f64,
}

impl WorkloadSampler {
    pub fn new(
        config: &RqsGenerator,
        horizon_s: f64,
        rng: SimRng,
    ) -> Result<Self, SimError> {
        let users = RvSampler::build(&config.avg_active_users).map_err(|e| {
            SimError::validation("avg_active_users", &config.id, e.to_string())
        })?;
        Ok(Self {
            users,
            rate_per_user_s: config.avg_request_per_minute_per_user.mean / SECONDS_PER_MINUTE,
            window_s: f64::from(config.user_sampling_window),
            horizon_s,
            rng,
            now: 0.0,
            window_end: 0.0,
            lambda: 0.0,
        })
    }

    /// Aggregate rate of the current window, requests per second.
    #[must_use]
    pub fn current_rate(&self) -> f64 {
        self.lambda
    }

    /// Absolute time of the next arrival, or `None` once the horizon is
    /// reached.
    pub fn next_arrival(&mut self) -> Option<f64> {
        while self.now < self.horizon_s {
            if self.now >= self.window_end {
                self.window_end = self.now + self.window_s;
                let users = self.users.sample(&self.rng) as u64;
                self.lambda = users as f64 * self.rate_per_user_s;
            }

            if self.lambda <= 0.0 {
                self.now = self.window_end;
                continue;
            }

            let u = self.rng.uniform_unit().max(UNIFORM_EPSILON);
            let gap = -(1.0 - u).ln() / self.lambda;

            if self.now + gap > self.horizon_s {
                return None;
            }
            if self.now + gap >= self.window_end {
                // Discard the gap and resample the user count.
                self.now = self.window_end;
                continue;
            }

            self.now += gap;
            return Some(self.now);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asyncflow_core::{DistributionFamily, RVConfig};

    fn config(users: RVConfig, rpm: f64, window: u32) -> RqsGenerator {
        RqsGenerator {
            id: "gen-1".into(),
            avg_active_users: users,
            avg_request_per_minute_per_user: RVConfig::new(DistributionFamily::Poisson, rpm),
            user_sampling_window: window,
        }
    }

    fn drain(sampler: &mut WorkloadSampler) -> Vec<f64> {
        let mut arrivals = Vec::new();
        while let Some(at) = sampler.next_arrival() {
            arrivals.push(at);
        }
        arrivals
    }

    #[test]
    fn arrivals_are_monotonic_and_within_horizon() {
        let config = config(
            RVConfig::new(DistributionFamily::Poisson, 10.0),
            60.0,
            5,
        );
        let mut sampler =
            WorkloadSampler::new(&config, 120.0, SimRng::seed_from_u64(42)).unwrap();
        let arrivals = drain(&mut sampler);

        assert!(!arrivals.is_empty());
        assert!(arrivals.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(arrivals.iter().all(|at| (0.0..=120.0).contains(at)));
    }

    #[test]
    fn long_run_rate_approaches_expected_value() {
        // E[U] * rpm / 60 = 20 * 30 / 60 = 10 req/s.
        let config = config(
            RVConfig::new(DistributionFamily::Poisson, 20.0),
            30.0,
            10,
        );
        let horizon = 2_000.0;
        let mut sampler =
            WorkloadSampler::new(&config, horizon, SimRng::seed_from_u64(7)).unwrap();
        let arrivals = drain(&mut sampler);

        let rate = arrivals.len() as f64 / horizon;
        assert!(
            (rate - 10.0).abs() / 10.0 < 0.05,
            "empirical rate {rate} too far from 10"
        );
    }

    #[test]
    fn normal_user_population_also_converges() {
        let config = config(
            RVConfig::new(DistributionFamily::Normal, 12.0).with_variance(2.0),
            60.0,
            5,
        );
        let horizon = 1_000.0;
        let mut sampler =
            WorkloadSampler::new(&config, horizon, SimRng::seed_from_u64(11)).unwrap();
        let arrivals = drain(&mut sampler);

        // Truncation at zero biases the mean slightly; stay loose.
        let rate = arrivals.len() as f64 / horizon;
        assert!((rate - 12.0).abs() / 12.0 < 0.1, "empirical rate {rate}");
    }

    #[test]
    fn zero_user_windows_fast_forward() {
        // Mean so small that most windows draw zero users.
        let config = config(
            RVConfig::new(DistributionFamily::Poisson, 1e-6),
            60.0,
            1,
        );
        let mut sampler =
            WorkloadSampler::new(&config, 100.0, SimRng::seed_from_u64(3)).unwrap();
        let arrivals = drain(&mut sampler);
        assert!(arrivals.len() < 5, "got {} arrivals", arrivals.len());
    }

    #[test]
    fn same_seed_reproduces_the_stream() {
        let config = config(
            RVConfig::new(DistributionFamily::Poisson, 5.0),
            60.0,
            10,
        );
        let mut a = WorkloadSampler::new(&config, 200.0, SimRng::seed_from_u64(9)).unwrap();
        let mut b = WorkloadSampler::new(&config, 200.0, SimRng::seed_from_u64(9)).unwrap();
        assert_eq!(drain(&mut a), drain(&mut b));
    }
}
