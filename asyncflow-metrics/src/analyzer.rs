//! Post-run analysis of a completed simulation.
//!
//! The runner hands a [`SimulationResults`] back to the caller. Latency
//! statistics and the default throughput series are computed lazily and
//! cached; the sampled series are returned as recorded, with the time
//! coordinate of index `i` being `i * sample_period_s` (first sample one
//! period in).

use std::cell::OnceCell;
use std::collections::HashMap;

use hdrhistogram::Histogram;
use serde::Serialize;
use uuid::Uuid;

use crate::clock::RequestClock;
use crate::names::SampledMetricName;

const DEFAULT_THROUGHPUT_WINDOW_S: f64 = 1.0;

/// Summary latency statistics over all completed requests, in seconds.
///
/// Percentiles are exact, taken from the sorted latency array. All fields
/// are zero when no request completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
}

impl LatencyStats {
    fn from_latencies(mut values: Vec<f64>) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        values.sort_by(|a, b| a.partial_cmp(b).expect("latencies are finite"));
        let count = values.len();
        let sum: f64 = values.iter().sum();
        let mean = sum / count as f64;
        let variance =
            values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;

        let percentile = |p: f64| -> f64 {
            let index = ((count as f64 - 1.0) * p).round() as usize;
            values[index.min(count - 1)]
        };

        Self {
            count,
            mean,
            median: percentile(0.5),
            std_dev: variance.sqrt(),
            p95: percentile(0.95),
            p99: percentile(0.99),
            min: values[0],
            max: values[count - 1],
        }
    }
}

/// Throughput over fixed windows tiling `[0, total_simulation_time]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThroughputSeries {
    pub window_s: f64,
    /// Right edge of each window, in seconds.
    pub timestamps: Vec<f64>,
    /// Completed requests per second within each window.
    pub values: Vec<f64>,
}

impl ThroughputSeries {
    /// Total completions covered by the series.
    #[must_use]
    pub fn total_requests(&self) -> f64 {
        self.values.iter().map(|rps| rps * self.window_s).sum()
    }
}

/// Everything a finished run exposes to the caller.
pub struct SimulationResults {
    run_id: Uuid,
    completed: Vec<RequestClock>,
    sampled: HashMap<SampledMetricName, HashMap<String, Vec<f64>>>,
    servers_order: Vec<String>,
    sample_period_s: f64,
    total_simulation_time: f64,
    latency_cache: OnceCell<LatencyStats>,
    throughput_cache: OnceCell<ThroughputSeries>,
}

impl SimulationResults {
    #[must_use]
    pub fn new(
        completed: Vec<RequestClock>,
        sampled: HashMap<SampledMetricName, HashMap<String, Vec<f64>>>,
        servers_order: Vec<String>,
        sample_period_s: f64,
        total_simulation_time: f64,
    ) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            completed,
            sampled,
            servers_order,
            sample_period_s,
            total_simulation_time,
            latency_cache: OnceCell::new(),
            throughput_cache: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    #[must_use]
    pub fn completed_requests(&self) -> &[RequestClock] {
        &self.completed
    }

    #[must_use]
    pub fn sample_period_s(&self) -> f64 {
        self.sample_period_s
    }

    /// Latency summary over all completed requests. Cached.
    pub fn latency_stats(&self) -> LatencyStats {
        *self.latency_cache.get_or_init(|| {
            LatencyStats::from_latencies(
                self.completed.iter().map(RequestClock::latency).collect(),
            )
        })
    }

    /// Throughput over windows of `window_s` (default 1.0 s). The default
    /// window is cached; explicit windows are recomputed on demand.
    pub fn throughput_series(&self, window_s: Option<f64>) -> ThroughputSeries {
        match window_s {
            None => self
                .throughput_cache
                .get_or_init(|| self.compute_throughput(DEFAULT_THROUGHPUT_WINDOW_S))
                .clone(),
            Some(window) => self.compute_throughput(window),
        }
    }

    fn compute_throughput(&self, window_s: f64) -> ThroughputSeries {
        let mut finish_times: Vec<f64> =
            self.completed.iter().map(|clock| clock.finish).collect();
        finish_times.sort_by(|a, b| a.partial_cmp(b).expect("finish times are finite"));

        let mut timestamps = Vec::new();
        let mut values = Vec::new();
        let mut idx = 0usize;
        let mut window_end = window_s;

        // Tolerate the last window edge landing within rounding of the
        // horizon so the tiling always covers [0, total].
        while window_end <= self.total_simulation_time + window_s * 1e-9 {
            let mut count = 0usize;
            while idx < finish_times.len() && finish_times[idx] <= window_end {
                count += 1;
                idx += 1;
            }
            timestamps.push(window_end);
            values.push(count as f64 / window_s);
            window_end += window_s;
        }

        ThroughputSeries {
            window_s,
            timestamps,
            values,
        }
    }

    /// All sampled series: `metric -> entity id -> values`.
    #[must_use]
    pub fn sampled_metrics(&self) -> &HashMap<SampledMetricName, HashMap<String, Vec<f64>>> {
        &self.sampled
    }

    /// One entity's series for one metric, if recorded.
    #[must_use]
    pub fn get_series(&self, metric: SampledMetricName, entity_id: &str) -> Option<&[f64]> {
        self.sampled
            .get(&metric)
            .and_then(|per_entity| per_entity.get(entity_id))
            .map(Vec::as_slice)
    }

    /// Server ids in topology declaration order.
    #[must_use]
    pub fn list_server_ids(&self) -> &[String] {
        &self.servers_order
    }

    /// Recorded latencies as a microsecond-resolution histogram.
    pub fn latency_histogram(&self) -> Histogram<u64> {
        let mut histogram =
            Histogram::new(3).expect("three significant digits is a valid configuration");
        for clock in &self.completed {
            let micros = (clock.latency() * 1_000_000.0).max(0.0) as u64;
            // Values beyond the auto-resized range are dropped, never fatal.
            let _ = histogram.record(micros);
        }
        histogram
    }

    /// Force every lazy computation, mirroring a full post-run report.
    pub fn process_all_metrics(&self) {
        let _ = self.latency_stats();
        let _ = self.throughput_series(None);
    }
}
