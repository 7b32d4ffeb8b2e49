//! Metric collection and post-run analysis for AsyncFlow simulations.
//!
//! Three pieces cooperate across a run:
//!
//! - [`Gauge`]s are live counters owned by the actor runtimes (queue
//!   lengths, reserved RAM, in-flight connections).
//! - The [`SampledMetricCollector`] snapshots every enabled gauge into a
//!   [`SampleSet`] on a fixed period, and the [`RequestClockStore`]
//!   accumulates per-request `(start, finish)` pairs at the terminal
//!   client.
//! - After the run, [`SimulationResults`] computes latency statistics and
//!   throughput windows lazily and serves the raw series back to callers.

pub mod analyzer;
pub mod clock;
pub mod collector;
pub mod names;
pub mod probe;

pub use analyzer::{LatencyStats, SimulationResults, ThroughputSeries};
pub use clock::{RequestClock, RequestClockStore};
pub use collector::SampledMetricCollector;
pub use names::{EventMetricName, SampledMetricName};
pub use probe::{EdgeProbe, Gauge, GaugeUnderflow, SampleSet, ServerProbe};
