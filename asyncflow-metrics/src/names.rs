//! Canonical metric identifiers.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Metrics sampled on a fixed period by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampledMetricName {
    /// Handlers currently holding a CPU token, per server.
    ReadyQueueLen,
    /// Handlers parked in an I/O wait without a CPU token, per server.
    EventLoopIoSleep,
    /// Megabytes currently reserved, per server.
    RamInUse,
    /// In-flight deliveries, per edge.
    EdgeConcurrentConnection,
}

impl SampledMetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampledMetricName::ReadyQueueLen => "ready_queue_len",
            SampledMetricName::EventLoopIoSleep => "event_loop_io_sleep",
            SampledMetricName::RamInUse => "ram_in_use",
            SampledMetricName::EdgeConcurrentConnection => "edge_concurrent_connection",
        }
    }

    /// Sampled metrics every scenario must enable.
    pub const MANDATORY: [SampledMetricName; 4] = [
        SampledMetricName::ReadyQueueLen,
        SampledMetricName::EventLoopIoSleep,
        SampledMetricName::RamInUse,
        SampledMetricName::EdgeConcurrentConnection,
    ];

    pub const SERVER_METRICS: [SampledMetricName; 3] = [
        SampledMetricName::ReadyQueueLen,
        SampledMetricName::EventLoopIoSleep,
        SampledMetricName::RamInUse,
    ];

    pub const EDGE_METRICS: [SampledMetricName; 1] =
        [SampledMetricName::EdgeConcurrentConnection];

    pub fn mandatory_set() -> HashSet<SampledMetricName> {
        Self::MANDATORY.into_iter().collect()
    }
}

impl fmt::Display for SampledMetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-event (not sampled) metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventMetricName {
    /// `(start, finish)` pair recorded at the terminal client.
    RqsClock,
}

impl EventMetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventMetricName::RqsClock => "rqs_clock",
        }
    }

    pub const MANDATORY: [EventMetricName; 1] = [EventMetricName::RqsClock];

    pub fn mandatory_set() -> HashSet<EventMetricName> {
        Self::MANDATORY.into_iter().collect()
    }
}

impl fmt::Display for EventMetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
