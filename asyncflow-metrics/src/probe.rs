//! Live counters shared between actors and the sampled collector.
//!
//! Actors mutate a [`Gauge`] as part of their (atomic, between-suspension)
//! state transitions; the collector reads it at each sampling tick. The
//! runtime is single-threaded, so a plain `Cell` is enough.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::collections::HashSet;
use std::rc::Rc;

use thiserror::Error;

use crate::names::SampledMetricName;

/// A shared scalar counter. Cheap to clone; all clones alias one value.
#[derive(Clone, Debug, Default)]
pub struct Gauge {
    value: Rc<Cell<f64>>,
}

#[derive(Debug, Error)]
#[error("gauge underflow: {current} - {delta} < 0")]
pub struct GaugeUnderflow {
    pub current: f64,
    pub delta: f64,
}

impl Gauge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self) -> f64 {
        self.value.get()
    }

    pub fn add(&self, delta: f64) {
        self.value.set(self.value.get() + delta);
    }

    pub fn inc(&self) {
        self.add(1.0);
    }

    /// Subtract, failing instead of going negative. A failure here means a
    /// double-release somewhere and is fatal to the run.
    pub fn checked_sub(&self, delta: f64) -> Result<(), GaugeUnderflow> {
        let current = self.value.get();
        let next = current - delta;
        if next < 0.0 {
            return Err(GaugeUnderflow { current, delta });
        }
        self.value.set(next);
        Ok(())
    }

    pub fn checked_dec(&self) -> Result<(), GaugeUnderflow> {
        self.checked_sub(1.0)
    }
}

/// Append-only time series for one entity, keyed by metric name.
///
/// Only metrics enabled in the scenario settings get a slot; recording an
/// unknown key is an O(1) no-op, which is how optional metrics stay free.
#[derive(Debug, Default)]
pub struct SampleSet {
    series: RefCell<HashMap<SampledMetricName, Vec<f64>>>,
}

impl SampleSet {
    /// Build a sample set holding the intersection of `enabled` with the
    /// metric keys this entity kind supports.
    #[must_use]
    pub fn with_enabled(
        enabled: &HashSet<SampledMetricName>,
        supported: &[SampledMetricName],
    ) -> Rc<Self> {
        let series = supported
            .iter()
            .filter(|key| enabled.contains(key))
            .map(|key| (*key, Vec::new()))
            .collect();
        Rc::new(Self {
            series: RefCell::new(series),
        })
    }

    pub fn is_enabled(&self, key: SampledMetricName) -> bool {
        self.series.borrow().contains_key(&key)
    }

    pub fn record(&self, key: SampledMetricName, value: f64) {
        if let Some(values) = self.series.borrow_mut().get_mut(&key) {
            values.push(value);
        }
    }

    pub fn len(&self, key: SampledMetricName) -> usize {
        self.series.borrow().get(&key).map_or(0, Vec::len)
    }

    /// Copy out all recorded series.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<SampledMetricName, Vec<f64>> {
        self.series.borrow().clone()
    }
}

/// Collector-side view of one server's live counters.
pub struct ServerProbe {
    pub id: String,
    pub ready_queue: Gauge,
    pub io_sleep: Gauge,
    pub ram_in_use: Gauge,
    pub samples: Rc<SampleSet>,
}

/// Collector-side view of one edge's live counters.
pub struct EdgeProbe {
    pub id: String,
    pub connections: Gauge,
    pub samples: Rc<SampleSet>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_aliases_between_clones() {
        let a = Gauge::new();
        let b = a.clone();
        a.inc();
        b.add(2.0);
        assert_eq!(a.get(), 3.0);
        assert!(b.checked_sub(3.0).is_ok());
        assert_eq!(a.get(), 0.0);
    }

    #[test]
    fn gauge_underflow_is_detected() {
        let g = Gauge::new();
        g.inc();
        assert!(g.checked_dec().is_ok());
        let err = g.checked_dec().unwrap_err();
        assert_eq!(err.current, 0.0);
        // Value untouched after a failed subtraction.
        assert_eq!(g.get(), 0.0);
    }

    #[test]
    fn disabled_metrics_are_not_recorded() {
        let enabled = [SampledMetricName::RamInUse].into_iter().collect();
        let set = SampleSet::with_enabled(&enabled, &SampledMetricName::SERVER_METRICS);

        set.record(SampledMetricName::RamInUse, 128.0);
        set.record(SampledMetricName::ReadyQueueLen, 1.0);

        assert!(set.is_enabled(SampledMetricName::RamInUse));
        assert!(!set.is_enabled(SampledMetricName::ReadyQueueLen));
        assert_eq!(set.len(SampledMetricName::RamInUse), 1);
        assert_eq!(set.len(SampledMetricName::ReadyQueueLen), 0);

        let snapshot = set.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&SampledMetricName::RamInUse], vec![128.0]);
    }
}
