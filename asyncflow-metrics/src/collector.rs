//! Periodic sampling of live counters into per-entity time series.

use std::rc::Rc;

use asyncflow_core::{Scheduler, SimTime};
use tracing::trace;

use crate::names::SampledMetricName;
use crate::probe::{EdgeProbe, ServerProbe};

/// Single periodic task that snapshots every registered counter.
///
/// The first tick fires one period after start, the last one lands on the
/// simulation horizon when the period divides it exactly, so each enabled
/// series ends up with `floor(total_time / sample_period)` entries (±1 at
/// the boundary).
pub struct SampledMetricCollector {
    servers: Vec<ServerProbe>,
    edges: Vec<EdgeProbe>,
    period: SimTime,
}

impl SampledMetricCollector {
    #[must_use]
    pub fn new(servers: Vec<ServerProbe>, edges: Vec<EdgeProbe>, period: SimTime) -> Rc<Self> {
        Rc::new(Self {
            servers,
            edges,
            period,
        })
    }

    /// Schedule the sampling loop. It reschedules itself forever; the run
    /// loop stops consuming it past the horizon.
    pub fn start(self: Rc<Self>, sched: &mut Scheduler) {
        Self::arm(self, sched);
    }

    fn arm(this: Rc<Self>, sched: &mut Scheduler) {
        let period = this.period;
        sched.schedule_in(period, move |s| {
            this.tick(s.time());
            Self::arm(this, s);
        });
    }

    fn tick(&self, now: SimTime) {
        trace!(time = %now, "sampling tick");
        for server in &self.servers {
            server
                .samples
                .record(SampledMetricName::ReadyQueueLen, server.ready_queue.get());
            server
                .samples
                .record(SampledMetricName::EventLoopIoSleep, server.io_sleep.get());
            server
                .samples
                .record(SampledMetricName::RamInUse, server.ram_in_use.get());
        }
        for edge in &self.edges {
            edge.samples.record(
                SampledMetricName::EdgeConcurrentConnection,
                edge.connections.get(),
            );
        }
    }
}
