//! Directed network link between two actors.
//!
//! `transport` never blocks the caller: it spawns a delivery task bound to
//! the request. The delivery draws dropout, samples the link latency, adds
//! whatever spike offset is active at scheduling time, and finally puts
//! the request into the target's mailbox.

use std::rc::Rc;

use asyncflow_core::{FaultCell, RvSampler, Scheduler, SimError, SimRng, SimTime};
use asyncflow_metrics::Gauge;
use tracing::trace;

use crate::events::SpikeBoard;
use crate::mailbox::Mailbox;
use crate::request::RequestState;
use crate::scenario::EdgeConfig;

struct EdgeInner {
    id: String,
    dropout_rate: f64,
    latency: RvSampler,
    target: Mailbox<RequestState>,
    connections: Gauge,
    spikes: Rc<SpikeBoard>,
    rng: SimRng,
    fault: FaultCell,
}

/// Clonable handle to one edge. All clones share the connection counter.
#[derive(Clone)]
pub struct EdgeRuntime {
    inner: Rc<EdgeInner>,
}

impl EdgeRuntime {
    pub fn new(
        config: &EdgeConfig,
        target: Mailbox<RequestState>,
        spikes: Rc<SpikeBoard>,
        rng: SimRng,
        fault: FaultCell,
    ) -> Result<Self, SimError> {
        let latency = RvSampler::build(&config.latency).map_err(|e| {
            SimError::validation("latency", &config.id, e.to_string())
        })?;
        Ok(Self {
            inner: Rc::new(EdgeInner {
                id: config.id.clone(),
                dropout_rate: config.dropout_rate,
                latency,
                target,
                connections: Gauge::new(),
                spikes,
                rng,
                fault,
            }),
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Live in-flight delivery counter, shared with the collector and the
    /// least-connections balancer.
    #[must_use]
    pub fn connections(&self) -> Gauge {
        self.inner.connections.clone()
    }

    /// Additive latency offset currently active on this edge.
    #[must_use]
    pub fn current_spike(&self) -> f64 {
        self.inner.spikes.offset(&self.inner.id)
    }

    /// Fire-and-forget delivery of `state` across this edge.
    pub fn transport(&self, sched: &mut Scheduler, state: RequestState) {
        let inner = Rc::clone(&self.inner);
        sched.schedule_now(move |s| Self::deliver(inner, s, state));
    }

    fn deliver(inner: Rc<EdgeInner>, sched: &mut Scheduler, mut state: RequestState) {
        inner.connections.inc();

        let draw = inner.rng.uniform_unit();
        if draw < inner.dropout_rate {
            // A dropped request is terminal: it never reaches the target.
            state.finish_time = Some(sched.time());
            trace!(edge = %inner.id, request = state.id, "delivery dropped");
            Self::settle(&inner, sched, state.id);
            return;
        }

        let base = inner.latency.sample(&inner.rng);
        let transit = base + inner.spikes.offset(&inner.id);
        trace!(edge = %inner.id, request = state.id, transit, "delivery scheduled");

        sched.schedule_in(SimTime::from_secs_f64(transit), move |s| {
            let request_id = state.id;
            let for_settle = Rc::clone(&inner);
            inner.target.put(s, state, move |s2| {
                Self::settle(&for_settle, s2, request_id);
            });
        });
    }

    fn settle(inner: &Rc<EdgeInner>, sched: &mut Scheduler, request_id: u64) {
        if inner.connections.checked_dec().is_err() {
            inner.fault.trip(SimError::Consistency {
                entity: inner.id.clone(),
                sim_time: sched.time().as_secs_f64(),
                request: Some(request_id),
                message: "concurrent connection counter underflow".into(),
            });
        }
    }
}
