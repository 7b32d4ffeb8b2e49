//! Load balancer: picks an outgoing edge from the live edge set.
//!
//! The balancer only ever reads the set; the event injector is the single
//! writer. Round-robin keeps a private cursor over positions, so an edge
//! that rejoins at the tail after an outage waits its turn instead of
//! being hammered immediately. Least-connections scans the live entries
//! and breaks ties by insertion order.

use std::cell::Cell;
use std::rc::Rc;

use asyncflow_core::{FaultCell, Scheduler, SimError};
use tracing::trace;

use crate::actors::edge::EdgeRuntime;
use crate::events::LiveEdgeSet;
use crate::mailbox::Mailbox;
use crate::request::RequestState;
use crate::scenario::{LbAlgorithm, LoadBalancerNode, NodeKind};

struct LbInner {
    id: String,
    algorithm: LbAlgorithm,
    inbox: Mailbox<RequestState>,
    live_edges: LiveEdgeSet,
    rr_cursor: Cell<usize>,
    fault: FaultCell,
}

#[derive(Clone)]
pub struct LoadBalancerRuntime {
    inner: Rc<LbInner>,
}

impl LoadBalancerRuntime {
    pub fn new(
        config: &LoadBalancerNode,
        live_edges: LiveEdgeSet,
        inbox: Mailbox<RequestState>,
        fault: FaultCell,
    ) -> Self {
        Self {
            inner: Rc::new(LbInner {
                id: config.id.clone(),
                algorithm: config.algorithm,
                inbox,
                live_edges,
                rr_cursor: Cell::new(0),
                fault,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn start(&self, sched: &mut Scheduler) {
        Self::forward(Rc::clone(&self.inner), sched);
    }

    fn forward(inner: Rc<LbInner>, sched: &mut Scheduler) {
        let next = Rc::clone(&inner);
        inner.inbox.clone().get(sched, move |s, mut state| {
            state.record_hop(NodeKind::LoadBalancer, &next.id, s.time());
            match Self::select(&next) {
                Some(edge) => {
                    trace!(lb = %next.id, request = state.id, edge = %edge.id(), "routed");
                    edge.transport(s, state);
                }
                None => {
                    // Prevented by validation; an empty live set here means
                    // the scenario lied about outage coverage.
                    next.fault.trip(SimError::Configuration {
                        message: format!("load balancer `{}` has no live edges", next.id),
                        sim_time: s.time().as_secs_f64(),
                    });
                }
            }
            Self::forward(next, s);
        });
    }

    fn select(inner: &LbInner) -> Option<EdgeRuntime> {
        let live = inner.live_edges.borrow();
        if live.is_empty() {
            return None;
        }
        match inner.algorithm {
            LbAlgorithm::RoundRobin => {
                let position = inner.rr_cursor.get() % live.len();
                inner.rr_cursor.set(inner.rr_cursor.get().wrapping_add(1));
                live.nth(position).map(|(_, edge)| edge.clone())
            }
            LbAlgorithm::LeastConnection => {
                // First strictly-smaller wins, so ties keep insertion order.
                let mut best: Option<(f64, EdgeRuntime)> = None;
                for (_, edge) in live.iter() {
                    let connections = edge.connections().get();
                    let better = best
                        .as_ref()
                        .map_or(true, |(least, _)| connections < *least);
                    if better {
                        best = Some((connections, edge.clone()));
                    }
                }
                best.map(|(_, edge)| edge)
            }
        }
    }
}
