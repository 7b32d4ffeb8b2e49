//! Client runtime: relays fresh requests into the backend and finalizes
//! the ones coming back.
//!
//! A request is terminal here iff the hop before the client's own is not
//! the generator. With one client and direct generator-to-client wiring
//! this is exactly "second visit"; deeper topologies would need an
//! explicit outbound/return phase on the request instead.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use asyncflow_core::{FaultCell, Scheduler, SimError};
use asyncflow_metrics::RequestClockStore;
use tracing::trace;

use crate::actors::edge::EdgeRuntime;
use crate::mailbox::Mailbox;
use crate::request::RequestState;
use crate::scenario::{ClientNode, NodeKind};

struct ClientInner {
    id: String,
    inbox: Mailbox<RequestState>,
    out_edge: EdgeRuntime,
    rqs_clock: Rc<RequestClockStore>,
    completed: RefCell<Vec<RequestState>>,
    completed_count: Cell<u64>,
    fault: FaultCell,
}

#[derive(Clone)]
pub struct ClientRuntime {
    inner: Rc<ClientInner>,
}

impl ClientRuntime {
    pub fn new(
        config: &ClientNode,
        out_edge: EdgeRuntime,
        inbox: Mailbox<RequestState>,
        rqs_clock: Rc<RequestClockStore>,
        fault: FaultCell,
    ) -> Self {
        Self {
            inner: Rc::new(ClientInner {
                id: config.id.clone(),
                inbox,
                out_edge,
                rqs_clock,
                completed: RefCell::new(Vec::new()),
                completed_count: Cell::new(0),
                fault,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn completed_count(&self) -> u64 {
        self.inner.completed_count.get()
    }

    /// Drain the sink of terminated requests.
    #[must_use]
    pub fn take_completed(&self) -> Vec<RequestState> {
        std::mem::take(&mut *self.inner.completed.borrow_mut())
    }

    pub fn start(&self, sched: &mut Scheduler) {
        Self::forward(Rc::clone(&self.inner), sched);
    }

    fn forward(inner: Rc<ClientInner>, sched: &mut Scheduler) {
        let next = Rc::clone(&inner);
        inner.inbox.clone().get(sched, move |s, mut state| {
            state.record_hop(NodeKind::Client, &next.id, s.time());

            let previous = state.previous_hop().map(|hop| hop.node);
            match previous {
                None => {
                    next.fault.trip(SimError::Consistency {
                        entity: next.id.clone(),
                        sim_time: s.time().as_secs_f64(),
                        request: Some(state.id),
                        message: "request reached the client with no prior hop".into(),
                    });
                }
                Some(NodeKind::Generator) => {
                    trace!(client = %next.id, request = state.id, "relaying outbound");
                    next.out_edge.transport(s, state);
                }
                Some(_) => {
                    let now = s.time();
                    state.finish_time = Some(now);
                    next.rqs_clock
                        .record(state.initial_time.as_secs_f64(), now.as_secs_f64());
                    next.completed_count.set(next.completed_count.get() + 1);
                    trace!(client = %next.id, request = state.id, "request completed");
                    next.completed.borrow_mut().push(state);
                }
            }
            Self::forward(next, s);
        });
    }
}
