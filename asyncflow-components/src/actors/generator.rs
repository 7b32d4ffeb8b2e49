//! Traffic generator: the source of every request in a run.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use asyncflow_core::{Scheduler, SimError, SimRng, SimTime};
use tracing::trace;

use crate::actors::edge::EdgeRuntime;
use crate::request::RequestState;
use crate::scenario::{NodeKind, RqsGenerator};
use crate::workload::WorkloadSampler;

struct GeneratorInner {
    id: String,
    sampler: RefCell<WorkloadSampler>,
    out_edge: EdgeRuntime,
    next_request_id: Cell<u64>,
}

/// Emits a fresh [`RequestState`] at every sampled arrival and pushes it
/// across the outgoing edge toward the client.
#[derive(Clone)]
pub struct RqsGeneratorRuntime {
    inner: Rc<GeneratorInner>,
}

impl RqsGeneratorRuntime {
    pub fn new(
        config: &RqsGenerator,
        out_edge: EdgeRuntime,
        horizon_s: f64,
        rng: SimRng,
    ) -> Result<Self, SimError> {
        let sampler = WorkloadSampler::new(config, horizon_s, rng)?;
        Ok(Self {
            inner: Rc::new(GeneratorInner {
                id: config.id.clone(),
                sampler: RefCell::new(sampler),
                out_edge,
                next_request_id: Cell::new(0),
            }),
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.inner.next_request_id.get()
    }

    pub fn start(&self, sched: &mut Scheduler) {
        Self::arm(Rc::clone(&self.inner), sched);
    }

    fn arm(inner: Rc<GeneratorInner>, sched: &mut Scheduler) {
        let Some(at) = inner.sampler.borrow_mut().next_arrival() else {
            trace!(generator = %inner.id, "arrival stream exhausted");
            return;
        };
        sched.schedule_at(SimTime::from_secs_f64(at), move |s| {
            let id = inner.next_request_id.get();
            inner.next_request_id.set(id + 1);

            let mut state = RequestState::new(id, s.time());
            state.record_hop(NodeKind::Generator, &inner.id, s.time());
            trace!(generator = %inner.id, request = id, "request emitted");
            inner.out_edge.transport(s, state);

            Self::arm(inner, s);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SpikeBoard;
    use crate::mailbox::Mailbox;
    use asyncflow_core::{DistributionFamily, RVConfig};

    #[test]
    fn emits_unique_ids_with_generator_hops() {
        let target: Mailbox<RequestState> = Mailbox::unbounded();
        let out_edge = EdgeRuntime::new(
            &crate::scenario::EdgeConfig {
                id: "gen-out".into(),
                source: "gen-1".into(),
                target: "client-1".into(),
                latency: RVConfig::new(DistributionFamily::Normal, 1e-9).with_variance(0.0),
                dropout_rate: 0.0,
            },
            target.clone(),
            SpikeBoard::from_events(&[]),
            asyncflow_core::SimRng::seed_from_u64(1),
            asyncflow_core::FaultCell::new(),
        )
        .unwrap();

        let generator = RqsGeneratorRuntime::new(
            &RqsGenerator {
                id: "gen-1".into(),
                avg_active_users: RVConfig::new(DistributionFamily::Poisson, 5.0),
                avg_request_per_minute_per_user: RVConfig::new(DistributionFamily::Poisson, 120.0),
                user_sampling_window: 5,
            },
            out_edge,
            30.0,
            asyncflow_core::SimRng::seed_from_u64(1),
        )
        .unwrap();

        let mut sched = Scheduler::new();
        generator.start(&mut sched);

        let seen: Rc<RefCell<Vec<u64>>> = Rc::default();
        fn consume(
            mailbox: Mailbox<RequestState>,
            seen: Rc<RefCell<Vec<u64>>>,
            sched: &mut Scheduler,
        ) {
            let next_box = mailbox.clone();
            mailbox.get(sched, move |s, state| {
                assert_eq!(state.history.len(), 1);
                assert_eq!(state.history[0].node, NodeKind::Generator);
                seen.borrow_mut().push(state.id);
                consume(next_box, seen, s);
            });
        }
        consume(target, Rc::clone(&seen), &mut sched);

        sched.run_until(SimTime::from_secs(30));

        let seen = seen.borrow();
        assert!(!seen.is_empty());
        assert_eq!(generator.emitted(), seen.len() as u64);
        let expected: Vec<u64> = (0..seen.len() as u64).collect();
        assert_eq!(*seen, expected);
    }
}
