//! Server runtime: a dispatcher that spawns one handler per request.
//!
//! Each handler reserves the endpoint's whole RAM budget up front, then
//! walks the step chain under the lazy-CPU-lock policy: one core token is
//! taken on the first CPU step after an I/O (or at the start), carried
//! across contiguous CPU steps, and returned on the next I/O step or at
//! the end. `ready_queue_len` counts handlers holding a token;
//! `io_queue_len` counts handlers parked in I/O without one. The two flags
//! driving the counters are mutually exclusive, so every transition
//! touches exactly one counter.

use std::rc::Rc;

use asyncflow_core::{FaultCell, Scheduler, SimError, SimRng, SimTime};
use asyncflow_metrics::Gauge;
use tracing::trace;

use crate::actors::edge::EdgeRuntime;
use crate::mailbox::Mailbox;
use crate::request::RequestState;
use crate::resources::{CpuTokenBucket, RamReservoir};
use crate::scenario::{NodeKind, ServerNode, StepOperation};

/// One endpoint compiled into its executable form.
struct EndpointPlan {
    name: String,
    steps: Rc<Vec<PlannedStep>>,
    total_ram_mb: u64,
}

#[derive(Debug, Clone, Copy)]
enum PlannedStep {
    Cpu(SimTime),
    Io(SimTime),
    /// Already covered by the up-front reservation; nothing at run time.
    Ram,
}

struct ServerInner {
    id: String,
    cpu: CpuTokenBucket,
    ram: RamReservoir,
    inbox: Mailbox<RequestState>,
    out_edge: EdgeRuntime,
    endpoints: Vec<EndpointPlan>,
    ready_queue: Gauge,
    io_sleep: Gauge,
    ram_in_use: Gauge,
    rng: SimRng,
    fault: FaultCell,
}

impl ServerInner {
    fn consistency_fault(&self, sched: &Scheduler, request: u64, message: String) {
        self.fault.trip(SimError::Consistency {
            entity: self.id.clone(),
            sim_time: sched.time().as_secs_f64(),
            request: Some(request),
            message,
        });
    }
}

/// Clonable handle to one server.
#[derive(Clone)]
pub struct ServerRuntime {
    inner: Rc<ServerInner>,
}

impl ServerRuntime {
    pub fn new(
        config: &ServerNode,
        out_edge: EdgeRuntime,
        inbox: Mailbox<RequestState>,
        rng: SimRng,
        fault: FaultCell,
    ) -> Self {
        let endpoints = config
            .endpoints
            .iter()
            .map(|endpoint| {
                let mut total_ram_mb = 0u64;
                let steps = endpoint
                    .steps
                    .iter()
                    .map(|step| match step.step_operation {
                        StepOperation::CpuTime(secs) => {
                            PlannedStep::Cpu(SimTime::from_secs_f64(secs))
                        }
                        StepOperation::IoWaitingTime(secs) => {
                            PlannedStep::Io(SimTime::from_secs_f64(secs))
                        }
                        StepOperation::NecessaryRam(mb) => {
                            total_ram_mb += u64::from(mb);
                            PlannedStep::Ram
                        }
                    })
                    .collect();
                EndpointPlan {
                    name: endpoint.endpoint_name.clone(),
                    steps: Rc::new(steps),
                    total_ram_mb,
                }
            })
            .collect();

        Self {
            inner: Rc::new(ServerInner {
                id: config.id.clone(),
                cpu: CpuTokenBucket::new(config.server_resources.cpu_cores),
                ram: RamReservoir::new(config.server_resources.ram_mb),
                inbox,
                out_edge,
                endpoints,
                ready_queue: Gauge::new(),
                io_sleep: Gauge::new(),
                ram_in_use: Gauge::new(),
                rng,
                fault,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn inbox(&self) -> Mailbox<RequestState> {
        self.inner.inbox.clone()
    }

    #[must_use]
    pub fn cpu(&self) -> CpuTokenBucket {
        self.inner.cpu.clone()
    }

    #[must_use]
    pub fn ram(&self) -> RamReservoir {
        self.inner.ram.clone()
    }

    #[must_use]
    pub fn ready_queue_gauge(&self) -> Gauge {
        self.inner.ready_queue.clone()
    }

    #[must_use]
    pub fn io_sleep_gauge(&self) -> Gauge {
        self.inner.io_sleep.clone()
    }

    #[must_use]
    pub fn ram_in_use_gauge(&self) -> Gauge {
        self.inner.ram_in_use.clone()
    }

    /// Arm the dispatcher loop: pull a request, spawn its handler, repeat.
    pub fn start(&self, sched: &mut Scheduler) {
        Self::dispatch(Rc::clone(&self.inner), sched);
    }

    fn dispatch(inner: Rc<ServerInner>, sched: &mut Scheduler) {
        let next = Rc::clone(&inner);
        inner.inbox.clone().get(sched, move |s, state| {
            Handler::spawn(Rc::clone(&next), s, state);
            Self::dispatch(next, s);
        });
    }
}

/// Per-request step machine. Owned by its continuation chain.
struct Handler {
    srv: Rc<ServerInner>,
    state: RequestState,
    steps: Rc<Vec<PlannedStep>>,
    total_ram_mb: u64,
    step_idx: usize,
    core_locked: bool,
    in_io_queue: bool,
}

impl Handler {
    fn spawn(srv: Rc<ServerInner>, sched: &mut Scheduler, mut state: RequestState) {
        state.record_hop(NodeKind::Server, &srv.id, sched.time());

        // Endpoint picked uniformly at random.
        let (steps, total_ram_mb) = {
            let endpoint = &srv.endpoints[srv.rng.index(srv.endpoints.len())];
            trace!(
                server = %srv.id,
                request = state.id,
                endpoint = %endpoint.name,
                "handler spawned"
            );
            (Rc::clone(&endpoint.steps), endpoint.total_ram_mb)
        };

        let handler = Box::new(Handler {
            srv,
            state,
            steps,
            total_ram_mb,
            step_idx: 0,
            core_locked: false,
            in_io_queue: false,
        });
        handler.reserve_ram(sched);
    }

    /// The whole endpoint RAM budget is taken before the first step and
    /// held until after the last.
    fn reserve_ram(self: Box<Self>, sched: &mut Scheduler) {
        if self.total_ram_mb == 0 {
            self.execute(sched);
            return;
        }
        let amount = self.total_ram_mb;
        let ram = self.srv.ram.clone();
        ram.acquire_mb(sched, amount, move |s| {
            self.srv.ram_in_use.add(amount as f64);
            self.execute(s);
        });
    }

    /// Run steps until the next suspension point.
    fn execute(mut self: Box<Self>, sched: &mut Scheduler) {
        loop {
            let Some(step) = self.steps.get(self.step_idx).copied() else {
                self.finish(sched);
                return;
            };
            match step {
                PlannedStep::Ram => {
                    self.step_idx += 1;
                }
                PlannedStep::Cpu(time) => {
                    if self.core_locked {
                        self.sleep_then_continue(sched, time);
                    } else {
                        let cpu = self.srv.cpu.clone();
                        cpu.acquire_core(sched, move |s| self.lock_core_and_run(s, time));
                    }
                    return;
                }
                PlannedStep::Io(time) => {
                    if self.core_locked {
                        self.core_locked = false;
                        if self.srv.cpu.release_core(sched).is_err() {
                            let (srv, id) = (Rc::clone(&self.srv), self.state.id);
                            srv.consistency_fault(sched, id, "cpu token over-release".into());
                            return;
                        }
                        if self.srv.ready_queue.checked_dec().is_err() {
                            let (srv, id) = (Rc::clone(&self.srv), self.state.id);
                            srv.consistency_fault(sched, id, "ready queue underflow".into());
                            return;
                        }
                    }
                    if !self.in_io_queue {
                        self.in_io_queue = true;
                        self.srv.io_sleep.inc();
                    }
                    self.sleep_then_continue(sched, time);
                    return;
                }
            }
        }
    }

    /// First CPU step after an I/O (or at handler start): the core token
    /// was just granted.
    fn lock_core_and_run(mut self: Box<Self>, sched: &mut Scheduler, time: SimTime) {
        self.core_locked = true;
        self.srv.ready_queue.inc();
        if self.in_io_queue {
            self.in_io_queue = false;
            if self.srv.io_sleep.checked_dec().is_err() {
                let (srv, id) = (Rc::clone(&self.srv), self.state.id);
                srv.consistency_fault(sched, id, "io queue underflow".into());
                return;
            }
        }
        self.sleep_then_continue(sched, time);
    }

    fn sleep_then_continue(mut self: Box<Self>, sched: &mut Scheduler, time: SimTime) {
        self.step_idx += 1;
        sched.schedule_in(time, move |s| self.execute(s));
    }

    fn finish(mut self: Box<Self>, sched: &mut Scheduler) {
        if self.core_locked {
            self.core_locked = false;
            if self.srv.cpu.release_core(sched).is_err() {
                let (srv, id) = (Rc::clone(&self.srv), self.state.id);
                srv.consistency_fault(sched, id, "cpu token over-release".into());
                return;
            }
            if self.srv.ready_queue.checked_dec().is_err() {
                let (srv, id) = (Rc::clone(&self.srv), self.state.id);
                srv.consistency_fault(sched, id, "ready queue underflow".into());
                return;
            }
        } else if self.in_io_queue {
            self.in_io_queue = false;
            if self.srv.io_sleep.checked_dec().is_err() {
                let (srv, id) = (Rc::clone(&self.srv), self.state.id);
                srv.consistency_fault(sched, id, "io queue underflow".into());
                return;
            }
        }

        if self.total_ram_mb > 0 {
            if self.srv.ram.release_mb(sched, self.total_ram_mb).is_err() {
                let (srv, id) = (Rc::clone(&self.srv), self.state.id);
                srv.consistency_fault(sched, id, "ram over-release".into());
                return;
            }
            if self
                .srv
                .ram_in_use
                .checked_sub(self.total_ram_mb as f64)
                .is_err()
            {
                let (srv, id) = (Rc::clone(&self.srv), self.state.id);
                srv.consistency_fault(sched, id, "ram accounting underflow".into());
                return;
            }
        }

        trace!(server = %self.srv.id, request = self.state.id, "handler finished");
        self.srv.out_edge.transport(sched, self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SpikeBoard;
    use crate::scenario::{Endpoint, ServerResources, Step, StepKind};
    use asyncflow_core::{DistributionFamily, RVConfig};

    /// Near-zero-latency edge into a sink mailbox.
    fn sink_edge(sink: &Mailbox<RequestState>) -> EdgeRuntime {
        let config = crate::scenario::EdgeConfig {
            id: "srv-out".into(),
            source: "api-srv".into(),
            target: "client-1".into(),
            latency: RVConfig::new(DistributionFamily::Normal, 1e-9).with_variance(0.0),
            dropout_rate: 0.0,
        };
        EdgeRuntime::new(
            &config,
            sink.clone(),
            SpikeBoard::from_events(&[]),
            SimRng::seed_from_u64(9),
            FaultCell::new(),
        )
        .unwrap()
    }

    fn default_steps() -> Vec<Step> {
        vec![
            Step::ram(128),
            Step::cpu(StepKind::CpuBoundOperation, 0.005),
            Step::io(StepKind::IoDb, 0.020),
        ]
    }

    fn make_server(
        cpu_cores: u32,
        ram_mb: u32,
        steps: Vec<Step>,
    ) -> (ServerRuntime, Mailbox<RequestState>, FaultCell) {
        let sink = Mailbox::unbounded();
        let fault = FaultCell::new();
        let server = ServerRuntime::new(
            &ServerNode {
                id: "api-srv".into(),
                server_resources: ServerResources {
                    cpu_cores,
                    ram_mb,
                    db_connection_pool: None,
                },
                endpoints: vec![Endpoint {
                    endpoint_name: "/predict".into(),
                    steps,
                }],
            },
            sink_edge(&sink),
            Mailbox::unbounded(),
            SimRng::seed_from_u64(0),
            fault.clone(),
        );
        (server, sink, fault)
    }

    fn inject(server: &ServerRuntime, sched: &mut Scheduler, id: u64) {
        server
            .inbox()
            .put(sched, RequestState::new(id, sched.time()), |_| {});
    }

    fn run_until(sched: &mut Scheduler, at_ms: u64) {
        sched.run_until(SimTime::from_millis(at_ms));
    }

    #[test]
    fn ram_returns_to_capacity_at_the_end() {
        let mut sched = Scheduler::new();
        let (server, sink, fault) = make_server(2, 1024, default_steps());

        inject(&server, &mut sched, 1);
        server.start(&mut sched);
        sched.run_until(SimTime::from_secs(1));

        assert_eq!(server.ram().available_mb(), 1024);
        assert_eq!(server.ram_in_use_gauge().get(), 0.0);
        assert_eq!(sink.len(), 1);
        assert!(!fault.is_tripped());
    }

    #[test]
    fn core_held_only_during_cpu_then_io() {
        let mut sched = Scheduler::new();
        let (server, _, _) = make_server(2, 1024, default_steps());

        inject(&server, &mut sched, 2);
        server.start(&mut sched);

        // Mid CPU step (5 ms total): one core in use, handler counted in
        // the ready queue.
        run_until(&mut sched, 3);
        assert_eq!(server.cpu().available(), 1);
        assert_eq!(server.ready_queue_gauge().get(), 1.0);
        assert_eq!(server.io_sleep_gauge().get(), 0.0);

        // During the I/O step the core is back and the handler moved to
        // the I/O queue.
        run_until(&mut sched, 8);
        assert_eq!(server.cpu().available(), 2);
        assert_eq!(server.ready_queue_gauge().get(), 0.0);
        assert_eq!(server.io_sleep_gauge().get(), 1.0);

        sched.run_until(SimTime::from_secs(1));
        assert_eq!(server.ready_queue_gauge().get(), 0.0);
        assert_eq!(server.io_sleep_gauge().get(), 0.0);
    }

    #[test]
    fn single_core_serializes_overlapping_requests() {
        let mut sched = Scheduler::new();
        let (server, sink, _) = make_server(1, 1024, default_steps());

        inject(&server, &mut sched, 10);
        inject(&server, &mut sched, 11);
        server.start(&mut sched);

        // During the first CPU window only one handler can hold the token.
        run_until(&mut sched, 4);
        assert_eq!(server.ready_queue_gauge().get(), 1.0);
        assert_eq!(server.cpu().available(), 0);

        // First handler moved to I/O at 5 ms; second picked up the token.
        run_until(&mut sched, 7);
        assert_eq!(server.ready_queue_gauge().get(), 1.0);
        assert_eq!(server.io_sleep_gauge().get(), 1.0);

        sched.run_until(SimTime::from_secs(1));
        assert_eq!(sink.len(), 2);
        assert_eq!(server.ready_queue_gauge().get(), 0.0);
        assert_eq!(server.io_sleep_gauge().get(), 0.0);
        assert_eq!(server.cpu().available(), 1);
    }

    #[test]
    fn consecutive_io_steps_count_once() {
        let steps = vec![
            Step::ram(64),
            Step::io(StepKind::IoDb, 0.010),
            Step::io(StepKind::IoCache, 0.015),
        ];
        let mut sched = Scheduler::new();
        let (server, _, _) = make_server(2, 1024, steps);

        inject(&server, &mut sched, 20);
        server.start(&mut sched);

        run_until(&mut sched, 5);
        assert_eq!(server.io_sleep_gauge().get(), 1.0);

        // Still one presence in the I/O queue during the second I/O step.
        run_until(&mut sched, 20);
        assert_eq!(server.io_sleep_gauge().get(), 1.0);

        sched.run_until(SimTime::from_secs(1));
        assert_eq!(server.io_sleep_gauge().get(), 0.0);
        assert_eq!(server.ready_queue_gauge().get(), 0.0);
    }

    #[test]
    fn contiguous_cpu_steps_share_one_token() {
        let steps = vec![
            Step::ram(64),
            Step::cpu(StepKind::CpuBoundOperation, 0.004),
            Step::cpu(StepKind::CpuBoundOperation, 0.004),
        ];
        let mut sched = Scheduler::new();
        let (server, _, fault) = make_server(1, 1024, steps);

        inject(&server, &mut sched, 40);
        server.start(&mut sched);

        run_until(&mut sched, 2);
        assert_eq!(server.cpu().available(), 0);
        assert_eq!(server.ready_queue_gauge().get(), 1.0);

        // Second CPU step reuses the token: no release in between.
        run_until(&mut sched, 6);
        assert_eq!(server.cpu().available(), 0);
        assert_eq!(server.ready_queue_gauge().get(), 1.0);

        sched.run_until(SimTime::from_secs(1));
        assert_eq!(server.cpu().available(), 1);
        assert!(!fault.is_tripped());
    }

    #[test]
    fn io_first_endpoint_reacquires_core_later() {
        let steps = vec![
            Step::ram(64),
            Step::io(StepKind::IoWait, 0.010),
            Step::cpu(StepKind::CpuBoundOperation, 0.005),
        ];
        let mut sched = Scheduler::new();
        let (server, sink, _) = make_server(1, 1024, steps);

        inject(&server, &mut sched, 30);
        server.start(&mut sched);

        run_until(&mut sched, 5);
        assert_eq!(server.io_sleep_gauge().get(), 1.0);
        assert_eq!(server.ready_queue_gauge().get(), 0.0);
        assert_eq!(server.cpu().available(), 1);

        run_until(&mut sched, 12);
        assert_eq!(server.io_sleep_gauge().get(), 0.0);
        assert_eq!(server.ready_queue_gauge().get(), 1.0);
        assert_eq!(server.cpu().available(), 0);

        sched.run_until(SimTime::from_secs(1));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn ram_gating_blocks_before_any_counter_moves() {
        let steps = vec![
            Step::ram(256),
            Step::cpu(StepKind::CpuBoundOperation, 0.005),
            Step::io(StepKind::IoDb, 0.020),
        ];
        let mut sched = Scheduler::new();
        let (server, sink, _) = make_server(2, 256, steps);

        inject(&server, &mut sched, 50);
        inject(&server, &mut sched, 51);
        server.start(&mut sched);

        // Second request blocks on RAM; it must not inflate the ready
        // queue while waiting.
        run_until(&mut sched, 2);
        assert_eq!(server.ready_queue_gauge().get(), 1.0);
        assert_eq!(server.ram().available_mb(), 0);
        assert_eq!(server.ram().waiting(), 1);

        sched.run_until(SimTime::from_secs(1));
        assert_eq!(sink.len(), 2);
        assert_eq!(server.ram().available_mb(), 256);
        assert_eq!(server.ram_in_use_gauge().get(), 0.0);
    }

    #[test]
    fn oversized_reservation_waits_out_the_run() {
        let steps = vec![
            Step::ram(512),
            Step::cpu(StepKind::CpuBoundOperation, 0.001),
        ];
        let mut sched = Scheduler::new();
        let (server, sink, fault) = make_server(1, 256, steps);

        inject(&server, &mut sched, 60);
        server.start(&mut sched);
        sched.run_until(SimTime::from_secs(1));

        assert!(sink.is_empty());
        assert_eq!(server.ram().waiting(), 1);
        assert!(!fault.is_tripped());
    }
}
