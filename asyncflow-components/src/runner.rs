//! Build, wire, start, run.
//!
//! The runner owns the fixed assembly sequence: validate the scenario,
//! build mailboxes and edges, wire actors to their outgoing edges, hand
//! the load balancer's live edge set to the event injector, start the
//! injector ahead of every actor, then drive the scheduler to the horizon
//! and assemble the results.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use asyncflow_core::{FaultCell, Scheduler, SimError, SimRng, SimTime};
use asyncflow_metrics::{
    EdgeProbe, RequestClockStore, SampleSet, SampledMetricCollector, SampledMetricName,
    ServerProbe, SimulationResults,
};
use tracing::{debug, info};

use crate::actors::{
    ClientRuntime, EdgeRuntime, LoadBalancerRuntime, RqsGeneratorRuntime, ServerRuntime,
};
use crate::events::{EventInjectionRuntime, LiveEdgeSet, SpikeBoard};
use crate::mailbox::Mailbox;
use crate::ordered::OrderedMap;
use crate::request::RequestState;
use crate::scenario::{validate::validate, Scenario};

/// One-shot runner for a validated scenario.
pub struct SimulationRunner {
    scenario: Scenario,
    seed: Option<u64>,
}

impl SimulationRunner {
    #[must_use]
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            seed: None,
        }
    }

    /// Pin the RNG seed for a reproducible run. Without it the stream is
    /// seeded from OS entropy.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Execute the scenario to its horizon and return the results, or the
    /// first structured error.
    pub fn run(self) -> Result<SimulationResults, SimError> {
        self.run_detailed().map(|(results, _)| results)
    }

    /// Like [`run`](Self::run), but also hands back the terminated
    /// [`RequestState`]s with their full hop histories, for callers that
    /// want to trace individual requests.
    pub fn run_detailed(self) -> Result<(SimulationResults, Vec<RequestState>), SimError> {
        validate(&self.scenario)?;

        let scenario = &self.scenario;
        let settings = &scenario.sim_settings;
        let horizon = SimTime::from_secs_f64(settings.total_simulation_time);

        let mut sched = Scheduler::new();
        let rng = match self.seed {
            Some(seed) => SimRng::seed_from_u64(seed),
            None => SimRng::from_entropy(),
        };
        let fault = FaultCell::new();
        let spikes = SpikeBoard::from_events(&scenario.events);

        // Mailboxes, one per declared node that can receive.
        let nodes = &scenario.topology_graph.nodes;
        let client_box: Mailbox<RequestState> = Mailbox::unbounded();
        let lb_box: Mailbox<RequestState> = Mailbox::unbounded();
        let server_boxes: HashMap<String, Mailbox<RequestState>> = nodes
            .servers
            .iter()
            .map(|server| (server.id.clone(), Mailbox::unbounded()))
            .collect();

        let target_mailbox = |target: &str| -> Result<Mailbox<RequestState>, SimError> {
            if target == nodes.client.id {
                return Ok(client_box.clone());
            }
            if nodes
                .load_balancer
                .as_ref()
                .is_some_and(|lb| lb.id == target)
            {
                return Ok(lb_box.clone());
            }
            server_boxes.get(target).cloned().ok_or_else(|| {
                SimError::validation("target", target, "no mailbox for edge target")
            })
        };

        // Edges, wired straight to their target mailboxes.
        let mut edges: HashMap<String, EdgeRuntime> = HashMap::new();
        for config in &scenario.topology_graph.edges {
            let runtime = EdgeRuntime::new(
                config,
                target_mailbox(&config.target)?,
                Rc::clone(&spikes),
                rng.clone(),
                fault.clone(),
            )?;
            edges.insert(config.id.clone(), runtime);
        }

        let out_edge_of = |source: &str| -> Result<EdgeRuntime, SimError> {
            scenario
                .topology_graph
                .edges
                .iter()
                .find(|e| e.source == source)
                .and_then(|e| edges.get(&e.id))
                .cloned()
                .ok_or_else(|| {
                    SimError::validation("edges", source, "no outgoing edge for node")
                })
        };

        // Servers.
        let mut servers: Vec<ServerRuntime> = Vec::with_capacity(nodes.servers.len());
        for config in &nodes.servers {
            let runtime = ServerRuntime::new(
                config,
                out_edge_of(&config.id)?,
                server_boxes[&config.id].clone(),
                rng.clone(),
                fault.clone(),
            );
            servers.push(runtime);
        }

        // Load balancer and its live edge set, shared with the injector.
        let mut live_edges: Option<LiveEdgeSet> = None;
        let mut edge_by_server: HashMap<String, (String, EdgeRuntime)> = HashMap::new();
        let load_balancer = match &nodes.load_balancer {
            Some(config) => {
                let live: LiveEdgeSet = Rc::new(RefCell::new(OrderedMap::new()));
                for edge_config in &scenario.topology_graph.edges {
                    if edge_config.source == config.id {
                        let handle = edges[&edge_config.id].clone();
                        live.borrow_mut().insert(&edge_config.id, handle.clone());
                        edge_by_server
                            .insert(edge_config.target.clone(), (edge_config.id.clone(), handle));
                    }
                }
                live_edges = Some(Rc::clone(&live));
                Some(LoadBalancerRuntime::new(
                    config,
                    live,
                    lb_box.clone(),
                    fault.clone(),
                ))
            }
            None => None,
        };

        // Client and generator.
        let rqs_clock = RequestClockStore::with_enabled(&settings.enabled_event_metrics);
        let client = ClientRuntime::new(
            &nodes.client,
            out_edge_of(&nodes.client.id)?,
            client_box.clone(),
            Rc::clone(&rqs_clock),
            fault.clone(),
        );
        let generator = RqsGeneratorRuntime::new(
            &scenario.rqs_generator,
            out_edge_of(&scenario.rqs_generator.id)?,
            settings.total_simulation_time,
            rng.clone(),
        )?;

        // Collector probes over the live counters.
        let enabled = &settings.enabled_sample_metrics;
        let server_probes: Vec<ServerProbe> = servers
            .iter()
            .map(|server| ServerProbe {
                id: server.id().to_string(),
                ready_queue: server.ready_queue_gauge(),
                io_sleep: server.io_sleep_gauge(),
                ram_in_use: server.ram_in_use_gauge(),
                samples: SampleSet::with_enabled(enabled, &SampledMetricName::SERVER_METRICS),
            })
            .collect();
        let edge_probes: Vec<EdgeProbe> = scenario
            .topology_graph
            .edges
            .iter()
            .map(|config| EdgeProbe {
                id: config.id.clone(),
                connections: edges[&config.id].connections(),
                samples: SampleSet::with_enabled(enabled, &SampledMetricName::EDGE_METRICS),
            })
            .collect();

        let sample_sets: Vec<(String, Rc<SampleSet>)> = server_probes
            .iter()
            .map(|p| (p.id.clone(), Rc::clone(&p.samples)))
            .chain(
                edge_probes
                    .iter()
                    .map(|p| (p.id.clone(), Rc::clone(&p.samples))),
            )
            .collect();

        let collector = SampledMetricCollector::new(
            server_probes,
            edge_probes,
            SimTime::from_secs_f64(settings.sample_period_s),
        );

        let injector = EventInjectionRuntime::new(
            &scenario.events,
            Rc::clone(&spikes),
            live_edges,
            edge_by_server,
        );

        // Start order: injector first, then actors, then the sampler.
        info!(horizon = %horizon, "simulation starting");
        injector.start(&mut sched);
        for server in &servers {
            server.start(&mut sched);
        }
        if let Some(lb) = &load_balancer {
            lb.start(&mut sched);
        }
        client.start(&mut sched);
        generator.start(&mut sched);
        collector.start(&mut sched);

        // Drive to the horizon, aborting on the first tripped fault.
        while sched.peek_time().is_some_and(|t| t <= horizon) {
            sched.step();
            if fault.is_tripped() {
                let error = fault.take().unwrap_or(SimError::Configuration {
                    message: "fault tripped without detail".into(),
                    sim_time: sched.time().as_secs_f64(),
                });
                return Err(error);
            }
        }
        sched.run_until(horizon);
        debug!(
            emitted = generator.emitted(),
            completed = client.completed_count(),
            "simulation horizon reached"
        );

        // Assemble results.
        let mut sampled: HashMap<SampledMetricName, HashMap<String, Vec<f64>>> = HashMap::new();
        for (entity_id, samples) in sample_sets {
            for (metric, values) in samples.snapshot() {
                sampled
                    .entry(metric)
                    .or_default()
                    .insert(entity_id.clone(), values);
            }
        }
        let servers_order: Vec<String> =
            nodes.servers.iter().map(|s| s.id.clone()).collect();

        let results = SimulationResults::new(
            rqs_clock.snapshot(),
            sampled,
            servers_order,
            settings.sample_period_s,
            settings.total_simulation_time,
        );
        Ok((results, client.take_completed()))
    }
}
