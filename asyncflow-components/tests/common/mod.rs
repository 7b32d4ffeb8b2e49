//! Shared scenario builders for the integration suites.
#![allow(dead_code)]

use asyncflow_components::scenario::{
    ClientNode, EdgeConfig, Endpoint, EventEnd, EventEndKind, EventInjection, EventStart,
    EventStartKind, LbAlgorithm, LoadBalancerNode, RqsGenerator, Scenario, ServerNode,
    ServerResources, SimulationSettings, Step, StepKind, TopologyGraph, TopologyNodes,
};
use asyncflow_core::{DistributionFamily, RVConfig};

pub const GENERATOR_ID: &str = "rqs-gen";
pub const CLIENT_ID: &str = "client-1";
pub const LB_ID: &str = "lb-1";

/// Near-deterministic low latency for wiring edges.
pub fn tight_latency() -> RVConfig {
    RVConfig::new(DistributionFamily::Normal, 0.001).with_variance(0.0)
}

pub fn workload(avg_users: f64, rpm_per_user: f64, window_s: u32) -> RqsGenerator {
    RqsGenerator {
        id: GENERATOR_ID.into(),
        avg_active_users: RVConfig::new(DistributionFamily::Poisson, avg_users),
        avg_request_per_minute_per_user: RVConfig::new(DistributionFamily::Poisson, rpm_per_user),
        user_sampling_window: window_s,
    }
}

pub fn cpu_only_server(id: &str, cpu_time_s: f64) -> ServerNode {
    ServerNode {
        id: id.into(),
        server_resources: ServerResources {
            cpu_cores: 1,
            ram_mb: 256,
            db_connection_pool: None,
        },
        endpoints: vec![Endpoint {
            endpoint_name: "/x".into(),
            steps: vec![Step::cpu(StepKind::CpuBoundOperation, cpu_time_s)],
        }],
    }
}

pub fn full_stack_server(id: &str) -> ServerNode {
    ServerNode {
        id: id.into(),
        server_resources: ServerResources {
            cpu_cores: 2,
            ram_mb: 1024,
            db_connection_pool: None,
        },
        endpoints: vec![Endpoint {
            endpoint_name: "/predict".into(),
            steps: vec![
                Step::ram(128),
                Step::cpu(StepKind::InitialParsing, 0.001),
                Step::io(StepKind::IoDb, 0.005),
                Step::cpu(StepKind::CpuBoundOperation, 0.002),
            ],
        }],
    }
}

pub fn edge(id: &str, source: &str, target: &str) -> EdgeConfig {
    EdgeConfig {
        id: id.into(),
        source: source.into(),
        target: target.into(),
        latency: tight_latency(),
        dropout_rate: 0.0,
    }
}

/// Generator -> client -> single server -> client.
pub fn single_server_scenario(server: ServerNode, horizon_s: f64) -> Scenario {
    let server_id = server.id.clone();
    Scenario {
        rqs_generator: workload(5.0, 60.0, 2),
        topology_graph: TopologyGraph {
            nodes: TopologyNodes {
                client: ClientNode { id: CLIENT_ID.into() },
                servers: vec![server],
                load_balancer: None,
            },
            edges: vec![
                edge("gen-client", GENERATOR_ID, CLIENT_ID),
                edge("client-srv", CLIENT_ID, &server_id),
                edge("srv-client", &server_id, CLIENT_ID),
            ],
        },
        sim_settings: SimulationSettings::with_horizon(horizon_s),
        events: Vec::new(),
    }
}

/// Generator -> client -> load balancer -> two servers -> client.
pub fn two_server_lb_scenario(algorithm: LbAlgorithm, horizon_s: f64) -> Scenario {
    Scenario {
        rqs_generator: workload(10.0, 60.0, 10),
        topology_graph: TopologyGraph {
            nodes: TopologyNodes {
                client: ClientNode { id: CLIENT_ID.into() },
                servers: vec![cpu_only_server("srv-1", 0.001), cpu_only_server("srv-2", 0.001)],
                load_balancer: Some(LoadBalancerNode {
                    id: LB_ID.into(),
                    algorithm,
                    server_covered: vec!["srv-1".into(), "srv-2".into()],
                }),
            },
            edges: vec![
                edge("gen-client", GENERATOR_ID, CLIENT_ID),
                edge("client-lb", CLIENT_ID, LB_ID),
                edge("lb-srv1", LB_ID, "srv-1"),
                edge("lb-srv2", LB_ID, "srv-2"),
                edge("srv1-client", "srv-1", CLIENT_ID),
                edge("srv2-client", "srv-2", CLIENT_ID),
            ],
        },
        sim_settings: SimulationSettings::with_horizon(horizon_s),
        events: Vec::new(),
    }
}

pub fn outage(event_id: &str, server_id: &str, t0: f64, t1: f64) -> EventInjection {
    EventInjection {
        event_id: event_id.into(),
        target_id: server_id.into(),
        start: EventStart {
            kind: EventStartKind::ServerDown,
            t_start: t0,
            spike_s: None,
        },
        end: EventEnd {
            kind: EventEndKind::ServerUp,
            t_end: t1,
        },
    }
}

pub fn spike(event_id: &str, edge_id: &str, t0: f64, t1: f64, spike_s: f64) -> EventInjection {
    EventInjection {
        event_id: event_id.into(),
        target_id: edge_id.into(),
        start: EventStart {
            kind: EventStartKind::NetworkSpikeStart,
            t_start: t0,
            spike_s: Some(spike_s),
        },
        end: EventEnd {
            kind: EventEndKind::NetworkSpikeEnd,
            t_end: t1,
        },
    }
}
