//! Scenario validation: every precondition the runtime depends on.
//!
//! The engine assumes a well-formed scenario; this module is the single
//! gate that enforces it. Errors carry the offending field and entity id
//! so callers can surface them without guessing.

use std::collections::{HashMap, HashSet};

use asyncflow_core::{DistributionFamily, SimError};
use asyncflow_metrics::{EventMetricName, SampledMetricName};

use super::{EventEndKind, EventStartKind, Scenario, StepClass, StepOperation};

const MIN_SIMULATION_TIME_S: f64 = 5.0;
const SAMPLE_PERIOD_RANGE_S: (f64, f64) = (0.001, 0.1);
const USER_WINDOW_RANGE_S: (u32, u32) = (1, 120);
const MIN_SERVER_RAM_MB: u32 = 256;

/// Check the whole scenario. Returns the first violation found.
pub fn validate(scenario: &Scenario) -> Result<(), SimError> {
    validate_workload(scenario)?;
    validate_settings(scenario)?;
    validate_servers(scenario)?;
    validate_graph(scenario)?;
    validate_events(scenario)?;
    Ok(())
}

fn validate_workload(scenario: &Scenario) -> Result<(), SimError> {
    let workload = &scenario.rqs_generator;
    let entity = workload.id.as_str();

    if workload.avg_request_per_minute_per_user.distribution != DistributionFamily::Poisson {
        return Err(SimError::validation(
            "avg_request_per_minute_per_user.distribution",
            entity,
            "only poisson per-user request rates are supported",
        ));
    }
    if !matches!(
        workload.avg_active_users.distribution,
        DistributionFamily::Poisson | DistributionFamily::Normal
    ) {
        return Err(SimError::validation(
            "avg_active_users.distribution",
            entity,
            "active users must be poisson or normal",
        ));
    }
    for (field, rv) in [
        ("avg_active_users", &workload.avg_active_users),
        (
            "avg_request_per_minute_per_user",
            &workload.avg_request_per_minute_per_user,
        ),
    ] {
        if !(rv.mean > 0.0) {
            return Err(SimError::validation(field, entity, "mean must be positive"));
        }
        if rv.variance.is_some_and(|v| v < 0.0) {
            return Err(SimError::validation(
                field,
                entity,
                "variance must be non-negative",
            ));
        }
    }
    let (lo, hi) = USER_WINDOW_RANGE_S;
    if !(lo..=hi).contains(&workload.user_sampling_window) {
        return Err(SimError::validation(
            "user_sampling_window",
            entity,
            format!("must lie in [{lo}, {hi}] seconds"),
        ));
    }
    Ok(())
}

fn validate_settings(scenario: &Scenario) -> Result<(), SimError> {
    let settings = &scenario.sim_settings;

    if settings.total_simulation_time < MIN_SIMULATION_TIME_S {
        return Err(SimError::validation(
            "total_simulation_time",
            "sim_settings",
            format!("must be at least {MIN_SIMULATION_TIME_S} seconds"),
        ));
    }
    let (lo, hi) = SAMPLE_PERIOD_RANGE_S;
    if !(lo..=hi).contains(&settings.sample_period_s) {
        return Err(SimError::validation(
            "sample_period_s",
            "sim_settings",
            format!("must lie in [{lo}, {hi}] seconds"),
        ));
    }
    for mandatory in SampledMetricName::MANDATORY {
        if !settings.enabled_sample_metrics.contains(&mandatory) {
            return Err(SimError::validation(
                "enabled_sample_metrics",
                "sim_settings",
                format!("mandatory metric `{mandatory}` is missing"),
            ));
        }
    }
    for mandatory in EventMetricName::MANDATORY {
        if !settings.enabled_event_metrics.contains(&mandatory) {
            return Err(SimError::validation(
                "enabled_event_metrics",
                "sim_settings",
                format!("mandatory metric `{mandatory}` is missing"),
            ));
        }
    }
    Ok(())
}

fn validate_servers(scenario: &Scenario) -> Result<(), SimError> {
    for server in &scenario.topology_graph.nodes.servers {
        let entity = server.id.as_str();
        if server.server_resources.cpu_cores < 1 {
            return Err(SimError::validation(
                "server_resources.cpu_cores",
                entity,
                "a server needs at least one core",
            ));
        }
        if server.server_resources.ram_mb < MIN_SERVER_RAM_MB {
            return Err(SimError::validation(
                "server_resources.ram_mb",
                entity,
                format!("a server needs at least {MIN_SERVER_RAM_MB} MB"),
            ));
        }
        if server.endpoints.is_empty() {
            return Err(SimError::validation(
                "endpoints",
                entity,
                "a server needs at least one endpoint",
            ));
        }
        for endpoint in &server.endpoints {
            if endpoint.endpoint_name != endpoint.endpoint_name.to_lowercase() {
                return Err(SimError::validation(
                    "endpoint_name",
                    entity,
                    format!("`{}` must be lowercase", endpoint.endpoint_name),
                ));
            }
            if endpoint.steps.is_empty() {
                return Err(SimError::validation(
                    "steps",
                    entity,
                    format!("endpoint `{}` has no steps", endpoint.endpoint_name),
                ));
            }
            for step in &endpoint.steps {
                let matches_kind = matches!(
                    (step.kind.class(), step.step_operation),
                    (StepClass::Cpu, StepOperation::CpuTime(_))
                        | (StepClass::Ram, StepOperation::NecessaryRam(_))
                        | (StepClass::Io, StepOperation::IoWaitingTime(_))
                );
                if !matches_kind {
                    return Err(SimError::validation(
                        "step_operation",
                        entity,
                        format!(
                            "operation does not match step kind in endpoint `{}`",
                            endpoint.endpoint_name
                        ),
                    ));
                }
                let positive = match step.step_operation {
                    StepOperation::CpuTime(t) | StepOperation::IoWaitingTime(t) => t > 0.0,
                    StepOperation::NecessaryRam(mb) => mb > 0,
                };
                if !positive {
                    return Err(SimError::validation(
                        "step_operation",
                        entity,
                        format!(
                            "step amounts must be positive in endpoint `{}`",
                            endpoint.endpoint_name
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn validate_graph(scenario: &Scenario) -> Result<(), SimError> {
    let graph = &scenario.topology_graph;
    let nodes = &graph.nodes;
    let generator_id = scenario.rqs_generator.id.as_str();

    if nodes.servers.is_empty() {
        return Err(SimError::validation(
            "nodes.servers",
            "topology_graph",
            "at least one server is required",
        ));
    }

    // Declared node ids must be unique across every node kind.
    let mut declared: HashSet<&str> = HashSet::new();
    let mut all_ids: Vec<&str> = vec![nodes.client.id.as_str()];
    all_ids.extend(nodes.servers.iter().map(|s| s.id.as_str()));
    if let Some(lb) = &nodes.load_balancer {
        all_ids.push(lb.id.as_str());
    }
    for id in all_ids {
        if !declared.insert(id) {
            return Err(SimError::validation("id", id, "duplicate node id"));
        }
    }
    if declared.contains(generator_id) {
        return Err(SimError::validation(
            "id",
            generator_id,
            "generator id collides with a declared node",
        ));
    }

    // Edge ids unique; targets declared; no self-loops.
    let mut edge_ids: HashSet<&str> = HashSet::new();
    for edge in &graph.edges {
        if !edge_ids.insert(edge.id.as_str()) {
            return Err(SimError::validation("id", &edge.id, "duplicate edge id"));
        }
        if edge.source == edge.target {
            return Err(SimError::validation(
                "target",
                &edge.id,
                "self-loops are not allowed",
            ));
        }
        if !declared.contains(edge.target.as_str()) {
            return Err(SimError::validation(
                "target",
                &edge.id,
                format!("`{}` is not a declared node", edge.target),
            ));
        }
        if !(0.0..=1.0).contains(&edge.dropout_rate) {
            return Err(SimError::validation(
                "dropout_rate",
                &edge.id,
                "must lie in [0, 1]",
            ));
        }
        if !(edge.latency.mean > 0.0) {
            return Err(SimError::validation(
                "latency.mean",
                &edge.id,
                "must be positive",
            ));
        }
        if edge.latency.variance.is_some_and(|v| v < 0.0) {
            return Err(SimError::validation(
                "latency.variance",
                &edge.id,
                "must be non-negative",
            ));
        }
    }

    // Fan-out: among declared nodes only the load balancer may have more
    // than one outgoing edge.
    let lb_id = nodes.load_balancer.as_ref().map(|lb| lb.id.as_str());
    let mut outgoing: HashMap<&str, usize> = HashMap::new();
    for edge in &graph.edges {
        *outgoing.entry(edge.source.as_str()).or_default() += 1;
    }
    for (&source, &count) in &outgoing {
        if count > 1 && declared.contains(source) && Some(source) != lb_id {
            return Err(SimError::validation(
                "edges",
                source,
                "only the load balancer may fan out",
            ));
        }
    }

    // Wiring completeness for the fixed request path.
    fn single_out<'a>(
        graph: &'a super::TopologyGraph,
        id: &str,
    ) -> Option<&'a super::EdgeConfig> {
        let mut edges = graph.edges.iter().filter(|e| e.source == id);
        let first = edges.next();
        if edges.next().is_some() {
            None
        } else {
            first
        }
    }

    let generator_edge = single_out(graph, generator_id).ok_or_else(|| {
        SimError::validation(
            "edges",
            generator_id,
            "the generator needs exactly one outgoing edge",
        )
    })?;
    if generator_edge.target != nodes.client.id {
        return Err(SimError::validation(
            "target",
            &generator_edge.id,
            "the generator edge must reach the client",
        ));
    }

    let client_edge = single_out(graph, nodes.client.id.as_str()).ok_or_else(|| {
        SimError::validation(
            "edges",
            &nodes.client.id,
            "the client needs exactly one outgoing edge",
        )
    })?;

    let server_ids: HashSet<&str> = nodes.servers.iter().map(|s| s.id.as_str()).collect();
    for server in &nodes.servers {
        let out = single_out(graph, server.id.as_str()).ok_or_else(|| {
            SimError::validation(
                "edges",
                &server.id,
                "every server needs exactly one outgoing edge",
            )
        })?;
        if out.target != nodes.client.id {
            return Err(SimError::validation(
                "target",
                &out.id,
                "server return edges must reach the client",
            ));
        }
    }

    match &nodes.load_balancer {
        Some(lb) => {
            if client_edge.target != lb.id {
                return Err(SimError::validation(
                    "target",
                    &client_edge.id,
                    "with a load balancer present, the client edge must reach it",
                ));
            }
            if lb.server_covered.is_empty() {
                return Err(SimError::validation(
                    "server_covered",
                    &lb.id,
                    "a load balancer must cover at least one server",
                ));
            }
            for covered in &lb.server_covered {
                if !server_ids.contains(covered.as_str()) {
                    return Err(SimError::validation(
                        "server_covered",
                        &lb.id,
                        format!("`{covered}` is not a declared server"),
                    ));
                }
                let has_edge = graph
                    .edges
                    .iter()
                    .any(|e| e.source == lb.id && &e.target == covered);
                if !has_edge {
                    return Err(SimError::validation(
                        "edges",
                        &lb.id,
                        format!("no edge from the load balancer to covered server `{covered}`"),
                    ));
                }
            }
        }
        None => {
            if !server_ids.contains(client_edge.target.as_str()) {
                return Err(SimError::validation(
                    "target",
                    &client_edge.id,
                    "without a load balancer, the client edge must reach a server",
                ));
            }
        }
    }

    Ok(())
}

fn validate_events(scenario: &Scenario) -> Result<(), SimError> {
    let total = scenario.sim_settings.total_simulation_time;
    let server_ids: HashSet<&str> = scenario
        .topology_graph
        .nodes
        .servers
        .iter()
        .map(|s| s.id.as_str())
        .collect();
    let edge_ids: HashSet<&str> = scenario
        .topology_graph
        .edges
        .iter()
        .map(|e| e.id.as_str())
        .collect();
    let covered: HashSet<&str> = scenario
        .topology_graph
        .nodes
        .load_balancer
        .as_ref()
        .map(|lb| lb.server_covered.iter().map(String::as_str).collect())
        .unwrap_or_default();

    let mut event_ids: HashSet<&str> = HashSet::new();
    for event in &scenario.events {
        let entity = event.event_id.as_str();
        if !event_ids.insert(entity) {
            return Err(SimError::validation("event_id", entity, "duplicate event id"));
        }

        let expected_end = match event.start.kind {
            EventStartKind::ServerDown => EventEndKind::ServerUp,
            EventStartKind::NetworkSpikeStart => EventEndKind::NetworkSpikeEnd,
        };
        if event.end.kind != expected_end {
            return Err(SimError::validation(
                "end.kind",
                entity,
                format!("start kind requires {expected_end:?}"),
            ));
        }
        if !(0.0..=total).contains(&event.start.t_start) {
            return Err(SimError::validation(
                "start.t_start",
                entity,
                "must lie within the simulation horizon",
            ));
        }
        if event.end.t_end > total {
            return Err(SimError::validation(
                "end.t_end",
                entity,
                "must lie within the simulation horizon",
            ));
        }
        if event.start.t_start >= event.end.t_end {
            return Err(SimError::validation(
                "start.t_start",
                entity,
                "the start must precede the end",
            ));
        }

        match event.start.kind {
            EventStartKind::NetworkSpikeStart => {
                let spike = event.start.spike_s.ok_or_else(|| {
                    SimError::validation("start.spike_s", entity, "network spikes need spike_s")
                })?;
                if !(spike > 0.0) {
                    return Err(SimError::validation(
                        "start.spike_s",
                        entity,
                        "must be positive",
                    ));
                }
                if !edge_ids.contains(event.target_id.as_str()) {
                    return Err(SimError::validation(
                        "target_id",
                        entity,
                        format!("`{}` is not a declared edge", event.target_id),
                    ));
                }
            }
            EventStartKind::ServerDown => {
                if event.start.spike_s.is_some() {
                    return Err(SimError::validation(
                        "start.spike_s",
                        entity,
                        "server outages do not take spike_s",
                    ));
                }
                if !server_ids.contains(event.target_id.as_str()) {
                    return Err(SimError::validation(
                        "target_id",
                        entity,
                        format!("`{}` is not a declared server", event.target_id),
                    ));
                }
                if !covered.contains(event.target_id.as_str()) {
                    return Err(SimError::validation(
                        "target_id",
                        entity,
                        "outages only apply to servers covered by a load balancer",
                    ));
                }
            }
        }
    }

    validate_never_all_down(scenario, &server_ids)
}

/// Sweep the outage windows and reject any instant where every server is
/// down at once. End markers sort before start markers at equal times,
/// matching the runtime's transition order.
fn validate_never_all_down(
    scenario: &Scenario,
    server_ids: &HashSet<&str>,
) -> Result<(), SimError> {
    let mut points: Vec<(f64, bool, &str)> = Vec::new();
    for event in &scenario.events {
        if event.start.kind == EventStartKind::ServerDown {
            points.push((event.start.t_start, true, event.target_id.as_str()));
            points.push((event.end.t_end, false, event.target_id.as_str()));
        }
    }
    if points.is_empty() {
        return Ok(());
    }

    points.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .expect("event times are finite")
            .then_with(|| a.1.cmp(&b.1))
    });

    let mut down_depth: HashMap<&str, u32> = HashMap::new();
    let mut servers_down = 0usize;
    for (time, is_start, server) in points {
        let depth = down_depth.entry(server).or_default();
        if is_start {
            if *depth == 0 {
                servers_down += 1;
            }
            *depth += 1;
            if servers_down == server_ids.len() {
                return Err(SimError::validation(
                    "events",
                    server,
                    format!("all servers would be down at t={time}s"),
                ));
            }
        } else {
            *depth = depth.saturating_sub(1);
            if *depth == 0 {
                servers_down = servers_down.saturating_sub(1);
            }
        }
    }
    Ok(())
}
