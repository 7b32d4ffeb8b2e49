//! The validated scenario consumed by the engine.
//!
//! A [`Scenario`] arrives fully formed from an external ingestion layer
//! (YAML, builder APIs, whatever): the engine does no parsing of its own.
//! [`validate`](crate::scenario::validate::validate) re-checks every
//! precondition the runtime depends on and is called by the runner before
//! anything is built.

pub mod validate;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use asyncflow_core::RVConfig;
use asyncflow_metrics::{EventMetricName, SampledMetricName};

/// Kinds of nodes a request can visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Generator,
    Client,
    Server,
    LoadBalancer,
}

/// Workload description: how many users are active and how often each one
/// fires requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RqsGenerator {
    pub id: String,
    pub avg_active_users: RVConfig,
    pub avg_request_per_minute_per_user: RVConfig,
    /// Seconds the active-user draw stays constant before resampling.
    pub user_sampling_window: u32,
}

/// CPU/RAM capacity of one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerResources {
    pub cpu_cores: u32,
    pub ram_mb: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_connection_pool: Option<u32>,
}

impl Default for ServerResources {
    fn default() -> Self {
        Self {
            cpu_cores: 1,
            ram_mb: 1024,
            db_connection_pool: None,
        }
    }
}

/// Observable tag of an endpoint step. Behavior depends only on the
/// CPU/RAM/IO class resolved via [`StepKind::class`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    InitialParsing,
    CpuBoundOperation,
    Ram,
    IoTaskSpawn,
    IoLlm,
    IoWait,
    IoDb,
    IoCache,
}

/// Behavioral class of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepClass {
    Cpu,
    Ram,
    Io,
}

impl StepKind {
    pub fn class(&self) -> StepClass {
        match self {
            StepKind::InitialParsing | StepKind::CpuBoundOperation => StepClass::Cpu,
            StepKind::Ram => StepClass::Ram,
            StepKind::IoTaskSpawn
            | StepKind::IoLlm
            | StepKind::IoWait
            | StepKind::IoDb
            | StepKind::IoCache => StepClass::Io,
        }
    }
}

/// The single operation a step performs. Exactly one variant per step,
/// matching the step kind's class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOperation {
    /// Seconds holding a CPU core.
    CpuTime(f64),
    /// Megabytes added to the endpoint's up-front reservation.
    NecessaryRam(u32),
    /// Seconds waiting without a core.
    IoWaitingTime(f64),
}

/// One step in an endpoint's execution chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub kind: StepKind,
    pub step_operation: StepOperation,
}

impl Step {
    pub fn cpu(kind: StepKind, time_s: f64) -> Self {
        Self {
            kind,
            step_operation: StepOperation::CpuTime(time_s),
        }
    }

    pub fn ram(mb: u32) -> Self {
        Self {
            kind: StepKind::Ram,
            step_operation: StepOperation::NecessaryRam(mb),
        }
    }

    pub fn io(kind: StepKind, time_s: f64) -> Self {
        Self {
            kind,
            step_operation: StepOperation::IoWaitingTime(time_s),
        }
    }
}

/// A named, ordered chain of steps. Endpoint names are lowercase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub endpoint_name: String,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientNode {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerNode {
    pub id: String,
    #[serde(default)]
    pub server_resources: ServerResources,
    pub endpoints: Vec<Endpoint>,
}

/// Load-balancing policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LbAlgorithm {
    RoundRobin,
    LeastConnection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerNode {
    pub id: String,
    pub algorithm: LbAlgorithm,
    pub server_covered: Vec<String>,
}

/// A directed network link between two declared endpoints of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub id: String,
    pub source: String,
    pub target: String,
    pub latency: RVConfig,
    #[serde(default)]
    pub dropout_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyNodes {
    pub client: ClientNode,
    pub servers: Vec<ServerNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancerNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyGraph {
    pub nodes: TopologyNodes,
    pub edges: Vec<EdgeConfig>,
}

/// Global run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Seconds of virtual time to simulate. At least 5.
    pub total_simulation_time: f64,
    /// Seconds between collector ticks, in `[0.001, 0.1]`.
    pub sample_period_s: f64,
    pub enabled_sample_metrics: HashSet<SampledMetricName>,
    pub enabled_event_metrics: HashSet<EventMetricName>,
}

impl SimulationSettings {
    /// Settings with the mandatory metric sets and a 10 ms sample period.
    pub fn with_horizon(total_simulation_time: f64) -> Self {
        Self {
            total_simulation_time,
            sample_period_s: 0.01,
            enabled_sample_metrics: SampledMetricName::mandatory_set(),
            enabled_event_metrics: EventMetricName::mandatory_set(),
        }
    }
}

/// Start/end marker kinds for injected events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStartKind {
    #[serde(rename = "SERVER_DOWN")]
    ServerDown,
    #[serde(rename = "NETWORK_SPIKE_START")]
    NetworkSpikeStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventEndKind {
    #[serde(rename = "SERVER_UP")]
    ServerUp,
    #[serde(rename = "NETWORK_SPIKE_END")]
    NetworkSpikeEnd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventStart {
    pub kind: EventStartKind,
    pub t_start: f64,
    /// Additive latency offset, seconds. Present for network spikes only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spike_s: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnd {
    pub kind: EventEndKind,
    pub t_end: f64,
}

/// One planned perturbation: a server outage window or an additive latency
/// spike window on an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInjection {
    pub event_id: String,
    pub target_id: String,
    pub start: EventStart,
    pub end: EventEnd,
}

/// The complete engine input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub rqs_generator: RqsGenerator,
    pub topology_graph: TopologyGraph,
    pub sim_settings: SimulationSettings,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EventInjection>,
}
