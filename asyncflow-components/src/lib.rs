//! Actor runtimes, resources and the simulation runner for AsyncFlow.
//!
//! The engine models an asynchronous backend as cooperating actors over
//! virtual time: a traffic generator feeds a client, which relays requests
//! through (optionally) a load balancer to event-loop servers and back.
//! All communication goes through [`Mailbox`]es; server capacity is
//! modeled by CPU core tokens and a RAM reservoir with FIFO blocking;
//! planned outages and latency spikes are replayed by the event injector.
//!
//! Entry point: build a [`scenario::Scenario`], hand it to
//! [`SimulationRunner`], get back an
//! [`asyncflow_metrics::SimulationResults`].

pub mod actors;
pub mod events;
pub mod mailbox;
pub mod ordered;
pub mod request;
pub mod resources;
pub mod runner;
pub mod scenario;
pub mod workload;

pub use actors::{
    ClientRuntime, EdgeRuntime, LoadBalancerRuntime, RqsGeneratorRuntime, ServerRuntime,
};
pub use events::{EventInjectionRuntime, LiveEdgeSet, SpikeBoard};
pub use mailbox::Mailbox;
pub use ordered::OrderedMap;
pub use request::{Hop, RequestState};
pub use resources::{CpuTokenBucket, FifoReservoir, RamReservoir};
pub use runner::SimulationRunner;
pub use workload::WorkloadSampler;
