//! Actor runtimes: the cooperative tasks a scenario is wired from.

pub mod client;
pub mod edge;
pub mod generator;
pub mod load_balancer;
pub mod server;

pub use client::ClientRuntime;
pub use edge::EdgeRuntime;
pub use generator::RqsGeneratorRuntime;
pub use load_balancer::LoadBalancerRuntime;
pub use server::ServerRuntime;
