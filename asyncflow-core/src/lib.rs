//! Core discrete event engine for the AsyncFlow backend simulator.
//!
//! This crate provides the leaves every other layer builds on:
//!
//! - [`SimTime`]: virtual time with nanosecond resolution.
//! - [`Scheduler`]: a single-threaded cooperative event loop over a
//!   `(time, sequence)`-ordered priority queue. Actors are chains of
//!   closures; every suspension point schedules a continuation.
//! - [`SimRng`]: the scenario-wide seedable random stream, plus the
//!   distribution samplers ([`RvSampler`]) resolved from scenario
//!   configuration.
//! - [`SimError`] / [`FaultCell`]: the engine's error taxonomy and the
//!   mechanism actors use to abort a run on an impossible state.
//!
//! Higher layers live in `asyncflow-components` (actors, resources,
//! runner) and `asyncflow-metrics` (collection and analysis).

pub mod error;
pub mod logging;
pub mod rng;
pub mod samplers;
pub mod scheduler;
pub mod time;

pub use error::{FaultCell, SimError};
pub use logging::{init_simulation_logging, init_simulation_logging_with_level};
pub use rng::{SimRng, UNIFORM_EPSILON};
pub use samplers::{exponential_gap, DistributionFamily, RVConfig, RvSampler, SamplerError};
pub use scheduler::{ClockRef, EventFn, Scheduler};
pub use time::SimTime;
