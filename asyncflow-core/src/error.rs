//! Error taxonomy for the simulation engine.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

/// Top-level error returned by the runner and by pre-run validation.
///
/// The engine distinguishes three fatal kinds: malformed scenarios
/// (`Validation`), broken run-time preconditions (`Configuration`), and
/// internal state violations observed mid-run (`Consistency`). Dropped
/// deliveries and degenerate sampling windows are absorbed by the actors
/// and never surface here.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid scenario field `{field}` on `{entity}`: {message}")]
    Validation {
        field: String,
        entity: String,
        message: String,
    },

    #[error("configuration error at t={sim_time}s: {message}")]
    Configuration { message: String, sim_time: f64 },

    #[error("simulation consistency violated on `{entity}` at t={sim_time}s (request {request:?}): {message}")]
    Consistency {
        entity: String,
        sim_time: f64,
        request: Option<u64>,
        message: String,
    },
}

impl SimError {
    pub fn validation(field: &str, entity: &str, message: impl Into<String>) -> Self {
        SimError::Validation {
            field: field.to_string(),
            entity: entity.to_string(),
            message: message.into(),
        }
    }
}

/// Shared cell through which actors report a fatal mid-run failure.
///
/// The run loop polls the cell after every event; the first tripped error
/// wins and aborts the run. Actors keep a clone and call
/// [`FaultCell::trip`] when they observe an impossible state (counter
/// underflow, resource over-release, missing target mailbox).
#[derive(Clone, Default)]
pub struct FaultCell {
    slot: Rc<RefCell<Option<SimError>>>,
}

impl FaultCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error` unless an earlier fault is already pending.
    pub fn trip(&self, error: SimError) {
        let mut slot = self.slot.borrow_mut();
        if slot.is_none() {
            tracing::error!(%error, "simulation fault tripped");
            *slot = Some(error);
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.slot.borrow().is_some()
    }

    pub fn take(&self) -> Option<SimError> {
        self.slot.borrow_mut().take()
    }
}
