//! Per-request event records.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::names::EventMetricName;

/// Start/finish pair for one completed request, in seconds of virtual time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestClock {
    pub start: f64,
    pub finish: f64,
}

impl RequestClock {
    #[must_use]
    pub fn latency(&self) -> f64 {
        self.finish - self.start
    }
}

/// Store the terminal client appends to, one entry per completed request.
#[derive(Debug, Default)]
pub struct RequestClockStore {
    enabled: bool,
    clocks: RefCell<Vec<RequestClock>>,
}

impl RequestClockStore {
    #[must_use]
    pub fn with_enabled(enabled: &HashSet<EventMetricName>) -> Rc<Self> {
        Rc::new(Self {
            enabled: enabled.contains(&EventMetricName::RqsClock),
            clocks: RefCell::new(Vec::new()),
        })
    }

    pub fn record(&self, start: f64, finish: f64) {
        if self.enabled {
            self.clocks.borrow_mut().push(RequestClock { start, finish });
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clocks.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clocks.borrow().is_empty()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<RequestClock> {
        self.clocks.borrow().clone()
    }
}
