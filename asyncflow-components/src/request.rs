//! The mutable record carried by each request through the system.

use asyncflow_core::SimTime;

use crate::scenario::NodeKind;

/// One visit to an actor, recorded on arrival. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub node: NodeKind,
    pub component_id: String,
    pub at: SimTime,
}

/// State owned by exactly one actor at a time and moved between them
/// through mailboxes. Metrics only ever copy out `(start, finish)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestState {
    pub id: u64,
    pub initial_time: SimTime,
    /// Set exactly once: at the terminal client, or by an edge dropping
    /// the delivery.
    pub finish_time: Option<SimTime>,
    /// Append-only trace of actor visits.
    pub history: Vec<Hop>,
}

impl RequestState {
    #[must_use]
    pub fn new(id: u64, initial_time: SimTime) -> Self {
        Self {
            id,
            initial_time,
            finish_time: None,
            history: Vec::new(),
        }
    }

    pub fn record_hop(&mut self, node: NodeKind, component_id: &str, at: SimTime) {
        self.history.push(Hop {
            node,
            component_id: component_id.to_string(),
            at,
        });
    }

    /// Total time in the system, or `None` while still in flight.
    #[must_use]
    pub fn latency(&self) -> Option<f64> {
        self.finish_time
            .map(|finish| finish.as_secs_f64() - self.initial_time.as_secs_f64())
    }

    /// The hop before the most recent one, used by the client to decide
    /// between relaying and terminating.
    #[must_use]
    pub fn previous_hop(&self) -> Option<&Hop> {
        self.history.len().checked_sub(2).map(|i| &self.history[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hops_accumulate_in_order() {
        let mut state = RequestState::new(7, SimTime::zero());
        state.record_hop(NodeKind::Generator, "gen-1", SimTime::zero());
        state.record_hop(NodeKind::Client, "client-1", SimTime::from_millis(3));

        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history[0].component_id, "gen-1");
        assert_eq!(state.previous_hop().unwrap().node, NodeKind::Generator);
    }

    #[test]
    fn latency_needs_a_finish_time() {
        let mut state = RequestState::new(1, SimTime::from_secs(1));
        assert_eq!(state.latency(), None);
        state.finish_time = Some(SimTime::from_millis(1_500));
        assert!((state.latency().unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn previous_hop_requires_two_entries() {
        let mut state = RequestState::new(1, SimTime::zero());
        assert!(state.previous_hop().is_none());
        state.record_hop(NodeKind::Generator, "gen-1", SimTime::zero());
        assert!(state.previous_hop().is_none());
    }
}
