//! Planned event injection: server outages and edge latency spikes.
//!
//! One centralized runtime owns both timelines. Transitions are O(1) and
//! become visible to the rest of the system purely through shared data:
//! edges read their additive offset from the [`SpikeBoard`] when a
//! delivery is scheduled, and the load balancer sees outages as entries
//! vanishing from (and rejoining) its live edge map. Actors carry no
//! outage flags of their own.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use asyncflow_core::{Scheduler, SimTime};
use tracing::debug;

use crate::actors::edge::EdgeRuntime;
use crate::ordered::OrderedMap;
use crate::scenario::{EventInjection, EventStartKind};

/// Shared view of the spike state: written only by the injector, read by
/// edges between yields. Single-writer discipline, no locking.
pub struct SpikeBoard {
    affected: HashSet<String>,
    spikes: RefCell<HashMap<String, f64>>,
}

impl SpikeBoard {
    /// Pre-register every edge any spike event will ever touch.
    #[must_use]
    pub fn from_events(events: &[EventInjection]) -> Rc<Self> {
        let affected: HashSet<String> = events
            .iter()
            .filter(|e| e.start.kind == EventStartKind::NetworkSpikeStart)
            .map(|e| e.target_id.clone())
            .collect();
        let spikes = affected.iter().map(|id| (id.clone(), 0.0)).collect();
        Rc::new(Self {
            affected,
            spikes: RefCell::new(spikes),
        })
    }

    #[must_use]
    pub fn is_affected(&self, edge_id: &str) -> bool {
        self.affected.contains(edge_id)
    }

    /// Cumulative additive offset currently active on `edge_id`. Edges not
    /// named by any event short-circuit to zero.
    #[must_use]
    pub fn offset(&self, edge_id: &str) -> f64 {
        if !self.affected.contains(edge_id) {
            return 0.0;
        }
        self.spikes.borrow().get(edge_id).copied().unwrap_or(0.0)
    }

    /// Shift the offset of `edge_id` by `delta` (positive on start,
    /// negative on end). Overlapping spikes add linearly.
    pub fn apply(&self, edge_id: &str, delta: f64) {
        let mut spikes = self.spikes.borrow_mut();
        let slot = spikes.entry(edge_id.to_string()).or_insert(0.0);
        *slot += delta;
        // Floating point residue from the matching start/end pair.
        if slot.abs() < 1e-12 {
            *slot = 0.0;
        }
    }
}

/// The load balancer's live edge set, aliased between the balancer (reads)
/// and the injector (writes).
pub type LiveEdgeSet = Rc<RefCell<OrderedMap<EdgeRuntime>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Start,
    End,
}

struct TimelineEntry {
    at: SimTime,
    mark: Mark,
    event_id: String,
    target_id: String,
    /// Spike amount for network events; zero for server transitions.
    spike_s: f64,
}

struct InjectorInner {
    edges_timeline: Vec<TimelineEntry>,
    servers_timeline: Vec<TimelineEntry>,
    spikes: Rc<SpikeBoard>,
    lb_out_edges: Option<LiveEdgeSet>,
    /// Reverse index: covered server id -> its LB edge (id and handle).
    edge_by_server: HashMap<String, (String, EdgeRuntime)>,
}

/// Centralized process replaying both event timelines over virtual time.
pub struct EventInjectionRuntime {
    inner: Rc<InjectorInner>,
}

impl EventInjectionRuntime {
    #[must_use]
    pub fn new(
        events: &[EventInjection],
        spikes: Rc<SpikeBoard>,
        lb_out_edges: Option<LiveEdgeSet>,
        edge_by_server: HashMap<String, (String, EdgeRuntime)>,
    ) -> Self {
        let mut edges_timeline = Vec::new();
        let mut servers_timeline = Vec::new();

        for event in events {
            let (timeline, spike_s) = match event.start.kind {
                EventStartKind::NetworkSpikeStart => {
                    (&mut edges_timeline, event.start.spike_s.unwrap_or(0.0))
                }
                EventStartKind::ServerDown => (&mut servers_timeline, 0.0),
            };
            timeline.push(TimelineEntry {
                at: SimTime::from_secs_f64(event.start.t_start),
                mark: Mark::Start,
                event_id: event.event_id.clone(),
                target_id: event.target_id.clone(),
                spike_s,
            });
            timeline.push(TimelineEntry {
                at: SimTime::from_secs_f64(event.end.t_end),
                mark: Mark::End,
                event_id: event.event_id.clone(),
                target_id: event.target_id.clone(),
                spike_s,
            });
        }

        // End precedes Start at equal timestamps, so a down/up handover at
        // one instant never passes through an "all servers down" state.
        let order = |entry: &TimelineEntry| {
            (
                entry.at,
                entry.mark == Mark::Start,
                entry.event_id.clone(),
                entry.target_id.clone(),
            )
        };
        edges_timeline.sort_by_key(order);
        servers_timeline.sort_by_key(order);

        Self {
            inner: Rc::new(InjectorInner {
                edges_timeline,
                servers_timeline,
                spikes,
                lb_out_edges,
                edge_by_server,
            }),
        }
    }

    #[must_use]
    pub fn spike_board(&self) -> Rc<SpikeBoard> {
        Rc::clone(&self.inner.spikes)
    }

    /// Schedule both timeline walks. Must run before any actor starts so
    /// transitions stamped at t=0 apply ahead of traffic.
    pub fn start(&self, sched: &mut Scheduler) {
        Self::walk_edges(Rc::clone(&self.inner), 0, sched);
        Self::walk_servers(Rc::clone(&self.inner), 0, sched);
    }

    fn walk_edges(inner: Rc<InjectorInner>, index: usize, sched: &mut Scheduler) {
        let Some(entry) = inner.edges_timeline.get(index) else {
            return;
        };
        let at = entry.at;
        sched.schedule_at(at, move |s| {
            let entry = &inner.edges_timeline[index];
            let delta = match entry.mark {
                Mark::Start => entry.spike_s,
                Mark::End => -entry.spike_s,
            };
            inner.spikes.apply(&entry.target_id, delta);
            debug!(
                event = %entry.event_id,
                edge = %entry.target_id,
                offset = inner.spikes.offset(&entry.target_id),
                "spike transition"
            );
            Self::walk_edges(Rc::clone(&inner), index + 1, s);
        });
    }

    fn walk_servers(inner: Rc<InjectorInner>, index: usize, sched: &mut Scheduler) {
        let Some(entry) = inner.servers_timeline.get(index) else {
            return;
        };
        let at = entry.at;
        sched.schedule_at(at, move |s| {
            let entry = &inner.servers_timeline[index];
            if let Some((edge_id, handle)) = inner.edge_by_server.get(&entry.target_id) {
                if let Some(live) = &inner.lb_out_edges {
                    let mut live = live.borrow_mut();
                    match entry.mark {
                        Mark::Start => {
                            live.remove(edge_id);
                        }
                        Mark::End => {
                            // Rejoin at the least-recently-used position.
                            live.insert(edge_id, handle.clone());
                            live.move_to_end(edge_id);
                        }
                    }
                    debug!(
                        event = %entry.event_id,
                        server = %entry.target_id,
                        live = live.len(),
                        "outage transition"
                    );
                }
            }
            Self::walk_servers(Rc::clone(&inner), index + 1, s);
        });
    }
}
