//! Event scheduling and time management for the simulation engine.
//!
//! The [`Scheduler`] owns a priority queue of closure events ordered by
//! `(time, sequence number)`. Popping an event advances the virtual clock
//! to the event's timestamp and runs the closure with `&mut Scheduler`, so
//! an event can schedule follow-up work directly. Cooperative actors are
//! expressed as chains of such closures: every suspension point (timeout,
//! mailbox get, resource acquire) schedules the continuation and returns.
//!
//! # Ordering rules
//!
//! * Events at distinct times execute in time order.
//! * Events at equal times execute in insertion order (FIFO by sequence
//!   number). There is no same-time reordering anywhere in the engine, so
//!   a run is bit-exact reproducible given a fixed RNG seed.
//!
//! # Reading time
//!
//! `Scheduler::time()` returns the current virtual time. Components that
//! need to read the clock while the scheduler is borrowed elsewhere hold a
//! [`ClockRef`].

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::time::SimTime;

/// A scheduled unit of work. Runs at its timestamp with scheduler access.
pub type EventFn = Box<dyn FnOnce(&mut Scheduler)>;

struct EventEntry {
    seq: u64,
    time: SimTime,
    run: EventFn,
}

impl PartialEq for EventEntry {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for EventEntry {}

impl PartialOrd for EventEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed on (time, seq) so BinaryHeap behaves as a min-heap with
        // FIFO service at equal timestamps.
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A cheap, clonable handle for reading the virtual clock.
#[derive(Clone)]
pub struct ClockRef {
    clock: Rc<Cell<u64>>,
}

impl ClockRef {
    #[must_use]
    pub fn time(&self) -> SimTime {
        SimTime::from_nanos(self.clock.get())
    }
}

/// Single-threaded cooperative event scheduler over virtual time.
pub struct Scheduler {
    next_seq: u64,
    events: BinaryHeap<EventEntry>,
    clock: Rc<Cell<u64>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            events: BinaryHeap::new(),
            clock: Rc::new(Cell::new(0)),
        }
    }

    /// Current virtual time.
    #[must_use]
    pub fn time(&self) -> SimTime {
        SimTime::from_nanos(self.clock.get())
    }

    /// A handle for reading the clock without scheduler access.
    #[must_use]
    pub fn clock(&self) -> ClockRef {
        ClockRef {
            clock: Rc::clone(&self.clock),
        }
    }

    /// Schedule `event` at the absolute time `at`.
    ///
    /// Times earlier than `now` are clamped to `now`: virtual time never
    /// moves backward.
    pub fn schedule_at<F>(&mut self, at: SimTime, event: F)
    where
        F: FnOnce(&mut Scheduler) + 'static,
    {
        let at = at.max(self.time());
        self.next_seq += 1;
        trace!(seq = self.next_seq, time = %at, "event scheduled");
        self.events.push(EventEntry {
            seq: self.next_seq,
            time: at,
            run: Box::new(event),
        });
    }

    /// Schedule `event` to run `delay` after the current time.
    pub fn schedule_in<F>(&mut self, delay: SimTime, event: F)
    where
        F: FnOnce(&mut Scheduler) + 'static,
    {
        self.schedule_at(self.time() + delay, event);
    }

    /// Schedule `event` at the current time, behind already-queued
    /// same-time events.
    pub fn schedule_now<F>(&mut self, event: F)
    where
        F: FnOnce(&mut Scheduler) + 'static,
    {
        self.schedule_at(self.time(), event);
    }

    /// Timestamp of the next queued event, if any.
    #[must_use]
    pub fn peek_time(&self) -> Option<SimTime> {
        self.events.peek().map(|e| e.time)
    }

    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Pop and run the next event, advancing the clock to its timestamp.
    /// Returns `false` when the queue is empty.
    pub fn step(&mut self) -> bool {
        let Some(entry) = self.events.pop() else {
            return false;
        };
        debug_assert!(entry.time >= self.time(), "virtual time moved backward");
        self.clock.set(entry.time.as_nanos());
        (entry.run)(self);
        true
    }

    /// Run events until the queue is empty or the next event lies past
    /// `horizon`, then park the clock at `horizon`.
    ///
    /// Events stamped exactly at `horizon` are executed. Returns the number
    /// of events processed.
    pub fn run_until(&mut self, horizon: SimTime) -> usize {
        let mut steps = 0usize;
        while self.peek_time().is_some_and(|t| t <= horizon) {
            self.step();
            steps += 1;
            if steps % 100_000 == 0 {
                debug!(steps, time = %self.time(), "run progress");
            }
        }
        if self.time() < horizon {
            self.clock.set(horizon.as_nanos());
        }
        steps
    }

    /// Run until no events remain. Intended for tests; a periodic task
    /// keeps this loop alive forever.
    pub fn run_to_completion(&mut self) -> usize {
        let mut steps = 0usize;
        while self.step() {
            steps += 1;
        }
        steps
    }
}
