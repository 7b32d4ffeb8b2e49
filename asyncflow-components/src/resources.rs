//! Server resources: CPU core tokens and the RAM reservoir.
//!
//! Both are level-based containers with blocking acquisition and strict
//! FIFO service. A waiter that arrives while older waiters are parked goes
//! to the back of the line even when the current level would satisfy it:
//! head-of-line blocking is what gives first-come-first-served fairness.
//! Releases hand capacity straight to the head waiters, so a task that
//! releases and immediately re-acquires cannot jump the queue.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use asyncflow_core::Scheduler;
use thiserror::Error;

type Waiter = (u64, Box<dyn FnOnce(&mut Scheduler)>);

#[derive(Debug, Error)]
#[error("over-release: level {level} + {amount} exceeds capacity {capacity}")]
pub struct OverRelease {
    pub level: u64,
    pub amount: u64,
    pub capacity: u64,
}

struct ReservoirInner {
    level: u64,
    capacity: u64,
    waiters: VecDeque<Waiter>,
}

/// A divisible resource with FIFO blocking acquisition.
#[derive(Clone)]
pub struct FifoReservoir {
    inner: Rc<RefCell<ReservoirInner>>,
}

impl FifoReservoir {
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ReservoirInner {
                level: capacity,
                capacity,
                waiters: VecDeque::new(),
            })),
        }
    }

    #[must_use]
    pub fn level(&self) -> u64 {
        self.inner.borrow().level
    }

    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.inner.borrow().capacity
    }

    #[must_use]
    pub fn waiting(&self) -> usize {
        self.inner.borrow().waiters.len()
    }

    /// Take `amount`, running `granted` once it is available. Acquisitions
    /// queue behind earlier waiters regardless of the current level.
    pub fn acquire<F>(&self, sched: &mut Scheduler, amount: u64, granted: F)
    where
        F: FnOnce(&mut Scheduler) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        if inner.waiters.is_empty() && inner.level >= amount {
            inner.level -= amount;
            drop(inner);
            sched.schedule_now(granted);
        } else {
            inner.waiters.push_back((amount, Box::new(granted)));
        }
    }

    /// Return `amount` and wake as many head-of-line waiters as now fit.
    pub fn release(&self, sched: &mut Scheduler, amount: u64) -> Result<(), OverRelease> {
        let mut ready: Vec<Box<dyn FnOnce(&mut Scheduler)>> = Vec::new();
        {
            let mut inner = self.inner.borrow_mut();
            let next = inner.level + amount;
            if next > inner.capacity {
                return Err(OverRelease {
                    level: inner.level,
                    amount,
                    capacity: inner.capacity,
                });
            }
            inner.level = next;

            while let Some((needed, _)) = inner.waiters.front() {
                if inner.level < *needed {
                    break;
                }
                let (needed, granted) = inner
                    .waiters
                    .pop_front()
                    .expect("front exists inside the loop");
                inner.level -= needed;
                ready.push(granted);
            }
        }
        for granted in ready {
            sched.schedule_now(granted);
        }
        Ok(())
    }
}

/// Counting semaphore over CPU cores. One token per core; handlers only
/// ever move single tokens.
#[derive(Clone)]
pub struct CpuTokenBucket {
    reservoir: FifoReservoir,
}

impl CpuTokenBucket {
    #[must_use]
    pub fn new(cpu_cores: u32) -> Self {
        Self {
            reservoir: FifoReservoir::new(u64::from(cpu_cores)),
        }
    }

    #[must_use]
    pub fn available(&self) -> u64 {
        self.reservoir.level()
    }

    #[must_use]
    pub fn cores(&self) -> u64 {
        self.reservoir.capacity()
    }

    pub fn acquire_core<F>(&self, sched: &mut Scheduler, granted: F)
    where
        F: FnOnce(&mut Scheduler) + 'static,
    {
        self.reservoir.acquire(sched, 1, granted);
    }

    pub fn release_core(&self, sched: &mut Scheduler) -> Result<(), OverRelease> {
        self.reservoir.release(sched, 1)
    }
}

/// RAM pool in megabytes. Whole-endpoint reservations are taken before the
/// first step runs and returned after the last one.
#[derive(Clone)]
pub struct RamReservoir {
    reservoir: FifoReservoir,
}

impl RamReservoir {
    #[must_use]
    pub fn new(ram_mb: u32) -> Self {
        Self {
            reservoir: FifoReservoir::new(u64::from(ram_mb)),
        }
    }

    #[must_use]
    pub fn available_mb(&self) -> u64 {
        self.reservoir.level()
    }

    #[must_use]
    pub fn capacity_mb(&self) -> u64 {
        self.reservoir.capacity()
    }

    #[must_use]
    pub fn waiting(&self) -> usize {
        self.reservoir.waiting()
    }

    pub fn acquire_mb<F>(&self, sched: &mut Scheduler, amount: u64, granted: F)
    where
        F: FnOnce(&mut Scheduler) + 'static,
    {
        self.reservoir.acquire(sched, amount, granted);
    }

    pub fn release_mb(&self, sched: &mut Scheduler, amount: u64) -> Result<(), OverRelease> {
        self.reservoir.release(sched, amount)
    }
}
