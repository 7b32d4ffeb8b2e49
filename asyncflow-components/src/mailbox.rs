//! FIFO mailboxes: the only channel between actors.
//!
//! A mailbox is single-consumer (the owning actor) and multi-producer.
//! `get` parks the consumer's continuation until a message arrives; `put`
//! on a full bounded mailbox parks the producer, released in FIFO order as
//! the consumer drains. Handoffs always go through the scheduler's event
//! queue, so same-time deliveries keep their arrival order.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use asyncflow_core::Scheduler;

type Consumer<T> = Box<dyn FnOnce(&mut Scheduler, T)>;
type Producer = Box<dyn FnOnce(&mut Scheduler)>;

struct Inner<T> {
    queue: VecDeque<T>,
    capacity: Option<usize>,
    consumer: Option<Consumer<T>>,
    blocked_producers: VecDeque<(T, Producer)>,
}

/// Clonable handle to one mailbox.
pub struct Mailbox<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Mailbox<T> {
    #[must_use]
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                queue: VecDeque::new(),
                capacity,
                consumer: None,
                blocked_producers: VecDeque::new(),
            })),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().queue.is_empty()
    }

    /// Deliver `message`, then run `accepted`. On an unbounded mailbox the
    /// continuation fires at the current time; on a full bounded mailbox
    /// both the message and the continuation wait for space.
    pub fn put<F>(&self, sched: &mut Scheduler, message: T, accepted: F)
    where
        F: FnOnce(&mut Scheduler) + 'static,
    {
        let mut inner = self.inner.borrow_mut();

        if let Some(consumer) = inner.consumer.take() {
            debug_assert!(inner.queue.is_empty(), "parked consumer with queued items");
            drop(inner);
            sched.schedule_now(move |s| consumer(s, message));
            sched.schedule_now(accepted);
            return;
        }

        let full = inner
            .capacity
            .is_some_and(|capacity| inner.queue.len() >= capacity);
        if full {
            inner
                .blocked_producers
                .push_back((message, Box::new(accepted)));
            return;
        }

        inner.queue.push_back(message);
        drop(inner);
        sched.schedule_now(accepted);
    }

    /// Receive the next message into `consumer`, parking it if the queue
    /// is empty. A mailbox holds at most one parked consumer.
    ///
    /// # Panics
    ///
    /// Panics if a consumer is already parked; mailboxes are
    /// single-consumer by contract.
    pub fn get<F>(&self, sched: &mut Scheduler, consumer: F)
    where
        F: FnOnce(&mut Scheduler, T) + 'static,
    {
        let mut inner = self.inner.borrow_mut();

        let Some(message) = inner.queue.pop_front() else {
            assert!(
                inner.consumer.is_none(),
                "mailbox already has a parked consumer"
            );
            inner.consumer = Some(Box::new(consumer));
            return;
        };

        // Space opened up: admit the longest-waiting blocked producer.
        if let Some((queued, accepted)) = inner.blocked_producers.pop_front() {
            inner.queue.push_back(queued);
            sched.schedule_now(accepted);
        }

        drop(inner);
        sched.schedule_now(move |s| consumer(s, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn put_then_get_delivers_in_fifo_order() {
        let mut sched = Scheduler::new();
        let mailbox: Mailbox<u32> = Mailbox::unbounded();
        let seen: Rc<RefCell<Vec<u32>>> = Rc::default();

        for value in [1u32, 2, 3] {
            mailbox.put(&mut sched, value, |_| {});
        }
        for _ in 0..3 {
            let seen = Rc::clone(&seen);
            mailbox.get(&mut sched, move |_, value| seen.borrow_mut().push(value));
        }

        sched.run_to_completion();
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn parked_consumer_wakes_on_put() {
        let mut sched = Scheduler::new();
        let mailbox: Mailbox<&'static str> = Mailbox::unbounded();
        let seen: Rc<RefCell<Vec<&'static str>>> = Rc::default();

        let probe = Rc::clone(&seen);
        mailbox.get(&mut sched, move |_, value| probe.borrow_mut().push(value));
        assert!(seen.borrow().is_empty());

        mailbox.put(&mut sched, "hello", |_| {});
        sched.run_to_completion();
        assert_eq!(*seen.borrow(), vec!["hello"]);
    }

    #[test]
    fn bounded_mailbox_blocks_producers_until_drained() {
        let mut sched = Scheduler::new();
        let mailbox: Mailbox<u32> = Mailbox::bounded(1);
        let accepted: Rc<RefCell<Vec<u32>>> = Rc::default();

        for value in [1u32, 2] {
            let accepted = Rc::clone(&accepted);
            mailbox.put(&mut sched, value, move |_| accepted.borrow_mut().push(value));
        }
        sched.run_to_completion();
        // Second producer is parked along with its message.
        assert_eq!(*accepted.borrow(), vec![1]);
        assert_eq!(mailbox.len(), 1);

        let seen: Rc<RefCell<Vec<u32>>> = Rc::default();
        let probe = Rc::clone(&seen);
        mailbox.get(&mut sched, move |_, v| probe.borrow_mut().push(v));
        sched.run_to_completion();

        assert_eq!(*accepted.borrow(), vec![1, 2]);
        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(mailbox.len(), 1);
    }
}
