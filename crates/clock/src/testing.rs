//! A deterministic, manually-advanced [`Host`] for tests.
//!
//! Exercises the real scheduling/rearming code paths in [`crate::node`]
//! without depending on wall-clock sleeps: pending timers are kept in
//! a min-heap ordered by due time (grounded in
//! `nautechsystems-nautilus_trader`'s `TestClock`, which orders
//! pending timers in a `BinaryHeap`), and [`ManualHost::advance`] fires
//! whatever is due, in non-decreasing time order, as the virtual clock
//! moves forward.

use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;
use std::rc::Rc;

use priority_queue::PriorityQueue;

use mediaclock_ports::{Host, HostTimerHandle};

#[derive(Debug, Clone, Copy, PartialEq)]
struct DueTime(f64);

impl Eq for DueTime {}

impl PartialOrd for DueTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DueTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

struct Inner {
    millis: f64,
    queue: PriorityQueue<HostTimerHandle, Reverse<DueTime>>,
    callbacks: HashMap<HostTimerHandle, Box<dyn FnOnce()>>,
}

/// A fake host clock/scheduler pair for deterministic tests.
pub struct ManualHost {
    inner: RefCell<Inner>,
}

impl ManualHost {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            inner: RefCell::new(Inner {
                millis: 0.0,
                queue: PriorityQueue::new(),
                callbacks: HashMap::new(),
            }),
        })
    }

    /// Jump the virtual clock directly to `millis` without firing any
    /// pending timers. Intended for initial test setup, before any
    /// timers exist; use [`ManualHost::advance`] to move time forward
    /// through pending deadlines.
    pub fn set_millis(&self, millis: f64) {
        self.inner.borrow_mut().millis = millis;
    }

    /// Advance the virtual clock by `delta_ms`, firing every timer
    /// whose deadline falls within the new window, in non-decreasing
    /// time order.
    pub fn advance(&self, delta_ms: f64) {
        let target = self.inner.borrow().millis + delta_ms;
        self.advance_to(target);
    }

    /// Advance the virtual clock to the absolute instant
    /// `target_millis`, firing due timers along the way.
    pub fn advance_to(&self, target_millis: f64) {
        loop {
            let due = self
                .inner
                .borrow()
                .queue
                .peek()
                .map(|(_, Reverse(DueTime(d)))| *d);
            match due {
                Some(d) if d <= target_millis => {
                    let popped = self.inner.borrow_mut().queue.pop();
                    let Some((handle, _)) = popped else { break };
                    {
                        let mut inner = self.inner.borrow_mut();
                        if inner.millis < d {
                            inner.millis = d;
                        }
                    }
                    let callback = self.inner.borrow_mut().callbacks.remove(&handle);
                    if let Some(callback) = callback {
                        callback();
                    }
                }
                _ => break,
            }
        }
        let mut inner = self.inner.borrow_mut();
        if inner.millis < target_millis {
            inner.millis = target_millis;
        }
    }

    /// Number of still-armed timers.
    pub fn pending_count(&self) -> usize {
        self.inner.borrow().queue.len()
    }
}

impl Host for ManualHost {
    fn now_millis(&self) -> f64 {
        self.inner.borrow().millis
    }

    fn schedule_after(&self, delay_ms: f64, callback: Box<dyn FnOnce()>) -> HostTimerHandle {
        let handle = HostTimerHandle::next();
        let mut inner = self.inner.borrow_mut();
        let due = inner.millis + delay_ms;
        inner.callbacks.insert(handle, callback);
        inner.queue.push(handle, Reverse(DueTime(due)));
        handle
    }

    fn cancel(&self, handle: HostTimerHandle) {
        let mut inner = self.inner.borrow_mut();
        inner.queue.remove(&handle);
        inner.callbacks.remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_due_timers_in_order() {
        let host = ManualHost::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o1 = order.clone();
        host.schedule_after(30.0, Box::new(move || o1.borrow_mut().push("late")));
        let o2 = order.clone();
        host.schedule_after(10.0, Box::new(move || o2.borrow_mut().push("early")));

        host.advance(50.0);
        assert_eq!(*order.borrow(), vec!["early", "late"]);
        assert_eq!(host.pending_count(), 0);
    }

    #[test]
    fn cancel_prevents_firing() {
        let host = ManualHost::new();
        let fired = Rc::new(RefCell::new(false));
        let f = fired.clone();
        let handle = host.schedule_after(10.0, Box::new(move || *f.borrow_mut() = true));
        host.cancel(handle);
        host.advance(20.0);
        assert!(!*fired.borrow());
    }

    #[test]
    fn advance_does_not_fire_timers_beyond_the_window() {
        let host = ManualHost::new();
        let fired = Rc::new(RefCell::new(false));
        let f = fired.clone();
        host.schedule_after(100.0, Box::new(move || *f.borrow_mut() = true));
        host.advance(10.0);
        assert!(!*fired.borrow());
        assert_eq!(host.pending_count(), 1);
    }
}
