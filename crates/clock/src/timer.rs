use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use mediaclock_ports::HostTimerHandle;

static NEXT_TIMER_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Local handle to a scheduled callback, returned by
/// `ClockNode::set_at_time`/`set_timeout` and accepted by
/// `clear_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    fn next() -> Self {
        Self(NEXT_TIMER_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

struct TimerEntry {
    /// The target instant, in the owning clock's own ticks.
    when: f64,
    callback: Option<Box<dyn FnOnce()>>,
    real_handle: Option<HostTimerHandle>,
}

/// A clock's pending-timer table: local handle to
/// `{ when, callback, realHandle }`. `realHandle` is present iff a
/// host-level timer is currently armed for that entry.
#[derive(Default)]
pub struct TimerRegistry {
    entries: RefCell<HashMap<TimerHandle, TimerEntry>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new, not-yet-armed entry and return its handle.
    pub fn insert(&self, when: f64, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let handle = TimerHandle::next();
        self.entries.borrow_mut().insert(
            handle,
            TimerEntry {
                when,
                callback: Some(callback),
                real_handle: None,
            },
        );
        handle
    }

    pub fn when(&self, handle: TimerHandle) -> Option<f64> {
        self.entries.borrow().get(&handle).map(|e| e.when)
    }

    pub fn all_handles(&self) -> Vec<TimerHandle> {
        self.entries.borrow().keys().copied().collect()
    }

    /// Record that a host timer is now armed for `handle`.
    pub fn set_real_handle(&self, handle: TimerHandle, real: Option<HostTimerHandle>) {
        if let Some(entry) = self.entries.borrow_mut().get_mut(&handle) {
            entry.real_handle = real;
        }
    }

    /// Take (and clear) the currently-armed host handle, if any.
    pub fn take_real_handle(&self, handle: TimerHandle) -> Option<HostTimerHandle> {
        self.entries
            .borrow_mut()
            .get_mut(&handle)
            .and_then(|e| e.real_handle.take())
    }

    /// Remove the entry and return its callback, for firing.
    pub fn take_for_firing(&self, handle: TimerHandle) -> Option<Box<dyn FnOnce()>> {
        self.entries
            .borrow_mut()
            .remove(&handle)
            .and_then(|e| e.callback)
    }

    /// Remove the entry outright (used by `clear_timeout`); returns
    /// the host handle that was armed, if any, so the caller can
    /// cancel it.
    pub fn remove(&self, handle: TimerHandle) -> Option<HostTimerHandle> {
        self.entries
            .borrow_mut()
            .remove(&handle)
            .and_then(|e| e.real_handle)
    }
}
