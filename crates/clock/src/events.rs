use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use mediaclock_core::EventKind;

use crate::node::ClockRef;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned by [`EventBus::on`], used to unregister a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(ClockRef)>;

/// Minimal publish/subscribe mechanism backing `change`/`available`/
/// `unavailable` events.
///
/// Emission is synchronous and isolates each callback: a listener that
/// panics is caught and logged, never preventing the remaining
/// listeners from running.
#[derive(Default)]
pub struct EventBus {
    listeners: RefCell<HashMap<EventKind, Vec<(ListenerId, Rc<RefCell<Listener>>)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `kind`, returning an id usable with
    /// [`EventBus::off`]. Listeners fire in registration order.
    pub fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push((id, Rc::new(RefCell::new(listener))));
        id
    }

    /// Unregister a listener. Unknown ids are a no-op.
    pub fn off(&self, kind: EventKind, id: ListenerId) {
        if let Some(list) = self.listeners.borrow_mut().get_mut(&kind) {
            list.retain(|(existing, _)| *existing != id);
        }
    }

    /// Synchronously fan `payload` out to every listener registered
    /// for `kind`, in registration order.
    ///
    /// Listeners may register or unregister other listeners (e.g. a
    /// reparenting handler) from within their callback, so the
    /// registry borrow is released before any callback runs.
    pub fn emit(&self, kind: EventKind, payload: ClockRef) {
        let snapshot: Vec<(ListenerId, Rc<RefCell<Listener>>)> = self
            .listeners
            .borrow()
            .get(&kind)
            .map(|list| list.clone())
            .unwrap_or_default();

        for (id, listener) in snapshot {
            // Skip listeners removed by an earlier callback in this fan-out.
            let still_registered = self
                .listeners
                .borrow()
                .get(&kind)
                .map(|list| list.iter().any(|(existing, _)| *existing == id))
                .unwrap_or(false);
            if !still_registered {
                continue;
            }

            let payload = payload.clone();
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                (listener.borrow_mut())(payload);
            }));
            if let Err(panic) = result {
                log::warn!("clock event listener panicked: {}", panic_message(&*panic));
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root::{RootClock, RootClockOptions};
    use crate::testing::ManualHost;
    use std::cell::Cell;

    #[test]
    fn listeners_fire_in_order() {
        let host = ManualHost::new();
        let root = RootClock::new(host, RootClockOptions::default());
        let bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o1 = order.clone();
        bus.on(EventKind::Change, Box::new(move |_| o1.borrow_mut().push(1)));
        let o2 = order.clone();
        bus.on(EventKind::Change, Box::new(move |_| o2.borrow_mut().push(2)));

        bus.emit(EventKind::Change, root.clone() as ClockRef);
        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn off_removes_listener() {
        let host = ManualHost::new();
        let root = RootClock::new(host, RootClockOptions::default());
        let bus = EventBus::new();
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let id = bus.on(EventKind::Change, Box::new(move |_| c.set(c.get() + 1)));
        bus.off(EventKind::Change, id);
        bus.emit(EventKind::Change, root as ClockRef);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn a_panicking_listener_does_not_stop_the_rest() {
        let _ = env_logger::try_init();
        let host = ManualHost::new();
        let root = RootClock::new(host, RootClockOptions::default());
        let bus = EventBus::new();
        let reached = Rc::new(Cell::new(false));

        bus.on(EventKind::Change, Box::new(|_| panic!("boom")));
        let r = reached.clone();
        bus.on(EventKind::Change, Box::new(move |_| r.set(true)));

        bus.emit(EventKind::Change, root as ClockRef);
        assert!(reached.get());
    }
}
