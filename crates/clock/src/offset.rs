use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use mediaclock_core::{ClockId, EventKind};
use mediaclock_ports::{ClockError, ClockResult, Host};

use crate::events::EventBus;
use crate::node::{self, ClockNode, ClockRef};
use crate::timer::TimerRegistry;

/// Configuration for [`OffsetClock::new`]. Default offset is zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetClockOptions {
    pub offset_ms: f64,
}

/// A non-root clock whose output is its parent's time shifted by a
/// configurable real-world offset. `speed` is fixed at 1
/// and `tickRate` always mirrors the parent's; both are immutable.
pub struct OffsetClock {
    id: ClockId,
    host: Rc<dyn Host>,
    parent: RefCell<ClockRef>,
    parent_subscriptions: RefCell<Vec<(EventKind, crate::events::ListenerId)>>,
    offset_ms: Cell<f64>,
    availability_flag: Cell<bool>,
    events: EventBus,
    timers: TimerRegistry,
    self_weak: RefCell<Option<Weak<dyn ClockNode>>>,
}

impl OffsetClock {
    pub fn new(parent: ClockRef, options: OffsetClockOptions) -> Rc<Self> {
        let host = parent.host();
        let rc = Rc::new(Self {
            id: ClockId::next(),
            host,
            parent: RefCell::new(parent.clone()),
            parent_subscriptions: RefCell::new(Vec::new()),
            offset_ms: Cell::new(options.offset_ms),
            availability_flag: Cell::new(true),
            events: EventBus::new(),
            timers: TimerRegistry::new(),
            self_weak: RefCell::new(None),
        });
        let dynref: Rc<dyn ClockNode> = rc.clone();
        *rc.self_weak.borrow_mut() = Some(Rc::downgrade(&dynref));
        let subs = node::install_parent_subscriptions(Rc::downgrade(&dynref), &parent);
        *rc.parent_subscriptions.borrow_mut() = subs;
        log::debug!("{} created: offset clock ({} ms) under {}", rc.id, options.offset_ms, parent.id());
        rc
    }

    pub fn offset_ms(&self) -> f64 {
        self.offset_ms.get()
    }

    /// Change the offset. Emits `change` only if the value actually
    /// changed.
    pub fn set_offset_ms(&self, offset_ms: f64) {
        if self.offset_ms.get() == offset_ms {
            return;
        }
        self.offset_ms.set(offset_ms);
        self.self_ref().emit(EventKind::Change);
    }

    /// `offset · effectiveSpeed() · parentTickRate / 1000`, i.e. the
    /// real-time offset expressed in parent ticks.
    fn shift(&self) -> f64 {
        let parent = self.parent.borrow();
        self.offset_ms.get() * self.effective_speed() * parent.tick_rate() / 1000.0
    }
}

impl ClockNode for OffsetClock {
    fn id(&self) -> ClockId {
        self.id
    }

    fn now(&self) -> f64 {
        self.parent.borrow().now() + self.shift()
    }

    fn tick_rate(&self) -> f64 {
        self.parent.borrow().tick_rate()
    }

    fn set_tick_rate(&self, _rate: f64) -> ClockResult<()> {
        Err(ClockError::Immutable("offset clock tick rate mirrors its parent"))
    }

    fn speed(&self) -> f64 {
        1.0
    }

    fn set_speed(&self, _speed: f64) -> ClockResult<()> {
        Err(ClockError::Immutable("offset clock speed is fixed at 1"))
    }

    fn parent(&self) -> Option<ClockRef> {
        Some(self.parent.borrow().clone())
    }

    fn set_parent(&self, parent: Option<ClockRef>) -> ClockResult<()> {
        let Some(new_parent) = parent else {
            return Err(ClockError::InvalidArgument(
                "an offset clock always requires a parent".to_string(),
            ));
        };

        let old_parent = self.parent.borrow().clone();
        for (kind, id) in self.parent_subscriptions.borrow_mut().drain(..) {
            old_parent.off(kind, id);
        }

        *self.parent.borrow_mut() = new_parent.clone();
        let self_weak = self
            .self_weak
            .borrow()
            .clone()
            .expect("self reference initialized at construction");
        let subs = node::install_parent_subscriptions(self_weak, &new_parent);
        *self.parent_subscriptions.borrow_mut() = subs;

        self.self_ref().emit(EventKind::Change);
        Ok(())
    }

    fn to_parent_time(&self, t: f64) -> ClockResult<f64> {
        Ok(t - self.shift())
    }

    fn from_parent_time(&self, t: f64) -> ClockResult<f64> {
        Ok(t + self.shift())
    }

    fn calc_when(&self, t: f64) -> ClockResult<f64> {
        let parent = self.parent.borrow().clone();
        parent.calc_when(self.to_parent_time(t)?)
    }

    fn availability_flag(&self) -> bool {
        self.availability_flag.get()
    }

    fn set_availability_flag(&self, flag: bool) -> ClockResult<()> {
        let old_flag = self.availability_flag.get();
        if old_flag == flag {
            return Ok(());
        }
        let parent_available = self.parent.borrow().is_available();
        let old_effective = old_flag && parent_available;
        let new_effective = flag && parent_available;
        self.availability_flag.set(flag);
        if old_effective != new_effective {
            let kind = if new_effective {
                EventKind::Available
            } else {
                EventKind::Unavailable
            };
            self.self_ref().emit(kind);
        }
        Ok(())
    }

    fn error_at_time(&self, _t: f64) -> f64 {
        0.0
    }

    fn root_max_freq_error_ppm_self(&self) -> Option<f64> {
        None
    }

    fn events(&self) -> &EventBus {
        &self.events
    }

    fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    fn host(&self) -> Rc<dyn Host> {
        self.host.clone()
    }

    fn self_ref(&self) -> ClockRef {
        self.self_weak
            .borrow()
            .as_ref()
            .expect("offset clock self reference initialized at construction")
            .upgrade()
            .expect("offset clock still alive")
    }
}
