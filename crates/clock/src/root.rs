use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use mediaclock_core::{measure_precision_seconds, ClockId};
use mediaclock_ports::{ClockError, ClockResult, Host};

use crate::events::EventBus;
use crate::node::{ClockNode, ClockRef};
use crate::timer::TimerRegistry;

const PRECISION_SAMPLES: usize = 64;

/// Configuration for [`RootClock::new`].
#[derive(Debug, Clone, Copy)]
pub struct RootClockOptions {
    pub tick_rate: f64,
    pub max_freq_error_ppm: f64,
}

impl Default for RootClockOptions {
    fn default() -> Self {
        Self {
            tick_rate: 1000.0,
            max_freq_error_ppm: 50.0,
        }
    }
}

/// Terminal node in a clock tree: reads the host's monotonic time,
/// scaled to a configured tick rate. Effectively frozen
/// except for availability, which it also rejects turning off.
pub struct RootClock {
    id: ClockId,
    host: Rc<dyn Host>,
    tick_rate: Cell<f64>,
    max_freq_error_ppm: f64,
    precision: f64,
    availability_flag: Cell<bool>,
    events: EventBus,
    timers: TimerRegistry,
    self_weak: RefCell<Option<Weak<dyn ClockNode>>>,
}

impl RootClock {
    pub fn new(host: Rc<dyn Host>, options: RootClockOptions) -> Rc<Self> {
        let precision = measure_precision_seconds(|| host.now_millis(), PRECISION_SAMPLES);
        let rc = Rc::new(Self {
            id: ClockId::next(),
            host,
            tick_rate: Cell::new(options.tick_rate),
            max_freq_error_ppm: options.max_freq_error_ppm,
            precision,
            availability_flag: Cell::new(true),
            events: EventBus::new(),
            timers: TimerRegistry::new(),
            self_weak: RefCell::new(None),
        });
        let dynref: Rc<dyn ClockNode> = rc.clone();
        *rc.self_weak.borrow_mut() = Some(Rc::downgrade(&dynref));
        log::debug!("{} created: root clock, tick_rate={}", rc.id, options.tick_rate);
        rc
    }

    /// The root clock's fixed per-read uncertainty, in seconds.
    pub fn precision(&self) -> f64 {
        self.precision
    }
}

impl ClockNode for RootClock {
    fn id(&self) -> ClockId {
        self.id
    }

    fn now(&self) -> f64 {
        self.host.now_millis() * self.tick_rate.get() / 1000.0
    }

    fn tick_rate(&self) -> f64 {
        self.tick_rate.get()
    }

    fn set_tick_rate(&self, _rate: f64) -> ClockResult<()> {
        Err(ClockError::Immutable("root clock tick rate is fixed"))
    }

    fn speed(&self) -> f64 {
        1.0
    }

    fn set_speed(&self, _speed: f64) -> ClockResult<()> {
        Err(ClockError::Immutable("root clock speed is fixed"))
    }

    fn parent(&self) -> Option<ClockRef> {
        None
    }

    fn set_parent(&self, _parent: Option<ClockRef>) -> ClockResult<()> {
        Err(ClockError::Immutable("root clock cannot be reparented"))
    }

    fn to_parent_time(&self, _t: f64) -> ClockResult<f64> {
        Err(ClockError::NoParent)
    }

    fn from_parent_time(&self, _t: f64) -> ClockResult<f64> {
        Err(ClockError::NoParent)
    }

    fn calc_when(&self, t: f64) -> ClockResult<f64> {
        Ok(t * 1000.0 / self.tick_rate.get())
    }

    fn availability_flag(&self) -> bool {
        self.availability_flag.get()
    }

    fn set_availability_flag(&self, flag: bool) -> ClockResult<()> {
        if !flag {
            return Err(ClockError::Immutable("root clock is always available"));
        }
        Ok(())
    }

    fn error_at_time(&self, _t: f64) -> f64 {
        self.precision
    }

    fn root_max_freq_error_ppm_self(&self) -> Option<f64> {
        Some(self.max_freq_error_ppm)
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
            .expect("root clock self reference initialized at construction")
            .upgrade()
            .expect("root clock still alive")
    }
}
