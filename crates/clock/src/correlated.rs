use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use mediaclock_core::{ClockId, Correlation, EventKind};
use mediaclock_ports::{ClockError, ClockResult, Host};

use crate::events::EventBus;
use crate::node::{self, ClockNode, ClockRef};
use crate::timer::TimerRegistry;

/// Configuration for [`CorrelatedClock::new`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelatedClockOptions {
    pub tick_rate: Option<f64>,
    pub speed: Option<f64>,
    pub correlation: Option<Correlation>,
}

impl CorrelatedClockOptions {
    fn tick_rate_or_default(&self) -> f64 {
        self.tick_rate.unwrap_or(1000.0)
    }

    fn speed_or_default(&self) -> f64 {
        self.speed.unwrap_or(1.0)
    }

    fn correlation_or_default(&self) -> Correlation {
        self.correlation.unwrap_or_default()
    }
}

/// A non-root clock related to its parent by a linear map derived
/// from a [`Correlation`].
pub struct CorrelatedClock {
    id: ClockId,
    host: Rc<dyn Host>,
    parent: RefCell<ClockRef>,
    parent_subscriptions: RefCell<Vec<(EventKind, crate::events::ListenerId)>>,
    tick_rate: Cell<f64>,
    speed: Cell<f64>,
    correlation: RefCell<Correlation>,
    availability_flag: Cell<bool>,
    events: EventBus,
    timers: TimerRegistry,
    self_weak: RefCell<Option<Weak<dyn ClockNode>>>,
}

impl CorrelatedClock {
    pub fn new(parent: ClockRef, options: CorrelatedClockOptions) -> ClockResult<Rc<Self>> {
        let tick_rate = options.tick_rate_or_default();
        if tick_rate <= 0.0 {
            return Err(ClockError::InvalidArgument(
                "tickRate must be > 0".to_string(),
            ));
        }
        let host = parent.host();
        let rc = Rc::new(Self {
            id: ClockId::next(),
            host,
            parent: RefCell::new(parent.clone()),
            parent_subscriptions: RefCell::new(Vec::new()),
            tick_rate: Cell::new(tick_rate),
            speed: Cell::new(options.speed_or_default()),
            correlation: RefCell::new(options.correlation_or_default()),
            availability_flag: Cell::new(true),
            events: EventBus::new(),
            timers: TimerRegistry::new(),
            self_weak: RefCell::new(None),
        });
        let dynref: Rc<dyn ClockNode> = rc.clone();
        *rc.self_weak.borrow_mut() = Some(Rc::downgrade(&dynref));
        let subs = node::install_parent_subscriptions(Rc::downgrade(&dynref), &parent);
        *rc.parent_subscriptions.borrow_mut() = subs;
        log::debug!("{} created: correlated clock under {}", rc.id, parent.id());
        Ok(rc)
    }

    pub fn correlation(&self) -> Correlation {
        *self.correlation.borrow()
    }

    /// Replace the correlation, emitting exactly one `change`.
    pub fn set_correlation(&self, correlation: Correlation) {
        *self.correlation.borrow_mut() = correlation;
        self.self_ref().emit(EventKind::Change);
    }

    /// Update both correlation and speed, emitting exactly one
    /// `change` rather than two.
    pub fn set_correlation_and_speed(&self, correlation: Correlation, speed: f64) {
        *self.correlation.borrow_mut() = correlation;
        self.speed.set(speed);
        self.self_ref().emit(EventKind::Change);
    }

    /// Re-express the current mapping pivoting at child time `t`,
    /// carrying the currently-estimated error forward as the new
    /// initial error. Preserves every reading across the
    /// operation.
    pub fn rebase_correlation_at(&self, t: f64) -> ClockResult<()> {
        let new_parent_time = self.to_parent_time(t)?;
        let new_error = self.error_at_time(t);
        let growth = self.correlation.borrow().error_growth_rate;
        self.set_correlation(Correlation::new(new_parent_time, t, new_error, growth));
        Ok(())
    }

    /// Signed seconds of divergence `(newCorrelation, newSpeed)` would
    /// introduce relative to the current mapping.
    pub fn quantify_signed_change(&self, new_correlation: Correlation, new_speed: f64) -> f64 {
        let current_speed = self.speed.get();
        if new_speed != current_speed {
            return if new_speed > current_speed {
                f64::INFINITY
            } else {
                f64::NEG_INFINITY
            };
        }
        if new_speed != 0.0 {
            match self.to_parent_time(new_correlation.child_time) {
                Ok(current_parent_time) => {
                    (new_correlation.parent_time - current_parent_time) / self.parent.borrow().tick_rate()
                }
                Err(_) => f64::NAN,
            }
        } else {
            match self.from_parent_time(new_correlation.parent_time) {
                Ok(current_child_time) => {
                    (new_correlation.child_time - current_child_time) / self.tick_rate.get()
                }
                Err(_) => f64::NAN,
            }
        }
    }

    /// Absolute value of [`CorrelatedClock::quantify_signed_change`].
    pub fn quantify_change(&self, new_correlation: Correlation, new_speed: f64) -> f64 {
        self.quantify_signed_change(new_correlation, new_speed).abs()
    }

    /// Whether the prospective change exceeds `threshold` seconds.
    pub fn is_change_significant(
        &self,
        new_correlation: Correlation,
        new_speed: f64,
        threshold: f64,
    ) -> bool {
        self.quantify_change(new_correlation, new_speed) > threshold
    }
}

impl ClockNode for CorrelatedClock {
    fn id(&self) -> ClockId {
        self.id
    }

    fn now(&self) -> f64 {
        let parent = self.parent.borrow();
        let c = self.correlation.borrow();
        c.child_time
            + (parent.now() - c.parent_time) * self.tick_rate.get() * self.speed.get() / parent.tick_rate()
    }

    fn tick_rate(&self) -> f64 {
        self.tick_rate.get()
    }

    fn set_tick_rate(&self, rate: f64) -> ClockResult<()> {
        if rate <= 0.0 {
            return Err(ClockError::InvalidArgument(
                "tickRate must be > 0".to_string(),
            ));
        }
        self.tick_rate.set(rate);
        self.self_ref().emit(EventKind::Change);
        Ok(())
    }

    fn speed(&self) -> f64 {
        self.speed.get()
    }

    fn set_speed(&self, speed: f64) -> ClockResult<()> {
        self.speed.set(speed);
        self.self_ref().emit(EventKind::Change);
        Ok(())
    }

    fn parent(&self) -> Option<ClockRef> {
        Some(self.parent.borrow().clone())
    }

    fn set_parent(&self, parent: Option<ClockRef>) -> ClockResult<()> {
        let Some(new_parent) = parent else {
            return Err(ClockError::InvalidArgument(
                "a correlated clock always requires a parent".to_string(),
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
        let c = self.correlation.borrow();
        let speed = self.speed.get();
        if speed == 0.0 {
            return Ok(if t == c.child_time {
                c.parent_time
            } else {
                f64::NAN
            });
        }
        let parent = self.parent.borrow();
        Ok(c.parent_time + (t - c.child_time) * parent.tick_rate() / (self.tick_rate.get() * speed))
    }

    fn from_parent_time(&self, t: f64) -> ClockResult<f64> {
        let c = self.correlation.borrow();
        let parent = self.parent.borrow();
        Ok(c.child_time + (t - c.parent_time) * self.tick_rate.get() * self.speed.get() / parent.tick_rate())
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

    fn error_at_time(&self, t: f64) -> f64 {
        let c = self.correlation.borrow();
        let parent_tick_rate = self.parent.borrow().tick_rate();
        match self.to_parent_time(t) {
            Ok(pt) => c.initial_error + (pt - c.parent_time).abs() / parent_tick_rate * c.error_growth_rate,
            Err(_) => f64::NAN,
        }
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
            .expect("correlated clock self reference initialized at construction")
            .upgrade()
            .expect("correlated clock still alive")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root::{RootClock, RootClockOptions};
    use crate::testing::ManualHost;

    fn root_with(tick_rate: f64, millis: f64) -> Rc<RootClock> {
        let host = ManualHost::new();
        host.set_millis(millis);
        RootClock::new(host, RootClockOptions { tick_rate, ..Default::default() })
    }

    #[test]
    fn scenario_1_now_scales_and_tracks_host() {
        let root = root_with(1_000_000.0, 5_020_800.0);
        let child = CorrelatedClock::new(
            root,
            CorrelatedClockOptions {
                tick_rate: Some(1000.0),
                correlation: Some(Correlation::new(0.0, 300.0, 0.0, 0.0)),
                ..Default::default()
            },
        )
        .unwrap();
        assert!((child.now() - 5320.8).abs() < 1e-9);
    }

    #[test]
    fn scenario_1b_after_host_advances() {
        let host = ManualHost::new();
        host.set_millis(5_020_800.0);
        let root = RootClock::new(
            host.clone(),
            RootClockOptions { tick_rate: 1_000_000.0, ..Default::default() },
        );
        let child = CorrelatedClock::new(
            root.clone(),
            CorrelatedClockOptions {
                tick_rate: Some(1000.0),
                correlation: Some(Correlation::new(0.0, 300.0, 0.0, 0.0)),
                ..Default::default()
            },
        )
        .unwrap();
        host.set_millis(5_043_500.0);
        assert!((child.now() - 5343.5).abs() < 1e-9);
    }

    #[test]
    fn scenario_2_setting_correlation_rebases_now() {
        let host = ManualHost::new();
        host.set_millis(5_020_800.0);
        let root = RootClock::new(
            host,
            RootClockOptions { tick_rate: 1_000_000.0, ..Default::default() },
        );
        let child = CorrelatedClock::new(
            root,
            CorrelatedClockOptions {
                tick_rate: Some(1000.0),
                correlation: Some(Correlation::new(0.0, 300.0, 0.0, 0.0)),
                ..Default::default()
            },
        )
        .unwrap();
        child.set_correlation(Correlation::new(50_000.0, 320.0, 0.0, 0.0));
        assert!((child.now() - 5290.8).abs() < 1e-9);
    }

    #[test]
    fn scenario_3_rebase_preserves_now_and_pivots_child_time() {
        let root = root_with(1000.0, 0.0);
        let child = CorrelatedClock::new(
            root,
            CorrelatedClockOptions {
                tick_rate: Some(1000.0),
                correlation: Some(Correlation::new(50.0, 300.0, 0.0, 0.0)),
                ..Default::default()
            },
        )
        .unwrap();
        let before = child.now();
        child.rebase_correlation_at(400.0).unwrap();
        assert_eq!(child.correlation(), Correlation::new(150.0, 400.0, 0.0, 0.0));
        assert!((child.now() - before).abs() < 1e-9);
    }

    #[test]
    fn scenario_4_quantify_change() {
        let root = root_with(1000.0, 0.0);
        let child = CorrelatedClock::new(
            root,
            CorrelatedClockOptions {
                speed: Some(1.0),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            child.quantify_signed_change(Correlation::new(0.0, 0.0, 0.0, 0.0), 1.01),
            f64::INFINITY
        );

        child.set_speed(0.0).unwrap();
        let diff = child.quantify_change(Correlation::new(0.0, 5.0, 0.0, 0.0), 0.0);
        assert!((diff - 0.005).abs() < 1e-12);
    }

    #[test]
    fn to_parent_time_inverts_from_parent_time_when_speed_nonzero() {
        let root = root_with(1000.0, 10_000.0);
        let child = CorrelatedClock::new(
            root,
            CorrelatedClockOptions {
                correlation: Some(Correlation::new(10.0, 20.0, 0.0, 0.0)),
                speed: Some(2.0),
                ..Default::default()
            },
        )
        .unwrap();
        for t in [0.0, 20.0, 123.456, -50.0] {
            let parent_t = child.to_parent_time(t).unwrap();
            let back = child.from_parent_time(parent_t).unwrap();
            assert!((back - t).abs() < 1e-6, "t={t} back={back}");
        }
    }

    #[test]
    fn paused_clock_to_parent_time_is_nan_off_pivot() {
        let root = root_with(1000.0, 0.0);
        let child = CorrelatedClock::new(
            root,
            CorrelatedClockOptions {
                correlation: Some(Correlation::new(0.0, 10.0, 0.0, 0.0)),
                speed: Some(0.0),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(child.to_parent_time(10.0).unwrap(), 0.0);
        assert!(child.to_parent_time(11.0).unwrap().is_nan());
    }

    #[test]
    fn invalid_tick_rate_is_rejected() {
        let root = root_with(1000.0, 0.0);
        let result = CorrelatedClock::new(
            root,
            CorrelatedClockOptions {
                tick_rate: Some(0.0),
                ..Default::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn set_correlation_and_speed_emits_change_once() {
        let root = root_with(1000.0, 0.0);
        let child = CorrelatedClock::new(root, CorrelatedClockOptions::default()).unwrap();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        child.on(EventKind::Change, Box::new(move |_| c.set(c.get() + 1)));
        child.set_correlation_and_speed(Correlation::new(1.0, 2.0, 0.0, 0.0), 2.0);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn change_on_parent_propagates_to_child() {
        let root = root_with(1000.0, 0.0);
        let child = CorrelatedClock::new(root.clone(), CorrelatedClockOptions::default()).unwrap();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        child.on(EventKind::Change, Box::new(move |_| c.set(c.get() + 1)));
        root.set_availability_flag(true).unwrap(); // no-op, shouldn't emit change
        assert_eq!(count.get(), 0);
        child.set_speed(1.0).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn reparenting_detaches_old_parent_listeners() {
        let root_a = root_with(1000.0, 0.0);
        let root_b = root_with(1000.0, 0.0);
        let child = CorrelatedClock::new(root_a.clone(), CorrelatedClockOptions::default()).unwrap();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        child.on(EventKind::Change, Box::new(move |_| c.set(c.get() + 1)));

        child.set_parent(Some(root_b.clone() as ClockRef)).unwrap();
        assert_eq!(count.get(), 1); // set_parent itself emits one change

        // old parent is detached: a speed change there must not reach the child.
        root_a.set_speed(1.0).unwrap_err(); // roots reject set_speed outright
        child.set_speed(1.0).unwrap();
        assert_eq!(count.get(), 2); // only the direct mutation, nothing doubled from root_a

        root_b.set_tick_rate(1000.0).unwrap_err(); // roots reject set_tick_rate too
    }
}
