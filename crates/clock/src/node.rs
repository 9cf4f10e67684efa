use std::rc::Rc;

use mediaclock_core::EventKind;
use mediaclock_ports::{ClockError, ClockResult, Host};

use crate::events::EventBus;
use crate::timer::{TimerHandle, TimerRegistry};

/// Shared handle type for any node in a clock hierarchy.
pub type ClockRef = Rc<dyn ClockNode>;

/// The abstract clock contract every node in the hierarchy implements,
/// plus the algorithms that are the same regardless of concrete type
/// (ancestry walk, cross-clock conversion, dispersion accumulation,
/// event fan-out, timer scheduling).
///
/// Concrete nodes (`RootClock`, `CorrelatedClock`, `OffsetClock`)
/// implement the primitive methods in the first block; the rest of
/// this trait is provided.
pub trait ClockNode {
    /// Unique, stable identifier assigned at construction.
    fn id(&self) -> mediaclock_core::ClockId;

    /// Current tick count.
    fn now(&self) -> f64;

    /// Ticks per second. Always positive.
    fn tick_rate(&self) -> f64;

    /// Attempt to change the tick rate. Fails with `Immutable` on
    /// clocks that don't allow it, `InvalidArgument` if `rate <= 0`.
    fn set_tick_rate(&self, rate: f64) -> ClockResult<()>;

    /// Rate multiplier versus the parent's effective tick frame. A
    /// root clock always returns `1.0`.
    fn speed(&self) -> f64;

    /// Attempt to change the speed. Fails with `Immutable` where
    /// disallowed.
    fn set_speed(&self, speed: f64) -> ClockResult<()>;

    /// The parent node, or `None` for a root.
    fn parent(&self) -> Option<ClockRef>;

    /// Reparent this node, detaching from any previous parent's event
    /// bus and subscribing to the new one. Fails with `Immutable`
    /// where disallowed (root and offset clocks).
    fn set_parent(&self, parent: Option<ClockRef>) -> ClockResult<()>;

    /// Local time -> parent time. Fails with `NoParent` on a root.
    fn to_parent_time(&self, t: f64) -> ClockResult<f64>;

    /// Parent time -> local time. Fails with `NoParent` on a root.
    fn from_parent_time(&self, t: f64) -> ClockResult<f64>;

    /// The host wall-time instant at which this clock will read `t`.
    fn calc_when(&self, t: f64) -> ClockResult<f64>;

    /// This node's own availability flag (ignoring ancestry).
    fn availability_flag(&self) -> bool;

    /// Set this node's own availability flag. Roots reject `false`
    /// with `Immutable`.
    fn set_availability_flag(&self, flag: bool) -> ClockResult<()>;

    /// This node's own error contribution at local time `t` (not
    /// including any parent dispersion).
    fn error_at_time(&self, t: f64) -> f64;

    /// `Some(ppm)` only for a root clock; `None` otherwise.
    fn root_max_freq_error_ppm_self(&self) -> Option<f64>;

    /// This node's event bus.
    fn events(&self) -> &EventBus;

    /// This node's pending-timer table.
    fn timers(&self) -> &TimerRegistry;

    /// The host time/scheduling facility this node was constructed
    /// with (non-root nodes inherit their parent's at construction).
    fn host(&self) -> Rc<dyn Host>;

    /// An `Rc` handle to this same node, usable as an event payload or
    /// a parent pointer. Implementations store a `Weak<dyn ClockNode>`
    /// to themselves, populated right after construction.
    fn self_ref(&self) -> ClockRef;

    // ---- shared algorithms, identical for every concrete node ----

    /// Product of `speed` up the ancestry, inclusive of this node.
    fn effective_speed(&self) -> f64 {
        let mut product = self.speed();
        let mut cur = self.parent();
        while let Some(node) = cur {
            product *= node.speed();
            cur = node.parent();
        }
        product
    }

    /// Walk parents to the topmost node. Returns self if already root.
    fn root(&self) -> ClockRef {
        let mut cur = self.self_ref();
        loop {
            match cur.parent() {
                Some(p) => cur = p,
                None => return cur,
            }
        }
    }

    /// Ordered list starting with self and ending at the root.
    fn ancestry(&self) -> Vec<ClockRef> {
        let mut chain = vec![self.self_ref()];
        let mut cur = self.parent();
        while let Some(node) = cur {
            cur = node.parent();
            chain.push(node);
        }
        chain
    }

    /// Recursive composition of `to_parent_time` up to the root.
    fn to_root_time(&self, t: f64) -> ClockResult<f64> {
        match self.parent() {
            None => Ok(t),
            Some(parent) => parent.to_root_time(self.to_parent_time(t)?),
        }
    }

    /// Recursive composition of `from_parent_time` down from the root.
    fn from_root_time(&self, t: f64) -> ClockResult<f64> {
        match self.parent() {
            None => Ok(t),
            Some(parent) => self.from_parent_time(parent.from_root_time(t)?),
        }
    }

    /// Convert `t` from this clock's frame to `other`'s frame by
    /// stripping the shared ancestor tail (by identity) and composing
    /// the surviving legs.
    fn to_other_clock_time(&self, other: &ClockRef, t: f64) -> ClockResult<f64> {
        let self_chain = self.ancestry();
        let other_chain = other.ancestry();

        let mut si = self_chain.len();
        let mut oi = other_chain.len();
        while si > 0 && oi > 0 && Rc::ptr_eq(&self_chain[si - 1], &other_chain[oi - 1]) {
            si -= 1;
            oi -= 1;
        }

        if si == self_chain.len() {
            return Err(ClockError::NoCommonAncestor);
        }

        let mut cur = t;
        for node in &self_chain[0..si] {
            cur = node.to_parent_time(cur)?;
        }
        for node in other_chain[0..oi].iter().rev() {
            cur = node.from_parent_time(cur)?;
        }
        Ok(cur)
    }

    /// Own flag AND parent's effective availability (`true` if root).
    fn is_available(&self) -> bool {
        self.availability_flag() && self.parent().map_or(true, |p| p.is_available())
    }

    /// Own error at `t` plus the parent's dispersion at
    /// `to_parent_time(t)`.
    fn dispersion_at_time(&self, t: f64) -> f64 {
        let own = self.error_at_time(t);
        let parent_component = match self.parent() {
            None => 0.0,
            Some(parent) => match self.to_parent_time(t) {
                Ok(pt) => parent.dispersion_at_time(pt),
                Err(_) => f64::NAN,
            },
        };
        own + parent_component
    }

    /// Forwarded to the root's configured value.
    fn root_max_freq_error_ppm(&self) -> f64 {
        if let Some(ppm) = self.root_max_freq_error_ppm_self() {
            return ppm;
        }
        match self.parent() {
            Some(parent) => parent.root_max_freq_error_ppm(),
            None => 0.0,
        }
    }

    /// Seconds of divergence between this clock and `other` (spec
    /// §4.3.2). `+inf` if effective speed or tick rate differ.
    fn clock_diff(&self, other: &ClockRef) -> f64 {
        if self.effective_speed() != other.effective_speed() || self.tick_rate() != other.tick_rate()
        {
            return f64::INFINITY;
        }
        let root = self.root();
        let t_root = root.now();
        let a = self.from_root_time(t_root);
        let b = other.from_root_time(t_root);
        match (a, b) {
            (Ok(a), Ok(b)) => (a - b).abs() / self.tick_rate(),
            _ => f64::INFINITY,
        }
    }

    /// Schedule `callback` to run the first moment this clock reads
    /// `>= when` (in its own ticks). Returns a handle usable with
    /// [`ClockNode::clear_timeout`].
    fn set_at_time(&self, callback: Box<dyn FnOnce()>, when: f64) -> TimerHandle {
        let handle = self.timers().insert(when, callback);
        self.rearm_timer(handle);
        handle
    }

    /// `set_at_time(callback, now() + delta_ticks)`.
    fn set_timeout(&self, callback: Box<dyn FnOnce()>, delta_ticks: f64) -> TimerHandle {
        self.set_at_time(callback, self.now() + delta_ticks)
    }

    /// Cancel a pending timer. Idempotent; unknown handles are a no-op.
    fn clear_timeout(&self, handle: TimerHandle) {
        if let Some(real) = self.timers().remove(handle) {
            self.host().cancel(real);
        }
    }

    /// Recompute and re-arm the host timer backing `handle` from the
    /// current mapping. Called once when scheduling, and again for
    /// every pending timer whenever this node receives a `change`.
    fn rearm_timer(&self, handle: TimerHandle) {
        let Some(when) = self.timers().when(handle) else {
            return;
        };
        if let Some(old_real) = self.timers().take_real_handle(handle) {
            self.host().cancel(old_real);
        }

        let root = self.root();
        let delta_root_ticks = match self.to_root_time(when) {
            Ok(root_time) => root_time - root.now(),
            Err(_) => return,
        };
        let root_speed = root.speed();
        let ms = if delta_root_ticks == 0.0 {
            0.0
        } else if root_speed != 0.0 {
            (delta_root_ticks / root_speed) * (1000.0 / root.tick_rate())
        } else {
            f64::NAN
        };

        if !ms.is_finite() {
            // No finite instant maps to the target tick yet; stays
            // registered, unarmed, until the next change.
            return;
        }

        let ms = ms.max(0.0);
        let node = self.self_ref();
        let real = self
            .host()
            .schedule_after(ms, Box::new(move || node.fire_timer(handle)));
        self.timers().set_real_handle(handle, Some(real));
    }

    /// Invoked by the host when a timer's deadline is reached: removes
    /// the entry, then runs the stored callback.
    fn fire_timer(&self, handle: TimerHandle) {
        if let Some(callback) = self.timers().take_for_firing(handle) {
            callback();
        }
    }

    /// Re-arm every pending timer against the current mapping. Called
    /// by [`ClockNode::emit`] whenever a `Change` event fires.
    fn reschedule_all_timers(&self) {
        for handle in self.timers().all_handles() {
            self.rearm_timer(handle);
        }
    }

    /// Register a listener for `kind`.
    fn on(&self, kind: EventKind, listener: Box<dyn FnMut(ClockRef)>) -> crate::events::ListenerId {
        self.events().on(kind, listener)
    }

    /// Unregister a listener previously returned by `on`.
    fn off(&self, kind: EventKind, id: crate::events::ListenerId) {
        self.events().off(kind, id)
    }

    /// Fan `kind` out to this node's own listeners. `Change` also
    /// triggers this node's timer rescheduling.
    fn emit(&self, kind: EventKind) {
        self.events().emit(kind, self.self_ref());
        if kind == EventKind::Change {
            self.reschedule_all_timers();
        }
    }
}

/// Subscribe `self_weak` to its new parent's `change`/`available`/
/// `unavailable` events: parent `change` unconditionally
/// re-emits `change(self)`; parent availability events re-emit only
/// if this node's own flag is true, i.e. the flip actually changes
/// this node's effective availability. Returns the ids needed to
/// detach on reparent or teardown.
pub(crate) fn install_parent_subscriptions(
    self_weak: std::rc::Weak<dyn ClockNode>,
    parent: &ClockRef,
) -> Vec<(EventKind, crate::events::ListenerId)> {
    let change_weak = self_weak.clone();
    let change_id = parent.on(
        EventKind::Change,
        Box::new(move |_parent| {
            if let Some(node) = change_weak.upgrade() {
                node.emit(EventKind::Change);
            }
        }),
    );

    let available_weak = self_weak.clone();
    let available_id = parent.on(
        EventKind::Available,
        Box::new(move |_parent| {
            if let Some(node) = available_weak.upgrade() {
                if node.availability_flag() {
                    node.emit(EventKind::Available);
                }
            }
        }),
    );

    let unavailable_weak = self_weak;
    let unavailable_id = parent.on(
        EventKind::Unavailable,
        Box::new(move |_parent| {
            if let Some(node) = unavailable_weak.upgrade() {
                if node.availability_flag() {
                    node.emit(EventKind::Unavailable);
                }
            }
        }),
    );

    vec![
        (EventKind::Change, change_id),
        (EventKind::Available, available_id),
        (EventKind::Unavailable, unavailable_id),
    ]
}
