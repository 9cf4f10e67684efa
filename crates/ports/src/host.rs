use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TIMER_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Opaque handle to a host-level one-shot timer armed via
/// [`Host::schedule_after`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostTimerHandle(u64);

impl HostTimerHandle {
    /// Allocate a fresh handle. Host implementations call this rather
    /// than constructing handles by hand, so handles stay unique
    /// across every `Host` instance in a process.
    pub fn next() -> Self {
        Self(NEXT_TIMER_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HostTimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host-timer-{}", self.0)
    }
}

/// The host's real-time primitives, consumed but not implemented by
/// this crate: a monotonic wall-time source and a
/// one-shot real-time timer facility.
///
/// Implementations must be single-threaded-cooperative compatible:
/// `schedule_after` may run its callback from any re-entry point the
/// host chooses (an OS timer thread, an event loop tick, a manual
/// `advance()` in tests) but must never call back into a clock
/// concurrently with other clock operations.
pub trait Host {
    /// Monotonically non-decreasing wall time, in milliseconds.
    fn now_millis(&self) -> f64;

    /// Arm a one-shot timer that invokes `callback` no earlier than
    /// `delay_ms` from now (best-effort resolution).
    fn schedule_after(&self, delay_ms: f64, callback: Box<dyn FnOnce()>) -> HostTimerHandle;

    /// Cancel a previously armed timer. Idempotent; unknown or
    /// already-fired handles are silently ignored.
    fn cancel(&self, handle: HostTimerHandle);
}
